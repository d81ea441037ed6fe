//! Per-class confidence ellipses on the first two ordination axes.

use crate::data::group_by_class;
use crate::stats::summary::round_to;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::f64::consts::PI;

/// Number of boundary points (the last repeats the first).
pub const ELLIPSE_POINTS: usize = 100;

/// Minimum class size for an ellipse.
const MIN_POINTS: usize = 3;

/// Confidence ellipse for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEllipse {
    pub class: i64,
    pub center: [f64; 2],
    /// Semi-axis lengths, major first.
    pub radii: [f64; 2],
    /// Rotation of the major axis, in radians from the first axis.
    pub angle: f64,
    /// Closed polygon of `ELLIPSE_POINTS` points.
    pub boundary: Vec<[f64; 2]>,
}

/// Confidence ellipses per class from 2D points.
///
/// Classes with fewer than three points are skipped. Axis lengths are the
/// square roots of the covariance eigenvalues scaled by the χ²₂ quantile.
pub fn confidence_ellipses(
    points: &[[f64; 2]],
    classes: &[i64],
    confidence: f64,
) -> Vec<ConfidenceEllipse> {
    let scale = match ChiSquared::new(2.0) {
        Ok(chi) => chi.inverse_cdf(confidence.clamp(1e-9, 1.0 - 1e-9)),
        Err(_) => return Vec::new(),
    };

    group_by_class(classes)
        .into_iter()
        .filter(|(_, members)| members.len() >= MIN_POINTS && members.iter().all(|&i| i < points.len()))
        .map(|(class, members)| ellipse_for(class, &members, points, scale))
        .collect()
}

fn ellipse_for(class: i64, members: &[usize], points: &[[f64; 2]], scale: f64) -> ConfidenceEllipse {
    let n = members.len() as f64;
    let cx = members.iter().map(|&i| points[i][0]).sum::<f64>() / n;
    let cy = members.iter().map(|&i| points[i][1]).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &i in members {
        let dx = points[i][0] - cx;
        let dy = points[i][1] - cy;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    sxx /= n - 1.0;
    syy /= n - 1.0;
    sxy /= n - 1.0;

    // closed-form eigenvalues of the 2x2 covariance
    let half_trace = (sxx + syy) / 2.0;
    let gap = (((sxx - syy) / 2.0).powi(2) + sxy * sxy).sqrt();
    let major = (half_trace + gap).max(0.0);
    let minor = (half_trace - gap).max(0.0);
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);

    let a = (major * scale).sqrt();
    let b = (minor * scale).sqrt();
    let (sin, cos) = angle.sin_cos();

    let boundary = (0..ELLIPSE_POINTS)
        .map(|k| {
            let t = 2.0 * PI * k as f64 / (ELLIPSE_POINTS - 1) as f64;
            let (x, y) = (a * t.cos(), b * t.sin());
            [
                round_to(cx + x * cos - y * sin, 6),
                round_to(cy + x * sin + y * cos, 6),
            ]
        })
        .collect();

    ConfidenceEllipse {
        class,
        center: [round_to(cx, 6), round_to(cy, 6)],
        radii: [round_to(a, 6), round_to(b, 6)],
        angle: round_to(angle, 6),
        boundary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_small_classes_skipped() {
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0], [6.0, 6.0]];
        let ellipses = confidence_ellipses(&points, &[0, 0, 0, 1, 1], 0.95);
        assert_eq!(ellipses.len(), 1);
        assert_eq!(ellipses[0].class, 0);
        assert_relative_eq!(ellipses[0].center[0], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boundary_closed() {
        let points = [[0.0, 0.0], [2.0, 0.0], [0.0, 1.0], [2.0, 1.0]];
        let ellipses = confidence_ellipses(&points, &[1, 1, 1, 1], 0.95);
        let boundary = &ellipses[0].boundary;
        assert_eq!(boundary.len(), ELLIPSE_POINTS);
        assert_relative_eq!(boundary[0][0], boundary[ELLIPSE_POINTS - 1][0], epsilon = 1e-6);
        assert_relative_eq!(boundary[0][1], boundary[ELLIPSE_POINTS - 1][1], epsilon = 1e-6);
    }

    #[test]
    fn test_axis_aligned_radii() {
        // var(x) = 4/3, var(y) = 1/3, no covariance
        let points = [[0.0, 0.0], [2.0, 0.0], [0.0, 1.0], [2.0, 1.0]];
        let ellipses = confidence_ellipses(&points, &[0, 0, 0, 0], 0.95);
        let chi = 5.991464547107979;
        assert_relative_eq!(ellipses[0].radii[0], (4.0f64 / 3.0 * chi).sqrt(), epsilon = 1e-4);
        assert_relative_eq!(ellipses[0].radii[1], (1.0f64 / 3.0 * chi).sqrt(), epsilon = 1e-4);
        assert_relative_eq!(ellipses[0].angle, 0.0, epsilon = 1e-9);
    }
}
