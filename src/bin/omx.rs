//! OMX - Omics data exploration CLI
//!
//! Runs each exploration computation on files and prints the JSON payload.

use clap::{Args, Parser, Subcommand};
use omics_explore::config::ExploreConfig;
use omics_explore::data::{LoadOptions, ModelPopulation};
use omics_explore::error::Result;
use omics_explore::network::TableTaxonomySource;
use omics_explore::service::{Dataset, Explorer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Omics data exploration and model stability
#[derive(Parser)]
#[command(name = "omx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an explorer configuration YAML
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Input files shared by every dataset command.
#[derive(Args)]
struct DataArgs {
    /// Abundance matrix (TSV or CSV)
    #[arg(short = 'x', long)]
    matrix: PathBuf,

    /// Class labels (TSV or CSV, sample id then integer class)
    #[arg(short = 'y', long)]
    labels: PathBuf,

    /// Matrix rows are features and columns are samples
    #[arg(long)]
    features_in_rows: bool,

    /// Restrict to these features (comma-separated)
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Keep only samples of this class
    #[arg(long)]
    class: Option<i64>,

    /// Stratified downsampling to at most this many samples
    #[arg(long)]
    max_samples: Option<usize>,
}

impl DataArgs {
    fn options(&self) -> LoadOptions {
        LoadOptions {
            features_in_rows: self.features_in_rows,
            feature_subset: self.features.clone(),
            class_filter: self.class,
            max_samples: self.max_samples,
        }
    }

    fn load(&self) -> Result<Dataset> {
        let dataset = Dataset::load(&self.matrix, &self.labels, &self.options())?;
        log::info!(
            "Loaded {} samples x {} features",
            dataset.matrix.n_samples(),
            dataset.matrix.n_features()
        );
        Ok(dataset)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Per-feature descriptive statistics and histograms
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Per-class boxplot summaries
    Boxplot {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Barcode heatmap matrix
    Barcode {
        #[command(flatten)]
        data: DataArgs,
    },

    /// PCoA, confidence ellipses and PERMANOVA
    Ordinate {
        #[command(flatten)]
        data: DataArgs,

        /// Distance metric (braycurtis, euclidean, manhattan, jaccard, cosine)
        #[arg(long)]
        metric: Option<String>,

        /// Number of PERMANOVA permutations
        #[arg(long)]
        permutations: Option<usize>,
    },

    /// Co-abundance network
    Network {
        #[command(flatten)]
        data: DataArgs,

        /// Minimum |rho| for an edge
        #[arg(long)]
        threshold: Option<f64>,

        /// Minimum prevalence in percent
        #[arg(long)]
        min_prevalence: Option<f64>,

        /// Model population JSON used to annotate nodes
        #[arg(long)]
        population: Option<PathBuf>,

        /// Taxonomy table (feature id, phylum, family, genus, species)
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },

    /// Feature-selection stability of a model population
    Stability {
        /// Model population JSON
        #[arg(short, long)]
        population: PathBuf,
    },

    /// Print an example configuration
    ExampleConfig,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ExploreConfig::from_file(path)?,
        None => ExploreConfig::default(),
    };
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Stats { data } => {
            let dataset = data.load()?;
            let explorer = Explorer::new(config);
            let stats = explorer.feature_statistics(&dataset, &explorer.config().stats);
            write_json(stats.as_ref(), output)
        }

        Commands::Boxplot { data } => {
            let dataset = data.load()?;
            let explorer = Explorer::new(config);
            let boxplots = explorer.boxplots(&dataset, None, &explorer.config().boxplot);
            write_json(&boxplots, output)
        }

        Commands::Barcode { data } => {
            let dataset = data.load()?;
            let explorer = Explorer::new(config);
            let barcode = explorer.barcode(&dataset, None, &explorer.config().barcode);
            write_json(&barcode, output)
        }

        Commands::Ordinate {
            data,
            metric,
            permutations,
        } => {
            let mut config = config;
            if let Some(metric) = metric {
                config.ordination.metric = metric;
            }
            if let Some(n) = permutations {
                config.ordination.n_permutations = n;
            }
            let dataset = data.load()?;
            let explorer = Explorer::new(config);
            let result = explorer.ordination(&dataset, &explorer.config().ordination)?;
            if result.metric_substituted {
                eprintln!(
                    "Metric '{}' unavailable, used {}",
                    result.requested_metric,
                    result.metric.name()
                );
            }
            write_json(&result, output)
        }

        Commands::Network {
            data,
            threshold,
            min_prevalence,
            population,
            taxonomy,
        } => {
            let mut config = config;
            if let Some(t) = threshold {
                config.network.correlation_threshold = t;
            }
            if let Some(p) = min_prevalence {
                config.network.min_prevalence = p;
            }
            let table = taxonomy.or_else(|| config.taxonomy.table.clone().map(PathBuf::from));
            let dataset = data.load()?;
            let population = population
                .map(ModelPopulation::from_json_file)
                .transpose()?;

            let mut explorer = Explorer::new(config);
            if let Some(path) = table {
                let source = TableTaxonomySource::from_delimited(&path)?;
                log::info!("Loaded taxonomy for {} features", source.len());
                explorer = explorer.with_taxonomy(Arc::new(source))?;
            }
            let graph = explorer.coabundance_network(
                &dataset,
                &explorer.config().network,
                population.as_ref(),
            )?;
            write_json(graph.as_ref(), output)
        }

        Commands::Stability { population } => {
            let population = ModelPopulation::from_json_file(&population)?;
            let explorer = Explorer::new(config);
            let report = explorer.stability(&population, &explorer.config().stability);
            write_json(&report, output)
        }

        Commands::ExampleConfig => {
            let yaml = ExploreConfig::default().to_yaml()?;
            match output {
                Some(path) => {
                    fs::write(path, yaml)?;
                    eprintln!("Wrote example configuration to {:?}", path);
                }
                None => print!("{}", yaml),
            }
            Ok(())
        }
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_args_to_load_options() {
        let cli = Cli::try_parse_from([
            "omx",
            "stats",
            "-x",
            "X.tsv",
            "-y",
            "y.tsv",
            "--features",
            "a,b",
            "--max-samples",
            "50",
        ])
        .unwrap();
        let Commands::Stats { data } = cli.command else {
            panic!("expected the stats command");
        };
        let options = data.options();
        assert_eq!(options.max_samples, Some(50));
        assert_eq!(options.feature_subset, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!options.features_in_rows);
    }

    #[test]
    fn test_max_samples_defaults_to_none() {
        let cli = Cli::try_parse_from(["omx", "barcode", "-x", "X.tsv", "-y", "y.tsv"]).unwrap();
        let Commands::Barcode { data } = cli.command else {
            panic!("expected the barcode command");
        };
        assert_eq!(data.options().max_samples, None);
    }
}
