//! Lab crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lab_crawler::{
    acquisition::AcquisitionClient,
    config::{CONFIG_FILE, load_all, load_config},
    error::Result,
    models::FacultyType,
    pipeline,
    services::{ExtractorRegistry, KeywordAnalyzer},
    storage::JsonFileSink,
    utils::log as console,
};

/// Lab crawler - immune research lab harvester
#[derive(Parser, Debug)]
#[command(
    name = "lab-crawler",
    version,
    about = "Polite harvester for university research lab listings"
)]
struct Cli {
    /// Path to storage directory containing config and seed files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest labs for every institution in the seed
    Harvest {
        /// Only harvest these institution ids
        #[arg(long = "only", value_delimiter = ',')]
        only: Vec<u64>,
    },

    /// Validate configuration and seed files
    Validate,

    /// Score and classify a research description
    Analyze {
        /// Text file with the research description
        file: PathBuf,
    },

    /// List vocabulary keywords containing a fragment
    Suggest {
        partial: String,

        #[arg(short, long, default_value_t = 10)]
        max: usize,
    },

    /// Fetch one page and print the records an extractor finds on it
    Probe {
        url: String,

        #[arg(long, value_enum, default_value_t = Faculty::General)]
        faculty: Faculty,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Faculty {
    Medical,
    Agriculture,
    Veterinary,
    General,
}

impl From<Faculty> for FacultyType {
    fn from(f: Faculty) -> Self {
        match f {
            Faculty::Medical => FacultyType::Medical,
            Faculty::Agriculture => FacultyType::Agriculture,
            Faculty::Veterinary => FacultyType::Veterinary,
            Faculty::General => FacultyType::General,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
    console::init(level);
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.storage_dir.join(CONFIG_FILE))?;
    init_logging(cli.verbose, &config.logging.level);
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Harvest { only } => {
            let (config, mut seed) = load_all(&cli.storage_dir)?;
            if !only.is_empty() {
                seed.institutions.retain(|i| only.contains(&i.id));
                log::info!("Restricted to {} institutions", seed.institutions.len());
            }

            let sink = JsonFileSink::new(config.output_path(&cli.storage_dir));
            pipeline::run_harvest(&config, &seed, &sink).await?;
        }

        Command::Validate => {
            pipeline::run_validate(&cli.storage_dir)?;
            log::info!("All validations passed!");
        }

        Command::Analyze { file } => {
            let enrichment = pipeline::run_analyze(&file)?;
            println!("{}", serde_json::to_string_pretty(&enrichment)?);
        }

        Command::Suggest { partial, max } => {
            for keyword in KeywordAnalyzer::new().suggest_keywords(&partial, max) {
                println!("{keyword}");
            }
        }

        Command::Probe { url, faculty } => {
            let client = AcquisitionClient::from_config(&config)?;
            let body = client.fetch(&url).await?;

            let registry = ExtractorRegistry::from_config(&config.extraction)?;
            let faculty = FacultyType::from(faculty);
            let records = registry
                .get(faculty)
                .map(|extractor| extractor.extract(&body, &url))
                .unwrap_or_default();

            log::info!("{} records found ({})", records.len(), faculty.as_str());
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
