//! Metabridge CLI
//!
//! Export, import and convert Shopify metafields, and tag pink products.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use metabridge_core::EntityKind;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Metabridge - move Shopify metafields between stores
#[derive(Parser)]
#[command(name = "metabridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "metabridge.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Admin API version (overrides the configuration file)
    #[arg(long, env = "API_VERSION")]
    api_version: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export products and collections with their metafields
    Export {
        /// Output JSON file
        #[arg(short, long, default_value = "metafields_export.json")]
        output: PathBuf,

        /// Source shop domain
        #[arg(long, env = "SOURCE_SHOP")]
        source_shop: Option<String>,

        /// Source Admin API token
        #[arg(long, env = "SOURCE_TOKEN", hide_env_values = true)]
        source_token: Option<String>,
    },

    /// Import an export file into the target store
    Import {
        /// Export file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Replace metafields that already exist on the target
        #[arg(long)]
        overwrite: bool,

        /// Create missing metafield definitions first
        #[arg(long)]
        create_definitions: bool,

        /// Write the full report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Target shop domain
        #[arg(long, env = "TARGET_SHOP")]
        target_shop: Option<String>,

        /// Target Admin API token
        #[arg(long, env = "TARGET_TOKEN", hide_env_values = true)]
        target_token: Option<String>,
    },

    /// Convert an export file to CSV
    Convert {
        /// Export file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long, default_value = "products.csv")]
        output: PathBuf,

        /// Entity kind to convert
        #[arg(long, value_enum, default_value_t = KindArg::Products)]
        kind: KindArg,

        /// Only keep metafields of this namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Tag products whose custom.cor color is pink
    TagPink {
        /// Output CSV with the color of every product
        #[arg(short, long, default_value = "products_with_pink_tags.csv")]
        output: PathBuf,

        /// Classify without tagging
        #[arg(long)]
        dry_run: bool,

        /// Shop domain
        #[arg(long, env = "SOURCE2_SHOP")]
        shop: Option<String>,

        /// Admin API token
        #[arg(long, env = "SOURCE2_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Products,
    Collections,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Products => EntityKind::Product,
            KindArg::Collections => EntityKind::Collection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a .env file next to the working directory
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = || commands::load_config(&cli.config, cli.api_version.clone());

    match cli.command {
        Commands::Export {
            ref output,
            ref source_shop,
            ref source_token,
        } => {
            let mut config = config()?;
            config.merge_store(
                metabridge_core::StoreRole::Source,
                source_shop.clone(),
                source_token.clone(),
            );
            commands::export::run(&config, output).await?;
        }
        Commands::Import {
            ref input,
            dry_run,
            overwrite,
            create_definitions,
            ref report,
            ref target_shop,
            ref target_token,
        } => {
            let mut config = config()?;
            config.merge_store(
                metabridge_core::StoreRole::Target,
                target_shop.clone(),
                target_token.clone(),
            );
            let options = metabridge_core::ImportOptions {
                dry_run,
                overwrite,
                create_definitions,
            };
            commands::import::run(&config, input, options, report.as_deref()).await?;
        }
        Commands::Convert {
            ref input,
            ref output,
            kind,
            ref namespace,
        } => {
            commands::convert::run(input, output, kind.into(), namespace.clone())?;
        }
        Commands::TagPink {
            ref output,
            dry_run,
            ref shop,
            ref token,
        } => {
            let mut config = config()?;
            config.merge_store(
                metabridge_core::StoreRole::SecondarySource,
                shop.clone(),
                token.clone(),
            );
            commands::tag::run(&config, output, dry_run).await?;
        }
    }

    Ok(())
}
