//! sysupgrade operator CLI.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sysupgrade")]
#[command(about = "Build queue and catalog administration", long_about = None)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(long, env = "SYSUPGRADE_CONFIG")]
    config: Option<String>,

    /// Database URL, overrides the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,
    /// Inspect and operate the build queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Query the catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Submit a build request
    Submit {
        #[arg(long, default_value = "openwrt")]
        distro: String,
        #[arg(long)]
        release: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        subtarget: String,
        #[arg(long)]
        profile: String,
        /// Packages to include, comma separated or repeated
        #[arg(long, value_delimiter = ',')]
        packages: Vec<String>,
        #[arg(long, default_value = "")]
        network_profile: String,
    },
    /// Claim the oldest pending job
    Claim,
    /// Mark a claimed job as failed
    Fail {
        /// Job fingerprint
        hash: String,
    },
    /// Remove a job
    Delete {
        /// Job fingerprint
        hash: String,
    },
    /// Show a job
    Show {
        /// Job fingerprint
        hash: String,
    },
    /// List jobs oldest first
    List {
        /// pending, in-progress or failed
        #[arg(long, default_value = "pending")]
        status: String,
        /// Maximum number of jobs to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Count jobs per status
    Stats,
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List releases
    Releases {
        /// Only releases of this distribution
        distro: Option<String>,
    },
    /// List targets of a release
    Targets { distro: String, release: String },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let ctx = commands::Context::connect(cli.config.as_deref(), cli.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            commands::migrate(&ctx).await?;
        }
        Commands::Queue { command } => match command {
            QueueCommands::Submit {
                distro,
                release,
                target,
                subtarget,
                profile,
                packages,
                network_profile,
            } => {
                let request = sysupgrade_core::BuildRequest {
                    distro,
                    release,
                    target,
                    subtarget,
                    profile,
                    packages,
                    network_profile,
                };
                commands::queue::submit(&ctx, &request).await?;
            }
            QueueCommands::Claim => {
                commands::queue::claim(&ctx).await?;
            }
            QueueCommands::Fail { hash } => {
                commands::queue::fail(&ctx, &hash).await?;
            }
            QueueCommands::Delete { hash } => {
                commands::queue::delete(&ctx, &hash).await?;
            }
            QueueCommands::Show { hash } => {
                commands::queue::show(&ctx, &hash).await?;
            }
            QueueCommands::List { status, limit } => {
                commands::queue::list(&ctx, &status, limit).await?;
            }
            QueueCommands::Stats => {
                commands::queue::stats(&ctx).await?;
            }
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::Releases { distro } => {
                commands::catalog::releases(&ctx, distro.as_deref()).await?;
            }
            CatalogCommands::Targets { distro, release } => {
                commands::catalog::targets(&ctx, &distro, &release).await?;
            }
        },
    }

    Ok(())
}
