use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use surveil::config::{DashboardConfig, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "surveil",
    about = "Live detection dashboard for a camera surveillance backend",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (overrides SURVEIL_CONFIG and ./surveil.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Detection backend base URL (overrides server.base_url)
    #[arg(long, global = true, env = "SURVEIL_SERVER")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dashboard session until Ctrl-C
    Watch {
        /// Do not mount snapshot tiles
        #[arg(long)]
        no_tiles: bool,

        /// Serve the read-only API on this address
        #[arg(long)]
        api: Option<String>,
    },

    /// Fetch and print the camera roster
    Cameras {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Fetch one snapshot frame and write it to a file
    Snapshot {
        /// Camera identifier
        #[arg(long)]
        camera: String,

        /// Output file path
        #[arg(long, default_value = "snapshot.jpg")]
        output: PathBuf,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config decides the real subscriber, so anything logged while resolving
    // it goes through a stderr bootstrap subscriber.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        DashboardConfig::resolve(cli.config.as_deref())
    })?;
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Watch { no_tiles, api } => {
            if let Some(bind) = api {
                config.api.enabled = true;
                config.api.bind = bind;
            }
            tracing::info!(server = %config.server.base_url, "starting dashboard session");
            surveil::watch(config, !no_tiles).await?;
        }
        Commands::Cameras { json } => {
            let client = reqwest::Client::builder()
                .timeout(config.server.request_timeout())
                .build()?;
            let cameras =
                surveil::roster::try_fetch_roster(&client, &config.server.base_url).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cameras)?);
            } else if cameras.is_empty() {
                println!("No cameras registered.");
            } else {
                println!("{:<10} | {:<20} | {:<20} | Status", "ID", "Name", "Location");
                println!("{:-<10}-|-{:-<20}-|-{:-<20}-|-{:-<7}", "", "", "", "");
                for camera in cameras {
                    println!(
                        "{:<10} | {:<20} | {:<20} | {}",
                        camera.id, camera.name, camera.location, camera.status
                    );
                }
            }
        }
        Commands::Snapshot { camera, output } => {
            let format = surveil::save_snapshot(&config, &camera, &output).await?;
            println!("Saved {} ({}) to {}", camera, format.mime(), output.display());
        }
    }

    Ok(())
}
