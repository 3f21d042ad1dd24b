//! Operator tool for the acceptance harness.
//!
//! Runs the suite-level setup ahead of time, issues registry certificates
//! and removes containers a crashed run left behind.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ta_fixture::{certs, logging, Config, Suite};

/// Acceptance harness operator tool
#[derive(Parser)]
#[command(name = "ta-fixture")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(long, global = true, default_value = ta_fixture::config::CONFIG_FILE)]
    config: PathBuf,

    /// Runtime socket, overriding configuration and DOCKER_HOST
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the shared network and build the CLI image
    Prepare,

    /// Issue a self-signed registry certificate
    IssueCert {
        /// Hostname the certificate is valid for
        #[arg(long)]
        host: String,

        /// Certificate output path
        #[arg(long)]
        cert: PathBuf,

        /// Private key output path
        #[arg(long)]
        key: PathBuf,
    },

    /// Force-remove containers left behind by the harness
    Sweep {
        /// Only remove containers of this scenario
        #[arg(long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.socket.is_some() {
        config.engine.socket = cli.socket;
    }

    match cli.command {
        Commands::Prepare => {
            Suite::prepare(config).await.context("preparing suite")?;
            println!("Suite ready");
        }
        Commands::IssueCert { host, cert, key } => {
            certs::issue(&host, &cert, &key).context("issuing certificate")?;
            println!("Wrote {} and {}", cert.display(), key.display());
        }
        Commands::Sweep { scenario } => {
            let removed = Suite::connect(config)
                .sweep(scenario.as_deref())
                .await
                .context("sweeping containers")?;
            println!("Removed {removed} container(s)");
        }
    }

    Ok(())
}
