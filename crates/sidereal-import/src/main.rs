//! Sidereal import binary.
//!
//! Uploads a disk image and registers it as a compute template.

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sidereal_import::{Artifact, ImportConfig, Importer, Producer};

#[derive(Parser, Debug)]
#[command(name = "sidereal-import")]
#[command(about = "Import a disk image as a compute template")]
#[command(version)]
struct Cli {
    /// Disk image to import.
    image: PathBuf,

    /// Identifier of the builder that produced the image.
    #[arg(short, long, default_value = Producer::FILE_BUILDER_ID)]
    builder: String,

    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => ImportConfig::from_file(path)?,
        None => ImportConfig::load()?,
    };

    info!(
        zone = %config.zone,
        bucket = %config.storage.bucket,
        template = %config.template.name,
        "configuration loaded"
    );

    let importer = Importer::from_config(config)?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling import");
        cancel_on_signal.cancel();
    });

    let artifact = Artifact::new(cli.builder, vec![cli.image]);

    match importer.import(artifact, &cancel).await {
        Ok(template) => {
            info!(artifact_id = %template.artifact_id(), "{template}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Import failed");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
