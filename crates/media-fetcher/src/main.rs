use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use media_fetcher::{PORT, logging, serve};

#[derive(Parser, Debug)]
#[command(
    name = "media-fetcher",
    version,
    about = "Download announcement images into a local directory."
)]
struct Cli {
    /// Directory the downloaded images are written to.
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(err) = try_main().await {
        error!(error = ?err, "media-fetcher exited with error");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, PORT));
    info!(directory = %cli.directory.display(), "starting media-fetcher");

    serve(cli.directory, addr, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler failed: {err}");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received; shutting down");
}
