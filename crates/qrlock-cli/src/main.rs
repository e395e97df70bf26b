//! QR Locker CLI - seal short messages into password-protected QR codes

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrlock_cli::{run, Cli, ClientError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Quiet by default; RUST_LOG=qrlock_daemon=debug for detail
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => Ok(()),
        Err(ClientError::Rejected { status, message }) => {
            eprintln!("Error: {}", message);
            std::process::exit(if status >= 500 { 2 } else { 1 });
        }
        Err(e) => Err(e.into()),
    }
}
