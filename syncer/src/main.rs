//! Incremental syncer binary.
//!
//! Loads the configuration, initializes tracing and copies the rows changed since the last
//! watermark from the operational Postgres database into the warehouse, once or on a schedule.

use clap::Parser;
use config::load_config;
use config::shared::SyncerConfig;
use telemetry::tracing::init_tracing;
use tracing::{error, warn};

use crate::core::start_syncer;
use crate::error::SyncerResult;

mod core;
mod error;
mod migrations;

/// Copies changed operational rows into the warehouse.
#[derive(Parser, Debug)]
#[command(name = "syncer")]
#[command(about = "Copies changed operational rows into the warehouse")]
struct Args {
    /// Perform a single run and exit, even when a schedule is configured
    #[arg(long)]
    once: bool,
}

/// Installs aws-lc-rs as the rustls provider, since feature unification can enable more than one.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("a rustls crypto provider was already installed");
    }
}

fn main() -> SyncerResult<()> {
    let args = Args::parse();

    let config = load_config::<SyncerConfig>()?;
    config.validate()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    install_crypto_provider();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config, args.once))
}

async fn async_main(config: SyncerConfig, once: bool) -> SyncerResult<()> {
    if let Err(err) = start_syncer(config, once).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
