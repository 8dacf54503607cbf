mod config;
mod crawl;
mod gateway;
mod store;

use crate::config::Settings;
use crate::crawl::controller::Controller;
use crate::crawl::frontier::{Frontier, SharedFrontier};
use crate::crawl::pool::CrawlContext;
use crate::store::{PgStore, Store};
use anyhow::Context;
use brawl_api::client::BrawlApi;
use log::info;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if handle_cli_args() {
        return Ok(());
    }

    setup_logging();

    let settings = Settings::load().context("invalid configuration")?;

    info!("Connecting and initializing database...");
    let store = PgStore::connect(&settings.db)
        .await
        .context("could not connect to PostgreSQL")?;

    info!("Loading known match ids...");
    let known = store
        .known_match_ids()
        .await
        .context("could not load known match ids")?;
    info!("Loaded {} known matches", known.len());

    let ctx = Arc::new(CrawlContext {
        gateway: Arc::new(BrawlApi::with_base_url(
            settings.api.token.clone(),
            settings.api.base_url.clone(),
        )),
        store: Arc::new(store),
        frontier: SharedFrontier::new(Frontier::new(known)),
        cutoff: settings.crawl.cutoff,
    });
    let controller = Controller::new(ctx, settings.crawl.clone());

    tokio::select! {
        _ = controller.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("could not listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Also installs the bridge that forwards `log` records.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn handle_cli_args() -> bool {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        return false;
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            true
        }
        "-V" | "--version" => {
            println!("battlecrawl {}", env!("CARGO_PKG_VERSION"));
            true
        }
        _ => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn usage_text() -> &'static str {
    "battlecrawl - crawl ranked Brawl Stars battles into PostgreSQL

Usage:
  battlecrawl
  battlecrawl --help
  battlecrawl --version

Environment:
  BRAWL_STARS_TOKEN        API token (required)
  BRAWL_STARS_API_URL      API base URL (default https://api.brawlstars.com/v1)
  POSTGRES_HOST, POSTGRES_PORT, POSTGRES_DB,
  POSTGRES_USER, POSTGRES_PASSWORD
                           Database connection (required)
  POSTGRES_POOL_MIN/MAX    Connection pool bounds (default 10/20)
  POSTGRES_SSLMODE         disable, allow, prefer, require, verify-ca or
                           verify-full (default prefer)
  CRAWL_WORKERS            Concurrent workers (default 20)
  CRAWL_PLAYER_THRESHOLD   Players per cycle before restarting (default 500000)
  CRAWL_CUTOFF_DATE        Oldest battle date kept, YYYY-MM-DD (default 2024-11-01)
  CRAWL_POLL_SECS          Threshold check interval (default 5)
  CRAWL_BACKOFF_MAX_SECS   Longest wait after a failed cycle (default 300)
  RUST_LOG                 Log filter (default info)"
}
