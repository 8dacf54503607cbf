use crate::crawl::frontier::SharedFrontier;
use crate::crawl::record::{TransformError, canonicalize_log};
use crate::gateway::Gateway;
use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

/// Everything a worker touches. Shared by the pool and the controller.
pub struct CrawlContext {
    pub gateway: Arc<dyn Gateway>,
    pub store: Arc<dyn Store>,
    pub frontier: SharedFrontier,
    pub cutoff: DateTime<Utc>,
}

#[derive(Debug)]
pub enum PlayerError {
    Transform(TransformError),
    Store(StoreError),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::Transform(e) => write!(f, "malformed battle log: {e}"),
            PlayerError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl From<TransformError> for PlayerError {
    fn from(e: TransformError) -> Self {
        PlayerError::Transform(e)
    }
}

impl From<StoreError> for PlayerError {
    fn from(e: StoreError) -> Self {
        PlayerError::Store(e)
    }
}

/// Result of crawling one player.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlayerReport {
    pub records: usize,
    pub inserted: u64,
    pub discovered: Vec<String>,
}

/// Fetch one player's log, fold it into the frontier, and store the rows as one batch.
pub async fn process_player(ctx: &CrawlContext, tag: &str) -> Result<PlayerReport, PlayerError> {
    let entries = ctx.gateway.battlelog(tag).await;
    let battles = canonicalize_log(&entries, tag, ctx.cutoff)?;
    let absorbed = ctx.frontier.absorb(battles).await;

    let inserted = if absorbed.records.is_empty() {
        0
    } else {
        ctx.store.insert_batch(&absorbed.records).await?
    };
    Ok(PlayerReport {
        records: absorbed.records.len(),
        inserted,
        discovered: absorbed.discovered,
    })
}

async fn worker(id: usize, ctx: Arc<CrawlContext>) {
    debug!("worker {id} started");
    while let Some(tag) = ctx.frontier.next_player().await {
        match process_player(&ctx, &tag).await {
            Ok(report) => {
                let (players, queued, matches) = {
                    let state = ctx.frontier.lock().await;
                    (state.processed_players(), state.queued(), state.known_matches())
                };
                info!(
                    "Processed player {tag}: rows={}, new_players={}, players={players}, queued={queued}, matches={matches}",
                    report.inserted,
                    report.discovered.len()
                );
            }
            Err(e) => error!("Error processing player {tag}: {e}"),
        }
        ctx.frontier.finish().await;
    }
    debug!("worker {id} found the frontier drained");
}

/// A fixed set of workers draining one shared frontier.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(size: usize, ctx: &Arc<CrawlContext>) -> Self {
        let handles = (0..size)
            .map(|id| tokio::spawn(worker(id, Arc::clone(ctx))))
            .collect();
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// True once every worker has left its loop.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Abort every worker and wait until they are gone. Work in flight is dropped.
    /// Returns the first worker panic, if any.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        for handle in &self.handles {
            handle.abort();
        }
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(Result::err)
            .find(JoinError::is_panic)
            .map_or(Ok(()), Err)
    }
}
