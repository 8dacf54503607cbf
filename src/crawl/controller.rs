use crate::config::CrawlSettings;
use crate::crawl::pool::{CrawlContext, WorkerPool};
use log::{error, info};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Seeding,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Enough players were reached; workers were cancelled.
    ThresholdReached,
    /// Every worker ran out of players before the threshold.
    Exhausted,
}

#[derive(Debug)]
pub enum CycleError {
    EmptySeed,
    WorkerPanicked(String),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::EmptySeed => write!(f, "top player ranking came back empty"),
            CycleError::WorkerPanicked(msg) => write!(f, "crawl worker panicked: {msg}"),
        }
    }
}

impl std::error::Error for CycleError {}

/// Exponential delay between failed cycles.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, next: initial }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.max);
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Runs crawl cycles forever: seed from the top players, drain until the
/// per-cycle player threshold, cancel, repeat.
pub struct Controller {
    ctx: Arc<CrawlContext>,
    settings: CrawlSettings,
    state: CycleState,
    cycles: u64,
}

impl Controller {
    pub fn new(ctx: Arc<CrawlContext>, settings: CrawlSettings) -> Self {
        Self { ctx, settings, state: CycleState::Seeding, cycles: 0 }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// SEEDING: reset the frontier to the current top players.
    pub async fn seed(&mut self) -> Result<usize, CycleError> {
        self.state = CycleState::Seeding;
        info!("Getting top players...");
        let seed = self.ctx.gateway.top_players().await;
        if seed.is_empty() {
            return Err(CycleError::EmptySeed);
        }

        self.ctx.frontier.reseed(seed).await;
        let seeded = self.ctx.frontier.processed_players().await;
        info!("Seeded frontier with {seeded} players");
        self.state = CycleState::Draining;
        Ok(seeded)
    }

    /// DRAINING: run the pool until the threshold is met or the frontier runs dry.
    pub async fn drain(&mut self) -> Result<CycleOutcome, CycleError> {
        let pool = WorkerPool::spawn(self.settings.workers, &self.ctx);
        info!(
            "Started {} workers, waiting for {} players",
            pool.size(),
            self.settings.player_threshold
        );

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick so every cycle drains for at least one interval.
        ticker.tick().await;
        let outcome = loop {
            ticker.tick().await;
            if self.ctx.frontier.processed_players().await >= self.settings.player_threshold {
                break CycleOutcome::ThresholdReached;
            }
            if pool.is_finished() {
                break CycleOutcome::Exhausted;
            }
        };

        info!("Cancelling workers ({outcome:?})");
        pool.shutdown()
            .await
            .map_err(|e| CycleError::WorkerPanicked(e.to_string()))?;
        self.state = CycleState::Seeding;
        Ok(outcome)
    }

    /// One SEEDING -> DRAINING pass.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.seed().await?;
        let outcome = self.drain().await?;
        self.cycles += 1;
        Ok(outcome)
    }

    /// Never returns; failed cycles are retried after a growing delay.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        loop {
            match self.run_cycle().await {
                Ok(outcome) => {
                    backoff.reset();
                    info!(
                        "Finished cycle {} ({outcome:?}). Total matches: {}",
                        self.cycles(),
                        self.ctx.frontier.known_matches().await
                    );
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        "Crawl cycle failed while {:?}: {e}; retrying in {delay:?}",
                        self.state()
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
