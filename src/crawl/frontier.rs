use crate::crawl::record::{CanonicalBattle, MatchRecord};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// How long an idle worker waits before re-checking the queue on its own.
const IDLE_RECHECK: Duration = Duration::from_millis(250);

/// Crawl state: pending players, players queued this cycle, and every match
/// id emitted since startup.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    /// Reset every cycle so a player can be revisited once their log has moved on.
    cycle_players: HashSet<String>,
    /// Never reset; seeded from storage at startup.
    seen_matches: HashSet<String>,
}

/// Output of folding a player's canonical battles into the frontier.
#[derive(Debug, Default)]
pub struct Absorbed {
    pub records: Vec<MatchRecord>,
    pub discovered: Vec<String>,
}

impl Frontier {
    pub fn new(known_matches: HashSet<String>) -> Self {
        Self { seen_matches: known_matches, ..Default::default() }
    }

    /// Start a new cycle: the queue and per-cycle player set hold exactly `seed`.
    pub fn reseed<I: IntoIterator<Item = String>>(&mut self, seed: I) {
        self.queue.clear();
        self.cycle_players.clear();
        for tag in seed {
            self.enqueue(tag);
        }
    }

    /// Queue `tag` unless it was already queued this cycle. Returns whether it was added.
    pub fn enqueue(&mut self, tag: String) -> bool {
        if self.knows_player(&tag) {
            return false;
        }
        self.cycle_players.insert(tag.clone());
        self.queue.push_back(tag);
        true
    }

    pub fn dequeue(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Returns true if `match_id` had not been seen before.
    pub fn record_match(&mut self, match_id: &str) -> bool {
        if self.seen_matches.contains(match_id) {
            return false;
        }
        self.seen_matches.insert(match_id.to_owned())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Distinct players queued during the current cycle.
    pub fn processed_players(&self) -> usize {
        self.cycle_players.len()
    }

    pub fn known_matches(&self) -> usize {
        self.seen_matches.len()
    }

    pub fn knows_player(&self, tag: &str) -> bool {
        self.cycle_players.contains(tag)
    }

    /// Keep battles not seen before, emit their rows, and queue any participant
    /// new to this cycle.
    pub fn absorb(&mut self, battles: Vec<CanonicalBattle>) -> Absorbed {
        let mut out = Absorbed::default();
        for battle in battles {
            if !self.record_match(&battle.match_id) {
                continue;
            }
            for p in battle.participants() {
                if self.enqueue(p.tag.clone()) {
                    out.discovered.push(p.tag.clone());
                }
            }
            out.records.extend(battle.into_records());
        }
        out
    }
}

/// The frontier shared by every worker of the pool.
#[derive(Debug, Default)]
pub struct SharedFrontier {
    state: Mutex<Frontier>,
    in_flight: Mutex<usize>,
    wake: Notify,
}

impl SharedFrontier {
    pub fn new(frontier: Frontier) -> Self {
        Self { state: Mutex::new(frontier), ..Default::default() }
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Frontier> {
        self.state.lock().await
    }

    /// Reseed for a new cycle. Workers of the previous cycle must be gone.
    pub async fn reseed(&self, seed: Vec<String>) {
        *self.in_flight.lock().await = 0;
        self.state.lock().await.reseed(seed);
        self.wake.notify_waiters();
    }

    /// Next player to crawl, waiting while other workers may still discover more.
    ///
    /// Returns `None` once the queue is empty and nobody is in flight, since
    /// nothing can be enqueued after that. Every `Some` must be paired with
    /// [`SharedFrontier::finish`].
    pub async fn next_player(&self) -> Option<String> {
        loop {
            let notified = self.wake.notified();
            {
                let mut in_flight = self.in_flight.lock().await;
                let mut state = self.state.lock().await;
                if let Some(tag) = state.dequeue() {
                    *in_flight += 1;
                    return Some(tag);
                }
                if *in_flight == 0 {
                    return None;
                }
            }
            let _ = tokio::time::timeout(IDLE_RECHECK, notified).await;
        }
    }

    /// Mark one dequeued player as done and wake idle workers.
    pub async fn finish(&self) {
        let mut in_flight = self.in_flight.lock().await;
        *in_flight = in_flight.saturating_sub(1);
        drop(in_flight);
        self.wake.notify_waiters();
    }

    /// Fold a player's battles in and wake workers if anything was queued.
    pub async fn absorb(&self, battles: Vec<CanonicalBattle>) -> Absorbed {
        let absorbed = self.state.lock().await.absorb(battles);
        if !absorbed.discovered.is_empty() {
            self.wake.notify_waiters();
        }
        absorbed
    }

    pub async fn processed_players(&self) -> usize {
        self.state.lock().await.processed_players()
    }

    pub async fn known_matches(&self) -> usize {
        self.state.lock().await.known_matches()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::record::canonicalize;
    use crate::crawl::record::tests::{T, cutoff, ranked_3v3};
    use std::sync::Arc;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn enqueue_skips_players_already_seen_this_cycle() {
        let mut f = Frontier::default();
        assert!(f.enqueue("#A".into()));
        assert!(!f.enqueue("#A".into()));
        assert_eq!(f.dequeue().as_deref(), Some("#A"));
        // still known after leaving the queue
        assert!(!f.enqueue("#A".into()));
        assert_eq!(f.dequeue(), None);
    }

    #[test]
    fn queue_is_fifo() {
        let mut f = Frontier::default();
        f.reseed(tags(&["#A", "#B", "#C"]));
        assert_eq!(f.dequeue().as_deref(), Some("#A"));
        assert_eq!(f.dequeue().as_deref(), Some("#B"));
        assert_eq!(f.queued(), 1);
    }

    #[test]
    fn record_match_reports_first_insert_only() {
        let mut f = Frontier::new(HashSet::from(["old".to_string()]));
        assert!(!f.record_match("old"));
        assert!(f.record_match("new"));
        assert!(!f.record_match("new"));
        assert_eq!(f.known_matches(), 2);
    }

    #[test]
    fn reseed_resets_players_but_keeps_matches() {
        let mut f = Frontier::default();
        f.reseed(tags(&["#A"]));
        f.enqueue("#X".into());
        f.record_match("m1");

        f.reseed(tags(&["#B", "#B", "#C"]));
        assert_eq!(f.processed_players(), 2);
        assert!(!f.knows_player("#A"));
        assert!(!f.knows_player("#X"));
        assert_eq!(f.queued(), 2);
        assert!(!f.record_match("m1"));
    }

    #[test]
    fn absorb_reports_new_teammates_and_opponents() {
        let mut f = Frontier::default();
        f.reseed(tags(&["#A"]));
        let battle = canonicalize(&ranked_3v3(T, "victory"), "#A", cutoff()).unwrap().unwrap();

        let out = f.absorb(vec![battle]);
        assert_eq!(out.records.len(), 6);
        let mut discovered = out.discovered.clone();
        discovered.sort();
        assert_eq!(discovered, tags(&["#B", "#C", "#D", "#E", "#F"]));
        assert_eq!(f.processed_players(), 6);
    }

    #[test]
    fn absorb_only_reports_players_not_yet_known() {
        let mut f = Frontier::default();
        f.reseed(tags(&["#A", "#B", "#C"]));
        let battle = canonicalize(&ranked_3v3(T, "victory"), "#A", cutoff()).unwrap().unwrap();

        let mut discovered = f.absorb(vec![battle]).discovered;
        discovered.sort();
        assert_eq!(discovered, tags(&["#D", "#E", "#F"]));
    }

    #[test]
    fn second_observation_of_a_match_is_dropped() {
        let mut f = Frontier::default();
        f.reseed(tags(&["#A"]));
        let from_a = canonicalize(&ranked_3v3(T, "victory"), "#A", cutoff()).unwrap().unwrap();
        let from_d = canonicalize(&ranked_3v3(T, "defeat"), "#D", cutoff()).unwrap().unwrap();

        assert_eq!(f.absorb(vec![from_a]).records.len(), 6);
        let again = f.absorb(vec![from_d]);
        assert!(again.records.is_empty());
        assert!(again.discovered.is_empty());
    }

    #[tokio::test]
    async fn next_player_returns_none_when_drained_and_idle() {
        let shared = SharedFrontier::default();
        shared.reseed(tags(&["#A"])).await;
        assert_eq!(shared.next_player().await.as_deref(), Some("#A"));
        shared.finish().await;
        assert_eq!(shared.next_player().await, None);
    }

    #[tokio::test]
    async fn idle_worker_waits_for_in_flight_discoveries() {
        let shared = Arc::new(SharedFrontier::default());
        shared.reseed(tags(&["#A"])).await;
        let first = shared.next_player().await;
        assert_eq!(first.as_deref(), Some("#A"));

        let waiter = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.next_player().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let battle = canonicalize(&ranked_3v3(T, "victory"), "#A", cutoff()).unwrap().unwrap();
        shared.absorb(vec![battle]).await;
        shared.finish().await;

        let next = waiter.await.unwrap();
        assert!(next.is_some());
    }
}
