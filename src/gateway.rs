use async_trait::async_trait;
use brawl_api::BattleLogEntry;
use brawl_api::client::BrawlApi;
use log::error;

/// What the crawler needs from the game API. Failures are logged and read as
/// "nothing new from this source this round".
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn top_players(&self) -> Vec<String>;
    async fn battlelog(&self, tag: &str) -> Vec<BattleLogEntry>;
}

#[async_trait]
impl Gateway for BrawlApi {
    async fn top_players(&self) -> Vec<String> {
        match self.fetch_top_players().await {
            Ok(players) => players.into_iter().map(|p| p.tag).collect(),
            Err(e) => {
                error!("Failed to fetch top players: {e}");
                Vec::new()
            }
        }
    }

    async fn battlelog(&self, tag: &str) -> Vec<BattleLogEntry> {
        match self.fetch_battlelog(tag).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to fetch battle log for {tag}: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned top players and battle logs; unknown players have an empty log.
    #[derive(Debug, Default)]
    pub struct FakeGateway {
        pub top: Vec<String>,
        pub logs: HashMap<String, Vec<BattleLogEntry>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        pub fn new(top: &[&str]) -> Self {
            Self { top: top.iter().map(|s| s.to_string()).collect(), ..Default::default() }
        }

        pub fn with_log(mut self, tag: &str, entries: Vec<BattleLogEntry>) -> Self {
            self.logs.insert(tag.to_owned(), entries);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn top_players(&self) -> Vec<String> {
            self.top.clone()
        }

        async fn battlelog(&self, tag: &str) -> Vec<BattleLogEntry> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(tag.to_owned());
            }
            self.logs.get(tag).cloned().unwrap_or_default()
        }
    }
}
