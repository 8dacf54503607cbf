use crate::config::DbSettings;
use crate::crawl::record::MatchRecord;
use async_trait::async_trait;
use log::info;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Rows per INSERT; 18 binds each keeps well under Postgres' 65535 parameter cap.
const INSERT_CHUNK: usize = 1000;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS battles (
        battle_id TEXT,
        battle_time TEXT,
        game_mode TEXT,
        game_map TEXT,
        game_type TEXT,
        brawler TEXT,
        power INTEGER,
        rank INTEGER,
        result TEXT,
        team TEXT,
        team_power TEXT,
        team_rank TEXT,
        opponents TEXT,
        opponents_power TEXT,
        opponents_rank TEXT,
        player_id TEXT,
        team_ids TEXT,
        opponents_ids TEXT,
        PRIMARY KEY (battle_id, player_id)
    )";

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Durable home of match rows, keyed on (match id, player id).
#[async_trait]
pub trait Store: Send + Sync {
    /// Every match id already stored.
    async fn known_match_ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Insert rows, silently skipping keys that already exist. Returns rows written.
    async fn insert_batch(&self, records: &[MatchRecord]) -> Result<u64, StoreError>;
}

/// PostgreSQL store over a bounded connection pool shared by all workers.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(settings: &DbSettings) -> Result<Self, StoreError> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.user)
            .password(&settings.password)
            .ssl_mode(settings.ssl_mode);

        let pool = PgPoolOptions::new()
            .min_connections(settings.pool_min)
            .max_connections(settings.pool_max)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;
        info!(
            "Connected to PostgreSQL at {}:{} (pool {}..{}, sslmode {:?})",
            settings.host, settings.port, settings.pool_min, settings.pool_max, settings.ssl_mode
        );

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn known_match_ids(&self) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT DISTINCT battle_id FROM battles")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn insert_batch(&self, records: &[MatchRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO battles (battle_id, battle_time, game_mode, game_map, game_type, \
                 brawler, power, rank, result, team, team_power, team_rank, opponents, \
                 opponents_power, opponents_rank, player_id, team_ids, opponents_ids) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(&r.match_id)
                    .push_bind(&r.battle_time)
                    .push_bind(&r.game_mode)
                    .push_bind(&r.game_map)
                    .push_bind(&r.game_type)
                    .push_bind(&r.brawler)
                    .push_bind(r.power)
                    .push_bind(r.rank)
                    .push_bind(&r.result)
                    .push_bind(&r.team)
                    .push_bind(&r.team_power)
                    .push_bind(&r.team_rank)
                    .push_bind(&r.opponents)
                    .push_bind(&r.opponents_power)
                    .push_bind(&r.opponents_rank)
                    .push_bind(&r.player_id)
                    .push_bind(&r.team_ids)
                    .push_bind(&r.opponents_ids);
            });
            qb.push(" ON CONFLICT (battle_id, player_id) DO NOTHING");

            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// In-memory store with the same conflict-skipping semantics as [`PgStore`].
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        rows: Mutex<BTreeMap<(String, String), MatchRecord>>,
        batches: AtomicUsize,
        pub fail: AtomicBool,
    }

    impl MemoryStore {
        pub fn with_rows(records: Vec<MatchRecord>) -> Self {
            let rows = records
                .into_iter()
                .map(|r| ((r.match_id.clone(), r.player_id.clone()), r))
                .collect();
            Self { rows: Mutex::new(rows), ..Default::default() }
        }

        pub async fn rows(&self) -> Vec<MatchRecord> {
            self.rows.lock().await.values().cloned().collect()
        }

        pub fn batches(&self) -> usize {
            self.batches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn known_match_ids(&self) -> Result<HashSet<String>, StoreError> {
            Ok(self.rows.lock().await.keys().map(|(m, _)| m.clone()).collect())
        }

        async fn insert_batch(&self, records: &[MatchRecord]) -> Result<u64, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.batches.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().await;
            let mut inserted = 0;
            for r in records {
                let key = (r.match_id.clone(), r.player_id.clone());
                if !rows.contains_key(&key) {
                    rows.insert(key, r.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }

    #[tokio::test]
    async fn inserting_the_same_batch_twice_is_a_no_op() {
        use crate::crawl::record::canonicalize;
        use crate::crawl::record::tests::{T, cutoff, ranked_3v3};

        let records = canonicalize(&ranked_3v3(T, "victory"), "#A", cutoff())
            .unwrap()
            .unwrap()
            .into_records();
        let store = MemoryStore::default();

        assert_eq!(store.insert_batch(&records).await.unwrap(), 6);
        assert_eq!(store.insert_batch(&records).await.unwrap(), 0);
        assert_eq!(store.rows().await.len(), 6);
        assert_eq!(store.known_match_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_rows_keep_the_original() {
        let first = MatchRecord {
            match_id: "m".into(),
            player_id: "#A".into(),
            result: "victory".into(),
            ..Default::default()
        };
        let second = MatchRecord { result: "defeat".into(), ..first.clone() };
        let store = MemoryStore::with_rows(vec![first]);

        assert_eq!(store.insert_batch(&[second]).await.unwrap(), 0);
        assert_eq!(store.rows().await[0].result, "victory");
    }
}
