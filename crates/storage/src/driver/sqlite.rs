//! SQLite storage driver.
//!
//! One table maps each key (original case) to its lowercase projection and
//! payload, with a secondary index on the lowercase column for
//! case-insensitive lookups:
//!
//! ```sql
//! TABLE files (key TEXT NOT NULL PRIMARY KEY, lc_key TEXT NOT NULL, payload TEXT NOT NULL)
//! INDEX lc_key_idx ON files (lc_key)
//! ```

use crate::driver::{SearchFeed, StorageDriver, fold_case};
use crate::error::{ErrorKind, Result};
use crate::models::{Payload, SearchHit, StoreRecord};
use async_trait::async_trait;
use dfind_asyncutils::{DEFAULT_CAPACITY, Producer, bounded};
use exn::ResultExt;
use futures::TryStreamExt;
use sqlx::SqliteConnection;
use sqlx::pool::{PoolConnection, PoolConnectionMetadata};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Name of the database file inside the data directory.
pub const DATABASE_FILENAME: &str = "dfind.sq3";
const TABLE: &str = "files";
const INDEX: &str = "lc_key_idx";
// Scans write from a single task, searches read from a handful.
const MAX_CONNECTIONS: u32 = 4;

/// Where a database is in its schema lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    /// No `files` table.
    Unprovisioned,
    /// The table exists but its index does not: provisioning was interrupted
    /// or is in progress.
    Provisioning,
    /// Table and index both exist.
    Provisioned,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    key: String,
    payload: String,
}

impl TryFrom<RecordRow> for StoreRecord {
    type Error = crate::error::Error;
    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(StoreRecord::new(row.key).with_payload(Payload::decode(&row.payload)?))
    }
}

/// SQLite-backed [`StorageDriver`].
///
/// # Examples
///
/// ```no_run
/// use dfind_storage::driver::SqliteDriver;
///
/// # async fn example() -> dfind_storage::error::Result<()> {
/// let driver = SqliteDriver::open("/var/lib/dfind").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    location: PathBuf,
    pool: SqlitePool,
}

impl SqliteDriver {
    async fn new(location: PathBuf, options: SqliteConnectOptions, pool_options: SqlitePoolOptions) -> Result<Self> {
        let pool = pool_options
            // Applies the query-based PRAGMAs to every pooled connection,
            // not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Setup(location.clone()))?;
        let driver = Self { location, pool };
        if let Err(err) = driver.provision().await {
            driver.pool.close().await;
            return Err(err.raise(ErrorKind::Setup(driver.location.clone())));
        }
        Ok(driver)
    }

    /// Open (creating if necessary) the database in `data_dir` and make sure
    /// its schema is provisioned.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let location = data_dir.as_ref().join(DATABASE_FILENAME);
        let options = Self::base_options().filename(&location).create_if_missing(true);
        let pool_options = SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS);
        Self::new(location, options, pool_options).await
    }

    /// Open a private in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every connection to ":memory:" is a different database, so the
        // pool is pinned to a single connection that is never reaped.
        let pool_options =
            SqlitePoolOptions::new().max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None);
        Self::new(PathBuf::from(":memory:"), options, pool_options).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // A scan inserts from one task while searches may read; WAL lets
            // them coexist but checkpoints can still briefly lock.
            .busy_timeout(Duration::from_millis(1500))
    }

    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Path of the database file (`:memory:` for in-memory databases).
    pub fn location(&self) -> &Path {
        &self.location
    }

    async fn schema_object_exists(&self, kind: &str, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/schema_object_exists.sql"))
            .bind(kind)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Provision)?;
        Ok(count > 0)
    }

    /// Inspect the schema without changing it.
    pub async fn provision_state(&self) -> Result<ProvisionState> {
        let table = self.schema_object_exists("table", TABLE).await?;
        let index = self.schema_object_exists("index", INDEX).await?;
        Ok(match (table, index) {
            (false, _) => ProvisionState::Unprovisioned,
            (true, false) => ProvisionState::Provisioning,
            (true, true) => ProvisionState::Provisioned,
        })
    }

    /// Create the table and index if they don't exist yet.
    ///
    /// Safe to call on every open: a provisioned database is left alone and
    /// a partially provisioned one is completed.
    #[instrument("provisioning store", skip(self), fields(location = %self.location.display()))]
    pub async fn provision(&self) -> Result<ProvisionState> {
        let state = self.provision_state().await?;
        if state == ProvisionState::Provisioned {
            return Ok(state);
        }
        tracing::info!(?state, "Provisioning schema");
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Provision)?;
        sqlx::query(include_str!("../../queries/provision.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Provision)?;
        tx.commit().await.or_raise(|| ErrorKind::Provision)?;
        match self.provision_state().await? {
            ProvisionState::Provisioned => Ok(ProvisionState::Provisioned),
            _ => exn::bail!(ErrorKind::Provision),
        }
    }

    /// Number of records in the store.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("record count"))
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool, waiting for every connection to be
    /// returned first. The driver should not be used afterwards.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    async fn stream_hits(
        mut conn: PoolConnection<Sqlite>,
        query: &'static str,
        glob: String,
        producer: Producer<Result<SearchHit>>,
    ) {
        let mut rows = sqlx::query_scalar::<_, String>(query).bind(glob).fetch(&mut *conn);
        loop {
            let next = tokio::select! {
                biased;
                _ = producer.cancelled() => break,
                row = rows.try_next() => row,
            };
            match next {
                Ok(Some(key)) => {
                    if !producer.send(Ok(SearchHit::new(key))).await {
                        break;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Search failed part-way through");
                    let err: Result<SearchHit> = Err(err).or_raise(|| ErrorKind::Query);
                    producer.send(err).await;
                    break;
                },
            }
        }
        producer.close();
    }
}

/// Escape GLOB metacharacters and wrap the pattern for a substring match.
fn substring_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len() + 2);
    glob.push('*');
    for c in pattern.chars() {
        match c {
            '*' | '?' | '[' => {
                glob.push('[');
                glob.push(c);
                glob.push(']');
            },
            _ => glob.push(c),
        }
    }
    glob.push('*');
    glob
}

#[async_trait]
impl StorageDriver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, key: &str, record: &StoreRecord, force: bool) -> Result<()> {
        if key != record.key {
            exn::bail!(ErrorKind::KeyMismatch { key: key.to_string(), record: record.key.clone() });
        }
        let payload = record.payload.encode()?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let exists: i64 = sqlx::query_scalar(include_str!("../../queries/key_exists.sql"))
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let action = match (exists > 0, force) {
            (true, false) => exn::bail!(ErrorKind::AlreadyExists(key.to_string())),
            (true, true) => {
                sqlx::query(include_str!("../../queries/delete_by_key.sql"))
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                "update"
            },
            (false, _) => "insert",
        };
        sqlx::query(include_str!("../../queries/insert.sql"))
            .bind(key)
            .bind(record.lc_key())
            .bind(payload)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(key, action, "Stored record");
        Ok(())
    }

    async fn search(&self, pattern: &str, ignore_case: bool, search_content: bool) -> Result<SearchFeed> {
        if search_content {
            tracing::debug!("Content search is not supported; matching keys only");
        }
        let query = match ignore_case {
            true => include_str!("../../queries/search_lc_key.sql"),
            false => include_str!("../../queries/search_key.sql"),
        };
        let glob = substring_glob(&fold_case(pattern, ignore_case));
        // Acquire up front so that "cannot even start" is reported to the
        // caller rather than on the feed.
        let conn = self.pool.acquire().await.or_raise(|| ErrorKind::Query)?;
        let (producer, feed) = bounded(DEFAULT_CAPACITY);
        tracing::debug!(%glob, ignore_case, "Starting search");
        tokio::spawn(Self::stream_hits(conn, query, glob, producer));
        Ok(feed)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let result = sqlx::query(include_str!("../../queries/delete_by_key.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(key, deleted = result.rows_affected(), "Deleted record");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoreRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../../queries/get_by_key.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(StoreRecord::try_from).transpose()
    }
}
