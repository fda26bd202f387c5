//! Store facade.
//!
//! A [`Store`] wraps any driver and adds one invariant: a store opened
//! read-only refuses to mutate, and it refuses *before* the driver is
//! called. Reads are always allowed.

use crate::driver::{SearchFeed, SqliteDriver};
use crate::error::{ErrorKind, Result};
use crate::models::{SearchHit, StoreRecord};
use crate::{DriverHandle, StorageDriver};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Driver wrapper enforcing the read-only flag.
///
/// # Examples
///
/// ```no_run
/// use dfind_storage::{StorageDriver, Store, StoreRecord};
///
/// # async fn example() -> dfind_storage::error::Result<()> {
/// let store = Store::open("/var/lib/dfind", false).await?;
/// store.insert("/etc/hosts", &StoreRecord::new("/etc/hosts"), true).await?;
/// let hits = store.search_all("HOSTS", true, false).await?;
/// assert_eq!(hits[0].key, "/etc/hosts");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    driver: DriverHandle,
    sqlite: Option<SqliteDriver>,
    read_only: bool,
}

impl Store {
    pub fn new(driver: DriverHandle, read_only: bool) -> Self {
        Self { driver, sqlite: None, read_only }
    }

    /// Open the SQLite store in `data_dir`, provisioning it if needed.
    pub async fn open(data_dir: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let sqlite = SqliteDriver::open(data_dir).await?;
        tracing::debug!(location = %sqlite.location().display(), read_only, "Opened store");
        Ok(Self {
            driver: Arc::new(sqlite.clone()),
            sqlite: Some(sqlite),
            read_only,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Release the underlying database, if this store opened one.
    pub async fn close(&self) {
        if let Some(sqlite) = &self.sqlite {
            sqlite.close().await;
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            exn::bail!(ErrorKind::ReadOnly);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for Store {
    fn name(&self) -> &str {
        self.driver.name()
    }

    async fn insert(&self, key: &str, record: &StoreRecord, force: bool) -> Result<()> {
        self.ensure_writable()?;
        self.driver.insert(key, record, force).await
    }

    async fn search(&self, pattern: &str, ignore_case: bool, search_content: bool) -> Result<SearchFeed> {
        self.driver.search(pattern, ignore_case, search_content).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_writable()?;
        self.driver.delete(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoreRecord>> {
        self.driver.get(key).await
    }
}

/// Single-shot search.
///
/// Opens a read-only store in `data_dir`, runs one search to completion,
/// closes the store and returns every hit. Use [`Store`] directly for
/// anything more than one search.
pub async fn search(
    data_dir: impl AsRef<Path>,
    pattern: &str,
    ignore_case: bool,
    search_content: bool,
) -> Result<Vec<SearchHit>> {
    let store = Store::open(data_dir, true).await?;
    let hits = store.search_all(pattern, ignore_case, search_content).await;
    store.close().await;
    hits
}
