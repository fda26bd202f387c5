//! Storage driver trait and implementations.
//!
//! This module defines the `StorageDriver` trait, the capability set every
//! storage backend must provide: insert, delete and streamed search over
//! string keys.
//!

#[cfg(any(test, feature = "mock"))]
mod mock;
mod sqlite;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Call, MockDriver};
pub use self::sqlite::{DATABASE_FILENAME, ProvisionState, SqliteDriver};
use crate::error::Result;
use crate::models::{SearchHit, StoreRecord, lowercase};
use async_trait::async_trait;
use dfind_asyncutils::Feed;
use futures::TryStreamExt;

/// Stream of search results. Each item is either a hit or the failure that
/// ended the query; the end of the stream is the completion signal.
pub type SearchFeed = Feed<Result<SearchHit>>;

/// Unified interface for storage drivers.
///
/// Keys are full filesystem paths and must be unique within a store.
///
/// # Examples
///
/// ```
/// use dfind_storage::{StorageDriver, StoreRecord, error::Result};
///
/// async fn remember(driver: &dyn StorageDriver, path: &str) -> Result<()> {
///     driver.insert(path, &StoreRecord::new(path), true).await
/// }
/// ```
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Name of the driver, used for logging only.
    fn name(&self) -> &str;

    /// Insert `record` under `key`.
    ///
    /// Returns [`KeyMismatch`](crate::error::ErrorKind::KeyMismatch) if `key`
    /// is not `record.key`. If a record already exists under `key`:
    /// - without `force`, returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
    ///   and leaves the store unchanged;
    /// - with `force`, replaces it, leaving exactly one record for `key`.
    async fn insert(&self, key: &str, record: &StoreRecord, force: bool) -> Result<()>;

    /// Start a substring search over all keys.
    ///
    /// Returns as soon as the query is running; hits arrive on the returned
    /// [`SearchFeed`]. Fails immediately if the query cannot be started.
    /// `search_content` is reserved for content search: drivers that do not
    /// support it accept and ignore it.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use dfind_storage::{StorageDriver, error::Result};
    /// # async fn example(driver: &dyn StorageDriver) -> Result<()> {
    /// let mut hits = driver.search("report", true, false).await?;
    /// while let Some(hit) = hits.try_next().await? {
    ///     println!("{}", hit.key);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn search(&self, pattern: &str, ignore_case: bool, search_content: bool) -> Result<SearchFeed>;

    /// Run a search to completion and collect every hit.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`search()`](Self::search) into a [`Vec`] before returning.
    async fn search_all(&self, pattern: &str, ignore_case: bool, search_content: bool) -> Result<Vec<SearchHit>> {
        self.search(pattern, ignore_case, search_content).await?.try_collect().await
    }

    /// Remove the record for `key`. Removing a key that isn't there is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Fetch the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<StoreRecord>>;
}

/// Lowercase a search pattern the same way keys are lowercased on insert.
pub(crate) fn fold_case(pattern: &str, ignore_case: bool) -> String {
    match ignore_case {
        true => lowercase(pattern),
        false => pattern.to_string(),
    }
}
