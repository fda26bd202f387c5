//! In-memory storage driver for testing.

use super::{SearchFeed, fold_case};
use crate::StorageDriver;
use crate::error::{ErrorKind, Result};
use crate::models::{Payload, SearchHit, StoreRecord};
use async_trait::async_trait;
use dfind_asyncutils::{DEFAULT_CAPACITY, bounded};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// A call that reached the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Insert { key: String, force: bool },
    Search { pattern: String, ignore_case: bool },
    Delete(String),
    Get(String),
}

/// In-memory storage driver for testing.
///
/// Records live in a `BTreeMap` behind a [`RwLock`] and every call is
/// recorded, so tests can assert both on the resulting state and on whether
/// the driver was contacted at all.
///
/// Only built for tests and with the `mock` feature.
///
/// # Examples
///
/// ```ignore
/// use dfind_storage::driver::{Call, MockDriver};
/// use dfind_storage::StorageDriver;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = MockDriver::with_keys(["/etc/hosts"]);
/// driver.delete("/etc/hosts").await.unwrap();
/// assert_eq!(driver.calls(), vec![Call::Delete("/etc/hosts".to_string())]);
/// # Ok(())
/// # }
/// ```
pub struct MockDriver {
    name: String,
    records: RwLock<BTreeMap<String, Payload>>,
    calls: Mutex<Vec<Call>>,
}

impl MockDriver {
    /// Create a mock driver pre-populated with empty-payload records.
    pub fn with_keys(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let records = keys.into_iter().map(|key| (key.into(), Payload::empty())).collect();
        Self {
            name: "mock".to_string(),
            records: RwLock::new(records),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        // A poisoned lock only means another test thread panicked mid-push.
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Snapshot of the stored keys, in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::with_keys(Vec::<String>::new())
    }
}

#[async_trait]
impl StorageDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, key: &str, record: &StoreRecord, force: bool) -> Result<()> {
        self.record(Call::Insert { key: key.to_string(), force });
        if key != record.key {
            exn::bail!(ErrorKind::KeyMismatch { key: key.to_string(), record: record.key.clone() });
        }
        let mut records = self.records.write().await;
        if records.contains_key(key) && !force {
            exn::bail!(ErrorKind::AlreadyExists(key.to_string()));
        }
        records.insert(key.to_string(), record.payload.clone());
        Ok(())
    }

    async fn search(&self, pattern: &str, ignore_case: bool, _search_content: bool) -> Result<SearchFeed> {
        self.record(Call::Search { pattern: pattern.to_string(), ignore_case });
        let needle = fold_case(pattern, ignore_case);
        // Snapshot under the read lock, then drop it before handing over to
        // the worker.
        let hits: Vec<SearchHit> = {
            let guard = self.records.read().await;
            guard.keys().filter(|key| fold_case(key, ignore_case).contains(&needle)).map(SearchHit::new).collect()
        };
        let (producer, feed) = bounded(DEFAULT_CAPACITY);
        tokio::spawn(async move {
            for hit in hits {
                if !producer.send(Ok(hit)).await {
                    break;
                }
            }
        });
        Ok(feed)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.record(Call::Delete(key.to_string()));
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoreRecord>> {
        self.record(Call::Get(key.to_string()));
        let records = self.records.read().await;
        Ok(records.get(key).map(|payload| StoreRecord::new(key).with_payload(payload.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let driver = MockDriver::default();
        driver.insert("/a/b.txt", &StoreRecord::new("/a/b.txt"), false).await.unwrap();
        assert_eq!(driver.get("/a/b.txt").await.unwrap(), Some(StoreRecord::new("/a/b.txt")));
        let err = driver.insert("/a/b.txt", &StoreRecord::new("/a/b.txt"), false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_search_matches_substrings() {
        let driver = MockDriver::with_keys(["/A/B.TXT", "/c/d"]);
        let hits = driver.search_all("b", true, false).await.unwrap();
        assert_eq!(hits, vec![SearchHit::new("/A/B.TXT")]);
        assert!(driver.search_all("b", false, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let driver = MockDriver::default().with_name("recorder");
        assert_eq!(driver.name(), "recorder");
        driver.delete("/x").await.unwrap();
        driver.get("/x").await.unwrap();
        assert_eq!(driver.calls(), vec![Call::Delete("/x".to_string()), Call::Get("/x".to_string())]);
    }
}
