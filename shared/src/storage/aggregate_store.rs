//! Aggregate storage trait and implementations.
//!
//! Provides the `AggregateStore` trait for keyed view storage with optimistic
//! concurrency, and an `InMemoryAggregateStore` implementation for development
//! and testing.

use crate::models::{Aggregate, DailyAggregate, VersionToken, View};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during aggregate store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A conditional write lost against a concurrent writer.
    #[error("Version conflict on {key}")]
    Conflict {
        /// Key of the contested aggregate.
        key: String,
    },

    /// A key holds a different view kind than the caller expected.
    #[error("Key {key} holds a {found} view, expected {expected}")]
    WrongKind {
        /// Requested key.
        key: String,
        /// Expected view kind.
        expected: &'static str,
        /// Stored view kind.
        found: &'static str,
    },

    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on aggregate store")]
    LockError,

    /// Generic storage error.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl StoreError {
    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Precondition attached to an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Last write wins.
    Unconditional,
    /// Only create; fail if the key already exists.
    MustNotExist,
    /// Only replace the version the caller read.
    Matches(VersionToken),
}

impl WriteCondition {
    /// `Matches` for a loaded aggregate, `MustNotExist` for a fresh one.
    #[must_use]
    pub fn expecting(version: Option<&VersionToken>) -> Self {
        version.map_or(Self::MustNotExist, |v| Self::Matches(v.clone()))
    }
}

/// Opaque continuation position for [`AggregateStore::query_unfinalized_before`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    day_start: DateTime<Utc>,
    key: String,
}

/// One page of unfinalized daily aggregates.
#[derive(Debug, Clone, Default)]
pub struct DailyPage {
    /// Aggregates, oldest day first.
    pub items: Vec<DailyAggregate>,
    /// Cursor for the next page, `None` once exhausted.
    pub next_cursor: Option<PageCursor>,
}

/// Trait for aggregate storage implementations.
///
/// Every loaded aggregate carries the store's current [`VersionToken`]; writes
/// may require that token to still be current.
/// Implementations must be thread-safe (Send + Sync).
pub trait AggregateStore: Send + Sync {
    /// Loads the aggregate stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, key: &str) -> Result<Option<Aggregate>, StoreError>;

    /// Writes `aggregate` under its key if `condition` holds.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the condition does not hold, or another error if
    /// the storage operation fails.
    fn upsert(
        &self,
        aggregate: &Aggregate,
        condition: WriteCondition,
    ) -> Result<VersionToken, StoreError>;

    /// Pages through unfinalized daily aggregates whose day starts before
    /// `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn query_unfinalized_before(
        &self,
        cutoff: DateTime<Utc>,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<DailyPage, StoreError>;

    /// Loads every existing aggregate among `keys`, in the order given.
    /// Missing keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn read_many(&self, keys: &[String]) -> Result<Vec<Aggregate>, StoreError>;
}

/// Typed access on top of [`AggregateStore`].
pub trait AggregateStoreExt: AggregateStore {
    /// Loads a view of a known kind.
    ///
    /// # Errors
    ///
    /// Returns `WrongKind` if the key holds another view, or the underlying
    /// storage error.
    fn get_view<V: View>(&self, key: &str) -> Result<Option<V>, StoreError> {
        self.get(key)?
            .map(|aggregate| {
                V::from_aggregate(aggregate).map_err(|other| StoreError::WrongKind {
                    key: key.to_string(),
                    expected: V::KIND,
                    found: other.kind(),
                })
            })
            .transpose()
    }
}

impl<S: AggregateStore + ?Sized> AggregateStoreExt for S {}

/// In-memory aggregate store implementation.
#[derive(Debug)]
pub struct InMemoryAggregateStore {
    aggregates: Arc<RwLock<HashMap<String, Aggregate>>>,
    next_version: AtomicU64,
}

impl InMemoryAggregateStore {
    /// Creates a new empty in-memory aggregate store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            aggregates: Arc::new(RwLock::new(HashMap::new())),
            next_version: AtomicU64::new(1),
        }
    }

    /// Creates a new in-memory aggregate store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        let aggregates = self
            .aggregates
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(aggregates.len())
    }

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryAggregateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateStore for InMemoryAggregateStore {
    fn get(&self, key: &str) -> Result<Option<Aggregate>, StoreError> {
        let aggregates = self
            .aggregates
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(aggregates.get(key).cloned())
    }

    fn upsert(
        &self,
        aggregate: &Aggregate,
        condition: WriteCondition,
    ) -> Result<VersionToken, StoreError> {
        let mut aggregates = self
            .aggregates
            .write()
            .map_err(|_| StoreError::LockError)?;

        let key = aggregate.key();
        let current = aggregates.get(key).and_then(Aggregate::version);
        let allowed = match &condition {
            WriteCondition::Unconditional => true,
            WriteCondition::MustNotExist => !aggregates.contains_key(key),
            WriteCondition::Matches(expected) => current == Some(expected),
        };
        if !allowed {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let version = VersionToken::new(
            self.next_version
                .fetch_add(1, Ordering::Relaxed)
                .to_string(),
        );
        let mut stored = aggregate.clone();
        stored.set_version(Some(version.clone()));
        aggregates.insert(key.to_string(), stored);
        Ok(version)
    }

    fn query_unfinalized_before(
        &self,
        cutoff: DateTime<Utc>,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<DailyPage, StoreError> {
        let aggregates = self
            .aggregates
            .read()
            .map_err(|_| StoreError::LockError)?;

        let mut candidates: Vec<&DailyAggregate> = aggregates
            .values()
            .filter_map(|aggregate| match aggregate {
                Aggregate::Daily(daily) => Some(daily),
                _ => None,
            })
            .filter(|daily| !daily.is_finalized && daily.day_start < cutoff)
            .filter(|daily| {
                cursor.map_or(true, |c| {
                    (daily.day_start, daily.key.as_str()) > (c.day_start, c.key.as_str())
                })
            })
            .collect();
        candidates.sort_by(|a, b| (a.day_start, &a.key).cmp(&(b.day_start, &b.key)));

        let has_more = candidates.len() > page_size;
        let items: Vec<DailyAggregate> = candidates
            .into_iter()
            .take(page_size)
            .cloned()
            .collect();
        let next_cursor = if has_more {
            items.last().map(|last| PageCursor {
                day_start: last.day_start,
                key: last.key.clone(),
            })
        } else {
            None
        };

        Ok(DailyPage { items, next_cursor })
    }

    fn read_many(&self, keys: &[String]) -> Result<Vec<Aggregate>, StoreError> {
        let aggregates = self
            .aggregates
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(keys
            .iter()
            .filter_map(|key| aggregates.get(key).cloned())
            .collect())
    }
}
