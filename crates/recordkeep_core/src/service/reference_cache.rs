//! Reference-data lookups with a bounded in-process cache.
//!
//! # Responsibility
//! - Serve read-mostly lookup records by their numeric reference key.
//! - Keep cached entries in step with writes issued through this service.
//!
//! # Invariants
//! - The cache only ever holds live records.
//! - At most `capacity` entries are held; the least recently used goes first.
//! - Any rollback observed by the service clears the whole cache, since
//!   entries may have been refreshed from uncommitted writes.
//! - Writes issued through other handles are not observed. Callers that share
//!   a table across contexts call `invalidate_all` themselves.

use crate::model::record::{Record, RecordId};
use crate::repo::{Filter, RecordRepository, RepoResult, TransactionState};
use linked_hash_map::LinkedHashMap;
use log::{debug, info};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Record type addressable by a unique numeric reference key.
pub trait ReferenceData: Record {
    /// Column holding the reference key.
    const KEY_COLUMN: &'static str;

    fn reference_key(&self) -> i64;
}

/// Bounded LRU map from reference key to record.
pub struct ReferenceCache<T> {
    entries: Mutex<LinkedHashMap<i64, T>>,
    capacity: usize,
}

impl<T: ReferenceData> ReferenceCache<T> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LinkedHashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Cached record for `key`, marking it most recently used.
    pub fn get(&self, key: i64) -> Option<T> {
        self.entries().get_refresh(&key).cloned()
    }

    /// Stores `record`, replacing any entry for the same key or the same id.
    pub fn put(&self, record: T) {
        let mut entries = self.entries();
        remove_by_id(&mut entries, record.id());
        entries.insert(record.reference_key(), record);
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                debug!("event=cache_evict module=service key={evicted} reason=capacity");
            }
        }
    }

    /// Drops every entry for `record`, by key and by id.
    pub fn evict(&self, record: &T) {
        let mut entries = self.entries();
        entries.remove(&record.reference_key());
        remove_by_id(&mut entries, record.id());
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    // Entries stay consistent across a panicking holder, so poisoning is
    // ignored.
    fn entries(&self) -> MutexGuard<'_, LinkedHashMap<i64, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_by_id<T: Record>(entries: &mut LinkedHashMap<i64, T>, id: RecordId) {
    let stale = entries
        .iter()
        .find(|(_, cached)| cached.id() == id)
        .map(|(key, _)| *key);
    if let Some(key) = stale {
        entries.remove(&key);
    }
}

/// Cache-aside service over a reference-data repository.
pub struct ReferenceDataService<T, R> {
    repo: R,
    cache: ReferenceCache<T>,
    _record: PhantomData<fn() -> T>,
}

impl<T: ReferenceData, R: RecordRepository<T>> ReferenceDataService<T, R> {
    pub fn new(repo: R, capacity: usize) -> Self {
        Self {
            repo,
            cache: ReferenceCache::new(capacity),
            _record: PhantomData,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn cache(&self) -> &ReferenceCache<T> {
        &self.cache
    }

    /// Live record with reference key `key`, served from cache when present.
    pub fn get_by_key(&self, key: i64) -> RepoResult<Option<T>> {
        if let Some(hit) = self.cache.get(key) {
            debug!("event=cache_lookup module=service status=hit table={} key={key}", T::TABLE);
            return Ok(Some(hit));
        }
        debug!("event=cache_lookup module=service status=miss table={} key={key}", T::TABLE);
        let found = self.repo.find(&Filter::equals(T::KEY_COLUMN, key))?;
        if let Some(record) = &found {
            self.cache.put(record.clone());
        }
        Ok(found)
    }

    /// All live records, bypassing the cache.
    pub fn get_all(&self) -> RepoResult<Vec<T>> {
        self.repo.get_all()
    }

    pub fn add(&self, record: T) -> RepoResult<T> {
        let saved = self.observe(self.repo.add(record))?;
        self.cache.put(saved.clone());
        Ok(saved)
    }

    pub fn update(&self, record: T) -> RepoResult<T> {
        let saved = self.observe(self.repo.update(record))?;
        self.cache.put(saved.clone());
        Ok(saved)
    }

    pub fn revive(&self, record: T) -> RepoResult<T> {
        let saved = self.observe(self.repo.revive(record))?;
        self.cache.put(saved.clone());
        Ok(saved)
    }

    pub fn upsert(&self, record: T) -> RepoResult<T> {
        let filter = Filter::equals(T::KEY_COLUMN, record.reference_key());
        let saved = self.observe(self.repo.upsert(record, &filter))?;
        self.cache.put(saved.clone());
        Ok(saved)
    }

    pub fn delete(&self, record: T) -> RepoResult<T> {
        self.cache.evict(&record);
        let deleted = self.observe(self.repo.delete(record))?;
        self.cache.evict(&deleted);
        Ok(deleted)
    }

    pub fn hard_delete(&self, record: &T) -> RepoResult<()> {
        self.cache.evict(record);
        self.observe(self.repo.hard_delete(record))
    }

    pub fn begin_transaction(&self) -> RepoResult<()> {
        self.repo.begin_transaction()
    }

    pub fn commit_transaction(&self) -> RepoResult<()> {
        self.observe(self.repo.commit_transaction())
    }

    pub fn rollback_transaction(&self) -> RepoResult<()> {
        let outcome = self.repo.rollback_transaction();
        self.invalidate_all();
        outcome
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
        info!("event=cache_clear module=service status=ok table={}", T::TABLE);
    }

    /// Clears the cache when a failed call left the scope rolled back.
    fn observe<O>(&self, outcome: RepoResult<O>) -> RepoResult<O> {
        if outcome.is_err()
            && matches!(self.repo.transaction_state(), Ok(TransactionState::RolledBack))
        {
            self.invalidate_all();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceCache;
    use crate::model::category::Category;

    #[test]
    fn least_recently_used_entry_is_evicted_first() {
        let cache = ReferenceCache::new(2);
        cache.put(Category::new(1, "One"));
        cache.put(Category::new(2, "Two"));
        assert!(cache.get(1).is_some());

        cache.put(Category::new(3, "Three"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn key_change_replaces_old_entry_for_same_record() {
        let cache = ReferenceCache::new(4);
        let mut category = Category::new(10, "Ten");
        cache.put(category.clone());

        category.code = 11;
        cache.put(category.clone());
        assert!(cache.get(10).is_none());
        assert_eq!(cache.get(11).unwrap().name, "Ten");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let cache = ReferenceCache::<Category>::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(Category::new(1, "One"));
        cache.put(Category::new(2, "Two"));
        assert_eq!(cache.len(), 1);
    }
}
