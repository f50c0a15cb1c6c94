use crate::core::{KeyRange, KeyValue, StoreError, StoreResult, codes};
use crate::transaction::{Database, Transaction, TransactionOption};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Barrier;
use tokio::time::{Duration, sleep};
use tracing::{Level, event};

const SYSTEM_KEY_PREFIX: u8 = 0xff;

/// Backoff used by [`MemoryTransaction::on_error`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryStoreOptions {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 2,
            max_backoff_ms: 100,
        }
    }
}

impl MemoryStoreOptions {
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms.max(1);
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(max)
    }
}

/// A failure to inject into an upcoming commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Reject the commit with this error code without applying anything.
    Fail(i32),

    /// Apply the commit, then report this error code to the caller, as if
    /// the response had been lost.
    ApplyThenFail(i32),
}

/// Operation counters, as issued by transactions (including attempts that
/// were later retried).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub transactions: u64,
    pub reads: u64,
    pub sets: u64,
    pub clears: u64,
    pub clear_ranges: u64,
    pub commits: u64,
    pub conflicts: u64,
}

/// One successfully applied commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub version: u64,
    pub options: BTreeSet<TransactionOption>,
    pub mutations: usize,
}

#[derive(Default)]
struct Counters {
    transactions: AtomicU64,
    reads: AtomicU64,
    sets: AtomicU64,
    clears: AtomicU64,
    clear_ranges: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

struct CommitGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

#[derive(Default)]
struct StoreState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Commit version that last wrote each key.
    write_versions: HashMap<Vec<u8>, u64>,
    locked: bool,
    faults: VecDeque<CommitFault>,
    read_faults: VecDeque<i32>,
    gate: Option<CommitGate>,
    commit_log: Vec<CommitRecord>,
}

impl StoreState {
    fn apply(&mut self, mutations: &[Mutation], version: u64) {
        for mutation in mutations {
            match mutation {
                Mutation::Set(key, value) => {
                    self.data.insert(key.clone(), value.clone());
                    self.write_versions.insert(key.clone(), version);
                }
                Mutation::Clear(key) => {
                    if self.data.remove(key).is_some() {
                        self.write_versions.insert(key.clone(), version);
                    }
                }
                Mutation::ClearRange(range) if range.begin < range.end => {
                    let doomed: Vec<Vec<u8>> = self
                        .data
                        .range(range.begin.clone()..range.end.clone())
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in doomed {
                        self.data.remove(&key);
                        self.write_versions.insert(key, version);
                    }
                }
                Mutation::ClearRange(_) => {}
            }
        }
    }
}

/// A transactional key-value store held entirely in process memory.
///
/// Transactions use optimistic concurrency: each one takes a read version
/// when it starts, and its commit fails with `not_committed` if any key it
/// read (or registered as a read conflict) was written by a commit after
/// that version. Keys starting with `0xff` form the system keyspace and
/// require the matching transaction options.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    version: Arc<AtomicU64>,
    counters: Arc<Counters>,
    options: MemoryStoreOptions,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MemoryStoreOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Committed value of `key`, outside of any transaction.
    pub fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state().data.get(key).cloned()
    }

    /// Committed pairs whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<KeyValue> {
        self.state()
            .data
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect()
    }

    /// Writes a value directly, as its own commit.
    pub fn insert(&self, key: &[u8], value: &[u8]) {
        let mut state = self.state();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        state.apply(&[Mutation::Set(key.to_vec(), value.to_vec())], version);
    }

    pub fn lock_database(&self) {
        self.state().locked = true;
    }

    pub fn unlock_database(&self) {
        self.state().locked = false;
    }

    /// Queues a fault for the next writing commit. Faults are consumed in
    /// the order they were injected.
    pub fn inject_commit_fault(&self, fault: CommitFault) {
        self.state().faults.push_back(fault);
    }

    /// Queues an error code for the next read (`get` or `get_range`). Read
    /// faults are consumed in the order they were injected.
    pub fn inject_read_fault(&self, code: i32) {
        self.state().read_faults.push_back(code);
    }

    /// Makes the next `parties` writing commits wait for each other before
    /// any of them is applied.
    pub fn hold_commits(&self, parties: usize) {
        self.state().gate = Some(CommitGate {
            barrier: Arc::new(Barrier::new(parties)),
            remaining: parties,
        });
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let c = &self.counters;
        MemoryStoreStats {
            transactions: c.transactions.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
            sets: c.sets.load(Ordering::Relaxed),
            clears: c.clears.load(Ordering::Relaxed),
            clear_ranges: c.clear_ranges.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            conflicts: c.conflicts.load(Ordering::Relaxed),
        }
    }

    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.state().commit_log.clone()
    }

    fn take_gate_slot(&self) -> Option<Arc<Barrier>> {
        let mut state = self.state();
        let gate = state.gate.as_mut()?;
        let barrier = gate.barrier.clone();
        gate.remaining -= 1;
        if gate.remaining == 0 {
            state.gate = None;
        }
        Some(barrier)
    }
}

impl Database for MemoryStore {
    fn create_transaction(&self) -> StoreResult<Box<dyn Transaction>> {
        self.counters.transactions.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }
}

#[derive(Debug, Clone)]
enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(KeyRange),
}

impl Mutation {
    fn touches_system_keys(&self) -> bool {
        match self {
            Mutation::Set(key, _) | Mutation::Clear(key) => key.first() == Some(&SYSTEM_KEY_PREFIX),
            Mutation::ClearRange(range) => {
                range.begin.first() == Some(&SYSTEM_KEY_PREFIX)
                    || range.end.as_slice() > [SYSTEM_KEY_PREFIX].as_slice()
            }
        }
    }
}

/// Transaction against a [`MemoryStore`].
pub struct MemoryTransaction {
    store: MemoryStore,
    read_version: u64,
    options: BTreeSet<TransactionOption>,
    mutations: Vec<Mutation>,
    read_conflicts: BTreeSet<Vec<u8>>,
    retries: u32,
}

impl MemoryTransaction {
    fn new(store: MemoryStore) -> Self {
        let read_version = store.current_version();
        Self {
            store,
            read_version,
            options: BTreeSet::new(),
            mutations: Vec::new(),
            read_conflicts: BTreeSet::new(),
            retries: 0,
        }
    }

    fn has(&self, option: TransactionOption) -> bool {
        self.options.contains(&option)
    }

    fn check_readable(&self, key: &[u8]) -> StoreResult<()> {
        if key.first() == Some(&SYSTEM_KEY_PREFIX)
            && !self.has(TransactionOption::ReadSystemKeys)
            && !self.has(TransactionOption::AccessSystemKeys)
        {
            return Err(StoreError::from_code(codes::KEY_OUTSIDE_LEGAL_RANGE));
        }
        let mut state = self.store.state();
        if !self.has(TransactionOption::LockAware) && state.locked {
            return Err(StoreError::from_code(codes::DATABASE_LOCKED));
        }
        match state.read_faults.pop_front() {
            Some(code) => Err(StoreError::from_code(code)),
            None => Ok(()),
        }
    }

    /// Applies this transaction's own buffered writes on top of `current`.
    fn overlay(&self, key: &[u8], current: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let mut value = current;
        for mutation in &self.mutations {
            match mutation {
                Mutation::Set(k, v) if k.as_slice() == key => value = Some(v.clone()),
                Mutation::Clear(k) if k.as_slice() == key => value = None,
                Mutation::ClearRange(range) if range.contains(key) => value = None,
                _ => {}
            }
        }
        value
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn set_option(&mut self, option: TransactionOption) -> StoreResult<()> {
        self.options.insert(option);
        Ok(())
    }

    async fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_readable(key)?;
        self.store.counters.reads.fetch_add(1, Ordering::Relaxed);
        let current = self.store.read(key);
        self.read_conflicts.insert(key.to_vec());
        Ok(self.overlay(key, current))
    }

    async fn get_range(&mut self, range: &KeyRange, limit: usize) -> StoreResult<Vec<KeyValue>> {
        self.check_readable(&range.begin)?;
        self.store.counters.reads.fetch_add(1, Ordering::Relaxed);
        if range.begin >= range.end {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = {
            let state = self.store.state();
            state
                .data
                .range(range.begin.clone()..range.end.clone())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };
        for mutation in &self.mutations {
            match mutation {
                Mutation::Set(key, value) if range.contains(key) => {
                    merged.insert(key.clone(), value.clone());
                }
                Mutation::Clear(key) => {
                    merged.remove(key);
                }
                Mutation::ClearRange(cleared) => {
                    merged.retain(|key, _| !cleared.contains(key));
                }
                _ => {}
            }
        }
        self.read_conflicts.extend(merged.keys().cloned());
        Ok(merged
            .into_iter()
            .take(limit)
            .map(|(key, value)| KeyValue::new(key, value))
            .collect())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.store.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.mutations
            .push(Mutation::Set(key.to_vec(), value.to_vec()));
    }

    fn clear(&mut self, key: &[u8]) {
        self.store.counters.clears.fetch_add(1, Ordering::Relaxed);
        self.mutations.push(Mutation::Clear(key.to_vec()));
    }

    fn clear_range(&mut self, range: &KeyRange) {
        self.store
            .counters
            .clear_ranges
            .fetch_add(1, Ordering::Relaxed);
        self.mutations.push(Mutation::ClearRange(range.clone()));
    }

    fn add_read_conflict_key(&mut self, key: &[u8]) -> StoreResult<()> {
        if key.first() == Some(&SYSTEM_KEY_PREFIX)
            && !self.has(TransactionOption::ReadSystemKeys)
            && !self.has(TransactionOption::AccessSystemKeys)
        {
            return Err(StoreError::from_code(codes::KEY_OUTSIDE_LEGAL_RANGE));
        }
        self.read_conflicts.insert(key.to_vec());
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.store.counters.commits.fetch_add(1, Ordering::Relaxed);
        if self.mutations.is_empty() {
            return Ok(());
        }
        if !self.has(TransactionOption::AccessSystemKeys)
            && self.mutations.iter().any(Mutation::touches_system_keys)
        {
            return Err(StoreError::from_code(codes::KEY_OUTSIDE_LEGAL_RANGE));
        }

        if let Some(barrier) = self.store.take_gate_slot() {
            barrier.wait().await;
        }

        let mut state = self.store.state();
        if state.locked && !self.has(TransactionOption::LockAware) {
            return Err(StoreError::from_code(codes::DATABASE_LOCKED));
        }

        let fault = state.faults.pop_front();
        if let Some(CommitFault::Fail(code)) = fault {
            return Err(StoreError::from_code(code));
        }

        let conflicted = self.read_conflicts.iter().any(|key| {
            state
                .write_versions
                .get(key)
                .is_some_and(|written| *written > self.read_version)
        });
        if conflicted {
            self.store.counters.conflicts.fetch_add(1, Ordering::Relaxed);
            event!(Level::DEBUG, read_version = self.read_version, "memory store commit conflict");
            return Err(StoreError::from_code(codes::NOT_COMMITTED));
        }

        let version = self.store.version.fetch_add(1, Ordering::SeqCst) + 1;
        state.apply(&self.mutations, version);
        state.commit_log.push(CommitRecord {
            version,
            options: self.options.clone(),
            mutations: self.mutations.len(),
        });
        drop(state);

        match fault {
            Some(CommitFault::ApplyThenFail(code)) => Err(StoreError::from_code(code)),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.read_version = self.store.current_version();
        self.options.clear();
        self.mutations.clear();
        self.read_conflicts.clear();
    }

    async fn on_error(&mut self, error: StoreError) -> StoreResult<()> {
        if !error.is_retryable() {
            return Err(error);
        }
        self.retries += 1;
        let delay = self.store.options.backoff_ms(self.retries);
        event!(
            Level::DEBUG,
            code = error.code,
            retries = self.retries,
            delay_ms = delay,
            "memory store backing off"
        );
        sleep(Duration::from_millis(delay)).await;
        self.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_tr(store: &MemoryStore) -> Box<dyn Transaction> {
        let mut tr = store.create_transaction().unwrap();
        tr.set_option(TransactionOption::AccessSystemKeys).unwrap();
        tr
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = MemoryStore::new();
        let mut tr = store.create_transaction().unwrap();
        tr.set(b"hello", b"world");
        assert_eq!(tr.get(b"hello").await.unwrap(), Some(b"world".to_vec()));
        assert_eq!(store.read(b"hello"), None);
        tr.commit().await.unwrap();
        assert_eq!(store.read(b"hello"), Some(b"world".to_vec()));
        assert_eq!(store.current_version(), 1);
    }

    #[tokio::test]
    async fn test_read_conflict_detected() {
        let store = MemoryStore::new();
        let mut first = store.create_transaction().unwrap();
        let mut second = store.create_transaction().unwrap();

        first.add_read_conflict_key(b"k").unwrap();
        first.set(b"k", b"1");
        second.add_read_conflict_key(b"k").unwrap();
        second.set(b"k", b"2");

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(err.code, codes::NOT_COMMITTED);
        assert_eq!(store.read(b"k"), Some(b"1".to_vec()));
        assert_eq!(store.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_blind_writes_do_not_conflict() {
        let store = MemoryStore::new();
        let mut first = store.create_transaction().unwrap();
        let mut second = store.create_transaction().unwrap();
        first.set(b"k", b"1");
        second.set(b"k", b"2");
        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(store.read(b"k"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_system_keys_require_options() {
        let store = MemoryStore::new();
        let mut tr = store.create_transaction().unwrap();
        let err = tr.get(b"\xff/conf/log_engine").await.unwrap_err();
        assert_eq!(err.code, codes::KEY_OUTSIDE_LEGAL_RANGE);

        tr.set(b"\xff/conf/log_engine", b"1");
        let err = tr.commit().await.unwrap_err();
        assert_eq!(err.code, codes::KEY_OUTSIDE_LEGAL_RANGE);

        tr.reset();
        tr.set_option(TransactionOption::ReadSystemKeys).unwrap();
        assert_eq!(tr.get(b"\xff/conf/log_engine").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locked_database_requires_lock_aware() {
        let store = MemoryStore::new();
        store.lock_database();

        let mut tr = system_tr(&store);
        tr.set(b"\xff/x", b"1");
        assert_eq!(
            tr.commit().await.unwrap_err().code,
            codes::DATABASE_LOCKED
        );

        let mut tr = system_tr(&store);
        tr.set_option(TransactionOption::LockAware).unwrap();
        tr.set(b"\xff/x", b"1");
        tr.commit().await.unwrap();
        assert_eq!(store.read(b"\xff/x"), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_clear_range_removes_prefix_only() {
        let store = MemoryStore::new();
        store.insert(b"a/1:1", b"");
        store.insert(b"a/1:2", b"");
        store.insert(b"a/12", b"");

        let mut tr = store.create_transaction().unwrap();
        tr.clear_range(&KeyRange::prefix(b"a/1:").unwrap());
        let visible = tr.get_range(&KeyRange::prefix(b"a/").unwrap(), 10).await.unwrap();
        assert_eq!(visible, vec![KeyValue::new(b"a/12".to_vec(), Vec::new())]);
        tr.commit().await.unwrap();

        assert_eq!(store.scan_prefix(b"a/").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        store.inject_commit_fault(CommitFault::Fail(codes::FUTURE_VERSION));
        store.inject_commit_fault(CommitFault::ApplyThenFail(codes::COMMIT_UNKNOWN_RESULT));

        let mut tr = store.create_transaction().unwrap();
        tr.set(b"k", b"v");
        let err = tr.commit().await.unwrap_err();
        assert_eq!(err.code, codes::FUTURE_VERSION);
        assert_eq!(store.read(b"k"), None);

        tr.on_error(err).await.unwrap();
        tr.set(b"k", b"v");
        let err = tr.commit().await.unwrap_err();
        assert_eq!(err.code, codes::COMMIT_UNKNOWN_RESULT);
        assert_eq!(store.read(b"k"), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_injected_read_faults() {
        let store = MemoryStore::new();
        store.insert(b"k", b"v");
        store.inject_read_fault(codes::FUTURE_VERSION);

        let mut tr = store.create_transaction().unwrap();
        let err = tr.get(b"k").await.unwrap_err();
        assert_eq!(err.code, codes::FUTURE_VERSION);
        assert_eq!(tr.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.stats().reads, 1);
    }

    #[tokio::test]
    async fn test_on_error_rejects_permanent_errors() {
        let store = MemoryStore::new();
        let mut tr = store.create_transaction().unwrap();
        let err = tr
            .on_error(StoreError::from_code(codes::KEY_OUTSIDE_LEGAL_RANGE))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::KEY_OUTSIDE_LEGAL_RANGE);
    }

    #[tokio::test]
    async fn test_on_error_resets_options() {
        let store = MemoryStore::new();
        let mut tr = system_tr(&store);
        tr.set(b"\xff/x", b"1");
        tr.on_error(StoreError::from_code(codes::NOT_COMMITTED))
            .await
            .unwrap();
        tr.set(b"\xff/x", b"1");
        assert_eq!(
            tr.commit().await.unwrap_err().code,
            codes::KEY_OUTSIDE_LEGAL_RANGE
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let options = MemoryStoreOptions {
            initial_backoff_ms: 5,
            max_backoff_ms: 40,
        };
        assert_eq!(options.backoff_ms(1), 5);
        assert_eq!(options.backoff_ms(3), 20);
        assert_eq!(options.backoff_ms(10), 40);
    }
}
