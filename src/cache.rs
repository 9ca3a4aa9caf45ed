/// Computation cache: memoizes query results for the lifetime of one loaded
/// log session.
///
/// Each key owns a `OnceCell`. The map lock is only held long enough to find
/// or create the cell, so different keys compute in parallel while callers
/// racing on the same key block until the single in-flight computation
/// finishes. No eviction: a session covers one report and is short-lived.
/// A cache must never outlive or be shared between logs.
use crate::segment::Segment;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub params:    Vec<String>,
    pub segments:  Vec<Segment>,
}

impl CacheKey {
    pub fn new(operation: &'static str, params: Vec<String>, segments: Vec<Segment>) -> Self {
        Self { operation, params, segments }
    }
}

type Cell<T> = Arc<OnceCell<Arc<T>>>;

#[derive(Debug)]
pub struct ComputationCache<T> {
    cells:  Mutex<HashMap<CacheKey, Cell<T>>>,
    misses: AtomicUsize,
}

impl<T> Default for ComputationCache<T> {
    fn default() -> Self {
        Self {
            cells:  Mutex::new(HashMap::new()),
            misses: AtomicUsize::new(0),
        }
    }
}

impl<T> ComputationCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: CacheKey) -> Cell<T> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cells.entry(key).or_default())
    }

    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let operation = key.operation;
        let cell = self.cell(key);
        let value = cell.get_or_init(|| {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache miss: {}", operation);
            Arc::new(compute())
        });
        Arc::clone(value)
    }

    /// Like `get_or_compute`, but a failed computation leaves the key empty so
    /// a later call can retry it.
    pub fn get_or_try_compute<F, E>(&self, key: CacheKey, compute: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let operation = key.operation;
        let cell = self.cell(key);
        let value = cell.get_or_try_init(|| {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache miss: {}", operation);
            compute().map(Arc::new)
        })?;
        Ok(Arc::clone(value))
    }

    /// Cached value for `key`, without computing.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of computations started so far.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of keys holding a computed value.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
