use parking_lot::Mutex;
use std::collections::HashMap;

/// Cache of completed results keyed by idempotency key.
pub trait IdempotencyStore<R>: Send + Sync {
    fn get(&self, key: &str) -> Option<R>;
    fn store(&self, key: &str, result: R);
}

/// In-process store guarded by a single lock.
///
/// Records never expire and are never overwritten: the first result stored
/// for a key is the one every later lookup returns.
#[derive(Debug)]
pub struct InMemoryIdempotencyStore<R> {
    records: Mutex<HashMap<String, R>>,
}

impl<R> InMemoryIdempotencyStore<R> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl<R> Default for InMemoryIdempotencyStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send> IdempotencyStore<R> for InMemoryIdempotencyStore<R> {
    fn get(&self, key: &str) -> Option<R> {
        self.records.lock().get(key).cloned()
    }

    fn store(&self, key: &str, result: R) {
        self.records
            .lock()
            .entry(key.to_string())
            .or_insert(result);
    }
}
