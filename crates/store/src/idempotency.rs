//! Idempotency-key store — a small TTL map consulted by
//! `create_run`/`resume_run` before doing any work. In-memory only: a
//! parking_lot-guarded map, no disk persistence (a replayed key after a
//! process restart just does the work again, which is safe since both
//! operations are themselves idempotent at the domain level).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

pub struct IdempotencyStore {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl_hours: u64) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl: Duration::from_secs(ttl_hours * 3600) }
    }

    /// Returns the stored response for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(key.into(), (Instant::now(), value));
    }
}
