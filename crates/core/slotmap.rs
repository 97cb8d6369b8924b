//! A concurrent, integer-keyed slot allocator.
//!
//! Used to track in-flight RLPx sub-protocol requests and SSB RPC calls by
//! the request number the wire protocol assigns them. Allocation is
//! monotonic and wraps only on overflow of the underlying counter, which in
//! practice never happens within a connection's lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub struct SlotMap<T> {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, T>>,
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a fresh id and stores `value` under it.
    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(id, value);
        id
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        self.slots.lock().remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ids_are_unique_under_concurrent_insert() {
        let map: Arc<SlotMap<u64>> = Arc::new(SlotMap::new());
        let mut handles = Vec::new();
        for worker in 0..1000u64 {
            let map = map.clone();
            handles.push(thread::spawn(move || map.insert(worker)));
        }
        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
        assert_eq!(map.len(), 1000);
    }

    #[test]
    fn remove_returns_stored_value() {
        let map: SlotMap<&'static str> = SlotMap::new();
        let id = map.insert("hello");
        assert_eq!(map.remove(id), Some("hello"));
        assert_eq!(map.remove(id), None);
    }
}
