//! Stress coverage for `SlotMap` beyond the plain unique-insert case
//! covered by its own unit tests: fast and slow producers racing against
//! workers that add and immediately remove their own slot.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use p2pkit_core::SlotMap;

enum Produced {
    Fast(u64),
    Slow(u64),
    Churned,
}

#[test]
fn fast_and_slow_inserts_stay_disjoint_under_churn() {
    let map: Arc<SlotMap<()>> = Arc::new(SlotMap::new());
    let mut handles = Vec::new();

    for _ in 0..1000 {
        let map = map.clone();
        handles.push(thread::spawn(move || Produced::Fast(map.insert(()))));
    }
    for _ in 0..1000 {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            Produced::Slow(map.insert(()))
        }));
    }
    for _ in 0..2000 {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            let id = map.insert(());
            map.remove(id);
            Produced::Churned
        }));
    }

    let mut fast_ids = HashSet::new();
    let mut slow_ids = HashSet::new();
    for handle in handles {
        match handle.join().unwrap() {
            Produced::Fast(id) => {
                fast_ids.insert(id);
            }
            Produced::Slow(id) => {
                slow_ids.insert(id);
            }
            Produced::Churned => {}
        }
    }

    assert_eq!(fast_ids.len(), 1000);
    assert_eq!(slow_ids.len(), 1000);
    assert!(fast_ids.is_disjoint(&slow_ids));
    assert_eq!(map.len(), 2000);
}
