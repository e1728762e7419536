//! Concurrent reader/writer behaviour of the results store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use cx_results::{ColumnInfo, ResultsStore};
use proptest::prelude::*;

fn columns(n: usize) -> Vec<ColumnInfo> {
    (0..n)
        .map(|i| ColumnInfo::new("", &format!("v{i}"), ""))
        .collect()
}

#[test]
fn readers_never_see_partial_points() {
    let store = Arc::new(ResultsStore::new(columns(3)));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = 0;
                while !done.load(Ordering::Acquire) {
                    let snap = store.snapshot();
                    assert!(snap.len() >= seen, "snapshot shrank");
                    seen = snap.len();
                    for (i, p) in snap.points().iter().enumerate() {
                        assert_eq!(p.time, i as f64);
                        assert_eq!(p.values, vec![i as f64; 3]);
                    }
                }
            })
        })
        .collect();

    let writer = store.lease().unwrap();
    for i in 0..5_000 {
        assert!(writer.record(i as f64, vec![i as f64; 3]));
    }
    done.store(true, Ordering::Release);
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(store.len(), 5_000);
}

#[test]
fn snapshot_is_stable_after_later_appends() {
    let store = Arc::new(ResultsStore::new(columns(1)));
    let writer = store.lease().unwrap();
    writer.record(0.0, vec![1.0]);
    writer.record(1.0, vec![2.0]);
    let snap = store.snapshot();
    writer.record(2.0, vec![3.0]);
    assert_eq!(snap.len(), 2);
    assert_eq!(store.snapshot().len(), 3);
}

#[test]
fn only_the_lease_holder_writes() {
    let store = Arc::new(ResultsStore::new(columns(1)));
    {
        let writer = store.lease().unwrap();
        assert!(writer.record(0.0, vec![1.0]));
        assert!(store.lease().is_err());
    }
    // Released: the store is read-only until the next lease.
    assert!(!store.is_in_use());
    assert_eq!(store.snapshot().len(), 1);
    let writer = store.lease().unwrap();
    assert!(writer.record(1.0, vec![2.0]));
    assert!(matches!(store.clear(), Err(cx_results::ResultsError::StoreInUse)));
    assert_eq!(store.len(), 2);
}

proptest! {
    #[test]
    fn recorded_times_strictly_increase(times in prop::collection::vec(-100.0f64..100.0, 0..200)) {
        let store = Arc::new(ResultsStore::new(columns(1)));
        let writer = store.lease().unwrap();
        for t in &times {
            writer.record(*t, vec![*t]);
        }
        let snap = store.snapshot();
        for w in snap.points().windows(2) {
            prop_assert!(w[0].time < w[1].time);
        }
        // Exactly the running maxima are kept.
        let mut last = f64::NEG_INFINITY;
        let expected = times.iter().filter(|t| {
            if **t > last { last = **t; true } else { false }
        }).count();
        prop_assert_eq!(snap.len(), expected);
    }

    #[test]
    fn snapshot_is_idempotent(n in 0usize..50) {
        let store = Arc::new(ResultsStore::new(columns(2)));
        let writer = store.lease().unwrap();
        for i in 0..n {
            writer.record(i as f64 * 0.1, vec![i as f64, -(i as f64)]);
        }
        prop_assert_eq!(store.snapshot(), store.snapshot());
    }
}
