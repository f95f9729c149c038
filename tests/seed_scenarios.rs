//! Seed scenarios that need real OS threads to mean anything: S5 (a
//! concurrent reader outside any transaction must not observe another
//! thread's in-flight writes) and a genuinely concurrent S6 (two
//! transactions committing at the same time still leave the backing store
//! in a fully-one-or-the-other state, never a partial merge).
//!
//! S1-S4 and the single-threaded S6 variant live as unit tests in
//! `src/facade.rs`, next to the façade they exercise.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use common::TestTxnManager;
use txnmap::{InMemoryStore, TransactionId, TransactionalMap};

type Map = TransactionalMap<i32, i32, InMemoryStore<i32, i32>, TestTxnManager>;

fn new_map() -> (Arc<Map>, Arc<TestTxnManager>) {
    common::init_tracing();
    let store = Arc::new(InMemoryStore::from_iter([(1, 2)]));
    let manager = Arc::new(TestTxnManager::default());
    (
        Arc::new(TransactionalMap::new(store, manager.clone())),
        manager,
    )
}

// ---- S5: a reader with no ambient transaction never sees another
// thread's uncommitted write, because it never touches that thread's
// shadow at all ----------------------------------------------------------
#[test]
fn s5_cross_thread_isolation() {
    let (map, manager) = new_map();

    let (wrote_tx, wrote_rx) = mpsc::channel::<()>();
    let (read_tx, read_rx) = mpsc::channel::<()>();

    let writer = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            let txn = TransactionId::from_raw(1);
            manager.begin(txn);
            map.insert(1, 5).unwrap();
            assert_eq!(map.get(&1).unwrap(), Some(5), "writer reads its own write");

            wrote_tx.send(()).unwrap();
            read_rx.recv().unwrap();

            manager.abort(txn);
        })
    };

    wrote_rx.recv().unwrap();

    let reader = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            manager.no_ambient_txn();
            let seen = map.get(&1).unwrap();
            assert_eq!(seen, Some(2), "reader without a transaction must see pre-write state");
        })
    };
    reader.join().unwrap();
    read_tx.send(()).unwrap();
    writer.join().unwrap();

    manager.no_ambient_txn();
    assert_eq!(map.get(&1).unwrap(), Some(2));
    assert_eq!(map.registry_len(), 0);
}

// ---- S6 (concurrent variant): two transactions racing to commit the
// same key leave it fully bound to one writer's value, never a mix -------
#[test]
fn s6_concurrent_commits_do_not_interleave() {
    let (map, manager) = new_map();

    let barrier = Arc::new(std::sync::Barrier::new(2));

    let handle_a = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let txn = TransactionId::from_raw(10);
            manager.begin(txn);
            map.insert(1, 5).unwrap();
            barrier.wait();
            manager.prepare_then_commit(txn);
        })
    };

    let handle_b = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let txn = TransactionId::from_raw(11);
            manager.begin(txn);
            map.insert(1, 7).unwrap();
            barrier.wait();
            manager.prepare_then_commit(txn);
        })
    };

    handle_a.join().unwrap();
    handle_b.join().unwrap();

    manager.no_ambient_txn();
    let final_value = map.get(&1).unwrap();
    assert!(
        final_value == Some(5) || final_value == Some(7),
        "final value must be wholly one writer's value, got {final_value:?}"
    );
    assert_eq!(map.registry_len(), 0, "both shadows must be cleaned up");
}

// ---- Boundary: a transaction that touches several keys concurrently with
// another transaction touching disjoint keys never blocks on the gate for
// longer than the critical section, and both commit cleanly -------------
#[test]
fn disjoint_transactions_both_commit_without_deadlock() {
    let (map, manager) = new_map();

    let handle_a = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            let txn = TransactionId::from_raw(20);
            manager.begin(txn);
            map.insert(100, 1).unwrap();
            manager.prepare_then_commit(txn);
        })
    };

    let handle_b = {
        let map = Arc::clone(&map);
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            let txn = TransactionId::from_raw(21);
            manager.begin(txn);
            map.insert(200, 2).unwrap();
            manager.prepare_then_commit(txn);
        })
    };

    handle_a.join().unwrap();
    handle_b.join().unwrap();

    manager.no_ambient_txn();
    assert_eq!(map.get(&100).unwrap(), Some(1));
    assert_eq!(map.get(&200).unwrap(), Some(2));
}
