//! Writer priority under scripted interleavings of real threads.
//!
//! Each scenario pins the order in which threads ask for the lock with a
//! [`Sequencer`] and [`eventually`], records the events into an
//! [`RwLockHistory`] and hands that to the checker.
#![cfg(not(loom))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ck_core::invariants::{LockEvent, RwLockHistory, RwLockPropertyChecker};
use ck_core::PropertyChecker;
use ck_dst::{eventually, Sequencer};
use ck_sync::RawRwLock;

const WAIT: Duration = Duration::from_secs(5);

type History = Arc<Mutex<RwLockHistory>>;

fn record(history: &History, tid: u64, event: LockEvent) {
    history.lock().unwrap().record(tid, event);
}

fn spawn_writer(lock: &Arc<RawRwLock>, history: &History, tid: u64) -> JoinHandle<()> {
    let lock = Arc::clone(lock);
    let history = Arc::clone(history);
    thread::spawn(move || {
        lock.write_lock();
        record(&history, tid, LockEvent::WriteAcquire);
        thread::sleep(Duration::from_millis(2));
        record(&history, tid, LockEvent::WriteRelease);
        lock.write_unlock();
    })
}

/// The reader announces itself in turn 0, then blocks in `read_lock`.
fn spawn_reader(lock: &Arc<RawRwLock>, history: &History, seq: &Arc<Sequencer>, tid: u64) -> JoinHandle<()> {
    let lock = Arc::clone(lock);
    let history = Arc::clone(history);
    let seq = Arc::clone(seq);
    thread::spawn(move || {
        seq.run_turn(0, || record(&history, tid, LockEvent::ReadRequest));
        lock.read_lock();
        record(&history, tid, LockEvent::ReadAcquire);
        record(&history, tid, LockEvent::ReadRelease);
        lock.read_unlock();
    })
}

fn assert_history_ok(history: &History) -> Vec<(u64, LockEvent)> {
    let history = history.lock().unwrap();
    let checker = RwLockPropertyChecker::new(&history);
    assert!(checker.all_hold(), "{}", checker.report());
    history.acquisition_order()
}

#[test]
fn test_reader_arriving_behind_waiting_writer_goes_after_it() {
    let lock = Arc::new(RawRwLock::new());
    let history: History = Arc::new(Mutex::new(RwLockHistory::new()));
    let seq = Arc::new(Sequencer::new());

    record(&history, 0, LockEvent::ReadRequest);
    lock.read_lock();
    record(&history, 0, LockEvent::ReadAcquire);

    let writer = spawn_writer(&lock, &history, 1);
    assert!(eventually(WAIT, || lock.waiting_writers() == 1));
    record(&history, 1, LockEvent::WriteRequest);

    let reader = spawn_reader(&lock, &history, &seq, 2);
    seq.wait_turn(1);

    // The lock is only read-held, yet the waiting writer keeps new readers out.
    assert!(!lock.try_read_lock());
    thread::sleep(Duration::from_millis(10));
    assert_eq!(lock.active_readers(), 1);
    assert!(!reader.is_finished());

    record(&history, 0, LockEvent::ReadRelease);
    lock.read_unlock();
    writer.join().unwrap();
    reader.join().unwrap();

    let order = assert_history_ok(&history);
    assert_eq!(
        order,
        vec![
            (0, LockEvent::ReadAcquire),
            (1, LockEvent::WriteAcquire),
            (2, LockEvent::ReadAcquire),
        ]
    );
}

#[test]
fn test_queued_writers_all_run_before_new_reader() {
    let lock = Arc::new(RawRwLock::new());
    let history: History = Arc::new(Mutex::new(RwLockHistory::new()));
    let seq = Arc::new(Sequencer::new());

    lock.read_lock();
    record(&history, 0, LockEvent::ReadAcquire);

    let w1 = spawn_writer(&lock, &history, 1);
    assert!(eventually(WAIT, || lock.waiting_writers() == 1));
    record(&history, 1, LockEvent::WriteRequest);
    let w2 = spawn_writer(&lock, &history, 2);
    assert!(eventually(WAIT, || lock.waiting_writers() == 2));
    record(&history, 2, LockEvent::WriteRequest);

    let reader = spawn_reader(&lock, &history, &seq, 3);
    seq.wait_turn(1);

    record(&history, 0, LockEvent::ReadRelease);
    lock.read_unlock();
    for h in [w1, w2, reader] {
        h.join().unwrap();
    }

    let order = assert_history_ok(&history);
    assert_eq!(order.len(), 4);
    assert_eq!(order[3], (3, LockEvent::ReadAcquire));
    assert_eq!(lock.waiting_writers(), 0);
}

#[test]
fn test_writer_release_admits_all_readers_together() {
    let lock = Arc::new(RawRwLock::new());
    let release = Arc::new(AtomicBool::new(false));
    lock.write_lock();

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                lock.read_lock();
                while !release.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
                lock.read_unlock();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(10));
    assert_eq!(lock.active_readers(), 0);
    lock.write_unlock();

    // All three hold the lock at once.
    assert!(eventually(WAIT, || lock.active_readers() == 3));
    release.store(true, Ordering::SeqCst);
    for h in readers {
        h.join().unwrap();
    }
    assert_eq!(lock.active_readers(), 0);
}

/// Random readers and writers; only acquisitions and releases are recorded,
/// since a request recorded by the thread itself may precede the lock seeing it.
#[test]
fn test_mutual_exclusion_stress() {
    let lock = Arc::new(RawRwLock::new());
    let history: History = Arc::new(Mutex::new(RwLockHistory::new()));

    let handles: Vec<_> = (0..6_u64)
        .map(|tid| {
            let lock = Arc::clone(&lock);
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for i in 0..200_u64 {
                    if (tid + i) % 3 == 0 {
                        lock.write_lock();
                        record(&history, tid, LockEvent::WriteAcquire);
                        record(&history, tid, LockEvent::WriteRelease);
                        lock.write_unlock();
                    } else {
                        lock.read_lock();
                        record(&history, tid, LockEvent::ReadAcquire);
                        thread::yield_now();
                        record(&history, tid, LockEvent::ReadRelease);
                        lock.read_unlock();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let order = assert_history_ok(&history);
    assert_eq!(order.len(), 6 * 200);
}
