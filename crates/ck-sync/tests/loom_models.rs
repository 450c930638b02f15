//! Loom models of the blocking protocols.
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p ck-sync --test loom_models --release
//! ```
//!
//! Under `--cfg loom` the queue and the rw-lock run on loom's `Mutex` and
//! `Condvar`, so every interleaving of their wait/notify handshakes is
//! explored. A lost wakeup shows up as a loom deadlock.
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;

use ck_sync::{BoundedQueue, RawRwLock, RwLock};

/// A consumer blocked on an empty queue gets the item pushed before close,
/// then `None`.
#[test]
fn loom_queue_close_after_push_drains() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::with_capacity(1).unwrap());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(v) = queue.pop() {
                    got.push(v);
                }
                got
            })
        };

        queue.push(7_u8).unwrap();
        queue.close();

        assert_eq!(consumer.join().unwrap(), vec![7]);
    });
}

/// A producer blocked on a full queue is woken by a pop.
#[test]
fn loom_queue_full_push_woken_by_pop() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::with_capacity(1).unwrap());
        queue.push(1_u8).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(queue.pop(), Some(2));
    });
}

/// A producer blocked on a full queue is released by close and gets its value back.
#[test]
fn loom_queue_close_releases_blocked_producer() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::with_capacity(1).unwrap());
        queue.push(1_u8).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        queue.close();
        let pushed = producer.join().unwrap();
        assert!(pushed.is_err_and(|e| e.is_closed()));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    });
}

#[test]
fn loom_rwlock_writers_exclusive() {
    loom::model(|| {
        let lock = Arc::new(RwLock::new(0_u32));

        let writers: Vec<_> = (0..2)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    let mut g = lock.write();
                    let seen = *g;
                    *g = seen + 1;
                })
            })
            .collect();

        {
            let g = lock.read();
            assert!(*g <= 2);
        }

        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(*lock.read(), 2);
    });
}

/// Whenever a writer is visibly waiting, a new reader is refused, even though
/// the lock is only held for reading.
#[test]
fn loom_rwlock_waiting_writer_blocks_readers() {
    loom::model(|| {
        let lock = Arc::new(RawRwLock::new());
        lock.read_lock();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.write_lock();
                lock.write_unlock();
            })
        };

        if lock.waiting_writers() > 0 {
            assert!(!lock.try_read_lock());
        }

        lock.read_unlock();
        writer.join().unwrap();
        assert!(!lock.is_write_locked());
        assert_eq!(lock.active_readers(), 0);
    });
}

/// Reader and writer both blocked behind an active writer: the last unlock
/// must wake whoever is left, in every order.
#[test]
fn loom_rwlock_handoff_no_lost_wakeup() {
    loom::model(|| {
        let lock = Arc::new(RawRwLock::new());
        lock.write_lock();

        let reader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.read_lock();
                lock.read_unlock();
            })
        };
        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.write_lock();
                lock.write_unlock();
            })
        };

        lock.write_unlock();
        reader.join().unwrap();
        writer.join().unwrap();
        assert_eq!(lock.waiting_writers(), 0);
    });
}
