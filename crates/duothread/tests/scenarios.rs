//! End-to-end scenarios exercised against the public API surface.

use duothread::{Condvar, Mutex, Semaphore, SpinLock, Thread, ThreadAttr, ThreadError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn hello_three() {
    let mut handles = Vec::new();
    for id in 0..3u64 {
        handles.push(Thread::spawn(ThreadAttr::new(), move || id).unwrap());
    }
    let mut seen: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn producer_consumer_with_bounded_semaphore() {
    const CAPACITY: u32 = 5;
    const ITEMS: usize = 10;

    let buffer: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let empty_slots = Arc::new(Semaphore::new(CAPACITY));
    let filled_slots = Arc::new(Semaphore::new(0));

    let producer = {
        let buffer = Arc::clone(&buffer);
        let empty_slots = Arc::clone(&empty_slots);
        let filled_slots = Arc::clone(&filled_slots);
        Thread::spawn(ThreadAttr::new(), move || {
            for item in 0..ITEMS {
                empty_slots.wait().unwrap();
                buffer.lock().unwrap().push(item);
                filled_slots.post().unwrap();
            }
        })
        .unwrap()
    };

    let consumer = {
        let buffer = Arc::clone(&buffer);
        Thread::spawn(ThreadAttr::new(), move || {
            let mut consumed = Vec::with_capacity(ITEMS);
            for _ in 0..ITEMS {
                filled_slots.wait().unwrap();
                let item = buffer.lock().unwrap().remove(0);
                consumed.push(item);
                empty_slots.post().unwrap();
            }
            consumed
        })
        .unwrap()
    };

    producer.join().unwrap();
    let consumed = consumer.join().unwrap();
    assert_eq!(consumed, (0..ITEMS).collect::<Vec<_>>());
}

#[test]
fn condvar_count_to_twelve() {
    let total: Arc<Mutex<u64>> = Arc::new(Mutex::new(0));
    let condvar = Arc::new(Condvar::new());

    let mut incrementers = Vec::new();
    for _ in 0..2 {
        let total = Arc::clone(&total);
        let condvar = Arc::clone(&condvar);
        incrementers.push(Thread::spawn(ThreadAttr::new(), move || {
            for _ in 0..10 {
                *total.lock().unwrap() += 1;
                condvar.notify_all().unwrap();
            }
        }).unwrap());
    }

    let watcher = {
        let total = Arc::clone(&total);
        let condvar = Arc::clone(&condvar);
        Thread::spawn(ThreadAttr::new(), move || {
            let mut guard = total.lock().unwrap();
            while *guard < 12 {
                guard = condvar.wait(guard, &total).unwrap();
            }
            *guard += 125;
        })
        .unwrap()
    };

    for h in incrementers {
        h.join().unwrap();
    }
    watcher.join().unwrap();

    assert_eq!(*total.lock().unwrap(), 145);
}

#[test]
fn spinlock_race_shared_equals_sum_of_privates() {
    const WORKERS: usize = 5;
    const ITERATIONS: u64 = 20_000;

    let shared = Arc::new(SpinLock::new(0u64));
    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let shared = Arc::clone(&shared);
        handles.push(Thread::spawn(ThreadAttr::new(), move || {
            let mut private = 0u64;
            for _ in 0..ITERATIONS {
                *shared.lock() += 1;
                private += 1;
            }
            private
        }).unwrap());
    }

    let sum_of_privates: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(*shared.lock(), sum_of_privates);
    assert_eq!(sum_of_privates, WORKERS as u64 * ITERATIONS);
}

#[test]
fn dining_philosophers_all_eat() {
    const PHILOSOPHERS: usize = 5;
    const STEPS: usize = 200;

    struct Chopsticks {
        taken: Mutex<[bool; PHILOSOPHERS]>,
        free: Condvar,
    }

    let table = Arc::new(Chopsticks {
        taken: Mutex::new([false; PHILOSOPHERS]),
        free: Condvar::new(),
    });
    let eat_counts: Arc<Mutex<[u64; PHILOSOPHERS]>> = Arc::new(Mutex::new([0; PHILOSOPHERS]));

    let mut handles = Vec::new();
    for i in 0..PHILOSOPHERS {
        let table = Arc::clone(&table);
        let eat_counts = Arc::clone(&eat_counts);
        handles.push(Thread::spawn(ThreadAttr::new(), move || {
            let left = i;
            let right = (i + 1) % PHILOSOPHERS;
            for _ in 0..STEPS {
                let mut taken = table.taken.lock().unwrap();
                while taken[left] || taken[right] {
                    taken = table.free.wait(taken, &table.taken).unwrap();
                }
                taken[left] = true;
                taken[right] = true;
                drop(taken);

                eat_counts.lock().unwrap()[i] += 1;
                duothread::yield_now();

                let mut taken = table.taken.lock().unwrap();
                taken[left] = false;
                taken[right] = false;
                drop(taken);
                table.free.notify_all().unwrap();
            }
        }).unwrap());
    }

    for h in handles {
        h.join().unwrap();
    }

    let counts = *eat_counts.lock().unwrap();
    assert!(counts.iter().all(|&c| c > 0));
    assert_eq!(counts.iter().sum::<u64>(), (PHILOSOPHERS * STEPS) as u64);
}

#[test]
fn detached_thread_cannot_be_joined() {
    // The worker blocks on `release` so it cannot finish (and reclaim its
    // own resources) before the immediate join below observes the
    // already-detached state.
    let release = Arc::new(AtomicBool::new(false));
    let worker_release = Arc::clone(&release);
    let handle = Thread::spawn(ThreadAttr::new().with_joinable(false), move || {
        while !worker_release.load(Ordering::Acquire) {
            duothread::yield_now();
        }
    })
    .unwrap();

    let result = handle.join();
    assert!(matches!(result, Err(ThreadError::InvalidArgument(_))));

    release.store(true, Ordering::Release);
}
