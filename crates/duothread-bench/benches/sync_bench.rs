//! Synchronization primitive benchmarks: uncontended lock/unlock cost for
//! each of the four primitives sharing the wait-word abstraction.

use criterion::{criterion_group, criterion_main, Criterion};
use duothread::{Mutex, Semaphore, SpinLock};

fn bench_spinlock(c: &mut Criterion) {
    let lock = SpinLock::new(0u64);
    c.bench_function("spinlock_uncontended", |b| {
        b.iter(|| {
            *lock.lock() += 1;
        });
    });
}

fn bench_mutex(c: &mut Criterion) {
    let mutex: Mutex<u64> = Mutex::new(0);
    c.bench_function("mutex_uncontended", |b| {
        b.iter(|| {
            *mutex.lock().unwrap() += 1;
        });
    });
}

fn bench_semaphore(c: &mut Criterion) {
    let sem: Semaphore = Semaphore::new(1);
    c.bench_function("semaphore_wait_post", |b| {
        b.iter(|| {
            sem.wait().unwrap();
            sem.post().unwrap();
        });
    });
}

criterion_group!(benches, bench_spinlock, bench_mutex, bench_semaphore);
criterion_main!(benches);
