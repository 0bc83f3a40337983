//! Condition variable (C8). Grounded on `one-one/src/cond.c`.
//!
//! The original keeps two counters: `value`, the futex word waiters block
//! on, and `previous`, the value last observed before sleeping. `wait`
//! snapshots `value` into `previous`, releases the caller's mutex, blocks
//! until `value` changes, then reacquires the mutex. `notify` bumps
//! `value` and wakes.

use crate::errno::ThreadError;
use crate::sync::mutex::{Mutex, MutexGuard};
use crate::sync::waitword::{DefaultWait, WaitWord};
use core::sync::atomic::{AtomicU32, Ordering};

pub struct Condvar<W: WaitWord = DefaultWait> {
    value: AtomicU32,
    _wait: core::marker::PhantomData<W>,
}

impl<W: WaitWord> Condvar<W> {
    pub fn new() -> Self {
        Condvar {
            value: AtomicU32::new(0),
            _wait: core::marker::PhantomData,
        }
    }

    /// Release `mutex`, block until woken, then reacquire `mutex`.
    ///
    /// Like the original, this can return spuriously (a wake can race a
    /// new waiter's snapshot); callers must re-check their predicate in a
    /// loop, the same discipline required by any futex-based condvar.
    pub fn wait<'a, T>(
        &self,
        guard: MutexGuard<'a, T, W>,
        mutex: &'a Mutex<T, W>,
    ) -> Result<MutexGuard<'a, T, W>, ThreadError> {
        let previous = self.value.load(Ordering::Acquire);
        drop(guard);
        W::wait_if_equal(&self.value, previous)?;
        mutex.lock()
    }

    pub fn notify_one(&self) -> Result<(), ThreadError> {
        self.value.fetch_add(1, Ordering::Release);
        W::wake(&self.value, 1)
    }

    pub fn notify_all(&self) -> Result<(), ThreadError> {
        self.value.fetch_add(1, Ordering::Release);
        W::wake(&self.value, i32::MAX)
    }
}

impl<W: WaitWord> Default for Condvar<W> {
    fn default() -> Self {
        Self::new()
    }
}
