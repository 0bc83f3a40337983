//! Counting semaphore (C8). Grounded on `one-one/src/sem.c`.

use crate::errno::ThreadError;
use crate::sync::waitword::{DefaultWait, WaitWord};
use core::sync::atomic::{AtomicU32, Ordering};

pub struct Semaphore<W: WaitWord = DefaultWait> {
    count: AtomicU32,
    _wait: core::marker::PhantomData<W>,
}

impl<W: WaitWord> Semaphore<W> {
    pub fn new(initial: u32) -> Self {
        Semaphore {
            count: AtomicU32::new(initial),
            _wait: core::marker::PhantomData,
        }
    }

    /// Decrement, blocking while the count is zero.
    pub fn wait(&self) -> Result<(), ThreadError> {
        loop {
            let observed = self.count.load(Ordering::Acquire);
            if observed > 0 {
                if self
                    .count
                    .compare_exchange(observed, observed - 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }
            W::wait_if_equal(&self.count, 0)?;
        }
    }

    /// Non-blocking decrement; fails if the count is currently zero.
    pub fn try_wait(&self) -> Result<(), ThreadError> {
        let observed = self.count.load(Ordering::Acquire);
        if observed == 0 {
            return Err(ThreadError::ResourceExhausted("semaphore count is zero"));
        }
        self.count
            .compare_exchange(observed, observed - 1, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| ThreadError::ResourceExhausted("semaphore count changed under us"))
    }

    pub fn post(&self) -> Result<(), ThreadError> {
        self.count.fetch_add(1, Ordering::Release);
        W::wake(&self.count, 1)
    }

    pub fn value(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}
