//! Futex-style mutex (C7). Grounded on `one-one/src/mutex.c`'s three-state
//! (unlocked / locked-uncontended / locked-contended) Drepper algorithm.
//!
//! State `0` unlocked, `1` locked with no waiters, `2` locked with at
//! least one waiter. Unlock only calls into [`WaitWord::wake`] when the
//! prior state was `2`, so the uncontended path never touches the wait
//! backend at all.

use crate::errno::ThreadError;
use crate::sync::waitword::{DefaultWait, WaitWord};
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED_UNCONTENDED: u32 = 1;
const LOCKED_CONTENDED: u32 = 2;

pub struct Mutex<T, W: WaitWord = DefaultWait> {
    state: AtomicU32,
    value: UnsafeCell<T>,
    _wait: PhantomData<W>,
}

#[allow(unsafe_code)]
unsafe impl<T: Send, W: WaitWord> Sync for Mutex<T, W> {}
#[allow(unsafe_code)]
unsafe impl<T: Send, W: WaitWord> Send for Mutex<T, W> {}

impl<T, W: WaitWord> Mutex<T, W> {
    pub fn new(value: T) -> Self {
        Mutex {
            state: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
            _wait: PhantomData,
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, T, W>, ThreadError> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED_UNCONTENDED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Ok(MutexGuard { mutex: self });
        }

        let mut observed = self.state.swap(LOCKED_CONTENDED, Ordering::Acquire);
        while observed != UNLOCKED {
            W::wait_if_equal(&self.state, LOCKED_CONTENDED)?;
            observed = self.state.swap(LOCKED_CONTENDED, Ordering::Acquire);
        }
        Ok(MutexGuard { mutex: self })
    }

    pub fn try_lock(&self) -> Result<MutexGuard<'_, T, W>, ThreadError> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED_UNCONTENDED, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| MutexGuard { mutex: self })
            .map_err(|_| ThreadError::ResourceExhausted("mutex already held"))
    }

    fn unlock(&self) -> Result<(), ThreadError> {
        if self.state.swap(UNLOCKED, Ordering::Release) == LOCKED_CONTENDED {
            W::wake(&self.state, 1)?;
        }
        Ok(())
    }
}

pub struct MutexGuard<'a, T, W: WaitWord = DefaultWait> {
    mutex: &'a Mutex<T, W>,
}

impl<'a, T, W: WaitWord> Deref for MutexGuard<'a, T, W> {
    type Target = T;

    #[allow(unsafe_code)]
    fn deref(&self) -> &T {
        // SAFETY: holding the guard means we own the lock's state transition.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<'a, T, W: WaitWord> DerefMut for MutexGuard<'a, T, W> {
    #[allow(unsafe_code)]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard means we own the lock's state transition.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<'a, T, W: WaitWord> Drop for MutexGuard<'a, T, W> {
    fn drop(&mut self) {
        // Unlock failures here would indicate a wait-backend platform error;
        // there is no caller to propagate it to from a Drop impl.
        let _ = self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::waitword::DefaultWait;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_then_unlock_allows_reacquire() {
        let mutex: Mutex<u64, DefaultWait> = Mutex::new(0);
        {
            let mut guard = mutex.lock().unwrap();
            *guard += 1;
        }
        let guard = mutex.lock().unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex: Mutex<(), DefaultWait> = Mutex::new(());
        let guard = mutex.lock().unwrap();
        assert!(mutex.try_lock().is_err());
        drop(guard);
        assert!(mutex.try_lock().is_ok());
    }

    #[test]
    #[cfg(feature = "one_to_one")]
    fn contended_lock_across_os_threads_preserves_count() {
        let mutex: Arc<Mutex<u64, DefaultWait>> = Arc::new(Mutex::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    *mutex.lock().unwrap() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.lock().unwrap(), 4000);
    }
}
