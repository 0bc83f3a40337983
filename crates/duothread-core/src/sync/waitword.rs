//! The wait/wake seam between the two execution models.
//!
//! Grounded on `one-one/src/mutex.c`'s `futex()` wrapper for the 1:1 side.
//! The M:1 side has no second kernel thread to park against — the timer
//! handler preempts whichever thread is running regardless of what it is
//! doing — so waiting there degrades to checking the word between
//! voluntary yields, trusting the preemptive scheduler to eventually run
//! whoever is supposed to wake it.

use crate::errno::ThreadError;
use core::sync::atomic::AtomicU32;

/// A 32-bit word that threads can block on and be woken from.
///
/// `wait_if_equal` must only return while `word` still equals `expected`
/// due to a spurious wake; callers always re-check after it returns.
pub trait WaitWord {
    /// Block while `word.load() == expected`. May return spuriously.
    fn wait_if_equal(word: &AtomicU32, expected: u32) -> Result<(), ThreadError>;

    /// Wake up to `count` waiters blocked on `word`.
    fn wake(word: &AtomicU32, count: i32) -> Result<(), ThreadError>;
}

/// 1:1 backend: a real Linux futex, private to this process (`FUTEX_PRIVATE_FLAG`).
#[cfg(feature = "one_to_one")]
pub struct FutexWait;

#[cfg(feature = "one_to_one")]
impl WaitWord for FutexWait {
    #[allow(unsafe_code)]
    fn wait_if_equal(word: &AtomicU32, expected: u32) -> Result<(), ThreadError> {
        use crate::syscall;

        const FUTEX_WAIT: i32 = 0;
        const FUTEX_PRIVATE_FLAG: i32 = 128;
        const EAGAIN: i32 = 11;
        const EINTR: i32 = 4;

        loop {
            // SAFETY: word is a live, aligned AtomicU32 for the call's duration.
            let ret = unsafe {
                syscall::sys_futex(
                    word.as_ptr() as *const u32,
                    FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
                    expected,
                    0,
                    0,
                    0,
                )
            };
            return match ret {
                Ok(_) => Ok(()),
                Err(EAGAIN) => Ok(()),
                Err(EINTR) => continue,
                Err(e) => Err(ThreadError::from(e)),
            };
        }
    }

    #[allow(unsafe_code)]
    fn wake(word: &AtomicU32, count: i32) -> Result<(), ThreadError> {
        use crate::syscall;

        const FUTEX_WAKE: i32 = 1;
        const FUTEX_PRIVATE_FLAG: i32 = 128;

        // SAFETY: word is a live, aligned AtomicU32.
        unsafe {
            syscall::sys_futex(
                word.as_ptr() as *const u32,
                FUTEX_WAKE | FUTEX_PRIVATE_FLAG,
                count as u32,
                0,
                0,
                0,
            )
        }
        .map(|_| ())
        .map_err(ThreadError::from)
    }
}

/// M:1 backend: cooperative busy-check. There is exactly one kernel thread
/// running all M:1 user threads, so there is no second execution context to
/// park against; the timer-driven scheduler preempts this loop the same as
/// any other work, and whichever thread clears the word runs eventually.
#[cfg(feature = "many_to_one")]
pub struct YieldWait;

#[cfg(feature = "many_to_one")]
impl WaitWord for YieldWait {
    fn wait_if_equal(word: &AtomicU32, expected: u32) -> Result<(), ThreadError> {
        use crate::syscall;
        use core::sync::atomic::Ordering;

        while word.load(Ordering::Acquire) == expected {
            syscall::sys_sched_yield();
        }
        Ok(())
    }

    fn wake(_word: &AtomicU32, _count: i32) -> Result<(), ThreadError> {
        // Nothing to signal: waiters notice on their next poll.
        Ok(())
    }
}

#[cfg(feature = "one_to_one")]
pub type DefaultWait = FutexWait;

#[cfg(feature = "many_to_one")]
pub type DefaultWait = YieldWait;

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::Ordering;

    #[test]
    fn wake_on_unwaited_word_does_not_error() {
        let word = AtomicU32::new(0);
        assert!(DefaultWait::wake(&word, 1).is_ok());
    }

    #[test]
    fn wait_returns_immediately_once_value_already_differs() {
        let word = AtomicU32::new(5);
        word.store(6, Ordering::Release);
        assert!(DefaultWait::wait_if_equal(&word, 5).is_ok());
    }
}
