//! # duothread
//!
//! A user-space threading library with one public API backed by two
//! interchangeable execution models, selected at compile time:
//!
//! - `one_to_one` (default): every [`Thread`] is a real kernel thread,
//!   created via `clone` and scheduled by Linux.
//! - `many_to_one`: a single kernel thread multiplexes every [`Thread`]
//!   cooperatively and preemptively, under a `SIGVTALRM`-driven scheduler.
//!
//! ```text
//! duothread (this crate, the public surface)
//!     |
//!     v
//! duothread-core (mechanism layer: onetoone::thread / manytoone::scheduler)
//!     |
//!     v
//! raw Linux syscalls (clone, futex, mmap, rt_sigaction, setitimer, ...)
//! ```
//!
//! Both models expose the same lifecycle — create, join, detach, kill,
//! yield, exit, equal — and share the same mutex/condvar/semaphore/spinlock
//! algorithms via `duothread_core::sync`'s wait-word abstraction. Only one
//! of `one_to_one`/`many_to_one` may be active in a given build;
//! `duothread-core` enforces that at compile time.
//!
//! The mechanism layer requires no explicit initialization call from
//! application code: the M:1 scheduler's one-time setup runs lazily behind
//! a [`std::sync::OnceLock`] the first time a thread is spawned.

pub use duothread_core::attr::ThreadAttr;
pub use duothread_core::errno::{Result, ThreadError};

mod sync_facade;
mod thread;

pub use sync_facade::{Condvar, Mutex, MutexGuard, Semaphore, SpinLock, SpinLockGuard};
pub use thread::Thread;

#[cfg(feature = "many_to_one")]
fn ensure_initialized() -> Result<()> {
    use std::sync::OnceLock;
    static INIT: OnceLock<Result<()>> = OnceLock::new();
    *INIT.get_or_init(duothread_core::manytoone::scheduler::init)
}

/// Voluntarily give up the CPU to another thread, if one is runnable.
pub fn yield_now() {
    #[cfg(feature = "one_to_one")]
    duothread_core::onetoone::thread::yield_now();
    #[cfg(feature = "many_to_one")]
    duothread_core::manytoone::scheduler::yield_now();
}

/// Terminate the calling thread immediately, as if its entry closure had
/// returned `code`. Never returns, and never unwinds back through the
/// closure's stack frames.
pub fn exit(code: usize) -> ! {
    #[cfg(feature = "one_to_one")]
    {
        // SAFETY: only ever called from a thread this crate spawned.
        unsafe { duothread_core::onetoone::thread::exit_now(code) }
    }
    #[cfg(feature = "many_to_one")]
    duothread_core::manytoone::scheduler::exit(code)
}
