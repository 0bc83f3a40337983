//! Synchronization primitives, fixed to the wait-word backend matching the
//! active execution model so callers never have to name it.
//!
//! These are thin type aliases over [`duothread_core::sync`]; the locking
//! algorithms themselves live there.

use duothread_core::sync::waitword::DefaultWait;

pub type Mutex<T> = duothread_core::sync::Mutex<T, DefaultWait>;
pub type MutexGuard<'a, T> = duothread_core::sync::mutex::MutexGuard<'a, T, DefaultWait>;
pub type Condvar = duothread_core::sync::Condvar<DefaultWait>;
pub type Semaphore = duothread_core::sync::Semaphore<DefaultWait>;
pub use duothread_core::sync::SpinLock;
pub use duothread_core::sync::spinlock::SpinLockGuard;
