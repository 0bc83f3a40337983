//! Synchronization primitives shared by both execution models.
//!
//! The mutex/condvar/semaphore algorithms are identical in both models —
//! they are lifted nearly verbatim from `one-one/src/{mutex,cond,sem}.c` —
//! but what it means to "wait" differs: the 1:1 model parks on a real
//! futex, the M:1 model busy-checks between timer-driven preemptions
//! (there is only one kernel thread, so there is nothing else to park
//! against). [`waitword`] is the seam that isolates that difference; the
//! primitives below are written once against its `WaitWord` trait.

pub mod condvar;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;
pub mod waitword;

pub use condvar::Condvar;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
pub use spinlock::SpinLock;
