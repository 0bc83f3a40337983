//! 1:1 execution model: every user thread is a kernel thread created via
//! `clone`, scheduled by the Linux scheduler. The supervisor here adapts
//! the original runtime's clone/join/detach protocol to the shared
//! [`crate::errno::ThreadError`] taxonomy and [`crate::attr::ThreadAttr`].

pub mod thread;

pub use thread::{ThreadHandle, THREAD_DETACHED, THREAD_FINISHED, THREAD_JOINED, THREAD_RUNNING, THREAD_STARTING};

use crate::sync::spinlock::SpinLock;
use crate::task_table::TaskTable;
use std::sync::OnceLock;

/// Maximum live 1:1 threads the registry admits. The original runtime reads
/// this from `getrlimit(RLIMIT_NPROC, ...)` (`get_extant_process_limit` in
/// `one-one/src/mthread.c`); we use a fixed, portable bound instead so the
/// cap doesn't vary with the host's process-count ulimit.
pub const MAX_THREADS: usize = 4096;

/// A registry entry: raw identity of a live, not-yet-reclaimed thread
/// handle. Looked up by pointer equality rather than through `HasHandle`,
/// since a pointer doesn't fit the table's `i32` handle type.
#[derive(Clone, Copy)]
struct Registered(*mut ThreadHandle);

// SAFETY: the pointer is only read or compared while the registry's
// spinlock is held; ThreadHandle itself is already Send + Sync.
#[allow(unsafe_code)]
unsafe impl Send for Registered {}

/// The live-thread registry: every handle `spawn` has registered and that
/// neither `join`, `detach`, nor a detached thread's own self-clean has yet
/// removed. Grounded on the original's single global `task_q` guarded
/// implicitly by holding the lock across the whole create/join/detach
/// critical section (`one-one/src/mthread.c`'s `thread_create`/
/// `thread_join`, SPEC_FULL.md §4.4b).
fn registry() -> &'static SpinLock<TaskTable<Registered>> {
    static REGISTRY: OnceLock<SpinLock<TaskTable<Registered>>> = OnceLock::new();
    REGISTRY.get_or_init(|| SpinLock::new(TaskTable::new()))
}
