//! M:1 thread control block. Grounded on `many-one/include/types.h`'s
//! `mthread` struct and `mthread_state_t` enum.

use crate::attr::ThreadAttr;
use crate::manytoone::context::Context;
use crate::stack::Stack;
use crate::task_table::HasHandle;

/// Maximum live M:1 threads, matching `MTHREAD_MAX_THREADS` in the
/// original headers. Unlike the 1:1 model there is no kernel-imposed cap;
/// this bound exists to keep the scheduler's round-robin scan cheap and
/// to give `ThreadError::ResourceExhausted` a concrete trigger.
pub const MAX_THREADS: usize = 128;

/// Must match `attr::MAX_NAME_LEN`'s `many_to_one` value so a name
/// `ThreadAttr` already accepted is never silently truncated on copy into
/// the TCB (spec: 128 bytes for M:1, 64 for 1:1).
const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcbState {
    Running,
    Ready,
    Waiting,
    Finished,
}

/// A logical M:1 thread identifier. Monotonically assigned; never reused
/// while the scheduler is alive, so a stale id can never alias a live TCB.
pub type ThreadId = u32;

pub struct Tcb {
    pub id: ThreadId,
    pub state: TcbState,
    pub context: Context,
    pub stack: Option<Stack>,
    pub retval: usize,
    pub joinable: bool,
    pub joined_on: Option<ThreadId>,
    pub pending_signals: u64,
    /// User start routine / argument, read by the trampoline once this
    /// TCB becomes `current`. Unused by the bootstrap TCB.
    pub start_routine: usize,
    pub arg: usize,
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
}

impl HasHandle for Tcb {
    fn handle(&self) -> i32 {
        self.id as i32
    }
}

impl Tcb {
    pub fn bootstrap(id: ThreadId) -> Self {
        const BOOTSTRAP_NAME: &str = "bootstrap";
        let mut name = [0u8; MAX_NAME_LEN];
        name[..BOOTSTRAP_NAME.len()].copy_from_slice(BOOTSTRAP_NAME.as_bytes());
        Tcb {
            id,
            state: TcbState::Running,
            context: Context::empty(),
            stack: None,
            retval: 0,
            joinable: true,
            joined_on: None,
            pending_signals: 0,
            start_routine: 0,
            arg: 0,
            name,
            name_len: BOOTSTRAP_NAME.len(),
        }
    }

    pub fn new(id: ThreadId, context: Context, stack: Stack, attr: &ThreadAttr) -> Self {
        let name_bytes = attr.name().as_bytes();
        let name_len = name_bytes.len().min(MAX_NAME_LEN);
        let mut name = [0u8; MAX_NAME_LEN];
        name[..name_len].copy_from_slice(&name_bytes[..name_len]);
        Tcb {
            id,
            state: TcbState::Ready,
            context,
            stack: Some(stack),
            retval: 0,
            joinable: attr.is_joinable(),
            joined_on: None,
            pending_signals: 0,
            start_routine: 0,
            arg: 0,
            name,
            name_len,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }

    pub fn has_pending_signal(&self, sig: i32) -> bool {
        (0..64).contains(&sig) && (self.pending_signals & (1 << sig)) != 0
    }

    pub fn queue_signal(&mut self, sig: i32) {
        if (0..64).contains(&sig) {
            self.pending_signals |= 1 << sig;
        }
    }

    pub fn take_pending_signals(&mut self) -> u64 {
        core::mem::take(&mut self.pending_signals)
    }
}
