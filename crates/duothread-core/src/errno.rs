//! Error taxonomy for the thread runtime.
//!
//! Every public operation returns `Result<T, ThreadError>` rather than a
//! raw platform errno. The mechanism layer still talks to the kernel in
//! terms of `i32` errno values (that's what `syscall_result` returns); this
//! module is the single place those get folded into the abstract taxonomy.

use thiserror::Error;

/// Abstract error taxonomy shared by both the M:1 and 1:1 runtimes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// A null required pointer, an unknown attribute selector, an
    /// out-of-range signal, a detached/already-joined target, or a
    /// self-join that isn't the deadlock case.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The target handle is absent from the task table.
    #[error("no such thread")]
    NotFound,

    /// A thread attempted to join itself.
    #[error("deadlock: thread attempted to join itself")]
    Deadlock,

    /// The thread cap was reached, or a memory/stack allocation failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// A required output pointer was null.
    #[error("fault: required output location was null")]
    Fault,

    /// A host primitive (clone, kill, wait-word) failed; `errno` is the
    /// raw platform error number.
    #[error("platform error (errno {0})")]
    PlatformError(i32),
}

pub type Result<T> = core::result::Result<T, ThreadError>;

impl From<i32> for ThreadError {
    fn from(errno: i32) -> Self {
        ThreadError::PlatformError(errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_round_trips_the_errno() {
        let err = ThreadError::from(22);
        assert_eq!(err, ThreadError::PlatformError(22));
    }

    #[test]
    fn display_messages_are_non_empty() {
        for err in [
            ThreadError::InvalidArgument("bad selector"),
            ThreadError::NotFound,
            ThreadError::Deadlock,
            ThreadError::ResourceExhausted("thread cap reached"),
            ThreadError::Fault,
            ThreadError::PlatformError(12),
        ] {
            assert!(!err.to_string().is_empty());
        }
    }
}
