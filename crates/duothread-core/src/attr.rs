//! Thread attribute object (C3).
//!
//! Grounded on the original C `attr.c`: a small bag of creation-time
//! parameters with named getters/setters and fixed defaults. The C version
//! dispatches get/set through a varargs `mthread_attr_ctrl` selector; here
//! the selector is an ordinary enum and each field gets its own accessor,
//! which is the idiomatic Rust shape for the same contract.

use crate::errno::ThreadError;

/// Absolute floor honored by the M:1 model, and the fallback the 1:1
/// model uses when the host's stack-size limit can't be determined.
/// Requests below the active model's floor are silently raised rather
/// than rejected (spec decision, §9).
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Default 1:1 stack size used only when `RLIMIT_STACK` is reported as
/// unbounded or the query itself fails. Matches the original one-one
/// runtime's fixed default (`one-one/src/attr.c`: `a_stacksize = 8196 *
/// 1024`).
#[cfg(feature = "one_to_one")]
const FALLBACK_STACK_SIZE: usize = 8196 * 1024;

/// The model-appropriate default *and* floor for `stack_size`. M:1 has no
/// kernel-imposed stack limit to consult, so its floor is the fixed
/// [`MIN_STACK_SIZE`]. 1:1 threads are real kernel tasks, so the floor
/// tracks the host's *current* `RLIMIT_STACK` (spec §4.3: "stack size =
/// library minimum ... 1:1: the host's current stack-size limit").
#[cfg(feature = "one_to_one")]
fn stack_size_floor() -> usize {
    match crate::syscall::sys_getrlimit(crate::syscall::RLIMIT_STACK) {
        Ok(limit) if limit.cur != u64::MAX && limit.cur > 0 => limit.cur as usize,
        _ => FALLBACK_STACK_SIZE,
    }
}

#[cfg(feature = "many_to_one")]
fn stack_size_floor() -> usize {
    MIN_STACK_SIZE
}

const DEFAULT_NAME: &str = "Unknown";

/// Must track the active model's own name-buffer capacity exactly
/// (`onetoone::thread::MAX_NAME_LEN` = 64, `manytoone::tcb::MAX_NAME_LEN` =
/// 128) so a name this validation accepts is never silently truncated when
/// copied into the handle/TCB.
#[cfg(feature = "one_to_one")]
const MAX_NAME_LEN: usize = 64;
#[cfg(feature = "many_to_one")]
const MAX_NAME_LEN: usize = 128;

/// Which field an `AttrSelector`-style accessor addresses. Kept even though
/// Rust doesn't need a runtime selector for dispatch, because the task
/// table snapshot and attribute diffing code addresses fields generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrField {
    Name,
    Joinable,
    StackSize,
    StackAddr,
}

/// Creation-time parameters for a new thread.
///
/// Defaults: name `"Unknown"`, joinable, stack size raised to
/// [`MIN_STACK_SIZE`], no caller-supplied stack.
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
    joinable: bool,
    stack_size: usize,
    stack_addr: Option<usize>,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        let mut name = [0u8; MAX_NAME_LEN];
        let bytes = DEFAULT_NAME.as_bytes();
        name[..bytes.len()].copy_from_slice(bytes);
        ThreadAttr {
            name,
            name_len: bytes.len(),
            joinable: true,
            stack_size: stack_size_floor(),
            stack_addr: None,
        }
    }
}

impl ThreadAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or(DEFAULT_NAME)
    }

    /// Names longer than [`MAX_NAME_LEN`] are rejected rather than
    /// truncated, since a silently truncated identity is more confusing
    /// than an error at creation time.
    pub fn set_name(&mut self, name: &str) -> Result<(), ThreadError> {
        let bytes = name.as_bytes();
        if bytes.len() >= MAX_NAME_LEN {
            return Err(ThreadError::InvalidArgument("thread name too long"));
        }
        self.name = [0u8; MAX_NAME_LEN];
        self.name[..bytes.len()].copy_from_slice(bytes);
        self.name_len = bytes.len();
        Ok(())
    }

    pub fn is_joinable(&self) -> bool {
        self.joinable
    }

    pub fn set_joinable(&mut self, joinable: bool) {
        self.joinable = joinable;
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Requests below the active model's floor (see [`stack_size_floor`])
    /// are silently raised, matching the original runtime's clamp in
    /// `mthread_create` rather than failing.
    pub fn set_stack_size(&mut self, size: usize) {
        self.stack_size = size.max(stack_size_floor());
    }

    pub fn stack_addr(&self) -> Option<usize> {
        self.stack_addr
    }

    /// Supply a caller-owned stack region instead of having the runtime
    /// allocate one. The runtime will not free a caller-supplied stack.
    pub fn set_stack_addr(&mut self, addr: usize) {
        self.stack_addr = Some(addr);
    }

    /// Builder-style variant of [`Self::set_name`].
    pub fn with_name(mut self, name: &str) -> Result<Self, ThreadError> {
        self.set_name(name)?;
        Ok(self)
    }

    pub fn with_joinable(mut self, joinable: bool) -> Self {
        self.set_joinable(joinable);
        self
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.set_stack_size(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_runtime() {
        let attr = ThreadAttr::new();
        assert_eq!(attr.name(), "Unknown");
        assert!(attr.is_joinable());
        assert_eq!(attr.stack_size(), stack_size_floor());
        assert_eq!(attr.stack_addr(), None);
    }

    #[test]
    fn stack_size_below_the_floor_is_silently_raised() {
        let mut attr = ThreadAttr::new();
        attr.set_stack_size(1024);
        assert_eq!(attr.stack_size(), stack_size_floor());
    }

    #[test]
    fn stack_size_above_the_floor_is_kept() {
        let mut attr = ThreadAttr::new();
        let requested = 4 * stack_size_floor();
        attr.set_stack_size(requested);
        assert_eq!(attr.stack_size(), requested);
    }

    #[test]
    fn set_name_rejects_overlong_names() {
        let mut attr = ThreadAttr::new();
        let too_long = "x".repeat(MAX_NAME_LEN);
        assert_eq!(
            attr.set_name(&too_long),
            Err(ThreadError::InvalidArgument("thread name too long"))
        );
    }

    #[test]
    fn builder_chain_produces_expected_attr() {
        let requested = 4 * stack_size_floor();
        let attr = ThreadAttr::new()
            .with_name("worker")
            .unwrap()
            .with_joinable(false)
            .with_stack_size(requested);
        assert_eq!(attr.name(), "worker");
        assert!(!attr.is_joinable());
        assert_eq!(attr.stack_size(), requested);
    }
}
