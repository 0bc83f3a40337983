//! Raw x86_64 Linux syscall veneer.
//!
//! Provides zero-dependency raw syscall primitives using inline assembly,
//! plus typed wrappers for the syscalls needed by the thread runtime:
//! stack mapping, futex, clone, the preemption timer, and signal delivery.
//!
//! This module eliminates the dependency on `libc::syscall()` for the
//! critical path — the scheduler and supervisor issue syscalls directly.
//!
//! # Architecture
//!
//! x86_64 Linux syscall ABI:
//! - Syscall number: `rax`
//! - Arguments: `rdi`, `rsi`, `rdx`, `r10`, `r8`, `r9`
//! - Return: `rax` (negative values in `[-4095, -1]` indicate `-errno`)
//! - Clobbered: `rcx`, `r11`
//!
//! # Safety
//!
//! Each raw `syscallN` function is `unsafe` because the kernel trusts the
//! caller to supply valid arguments. The typed wrappers encode argument
//! types but cannot verify pointer validity — that remains the caller's
//! responsibility.

#[allow(unsafe_code)]
mod raw;

pub use raw::*;

// -------------------------------------------------------------------------
// Syscall number constants (x86_64 Linux)
// -------------------------------------------------------------------------

pub const SYS_MMAP: usize = 9;
pub const SYS_MPROTECT: usize = 10;
pub const SYS_MUNMAP: usize = 11;
pub const SYS_RT_SIGACTION: usize = 13;
pub const SYS_RT_SIGPROCMASK: usize = 14;
pub const SYS_GETPID: usize = 39;
pub const SYS_CLONE: usize = 56;
pub const SYS_EXIT: usize = 60;
pub const SYS_KILL: usize = 62;
pub const SYS_SETITIMER: usize = 38;
pub const SYS_SCHED_YIELD: usize = 24;
pub const SYS_EXIT_GROUP: usize = 231;
pub const SYS_FUTEX: usize = 202;
pub const SYS_SET_TID_ADDRESS: usize = 218;
pub const SYS_GETTID: usize = 186;
pub const SYS_TGKILL: usize = 234;
pub const SYS_GETRLIMIT: usize = 97;

/// `RLIMIT_STACK` resource number, for [`sys_getrlimit`].
pub const RLIMIT_STACK: usize = 3;

/// Mirrors the kernel's `struct rlimit`: two `u64` words, soft then hard.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RLimit {
    pub cur: u64,
    pub max: u64,
}

// -------------------------------------------------------------------------
// Error handling
// -------------------------------------------------------------------------

/// Maximum errno value returned by Linux syscalls.
const MAX_ERRNO: usize = 4095;

/// Convert a raw syscall return value to `Result<usize, i32>`.
///
/// On x86_64 Linux, error returns are in the range `[-(MAX_ERRNO), -1]`
/// which in unsigned representation is `[usize::MAX - MAX_ERRNO + 1, usize::MAX]`.
#[inline]
pub fn syscall_result(ret: usize) -> Result<usize, i32> {
    if ret > usize::MAX - MAX_ERRNO {
        Err(-(ret as isize) as i32)
    } else {
        Ok(ret)
    }
}

// -------------------------------------------------------------------------
// Typed syscall wrappers
// -------------------------------------------------------------------------

/// `mmap(addr, length, prot, flags, fd, offset)` — map memory.
///
/// # Safety
///
/// The caller must ensure the mapping parameters are valid and that the
/// resulting memory region is used according to the requested protection.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_mmap(
    addr: *mut u8,
    length: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut u8, i32> {
    // SAFETY: caller is responsible for mapping validity.
    let ret = unsafe {
        raw::syscall6(
            SYS_MMAP,
            addr as usize,
            length,
            prot as usize,
            flags as usize,
            fd as usize,
            offset as usize,
        )
    };
    syscall_result(ret).map(|v| v as *mut u8)
}

/// `munmap(addr, length)` — unmap memory.
///
/// # Safety
///
/// `addr` must be page-aligned and the range `[addr, addr+length)` must
/// be a valid mapped region.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_munmap(addr: *mut u8, length: usize) -> Result<(), i32> {
    // SAFETY: caller guarantees addr/length validity.
    let ret = unsafe { raw::syscall2(SYS_MUNMAP, addr as usize, length) };
    syscall_result(ret).map(|_| ())
}

/// `mprotect(addr, length, prot)` — set protection on a memory region.
///
/// # Safety
///
/// `addr` must be page-aligned and the range must be mapped.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_mprotect(addr: *mut u8, length: usize, prot: i32) -> Result<(), i32> {
    // SAFETY: caller guarantees addr/length validity.
    let ret = unsafe { raw::syscall3(SYS_MPROTECT, addr as usize, length, prot as usize) };
    syscall_result(ret).map(|_| ())
}

/// `futex(uaddr, futex_op, val, timeout, uaddr2, val3)` — fast userspace mutex.
///
/// # Safety
///
/// `uaddr` must point to a valid aligned `u32`. Other pointer arguments
/// depend on the specific futex operation.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_futex(
    uaddr: *const u32,
    futex_op: i32,
    val: u32,
    timeout: usize,
    uaddr2: usize,
    val3: u32,
) -> Result<isize, i32> {
    // SAFETY: caller guarantees uaddr validity and op-specific invariants.
    let ret = unsafe {
        raw::syscall6(
            SYS_FUTEX,
            uaddr as usize,
            futex_op as usize,
            val as usize,
            timeout,
            uaddr2,
            val3 as usize,
        )
    };
    syscall_result(ret).map(|v| v as isize)
}

/// `exit_group(status)` — terminate all threads in the process.
#[inline]
#[allow(unsafe_code)]
pub fn sys_exit_group(status: i32) -> ! {
    // SAFETY: exit_group never returns.
    unsafe { raw::syscall1(SYS_EXIT_GROUP, status as usize) };
    loop {
        core::hint::spin_loop();
    }
}

/// `getpid()` — get process ID.
#[inline]
#[allow(unsafe_code)]
pub fn sys_getpid() -> i32 {
    // SAFETY: getpid has no preconditions.
    let ret = unsafe { raw::syscall0(SYS_GETPID) };
    ret as i32
}

/// `gettid()` — get the caller's thread ID (kernel TID).
#[inline]
#[allow(unsafe_code)]
pub fn sys_gettid() -> i32 {
    // SAFETY: gettid has no preconditions.
    let ret = unsafe { raw::syscall0(SYS_GETTID) };
    ret as i32
}

/// `set_tid_address(tidptr)` — set the `clear_child_tid` address.
///
/// Passing a null pointer disables the kernel's clear-and-wake on exit,
/// used when a detached thread frees its own handle before exiting.
///
/// # Safety
///
/// `tidptr` must be null or a valid, aligned `i32` for the thread's lifetime.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_set_tid_address(tidptr: usize) -> i32 {
    // SAFETY: caller guarantees tidptr validity or null.
    let ret = unsafe { raw::syscall1(SYS_SET_TID_ADDRESS, tidptr) };
    ret as i32
}

/// `exit(status)` — terminate the calling thread (not the entire process).
///
/// Unlike `exit_group`, this only terminates the calling thread.
#[inline]
#[allow(unsafe_code)]
pub fn sys_exit_thread(status: i32) -> ! {
    // SAFETY: SYS_EXIT terminates only the calling thread.
    unsafe { raw::syscall1(SYS_EXIT, status as usize) };
    loop {
        core::hint::spin_loop();
    }
}

/// `sched_yield()` — voluntarily relinquish the CPU.
#[inline]
#[allow(unsafe_code)]
pub fn sys_sched_yield() {
    // SAFETY: sched_yield has no preconditions.
    unsafe {
        raw::syscall0(SYS_SCHED_YIELD);
    }
}

/// `tgkill(tgid, tid, sig)` — send a signal to a specific thread.
#[inline]
#[allow(unsafe_code)]
pub fn sys_tgkill(tgid: i32, tid: i32, sig: i32) -> Result<(), i32> {
    // SAFETY: tgkill validates tgid/tid/sig itself; no pointer arguments.
    let ret = unsafe { raw::syscall3(SYS_TGKILL, tgid as usize, tid as usize, sig as usize) };
    syscall_result(ret).map(|_| ())
}

/// `kill(pid, sig)` — send a signal to a process (used for self-directed raise).
#[inline]
#[allow(unsafe_code)]
pub fn sys_kill(pid: i32, sig: i32) -> Result<(), i32> {
    // SAFETY: kill validates pid/sig itself; no pointer arguments.
    let ret = unsafe { raw::syscall2(SYS_KILL, pid as usize, sig as usize) };
    syscall_result(ret).map(|_| ())
}

/// `getrlimit(resource, &mut rlim)` — read a resource limit, used at thread
/// creation to size the 1:1 model's default stack off the host's current
/// `RLIMIT_STACK` rather than a fixed constant.
#[inline]
#[allow(unsafe_code)]
pub fn sys_getrlimit(resource: usize) -> Result<RLimit, i32> {
    let mut limit = RLimit { cur: 0, max: 0 };
    let limit_ptr = &mut limit as *mut RLimit as usize;
    // SAFETY: limit_ptr is a valid, aligned, writable RLimit for the
    // duration of this call.
    let ret = unsafe { raw::syscall2(SYS_GETRLIMIT, resource, limit_ptr) };
    syscall_result(ret).map(|_| limit)
}

/// `setitimer(which, new_value, old_value)` — arm or disarm an interval timer.
///
/// # Safety
///
/// `new_value` must point to a valid `libc::itimerval`; `old_value` may be null.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_setitimer(
    which: i32,
    new_value: *const libc::itimerval,
    old_value: *mut libc::itimerval,
) -> Result<(), i32> {
    // SAFETY: caller guarantees new_value/old_value validity.
    let ret = unsafe {
        raw::syscall3(
            SYS_SETITIMER,
            which as usize,
            new_value as usize,
            old_value as usize,
        )
    };
    syscall_result(ret).map(|_| ())
}

/// `rt_sigaction(signum, act, oldact)` — install a signal handler.
///
/// # Safety
///
/// `act` must point to a valid `libc::sigaction`, sized for the kernel's
/// expected `sigset_t` (8 bytes on x86_64). `oldact` may be null.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_rt_sigaction(
    signum: i32,
    act: *const libc::sigaction,
    oldact: *mut libc::sigaction,
) -> Result<(), i32> {
    const SIGSETSIZE: usize = 8;
    // SAFETY: caller guarantees act/oldact validity.
    let ret = unsafe {
        raw::syscall4(
            SYS_RT_SIGACTION,
            signum as usize,
            act as usize,
            oldact as usize,
            SIGSETSIZE,
        )
    };
    syscall_result(ret).map(|_| ())
}

/// `rt_sigprocmask(how, set, oldset)` — examine or change the blocked-signal mask.
///
/// # Safety
///
/// `set` must point to a valid `libc::sigset_t` or be null; `oldset` may be null.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_rt_sigprocmask(
    how: i32,
    set: *const libc::sigset_t,
    oldset: *mut libc::sigset_t,
) -> Result<(), i32> {
    const SIGSETSIZE: usize = 8;
    // SAFETY: caller guarantees set/oldset validity.
    let ret = unsafe {
        raw::syscall4(
            SYS_RT_SIGPROCMASK,
            how as usize,
            set as usize,
            oldset as usize,
            SIGSETSIZE,
        )
    };
    syscall_result(ret).map(|_| ())
}

/// Create a new thread via `clone` syscall with a child trampoline.
///
/// The child stack must be pre-populated:
/// - `[child_sp + 0]`: function pointer (`unsafe extern "C" fn(usize) -> usize`)
/// - `[child_sp + 8]`: argument to pass as first parameter to the function
///
/// After clone, the child will:
/// 1. Pop the function pointer from the stack
/// 2. Pop the argument and pass it in `rdi` (first C ABI argument)
/// 3. Call the function
/// 4. Use the return value as the thread exit status
///
/// The parent receives the child's TID (or a negative errno).
///
/// # Safety
///
/// - `child_sp` must point to a properly prepared child stack as described above.
/// - The child stack region must be valid and have sufficient space.
/// - `parent_tid` and `child_tid` must be valid pointers if the corresponding
///   `CLONE_PARENT_SETTID` / `CLONE_CHILD_CLEARTID` flags are set.
/// - The function pointer at `[child_sp]` must be a valid, callable function
///   that accepts a `usize` argument and returns a `usize`.
#[inline]
#[allow(unsafe_code)]
pub unsafe fn sys_clone_thread(
    flags: usize,
    child_sp: usize,
    parent_tid: *mut i32,
    child_tid: *mut i32,
    tls: usize,
) -> Result<i32, i32> {
    // SAFETY: caller guarantees child_sp, parent_tid, child_tid validity
    // and proper stack setup. The inline asm handles parent vs child paths.
    let ret = unsafe {
        raw::clone_thread_asm(
            flags,
            child_sp,
            parent_tid as usize,
            child_tid as usize,
            tls,
        )
    };
    // Negative returns (in unsigned two's complement) indicate -errno.
    let signed = ret as isize;
    if signed < 0 {
        Err((-signed) as i32)
    } else {
        Ok(signed as i32)
    }
}

// -------------------------------------------------------------------------
// Unit tests
// -------------------------------------------------------------------------

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn getpid_returns_positive() {
        let pid = sys_getpid();
        assert!(pid > 0, "getpid should return a positive PID, got {pid}");
    }

    #[test]
    fn gettid_returns_positive() {
        let tid = sys_gettid();
        assert!(tid > 0, "gettid should return a positive TID, got {tid}");
    }

    #[test]
    fn mmap_anonymous_roundtrip() {
        let page_size = 4096usize;
        // SAFETY: anonymous mmap with no fd.
        let ptr = unsafe {
            sys_mmap(
                core::ptr::null_mut(),
                page_size,
                0x1 | 0x2,   // PROT_READ | PROT_WRITE
                0x02 | 0x20, // MAP_PRIVATE | MAP_ANONYMOUS
                -1,
                0,
            )
        };
        assert!(ptr.is_ok(), "mmap should succeed, got {ptr:?}");
        let ptr = ptr.unwrap();
        assert!(!ptr.is_null(), "mmap should return non-null");

        // SAFETY: we just mapped this region as RW.
        unsafe {
            *ptr = 42;
            assert_eq!(*ptr, 42, "should be able to write/read mapped memory");
        }

        // SAFETY: valid mapping.
        let unmap = unsafe { sys_munmap(ptr, page_size) };
        assert!(unmap.is_ok(), "munmap should succeed");
    }

    #[test]
    fn mprotect_removes_write_access() {
        let page_size = 4096usize;
        // SAFETY: anonymous mmap.
        let ptr = unsafe {
            sys_mmap(
                core::ptr::null_mut(),
                page_size,
                0x1 | 0x2,
                0x02 | 0x20,
                -1,
                0,
            )
        }
        .expect("mmap should succeed");

        // SAFETY: valid mapping, changing to read-only.
        let protect = unsafe { sys_mprotect(ptr, page_size, 0x1) };
        assert!(protect.is_ok(), "mprotect should succeed");

        // SAFETY: valid mapping.
        let unmap = unsafe { sys_munmap(ptr, page_size) };
        assert!(unmap.is_ok());
    }

    #[test]
    fn syscall_result_success() {
        assert_eq!(syscall_result(0), Ok(0));
        assert_eq!(syscall_result(42), Ok(42));
        assert_eq!(syscall_result(usize::MAX - 4096), Ok(usize::MAX - 4096));
    }

    #[test]
    fn syscall_result_error() {
        assert_eq!(syscall_result(usize::MAX), Err(1));
        assert_eq!(syscall_result((-9isize) as usize), Err(9));
        assert_eq!(syscall_result((-4095isize) as usize), Err(4095));
    }

    #[test]
    fn sched_yield_does_not_panic() {
        sys_sched_yield();
    }

    #[test]
    fn kill_self_with_signal_zero_is_a_liveness_probe() {
        let pid = sys_getpid();
        assert!(sys_kill(pid, 0).is_ok(), "signal 0 to self should succeed");
    }
}
