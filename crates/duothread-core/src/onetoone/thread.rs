//! 1:1 thread creation and management — clone-based bootstrap.
//!
//! Adapted from the clone/futex protocol the teacher crate used for its
//! glibc `pthread_create`/`pthread_join` replacement. The lifecycle state
//! machine, trampoline layout, and join-via-CLONE_CHILD_CLEARTID idiom are
//! unchanged; what's new is routing through [`Stack`], [`ThreadAttr`], the
//! abstract [`ThreadError`] taxonomy, and the kill/yield/equal operations
//! the original C `one-one` tree never had a direct equivalent for (signal
//! delivery there is the M:1 `mthread_kill`'s job — here it is `tgkill`).
//!
//! ## Lifecycle State Machine
//!
//! ```text
//!   STARTING ──> RUNNING ──┬──> FINISHED ──> JOINED  (join)
//!                          │         │
//!                          │         └──> DETACHED   (detach after finish → immediate cleanup)
//!                          │
//!                          └──> DETACHED ──> (self-cleanup on exit)
//! ```
//!
//! State transitions are CAS-protected so exactly one of join/detach succeeds.

use crate::attr::ThreadAttr;
use crate::errno::ThreadError;
use crate::onetoone::{registry, Registered, MAX_THREADS};
use crate::stack::Stack;
use crate::syscall;
use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

pub const THREAD_STARTING: u32 = 0;
pub const THREAD_RUNNING: u32 = 1;
pub const THREAD_FINISHED: u32 = 2;
pub const THREAD_DETACHED: u32 = 3;
pub const THREAD_JOINED: u32 = 4;

#[allow(unsafe_code)]
const CLONE_THREAD_FLAGS: usize = {
    const CLONE_VM: usize = 0x0000_0100;
    const CLONE_FS: usize = 0x0000_0200;
    const CLONE_FILES: usize = 0x0000_0400;
    const CLONE_SIGHAND: usize = 0x0000_0800;
    const CLONE_THREAD: usize = 0x0001_0000;
    const CLONE_SYSVSEM: usize = 0x0004_0000;
    const CLONE_PARENT_SETTID: usize = 0x0010_0000;
    const CLONE_CHILD_CLEARTID: usize = 0x0020_0000;
    CLONE_VM
        | CLONE_FS
        | CLONE_FILES
        | CLONE_SIGHAND
        | CLONE_THREAD
        | CLONE_SYSVSEM
        | CLONE_PARENT_SETTID
        | CLONE_CHILD_CLEARTID
};

const FUTEX_WAIT_PRIVATE: i32 = 0x80;
const FUTEX_WAKE_PRIVATE: i32 = 0x01 | 0x80;

/// Fixed-length name buffer for a 1:1 handle (spec: 64 bytes for 1:1, 128
/// for M:1 — see `manytoone::tcb::MAX_NAME_LEN`). Must be `>=`
/// `attr::MAX_NAME_LEN`'s one_to_one value so a name `ThreadAttr` already
/// accepted is never silently truncated on copy into the handle.
const MAX_NAME_LEN: usize = 64;

/// Per-thread control block. Allocated on the heap; the raw pointer to it
/// is the opaque thread handle handed back to callers.
#[repr(C)]
pub struct ThreadHandle {
    pub tid: AtomicI32,
    pub state: AtomicU32,
    pub started: AtomicU32,
    pub retval: core::cell::UnsafeCell<usize>,
    stack: Stack,
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
}

#[allow(unsafe_code)]
unsafe impl Send for ThreadHandle {}
#[allow(unsafe_code)]
unsafe impl Sync for ThreadHandle {}

impl ThreadHandle {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }

    pub fn tid(&self) -> i32 {
        self.tid.load(Ordering::Acquire)
    }
}

std::thread_local! {
    static CURRENT_HANDLE: core::cell::Cell<*mut ThreadHandle> =
        const { core::cell::Cell::new(core::ptr::null_mut()) };
}

#[repr(C)]
struct ThreadStartArgs {
    handle: *mut ThreadHandle,
    start_routine: usize,
    arg: usize,
}

#[allow(unsafe_code)]
unsafe extern "C" fn thread_trampoline(args_raw: usize) -> usize {
    // SAFETY: args_raw points at a ThreadStartArgs the parent placed on this
    // stack before clone; valid until the fields below are read out.
    let args = unsafe { &*(args_raw as *const ThreadStartArgs) };
    let handle_ptr = args.handle;
    let start_routine_addr = args.start_routine;
    let arg = args.arg;

    CURRENT_HANDLE.with(|cell| cell.set(handle_ptr));

    // SAFETY: handle_ptr is valid for the thread's entire lifetime.
    let handle = unsafe { &*handle_ptr };

    let _ = handle.state.compare_exchange(
        THREAD_STARTING,
        THREAD_RUNNING,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    handle.started.store(1, Ordering::Release);

    let futex_ptr = &handle.started as *const AtomicU32 as *const u32;
    // SAFETY: futex_ptr is a valid, aligned u32 inside the handle.
    let _ = unsafe { syscall::sys_futex(futex_ptr, FUTEX_WAKE_PRIVATE, 1, 0, 0, 0) };

    // SAFETY: start_routine_addr was stored by the parent as a valid fn pointer.
    let start_fn: unsafe extern "C" fn(usize) -> usize =
        unsafe { core::mem::transmute(start_routine_addr) };
    let retval = unsafe { start_fn(arg) };

    // SAFETY: handle_ptr is the handle this trampoline was invoked with.
    unsafe { finish_current(handle_ptr, retval) };

    0
}

/// Common tail for both an ordinary return from the start routine and an
/// explicit [`exit_now`] call: record the return value, flip to FINISHED,
/// and self-clean if the thread was detached out from under it.
///
/// # Safety
///
/// `handle_ptr` must be the handle of the thread calling this.
#[allow(unsafe_code)]
unsafe fn finish_current(handle_ptr: *mut ThreadHandle, retval: usize) {
    // SAFETY: handle_ptr is valid for the calling thread's entire lifetime.
    let handle = unsafe { &*handle_ptr };

    // SAFETY: no concurrent readers exist until tid is cleared below.
    unsafe { *handle.retval.get() = retval };

    let prev = handle.state.compare_exchange(
        THREAD_RUNNING,
        THREAD_FINISHED,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    if prev == Err(THREAD_DETACHED) {
        // Detached while running: no joiner will free us, so self-clean.
        // Disable CLONE_CHILD_CLEARTID first so the kernel doesn't write
        // into memory we're about to free.
        syscall::sys_set_tid_address(0);
        unregister(handle_ptr);
        // SAFETY: handle_ptr came from Box::into_raw in spawn().
        unsafe { drop(Box::from_raw(handle_ptr)) };
    }
}

/// True iff `handle_ptr` is still a live, registered handle — neither
/// freed by a prior join/detach nor by this thread's own self-clean.
/// Looked up before any dereference of `handle_ptr` so a stale or unknown
/// handle yields a typed error instead of undefined behavior.
fn is_registered(handle_ptr: *mut ThreadHandle) -> bool {
    registry()
        .lock()
        .find(|r| core::ptr::eq(r.0, handle_ptr))
        .is_some()
}

/// Remove `handle_ptr` from the registry. Called exactly at the point its
/// backing memory is about to be freed (`finish_join`, `detach`'s
/// immediate-free branch, and `finish_current`'s self-clean branch) so
/// removal and freeing stay atomic with respect to a concurrent lookup.
fn unregister(handle_ptr: *mut ThreadHandle) {
    registry()
        .lock()
        .remove_where(|r| core::ptr::eq(r.0, handle_ptr));
}

/// Terminate the calling thread immediately, as if its start routine had
/// returned `retval`. Unlike an ordinary return, this never unwinds back
/// through the start routine's stack frames.
///
/// # Safety
///
/// Must be called from a thread spawned by [`spawn`], never from the
/// process's original thread.
#[allow(unsafe_code)]
pub unsafe fn exit_now(retval: usize) -> ! {
    let handle_ptr = CURRENT_HANDLE.with(|cell| cell.get());
    if !handle_ptr.is_null() {
        // SAFETY: handle_ptr came from this thread's own CURRENT_HANDLE slot.
        unsafe { finish_current(handle_ptr, retval) };
    }
    syscall::sys_exit_thread(0);
}

/// Create a new 1:1 thread via `clone`.
///
/// `start_routine` is `extern "C" fn(*mut c_void) -> usize` cast to `usize`;
/// `arg` is the argument cast to `usize`.
///
/// The registry spinlock is held across the whole operation — cap check,
/// stack/handle allocation, the `clone` call itself, and registration —
/// matching the original's single global `task_q` lock discipline
/// (SPEC_FULL.md §4.4b: "with the runtime spinlock held ... invoke the
/// clone primitive ... Append the TCB ... release the spinlock").
#[allow(unsafe_code)]
pub fn spawn(
    start_routine: usize,
    arg: usize,
    attr: &ThreadAttr,
) -> Result<*mut ThreadHandle, ThreadError> {
    let mut table = registry().lock();
    if table.count() >= MAX_THREADS {
        return Err(ThreadError::ResourceExhausted("thread cap reached"));
    }

    let stack = Stack::allocate(attr.stack_size())?;
    let stack_top = stack.top();

    let name_bytes = attr.name().as_bytes();
    let name_len = name_bytes.len().min(MAX_NAME_LEN);
    let mut name = [0u8; MAX_NAME_LEN];
    name[..name_len].copy_from_slice(&name_bytes[..name_len]);

    let handle = Box::new(ThreadHandle {
        tid: AtomicI32::new(0),
        state: AtomicU32::new(THREAD_STARTING),
        started: AtomicU32::new(0),
        retval: core::cell::UnsafeCell::new(0),
        stack,
        name,
        name_len,
    });
    let handle_ptr = Box::into_raw(handle);

    let args = ThreadStartArgs {
        handle: handle_ptr,
        start_routine,
        arg,
    };

    let args_size = core::mem::size_of::<ThreadStartArgs>();
    let args_aligned_size = (args_size + 7) & !7;
    let args_addr = stack_top - 16 - args_aligned_size;
    let trampoline_frame = stack_top - 16;

    // SAFETY: both addresses fall within the stack region just mapped.
    unsafe {
        core::ptr::write(args_addr as *mut ThreadStartArgs, args);
        core::ptr::write(
            trampoline_frame as *mut usize,
            thread_trampoline as *const () as usize,
        );
        core::ptr::write((trampoline_frame + 8) as *mut usize, args_addr);
    }

    let child_sp = trampoline_frame;
    // SAFETY: handle_ptr was just created via Box::into_raw.
    let parent_tid_ptr = unsafe { &(*handle_ptr).tid as *const AtomicI32 as *mut i32 };
    let child_tid_ptr = parent_tid_ptr;

    // SAFETY: all pointers are valid; child_sp is a properly prepared stack.
    let result = unsafe {
        syscall::sys_clone_thread(CLONE_THREAD_FLAGS, child_sp, parent_tid_ptr, child_tid_ptr, 0)
    };

    match result {
        Ok(_child_tid) => {
            wait_for_startup(handle_ptr);
            table.append(Registered(handle_ptr));
            // Release before calling detach() below, which takes its own
            // lock — the spinlock is not reentrant.
            drop(table);
            if !attr.is_joinable() {
                // SAFETY: handle_ptr is this freshly started thread's own handle.
                let _ = unsafe { detach(handle_ptr) };
            }
            Ok(handle_ptr)
        }
        Err(errno) => {
            drop(table);
            // SAFETY: handle_ptr was just created via Box::into_raw.
            let handle = unsafe { Box::from_raw(handle_ptr) };
            handle.stack.free();
            Err(ThreadError::from(errno))
        }
    }
}

#[allow(unsafe_code)]
fn wait_for_startup(handle_ptr: *mut ThreadHandle) {
    // SAFETY: handle_ptr was just allocated by spawn().
    let handle = unsafe { &*handle_ptr };
    loop {
        if handle.started.load(Ordering::Acquire) != 0 {
            return;
        }
        let futex_ptr = &handle.started as *const AtomicU32 as *const u32;
        // SAFETY: futex_ptr is a valid, aligned u32 inside the handle.
        let _ = unsafe { syscall::sys_futex(futex_ptr, FUTEX_WAIT_PRIVATE, 0, 0, 0, 0) };
    }
}

/// Block until `handle_ptr`'s thread exits, consuming its resources.
///
/// # Safety
///
/// `handle_ptr` must be a live handle from [`spawn`], used at most once
/// across all join/detach calls.
#[allow(unsafe_code)]
pub unsafe fn join(handle_ptr: *mut ThreadHandle) -> Result<usize, ThreadError> {
    if handle_ptr.is_null() {
        return Err(ThreadError::Fault);
    }
    if !is_registered(handle_ptr) {
        return Err(ThreadError::NotFound);
    }

    // SAFETY: the registry lookup above confirms handle_ptr is still live.
    let handle = unsafe { &*handle_ptr };

    let my_tid = syscall::sys_gettid();
    let target_tid = handle.tid.load(Ordering::Acquire);
    if target_tid != 0 && my_tid == target_tid {
        return Err(ThreadError::Deadlock);
    }

    loop {
        match handle.state.load(Ordering::Acquire) {
            THREAD_DETACHED | THREAD_JOINED => {
                return Err(ThreadError::InvalidArgument("thread is detached or already joined"))
            }
            THREAD_STARTING | THREAD_RUNNING => break,
            THREAD_FINISHED => {
                match handle.state.compare_exchange(
                    THREAD_FINISHED,
                    THREAD_JOINED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Ok(finish_join(handle_ptr)),
                    Err(THREAD_JOINED) | Err(THREAD_DETACHED) => {
                        return Err(ThreadError::InvalidArgument("race lost to another joiner/detach"))
                    }
                    Err(_) => continue,
                }
            }
            _ => return Err(ThreadError::InvalidArgument("unknown thread state")),
        }
    }

    loop {
        let tid = handle.tid.load(Ordering::Acquire);
        if tid == 0 {
            break;
        }
        let futex_ptr = &handle.tid as *const AtomicI32 as *const u32;
        // SAFETY: futex_ptr is a valid, aligned i32 inside the handle.
        let _ = unsafe { syscall::sys_futex(futex_ptr, FUTEX_WAIT_PRIVATE, tid as u32, 0, 0, 0) };
    }

    loop {
        match handle.state.load(Ordering::Acquire) {
            THREAD_FINISHED => {
                match handle.state.compare_exchange(
                    THREAD_FINISHED,
                    THREAD_JOINED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(THREAD_JOINED) | Err(THREAD_DETACHED) => {
                        return Err(ThreadError::InvalidArgument("race lost to another joiner/detach"))
                    }
                    Err(_) => continue,
                }
            }
            THREAD_RUNNING => {
                core::hint::spin_loop();
                continue;
            }
            _ => return Err(ThreadError::InvalidArgument("unknown thread state")),
        }
    }

    Ok(finish_join(handle_ptr))
}

/// Read back the return value and free the stack + handle. Only called
/// once this thread has won the FINISHED -> JOINED transition.
#[allow(unsafe_code)]
fn finish_join(handle_ptr: *mut ThreadHandle) -> usize {
    unregister(handle_ptr);
    // SAFETY: the caller has exclusive ownership via the JOINED CAS.
    let handle = unsafe { Box::from_raw(handle_ptr) };
    // SAFETY: retval was written by the child before FINISHED was visible.
    let retval = unsafe { *handle.retval.get() };
    handle.stack.free();
    retval
}

/// Detach a thread: resources are reclaimed automatically when it exits
/// (or immediately, if it has already finished).
///
/// # Safety
///
/// `handle_ptr` must be a live handle from [`spawn`]; after a successful
/// detach it must not be used again.
#[allow(unsafe_code)]
pub unsafe fn detach(handle_ptr: *mut ThreadHandle) -> Result<(), ThreadError> {
    if handle_ptr.is_null() {
        return Err(ThreadError::Fault);
    }
    if !is_registered(handle_ptr) {
        return Err(ThreadError::NotFound);
    }

    // SAFETY: the registry lookup above confirms handle_ptr is still live.
    let handle = unsafe { &*handle_ptr };

    loop {
        let state = handle.state.load(Ordering::Acquire);
        match state {
            THREAD_JOINED | THREAD_DETACHED => {
                return Err(ThreadError::InvalidArgument("thread already joined or detached"))
            }
            THREAD_FINISHED => {
                match handle.state.compare_exchange(
                    THREAD_FINISHED,
                    THREAD_DETACHED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        unregister(handle_ptr);
                        // SAFETY: we won the FINISHED -> DETACHED race.
                        let handle = unsafe { Box::from_raw(handle_ptr) };
                        handle.stack.free();
                        return Ok(());
                    }
                    Err(THREAD_JOINED) => {
                        return Err(ThreadError::InvalidArgument("race lost to a joiner"))
                    }
                    Err(_) => continue,
                }
            }
            THREAD_RUNNING | THREAD_STARTING => {
                match handle.state.compare_exchange(
                    state,
                    THREAD_DETACHED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Ok(()),
                    Err(THREAD_JOINED) | Err(THREAD_DETACHED) => {
                        return Err(ThreadError::InvalidArgument("race lost to a joiner/detach"))
                    }
                    Err(_) => continue,
                }
            }
            _ => return Err(ThreadError::InvalidArgument("unknown thread state")),
        }
    }
}

/// Deliver `sig` to a specific thread via `tgkill`. Per the spec's
/// kill-on-terminating-signal decision, the default disposition applies:
/// a terminating signal ends the whole process, not just this thread.
///
/// # Safety
///
/// `handle_ptr` must be a live handle from [`spawn`].
#[allow(unsafe_code)]
pub unsafe fn kill(handle_ptr: *mut ThreadHandle, sig: i32) -> Result<(), ThreadError> {
    if handle_ptr.is_null() {
        return Err(ThreadError::Fault);
    }
    if !(0..64).contains(&sig) {
        return Err(ThreadError::InvalidArgument("signal number out of range"));
    }
    // An unknown target is InvalidArgument here (not NotFound, unlike
    // join/detach) per the C9 operation table.
    if !is_registered(handle_ptr) {
        return Err(ThreadError::InvalidArgument("unknown thread handle"));
    }
    // Signal zero is a pure liveness probe: existence was already
    // confirmed by the registry lookup above, so no signal is sent.
    if sig == 0 {
        return Ok(());
    }
    // SAFETY: the registry lookup above confirms handle_ptr is still live.
    let handle = unsafe { &*handle_ptr };
    let tid = handle.tid.load(Ordering::Acquire);
    if tid == 0 {
        return Err(ThreadError::InvalidArgument("unknown thread handle"));
    }
    let pid = syscall::sys_getpid();
    syscall::sys_tgkill(pid, tid, sig).map_err(ThreadError::from)
}

pub fn yield_now() {
    syscall::sys_sched_yield();
}

pub fn self_tid() -> i32 {
    syscall::sys_gettid()
}

/// Two handles refer to the same thread iff they are the same handle pointer.
pub fn equal(a: *const ThreadHandle, b: *const ThreadHandle) -> bool {
    core::ptr::eq(a, b)
}
