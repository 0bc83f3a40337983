//! The M:1 scheduler: one kernel thread, many cooperatively/preemptively
//! scheduled user threads. Grounded directly on `many-one/src/mthread.c`:
//! `get_next_ready_thread`, `scheduler` (the `SIGVTALRM` handler that does
//! the actual context switch), `mthread_create`/`_join`/`_exit`/`_yield`/
//! `_kill`/`_detach`, and `interrupt_enable`/`_disable` from `interrupt.c`.
//!
//! All scheduler state is process-global by necessity — there is exactly
//! one kernel thread running it. Mutation is only ever safe while
//! `SIGVTALRM` is blocked, the same invariant the original enforces with
//! `interrupt_disable`/`interrupt_enable` around every table operation.

use crate::attr::ThreadAttr;
use crate::errno::ThreadError;
use crate::manytoone::context::{switch_context, Context};
use crate::manytoone::tcb::{Tcb, TcbState, ThreadId, MAX_THREADS};
use crate::stack::Stack;
use crate::syscall;
use crate::task_table::TaskTable;
use core::sync::atomic::{AtomicBool, Ordering};

/// Scheduling quantum, analogous to the original's `TIMER` interval
/// passed to `setitimer(ITIMER_VIRTUAL, ...)`.
const QUANTUM_USEC: i64 = 10_000;
const SIGVTALRM: i32 = 26;
const ITIMER_VIRTUAL: i32 = 2;

struct SchedulerState {
    table: TaskTable<Tcb>,
    current: Option<Tcb>,
    next_id: ThreadId,
}

#[allow(unsafe_code)]
static mut STATE: Option<SchedulerState> = None;
static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[allow(unsafe_code)]
fn state_mut() -> &'static mut SchedulerState {
    // SAFETY: only ever called with SIGVTALRM blocked (see `critical_section`),
    // so there is no concurrent mutator — the signal handler is the only
    // other writer and it cannot run while blocked.
    unsafe { STATE.as_mut().expect("many_to_one scheduler not initialized") }
}

const SIG_BLOCK: i32 = 0;
const SIG_SETMASK: i32 = 2;

/// Build a `sigset_t` with exactly `sig` set. The kernel is only ever told
/// to look at the first 8 bytes (`SIGSETSIZE` in the syscall wrappers), so
/// only that kernel-level 64-bit mask is populated — hand-rolled rather
/// than calling into glibc's `sigaddset`, matching this crate's policy of
/// talking to the kernel directly.
#[allow(unsafe_code)]
fn sigset_with(sig: i32) -> libc::sigset_t {
    let mut set: libc::sigset_t = unsafe { core::mem::zeroed() };
    // SAFETY: libc::sigset_t is at least 8 bytes on every Linux target the
    // kernel's SIGSETSIZE=8 mask assumes.
    unsafe {
        let mask = &mut set as *mut libc::sigset_t as *mut u64;
        *mask |= 1u64 << (sig - 1);
    }
    set
}

/// Run `f` with `SIGVTALRM` blocked, mirroring `interrupt_disable`/`_enable`.
#[allow(unsafe_code)]
fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let set = sigset_with(SIGVTALRM);
    let mut old: libc::sigset_t = unsafe { core::mem::zeroed() };
    // SAFETY: set/old are valid sigset_t values.
    let _ = unsafe { syscall::sys_rt_sigprocmask(SIG_BLOCK, &set, &mut old) };
    let result = f();
    // SAFETY: old was populated by the call above.
    let _ = unsafe { syscall::sys_rt_sigprocmask(SIG_SETMASK, &old, core::ptr::null_mut()) };
    result
}

fn arm_timer(enabled: bool) {
    let value = if enabled { QUANTUM_USEC } else { 0 };
    let interval = libc::timeval {
        tv_sec: 0,
        tv_usec: value,
    };
    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    #[allow(unsafe_code)]
    // SAFETY: timer is a fully initialized itimerval; old_value is unused.
    unsafe {
        let _ = syscall::sys_setitimer(ITIMER_VIRTUAL, &timer, core::ptr::null_mut());
    }
}

#[allow(unsafe_code)]
extern "C" fn sigvtalrm_handler(_signum: i32) {
    scheduler_tick();
}

/// Install the `SIGVTALRM` handler and start the first (bootstrap) thread.
/// Idempotent: later calls are no-ops.
pub fn init() -> Result<(), ThreadError> {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    critical_section(|| {
        #[allow(unsafe_code)]
        {
            let mut table = TaskTable::new();
            table.append(Tcb::bootstrap(0));
            // Bootstrap's real "current" lives outside the table once running.
            let bootstrap = table.remove_head().unwrap();
            // SAFETY: single-writer, protected by critical_section.
            unsafe {
                STATE = Some(SchedulerState {
                    table,
                    current: Some(bootstrap),
                    next_id: 1,
                });
            }
        }
    });

    #[allow(unsafe_code)]
    {
        let mut act: libc::sigaction = unsafe { core::mem::zeroed() };
        act.sa_sigaction = sigvtalrm_handler as usize;
        // Block every signal while the handler runs, same as the original
        // scheduler's `sigfillset` mask — the context switch must not be
        // re-entered by another signal mid-swap.
        // SAFETY: act.sa_mask is at least 8 bytes on every Linux target.
        unsafe {
            let mask = &mut act.sa_mask as *mut libc::sigset_t as *mut u64;
            *mask = u64::MAX;
        }
        // SAFETY: act is a valid sigaction; oldact is unused.
        unsafe {
            syscall::sys_rt_sigaction(SIGVTALRM, &act, core::ptr::null_mut())
                .map_err(ThreadError::from)?;
        }
    }

    arm_timer(true);
    Ok(())
}

extern "C" fn trampoline() -> ! {
    // The newly scheduled thread is always `current` by the time it runs.
    let (start_routine, arg) = critical_section(|| {
        let tcb = state_mut().current.as_ref().expect("no current thread at trampoline entry");
        (tcb.start_routine, tcb.arg)
    });

    // SAFETY: start_routine/arg were supplied by spawn() as a valid fn pointer + argument.
    let retval = unsafe {
        let f: unsafe extern "C" fn(usize) -> usize = core::mem::transmute(start_routine);
        f(arg)
    };

    exit(retval);
}

/// Create a new M:1 thread. Becomes `Ready` immediately; it runs the next
/// time the scheduler picks it.
pub fn spawn(start_routine: usize, arg: usize, attr: &ThreadAttr) -> Result<ThreadId, ThreadError> {
    let stack = Stack::allocate(attr.stack_size())?;

    critical_section(|| {
        let state = state_mut();
        if state.table.count() + 1 >= MAX_THREADS {
            return Err(ThreadError::ResourceExhausted("many_to_one thread cap reached"));
        }
        let id = state.next_id;
        state.next_id += 1;

        let context = Context::prepare(stack.top(), trampoline);
        let mut tcb = Tcb::new(id, context, stack, attr);
        tcb.start_routine = start_routine;
        tcb.arg = arg;
        state.table.append(tcb);
        Ok(id)
    })
}

/// Pick the next `Ready` thread, re-enqueueing anything else encountered
/// along the way. Mirrors `get_next_ready_thread`'s dequeue-and-rotate scan.
/// Never sees the currently-running thread — it is never in the table.
fn next_ready(state: &mut SchedulerState) -> Option<Tcb> {
    let rounds = state.table.count();
    for _ in 0..rounds {
        let tcb = state.table.remove_head()?;
        if tcb.state == TcbState::Ready {
            return Some(tcb);
        }
        if tcb.state == TcbState::Finished && !tcb.joinable && tcb.joined_on.is_none() {
            // Nobody will ever join a detached, already-finished thread;
            // drop it instead of recirculating it forever.
            if let Some(stack) = tcb.stack {
                stack.free();
            }
            continue;
        }
        state.table.append(tcb);
    }
    None
}

/// The actual context switch. Called both from the `SIGVTALRM` handler
/// (preemptive path) and directly by `yield_now` (cooperative path).
fn scheduler_tick() {
    critical_section(|| {
        let state = state_mut();
        let mut outgoing = state.current.take().expect("scheduler tick with no current thread");

        if outgoing.state == TcbState::Running {
            outgoing.state = TcbState::Ready;
        }
        let was_finished = outgoing.state == TcbState::Finished;

        let Some(mut incoming) = next_ready(state) else {
            if was_finished {
                // No other thread left to run; the process is done.
                syscall::sys_exit_group(0);
            }
            // Nothing else ready — outgoing simply keeps running.
            state.current = Some(outgoing);
            return;
        };

        let outgoing_id = outgoing.id;
        state.table.append(outgoing);

        // Deliver any pending signals queued via `kill` before resuming.
        let pending = incoming.take_pending_signals();
        for sig in 0..64 {
            if pending & (1 << sig) != 0 {
                let _ = syscall::sys_kill(syscall::sys_getpid(), sig);
            }
        }

        incoming.state = TcbState::Running;
        state.current = Some(incoming);

        let switch_to_ctx: *const Context = &state.current.as_ref().unwrap().context;
        let save_into_ctx: *mut Context = &mut state.table.lookup_mut(outgoing_id).unwrap().context;

        // SAFETY: save_into_ctx points at the outgoing thread's now-stable
        // table slot; switch_to_ctx points at the incoming thread's
        // current-slot context. Both outlive the call.
        unsafe { switch_context(save_into_ctx, switch_to_ctx) };
    });
}

/// Voluntarily give up the CPU, matching `mthread_yield`'s `raise(SIGVTALRM)`.
pub fn yield_now() {
    scheduler_tick();
}

/// Terminate the calling M:1 thread with `retval`, matching `mthread_exit`.
pub fn exit(retval: usize) -> ! {
    critical_section(|| {
        let state = state_mut();
        let current = state.current.as_mut().expect("exit with no current thread");
        current.retval = retval;
        current.state = TcbState::Finished;
        if let Some(joiner_id) = current.joined_on {
            if let Some(joiner) = state.table.lookup_mut(joiner_id) {
                joiner.state = TcbState::Ready;
            }
        }
    });
    scheduler_tick();
    unreachable!("scheduler_tick must not return into a Finished thread");
}

/// Block until thread `id` finishes, returning its return value.
/// Busy-waits between yields, same as `mthread_join`.
pub fn join(id: ThreadId) -> Result<usize, ThreadError> {
    let my_id = critical_section(|| {
        let state = state_mut();
        let me = state.current.as_ref().unwrap().id;
        if me == id {
            return Err(ThreadError::Deadlock);
        }
        let target = state
            .table
            .lookup_mut(id)
            .ok_or(ThreadError::NotFound)?;
        if !target.joinable || target.joined_on.is_some() {
            return Err(ThreadError::InvalidArgument("thread not joinable or already joined"));
        }
        target.joined_on = Some(me);
        Ok(me)
    })?;
    let _ = my_id;

    loop {
        let done = critical_section(|| {
            state_mut().table.lookup(id).map(|t| t.state == TcbState::Finished).unwrap_or(true)
        });
        if done {
            break;
        }
        yield_now();
    }

    critical_section(|| {
        let state = state_mut();
        let tcb = state.table.lookup_mut(id).ok_or(ThreadError::NotFound)?;
        let retval = tcb.retval;
        let stack = tcb.stack.take();
        // Remove the finished TCB from the table entirely.
        let mut survivors = TaskTable::new();
        state.table.destroy_with(|t| {
            if t.id != id {
                survivors.append(t);
            }
        });
        state.table = survivors;
        if let Some(stack) = stack {
            stack.free();
        }
        Ok(retval)
    })
}

/// Mark thread `id` as no longer joinable; its resources are reclaimed as
/// soon as it finishes instead of waiting for a joiner.
pub fn detach(id: ThreadId) -> Result<(), ThreadError> {
    critical_section(|| {
        let state = state_mut();
        let tcb = state.table.lookup_mut(id).ok_or(ThreadError::NotFound)?;
        if tcb.joined_on.is_some() {
            return Err(ThreadError::InvalidArgument("thread already has a joiner"));
        }
        tcb.joinable = false;
        Ok(())
    })
}

/// Queue `sig` for thread `id`, or raise it immediately if `id` is the
/// caller. Matches `mthread_kill`: queue-only for other threads, no state
/// change beyond the pending-signal bit — delivery happens at the next
/// scheduler tick for that thread.
pub fn kill(id: ThreadId, sig: i32) -> Result<(), ThreadError> {
    if !(0..64).contains(&sig) {
        return Err(ThreadError::InvalidArgument("signal number out of range"));
    }
    critical_section(|| {
        let state = state_mut();
        if state.current.as_ref().unwrap().id == id {
            drop(syscall::sys_kill(syscall::sys_getpid(), sig));
            return Ok(());
        }
        let tcb = state.table.lookup_mut(id).ok_or(ThreadError::NotFound)?;
        tcb.queue_signal(sig);
        Ok(())
    })
}

pub fn equal(a: ThreadId, b: ThreadId) -> bool {
    a == b
}

pub fn current_id() -> ThreadId {
    critical_section(|| state_mut().current.as_ref().unwrap().id)
}

// The scheduler assumes it is the only kernel thread in the process — the
// same precondition the original `mthread` runtime documents. Rust's test
// harness runs `#[test]` functions across a pool of OS threads by default,
// which this module's own SIGVTALRM handler cannot safely tolerate (a timer
// tick delivered to an idle pool thread would context-switch through that
// thread's register state instead of the scheduler's). Run this module's
// tests with `--test-threads=1`.
#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    unsafe extern "C" fn echo_start(arg: usize) -> usize {
        arg
    }

    unsafe extern "C" fn signal_start(arg: usize) -> usize {
        // SAFETY: caller guarantees `arg` points to a valid AtomicU32.
        let flag = unsafe { &*(arg as *const AtomicU32) };
        flag.store(42, Ordering::Release);
        0
    }

    #[test]
    fn create_and_join_thread_returns_value() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let attr = ThreadAttr::new();
        let id = spawn(echo_start as *const () as usize, 0xBEEF, &attr).unwrap();
        let retval = join(id).unwrap();
        assert_eq!(retval, 0xBEEF);
    }

    #[test]
    fn child_thread_can_write_shared_memory() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let flag = Box::new(AtomicU32::new(0));
        let flag_ptr = &*flag as *const AtomicU32 as usize;
        let attr = ThreadAttr::new();
        let id = spawn(signal_start as *const () as usize, flag_ptr, &attr).unwrap();
        join(id).unwrap();
        assert_eq!(flag.load(Ordering::Acquire), 42);
    }

    #[test]
    fn multiple_threads_created_and_joined() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let attr = ThreadAttr::new();
        let mut ids = Vec::new();
        for i in 0..4usize {
            ids.push(spawn(echo_start as *const () as usize, i, &attr).unwrap());
        }
        for (i, id) in ids.into_iter().enumerate() {
            assert_eq!(join(id).unwrap(), i);
        }
    }

    #[test]
    fn join_self_is_deadlock() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let me = current_id();
        assert_eq!(join(me), Err(ThreadError::Deadlock));
    }

    #[test]
    fn join_unknown_handle_is_not_found() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        assert_eq!(join(999_999), Err(ThreadError::NotFound));
    }

    #[test]
    fn detach_then_join_is_invalid_argument() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let attr = ThreadAttr::new();
        let id = spawn(echo_start as *const () as usize, 0, &attr).unwrap();
        detach(id).unwrap();
        assert!(matches!(join(id), Err(ThreadError::NotFound) | Err(ThreadError::InvalidArgument(_))));
    }

    #[test]
    fn kill_out_of_range_signal_is_invalid_argument() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let attr = ThreadAttr::new();
        let id = spawn(echo_start as *const () as usize, 0, &attr).unwrap();
        assert!(matches!(kill(id, 999), Err(ThreadError::InvalidArgument(_))));
        join(id).unwrap();
    }

    #[test]
    fn equal_is_id_equality() {
        let _guard = TEST_LOCK.lock().unwrap();
        init().unwrap();
        let attr = ThreadAttr::new();
        let a = spawn(echo_start as *const () as usize, 0, &attr).unwrap();
        let b = spawn(echo_start as *const () as usize, 0, &attr).unwrap();
        assert!(equal(a, a));
        assert!(!equal(a, b));
        join(a).unwrap();
        join(b).unwrap();
    }
}
