//! Register-state save/restore for the M:1 scheduler's context switch.
//!
//! Grounded on the original scheduler's use of `sigsetjmp`/`siglongjmp` in
//! `mthread.c`: [`switch_context`] captures the callee-saved registers and
//! stack pointer the same way `sigsetjmp` would, then jumps into another
//! saved state the way `siglongjmp` would. Like its C ancestor, a context
//! that is switched away from resumes transparently later — the call that
//! suspended it simply returns at that point.
//!
//! The saved stack pointer and instruction pointer are mangled (XOR +
//! rotate against the thread pointer's `%fs:0x30` stack-guard slot) before
//! being stored, mirroring `many-one/include/mangle.h`, so a stray pointer
//! leaked from a stack dump isn't a ready-made stack-pivot target.

use core::arch::naked_asm;

/// Saved machine state for one suspended M:1 thread. `rip`/`rsp` are kept
/// mangled at rest; everything else is a plain callee-saved register.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct Context {
    rip: u64,
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

#[inline(always)]
#[allow(unsafe_code)]
fn stack_guard() -> u64 {
    let guard: u64;
    // SAFETY: %fs:0x30 is the thread pointer's stack-guard slot, readable
    // without preconditions on any glibc-initialized x86_64 thread.
    unsafe {
        core::arch::asm!("mov {0}, fs:0x30", out(reg) guard, options(nostack, preserves_flags, pure, readonly));
    }
    guard
}

#[inline(always)]
fn mangle(value: u64) -> u64 {
    (value ^ stack_guard()).rotate_left(0x11)
}

impl Context {
    /// A zeroed context; never switch into this directly.
    pub fn empty() -> Self {
        Context::default()
    }

    /// Build a context that, when first switched into, begins executing
    /// `entry` on a fresh stack growing down from `stack_top`. `entry`
    /// must never return (the trampoline always terminates by calling
    /// back into the scheduler, never by `ret`).
    pub fn prepare(stack_top: usize, entry: extern "C" fn() -> !) -> Self {
        // Align as if this were the stack pointer immediately after a
        // `call` instruction, the alignment `jmp`-based resumption relies on.
        let rsp = (stack_top - 8) as u64 & !0xf_u64 | 0x8;
        Context {
            rip: mangle(entry as usize as u64),
            rsp: mangle(rsp),
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
        }
    }
}

/// Save the caller's register state into `*save_into`, then switch to the
/// state in `*switch_to`. Returns only once some later call switches back
/// into `*save_into` — the same double-return contract as `sigsetjmp`.
///
/// # Safety
///
/// Both pointers must reference live `Context` values for the whole call.
/// `switch_to` must hold a state from [`Context::prepare`] or a prior
/// `switch_context` save; its stack must still be mapped.
#[unsafe(naked)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn switch_context(save_into: *mut Context, switch_to: *const Context) {
    naked_asm!(
        "mov [rdi + 16], rbp",
        "mov [rdi + 24], rbx",
        "mov [rdi + 32], r12",
        "mov [rdi + 40], r13",
        "mov [rdi + 48], r14",
        "mov [rdi + 56], r15",
        "mov rax, fs:0x30",
        "mov rcx, rsp",
        "xor rcx, rax",
        "rol rcx, 0x11",
        "mov [rdi + 8], rcx",
        "lea rcx, [rip + 2f]",
        "xor rcx, rax",
        "rol rcx, 0x11",
        "mov [rdi], rcx",
        "mov rcx, [rsi]",
        "ror rcx, 0x11",
        "xor rcx, rax",
        "mov rdx, [rsi + 8]",
        "ror rdx, 0x11",
        "xor rdx, rax",
        "mov rbp, [rsi + 16]",
        "mov rbx, [rsi + 24]",
        "mov r12, [rsi + 32]",
        "mov r13, [rsi + 40]",
        "mov r14, [rsi + 48]",
        "mov r15, [rsi + 56]",
        "mov rsp, rdx",
        "jmp rcx",
        "2:",
        "ret",
    );
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    static RETURN_CTX_PTR: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn probe_entry() -> ! {
        COUNTER.fetch_add(1, Ordering::SeqCst);
        let back = RETURN_CTX_PTR.load(Ordering::SeqCst) as *const Context;
        let mut discard = Context::empty();
        // SAFETY: RETURN_CTX_PTR was set by the test below to point at a
        // live `here` context before switching in.
        unsafe { switch_context(&mut discard, back) };
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn switch_into_a_fresh_context_runs_its_entry_point() {
        let before = COUNTER.load(Ordering::SeqCst);
        let stack = Stack::allocate(64 * 1024).expect("stack alloc");
        let target = Context::prepare(stack.top(), probe_entry);
        let mut here = Context::empty();
        RETURN_CTX_PTR.store(&mut here as *mut Context as usize, Ordering::SeqCst);
        // SAFETY: target is a freshly prepared context on a live stack;
        // `here` is valid for the duration of the call and is restored
        // into by probe_entry's switch back.
        unsafe { switch_context(&mut here, &target) };
        assert_eq!(COUNTER.load(Ordering::SeqCst), before + 1);
        stack.free();
    }
}
