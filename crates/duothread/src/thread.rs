//! [`Thread`]: the public handle returned by [`Thread::spawn`]. Wraps the
//! mechanism layer's raw handle (a `*mut ThreadHandle` under `one_to_one`, a
//! `ThreadId` under `many_to_one`) and carries the entry closure's return
//! type, matching `std::thread::JoinHandle`'s shape far more than the
//! mechanism layer's own `usize`-typed trampoline protocol does.

use crate::{Result, ThreadAttr};
use std::marker::PhantomData;

#[cfg(feature = "one_to_one")]
type Raw = *mut duothread_core::onetoone::thread::ThreadHandle;
#[cfg(feature = "many_to_one")]
type Raw = duothread_core::manytoone::ThreadId;

/// A handle to a spawned thread, generic over the entry closure's return
/// type. Must eventually be consumed by [`Thread::join`] or
/// [`Thread::detach`] — like the pthreads it's modeled on, a handle that is
/// neither joined nor detached leaks its thread's resources.
pub struct Thread<T> {
    raw: Raw,
    _marker: PhantomData<fn() -> T>,
}

// SAFETY: the raw handle is only ever read/written through the mechanism
// layer's own synchronized operations (spawn/join/detach/kill), never
// dereferenced directly by this crate.
unsafe impl<T: Send> Send for Thread<T> {}

/// Type-erasure trampoline: reclaims the boxed closure from `arg`, runs it,
/// and re-boxes its result so [`Thread::join`] can reclaim *that*. Every
/// monomorphization of this function is a distinct `extern "C" fn(usize) ->
/// usize`, which is exactly the calling convention both execution models'
/// trampolines expect.
unsafe extern "C" fn trampoline<F, T>(arg: usize) -> usize
where
    F: FnOnce() -> T,
{
    // SAFETY: arg is a Box<F> leaked by Thread::spawn just below, and this
    // trampoline runs exactly once per spawned thread.
    let closure = unsafe { Box::from_raw(arg as *mut F) };
    let result = closure();
    Box::into_raw(Box::new(result)) as usize
}

impl<T> Thread<T> {
    /// Spawn a new thread running `f` to completion, under the execution
    /// model selected at compile time.
    pub fn spawn<F>(attr: ThreadAttr, f: F) -> Result<Thread<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        #[cfg(feature = "many_to_one")]
        crate::ensure_initialized()?;

        let boxed: Box<F> = Box::new(f);
        let arg = Box::into_raw(boxed) as usize;
        let start_routine = trampoline::<F, T> as *const () as usize;

        #[cfg(feature = "one_to_one")]
        let raw = match duothread_core::onetoone::thread::spawn(start_routine, arg, &attr) {
            Ok(raw) => raw,
            Err(err) => {
                // SAFETY: spawn failed before the trampoline ever ran, so
                // arg is still the sole owner of this box.
                unsafe { drop(Box::from_raw(arg as *mut F)) };
                return Err(err);
            }
        };

        #[cfg(feature = "many_to_one")]
        let raw = match duothread_core::manytoone::scheduler::spawn(start_routine, arg, &attr) {
            Ok(raw) => raw,
            Err(err) => {
                // SAFETY: spawn failed before the trampoline ever ran, so
                // arg is still the sole owner of this box.
                unsafe { drop(Box::from_raw(arg as *mut F)) };
                return Err(err);
            }
        };

        Ok(Thread {
            raw,
            _marker: PhantomData,
        })
    }

    /// Block until the thread finishes, returning the value its entry
    /// closure returned (or that [`crate::exit`] was called with).
    pub fn join(self) -> Result<T> {
        #[cfg(feature = "one_to_one")]
        // SAFETY: `raw` is a live handle from `spawn`, used at most once
        // across join/detach because `self` is consumed here.
        let retval = unsafe { duothread_core::onetoone::thread::join(self.raw) }?;
        #[cfg(feature = "many_to_one")]
        let retval = duothread_core::manytoone::scheduler::join(self.raw)?;

        // SAFETY: retval is the address trampoline's `Box::into_raw(Box::new(result))`
        // produced; this is the other half of that box.
        let boxed = unsafe { Box::from_raw(retval as *mut T) };
        Ok(*boxed)
    }

    /// Detach the thread: its resources are reclaimed automatically once it
    /// finishes, without a joiner.
    pub fn detach(self) -> Result<()> {
        #[cfg(feature = "one_to_one")]
        // SAFETY: `raw` is a live handle from `spawn`, used at most once.
        return unsafe { duothread_core::onetoone::thread::detach(self.raw) };
        #[cfg(feature = "many_to_one")]
        return duothread_core::manytoone::scheduler::detach(self.raw);
    }

    /// Deliver `sig` to this thread.
    pub fn kill(&self, sig: i32) -> Result<()> {
        #[cfg(feature = "one_to_one")]
        // SAFETY: `raw` is a live handle from `spawn`.
        return unsafe { duothread_core::onetoone::thread::kill(self.raw, sig) };
        #[cfg(feature = "many_to_one")]
        return duothread_core::manytoone::scheduler::kill(self.raw, sig);
    }
}

impl<T> PartialEq for Thread<T> {
    fn eq(&self, other: &Self) -> bool {
        #[cfg(feature = "one_to_one")]
        return duothread_core::onetoone::thread::equal(self.raw, other.raw);
        #[cfg(feature = "many_to_one")]
        return duothread_core::manytoone::scheduler::equal(self.raw, other.raw);
    }
}

impl<T> Eq for Thread<T> {}
