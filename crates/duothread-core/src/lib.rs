//! # duothread-core
//!
//! Mechanism layer for a user-space threading runtime that offers a
//! single public API backed by two interchangeable execution models:
//! `one_to_one` (every user thread is a kernel thread, via `clone`) and
//! `many_to_one` (a single kernel thread multiplexes many user threads,
//! scheduled cooperatively and preemptively). Exactly one model feature
//! must be enabled; [`duothread`](../duothread/index.html) selects it.
//!
//! No `unsafe` is permitted at the crate level by default — every module
//! that needs it (syscalls, context switching, the sync primitives) opts
//! back in locally with `#[allow(unsafe_code)]` at the narrowest scope
//! that needs it.

#![deny(unsafe_code)]

#[cfg(all(feature = "one_to_one", feature = "many_to_one"))]
compile_error!("features `one_to_one` and `many_to_one` are mutually exclusive");

#[cfg(not(any(feature = "one_to_one", feature = "many_to_one")))]
compile_error!("exactly one of the `one_to_one` or `many_to_one` features must be enabled");

pub mod attr;
pub mod errno;
pub mod stack;
pub mod sync;
pub mod task_table;

#[allow(unsafe_code)]
#[cfg(target_arch = "x86_64")]
pub mod syscall;

#[cfg(feature = "one_to_one")]
pub mod onetoone;

#[cfg(feature = "many_to_one")]
pub mod manytoone;
