//! # Kernel synchronization primitives
//!
//! Two primitives are needed by the memory-management compatibility layer:
//!
//! * [`SpinLock`], the lock guarding a paged object's resident page set.
//!   Its guard can be temporarily released with [`SpinLockGuard::unlocked`]
//!   so a caller may block on a busy page without holding the lock.
//! * [`PinGuard`], an RAII token proving the current thread is pinned to its
//!   CPU. Pinning itself is a host capability ([`CpuPin`]).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod pin;
mod spin_lock;

pub use pin::{CpuPin, PinGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
