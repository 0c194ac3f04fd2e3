use core::marker::PhantomData;

/// Host capability to pin the current thread to its CPU.
///
/// While pinned the thread neither migrates nor is preempted, so CPU-private
/// resources (per-CPU mapping windows) stay valid. Calls nest: every
/// [`pin`](CpuPin::pin) is balanced by exactly one [`unpin`](CpuPin::unpin).
pub trait CpuPin {
    /// Disable migration/preemption for the calling thread.
    fn pin(&self);

    /// Undo one preceding [`pin`](CpuPin::pin).
    ///
    /// # Safety
    /// The calling thread must hold a pin taken by [`pin`](CpuPin::pin) that
    /// has not been released yet, and must have torn down every CPU-private
    /// resource acquired under it.
    unsafe fn unpin(&self);

    /// Whether the calling thread currently holds at least one pin.
    fn is_pinned(&self) -> bool;
}

/// RAII token for a held CPU pin.
///
/// `PinGuard::new()` pins the current thread; dropping the guard unpins it.
/// The guard is neither `Send` nor `Sync`: a pin belongs to the thread that
/// took it and must be released on that thread.
///
/// # Examples
///
/// ```no_run
/// use kernel_sync::{CpuPin, PinGuard};
///
/// fn per_cpu_work<P: CpuPin>(host: &P) {
///     let _pin = PinGuard::new(host);
///     debug_assert!(host.is_pinned());
///     // CPU-private resources may be used here
/// }
/// ```
#[must_use = "dropping the guard releases the pin immediately"]
pub struct PinGuard<'a, P: CpuPin + ?Sized> {
    host: &'a P,
    _not_send: PhantomData<*mut ()>,
}

impl<'a, P: CpuPin + ?Sized> PinGuard<'a, P> {
    /// Pins the current thread until the guard is dropped.
    #[inline]
    pub fn new(host: &'a P) -> Self {
        host.pin();
        Self {
            host,
            _not_send: PhantomData,
        }
    }

    /// The host that holds the pin.
    #[inline]
    #[must_use]
    pub const fn host(&self) -> &'a P {
        self.host
    }
}

impl<P: CpuPin + ?Sized> Drop for PinGuard<'_, P> {
    fn drop(&mut self) {
        // SAFETY: the pin was taken in `new` on this thread (the guard is !Send).
        unsafe { self.host.unpin() }
    }
}
