//! # Host capabilities
//!
//! The compatibility layer owns no page tables and no physical memory. Every
//! effect goes through one of the traits below, implemented by the host
//! kernel (or by a simulation in tests).
//!
//! | Trait | Capability |
//! |-------|------------|
//! | [`PhysicalMemory`] | Contiguous page allocation, reclaim, zeroing, release. |
//! | [`KernelMappings`] | Page-table map/unmap and attribute changes addressed by frame number. |
//! | [`CpuPin`] | Pin/unpin the current thread to its CPU. |
//! | [`UserMemory`] | Single-byte user probes and non-faulting user copies. |
//! | [`PagedObject`] | A lockable collection of resident pages with busy waiting. |
//!
//! Methods documented as *non-blocking* may be called while pinned; every
//! other method may sleep and must not be.

use crate::cache::CacheAttribute;
use crate::error::{AttributeError, UserFault};
use crate::page::Page;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, VirtualAddress};
pub use kernel_sync::CpuPin;
use kernel_sync::SpinLockGuard;

/// Constraints for a physically contiguous allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ContigRequest {
    /// Number of 4 KiB pages.
    pub pages: u64,
    /// Lowest acceptable physical address.
    pub low: PhysicalAddress,
    /// Highest acceptable physical address (inclusive).
    pub high: PhysicalAddress,
    /// Required alignment in bytes (power of two).
    pub alignment: u64,
    /// The run must not cross a multiple of this many bytes; 0 for none.
    pub boundary: u64,
    /// Caching attribute the frames are given.
    pub attribute: CacheAttribute,
}

impl ContigRequest {
    /// Whether `[pa, pa + pages * 4 KiB)` satisfies the window, alignment and
    /// boundary. Empty or unrepresentable runs are never admitted.
    #[must_use]
    pub const fn admits(&self, pa: PhysicalAddress) -> bool {
        let start = pa.as_u64();
        let Some(bytes) = self.pages.checked_mul(kernel_info::memory::PAGE_SIZE) else {
            return false;
        };
        let Some(span) = bytes.checked_sub(1) else {
            return false;
        };
        let Some(end) = start.checked_add(span) else {
            return false;
        };
        let within_boundary = self.boundary == 0 || start / self.boundary == end / self.boundary;
        start >= self.low.as_u64()
            && end <= self.high.as_u64()
            && start.is_multiple_of(self.alignment)
            && within_boundary
    }
}

/// Host physical page allocator.
pub trait PhysicalMemory {
    /// Try once to allocate a contiguous run; `None` when nothing fits.
    fn alloc_contig(&self, request: &ContigRequest) -> Option<Page>;

    /// Try to make room for `request` by evicting or migrating pages.
    /// Returns `true` if progress was made.
    fn reclaim_contig(&self, request: &ContigRequest) -> bool;

    /// Sleep until the pageout machinery signals free pages (bounded).
    fn wait_for_free_pages(&self);

    /// Fill the page's frame with zeros.
    fn zero_page(&self, page: &Page);

    /// Drop the driver's wiring of `page`, handing it back to the host.
    fn unwire(&self, page: Page);
}

/// Flags for [`KernelMappings::map_transient`].
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct MapFlags {
    /// Fail instead of sleeping when no mapping window is free.
    pub nowait: bool,
    /// The mapping is only used on the current (pinned) CPU, so no TLB
    /// shootdown is needed on teardown.
    pub cpu_private: bool,
    #[bits(6, default = 0)]
    _reserved: u8,
}

impl MapFlags {
    /// Flags used for atomic mappings.
    pub const ATOMIC: Self = Self::new().with_nowait(true).with_cpu_private(true);
}

/// Host page-table control.
pub trait KernelMappings: CpuPin {
    /// Map one frame into a transient kernel window.
    ///
    /// Non-blocking when `flags.nowait()` is set; returns `None` if no window
    /// is available.
    fn map_transient(
        &self,
        frame: PageFrameNumber,
        attribute: CacheAttribute,
        flags: MapFlags,
    ) -> Option<VirtualAddress>;

    /// Release a window obtained from [`map_transient`](Self::map_transient).
    /// Non-blocking.
    ///
    /// # Safety
    /// `address` must be the page-aligned address of a live transient window,
    /// and nothing may access it afterwards.
    unsafe fn unmap_transient(&self, address: VirtualAddress);

    /// Map `len` bytes of device memory starting at `pa`. May block.
    fn map_device(
        &self,
        pa: PhysicalAddress,
        len: u64,
        attribute: CacheAttribute,
    ) -> Option<VirtualAddress>;

    /// Tear down a mapping produced by [`map_device`](Self::map_device).
    ///
    /// # Safety
    /// `address` and `len` must match a live device mapping.
    unsafe fn unmap_device(&self, address: VirtualAddress, len: u64);

    /// Change the caching attribute of `pages` mapped kernel pages. May block.
    ///
    /// On x86 the PTE cache bits are
    /// [`CacheAttribute::pat_selector`]`().pte_bits()`.
    ///
    /// # Errors
    /// The page tables cannot express `attribute`.
    fn change_attribute(
        &self,
        address: VirtualAddress,
        pages: u64,
        attribute: CacheAttribute,
    ) -> Result<(), AttributeError>;
}

/// Access to the current process's user address space.
pub trait UserMemory {
    /// Read one byte, faulting the page in if necessary.
    ///
    /// # Errors
    /// The address cannot be resolved.
    fn fetch_byte(&self, address: VirtualAddress) -> Result<u8, UserFault>;

    /// Store one byte, faulting the page in if necessary.
    ///
    /// # Errors
    /// The address cannot be resolved or is read-only.
    fn store_byte(&self, address: VirtualAddress, value: u8) -> Result<(), UserFault>;

    /// Copy from user memory without taking page faults. Non-blocking.
    ///
    /// # Errors
    /// Some byte of the source is not resident.
    fn copy_in_nofault(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), UserFault>;

    /// Copy to user memory without taking page faults. Non-blocking.
    ///
    /// # Errors
    /// Some byte of the destination is not resident and writable.
    fn copy_out_nofault(&self, src: &[u8], dst: VirtualAddress) -> Result<(), UserFault>;
}

/// The resident pages of a paged object, viewed under its lock.
pub trait PageCollection {
    fn lookup(&self, index: u64) -> Option<&Page>;

    /// Detach the page at `index` from the object.
    fn remove(&mut self, index: u64) -> Option<Page>;

    /// Smallest resident index in `from..end`.
    fn next_resident(&self, from: u64, end: u64) -> Option<u64> {
        (from..end).find(|&index| self.lookup(index).is_some())
    }
}

/// An object backed by pages, guarded by one collection lock.
pub trait PagedObject {
    type Pages: PageCollection;

    /// Take the collection lock.
    fn lock(&self) -> SpinLockGuard<'_, Self::Pages>;

    /// Block until the page at `index` is no longer busy (or gone).
    /// Called without the collection lock held.
    fn wait_unbusy(&self, index: u64);

    /// Hand back a page that was removed from the collection.
    /// Called with the collection lock held; must not take it again.
    fn free_page(&self, page: Page);
}
