//! Physical page handles and allocation flags.

use crate::cache::CacheAttribute;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, PhysicalPage, Size4K};

/// Per-page state bits.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    /// The frame is known to contain only zero bytes.
    pub zeroed: bool,

    /// The page is wired (pinned in memory) on behalf of the driver.
    pub wired: bool,

    /// The page describes device memory rather than managed RAM.
    pub fictitious: bool,

    /// Another path is using the page; it must not be torn down until the
    /// flag clears. Protected by the owning collection's lock.
    pub busy: bool,

    #[bits(4, default = 0)]
    _reserved: u8,
}

/// Identifier of the paged object a page belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObjectId(pub u64);

/// Handle to one host-allocated physical page frame.
///
/// Pages are created by the host's allocator (see
/// [`PhysicalMemory`](crate::host::PhysicalMemory)) or by a pager. The handle
/// is deliberately not `Clone`: it is given back to the host exactly once,
/// through [`PageAllocator::release_page`](crate::PageAllocator::release_page)
/// or by removing it from its collection.
#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    frame: PhysicalPage<Size4K>,
    attribute: CacheAttribute,
    flags: PageFlags,
    owner: Option<ObjectId>,
}

impl Page {
    #[must_use]
    pub const fn new(frame: PhysicalPage<Size4K>, attribute: CacheAttribute, flags: PageFlags) -> Self {
        Self {
            frame,
            attribute,
            flags,
            owner: None,
        }
    }

    /// A fictitious page describing one frame of device memory.
    #[must_use]
    pub const fn device(frame: PageFrameNumber, attribute: CacheAttribute) -> Self {
        Self::new(
            frame.page(),
            attribute,
            PageFlags::new().with_fictitious(true),
        )
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        self.frame
    }

    #[inline]
    #[must_use]
    pub const fn frame_number(&self) -> PageFrameNumber {
        self.frame.frame()
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.frame.base()
    }

    /// Caching attribute the page's frame was allocated with.
    #[inline]
    #[must_use]
    pub const fn attribute(&self) -> CacheAttribute {
        self.attribute
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        self.flags
    }

    #[inline]
    pub const fn flags_mut(&mut self) -> &mut PageFlags {
        &mut self.flags
    }

    #[inline]
    #[must_use]
    pub const fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    #[inline]
    pub const fn set_owner(&mut self, owner: Option<ObjectId>) {
        self.owner = owner;
    }
}

/// Physical address of `page`.
#[inline]
#[must_use]
pub const fn page_to_phys(page: &Page) -> PhysicalAddress {
    page.physical_address()
}

/// Allocation request flags, in the vocabulary drivers pass to the allocator.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct GfpFlags {
    /// Return a page whose contents read as zero.
    pub zero: bool,

    /// Restrict the page to the 32-bit DMA window even if the configured
    /// window is wider.
    pub dma32: bool,

    #[bits(30, default = 0)]
    _reserved: u32,
}

impl GfpFlags {
    /// Ordinary kernel allocation.
    pub const KERNEL: Self = Self::new();

    /// Kernel allocation returning a zero-filled page.
    pub const KERNEL_ZERO: Self = Self::new().with_zero(true);
}
