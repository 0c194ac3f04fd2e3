//! Runtime policy for the compatibility layer.

use crate::cache::CacheAttribute;
use kernel_info::memory::{ALLOC_RECLAIM_RETRIES, DMA32_BASE, DMA32_LIMIT, HHDM_BASE, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Allocation policy for driver backing pages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MmConfig {
    /// Lowest physical address handed out.
    pub low: PhysicalAddress,
    /// Highest physical address handed out (inclusive).
    pub high: PhysicalAddress,
    pub alignment: u64,
    /// 0 for no boundary constraint.
    pub boundary: u64,
    /// Caching attribute newly allocated pages receive.
    pub attribute: CacheAttribute,
    /// Reclaim-and-retry passes after a failed allocation.
    pub reclaim_retries: u32,
}

impl MmConfig {
    /// The legacy driver policy: uncached pages below 4 GiB, one retry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            low: PhysicalAddress::new(DMA32_BASE),
            high: PhysicalAddress::new(DMA32_LIMIT),
            alignment: PAGE_SIZE,
            boundary: 0,
            attribute: CacheAttribute::Uncached,
            reclaim_retries: ALLOC_RECLAIM_RETRIES,
        }
    }

    #[must_use]
    pub const fn with_window(mut self, low: PhysicalAddress, high: PhysicalAddress) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    #[must_use]
    pub const fn with_attribute(mut self, attribute: CacheAttribute) -> Self {
        self.attribute = attribute;
        self
    }
}

impl Default for MmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the host makes a page CPU-addressable.
///
/// Chosen once when the [`KernelMapper`](crate::KernelMapper) is built.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MappingModel {
    /// All of physical memory is permanently mapped at `base + pa`.
    /// Unmapping a page is a no-op.
    DirectMap { base: VirtualAddress },
    /// Each mapping borrows a transient window from the host.
    Transient,
}

impl MappingModel {
    /// Direct map at the kernel's HHDM base.
    #[must_use]
    pub const fn hhdm() -> Self {
        Self::DirectMap {
            base: VirtualAddress::new(HHDM_BASE),
        }
    }
}

impl Default for MappingModel {
    fn default() -> Self {
        Self::hhdm()
    }
}
