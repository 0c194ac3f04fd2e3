//! # Write-combined I/O mappings
//!
//! An [`IoMapping`] only *describes* an MMIO window (typically a GPU
//! aperture). Nothing is mapped or reserved when it is created; each access
//! resolves `base + offset` and maps one page on demand, because the window
//! can be larger than what may stay mapped permanently and because the
//! atomic path must not block.

use crate::cache::CacheAttribute;
use crate::error::Error;
use crate::host::KernelMappings;
use crate::kmap::{AtomicMapping, KernelMapper, Mapping};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use log::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoMapping {
    base: PhysicalAddress,
    size: u64,
    attribute: CacheAttribute,
}

impl IoMapping {
    /// Describe a write-combined window of `size` bytes at `base`.
    ///
    /// The physical range is assumed to be reserved by whoever discovered it.
    #[must_use]
    pub const fn create_wc(base: PhysicalAddress, size: u64) -> Self {
        Self {
            base,
            size,
            attribute: CacheAttribute::WriteCombining,
        }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn attribute(&self) -> CacheAttribute {
        self.attribute
    }

    /// Physical address of `offset`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `offset >= size`.
    pub const fn resolve(&self, offset: u64) -> Result<PhysicalAddress, Error> {
        if offset >= self.size {
            return Err(Error::InvalidArgument {
                offset,
                size: self.size,
            });
        }
        match self.base.checked_add(offset) {
            Some(pa) => Ok(pa),
            None => Err(Error::InvalidArgument {
                offset,
                size: self.size,
            }),
        }
    }

    /// Map one page at `offset`. May sleep.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an out-of-range offset,
    /// [`Error::ResourceExhausted`] if the host cannot map it.
    pub fn map_wc<'h, H: KernelMappings + ?Sized>(
        &self,
        mapper: &KernelMapper<'h, H>,
        offset: u64,
    ) -> Result<Mapping<'h, H>, Error> {
        let pa = self.resolve(offset)?;
        trace!("io_mapping {} map offset {offset:#x}", self.base);
        mapper.ioremap(pa, PAGE_SIZE, self.attribute)
    }

    /// Pin the CPU and map the page at `offset` without sleeping.
    ///
    /// The returned address corresponds to `base + offset` exactly.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an out-of-range offset,
    /// [`Error::ResourceExhausted`] if no CPU-private window is free.
    pub fn map_atomic_wc<'h, H: KernelMappings + ?Sized>(
        &self,
        mapper: &KernelMapper<'h, H>,
        offset: u64,
    ) -> Result<AtomicMapping<'h, H>, Error> {
        let pa = self.resolve(offset)?;
        mapper.map_atomic_phys(pa, self.attribute)
    }

    /// Release the description. Nothing is mapped, so nothing is unmapped.
    pub fn free(self) {
        trace!("io_mapping {} freed", self.base);
    }
}
