//! # Kernel virtual mappings
//!
//! Makes physical pages CPU-addressable for the driver.
//!
//! Two flavours exist:
//!
//! * [`KernelMapper::map`] may sleep for mapping resources and returns a
//!   [`Mapping`] that can be used anywhere.
//! * [`KernelMapper::map_atomic`] pins the current CPU first and only uses
//!   non-blocking, CPU-private resources. The returned [`AtomicMapping`]
//!   carries the pin; it is `!Send` and releases the mapping *before* the pin
//!   when dropped.
//!
//! Under [`MappingModel::DirectMap`] RAM pages are permanently mapped, so
//! both flavours resolve to `base + pa` and unmapping has nothing to undo.

use crate::cache::CacheAttribute;
use crate::config::MappingModel;
use crate::error::Error;
use crate::host::{KernelMappings, MapFlags};
use crate::page::Page;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, Size4K, VirtualAddress};
use kernel_sync::PinGuard;
use log::trace;

/// What has to be undone when a mapping goes away.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Backing {
    /// Part of the permanent direct map.
    Direct,
    /// A transient window.
    Transient,
    /// A device mapping of `len` bytes.
    Device { len: u64 },
}

pub struct KernelMapper<'h, H: KernelMappings + ?Sized> {
    host: &'h H,
    model: MappingModel,
}

impl<'h, H: KernelMappings + ?Sized> KernelMapper<'h, H> {
    #[must_use]
    pub const fn new(host: &'h H, model: MappingModel) -> Self {
        Self { host, model }
    }

    #[must_use]
    pub const fn host(&self) -> &'h H {
        self.host
    }

    #[must_use]
    pub const fn model(&self) -> MappingModel {
        self.model
    }

    /// The permanent kernel address of `page`, if the model has one.
    #[must_use]
    pub const fn page_address(&self, page: &Page) -> Option<VirtualAddress> {
        match self.model {
            MappingModel::DirectMap { base } => {
                Some(base.wrapping_add(page.physical_address().as_u64()))
            }
            MappingModel::Transient => None,
        }
    }

    /// Map `page` for use from any context. May sleep.
    ///
    /// # Errors
    /// [`Error::ResourceExhausted`] if the host has no window left.
    pub fn map(&self, page: &Page) -> Result<Mapping<'h, H>, Error> {
        let (address, backing) = match self.model {
            MappingModel::DirectMap { base } => (
                base.wrapping_add(page.physical_address().as_u64()),
                Backing::Direct,
            ),
            MappingModel::Transient => {
                let address = self
                    .host
                    .map_transient(page.frame_number(), page.attribute(), MapFlags::new())
                    .ok_or(Error::ResourceExhausted)?;
                (address, Backing::Transient)
            }
        };
        trace!("map {} -> {address}", page.physical_address());
        Ok(Mapping {
            host: self.host,
            address,
            attribute: page.attribute(),
            backing,
        })
    }

    /// Pin the CPU and map `page` without sleeping.
    ///
    /// On failure the pin has already been released.
    ///
    /// # Errors
    /// [`Error::ResourceExhausted`] if no CPU-private window is free; the
    /// caller is expected to fall back to a path that may fault.
    pub fn map_atomic(&self, page: &Page) -> Result<AtomicMapping<'h, H>, Error> {
        let pin = PinGuard::new(self.host);
        match self.model {
            MappingModel::DirectMap { base } => {
                let address = base.wrapping_add(page.physical_address().as_u64());
                trace!("map_atomic {} -> {address}", page.physical_address());
                Ok(AtomicMapping {
                    address,
                    attribute: page.attribute(),
                    backing: Backing::Direct,
                    pin,
                })
            }
            MappingModel::Transient => {
                Self::map_window(pin, page.frame_number(), page.attribute(), 0)
            }
        }
    }

    /// Pin the CPU and map one frame by number, without sleeping.
    ///
    /// Used for device memory that has no page object behind it; the frame is
    /// always mapped through a window so `attribute` takes effect.
    ///
    /// # Errors
    /// [`Error::ResourceExhausted`] if no CPU-private window is free.
    pub fn map_atomic_pfn(
        &self,
        frame: PageFrameNumber,
        attribute: CacheAttribute,
    ) -> Result<AtomicMapping<'h, H>, Error> {
        Self::map_window(PinGuard::new(self.host), frame, attribute, 0)
    }

    pub(crate) fn map_atomic_phys(
        &self,
        pa: PhysicalAddress,
        attribute: CacheAttribute,
    ) -> Result<AtomicMapping<'h, H>, Error> {
        Self::map_window(
            PinGuard::new(self.host),
            pa.frame(),
            attribute,
            pa.offset::<Size4K>(),
        )
    }

    fn map_window(
        pin: PinGuard<'h, H>,
        frame: PageFrameNumber,
        attribute: CacheAttribute,
        offset: u64,
    ) -> Result<AtomicMapping<'h, H>, Error> {
        // On failure `pin` is dropped here, releasing the CPU.
        let window = pin
            .host()
            .map_transient(frame, attribute, MapFlags::ATOMIC)
            .ok_or(Error::ResourceExhausted)?;
        trace!("map_atomic {frame:?} -> {window} ({attribute:?})");
        Ok(AtomicMapping {
            address: window + offset,
            attribute,
            backing: Backing::Transient,
            pin,
        })
    }

    /// Map `len` bytes of device memory with `attribute`. May sleep.
    ///
    /// # Errors
    /// [`Error::ResourceExhausted`] if the host cannot map the range.
    pub fn ioremap(
        &self,
        pa: PhysicalAddress,
        len: u64,
        attribute: CacheAttribute,
    ) -> Result<Mapping<'h, H>, Error> {
        let address = self
            .host
            .map_device(pa, len, attribute)
            .ok_or(Error::ResourceExhausted)?;
        trace!("ioremap {pa}+{len:#x} -> {address} ({attribute:?})");
        Ok(Mapping {
            host: self.host,
            address,
            attribute,
            backing: Backing::Device { len },
        })
    }

    /// [`ioremap`](Self::ioremap) with write-combining.
    ///
    /// # Errors
    /// See [`ioremap`](Self::ioremap).
    pub fn ioremap_wc(&self, pa: PhysicalAddress, len: u64) -> Result<Mapping<'h, H>, Error> {
        self.ioremap(pa, len, CacheAttribute::WriteCombining)
    }

    /// [`ioremap`](Self::ioremap) uncached.
    ///
    /// # Errors
    /// See [`ioremap`](Self::ioremap).
    pub fn ioremap_uc(&self, pa: PhysicalAddress, len: u64) -> Result<Mapping<'h, H>, Error> {
        self.ioremap(pa, len, CacheAttribute::Uncached)
    }

    /// Map a firmware (ACPI) table. Tables live in ordinary RAM and are read
    /// write-back.
    ///
    /// # Errors
    /// See [`ioremap`](Self::ioremap).
    pub fn map_firmware_table(&self, pa: PhysicalAddress, len: u64) -> Result<Mapping<'h, H>, Error> {
        self.ioremap(pa, len, CacheAttribute::WriteBack)
    }
}

/// A live, non-atomic kernel mapping. Unmapped when dropped.
#[must_use = "dropping the mapping unmaps it"]
pub struct Mapping<'h, H: KernelMappings + ?Sized> {
    host: &'h H,
    address: VirtualAddress,
    attribute: CacheAttribute,
    backing: Backing,
}

impl<H: KernelMappings + ?Sized> Mapping<'_, H> {
    #[inline]
    #[must_use]
    pub const fn address(&self) -> VirtualAddress {
        self.address
    }

    #[inline]
    #[must_use]
    pub const fn attribute(&self) -> CacheAttribute {
        self.attribute
    }

    #[inline]
    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        false
    }

    /// Bytes addressable through this mapping.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        match self.backing {
            Backing::Direct | Backing::Transient => PAGE_SIZE,
            Backing::Device { len } => len,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the mapped bytes.
    ///
    /// # Safety
    /// The host must have produced a dereferenceable address, and no other
    /// mapping of the same memory may be written for the returned lifetime.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(self.address.as_mut_ptr(), self.len() as usize)
        }
    }

    /// Unmap explicitly; equivalent to dropping.
    pub fn unmap(self) {
        drop(self);
    }
}

impl<H: KernelMappings + ?Sized> Drop for Mapping<'_, H> {
    fn drop(&mut self) {
        match self.backing {
            // The direct map is permanent until the page itself is freed.
            Backing::Direct => {}
            Backing::Transient => unsafe { self.host.unmap_transient(self.address) },
            Backing::Device { len } => unsafe { self.host.unmap_device(self.address, len) },
        }
        trace!("unmap {}", self.address);
    }
}

/// A live mapping created inside a CPU pin.
///
/// Dropping it releases the mapping resource first and the pin second.
#[must_use = "dropping the mapping unmaps it"]
pub struct AtomicMapping<'h, H: KernelMappings + ?Sized> {
    address: VirtualAddress,
    attribute: CacheAttribute,
    backing: Backing,
    pin: PinGuard<'h, H>,
}

impl<H: KernelMappings + ?Sized> AtomicMapping<'_, H> {
    #[inline]
    #[must_use]
    pub const fn address(&self) -> VirtualAddress {
        self.address
    }

    #[inline]
    #[must_use]
    pub const fn attribute(&self) -> CacheAttribute {
        self.attribute
    }

    #[inline]
    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        true
    }

    /// Bytes addressable from [`address`](Self::address) to the end of its page.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        PAGE_SIZE - self.address.offset::<Size4K>()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the mapped bytes.
    ///
    /// # Safety
    /// Same contract as [`Mapping::as_bytes_mut`].
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(self.address.as_mut_ptr(), self.len() as usize)
        }
    }

    /// Unmap and unpin; equivalent to dropping.
    pub fn unmap(self) {
        drop(self);
    }
}

impl<H: KernelMappings + ?Sized> Drop for AtomicMapping<'_, H> {
    fn drop(&mut self) {
        if self.backing == Backing::Transient {
            let window = self.address.align_down::<Size4K>();
            unsafe { self.pin.host().unmap_transient(window) };
        }
        trace!("unmap_atomic {}", self.address);
        // `pin` is dropped after this body returns.
    }
}
