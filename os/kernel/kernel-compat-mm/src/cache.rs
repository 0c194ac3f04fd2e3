//! # Caching attributes
//!
//! Drivers ask for two non-default memory types: **uncached** for pages the
//! GPU reads behind the CPU's back, and **write-combining** for apertures and
//! MMIO where throughput matters and read-back ordering does not.
//!
//! On x86 the memory type of a 4 KiB mapping is selected by three PTE bits
//! (`PWT`, `PCD`, `PAT`) that index the eight-entry Page Attribute Table.
//! The firmware default table has no WC entry, so hosts reprogram entry 1
//! (`PWT=1, PCD=0, PAT=0`) from WT to WC, and entry 4 carries WT instead:
//!
//! | Entry | PAT | PCD | PWT | Type |
//! |-------|-----|-----|-----|------|
//! | 0     | 0   | 0   | 0   | WB   |
//! | 1     | 0   | 0   | 1   | WC   |
//! | 2     | 0   | 1   | 0   | UC-  |
//! | 3     | 0   | 1   | 1   | UC   |
//! | 4     | 1   | 0   | 0   | WT   |

use crate::error::Error;
use crate::host::KernelMappings;
use crate::kmap::KernelMapper;
use crate::page::Page;
use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;
use log::{trace, warn};

/// Caching mode of a mapping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CacheAttribute {
    /// Normal cacheable memory.
    #[default]
    WriteBack,
    WriteThrough,
    /// Writes are buffered and burst; reads are uncached.
    WriteCombining,
    /// Strong uncacheable.
    Uncached,
}

/// PTE bits selecting a PAT entry for a 4 KiB mapping.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PatSelector {
    /// Page Write-Through (PWT, PTE bit 3).
    pub pwt: bool,
    /// Page Cache Disable (PCD, PTE bit 4).
    pub pcd: bool,
    /// PAT index bit (PTE bit 7 on 4 KiB entries).
    pub pat: bool,
    #[bits(5, default = 0)]
    _reserved: u8,
}

impl PatSelector {
    /// Index into the Page Attribute Table.
    #[must_use]
    pub const fn entry(self) -> u8 {
        self.into_bits() & 0b111
    }

    /// The bits as they appear in a 4 KiB page-table entry.
    #[must_use]
    pub const fn pte_bits(self) -> u64 {
        let mut bits = 0;
        if self.pwt() {
            bits |= 1 << 3;
        }
        if self.pcd() {
            bits |= 1 << 4;
        }
        if self.pat() {
            bits |= 1 << 7;
        }
        bits
    }
}

impl CacheAttribute {
    #[must_use]
    pub const fn pat_selector(self) -> PatSelector {
        match self {
            Self::WriteBack => PatSelector::new(),
            Self::WriteCombining => PatSelector::new().with_pwt(true),
            Self::Uncached => PatSelector::new().with_pwt(true).with_pcd(true),
            Self::WriteThrough => PatSelector::new().with_pat(true),
        }
    }

    /// Inverse of [`pat_selector`](Self::pat_selector); `None` for entries
    /// this layout does not program.
    #[must_use]
    pub const fn from_pat_selector(selector: PatSelector) -> Option<Self> {
        match selector.entry() {
            0 => Some(Self::WriteBack),
            1 => Some(Self::WriteCombining),
            3 => Some(Self::Uncached),
            4 => Some(Self::WriteThrough),
            _ => None,
        }
    }
}

impl<H: KernelMappings + ?Sized> KernelMapper<'_, H> {
    /// Change the caching mode of `pages` already-mapped kernel pages
    /// starting at `address`.
    ///
    /// The caller must own the range exclusively; overlapping concurrent
    /// changes are not serialized here. A zero-page range is a no-op.
    ///
    /// # Errors
    /// [`Error::UnsupportedAttribute`] if the host cannot express
    /// `attribute`; the range is never downgraded to another mode.
    pub fn set_attribute(
        &self,
        address: VirtualAddress,
        pages: u64,
        attribute: CacheAttribute,
    ) -> Result<(), Error> {
        if pages == 0 {
            return Ok(());
        }
        trace!(
            "change attribute {address}+{pages} pages -> {attribute:?} (PAT entry {})",
            attribute.pat_selector().entry()
        );
        self.host()
            .change_attribute(address, pages, attribute)
            .map_err(|e| {
                warn!("host rejected {attribute:?} for {address}+{pages} pages: {e}");
                Error::from(e)
            })
    }

    /// [`set_attribute`](Self::set_attribute) with [`CacheAttribute::Uncached`].
    ///
    /// # Errors
    /// See [`set_attribute`](Self::set_attribute).
    pub fn set_memory_uc(&self, address: VirtualAddress, pages: u64) -> Result<(), Error> {
        self.set_attribute(address, pages, CacheAttribute::Uncached)
    }

    /// [`set_attribute`](Self::set_attribute) with [`CacheAttribute::WriteCombining`].
    ///
    /// # Errors
    /// See [`set_attribute`](Self::set_attribute).
    pub fn set_memory_wc(&self, address: VirtualAddress, pages: u64) -> Result<(), Error> {
        self.set_attribute(address, pages, CacheAttribute::WriteCombining)
    }

    /// [`set_attribute`](Self::set_attribute) with [`CacheAttribute::WriteBack`].
    ///
    /// # Errors
    /// See [`set_attribute`](Self::set_attribute).
    pub fn set_memory_wb(&self, address: VirtualAddress, pages: u64) -> Result<(), Error> {
        self.set_attribute(address, pages, CacheAttribute::WriteBack)
    }

    /// Make `pages` pages starting at `page` uncached through their permanent
    /// kernel address.
    ///
    /// # Errors
    /// [`Error::NoKernelAddress`] when the mapping model has no direct map,
    /// otherwise as [`set_attribute`](Self::set_attribute).
    pub fn set_pages_uc(&self, page: &Page, pages: u64) -> Result<(), Error> {
        let address = self
            .page_address(page)
            .ok_or(Error::NoKernelAddress(page.physical_address()))?;
        self.set_memory_uc(address, pages)
    }
}
