//! # Driver Memory-Management Compatibility Layer
//!
//! Lets a graphics driver written against Linux memory-management calls run
//! on a host kernel with a different virtual-memory subsystem. The driver's
//! requests ("give me an uncached page", "map this page", "map this aperture
//! offset write-combined") are translated into the host's primitives while
//! keeping the driver's assumptions about atomic (non-sleeping, CPU-pinned)
//! contexts intact.
//!
//! ## Components
//!
//! ```text
//!           driver
//!   ┌─────────┼───────────────┬────────────────┬──────────────┐
//!   ▼         ▼               ▼                ▼              ▼
//! PageAllocator  KernelMapper ◄── IoMapping   unmap_mapping_  fault_in_*
//!   │          │   (map / map_atomic)          range          copy_*_inatomic
//!   │          │      │                          │              │
//!   │          └── set_memory_* (cache)          │              │
//!   ▼                 ▼                          ▼              ▼
//! PhysicalMemory   KernelMappings + CpuPin    PagedObject    UserMemory
//!                      (host capabilities, see [`host`])
//! ```
//!
//! * [`PageAllocator`]: single contiguous pages from the DMA32 window, with
//!   one bounded reclaim-and-retry pass.
//! * [`KernelMapper`]: blocking and atomic kernel mappings, device remaps and
//!   caching-attribute changes.
//! * [`IoMapping`]: lazily resolved write-combined MMIO windows.
//! * [`unmap_mapping_range`]: tears down a paged object's pages, waiting out
//!   busy pages with restart-on-contention.
//! * [`fault_in_readable`] / [`fault_in_writeable`]: prefault user buffers
//!   before sections that must not fault.
//!
//! ## Blocking rules
//!
//! Atomic mappings never reach a host method that may sleep: they only use
//! [`MapFlags::ATOMIC`] windows or the permanent direct map. Everything else
//! may sleep and must not be called while an [`AtomicMapping`] is alive.
//!
//! ## Example
//!
//! ```rust,ignore
//! let alloc = PageAllocator::new(&host, MmConfig::default());
//! let mapper = KernelMapper::new(&host, MappingModel::hhdm());
//!
//! let page = alloc.allocate_page(GfpFlags::KERNEL_ZERO)?;
//! {
//!     let mut m = mapper.map_atomic(&page)?;
//!     unsafe { m.as_bytes_mut()[..4].copy_from_slice(b"GPU!") };
//! } // unmapped, then unpinned
//! alloc.release_page(page);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod alloc_page;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
mod invalidate;
mod io_mapping;
mod kmap;
pub mod page;
mod prefault;
mod resident;

pub use crate::alloc_page::PageAllocator;
pub use crate::cache::{CacheAttribute, PatSelector};
pub use crate::config::{MappingModel, MmConfig};
pub use crate::error::{Error, VmFault};
pub use crate::host::{
    ContigRequest, CpuPin, KernelMappings, MapFlags, PageCollection, PagedObject,
    PhysicalMemory, UserMemory,
};
pub use crate::invalidate::{Invalidated, unmap_mapping_range};
pub use crate::io_mapping::IoMapping;
pub use crate::kmap::{AtomicMapping, KernelMapper, Mapping};
pub use crate::page::{GfpFlags, ObjectId, Page, PageFlags, page_to_phys};
pub use crate::prefault::{
    copy_from_user_inatomic, copy_to_user_inatomic, fault_in_readable, fault_in_writeable,
};
pub use crate::resident::{PageSet, ResidentPages};
