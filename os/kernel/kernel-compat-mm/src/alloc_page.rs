//! # Physical page allocator
//!
//! Driver backing pages are single, physically contiguous, frame-aligned
//! pages from the configured window (the 32-bit DMA window by default), with
//! the configured caching attribute (uncached by default).
//!
//! ```text
//!   attempt ──ok──────────────────────────────► page
//!      │fail
//!      ▼
//!   reclaim ──no progress──► wait for free pages
//!      │                           │
//!      ▼                           ▼
//!   attempt once more ──ok────────────────────► page
//!      │fail
//!      ▼
//!   ResourceExhausted
//! ```
//!
//! The number of reclaim passes is bounded by
//! [`MmConfig::reclaim_retries`](crate::MmConfig::reclaim_retries).

use crate::config::MmConfig;
use crate::error::Error;
use crate::host::{ContigRequest, CpuPin, PhysicalMemory};
use crate::page::{GfpFlags, Page};
use kernel_info::memory::DMA32_LIMIT;
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, trace, warn};

pub struct PageAllocator<'h, H: PhysicalMemory + CpuPin + ?Sized> {
    host: &'h H,
    config: MmConfig,
}

impl<'h, H: PhysicalMemory + CpuPin + ?Sized> PageAllocator<'h, H> {
    #[must_use]
    pub const fn new(host: &'h H, config: MmConfig) -> Self {
        Self { host, config }
    }

    #[must_use]
    pub const fn config(&self) -> &MmConfig {
        &self.config
    }

    /// Allocate one page.
    ///
    /// May reclaim and sleep; must not be called while pinned.
    ///
    /// # Errors
    /// [`Error::ResourceExhausted`] if the page could not be found even after
    /// the reclaim pass.
    pub fn allocate_page(&self, gfp: GfpFlags) -> Result<Page, Error> {
        debug_assert!(
            !self.host.is_pinned(),
            "page allocation may sleep and must not run while pinned"
        );

        let request = self.request(gfp);
        let mut tries = 0;
        let mut page = loop {
            if let Some(page) = self.attempt(&request) {
                break page;
            }
            if tries >= self.config.reclaim_retries {
                warn!(
                    "no page in {}..={} after {tries} reclaim pass(es)",
                    request.low, request.high
                );
                return Err(Error::ResourceExhausted);
            }
            tries += 1;
            debug!("contiguous allocation failed, reclaim pass {tries}");
            if !self.host.reclaim_contig(&request) {
                self.host.wait_for_free_pages();
            }
        };

        if gfp.zero() && !page.flags().zeroed() {
            self.host.zero_page(&page);
            page.flags_mut().set_zeroed(true);
        }
        page.flags_mut().set_wired(true);
        trace!("allocated page {}", page.physical_address());
        Ok(page)
    }

    /// Give a page obtained from [`allocate_page`](Self::allocate_page) back
    /// to the host.
    pub fn release_page(&self, mut page: Page) {
        trace!("releasing page {}", page.physical_address());
        page.flags_mut().set_wired(false);
        self.host.unwire(page);
    }

    fn request(&self, gfp: GfpFlags) -> ContigRequest {
        let high = if gfp.dma32() && self.config.high.as_u64() > DMA32_LIMIT {
            PhysicalAddress::new(DMA32_LIMIT)
        } else {
            self.config.high
        };
        ContigRequest {
            pages: 1,
            low: self.config.low,
            high,
            alignment: self.config.alignment,
            boundary: self.config.boundary,
            attribute: self.config.attribute,
        }
    }

    fn attempt(&self, request: &ContigRequest) -> Option<Page> {
        let page = self.host.alloc_contig(request)?;
        if request.admits(page.physical_address()) {
            return Some(page);
        }
        warn!(
            "host returned page {} outside of {}..={}",
            page.physical_address(),
            request.low,
            request.high
        );
        self.host.unwire(page);
        None
    }
}
