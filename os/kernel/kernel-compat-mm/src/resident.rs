//! A paged object whose resident pages live in an index-keyed map.

use crate::host::{PageCollection, PagedObject, PhysicalMemory};
use crate::page::{ObjectId, Page};
use alloc::collections::BTreeMap;
use core::hint::spin_loop;
use kernel_sync::{SpinLock, SpinLockGuard};
use log::trace;

/// The page set of a [`ResidentPages`] object.
#[derive(Debug, Default)]
pub struct PageSet {
    pages: BTreeMap<u64, Page>,
}

impl PageSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageCollection for PageSet {
    fn lookup(&self, index: u64) -> Option<&Page> {
        self.pages.get(&index)
    }

    fn remove(&mut self, index: u64) -> Option<Page> {
        let mut page = self.pages.remove(&index)?;
        page.set_owner(None);
        Some(page)
    }

    fn next_resident(&self, from: u64, end: u64) -> Option<u64> {
        self.pages.range(from..end).next().map(|(&index, _)| index)
    }
}

/// A device-pager style object: pages indexed by page offset, one lock.
///
/// Removed pages that are still wired go back to `host`.
pub struct ResidentPages<'h, H: PhysicalMemory + ?Sized> {
    id: ObjectId,
    host: &'h H,
    pages: SpinLock<PageSet>,
}

impl<'h, H: PhysicalMemory + ?Sized> ResidentPages<'h, H> {
    #[must_use]
    pub const fn new(id: ObjectId, host: &'h H) -> Self {
        Self {
            id,
            host,
            pages: SpinLock::new(PageSet {
                pages: BTreeMap::new(),
            }),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Make `page` resident at `index`, returning any page it replaces.
    pub fn insert(&self, index: u64, mut page: Page) -> Option<Page> {
        page.set_owner(Some(self.id));
        self.pages.with_lock(|set| set.pages.insert(index, page))
    }

    /// Mark the page at `index` busy. Fails if absent or already busy.
    pub fn try_busy(&self, index: u64) -> bool {
        self.pages.with_lock(|set| match set.pages.get_mut(&index) {
            Some(page) if !page.flags().busy() => {
                page.flags_mut().set_busy(true);
                true
            }
            _ => false,
        })
    }

    pub fn unbusy(&self, index: u64) {
        self.pages.with_lock(|set| {
            if let Some(page) = set.pages.get_mut(&index) {
                debug_assert!(page.flags().busy(), "unbusy of a page that is not busy");
                page.flags_mut().set_busy(false);
            }
        });
    }

    #[must_use]
    pub fn is_resident(&self, index: u64) -> bool {
        self.pages.with_lock(|set| set.pages.contains_key(&index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.with_lock(|set| set.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: PhysicalMemory + ?Sized> PagedObject for ResidentPages<'_, H> {
    type Pages = PageSet;

    fn lock(&self) -> SpinLockGuard<'_, PageSet> {
        self.pages.lock()
    }

    fn wait_unbusy(&self, index: u64) {
        loop {
            let busy = self.pages.with_lock(|set| {
                set.lookup(index).is_some_and(|page| page.flags().busy())
            });
            if !busy {
                return;
            }
            spin_loop();
        }
    }

    fn free_page(&self, mut page: Page) {
        if page.flags().wired() {
            trace!("unwiring invalidated page {}", page.physical_address());
            page.flags_mut().set_wired(false);
            self.host.unwire(page);
        }
    }
}
