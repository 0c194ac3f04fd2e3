//! # Mapping invalidation
//!
//! Tears down the pages backing a byte range of a paged object, e.g. when a
//! buffer object's CPU mapping is revoked.
//!
//! The whole scan runs under the object's collection lock. A busy page makes
//! the scan drop the lock, wait for the page, retake the lock and start over
//! from the first index: pages may have been inserted behind the cursor while
//! the lock was dropped, and none of them may survive the call.
//!
//! Every removed page is handed to [`PagedObject::free_page`].

use crate::host::{PageCollection, PagedObject};
use kernel_info::memory::PAGE_SHIFT;
use kernel_memory_addresses::{Size4K, pages_spanned};
use kernel_sync::SpinLockGuard;
use log::{debug, trace};

/// Outcome of [`unmap_mapping_range`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Invalidated {
    /// Pages removed from the object.
    pub pages: u64,
    /// Times the scan restarted after waiting on a busy page.
    pub restarts: u64,
}

/// Remove every resident page overlapping `[offset, offset + len)`.
///
/// Returns once no page in the range is resident. Blocks while pages in the
/// range are busy; completes as long as busy holders eventually let go.
pub fn unmap_mapping_range<O: PagedObject + ?Sized>(
    object: &O,
    offset: u64,
    len: u64,
) -> Invalidated {
    let mut result = Invalidated::default();
    if len == 0 {
        return result;
    }

    let first = offset >> PAGE_SHIFT;
    let end = pages_spanned::<Size4K>(offset.saturating_add(len));

    let mut pages = object.lock();
    'scan: loop {
        let mut cursor = first;
        while let Some(index) = pages.next_resident(cursor, end) {
            let busy = pages
                .lookup(index)
                .is_some_and(|page| page.flags().busy());
            if busy {
                result.restarts += 1;
                debug!("page {index} busy, waiting and rescanning from {first}");
                SpinLockGuard::unlocked(&mut pages, || object.wait_unbusy(index));
                continue 'scan;
            }
            if let Some(page) = pages.remove(index) {
                trace!("invalidated page {index} at {}", page.physical_address());
                object.free_page(page);
                result.pages += 1;
            }
            cursor = index + 1;
        }
        break;
    }
    drop(pages);

    debug!(
        "invalidated {} page(s) in {offset:#x}+{len:#x} ({} restart(s))",
        result.pages, result.restarts
    );
    result
}
