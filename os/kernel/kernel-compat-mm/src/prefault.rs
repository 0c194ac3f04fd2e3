//! # User-range prefaulting and non-faulting user copies
//!
//! Driver copy loops run with page faults disabled (a spinlock is held or an
//! atomic mapping is live). Before entering such a section the driver touches
//! every page of the user buffer so the fault handler resolves it *now*; the
//! copy itself then uses the non-faulting primitives and falls back to a slow
//! path if pages were evicted in between.

use crate::error::{Error, UserFault};
use crate::host::UserMemory;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{Size4K, VirtualAddress};
use log::trace;

/// Fault in every page of `[address, address + len)` for reading.
///
/// # Errors
/// [`Error::Fault`] at the first probe that cannot be resolved.
pub fn fault_in_readable<U: UserMemory + ?Sized>(
    user: &U,
    address: VirtualAddress,
    len: usize,
) -> Result<(), Error> {
    walk_pages(address, len, |probe| user.fetch_byte(probe).map(drop))
}

/// Fault in every page of `[address, address + len)` for writing.
///
/// Stores a zero byte into each page. The caller is about to overwrite the
/// whole range, so the zeros never become visible.
///
/// # Errors
/// [`Error::Fault`] at the first probe that cannot be resolved.
pub fn fault_in_writeable<U: UserMemory + ?Sized>(
    user: &U,
    address: VirtualAddress,
    len: usize,
) -> Result<(), Error> {
    walk_pages(address, len, |probe| user.store_byte(probe, 0))
}

/// Probe `address`, then every page-stride position up to the last byte,
/// then the last byte itself if the stride stepped over its page.
fn walk_pages(
    address: VirtualAddress,
    len: usize,
    mut probe: impl FnMut(VirtualAddress) -> Result<(), UserFault>,
) -> Result<(), Error> {
    if len == 0 {
        return Ok(());
    }
    let last = address
        .checked_add(len as u64 - 1)
        .ok_or(Error::Fault { address })?;

    let mut cursor = address;
    while cursor <= last {
        trace!("prefault {cursor}");
        probe(cursor)?;
        match cursor.checked_add(PAGE_SIZE) {
            Some(next) => cursor = next,
            // `cursor` was in the top page, which also holds `last`.
            None => return Ok(()),
        }
    }

    if cursor.same_page::<Size4K>(last) {
        trace!("prefault tail {last}");
        probe(last)?;
    }
    Ok(())
}

/// Copy `src` to user memory at `dst` without faulting.
///
/// Returns the number of bytes **not** copied: 0 on success, `src.len()` if
/// any destination page was not resident.
#[must_use]
pub fn copy_to_user_inatomic<U: UserMemory + ?Sized>(
    user: &U,
    dst: VirtualAddress,
    src: &[u8],
) -> usize {
    match user.copy_out_nofault(src, dst) {
        Ok(()) => 0,
        Err(e) => {
            trace!("copy_to_user_inatomic: {e}");
            src.len()
        }
    }
}

/// Copy from user memory at `src` into `dst` without faulting.
///
/// Returns the number of bytes **not** copied: 0 on success, `dst.len()` if
/// any source page was not resident.
#[must_use]
pub fn copy_from_user_inatomic<U: UserMemory + ?Sized>(
    user: &U,
    dst: &mut [u8],
    src: VirtualAddress,
) -> usize {
    match user.copy_in_nofault(src, dst) {
        Ok(()) => 0,
        Err(e) => {
            trace!("copy_from_user_inatomic: {e}");
            dst.len()
        }
    }
}
