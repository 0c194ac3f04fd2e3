//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the addresses that cross the boundary between
//! a graphics driver and the host kernel's virtual-memory subsystem.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A host physical address (RAM or device MMIO). |
//! | [`VirtualAddress`] | A kernel or user virtual address. |
//! | [`PhysicalPage<S>`] | The page-aligned base of a physical page of size `S`. |
//! | [`PageFrameNumber`] | A 4 KiB frame index (`pa >> 12`), the unit page tables are addressed by. |
//!
//! Page sizes are type-level markers implementing [`PageSize`]; [`Size4K`]
//! is the base granularity.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0000_0010_2000_0000);
//! assert_eq!(pa.offset::<Size4K>(), 0x42);
//!
//! let pfn = page.frame();
//! assert_eq!(pfn.base(), page.base());
//! ```
//!
//! All types are `#[repr(transparent)]`, `Copy`, `Ord` and `Hash`, so they can
//! be used as map keys and passed across FFI boundaries unchanged.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_frame_number;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use page_frame_number::PageFrameNumber;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;

/// Number of `S`-sized pages needed to cover `len` bytes.
#[inline]
#[must_use]
pub const fn pages_spanned<S: PageSize>(len: u64) -> u64 {
    len.div_ceil(S::SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_offset_4k() {
        let pa = PhysicalAddress::new(0x1234_5678_9ABC_DEF0);
        let page = pa.page::<Size4K>();
        assert_eq!(page.base().as_u64() & 0xFFF, 0);
        assert_eq!(pa.offset::<Size4K>(), 0xEF0);
        assert_eq!(page.base() + pa.offset::<Size4K>(), pa);
    }

    #[test]
    fn frame_numbers_round_trip_through_addresses() {
        let pa = PhysicalAddress::new(0x0000_0000_fee0_0123);
        let pfn = pa.frame();
        assert_eq!(pfn.as_u64(), 0xfee00);
        assert_eq!(pfn.base().as_u64(), 0xfee0_0000);
        assert_eq!(pfn.page().base(), pa.page::<Size4K>().base());
    }

    #[test]
    fn virtual_same_page() {
        let a = VirtualAddress::new(0x7fff_0000_1ffe);
        let b = VirtualAddress::new(0x7fff_0000_1fff);
        let c = VirtualAddress::new(0x7fff_0000_2000);
        assert!(a.same_page::<Size4K>(b));
        assert!(!b.same_page::<Size4K>(c));
        assert_eq!(c.align_down::<Size4K>().as_u64(), 0x7fff_0000_2000);
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        assert!(VirtualAddress::new(u64::MAX).checked_add(1).is_none());
        assert!(PhysicalAddress::new(u64::MAX - 1).checked_add(1).is_some());
    }

    #[test]
    fn pages_spanned_rounds_up() {
        assert_eq!(pages_spanned::<Size4K>(0), 0);
        assert_eq!(pages_spanned::<Size4K>(1), 1);
        assert_eq!(pages_spanned::<Size4K>(4096), 1);
        assert_eq!(pages_spanned::<Size4K>(4097), 2);
    }

    #[test]
    fn pointer_round_trip() {
        let mut byte = 0u8;
        let va = VirtualAddress::from_ptr(&raw mut byte);
        assert_eq!(va.as_mut_ptr::<u8>(), &raw mut byte);
    }
}
