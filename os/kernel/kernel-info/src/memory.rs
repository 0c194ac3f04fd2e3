//! # Memory Layout

/// Base page size in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Lowest physical address handed out for driver pages.
pub const DMA32_BASE: u64 = 0;

/// Highest physical address (inclusive) reachable by 32-bit DMA engines.
pub const DMA32_LIMIT: u64 = 0xffff_ffff;

/// Number of times a failed contiguous allocation is retried after reclaim.
pub const ALLOC_RECLAIM_RETRIES: u32 = 1;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(DMA32_LIMIT > DMA32_BASE);
    assert!((DMA32_LIMIT + 1).is_multiple_of(PAGE_SIZE));
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE));
};
