//! # Kernel Memory Configuration
//!
//! Compile-time layout constants shared by the memory-management crates.
//!
//! The driver compatibility layer needs to agree with the host kernel on a
//! handful of facts: where physical memory is direct-mapped, which physical
//! window the legacy DMA-capable allocations must come from, and what the
//! base page size is. Those facts are collected here so every consumer reads
//! them from one place.
//!
//! ```text
//! Physical address window used for driver page allocations:
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  DMA32 window (default for      │
//!             │  driver backing pages)          │
//! DMA32_LIMIT ├─────────────────────────────────┤ 0xffff_ffff
//!             │  High memory (not handed to     │
//!             │  32-bit DMA capable devices)    │
//!             └─────────────────────────────────┘
//! ```
//!
//! Kernel virtual addresses for pages in the window are `HHDM_BASE + pa` on
//! hosts with a direct map.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
