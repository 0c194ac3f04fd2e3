//! A simulated host for driving the compatibility layer from tests.
//!
//! * "RAM" and "MMIO" are heap buffers, so every address the host hands out
//!   is really dereferenceable.
//! * CPU pinning is a per-thread depth counter.
//! * Every host method that may sleep asserts that the calling thread is not
//!   pinned, and CPU-private windows assert they are released before unpin.

#![allow(dead_code)]

use kernel_compat_mm::error::{AttributeError, UserFault};
use kernel_compat_mm::{
    CacheAttribute, ContigRequest, CpuPin, KernelMappings, MapFlags, MappingModel, Page,
    PageFlags, PhysicalMemory, UserMemory,
};
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, Size4K, VirtualAddress};
use log::{LevelFilter, Log, Metadata, Record};
use std::alloc::{Layout, alloc, dealloc};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};

pub const PAGE: u64 = 4096;
pub const RAM_BASE: u64 = 0x10_0000;
pub const RAM_PAGES: usize = 32;
pub const MMIO_BASE: u64 = 0;
pub const MMIO_PAGES: usize = 16;
/// Byte pattern of memory nobody has zeroed.
pub const GARBAGE: u8 = 0xA5;

thread_local! {
    static PIN_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Page-aligned heap memory posing as a physical range.
struct Region {
    ptr: *mut u8,
    phys: u64,
    pages: usize,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    fn new(phys: u64, pages: usize, fill: u8) -> Self {
        let ptr = unsafe { alloc(Self::layout(pages)) };
        assert!(!ptr.is_null());
        unsafe { ptr.write_bytes(fill, pages * PAGE as usize) };
        Self { ptr, phys, pages }
    }

    fn layout(pages: usize) -> Layout {
        Layout::from_size_align(pages * PAGE as usize, PAGE as usize).unwrap()
    }

    fn contains(&self, pa: u64) -> bool {
        pa >= self.phys && pa < self.phys + self.pages as u64 * PAGE
    }

    fn va(&self, pa: u64) -> VirtualAddress {
        assert!(self.contains(pa), "{pa:#x} outside simulated region");
        VirtualAddress::from_ptr(unsafe { self.ptr.add((pa - self.phys) as usize) })
    }

    fn fill(&self, pa: u64, len: usize, value: u8) {
        unsafe { self.va(pa).as_mut_ptr::<u8>().write_bytes(value, len) };
    }

    fn read(&self, pa: u64, len: usize) -> Vec<u8> {
        assert!(self.contains(pa + len as u64 - 1));
        unsafe { std::slice::from_raw_parts(self.va(pa).as_ptr::<u8>(), len).to_vec() }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, Self::layout(self.pages)) };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub address: VirtualAddress,
    pub frame: PageFrameNumber,
    pub attribute: CacheAttribute,
    pub flags: MapFlags,
    pub owner: ThreadId,
}

#[derive(Default)]
pub struct Counters {
    pub alloc: AtomicU32,
    pub reclaim: AtomicU32,
    pub wait: AtomicU32,
    pub zero: AtomicU32,
    pub unwire: AtomicU32,
    pub blocking: AtomicU32,
    pub pins: AtomicU32,
}

impl Counters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub struct SimHost {
    ram: Region,
    mmio: Region,
    allocated: Mutex<Vec<bool>>,
    /// Fail this many upcoming `alloc_contig` calls.
    pub fail_allocs: AtomicU32,
    /// What `reclaim_contig` reports.
    pub reclaim_progress: AtomicBool,
    /// Hand out pages already flagged as zeroed.
    pub prezeroed: AtomicBool,
    /// Ignore the request window when picking a page.
    pub ignore_window: AtomicBool,
    /// CPU-private windows available per thread.
    pub window_capacity: AtomicUsize,
    pub unsupported: Mutex<Vec<CacheAttribute>>,
    pub counters: Counters,
    windows: Mutex<Vec<Window>>,
    devices: Mutex<Vec<(VirtualAddress, u64, CacheAttribute)>>,
    pub attribute_changes: Mutex<Vec<(VirtualAddress, u64, CacheAttribute)>>,
    /// PTE cache bits written by attribute changes.
    pub pte_bits: Mutex<Vec<u64>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            ram: Region::new(RAM_BASE, RAM_PAGES, GARBAGE),
            mmio: Region::new(MMIO_BASE, MMIO_PAGES, 0),
            allocated: Mutex::new(vec![false; RAM_PAGES]),
            fail_allocs: AtomicU32::new(0),
            reclaim_progress: AtomicBool::new(true),
            prezeroed: AtomicBool::new(false),
            ignore_window: AtomicBool::new(false),
            window_capacity: AtomicUsize::new(2),
            unsupported: Mutex::new(Vec::new()),
            counters: Counters::default(),
            windows: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
            attribute_changes: Mutex::new(Vec::new()),
            pte_bits: Mutex::new(Vec::new()),
        }
    }

    /// Direct map placing physical RAM at the simulated buffer.
    pub fn direct_map(&self) -> MappingModel {
        MappingModel::DirectMap {
            base: VirtualAddress::new((self.ram.ptr as u64).wrapping_sub(RAM_BASE)),
        }
    }

    pub fn ram_bytes(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        self.ram.read(pa.as_u64(), len)
    }

    pub fn mmio_bytes(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        self.mmio.read(pa.as_u64(), len)
    }

    pub fn windows(&self) -> Vec<Window> {
        self.windows.lock().unwrap().clone()
    }

    pub fn device_mappings(&self) -> Vec<(VirtualAddress, u64, CacheAttribute)> {
        self.devices.lock().unwrap().clone()
    }

    pub fn allocated_pages(&self) -> usize {
        self.allocated.lock().unwrap().iter().filter(|a| **a).count()
    }

    /// Mark every RAM page allocated so `alloc_contig` finds nothing.
    pub fn exhaust_ram(&self) {
        self.allocated.lock().unwrap().fill(true);
    }

    fn note_blocking(&self, what: &str) {
        assert!(!self.is_pinned(), "{what} may sleep but was called while pinned");
        self.counters.blocking.fetch_add(1, Ordering::SeqCst);
    }

    fn backing(&self, pa: u64) -> VirtualAddress {
        if self.ram.contains(pa) {
            self.ram.va(pa)
        } else {
            self.mmio.va(pa)
        }
    }
}

impl CpuPin for SimHost {
    fn pin(&self) {
        PIN_DEPTH.with(|d| d.set(d.get() + 1));
        self.counters.pins.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn unpin(&self) {
        PIN_DEPTH.with(|d| {
            assert!(d.get() > 0, "unpin without pin");
            d.set(d.get() - 1);
        });
    }

    fn is_pinned(&self) -> bool {
        PIN_DEPTH.with(Cell::get) > 0
    }
}

impl PhysicalMemory for SimHost {
    fn alloc_contig(&self, request: &ContigRequest) -> Option<Page> {
        self.note_blocking("alloc_contig");
        self.counters.alloc.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_allocs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return None;
        }

        let ignore_window = self.ignore_window.load(Ordering::SeqCst);
        let mut allocated = self.allocated.lock().unwrap();
        let index = (0..RAM_PAGES).find(|&i| {
            let pa = PhysicalAddress::new(RAM_BASE + i as u64 * PAGE);
            !allocated[i] && (ignore_window || request.admits(pa))
        })?;
        allocated[index] = true;

        let pa = PhysicalAddress::new(RAM_BASE + index as u64 * PAGE);
        let flags = PageFlags::new().with_zeroed(self.prezeroed.load(Ordering::SeqCst));
        if flags.zeroed() {
            self.ram.fill(pa.as_u64(), PAGE as usize, 0);
        }
        Some(Page::new(pa.page::<Size4K>(), request.attribute, flags))
    }

    fn reclaim_contig(&self, _request: &ContigRequest) -> bool {
        self.note_blocking("reclaim_contig");
        self.counters.reclaim.fetch_add(1, Ordering::SeqCst);
        self.reclaim_progress.load(Ordering::SeqCst)
    }

    fn wait_for_free_pages(&self) {
        self.note_blocking("wait_for_free_pages");
        self.counters.wait.fetch_add(1, Ordering::SeqCst);
    }

    fn zero_page(&self, page: &Page) {
        self.counters.zero.fetch_add(1, Ordering::SeqCst);
        self.ram.fill(page.physical_address().as_u64(), PAGE as usize, 0);
    }

    fn unwire(&self, page: Page) {
        self.counters.unwire.fetch_add(1, Ordering::SeqCst);
        let pa = page.physical_address().as_u64();
        if !self.ram.contains(pa) {
            return;
        }
        let index = ((pa - RAM_BASE) / PAGE) as usize;
        let mut allocated = self.allocated.lock().unwrap();
        assert!(allocated[index], "unwire of a free page {pa:#x}");
        allocated[index] = false;
        self.ram.fill(pa, PAGE as usize, GARBAGE);
    }
}

impl KernelMappings for SimHost {
    fn map_transient(
        &self,
        frame: PageFrameNumber,
        attribute: CacheAttribute,
        flags: MapFlags,
    ) -> Option<VirtualAddress> {
        if !flags.nowait() {
            self.note_blocking("map_transient");
        }
        let owner = thread::current().id();
        let mut windows = self.windows.lock().unwrap();
        if flags.cpu_private() {
            let in_use = windows
                .iter()
                .filter(|w| w.owner == owner && w.flags.cpu_private())
                .count();
            if in_use >= self.window_capacity.load(Ordering::SeqCst) {
                return None;
            }
        }
        let address = self.backing(frame.base().as_u64());
        windows.push(Window {
            address,
            frame,
            attribute,
            flags,
            owner,
        });
        Some(address)
    }

    unsafe fn unmap_transient(&self, address: VirtualAddress) {
        let owner = thread::current().id();
        let mut windows = self.windows.lock().unwrap();
        let index = windows
            .iter()
            .rposition(|w| w.address == address && w.owner == owner)
            .unwrap_or_else(|| panic!("unmap of unknown window {address}"));
        let window = windows.remove(index);
        if window.flags.cpu_private() {
            assert!(self.is_pinned(), "cpu-private window released after unpin");
        }
    }

    fn map_device(
        &self,
        pa: PhysicalAddress,
        len: u64,
        attribute: CacheAttribute,
    ) -> Option<VirtualAddress> {
        self.note_blocking("map_device");
        if !self.mmio.contains(pa.as_u64()) && !self.ram.contains(pa.as_u64()) {
            return None;
        }
        let address = self.backing(pa.as_u64());
        self.devices.lock().unwrap().push((address, len, attribute));
        Some(address)
    }

    unsafe fn unmap_device(&self, address: VirtualAddress, len: u64) {
        let mut devices = self.devices.lock().unwrap();
        let index = devices
            .iter()
            .rposition(|&(a, l, _)| a == address && l == len)
            .unwrap_or_else(|| panic!("unmap of unknown device mapping {address}"));
        devices.remove(index);
    }

    fn change_attribute(
        &self,
        address: VirtualAddress,
        pages: u64,
        attribute: CacheAttribute,
    ) -> Result<(), AttributeError> {
        self.note_blocking("change_attribute");
        if self.unsupported.lock().unwrap().contains(&attribute) {
            return Err(AttributeError { attribute });
        }
        self.pte_bits
            .lock()
            .unwrap()
            .push(attribute.pat_selector().pte_bits());
        self.attribute_changes
            .lock()
            .unwrap()
            .push((address, pages, attribute));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Read(u64),
    Write(u64),
}

/// A user address space: `valid` ranges can be faulted in, resident pages
/// are backed by real buffers.
pub struct SimUser {
    valid: Vec<std::ops::Range<u64>>,
    read_only: Vec<std::ops::Range<u64>>,
    resident: Mutex<BTreeMap<u64, Box<[u8; PAGE as usize]>>>,
    pub probes: Mutex<Vec<Probe>>,
}

impl SimUser {
    pub fn new(valid: Vec<std::ops::Range<u64>>) -> Self {
        Self {
            valid,
            read_only: Vec::new(),
            resident: Mutex::new(BTreeMap::new()),
            probes: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_read_only(mut self, range: std::ops::Range<u64>) -> Self {
        self.read_only.push(range);
        self
    }

    pub fn probes(&self) -> Vec<Probe> {
        self.probes.lock().unwrap().clone()
    }

    pub fn is_resident(&self, address: u64) -> bool {
        self.resident.lock().unwrap().contains_key(&(address & !(PAGE - 1)))
    }

    pub fn read(&self, address: u64, len: usize) -> Vec<u8> {
        (address..address + len as u64)
            .map(|a| {
                let pages = self.resident.lock().unwrap();
                pages[&(a & !(PAGE - 1))][(a % PAGE) as usize]
            })
            .collect()
    }

    fn fault_in(&self, address: u64, write: bool) -> Result<(), UserFault> {
        let fault = UserFault {
            address: VirtualAddress::new(address),
        };
        if !self.valid.iter().any(|r| r.contains(&address)) {
            return Err(fault);
        }
        if write && self.read_only.iter().any(|r| r.contains(&address)) {
            return Err(fault);
        }
        self.resident
            .lock()
            .unwrap()
            .entry(address & !(PAGE - 1))
            .or_insert_with(|| Box::new([0; PAGE as usize]));
        Ok(())
    }

    fn resident_byte(&self, address: u64) -> Result<(), UserFault> {
        if self.is_resident(address) {
            Ok(())
        } else {
            Err(UserFault {
                address: VirtualAddress::new(address),
            })
        }
    }
}

impl UserMemory for SimUser {
    fn fetch_byte(&self, address: VirtualAddress) -> Result<u8, UserFault> {
        let a = address.as_u64();
        self.probes.lock().unwrap().push(Probe::Read(a));
        self.fault_in(a, false)?;
        Ok(self.read(a, 1)[0])
    }

    fn store_byte(&self, address: VirtualAddress, value: u8) -> Result<(), UserFault> {
        let a = address.as_u64();
        self.probes.lock().unwrap().push(Probe::Write(a));
        self.fault_in(a, true)?;
        let mut pages = self.resident.lock().unwrap();
        pages.get_mut(&(a & !(PAGE - 1))).unwrap()[(a % PAGE) as usize] = value;
        Ok(())
    }

    fn copy_in_nofault(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), UserFault> {
        let start = src.as_u64();
        for a in start..start + dst.len() as u64 {
            self.resident_byte(a)?;
        }
        dst.copy_from_slice(&self.read(start, dst.len()));
        Ok(())
    }

    fn copy_out_nofault(&self, src: &[u8], dst: VirtualAddress) -> Result<(), UserFault> {
        let start = dst.as_u64();
        for a in start..start + src.len() as u64 {
            self.resident_byte(a)?;
            if self.read_only.iter().any(|r| r.contains(&a)) {
                return Err(UserFault {
                    address: VirtualAddress::new(a),
                });
            }
        }
        let mut pages = self.resident.lock().unwrap();
        for (i, byte) in src.iter().enumerate() {
            let a = start + i as u64;
            pages.get_mut(&(a & !(PAGE - 1))).unwrap()[(a % PAGE) as usize] = *byte;
        }
        Ok(())
    }
}

/// Collects log lines so tests can assert on diagnostics.
struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("[{}] {}: {}", record.level(), record.target(), record.args()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Whether any captured line contains `needle`.
pub fn logged(needle: &str) -> bool {
    LOGGER.lines.lock().unwrap().iter().any(|l| l.contains(needle))
}
