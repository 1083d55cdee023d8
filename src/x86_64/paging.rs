//! In-memory format of 4-level page tables, as far as callers of the register interface need to
//! walk and patch them.

use core::{
    fmt,
    ops::{Index, IndexMut},
};

use bitflags::bitflags;

use super::address::PhysicalAddress;

const ENTRY_COUNT: usize = 512;
const ENTRY_ADDRESS_MASK: u64 = 0x000f_ffff_ffff_f000;

pub const PAGE_SIZE: u64 = 4096;

#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRY_COUNT],
}

impl PageTable {
    pub const fn new() -> Self {
        PageTable {
            entries: [PageTableEntry::new(); ENTRY_COUNT],
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<PageTableIndex> for PageTable {
    type Output = PageTableEntry;

    fn index(&self, index: PageTableIndex) -> &Self::Output {
        &self.entries[index.0 as usize]
    }
}

impl IndexMut<PageTableIndex> for PageTable {
    fn index_mut(&mut self, index: PageTableIndex) -> &mut Self::Output {
        &mut self.entries[index.0 as usize]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry {
    entry: u64,
}

bitflags! {
    pub struct PageTableEntryFlags: u64 {
        // Is the page table present in memory or not
        const PRESENT         = 1 << 0;
        // If this bit is unset in a level 1 page table entry, the mapped frame is read-only.
        // If this bit is unset in a higher level page table entry the complete range of mapped
        // pages is read-only.
        const WRITABLE        = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const WRITE_THROUGH   = 1 << 3;
        const NO_CACHE        = 1 << 4;
        // CPU sets it if the mapped frame or page table is used.
        const ACCESSED        = 1 << 5;
        // CPU sets it when it performs the write to the mapped frame
        const DIRTY           = 1 << 6;
        // Entry maps a huge frame instead of a page table. Only allowed in P2 or P3 tables.
        const HUGE_PAGE       = 1 << 7;
        // Not flushed from the TLB on a CR3 write
        const GLOBAL          = 1 << 8;
        const NO_EXECUTE      = 1 << 63;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameError {
    FrameNotPresent,
    HugeFrame,
}

impl PageTableEntry {
    pub const fn new() -> PageTableEntry {
        PageTableEntry { entry: 0 }
    }

    pub fn flags(&self) -> PageTableEntryFlags {
        PageTableEntryFlags::from_bits_truncate(self.entry)
    }

    pub fn address(&self) -> PhysicalAddress {
        PhysicalAddress::new_truncate(self.entry & ENTRY_ADDRESS_MASK)
    }

    pub fn is_unused(&self) -> bool {
        self.entry == 0
    }

    pub fn set(&mut self, address: PhysicalAddress, flags: PageTableEntryFlags) {
        assert!(address.is_aligned(PAGE_SIZE), "frame address must be page aligned");
        self.entry = address.as_u64() | flags.bits();
    }

    /// Points the entry at another frame and keeps its flags.
    pub fn set_address(&mut self, address: PhysicalAddress) {
        self.set(address, self.flags());
    }

    /// The frame the entry points to, if it is a present, non-huge mapping.
    pub fn frame(&self) -> Result<PhysicalAddress, FrameError> {
        if !self.flags().contains(PageTableEntryFlags::PRESENT) {
            Err(FrameError::FrameNotPresent)
        } else if self.flags().contains(PageTableEntryFlags::HUGE_PAGE) {
            Err(FrameError::HugeFrame)
        } else {
            Ok(self.address())
        }
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut f = f.debug_struct("PageTableEntry");
        f.field("addr", &self.address());
        f.field("flags", &self.flags());
        f.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageTableIndex(u16);

impl PageTableIndex {
    pub fn new_truncate(index: u16) -> PageTableIndex {
        PageTableIndex(index % (ENTRY_COUNT as u16))
    }
}

#[test_case]
fn test_set_address_keeps_flags() {
    let flags = PageTableEntryFlags::PRESENT | PageTableEntryFlags::WRITABLE;
    let mut entry = PageTableEntry::new();
    entry.set(PhysicalAddress::new(0x5000), flags);
    entry.set_address(PhysicalAddress::new(0x9000));

    assert_eq!(entry.frame(), Ok(PhysicalAddress::new(0x9000)));
    assert_eq!(entry.flags(), flags);
}

#[test_case]
fn test_frame_of_missing_or_huge_entries_is_an_error() {
    let mut entry = PageTableEntry::new();
    assert!(entry.is_unused());
    assert_eq!(entry.frame(), Err(FrameError::FrameNotPresent));

    entry.set(
        PhysicalAddress::new(0x20_0000),
        PageTableEntryFlags::PRESENT | PageTableEntryFlags::HUGE_PAGE,
    );
    assert_eq!(entry.frame(), Err(FrameError::HugeFrame));
}
