//! Control registers that drive paging: CR2 (fault address) and CR3 (page directory base).
//!
//! See Intel 3a, Section 2.5 "Control Registers" and Section 4.5 "4-Level Paging".

use bitflags::bitflags;
use core::arch::asm;

use super::address::PhysicalAddress;

const CR3_PHYSICAL_ADDRESS_MASK: u64 = 0x000f_ffff_ffff_f000;
const CR3_FLAGS_MASK: u64 = 0xfff;

bitflags! {
    /// Controls cache settings for the level 4 page table.
    pub struct Cr3Flags: u64 {
        /// Use a writethrough cache policy for the P4 table (else a writeback policy is used).
        const PAGE_LEVEL_WRITETHROUGH = 1 << 3;
        /// Disable caching for the P4 table.
        const PAGE_LEVEL_CACHE_DISABLE = 1 << 4;
    }
}

/// Points the translation hardware at a new level 4 page table by writing `page_directory`
/// verbatim into CR3.
///
/// All non-global TLB entries of this core are flushed. Other cores are not affected.
///
/// ## Safety
///
/// The caller must ensure that `page_directory` is the page aligned physical address of a valid
/// level 4 table (optionally carrying [`Cr3Flags`] in its low bits), and that the code, stack and
/// data in use right after this call are mapped identically by the new table.
#[inline(always)]
pub unsafe fn load_page_directory(page_directory: PhysicalAddress) {
    // no `nomem`: every memory access after this goes through the new tables
    asm!("mov cr3, {}", in(reg) page_directory.as_u64(), options(nostack, preserves_flags));
}

/// Returns the raw content of CR3.
#[inline(always)]
pub fn read_page_directory_register() -> u64 {
    let cr3: u64;
    unsafe {
        asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
    }
    cr3
}

/// Returns the raw content of CR2, the linear address of the most recent page fault.
///
/// Only meaningful at the start of a page fault handler; any later fault overwrites it.
#[inline(always)]
pub fn read_fault_address_register() -> u64 {
    let cr2: u64;
    unsafe {
        asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2
}

/// Read the current P4 table address from the CR3 register.
pub fn read_control_register_3() -> (PhysicalAddress, Cr3Flags) {
    split_control_register_3(read_page_directory_register())
}

/// Combines a P4 table address with cache flags and loads the result.
///
/// ## Safety
///
/// Same contract as [`load_page_directory`].
pub unsafe fn write_control_register_3(level_4_table: PhysicalAddress, flags: Cr3Flags) {
    let value = level_4_table.as_u64() | flags.bits();
    load_page_directory(PhysicalAddress::new_truncate(value));
}

fn split_control_register_3(value: u64) -> (PhysicalAddress, Cr3Flags) {
    let physical_address = PhysicalAddress::new_truncate(value & CR3_PHYSICAL_ADDRESS_MASK);
    let flags = Cr3Flags::from_bits_truncate(value & CR3_FLAGS_MASK);

    (physical_address, flags)
}

#[test_case]
fn test_split_control_register_3_separates_frame_and_flags() {
    let (level_4_table, flags) = split_control_register_3(0x0123_4567_89ab_cdf0);

    assert_eq!(level_4_table, PhysicalAddress::new(0x0003_4567_89ab_c000));
    assert_eq!(flags, Cr3Flags::PAGE_LEVEL_CACHE_DISABLE);
}

#[test_case]
fn test_active_page_directory_is_page_aligned() {
    let (level_4_table, _) = read_control_register_3();
    assert!(level_4_table.is_aligned(4096));
}

#[test_case]
fn test_reloading_page_directory_keeps_register_value() {
    let before = read_page_directory_register();
    unsafe { load_page_directory(PhysicalAddress::new(before)) };
    assert_eq!(read_page_directory_register(), before);
}
