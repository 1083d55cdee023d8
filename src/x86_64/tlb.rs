//! Translation lookaside buffer maintenance. Everything here only affects the executing core.

use core::arch::asm;

use super::{address::VirtualAddress, control};

/// Evicts the TLB entry for the page containing `address` with the `invlpg` instruction.
///
/// Must follow any change to a page table entry the processor may have cached. Also acts as a
/// compiler memory barrier, so page table writes are not moved past it.
#[inline(always)]
pub fn invalidate_page(address: VirtualAddress) {
    unsafe {
        asm!("invlpg [{}]", in(reg) address.as_u64(), options(nostack, preserves_flags));
    }
}

/// Flushes all non-global TLB entries by writing CR3 back to itself.
pub fn flush_all() {
    let (level_4_table, flags) = control::read_control_register_3();
    unsafe { control::write_control_register_3(level_4_table, flags) };
}

#[test_case]
fn test_invalidate_page_keeps_mapping_usable() {
    let value = volatile::Volatile::new(42u64);
    invalidate_page(VirtualAddress::from_ptr(&value));
    assert_eq!(value.read(), 42);
}

#[test_case]
fn test_flush_all_keeps_page_directory() {
    let before = control::read_page_directory_register();
    flush_all();
    assert_eq!(control::read_page_directory_register(), before);
}
