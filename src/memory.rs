//! Page table walking and address space switching on top of [`HardwareRegisters`].
//!
//! Page tables are reached through a linear mapping of all physical memory starting at
//! `physical_memory_offset`, as set up by the bootloader.

use crate::x86_64::{
    address::{PhysicalAddress, VirtualAddress},
    hardware::HardwareRegisters,
    paging::{FrameError, PageTable, PageTableEntry, PAGE_SIZE},
};

const CR3_PHYSICAL_ADDRESS_MASK: u64 = 0x000f_ffff_ffff_f000;

/// Get the level 4 page table the processor currently uses.
///
/// # Safety
/// The user needs to provide a vaild physical memory offset value for this to work properly
/// otherwise undefined memory behaviour can occur. The returned reference aliases whatever else
/// points at the table.
pub unsafe fn active_level4_page_table(
    registers: &impl HardwareRegisters,
    physical_memory_offset: VirtualAddress,
) -> &'static mut PageTable {
    let level4_table = registers.page_directory() & CR3_PHYSICAL_ADDRESS_MASK;
    table_at(PhysicalAddress::new_truncate(level4_table), physical_memory_offset)
}

unsafe fn table_at(
    physical_address: PhysicalAddress,
    physical_memory_offset: VirtualAddress,
) -> &'static mut PageTable {
    let virtual_address = physical_memory_offset + physical_address.as_u64();
    &mut *virtual_address.as_mut_ptr::<PageTable>()
}

/// Returns the level 1 entry mapping `address`.
///
/// Fails if a table on the way is missing or `address` lies in a huge page.
///
/// # Safety
/// Same contract as [`active_level4_page_table`].
pub unsafe fn level1_entry_mut(
    registers: &impl HardwareRegisters,
    physical_memory_offset: VirtualAddress,
    address: VirtualAddress,
) -> Result<&'static mut PageTableEntry, FrameError> {
    let level4_table = active_level4_page_table(registers, physical_memory_offset);

    let level3_frame = level4_table[address.p4_index()].frame()?;
    let level3_table = table_at(level3_frame, physical_memory_offset);

    let level2_frame = level3_table[address.p3_index()].frame()?;
    let level2_table = table_at(level2_frame, physical_memory_offset);

    let level1_frame = level2_table[address.p2_index()].frame()?;
    let level1_table = table_at(level1_frame, physical_memory_offset);

    Ok(&mut level1_table[address.p1_index()])
}

/// Translates `address` through the active page tables.
pub fn translate_address(
    registers: &impl HardwareRegisters,
    physical_memory_offset: VirtualAddress,
    address: VirtualAddress,
) -> Option<PhysicalAddress> {
    let entry = unsafe { level1_entry_mut(registers, physical_memory_offset, address) }.ok()?;
    let frame = entry.frame().ok()?;

    Some(frame + address.page_offset())
}

/// Points the 4KiB page containing `page` at `frame` and evicts the stale translation.
///
/// Returns the frame that was mapped before.
///
/// # Safety
/// Same contract as [`active_level4_page_table`]. In addition nothing may rely on the old
/// contents of `page` afterwards. Other cores keep their stale translation.
pub unsafe fn remap_page(
    registers: &impl HardwareRegisters,
    physical_memory_offset: VirtualAddress,
    page: VirtualAddress,
    frame: PhysicalAddress,
) -> Result<PhysicalAddress, FrameError> {
    let page = page.align_down(PAGE_SIZE);
    let entry = level1_entry_mut(registers, physical_memory_offset, page)?;
    let previous = entry.frame()?;

    entry.set_address(frame);
    registers.invalidate_page(page);

    Ok(previous)
}

/// Activates the level 4 table at `level4_table` and returns the CR3 value it replaced, so the
/// caller can switch back later.
///
/// # Safety
/// See [`crate::x86_64::control::load_page_directory`].
pub unsafe fn switch_address_space(
    registers: &impl HardwareRegisters,
    level4_table: PhysicalAddress,
) -> PhysicalAddress {
    let previous = PhysicalAddress::new_truncate(registers.page_directory());
    registers.load_page_directory(level4_table);
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86_64::{
        hardware::recording::{Call, RecordingRegisters},
        paging::PageTableEntryFlags,
    };

    /// A four level hierarchy living in kernel statics. With a zero offset, the "physical"
    /// addresses stored in the entries are the virtual addresses of the tables themselves.
    struct FakeHierarchy {
        level4: PageTable,
        level3: PageTable,
        level2: PageTable,
        level1: PageTable,
    }

    static mut HIERARCHY: FakeHierarchy = FakeHierarchy {
        level4: PageTable::new(),
        level3: PageTable::new(),
        level2: PageTable::new(),
        level1: PageTable::new(),
    };

    const PAGE: u64 = 0x0000_1234_5678_9000;
    const OLD_FRAME: u64 = 0x0000_0000_0042_0000;
    const NEW_FRAME: u64 = 0x0000_0000_0077_7000;

    fn physical<T>(table: &T) -> PhysicalAddress {
        PhysicalAddress::new(table as *const T as u64)
    }

    fn build_hierarchy() -> RecordingRegisters {
        let flags = PageTableEntryFlags::PRESENT | PageTableEntryFlags::WRITABLE;
        let page = VirtualAddress::new(PAGE);
        let hierarchy = unsafe { &mut *core::ptr::addr_of_mut!(HIERARCHY) };

        let level3 = physical(&hierarchy.level3);
        let level2 = physical(&hierarchy.level2);
        let level1 = physical(&hierarchy.level1);
        hierarchy.level4[page.p4_index()].set(level3, flags);
        hierarchy.level3[page.p3_index()].set(level2, flags);
        hierarchy.level2[page.p2_index()].set(level1, flags);
        hierarchy.level1[page.p1_index()].set(PhysicalAddress::new(OLD_FRAME), flags);

        RecordingRegisters::new(physical(&hierarchy.level4).as_u64())
    }

    #[test_case]
    fn test_translate_address_walks_all_four_levels() {
        let registers = build_hierarchy();
        let address = VirtualAddress::new(PAGE + 0x123);

        assert_eq!(
            translate_address(&registers, VirtualAddress::zero(), address),
            Some(PhysicalAddress::new(OLD_FRAME + 0x123))
        );
        assert_eq!(
            translate_address(&registers, VirtualAddress::zero(), VirtualAddress::new(PAGE + 0x1000)),
            None
        );
    }

    #[test_case]
    fn test_remap_page_writes_entry_then_invalidates() {
        let registers = build_hierarchy();
        let page = VirtualAddress::new(PAGE);

        let previous = unsafe {
            remap_page(
                &registers,
                VirtualAddress::zero(),
                page + 0x10,
                PhysicalAddress::new(NEW_FRAME),
            )
        };

        assert_eq!(previous, Ok(PhysicalAddress::new(OLD_FRAME)));
        assert_eq!(
            translate_address(&registers, VirtualAddress::zero(), page),
            Some(PhysicalAddress::new(NEW_FRAME))
        );
        assert_eq!(registers.count(), 1);
        assert_eq!(registers.calls()[0], Some(Call::InvalidatePage(page)));
    }

    #[test_case]
    fn test_switch_address_space_returns_previous_directory() {
        let registers = RecordingRegisters::new(0x5000);
        let previous = unsafe { switch_address_space(&registers, PhysicalAddress::new(0x9000)) };

        assert_eq!(previous, PhysicalAddress::new(0x5000));
        assert_eq!(registers.page_directory(), 0x9000);
        assert_eq!(
            registers.calls()[0],
            Some(Call::LoadPageDirectory(PhysicalAddress::new(0x9000)))
        );
    }
}
