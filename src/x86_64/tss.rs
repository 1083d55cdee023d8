use core::arch::asm;

use super::{address::VirtualAddress, segmentation::SegmentSelector};

const NUMBER_OF_PRIVILEGE_LEVELS: usize = 3;
const NUMBER_OF_INTERRUPT_STACKS: usize = 7;

/// In 64-bit mode the TSS holds information that is not directly related to the task-switch
/// mechanism, but is used for finding kernel level stack if interrupts arrive while in kernel
/// mode.
///
/// The TSS is not loaded directly. It gets a system segment descriptor in the GDT and the
/// selector of that descriptor is handed to [`load_task_register`].
#[derive(Debug, Clone, Copy)]
#[repr(C, packed(4))]
pub struct TaskStateSegment {
    reserved_1: u32,
    /// Stacks the CPU switches to when the privilege level changes, indexed by the target ring.
    pub privilege_stack_table: [VirtualAddress; NUMBER_OF_PRIVILEGE_LEVELS],
    reserved_2: u64,
    /// Known-good stacks that IDT entries can request through their IST index. The switch happens
    /// in hardware before the exception stack frame is pushed.
    pub interrupt_stack_table: [VirtualAddress; NUMBER_OF_INTERRUPT_STACKS],
    reserved_3: u64,
    reserved_4: u16,
    /// Offset of the I/O permission bitmap. Pointing past the segment limit means no bitmap.
    iomap_base_address: u16,
}

impl TaskStateSegment {
    pub const fn new() -> TaskStateSegment {
        TaskStateSegment {
            privilege_stack_table: [VirtualAddress::zero(); NUMBER_OF_PRIVILEGE_LEVELS],
            interrupt_stack_table: [VirtualAddress::zero(); NUMBER_OF_INTERRUPT_STACKS],
            iomap_base_address: core::mem::size_of::<TaskStateSegment>() as u16,
            reserved_1: 0,
            reserved_2: 0,
            reserved_3: 0,
            reserved_4: 0,
        }
    }
}

impl Default for TaskStateSegment {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the task register using the `ltr` instruction.
///
/// The processor marks the referenced TSS descriptor busy in the GDT. A selector that does not
/// name an available TSS descriptor raises a general protection fault.
///
/// ## Safety
///
/// The caller must ensure that `selector` names a valid TSS entry in the current GDT and that the
/// TSS stays alive while it is loaded.
#[inline(always)]
pub unsafe fn load_task_register(selector: SegmentSelector) {
    // no `nomem`: the busy bit of the descriptor gets written
    asm!("ltr {0:x}", in(reg) selector.0, options(nostack, preserves_flags));
}

/// Read the task register using the `str` instruction.
pub fn store_task_register() -> SegmentSelector {
    let selector: u16;
    unsafe {
        asm!("str {0:x}", out(reg) selector, options(nomem, nostack, preserves_flags));
    }
    SegmentSelector(selector)
}

#[test_case]
fn test_task_state_segment_has_hardware_size() {
    assert_eq!(core::mem::size_of::<TaskStateSegment>(), 104);
}
