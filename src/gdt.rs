//! The kernel's Global Descriptor Table and Task State Segment.
//!
//! In 64-bit mode the GDT is still needed for
//! * kernel/user mode switching
//! * Task State Segment loading

use lazy_static::lazy_static;

use crate::x86_64::{
    address::VirtualAddress,
    descriptor::Descriptor,
    gdt::GlobalDescriptorTable,
    hardware::HardwareRegisters,
    segmentation::{load_data_segments, set_code_segment_selector, SegmentSelector},
    tss::TaskStateSegment,
};

/// Index of a well known stack that we ought to switch to before we go about handling a Double
/// Fault.
pub const INTERRUPT_STACK_TABLE_INDEX_DOUBLE_FAULT: u16 = 0;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 5;

lazy_static! {
    static ref TASK_STATE_SEGMENT: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[INTERRUPT_STACK_TABLE_INDEX_DOUBLE_FAULT as usize] = {
            // No frame allocator here, so the stack is a static array.
            static mut STACK: [u8; DOUBLE_FAULT_STACK_SIZE] = [0; DOUBLE_FAULT_STACK_SIZE];

            let stack_start = VirtualAddress::from_ptr(unsafe { core::ptr::addr_of!(STACK) });
            stack_start + DOUBLE_FAULT_STACK_SIZE as u64
        };
        tss
    };
}

/// Selectors of the descriptors in [`static@GLOBAL_DESCRIPTOR_TABLE`].
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub task_state: SegmentSelector,
}

lazy_static! {
    pub static ref GLOBAL_DESCRIPTOR_TABLE: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code = gdt.add_entry(Descriptor::kernel_code_segment());
        let kernel_data = gdt.add_entry(Descriptor::kernel_data_segment());
        let task_state = gdt.add_entry(Descriptor::tss_segment(&TASK_STATE_SEGMENT));

        (gdt, Selectors { kernel_code, kernel_data, task_state })
    };
}

/// Initialize the Global Descriptor Table.
///
/// This function performs the following steps:
/// * Load GDTR with the address of the GDT.
/// * Reload CS, DS, ES and SS so they stop referring to the bootloader's GDT.
/// * Load the null LDT.
/// * Load the task register with the TSS.
pub fn init(registers: &impl HardwareRegisters) {
    let (gdt, selectors) = &*GLOBAL_DESCRIPTOR_TABLE;
    gdt.load(registers);
    unsafe {
        set_code_segment_selector(selectors.kernel_code);
        load_data_segments(selectors.kernel_data);
        registers.load_local_descriptor_table(SegmentSelector::NULL);
        registers.load_task_register(selectors.task_state);
    }
}
