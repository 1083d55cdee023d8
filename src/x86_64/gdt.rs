use super::{
    descriptor::{Descriptor, DescriptorFlags, DescriptorTablePointer},
    hardware::HardwareRegisters,
    privilege_level::PrivilegeLevel,
    segmentation::SegmentSelector,
};

const GDT_ENTRY_COUNT: usize = 8;

/// The Global Descriptor Table is a construct used by the x86 processor to configure segmented
/// virtual memory.
///
/// In 64-bit mode it is still needed for two things:
/// 1. The TSS descriptor, which `ltr` loads by selector.
/// 2. Switching between kernel space and user space.
///
/// Entry 0 is the mandatory null descriptor.
#[derive(Debug, Clone)]
pub struct GlobalDescriptorTable {
    table: [u64; GDT_ENTRY_COUNT],
    next_free: usize,
}

impl GlobalDescriptorTable {
    pub const fn new() -> GlobalDescriptorTable {
        GlobalDescriptorTable {
            table: [0; GDT_ENTRY_COUNT],
            next_free: 1,
        }
    }

    /// The pointer `lgdt` needs for the entries added so far.
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer::for_table(self.table.as_ptr(), self.next_free)
    }

    /// Loads this table into GDTR.
    ///
    /// Segment registers keep their cached descriptors until they are reloaded.
    pub fn load(&'static self, registers: &impl HardwareRegisters) {
        unsafe { registers.load_global_descriptor_table(&self.pointer()) };
    }

    pub fn add_entry(&mut self, entry: Descriptor) -> SegmentSelector {
        let index = match entry {
            Descriptor::UserSegment(value) => {
                if self.next_free > self.table.len().saturating_sub(1) {
                    panic!("GDT full");
                }
                self.push(value)
            }
            Descriptor::SystemSegment(low, high) => {
                if self.next_free > self.table.len().saturating_sub(2) {
                    panic!("GDT full");
                }
                let index_low = self.push(low);
                self.push(high);
                index_low
            }
        };
        let privilege_level = match entry {
            Descriptor::UserSegment(value)
                if DescriptorFlags::from_bits_truncate(value)
                    .contains(DescriptorFlags::DPL_RING_3) =>
            {
                PrivilegeLevel::Ring3
            }
            _ => PrivilegeLevel::Ring0,
        };

        SegmentSelector::new(index as u16, privilege_level)
    }

    fn push(&mut self, value: u64) -> usize {
        let index = self.next_free;
        self.table[index] = value;
        self.next_free += 1;
        index
    }
}

impl Default for GlobalDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[test_case]
fn test_add_entry_hands_out_consecutive_selectors() {
    let mut gdt = GlobalDescriptorTable::new();
    let code = gdt.add_entry(Descriptor::kernel_code_segment());
    let data = gdt.add_entry(Descriptor::kernel_data_segment());
    let system = gdt.add_entry(Descriptor::SystemSegment(1, 2));
    let after_system = gdt.add_entry(Descriptor::kernel_data_segment());

    assert_eq!(code, SegmentSelector(0x08));
    assert_eq!(data, SegmentSelector(0x10));
    assert_eq!(system, SegmentSelector(0x18));
    assert_eq!(after_system, SegmentSelector(0x28));
    assert_eq!(gdt.pointer().limit(), 6 * 8 - 1);
}

#[test_case]
fn test_load_hands_table_pointer_to_registers() {
    use super::hardware::recording::{Call, RecordingRegisters};

    static EMPTY: GlobalDescriptorTable = GlobalDescriptorTable::new();
    let registers = RecordingRegisters::new(0);
    EMPTY.load(&registers);

    assert_eq!(
        registers.calls()[0],
        Some(Call::LoadGlobalDescriptorTable(EMPTY.pointer()))
    );
    assert_eq!(EMPTY.pointer().limit(), 7);
}
