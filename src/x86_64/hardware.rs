//! The processor's core-global registers as an explicit interface.
//!
//! CR3, GDTR, IDTR, LDTR, TR and the MSRs belong to the executing core and nothing stops any
//! code from changing them. Code that composes them (loading tables, switching address spaces,
//! patching page tables) takes a [`HardwareRegisters`] instead of calling the instructions
//! directly, so every call site names the state it touches.
//!
//! Nothing here locks. Callers that can race on the same core (e.g. an interrupt handler and a
//! thread switching CR3) must disable interrupts around the sequence.

use super::{
    address::{PhysicalAddress, VirtualAddress},
    control,
    descriptor::{self, DescriptorTablePointer},
    msr::{self, Msr},
    rflags,
    segmentation::SegmentSelector,
    tlb, tss,
};

pub trait HardwareRegisters {
    /// ## Safety
    ///
    /// See [`control::load_page_directory`].
    unsafe fn load_page_directory(&self, page_directory: PhysicalAddress);

    fn page_directory(&self) -> u64;

    fn fault_address(&self) -> u64;

    /// ## Safety
    ///
    /// See [`descriptor::load_global_descriptor_table`].
    unsafe fn load_global_descriptor_table(&self, gdt: &DescriptorTablePointer);

    /// ## Safety
    ///
    /// See [`descriptor::load_interrupt_descriptor_table`].
    unsafe fn load_interrupt_descriptor_table(&self, idt: &DescriptorTablePointer);

    /// ## Safety
    ///
    /// See [`descriptor::load_local_descriptor_table`].
    unsafe fn load_local_descriptor_table(&self, selector: SegmentSelector);

    /// ## Safety
    ///
    /// See [`tss::load_task_register`].
    unsafe fn load_task_register(&self, selector: SegmentSelector);

    fn invalidate_page(&self, address: VirtualAddress);

    fn flags(&self) -> u64;

    /// ## Safety
    ///
    /// See [`msr::write_model_specific_register`].
    unsafe fn write_model_specific_register(&self, msr: Msr, value: u64);
}

/// The registers of the core this code runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu;

impl HardwareRegisters for Cpu {
    #[inline(always)]
    unsafe fn load_page_directory(&self, page_directory: PhysicalAddress) {
        control::load_page_directory(page_directory);
    }

    #[inline(always)]
    fn page_directory(&self) -> u64 {
        control::read_page_directory_register()
    }

    #[inline(always)]
    fn fault_address(&self) -> u64 {
        control::read_fault_address_register()
    }

    #[inline(always)]
    unsafe fn load_global_descriptor_table(&self, gdt: &DescriptorTablePointer) {
        descriptor::load_global_descriptor_table(gdt);
    }

    #[inline(always)]
    unsafe fn load_interrupt_descriptor_table(&self, idt: &DescriptorTablePointer) {
        descriptor::load_interrupt_descriptor_table(idt);
    }

    #[inline(always)]
    unsafe fn load_local_descriptor_table(&self, selector: SegmentSelector) {
        descriptor::load_local_descriptor_table(selector);
    }

    #[inline(always)]
    unsafe fn load_task_register(&self, selector: SegmentSelector) {
        tss::load_task_register(selector);
    }

    #[inline(always)]
    fn invalidate_page(&self, address: VirtualAddress) {
        tlb::invalidate_page(address);
    }

    #[inline(always)]
    fn flags(&self) -> u64 {
        rflags::read_flags()
    }

    #[inline(always)]
    unsafe fn write_model_specific_register(&self, msr: Msr, value: u64) {
        msr::write_model_specific_register(msr.0, value);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use core::cell::{Cell, RefCell};

    use super::*;

    const MAX_CALLS: usize = 16;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Call {
        LoadPageDirectory(PhysicalAddress),
        LoadGlobalDescriptorTable(DescriptorTablePointer),
        LoadInterruptDescriptorTable(DescriptorTablePointer),
        LoadLocalDescriptorTable(SegmentSelector),
        LoadTaskRegister(SegmentSelector),
        InvalidatePage(VirtualAddress),
        WriteModelSpecificRegister(Msr, u64),
    }

    /// Remembers every write instead of touching the processor. Reads return what was set.
    pub(crate) struct RecordingRegisters {
        page_directory: Cell<u64>,
        calls: RefCell<[Option<Call>; MAX_CALLS]>,
        count: Cell<usize>,
    }

    impl RecordingRegisters {
        pub(crate) fn new(page_directory: u64) -> Self {
            RecordingRegisters {
                page_directory: Cell::new(page_directory),
                calls: RefCell::new([None; MAX_CALLS]),
                count: Cell::new(0),
            }
        }

        pub(crate) fn calls(&self) -> [Option<Call>; MAX_CALLS] {
            *self.calls.borrow()
        }

        pub(crate) fn count(&self) -> usize {
            self.count.get()
        }

        fn record(&self, call: Call) {
            let index = self.count.get();
            assert!(index < MAX_CALLS, "too many recorded register writes");
            self.calls.borrow_mut()[index] = Some(call);
            self.count.set(index + 1);
        }
    }

    impl HardwareRegisters for RecordingRegisters {
        unsafe fn load_page_directory(&self, page_directory: PhysicalAddress) {
            self.page_directory.set(page_directory.as_u64());
            self.record(Call::LoadPageDirectory(page_directory));
        }

        fn page_directory(&self) -> u64 {
            self.page_directory.get()
        }

        fn fault_address(&self) -> u64 {
            0
        }

        unsafe fn load_global_descriptor_table(&self, gdt: &DescriptorTablePointer) {
            self.record(Call::LoadGlobalDescriptorTable(*gdt));
        }

        unsafe fn load_interrupt_descriptor_table(&self, idt: &DescriptorTablePointer) {
            self.record(Call::LoadInterruptDescriptorTable(*idt));
        }

        unsafe fn load_local_descriptor_table(&self, selector: SegmentSelector) {
            self.record(Call::LoadLocalDescriptorTable(selector));
        }

        unsafe fn load_task_register(&self, selector: SegmentSelector) {
            self.record(Call::LoadTaskRegister(selector));
        }

        fn invalidate_page(&self, address: VirtualAddress) {
            self.record(Call::InvalidatePage(address));
        }

        fn flags(&self) -> u64 {
            0b10
        }

        unsafe fn write_model_specific_register(&self, msr: Msr, value: u64) {
            self.record(Call::WriteModelSpecificRegister(msr, value));
        }
    }
}

#[test_case]
fn test_cpu_reads_match_direct_instructions() {
    assert_eq!(Cpu.page_directory(), control::read_page_directory_register());
    assert_eq!(Cpu.flags(), rflags::read_flags());
    assert_eq!(Cpu.fault_address(), control::read_fault_address_register());
}

#[test_case]
fn test_recording_registers_replays_page_directory() {
    use recording::{Call, RecordingRegisters};

    let registers = RecordingRegisters::new(0x1000);
    unsafe {
        registers.load_page_directory(PhysicalAddress::new(0x8000));
        registers.write_model_specific_register(Msr::FS_BASE, 7);
    }

    assert_eq!(registers.page_directory(), 0x8000);
    assert_eq!(registers.count(), 2);
    assert_eq!(
        registers.calls()[..2],
        [
            Some(Call::LoadPageDirectory(PhysicalAddress::new(0x8000))),
            Some(Call::WriteModelSpecificRegister(Msr::FS_BASE, 7)),
        ]
    );
}
