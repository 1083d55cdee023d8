use core::ops::Range;

use bit_field::BitField;
use bitflags::bitflags;

use super::{
    address::VirtualAddress,
    descriptor::DescriptorTablePointer,
    hardware::HardwareRegisters,
    segmentation::{read_code_segment_selector, SegmentSelector},
};

const DEFAULT_RESERVED: u32 = 0;
const IDT_SIZE: usize = 64;

const IDT_INDEX_BREAKPOINT_EXCEPTION: u8 = 3;
const IDT_INDEX_DOUBLE_FAULT_EXCEPTION: u8 = 8;
const IDT_INDEX_GENERAL_PROTECTION_FAULT: u8 = 13;
const IDT_INDEX_PAGE_FAULT_EXCEPTION: u8 = 14;

const ENTRY_OPTIONS_IST_INDEX_BITS: Range<usize> = 0..3;

/// The hardware consults the Interrupt Descriptor Table (IDT) to dispatch all the interrupts
/// that can occur. The hardware uses this table directly so we need to follow a predefined
/// format.
///
/// We create an IDT with 64 entries. Ideally it has 256 entries. When an entry is missing the
/// CPU simply generates a double fault.
#[repr(C, align(16))]
pub struct InterruptDescriptorTable([Entry; IDT_SIZE]);

/// Each entry in the Interrupt Descriptor Table (IDT) has the following structure.
///
/// | Type	| Name	                   | Description                                              |
/// | u16	| Function Pointer [0:15]  | The lower bits of the pointer to the handler function.   |
/// | u16	| GDT selector	           | Selector of a code segment in the GDT.                   |
/// | u16	| Options	(see below)    |                                                          |
/// | u16	| Function Pointer [16:31] | The middle bits of the pointer to the handler function.  |
/// | u32	| Function Pointer [32:63] | The remaining bits of the pointer to the handler function|
/// | u32	| Reserved                 |                                                          |
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct Entry {
    pointer_low: u16,
    gdt_selector: u16,
    options: EntryOptions,
    pointer_middle: u16,
    pointer_high: u32,
    reserved: u32,
}

bitflags! {
    #[repr(transparent)]
    pub struct EntryOptions: u16 {
        // | 0-2   | Interrupt Stack Table Index | 0: Don’t switch stacks,                        |
        // |       |                             | 1-7: Switch to the n-th stack in the Interrupt |
        // |       |                             | Stack Table when this handler is called.       |
        // 3 - 7 are Reserved
        // When this bit is 0, interrupts are disabled when this handler is called.
        const INTERRUPTS_ENABLED = 1 << 8;
        // These bits must be set to one
        const BIT_9              = 1 << 9;
        const BIT_10             = 1 << 10;
        const BIT_11             = 1 << 11;
        const MUST_BE_ONE        = Self::BIT_9.bits | Self::BIT_10.bits | Self::BIT_11.bits;
        // | 13‑14 | Descriptor Privilege Level (DPL) | The minimal privilege level required |
        // |       |                                  | for calling this handler.            |
        const DPL_LOW            = 1 << 13;
        const DPL_HIGH           = 1 << 14;
        const DPL_MASK           = Self::DPL_LOW.bits | Self::DPL_HIGH.bits;
        // Says that the handler is present.
        const PRESENT            = 1 << 15;
    }
}

impl EntryOptions {
    fn minimal() -> Self {
        EntryOptions::MUST_BE_ONE
    }

    fn present() -> Self {
        Self::minimal() | EntryOptions::PRESENT
    }

    /// Assigns an Interrupt Stack Table (IST) stack to this handler. The CPU will then always
    /// switch to the specified stack before the handler is invoked.
    ///
    /// An IST stack is specified by an IST index between 0 and 6 (inclusive).
    ///
    /// ## Safety
    ///
    /// The caller must ensure that the passed stack index is valid and not used by other
    /// interrupts. Otherwise, memory safety violations are possible.
    pub unsafe fn set_stack_index(&mut self, index: u16) {
        assert!(index < 7, "IST index must be in 0..7");
        // The hardware IST index starts at 1, but our software IST index
        // starts at 0. Therefore we need to add 1 here.
        self.bits.set_bits(ENTRY_OPTIONS_IST_INDEX_BITS, index + 1);
    }
}

impl Entry {
    fn new(gdt_selector: SegmentSelector, pointer_to_handler: u64) -> Self {
        Entry {
            pointer_low: pointer_to_handler as u16,
            pointer_middle: (pointer_to_handler >> 16) as u16,
            pointer_high: (pointer_to_handler >> 32) as u32,
            gdt_selector: gdt_selector.0,
            options: EntryOptions::present(),
            reserved: DEFAULT_RESERVED,
        }
    }

    const fn missing() -> Entry {
        Entry {
            pointer_low: 0,
            pointer_middle: 0,
            pointer_high: 0,
            gdt_selector: 0,
            options: EntryOptions::MUST_BE_ONE,
            reserved: DEFAULT_RESERVED,
        }
    }

    fn handler_address(&self) -> u64 {
        u64::from(self.pointer_low)
            | (u64::from(self.pointer_middle) << 16)
            | (u64::from(self.pointer_high) << 32)
    }
}

impl InterruptDescriptorTable {
    pub fn new() -> Self {
        InterruptDescriptorTable([Entry::missing(); IDT_SIZE])
    }

    fn set_handler(&mut self, index: u8, pointer_to_handler: u64) -> &mut EntryOptions {
        let entry = &mut self.0[index as usize];
        *entry = Entry::new(read_code_segment_selector(), pointer_to_handler);
        &mut entry.options
    }

    /// A breakpoint (`#BP`) exception occurs when an `INT3` instruction is executed.
    ///
    /// The saved instruction pointer points to the byte after the `INT3` instruction.
    pub fn set_breakpoint_handler(&mut self, handler_func: HandlerFunc) {
        self.set_handler(IDT_INDEX_BREAKPOINT_EXCEPTION, handler_func as u64);
    }

    /// A double fault (`#DF`) occurs when a second exception occurs while the CPU tries to
    /// deliver a prior one, e.g. a page fault or general protection fault without a handler.
    ///
    /// If a third interrupting event occurs while transferring control to the `#DF` handler, the
    /// processor shuts down.
    pub fn set_double_fault_handler(
        &mut self,
        handler_func: DoubleFaultHandlerFunc,
    ) -> &mut EntryOptions {
        self.set_handler(IDT_INDEX_DOUBLE_FAULT_EXCEPTION, handler_func as u64)
    }

    /// A general protection fault (`#GP`) is how the processor rejects, among others, a
    /// malformed selector in `lldt`/`ltr` or a `wrmsr` to an unknown index. The error code is
    /// the offending selector, or zero.
    pub fn set_general_protection_fault_handler(&mut self, handler_func: ErrorCodeHandlerFunc) {
        self.set_handler(IDT_INDEX_GENERAL_PROTECTION_FAULT, handler_func as u64);
    }

    /// A page fault (`#PF`) occurs on an access through a missing or forbidding translation. CR2
    /// holds the faulting linear address.
    pub fn set_page_fault_handler(&mut self, handler_func: PageFaultHandlerFunc) {
        self.set_handler(IDT_INDEX_PAGE_FAULT_EXCEPTION, handler_func as u64);
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer::for_table(self.0.as_ptr(), IDT_SIZE)
    }

    /// Loads this table into IDTR.
    pub fn load(&'static self, registers: &impl HardwareRegisters) {
        unsafe { registers.load_interrupt_descriptor_table(&self.pointer()) };
    }
}

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents the interrupt stack frame pushed by the CPU on an interrupt or exception entry.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExceptionStackFrame {
    /// This value points to the instruction that should be executed when the interrupt
    /// handler returns. For faults it points to the faulting instruction.
    pub instruction_pointer: VirtualAddress,
    /// The code segment selector, padded with zeros.
    pub code_segment: u64,
    /// The value of the `rflags` register at the time of the interrupt.
    pub cpu_flags: u64,
    /// The stack pointer at the time of the interrupt.
    pub stack_pointer: VirtualAddress,
    /// The stack segment descriptor at the time of the interrupt
    pub stack_segment: u64,
}

/// Why use x86-interrupt calling convention?
/// - aware that the arguments lie on the stack
/// - uses iretq instruction to return instead of normal ret
/// - handles error codes if proper types are supplied. Error codes can change stack alignment,
/// this calling convention takes care of all that complexity for us
pub type HandlerFunc = extern "x86-interrupt" fn(ExceptionStackFrame);

pub type ErrorCodeHandlerFunc = extern "x86-interrupt" fn(ExceptionStackFrame, u64);

pub type DoubleFaultHandlerFunc = extern "x86-interrupt" fn(ExceptionStackFrame, u64) -> !;

pub type PageFaultHandlerFunc = extern "x86-interrupt" fn(ExceptionStackFrame, PageFaultErrorCode);

bitflags! {
    #[repr(transparent)]
    pub struct PageFaultErrorCode: u64 {
        // Set: page-protection violation. Unset: non-present page.
        const PROTECTION_VIOLATION     = 1 << 0;
        // Set: write access. Unset: read access.
        const CAUSED_BY_WRITE          = 1 << 1;
        // Set: fault happened while CPL = 3.
        const CAUSED_BY_USER           = 1 << 2;
        // One or more page directory entries contain reserved bits which are set to 1.
        const MALFORMED_TABLE          = 1 << 3;
        // Caused by an instruction fetch. Only with NX enabled.
        const INSTRUCTION_FETCH        = 1 << 4;
        const PROTECTION_KEY_VIOLATION = 1 << 5;
        const CAUSED_BY_SHADOW_STACK   = 1 << 6;
    }
}

#[cfg(test)]
extern "x86-interrupt" fn test_handler(_stack_frame: ExceptionStackFrame) {}

#[test_case]
fn test_entry_is_sixteen_bytes() {
    assert_eq!(core::mem::size_of::<Entry>(), 16);
    assert_eq!(InterruptDescriptorTable::new().pointer().limit(), 64 * 16 - 1);
}

#[test_case]
fn test_set_handler_splits_address_and_uses_current_code_segment() {
    let mut idt = InterruptDescriptorTable::new();
    idt.set_breakpoint_handler(test_handler);

    let entry = idt.0[IDT_INDEX_BREAKPOINT_EXCEPTION as usize];
    assert_eq!(entry.handler_address(), test_handler as u64);
    assert_eq!(entry.gdt_selector, read_code_segment_selector().0);
    assert!(entry.options.contains(EntryOptions::PRESENT));
    assert!(!idt.0[0].options.contains(EntryOptions::PRESENT));
}

#[test_case]
fn test_stack_index_is_stored_off_by_one() {
    let mut options = EntryOptions::present();
    unsafe { options.set_stack_index(0) };
    assert_eq!(options.bits() & 0b111, 1);
}
