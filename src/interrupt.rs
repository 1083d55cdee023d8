//! Initialize the Interrupt Descriptor Table with the exception handlers of the kernel.
//!
//! Faults raised by the register interface (a bad selector in `ltr`, a `wrmsr` to an unknown
//! index, an access through a missing mapping) all end up here.

use lazy_static::lazy_static;

use crate::{
    gdt::INTERRUPT_STACK_TABLE_INDEX_DOUBLE_FAULT,
    serial_error,
    utils::halt_loop,
    x86_64::{
        address::VirtualAddress,
        hardware::{Cpu, HardwareRegisters},
        idt::{ExceptionStackFrame, InterruptDescriptorTable, PageFaultErrorCode},
    },
};

/// Loads the IDT into the CPU.
pub fn init(registers: &impl HardwareRegisters) {
    INTERRUPT_DESCRIPTOR_TABLE.load(registers);
}

lazy_static! {
    /// The Interrupt Descriptor Table.
    ///
    /// This has the following handlers setup:
    /// * Breakpoint - Just prints the message along with the [`ExceptionStackFrame`]
    /// * Double Fault - Prints and halts. Runs on its own IST stack.
    /// * General Protection Fault - Prints the error code (the offending selector, if any) and
    /// halts.
    /// * Page Fault - Prints the [`PageFaultErrorCode`] and the faulting address from CR2, then
    /// halts.
    pub static ref INTERRUPT_DESCRIPTOR_TABLE: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.set_breakpoint_handler(breakpoint_handler);
        unsafe {
            idt.set_double_fault_handler(double_fault_handler)
                .set_stack_index(INTERRUPT_STACK_TABLE_INDEX_DOUBLE_FAULT);
        }
        idt.set_general_protection_fault_handler(general_protection_fault_handler);
        idt.set_page_fault_handler(page_fault_handler);
        idt
    };
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: ExceptionStackFrame) {
    serial_error!("EXCEPTION: BREAKPOINT\n{:#?}\n", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: ExceptionStackFrame,
    _error_code: u64,
) -> ! {
    serial_error!("EXCEPTION: DOUBLE FAULT\n{:#?}\n", stack_frame);
    halt_loop();
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: ExceptionStackFrame,
    error_code: u64,
) {
    serial_error!("EXCEPTION: GENERAL PROTECTION FAULT\n");
    serial_error!("EXCEPTION: GENERAL PROTECTION FAULT: Error Code: {:#x}\n", error_code);
    serial_error!("EXCEPTION: GENERAL PROTECTION FAULT: Stack Frame\n{:#?}\n", stack_frame);
    halt_loop();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: ExceptionStackFrame,
    error_code: PageFaultErrorCode,
) {
    let responsible_virtual_address = VirtualAddress::new_truncate(Cpu.fault_address());

    serial_error!("EXCEPTION: PAGE FAULT\n");
    serial_error!("EXCEPTION: PAGE FAULT: Error Code: {:?}\n", error_code);
    serial_error!(
        "EXCEPTION: PAGE FAULT: Virtual address responsible {:?}\n",
        responsible_virtual_address
    );
    serial_error!("EXCEPTION: PAGE FAULT: Stack Frame\n{:#?}\n", stack_frame);
    halt_loop();
}

/// Cause a page fault to occur by writing to `address`.
///
/// # Safety
/// `address` must not be mapped.
pub unsafe fn invoke_page_fault_exception(address: u64) {
    (address as *mut u64).write_volatile(42);
}

#[test_case]
fn test_breakpoint_exception() {
    use crate::x86_64::interrupts::invoke_breakpoint_exception;
    // Execution continues => Breakpoint handler is working
    invoke_breakpoint_exception();
}

#[test_case]
fn test_loaded_idt_is_the_kernel_idt() {
    use crate::x86_64::descriptor::store_interrupt_descriptor_table;

    assert_eq!(
        store_interrupt_descriptor_table(),
        INTERRUPT_DESCRIPTOR_TABLE.pointer()
    );
}
