#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

use core::panic::PanicInfo;
use hwport::{
    exit_qemu, serial_print, serial_println, serial_success,
    utils::halt_loop,
    x86_64::{
        hardware::Cpu,
        idt::{ExceptionStackFrame, InterruptDescriptorTable},
    },
    QemuExitCode,
};
use lazy_static::lazy_static;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!();
    serial_print!("stack_overflow::stack_overflow...\t");

    hwport::gdt::init(&Cpu);
    init_test_idt();

    // trigger a stack overflow
    stack_overflow();

    panic!("Execution continued after stack overflow");
}

#[allow(unconditional_recursion)]
fn stack_overflow() {
    stack_overflow(); // for each recursion, the return address is pushed
    volatile::Volatile::new(0).read(); // prevent tail recursion optimizations
}

lazy_static! {
    static ref TEST_IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        unsafe {
            idt.set_double_fault_handler(test_double_fault_handler)
                .set_stack_index(hwport::gdt::INTERRUPT_STACK_TABLE_INDEX_DOUBLE_FAULT);
        }

        idt
    };
}

pub fn init_test_idt() {
    TEST_IDT.load(&Cpu);
}

/// Only reachable if `ltr` in `gdt::init` installed the TSS, since the handler runs on an IST
/// stack.
extern "x86-interrupt" fn test_double_fault_handler(
    _stack_frame: ExceptionStackFrame,
    _error_code: u64,
) -> ! {
    serial_success!("[ok]\n");
    serial_println!();
    exit_qemu(QemuExitCode::Success);
    halt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info)
}
