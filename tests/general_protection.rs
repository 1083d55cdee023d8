#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

use core::panic::PanicInfo;
use hwport::{
    exit_qemu, serial_print, serial_println, serial_success,
    utils::halt_loop,
    x86_64::{
        hardware::{Cpu, HardwareRegisters},
        idt::{ExceptionStackFrame, InterruptDescriptorTable},
        privilege_level::PrivilegeLevel,
        segmentation::SegmentSelector,
    },
    QemuExitCode,
};
use lazy_static::lazy_static;

/// Past the end of the kernel GDT, which holds five slots.
const OUT_OF_RANGE_GDT_INDEX: u16 = 9;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!();
    serial_print!("general_protection::ltr_with_invalid_selector...\t");

    hwport::gdt::init(&Cpu);
    TEST_IDT.load(&Cpu);

    unsafe {
        Cpu.load_task_register(SegmentSelector::new(
            OUT_OF_RANGE_GDT_INDEX,
            PrivilegeLevel::Ring0,
        ));
    }

    panic!("Execution continued after loading an invalid task register selector");
}

lazy_static! {
    static ref TEST_IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.set_general_protection_fault_handler(test_general_protection_fault_handler);
        idt
    };
}

extern "x86-interrupt" fn test_general_protection_fault_handler(
    _stack_frame: ExceptionStackFrame,
    error_code: u64,
) {
    // the error code is the rejected selector
    if error_code == u64::from(OUT_OF_RANGE_GDT_INDEX << 3) {
        serial_success!("[ok]\n");
        exit_qemu(QemuExitCode::Success);
    } else {
        serial_println!("[unexpected error code {:#x}]", error_code);
        exit_qemu(QemuExitCode::Failed);
    }
    halt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info)
}
