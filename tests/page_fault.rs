#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

use core::panic::PanicInfo;
use hwport::{
    exit_qemu, interrupt::invoke_page_fault_exception, serial_print, serial_println,
    serial_success,
    utils::halt_loop,
    x86_64::{
        control::read_fault_address_register,
        hardware::{Cpu, HardwareRegisters},
        idt::{ExceptionStackFrame, InterruptDescriptorTable, PageFaultErrorCode},
    },
    QemuExitCode,
};
use lazy_static::lazy_static;

const UNMAPPED_ADDRESS: u64 = 0xdead_beaf_008;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!();
    serial_print!("page_fault::fault_address_is_recorded...\t");

    hwport::gdt::init(&Cpu);
    TEST_IDT.load(&Cpu);

    unsafe { invoke_page_fault_exception(UNMAPPED_ADDRESS) };

    panic!("Execution continued after writing to an unmapped address");
}

lazy_static! {
    static ref TEST_IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.set_page_fault_handler(test_page_fault_handler);
        idt
    };
}

extern "x86-interrupt" fn test_page_fault_handler(
    _stack_frame: ExceptionStackFrame,
    error_code: PageFaultErrorCode,
) {
    let fault_address = read_fault_address_register();
    let reported_by_cpu = Cpu.fault_address();

    if fault_address == UNMAPPED_ADDRESS
        && reported_by_cpu == fault_address
        && error_code.contains(PageFaultErrorCode::CAUSED_BY_WRITE)
    {
        serial_success!("[ok]\n");
        exit_qemu(QemuExitCode::Success);
    } else {
        serial_println!(
            "[CR2 = {:#x}, Cpu.fault_address() = {:#x}, error code = {:?}]",
            fault_address,
            reported_by_cpu,
            error_code
        );
        exit_qemu(QemuExitCode::Failed);
    }
    halt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info)
}
