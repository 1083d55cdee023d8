#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![feature(abi_x86_interrupt)]

pub mod gdt;
pub mod interrupt;
pub mod memory;
pub mod serial;
pub mod utils;
pub mod x86_64;

use core::ops::Fn;
use core::panic::PanicInfo;

use x86_64::{hardware::Cpu, port::Port};

const QEMU_EXIT_PORT: u16 = 0xf4;

/// Installs the kernel GDT (with TSS and null LDT) and IDT on the current core.
///
/// Interrupts stay disabled: no interrupt controller is programmed, so IRQs would arrive on
/// exception vectors.
pub fn init() {
    crate::gdt::init(&Cpu);
    crate::interrupt::init(&Cpu);
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_error!("[Failed]\n");
    serial_println!("Error: {}", info);
    exit_qemu(QemuExitCode::Failed);

    utils::halt_loop();
}

#[cfg(test)]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    init();
    test_main();

    utils::halt_loop();
}

pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_success!("[ok]\n");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!();
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    serial_println!();
    exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Exits QEMU through the `isa-debug-exit` device configured in `Cargo.toml`.
pub fn exit_qemu(exit_code: QemuExitCode) {
    let port: Port<u32> = Port::new(QEMU_EXIT_PORT);
    unsafe {
        port.write(exit_code as u32);
    }
}
