#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(hwport::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;
use hwport::{
    serial_error, serial_println,
    utils::halt_loop,
    x86_64::{
        control::read_control_register_3,
        msr::Msr,
        rflags::RFlags,
        tss::store_task_register,
    },
};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Hello World!");

    hwport::init();

    let (level_4_table, cr3_flags) = read_control_register_3();
    serial_println!("Level 4 page table: {:?} {:?}", level_4_table, cr3_flags);
    serial_println!("RFLAGS: {:?}", RFlags::read());
    serial_println!("EFER: {:#x}", unsafe { Msr::EFER.read() });
    serial_println!("Task register: {:?}", store_task_register());

    #[cfg(test)]
    test_main();

    serial_println!("It did not crash!");
    halt_loop();
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_error!("{}\n", info);

    halt_loop();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info);
}
