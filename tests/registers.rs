#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(hwport::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;
use hwport::{
    gdt::GLOBAL_DESCRIPTOR_TABLE,
    memory::switch_address_space,
    utils::halt_loop,
    x86_64::{
        address::PhysicalAddress,
        control::{load_page_directory, read_page_directory_register},
        descriptor::{load_local_descriptor_table, store_global_descriptor_table},
        hardware::{Cpu, HardwareRegisters},
        msr::{read_model_specific_register, write_model_specific_register, Msr},
        rflags::{read_flags, RFlags},
        segmentation::{load_data_segments, read_code_segment_selector, SegmentSelector},
        tss::store_task_register,
    },
};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    hwport::init();
    test_main();

    halt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info)
}

#[test_case]
fn test_page_directory_register_reads_back_loaded_value() {
    let page_directory = read_page_directory_register();

    unsafe { load_page_directory(PhysicalAddress::new(page_directory)) };

    assert_eq!(read_page_directory_register(), page_directory);
}

#[test_case]
fn test_switch_address_space_round_trips() {
    let current = PhysicalAddress::new(Cpu.page_directory());

    let previous = unsafe { switch_address_space(&Cpu, current) };

    assert_eq!(previous, current);
    assert_eq!(Cpu.page_directory(), current.as_u64());
}

#[test_case]
fn test_gdtr_holds_kernel_gdt() {
    let (gdt, _) = &*GLOBAL_DESCRIPTOR_TABLE;
    assert_eq!(store_global_descriptor_table(), gdt.pointer());
}

#[test_case]
fn test_segments_from_loaded_gdt_can_be_loaded() {
    let (gdt, selectors) = &*GLOBAL_DESCRIPTOR_TABLE;

    gdt.load(&Cpu);
    unsafe {
        load_data_segments(selectors.kernel_data);
        load_local_descriptor_table(SegmentSelector::NULL);
    }

    assert_eq!(read_code_segment_selector(), selectors.kernel_code);
}

#[test_case]
fn test_task_register_holds_kernel_tss() {
    let (_, selectors) = &*GLOBAL_DESCRIPTOR_TABLE;
    assert_eq!(store_task_register(), selectors.task_state);
}

#[test_case]
fn test_model_specific_register_reads_back_written_value() {
    let value = 0x0000_7fff_dead_b000;

    unsafe {
        let previous = read_model_specific_register(Msr::FS_BASE.0);
        write_model_specific_register(Msr::FS_BASE.0, value);
        assert_eq!(read_model_specific_register(Msr::FS_BASE.0), value);

        Cpu.write_model_specific_register(Msr::FS_BASE, previous);
        assert_eq!(Msr::FS_BASE.read(), previous);
    }
}

#[test_case]
fn test_read_flags_is_idempotent() {
    let first = read_flags();
    let second = read_flags();

    assert_eq!(first, second);
}

#[test_case]
fn test_interrupts_stay_disabled_after_init() {
    assert!(!RFlags::from_bits_truncate(Cpu.flags()).contains(RFlags::INTERRUPT_FLAG));
}
