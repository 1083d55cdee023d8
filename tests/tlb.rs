#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(hwport::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::{entry_point, BootInfo};
use core::{panic::PanicInfo, ptr};
use hwport::{
    memory::{remap_page, translate_address},
    utils::halt_loop,
    x86_64::{
        address::{PhysicalAddress, VirtualAddress},
        hardware::Cpu,
        tlb::flush_all,
    },
};
use lazy_static::lazy_static;

const FIRST_MARKER: u64 = 0x1111_1111_1111_1111;
const SECOND_MARKER: u64 = 0x2222_2222_2222_2222;

#[repr(C, align(4096))]
struct Page([u64; 512]);

static mut FIRST: Page = Page([0; 512]);
static mut SECOND: Page = Page([0; 512]);

lazy_static! {
    static ref PHYSICAL_MEMORY_OFFSET: spin::Mutex<VirtualAddress> =
        spin::Mutex::new(VirtualAddress::zero());
}

entry_point!(main);

fn main(boot_info: &'static BootInfo) -> ! {
    hwport::init();
    *PHYSICAL_MEMORY_OFFSET.lock() = VirtualAddress::new(boot_info.physical_memory_offset);

    unsafe {
        ptr::write_volatile(ptr::addr_of_mut!(FIRST.0[0]), FIRST_MARKER);
        ptr::write_volatile(ptr::addr_of_mut!(SECOND.0[0]), SECOND_MARKER);
    }

    test_main();
    halt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    hwport::test_panic_handler(info)
}

fn first_page() -> VirtualAddress {
    VirtualAddress::from_ptr(unsafe { ptr::addr_of!(FIRST) })
}

fn second_page() -> VirtualAddress {
    VirtualAddress::from_ptr(unsafe { ptr::addr_of!(SECOND) })
}

fn read_first() -> u64 {
    unsafe { ptr::read_volatile(ptr::addr_of!(FIRST.0[0])) }
}

fn frame_of(page: VirtualAddress) -> PhysicalAddress {
    let offset = *PHYSICAL_MEMORY_OFFSET.lock();
    translate_address(&Cpu, offset, page).expect("kernel statics are mapped with 4KiB pages")
}

#[test_case]
fn test_translation_keeps_page_offset() {
    let address = first_page() + 0x18;
    assert_eq!(frame_of(address).as_u64() & 0xfff, 0x18);
}

#[test_case]
fn test_remapped_page_is_visible_after_invalidation() {
    let offset = *PHYSICAL_MEMORY_OFFSET.lock();
    let second_frame = frame_of(second_page());

    // warm the TLB entry of the first page
    assert_eq!(read_first(), FIRST_MARKER);

    let first_frame = unsafe { remap_page(&Cpu, offset, first_page(), second_frame) }
        .expect("first page is mapped");
    assert_eq!(read_first(), SECOND_MARKER);
    assert_eq!(frame_of(first_page()), second_frame);

    unsafe { remap_page(&Cpu, offset, first_page(), first_frame) }.expect("first page is mapped");
    assert_eq!(read_first(), FIRST_MARKER);
}

#[test_case]
fn test_flush_all_keeps_current_mappings() {
    flush_all();
    assert_eq!(read_first(), FIRST_MARKER);
}
