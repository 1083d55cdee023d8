//! I/O ports. Used for the QEMU exit device.

use core::{arch::asm, marker::PhantomData};

/// On x86, I/O ports operate on
/// - `u8` (via `outb`)
/// - `u16` (via `outw`),
/// - `u32` (via `outl`).
///
/// Only `u32` is written here.
pub trait PortWrite {
    unsafe fn write_to_port(port: u16, value: Self);
}

impl PortWrite for u32 {
    unsafe fn write_to_port(port: u16, value: Self) {
        asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
    }
}

pub struct Port<T> {
    port: u16,
    phantom: PhantomData<T>,
}

impl<T> Port<T> {
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            phantom: PhantomData,
        }
    }
}

impl<T> Port<T>
where
    T: PortWrite,
{
    pub unsafe fn write(&self, value: T) {
        T::write_to_port(self.port, value)
    }
}
