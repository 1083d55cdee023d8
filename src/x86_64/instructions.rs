//! Special x86_64 instructions.

use core::arch::asm;

/// Puts the CPU to sleep till it encounters the next interrupt. Calling in a loop can be
/// significantly less resourse intensive than a busy-loop.
pub fn halt_cpu_till_next_interrupt() {
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}
