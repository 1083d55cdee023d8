//! The RFLAGS register.

use bitflags::bitflags;
use core::arch::asm;

bitflags! {
    /// The RFLAGS register.
    ///
    /// See Intel 1, Section 3.4.3 "EFLAGS Register"
    pub struct RFlags: u64 {
        /// Processor feature identification flag. Toggling it shows that `cpuid` is supported.
        const ID = 1 << 21;
        /// Virtual interrupt pending.
        const VIRTUAL_INTERRUPT_PENDING = 1 << 20;
        /// Virtual image of the interrupt flag.
        const VIRTUAL_INTERRUPT = 1 << 19;
        /// Enable automatic alignment checking if CR0.AM is set. Only works in user mode.
        const ALIGNMENT_CHECK = 1 << 18;
        /// Enable the virtual-8086 mode.
        const VIRTUAL_8086_MODE = 1 << 17;
        /// Allows to restart an instruction following an instrucion breakpoint.
        const RESUME_FLAG = 1 << 16;
        /// Used by `iret` in hardware task switch mode to determine if current task is nested.
        const NESTED_TASK = 1 << 14;
        /// The high bit of the I/O Privilege Level field.
        const IOPL_HIGH = 1 << 13;
        /// The low bit of the I/O Privilege Level field.
        const IOPL_LOW = 1 << 12;
        /// Set by hardware to indicate that the sign bit of the result of the last signed integer
        /// operation differs from the source operands.
        const OVERFLOW_FLAG = 1 << 11;
        /// Determines the order in which strings are processed.
        const DIRECTION_FLAG = 1 << 10;
        /// Enable interrupts.
        const INTERRUPT_FLAG = 1 << 9;
        /// Enable single-step mode for debugging.
        const TRAP_FLAG = 1 << 8;
        /// Set by hardware if last arithmetic operation resulted in a negative value.
        const SIGN_FLAG = 1 << 7;
        /// Set by hardware if last arithmetic operation resulted in a zero value.
        const ZERO_FLAG = 1 << 6;
        /// Set by hardware if last arithmetic operation generated a carry ouf of bit 3 of the
        /// result.
        const AUXILIARY_CARRY_FLAG = 1 << 4;
        /// Set by hardware if last result has an even number of 1 bits (only for some operations).
        const PARITY_FLAG = 1 << 2;
        /// Always one.
        const RESERVED_ONE = 1 << 1;
        /// Set by hardware if last arithmetic operation generated a carry out of the
        /// most-significant bit of the result.
        const CARRY_FLAG = 1;
    }
}

/// Returns the raw content of RFLAGS with `pushfq; pop`.
#[inline(always)]
pub fn read_flags() -> u64 {
    let rflags: u64;
    unsafe {
        asm!("pushfq", "pop {}", out(reg) rflags, options(nomem, preserves_flags));
    }
    rflags
}

impl RFlags {
    pub fn read() -> RFlags {
        RFlags::from_bits_truncate(read_flags())
    }
}

#[test_case]
fn test_read_flags_twice_gives_same_value() {
    let first = read_flags();
    let second = read_flags();
    assert_eq!(first, second);
}

#[test_case]
fn test_reserved_flag_is_always_set() {
    assert!(RFlags::read().contains(RFlags::RESERVED_ONE));
}
