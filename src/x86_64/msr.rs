//! Model specific registers.
//!
//! `rdmsr`/`wrmsr` take the register index in ECX and move the value through EDX:EAX. An index
//! the processor does not implement, or a value with reserved bits set, raises a general
//! protection fault.

use core::arch::asm;

/// Index of a model specific register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Msr(pub u32);

impl Msr {
    /// Extended feature enable register (SCE, LME, LMA, NXE).
    pub const EFER: Msr = Msr(0xc000_0080);
    /// Segment selectors used by `syscall`/`sysret`.
    pub const STAR: Msr = Msr(0xc000_0081);
    /// 64-bit `syscall` entry point.
    pub const LSTAR: Msr = Msr(0xc000_0082);
    /// RFLAGS bits cleared on `syscall`.
    pub const SFMASK: Msr = Msr(0xc000_0084);
    pub const FS_BASE: Msr = Msr(0xc000_0100);
    pub const GS_BASE: Msr = Msr(0xc000_0101);
    /// Swapped with `GS_BASE` by `swapgs`.
    pub const KERNEL_GS_BASE: Msr = Msr(0xc000_0102);

    /// ## Safety
    ///
    /// See [`write_model_specific_register`].
    pub unsafe fn write(self, value: u64) {
        write_model_specific_register(self.0, value);
    }

    /// ## Safety
    ///
    /// See [`read_model_specific_register`].
    pub unsafe fn read(self) -> u64 {
        read_model_specific_register(self.0)
    }
}

/// Writes `value` to the model specific register `index` with `wrmsr`.
///
/// ## Safety
///
/// The caller must ensure that `index` exists on this processor and that writing `value` to it
/// does not break assumptions of the running kernel (EFER, STAR and friends change how the CPU
/// executes code).
#[inline(always)]
pub unsafe fn write_model_specific_register(index: u32, value: u64) {
    let low = value as u32;
    let high = (value >> 32) as u32;

    asm!(
        "wrmsr",
        in("ecx") index,
        in("eax") low,
        in("edx") high,
        options(nostack, preserves_flags),
    );
}

/// Reads the model specific register `index` with `rdmsr`.
///
/// ## Safety
///
/// The caller must ensure that `index` exists on this processor.
#[inline(always)]
pub unsafe fn read_model_specific_register(index: u32) -> u64 {
    let (high, low): (u32, u32);

    asm!(
        "rdmsr",
        in("ecx") index,
        out("eax") low,
        out("edx") high,
        options(nomem, nostack, preserves_flags),
    );

    ((high as u64) << 32) | (low as u64)
}

#[test_case]
fn test_long_mode_is_active_in_efer() {
    const LONG_MODE_ACTIVE: u64 = 1 << 10;
    let efer = unsafe { Msr::EFER.read() };
    assert_eq!(efer & LONG_MODE_ACTIVE, LONG_MODE_ACTIVE);
}

#[test_case]
fn test_written_value_is_read_back_with_both_halves() {
    let value: u64 = 0x0000_7f12_3456_7000;
    unsafe {
        let previous = Msr::KERNEL_GS_BASE.read();
        Msr::KERNEL_GS_BASE.write(value);
        assert_eq!(Msr::KERNEL_GS_BASE.read(), value);
        Msr::KERNEL_GS_BASE.write(previous);
    }
}
