use core::arch::asm;

use super::rflags::RFlags;

/// Enable interrupts.
///
/// This is a wrapper around the `sti` instruction.
pub fn enable() {
    unsafe {
        asm!("sti", options(nostack));
    }
}

/// Disable interrupts.
///
/// This is a wrapper around the `cli` instruction.
pub fn disable() {
    unsafe {
        asm!("cli", options(nostack));
    }
}

pub fn are_enabled() -> bool {
    RFlags::read().contains(RFlags::INTERRUPT_FLAG)
}

/// Runs `f` with interrupts disabled and restores the previous state afterwards.
///
/// This is how callers keep a sequence of register writes (e.g. save CR3, load CR3) from being
/// interleaved with an interrupt handler on the same core.
pub fn execute_without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let old_interrupt_state = are_enabled();

    if old_interrupt_state {
        disable();
    }

    let ret = f();

    if old_interrupt_state {
        enable();
    }

    ret
}

/// Cause a breakpoint exception by invoking the `int3` instruction.
pub fn invoke_breakpoint_exception() {
    unsafe {
        asm!("int3", options(nomem, nostack));
    }
}

#[test_case]
fn test_interrupts_are_off_inside_and_restored_after() {
    let before = are_enabled();
    execute_without_interrupts(|| assert!(!are_enabled()));
    assert_eq!(are_enabled(), before);
}

#[test_case]
fn test_section_sees_writes_made_before_it_and_publishes_its_own() {
    static mut COUNTER: u64 = 0;

    unsafe { COUNTER = 1 };
    let inside = execute_without_interrupts(|| unsafe {
        let seen = COUNTER;
        COUNTER = seen + 1;
        seen
    });

    assert_eq!(inside, 1);
    assert_eq!(unsafe { COUNTER }, 2);
}
