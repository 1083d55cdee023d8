//! Snapshots of general purpose registers.
//!
//! A read returns whatever the register holds at that instant. The values are only meaningful at
//! the very start of an entry path (trap or `syscall` gate), before any compiled code reuses the
//! registers. Callers must read them there and nowhere else.
//!
//! Every reader names its register as the output operand of an empty `asm!` block, so the
//! compiler cannot hand that register to anything else before the read.

use core::arch::asm;

macro_rules! register_reader {
    ($(#[$doc:meta])* $name:ident, $register:tt) => {
        $(#[$doc])*
        #[inline(always)]
        pub fn $name() -> u64 {
            let value: u64;
            unsafe {
                asm!("", out($register) value, options(nomem, nostack, preserves_flags));
            }
            value
        }
    };
}

register_reader!(
    /// System call number on `syscall` entry; return value on exit.
    read_rax,
    "rax"
);
register_reader!(
    /// First system call argument.
    read_rdi,
    "rdi"
);
register_reader!(
    /// Second system call argument.
    read_rsi,
    "rsi"
);
register_reader!(
    /// Third system call argument.
    read_rdx,
    "rdx"
);
register_reader!(
    /// Fourth system call argument. Takes the place of RCX, which `syscall` overwrites.
    read_r10,
    "r10"
);
register_reader!(
    /// Fifth system call argument.
    read_r8,
    "r8"
);
register_reader!(
    /// Sixth system call argument.
    read_r9,
    "r9"
);
register_reader!(
    /// User RIP saved by `syscall`.
    read_rcx,
    "rcx"
);

/// RSP cannot be an `asm!` operand, so it is copied out.
#[inline(always)]
pub fn read_rsp() -> u64 {
    let value: u64;
    unsafe {
        asm!("mov {}, rsp", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// The registers a system call passes in, in the order of the calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArguments {
    pub number: u64,
    pub arguments: [u64; 6],
}

impl SyscallArguments {
    /// Snapshots RAX, RDI, RSI, RDX, R10, R8 and R9 at the same instant.
    ///
    /// Separate reads would let the output of one land in a register that is still to be read.
    #[inline(always)]
    pub fn capture() -> SyscallArguments {
        let (number, rdi, rsi, rdx, r10, r8, r9): (u64, u64, u64, u64, u64, u64, u64);
        unsafe {
            asm!(
                "",
                out("rax") number,
                out("rdi") rdi,
                out("rsi") rsi,
                out("rdx") rdx,
                out("r10") r10,
                out("r8") r8,
                out("r9") r9,
                options(nomem, nostack, preserves_flags),
            );
        }
        SyscallArguments {
            number,
            arguments: [rdi, rsi, rdx, r10, r8, r9],
        }
    }
}

#[test_case]
fn test_stack_pointer_snapshot_is_inside_current_frame() {
    let local = 0u64;
    let local_address = &local as *const u64 as u64;
    let rsp = read_rsp();

    assert!(rsp <= local_address);
    assert!(local_address - rsp < 4096);
}

#[test_case]
fn test_stack_pointer_is_word_aligned() {
    assert_eq!(read_rsp() % 8, 0);
}

/// The tests below enter a function through `call` from an `asm!` block that fixes the
/// registers, the same way a trap gate hands control to its handler. The handler reads first
/// thing and parks the result in a static.
#[cfg(test)]
mod entry {
    use core::{
        arch::asm,
        sync::atomic::{AtomicU64, Ordering},
    };

    use spin::Mutex;

    use super::*;

    static SNAPSHOT: AtomicU64 = AtomicU64::new(0);
    static CAPTURED: Mutex<Option<SyscallArguments>> = Mutex::new(None);

    const MARKER: u64 = 0x5a5a_0000_1234_abcd;

    macro_rules! reader_enters_with {
        ($test:ident, $handler:ident, $reader:ident, $register:tt) => {
            extern "sysv64" fn $handler() {
                let value = $reader();
                SNAPSHOT.store(value, Ordering::SeqCst);
            }

            #[test_case]
            fn $test() {
                SNAPSHOT.store(0, Ordering::SeqCst);
                unsafe {
                    asm!(
                        "call {handler}",
                        handler = sym $handler,
                        in($register) MARKER,
                        clobber_abi("sysv64"),
                    );
                }
                assert_eq!(SNAPSHOT.load(Ordering::SeqCst), MARKER);
            }
        };
    }

    reader_enters_with!(test_read_rax_sees_entry_value, rax_handler, read_rax, "rax");
    reader_enters_with!(test_read_rdi_sees_entry_value, rdi_handler, read_rdi, "rdi");
    reader_enters_with!(test_read_rsi_sees_entry_value, rsi_handler, read_rsi, "rsi");
    reader_enters_with!(test_read_rdx_sees_entry_value, rdx_handler, read_rdx, "rdx");
    reader_enters_with!(test_read_r10_sees_entry_value, r10_handler, read_r10, "r10");
    reader_enters_with!(test_read_r8_sees_entry_value, r8_handler, read_r8, "r8");
    reader_enters_with!(test_read_r9_sees_entry_value, r9_handler, read_r9, "r9");
    reader_enters_with!(test_read_rcx_sees_entry_value, rcx_handler, read_rcx, "rcx");

    extern "sysv64" fn capture_handler() {
        let captured = SyscallArguments::capture();
        *CAPTURED.lock() = Some(captured);
    }

    #[test_case]
    fn test_capture_keeps_number_and_argument_order() {
        *CAPTURED.lock() = None;
        unsafe {
            asm!(
                "call {handler}",
                handler = sym capture_handler,
                in("rax") 60u64,
                in("rdi") 1u64,
                in("rsi") 2u64,
                in("rdx") 3u64,
                in("r10") 4u64,
                in("r8") 5u64,
                in("r9") 6u64,
                clobber_abi("sysv64"),
            );
        }

        assert_eq!(
            *CAPTURED.lock(),
            Some(SyscallArguments {
                number: 60,
                arguments: [1, 2, 3, 4, 5, 6],
            })
        );
    }
}
