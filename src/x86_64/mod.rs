//! x86_64 specific functions and data structures, and access to various system registers.
//!
//! The register interface proper lives in `control` (CR2/CR3), `descriptor` and `tss`
//! (GDTR/IDTR/LDTR/TR), `tlb`, `registers`, `rflags` and `msr`. Each of those wraps exactly one
//! instruction per function. `hardware` bundles them behind a trait for callers.

pub mod address;
pub mod control;
pub mod descriptor;
pub mod gdt;
pub mod hardware;
pub mod idt;
pub mod instructions;
pub mod interrupts;
pub mod msr;
pub mod paging;
pub mod port;
pub mod privilege_level;
pub mod registers;
pub mod rflags;
pub mod segmentation;
pub mod tlb;
pub mod tss;
