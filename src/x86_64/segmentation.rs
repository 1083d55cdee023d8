use bit_field::BitField;
use core::arch::asm;

use super::privilege_level::PrivilegeLevel;

/// Specifies which element to load into a segment from descriptor tables (i.e., is a index to LDT
/// or GDT table with some additional flags).
///
/// See Intel 3a, Section 3.4.2 "Segment Selectors"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SegmentSelector(pub u16);

const TABLE_INDICATOR_BIT: usize = 2;

impl SegmentSelector {
    /// The null selector. Valid for `lldt` (disables the LDT), never for `ltr`.
    pub const NULL: SegmentSelector = SegmentSelector(0);

    pub fn new(index: u16, requested_privilege_level: PrivilegeLevel) -> Self {
        SegmentSelector((index << 3) | (requested_privilege_level as u16))
    }

    pub fn index(self) -> u16 {
        self.0 >> 3
    }

    /// Whether the selector points into the LDT instead of the GDT.
    pub fn is_local(self) -> bool {
        self.0.get_bit(TABLE_INDICATOR_BIT)
    }

    pub fn requested_privilege_level(self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(self.0)
    }
}

/// Reload the code segment register with a far return.
///
/// ## Safety
///
/// `selector` must name a valid 64-bit code segment in the currently loaded GDT.
pub unsafe fn set_code_segment_selector(selector: SegmentSelector) {
    asm!(
        "push {selector}",
        "lea {tmp}, [2f + rip]",
        "push {tmp}",
        "retfq",
        "2:",
        selector = in(reg) u64::from(selector.0),
        tmp = lateout(reg) _,
        options(preserves_flags),
    );
}

/// Load `selector` into DS, ES and SS.
///
/// ## Safety
///
/// `selector` must name a valid writable data segment in the currently loaded GDT.
pub unsafe fn load_data_segments(selector: SegmentSelector) {
    asm!(
        "mov ds, {0:x}",
        "mov es, {0:x}",
        "mov ss, {0:x}",
        in(reg) selector.0,
        options(nostack, preserves_flags),
    );
}

pub fn read_code_segment_selector() -> SegmentSelector {
    let segment: u16;
    unsafe {
        asm!("mov {0:x}, cs", out(reg) segment, options(nomem, nostack, preserves_flags));
    }
    SegmentSelector(segment)
}

#[test_case]
fn test_segment_selector_encodes_index_and_privilege_level() {
    let selector = SegmentSelector::new(5, PrivilegeLevel::Ring3);
    assert_eq!(selector.0, 0b101_0_11);
    assert_eq!(selector.index(), 5);
    assert!(!selector.is_local());
    assert_eq!(selector.requested_privilege_level(), PrivilegeLevel::Ring3);
}

#[test_case]
fn test_kernel_runs_at_ring_zero() {
    assert_eq!(
        read_code_segment_selector().requested_privilege_level(),
        PrivilegeLevel::Ring0
    );
}
