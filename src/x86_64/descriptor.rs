//! Descriptor table registers (GDTR, IDTR, LDTR) and the segment descriptors that go into the
//! global descriptor table.

use bit_field::BitField;
use bitflags::bitflags;
use core::arch::asm;

use super::{address::VirtualAddress, segmentation::SegmentSelector, tss::TaskStateSegment};

/// The operand of `lgdt`, `lidt`, `sgdt` and `sidt`.
///
/// In memory this is a 16-bit limit immediately followed by the 64-bit linear base address, 10
/// bytes in total. The processor reads exactly this layout.
///
/// See Intel 3a, Section 3.5.1 "Segment Descriptor Tables"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed(2))]
pub struct DescriptorTablePointer {
    /// Size of the DT in bytes, minus one.
    limit: u16,
    /// Pointer to the memory region containing the DT.
    base: VirtualAddress,
}

impl DescriptorTablePointer {
    pub fn new(base: VirtualAddress, limit: u16) -> DescriptorTablePointer {
        DescriptorTablePointer { base, limit }
    }

    /// Pointer describing a table of `entries` items of type `T` starting at `base`.
    ///
    /// Panics if the table is empty or larger than 64KiB.
    pub fn for_table<T>(base: *const T, entries: usize) -> DescriptorTablePointer {
        let size = entries
            .checked_mul(core::mem::size_of::<T>())
            .unwrap_or_else(|| panic!("descriptor table of {} entries overflows", entries));
        let limit = table_limit(size)
            .unwrap_or_else(|| panic!("descriptor table of {} bytes has no 16-bit limit", size));
        DescriptorTablePointer::new(VirtualAddress::from_ptr(base), limit)
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn base(&self) -> VirtualAddress {
        self.base
    }
}

/// The inclusive limit of a table spanning `size` bytes. `None` for an empty table or one that
/// does not fit in 64KiB.
fn table_limit(size: usize) -> Option<u16> {
    size.checked_sub(1).and_then(|limit| u16::try_from(limit).ok())
}

/// Loads GDTR from `gdt` with the `lgdt` instruction.
///
/// The processor keeps only the base and limit. The table itself is not copied.
///
/// ## Safety
///
/// The caller must ensure that `gdt` describes a valid GDT that stays alive and in place for as
/// long as it is loaded, and that the segment registers in use remain valid with it.
#[inline(always)]
pub unsafe fn load_global_descriptor_table(gdt: &DescriptorTablePointer) {
    asm!("lgdt [{}]", in(reg) gdt, options(readonly, nostack, preserves_flags));
}

/// Loads IDTR from `idt` with the `lidt` instruction.
///
/// ## Safety
///
/// The caller must ensure that `idt` describes a valid IDT that stays alive and in place for as
/// long as it is loaded.
#[inline(always)]
pub unsafe fn load_interrupt_descriptor_table(idt: &DescriptorTablePointer) {
    // https://www.felixcloutier.com/x86/lgdt:lidt
    asm!("lidt [{}]", in(reg) idt, options(readonly, nostack, preserves_flags));
}

/// Loads LDTR with the `lldt` instruction.
///
/// A malformed selector raises a general protection fault.
///
/// ## Safety
///
/// The caller must ensure that `selector` is null or names an LDT descriptor in the current GDT.
#[inline(always)]
pub unsafe fn load_local_descriptor_table(selector: SegmentSelector) {
    asm!("lldt {0:x}", in(reg) selector.0, options(readonly, nostack, preserves_flags));
}

/// Reads GDTR with the `sgdt` instruction.
pub fn store_global_descriptor_table() -> DescriptorTablePointer {
    let mut gdt = DescriptorTablePointer::new(VirtualAddress::zero(), 0);
    unsafe {
        asm!("sgdt [{}]", in(reg) &mut gdt, options(nostack, preserves_flags));
    }
    gdt
}

/// Reads IDTR with the `sidt` instruction.
pub fn store_interrupt_descriptor_table() -> DescriptorTablePointer {
    let mut idt = DescriptorTablePointer::new(VirtualAddress::zero(), 0);
    unsafe {
        asm!("sidt [{}]", in(reg) &mut idt, options(nostack, preserves_flags));
    }
    idt
}

/// A 64-bit mode segment descriptor.
///
/// Segmentation is no longer supported in 64-bit mode, so most of the descriptor
/// contents are ignored.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Descriptor for a code or data segment.
    UserSegment(u64),
    /// A system segment descriptor such as a LDT or TSS descriptor. Takes two GDT slots.
    SystemSegment(u64, u64),
}

impl Descriptor {
    /// Creates a segment descriptor for a 64-bit kernel code segment.
    pub fn kernel_code_segment() -> Descriptor {
        Descriptor::UserSegment(DescriptorFlags::KERNEL_CODE64.bits())
    }

    /// Creates a segment descriptor for a kernel data segment, usable for SS.
    pub fn kernel_data_segment() -> Descriptor {
        Descriptor::UserSegment(DescriptorFlags::KERNEL_DATA.bits())
    }

    pub fn tss_segment(tss: &'static TaskStateSegment) -> Descriptor {
        use core::mem::size_of;

        let ptr = tss as *const _ as u64;

        let mut low = DescriptorFlags::PRESENT.bits();
        // base
        low.set_bits(16..40, ptr.get_bits(0..24));
        low.set_bits(56..64, ptr.get_bits(24..32));
        // limit (the `-1` in needed since the bound is inclusive)
        low.set_bits(0..16, (size_of::<TaskStateSegment>() - 1) as u64);
        // type (0b1001 = available 64-bit tss)
        low.set_bits(40..44, 0b1001);

        let mut high = 0;
        high.set_bits(0..32, ptr.get_bits(32..64));

        Descriptor::SystemSegment(low, high)
    }
}

bitflags! {
    pub struct DescriptorFlags: u64 {
        /// Set by the processor if this segment has been accessed. Only cleared by software.
        /// _Setting_ this bit in software prevents GDT writes on first use.
        const ACCESSED     = 1 << 40;
        /// For 32-bit data segments, sets the segment as writable. For 32-bit code segments,
        /// sets the segment as _readable_. In 64-bit mode, ignored for all segments.
        const WRITABLE     = 1 << 41;
        /// This flag must be set for code segments and unset for data segments.
        const EXECUTABLE   = 1 << 43;
        /// This flag must be set for user segments (in contrast to system segments).
        const USER_SEGMENT = 1 << 44;
        /// The DPL for this descriptor is Ring 3. In 64-bit mode, ignored for data segments.
        const DPL_RING_3   = 3 << 45;
        /// Must be set for any segment, causes a segment not present exception if not set.
        const PRESENT      = 1 << 47;
        /// Must be set for 64-bit code segments, unset otherwise.
        const LONG_MODE    = 1 << 53;
        /// Use 32-bit (as opposed to 16-bit) operands. Must be unset for 64-bit code segments.
        const DEFAULT_SIZE = 1 << 54;
        /// Limit field is scaled by 4096 bytes. In 64-bit mode, ignored for all segments.
        const GRANULARITY  = 1 << 55;
        /// Bits `0..=15` of the limit field (ignored in 64-bit mode)
        const LIMIT_0_15   = 0xFFFF;
        /// Bits `16..=19` of the limit field (ignored in 64-bit mode)
        const LIMIT_16_19  = 0xF << 48;
    }
}

impl DescriptorFlags {
    // Flags that we set for all our default segments
    const COMMON: Self = Self::from_bits_truncate(
        Self::USER_SEGMENT.bits()
            | Self::PRESENT.bits()
            | Self::WRITABLE.bits()
            | Self::ACCESSED.bits()
            | Self::LIMIT_0_15.bits()
            | Self::LIMIT_16_19.bits()
            | Self::GRANULARITY.bits(),
    );

    /// A 64-bit kernel code segment
    pub const KERNEL_CODE64: Self = Self::from_bits_truncate(
        Self::COMMON.bits() | Self::EXECUTABLE.bits() | Self::LONG_MODE.bits(),
    );

    /// A kernel data segment
    pub const KERNEL_DATA: Self =
        Self::from_bits_truncate(Self::COMMON.bits() | Self::DEFAULT_SIZE.bits());
}

#[test_case]
fn test_descriptor_table_pointer_matches_hardware_layout() {
    use core::mem::{align_of, size_of};

    assert_eq!(size_of::<DescriptorTablePointer>(), 10);
    assert_eq!(align_of::<DescriptorTablePointer>(), 2);

    let pointer = DescriptorTablePointer::new(VirtualAddress::new(0x1122_3344_5566), 0xabcd);
    let bytes: [u8; 10] = unsafe { core::mem::transmute(pointer) };
    assert_eq!(bytes, [0xcd, 0xab, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00, 0x00]);
}

#[test_case]
fn test_descriptor_table_pointer_limit_is_inclusive() {
    let table = [0u64; 3];
    let pointer = DescriptorTablePointer::for_table(table.as_ptr(), table.len());

    assert_eq!(pointer.limit(), 23);
    assert_eq!(pointer.base(), VirtualAddress::from_ptr(table.as_ptr()));
}

#[test_case]
fn test_table_limit_rejects_empty_and_oversized_tables() {
    assert_eq!(table_limit(0), None);
    assert_eq!(table_limit(1), Some(0));
    assert_eq!(table_limit(0x1_0000), Some(0xffff));
    assert_eq!(table_limit(0x1_0001), None);
}

#[test_case]
fn test_largest_table_gets_full_limit() {
    static TABLE: [u64; 8192] = [0; 8192];
    let pointer = DescriptorTablePointer::for_table(TABLE.as_ptr(), TABLE.len());

    assert_eq!(pointer.limit(), 0xffff);
}

#[test_case]
fn test_kernel_segment_descriptors_match_well_known_encodings() {
    assert_eq!(DescriptorFlags::KERNEL_CODE64.bits(), 0x00af_9b00_0000_ffff);
    assert_eq!(DescriptorFlags::KERNEL_DATA.bits(), 0x00cf_9300_0000_ffff);
}

#[test_case]
fn test_store_global_descriptor_table_is_stable() {
    assert_eq!(store_global_descriptor_table(), store_global_descriptor_table());
}
