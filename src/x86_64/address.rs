//! Physical and virtual address types handed to the register interface.

use core::{
    fmt,
    ops::{Add, Range},
};

use bit_field::BitField;

use super::paging::PageTableIndex;

/// A canonical 64-bit virtual memory address.
///
/// On `x86_64`, only the 48 lower bits of a virtual address can be used. The top 16 bits need
/// to be copies of bit 47, i.e. the most significant bit. Addresses that fulfil this criterium
/// are called “canonical”. This type guarantees that it always represents a canonical address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtualAddress(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvalidVirtualAddress(pub u64);

const VIRTUAL_ADDRESS_SIGN_EXTENSION_RANGE: Range<usize> = 47..64;
const PHYSICAL_ADDRESS_NO_DATA_RANGE: Range<usize> = 52..64;

const OFFSET_BITS: usize = 12;
const PAGE_TABLE_INDEX_BITS: usize = 9;

impl VirtualAddress {
    /// Creates a new canonical virtual address.
    ///
    /// ## Panics
    ///
    /// This function panics if the bits in the range 48 to 64 contain data (i.e. are not null
    /// and no sign extension).
    pub fn new(addr: u64) -> Self {
        Self::try_new(addr).expect(
            "address passed to VirtualAddress::new must not contain any data in bits 48 to 64",
        )
    }

    /// Tries to create a new canonical virtual address.
    ///
    /// Succeeds if bits 48 to 64 are either a correct sign extension (i.e. copies of bit 47) or
    /// all null. In the latter case bit 47 is sign extended.
    pub fn try_new(addr: u64) -> Result<Self, InvalidVirtualAddress> {
        match addr.get_bits(VIRTUAL_ADDRESS_SIGN_EXTENSION_RANGE) {
            0 | 0x1ffff => Ok(Self(addr)),
            1 => Ok(Self::new_truncate(addr)),
            _ => Err(InvalidVirtualAddress(addr)),
        }
    }

    /// Creates a new canonical virtual address, throwing out bits 48..64.
    pub const fn new_truncate(addr: u64) -> Self {
        // By doing the right shift as a signed operation (on a i64), it will
        // sign extend the value, repeating the leftmost bit.
        Self(((addr << 16) as i64 >> 16) as u64)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as u64)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    #[cfg(target_pointer_width = "64")]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn align_down(&self, alignment: u64) -> Self {
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        Self::new_truncate(self.0 & !(alignment - 1))
    }

    /// Offset of this address inside its 4KiB page.
    pub fn page_offset(self) -> u64 {
        self.0.get_bits(0..OFFSET_BITS)
    }

    pub fn p1_index(self) -> PageTableIndex {
        PageTableIndex::new_truncate((self.0 >> OFFSET_BITS) as u16)
    }

    pub fn p2_index(self) -> PageTableIndex {
        PageTableIndex::new_truncate((self.0 >> (OFFSET_BITS + PAGE_TABLE_INDEX_BITS)) as u16)
    }

    pub fn p3_index(self) -> PageTableIndex {
        PageTableIndex::new_truncate(
            (self.0 >> (OFFSET_BITS + 2 * PAGE_TABLE_INDEX_BITS)) as u16,
        )
    }

    pub fn p4_index(self) -> PageTableIndex {
        PageTableIndex::new_truncate(
            (self.0 >> (OFFSET_BITS + 3 * PAGE_TABLE_INDEX_BITS)) as u16,
        )
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        VirtualAddress::new(self.0 + rhs)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("VirtualAddress")
            .field(&format_args!("{:#x?}", self.0))
            .finish()
    }
}

/// A 64-bit physical memory address.
///
/// Bits 52 to 64 are always null. Nothing else is checked: whether the address names a valid
/// page directory or frame is up to whoever hands it to the processor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysicalAddress(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvalidPhysicalAddress(pub u64);

impl PhysicalAddress {
    pub fn new(addr: u64) -> Self {
        Self::try_new(addr).expect("Physical address must not contain any data in bits 52 to 64")
    }

    pub fn try_new(addr: u64) -> Result<Self, InvalidPhysicalAddress> {
        match addr.get_bits(PHYSICAL_ADDRESS_NO_DATA_RANGE) {
            0 => Ok(PhysicalAddress(addr)),
            _ => Err(InvalidPhysicalAddress(addr)),
        }
    }

    /// Drops bits 52..64.
    pub const fn new_truncate(addr: u64) -> Self {
        PhysicalAddress(addr & 0x000f_ffff_ffff_ffff)
    }

    pub fn align_down(&self, alignment: u64) -> Self {
        if !alignment.is_power_of_two() {
            panic!("alignment must be a power of two");
        }
        PhysicalAddress(self.0 & !(alignment - 1))
    }

    pub fn is_aligned(&self, alignment: u64) -> bool {
        self.align_down(alignment) == *self
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        PhysicalAddress::new(self.0 + rhs)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PhysicalAddress")
            .field(&format_args!("{:#x?}", self.0))
            .finish()
    }
}

#[test_case]
fn test_cant_create_virtual_address_with_arbitry_bits_in_address_extension_range() {
    let invalid_virtual_address: u64 = 1 << 49;
    assert_eq!(
        VirtualAddress::try_new(invalid_virtual_address),
        Err(InvalidVirtualAddress(invalid_virtual_address))
    );
}

#[test_case]
fn test_perfoms_address_extension_when_address_is_not_canonical() {
    let address: u64 = 1 << 47;
    assert_eq!(
        VirtualAddress::try_new(address).map(|address| address.as_u64()),
        Ok(0xffff_8000_0000_0000)
    );
}

#[test_case]
fn test_new_truncate_does_proper_sign_extension() {
    assert_eq!(VirtualAddress::new_truncate(0xff00_0000_0000_00ff).as_u64(), 0xff);
    assert_eq!(
        VirtualAddress::new_truncate(0x00f0_8000_0000_0000).as_u64(),
        0xffff_8000_0000_0000
    );
}

#[test_case]
fn test_page_table_index_extraction_works() {
    let address = VirtualAddress::new(0o001_000_777_177_2716);
    assert_eq!(address.p1_index(), PageTableIndex::new_truncate(0o177));
    assert_eq!(address.p2_index(), PageTableIndex::new_truncate(0o777));
    assert_eq!(address.p3_index(), PageTableIndex::new_truncate(0o0));
    assert_eq!(address.p4_index(), PageTableIndex::new_truncate(0o1));
    assert_eq!(address.page_offset(), 0o2716);
}

#[test_case]
fn test_physical_address_creation_fails_when_there_are_bits_in_no_data_range() {
    let invalid_address: u64 = 0x00f0_0000_0000_0001;
    assert_eq!(
        PhysicalAddress::try_new(invalid_address),
        Err(InvalidPhysicalAddress(invalid_address))
    );
    assert_eq!(PhysicalAddress::new_truncate(invalid_address).as_u64(), 1);
}

#[test_case]
fn test_physical_address_align_down_gets_a_number_to_nearest_multiple_of_alignment_factor() {
    let address = PhysicalAddress::new(255);
    assert_eq!(address.align_down(4).as_u64(), 252);
    assert_eq!(address.align_down(64).as_u64(), 192);
    assert_eq!(address.align_down(256).as_u64(), 0);
    assert!(!address.is_aligned(4096));
    assert!(PhysicalAddress::new(0x2000).is_aligned(4096));
}
