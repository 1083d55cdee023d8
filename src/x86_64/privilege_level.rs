/// Privilege levels of the x86 protection rings.
///
/// See Intel 3a, Section 5.5 "Privilege Levels"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PrivilegeLevel {
    /// Kernel mode.
    Ring0 = 0,
    Ring1 = 1,
    Ring2 = 2,
    /// User mode.
    Ring3 = 3,
}

impl PrivilegeLevel {
    pub fn from_u16(value: u16) -> PrivilegeLevel {
        match value & 0b11 {
            0 => PrivilegeLevel::Ring0,
            1 => PrivilegeLevel::Ring1,
            2 => PrivilegeLevel::Ring2,
            _ => PrivilegeLevel::Ring3,
        }
    }
}
