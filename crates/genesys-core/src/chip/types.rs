//! Flash chip type definitions

use core::fmt;

use super::registry::FLASH_CHIPS;

/// Minimum page-program delay applied to every chip, in milliseconds
pub const MIN_WRITE_DELAY_MS: u32 = 500;

/// Multiplier applied to a profile's erase delay base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseDelayUnit {
    /// Base is in units of 100 ms
    Sector,
    /// Base is in units of 1 s
    Chip,
}

impl EraseDelayUnit {
    /// Milliseconds per unit of the erase delay base
    pub const fn multiplier(self) -> u32 {
        match self {
            Self::Sector => 100,
            Self::Chip => 1000,
        }
    }
}

/// Static description of a supported flash part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashChipProfile {
    /// Vendor name
    pub vendor: &'static str,
    /// Part name
    pub name: &'static str,
    /// Identify opcode (0x9F JEDEC, 0x90 REMS, 0xAB RES)
    pub id_opcode: u8,
    /// Whether the identify command needs three dummy address bytes
    pub dummy_address: bool,
    /// Expected identify response, first `id_len` bytes significant
    pub id: [u8; 3],
    /// Number of identify response bytes
    pub id_len: u8,
    /// Write transfer length in table encoding
    ///
    /// Values up to 0x80 are byte counts. Larger values encode
    /// `(value - 0x80) * 128` bytes for USB 3 capable hosts.
    pub write_length: u8,
    /// Erase delay base
    pub erase_delay: u16,
    /// Unit of the erase delay base
    pub erase_unit: EraseDelayUnit,
    /// Page program delay in milliseconds
    pub write_delay_ms: u16,
    /// Part only supports auto-address-increment programming
    pub aai: bool,
    /// Capacity in bytes
    pub total_size: u32,
}

impl FlashChipProfile {
    /// Significant identify bytes
    pub fn expected_id(&self) -> &[u8] {
        &self.id[..usize::from(self.id_len).min(self.id.len())]
    }

    /// Byte-exact comparison against an identify response
    pub fn matches(&self, response: &[u8]) -> bool {
        response == self.expected_id()
    }
}

impl fmt::Display for FlashChipProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.vendor, self.name)
    }
}

/// Parameters derived from the identified chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashParams {
    index: usize,
    /// Total erase delay in milliseconds
    pub erase_delay_ms: u32,
    /// Page program delay in milliseconds, never below [`MIN_WRITE_DELAY_MS`]
    pub write_delay_ms: u32,
}

impl FlashParams {
    /// Derive parameters for the registry entry at `index`
    pub fn from_index(index: usize) -> Option<Self> {
        let profile = FLASH_CHIPS.get(index)?;
        Some(Self {
            index,
            erase_delay_ms: u32::from(profile.erase_delay) * profile.erase_unit.multiplier(),
            write_delay_ms: u32::from(profile.write_delay_ms).max(MIN_WRITE_DELAY_MS),
        })
    }

    /// Index into [`FLASH_CHIPS`]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Registry entry these parameters were derived from
    pub fn profile(&self) -> &'static FlashChipProfile {
        // index is private and only ever produced by from_index
        &FLASH_CHIPS[self.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::find_by_name;

    #[test]
    fn test_params_delays() {
        let (index, chip) = find_by_name("W25X20").unwrap();
        let params = FlashParams::from_index(index).unwrap();
        assert_eq!(
            params.erase_delay_ms,
            u32::from(chip.erase_delay) * chip.erase_unit.multiplier()
        );
        assert!(params.write_delay_ms >= MIN_WRITE_DELAY_MS);
        assert_eq!(params.profile().name, "W25X20");
        assert_eq!(params.index(), index);
    }

    #[test]
    fn test_chip_unit_multiplier() {
        assert_eq!(EraseDelayUnit::Sector.multiplier(), 100);
        assert_eq!(EraseDelayUnit::Chip.multiplier(), 1000);
    }

    #[test]
    fn test_out_of_range_index() {
        assert!(FlashParams::from_index(FLASH_CHIPS.len()).is_none());
    }

    #[test]
    fn test_matches_is_exact() {
        let (_, chip) = find_by_name("MX25L4006E").unwrap();
        assert!(chip.matches(&[0xC2, 0x20, 0x13]));
        assert!(!chip.matches(&[0xC2, 0x20]));
        assert!(!chip.matches(&[0xC2, 0x20, 0x14]));
    }
}
