//! SPI flash command definitions

pub mod opcodes;

/// Sector size used by every erase operation
pub const SECTOR_SIZE: u32 = 4096;

/// Page size used by every program operation
pub const PAGE_SIZE: u32 = 256;

/// Write-in-progress bit of status register 1
pub const STATUS_WIP: u8 = 0x01;

/// Sector index of `addr`
pub const fn sector_index(addr: u32) -> u32 {
    addr / SECTOR_SIZE
}

/// Round `addr` down to its sector start
pub const fn sector_start(addr: u32) -> u32 {
    addr & !(SECTOR_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_math() {
        assert_eq!(sector_index(0x8000), 8);
        assert_eq!(sector_index(0x8FFF), 8);
        assert_eq!(sector_start(0x8FFF), 0x8000);
    }
}
