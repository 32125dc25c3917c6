//! SPI flash opcodes used by the hub and scaler ISP paths

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;
/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Write Status Register 1
pub const WRSR: u8 = 0x01;

/// Read JEDEC ID
pub const RDID: u8 = 0x9F;
/// Read Electronic Manufacturer & Device ID (legacy)
pub const REMS: u8 = 0x90;
/// Read Electronic Signature
pub const RES: u8 = 0xAB;

/// Read Data
pub const READ: u8 = 0x03;
/// Page Program
pub const PP: u8 = 0x02;
/// Sector Erase, 4 KiB
pub const SE_20: u8 = 0x20;
