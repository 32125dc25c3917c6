//! MStar scaler protocol constants
//!
//! The scaler sits on an I2C bus behind the hub. The hub forwards two
//! vendor requests (read, write) to it; `value` selects the port: 1 is the
//! serial-debug port used to unlock and configure the chip, 0 is the ISP
//! port that wraps SPI flash commands.

#![allow(dead_code)]

use std::time::Duration;

/// Scaler information request (level, version, public key)
pub const SCALER_INFO: u8 = 0xA4;
pub const INFO_LEVEL: u16 = 0x0004;
pub const INFO_VERSION: u16 = 0x0005;
pub const INFO_PUBLIC_KEY: u16 = 0x0006;

/// Bytes per public key transfer
pub const PUBLIC_KEY_CHUNK: usize = 0x20;
/// Version block length
pub const VERSION_LEN: usize = 0x10;
/// Settle time after every info request
pub const INFO_SETTLE: Duration = Duration::from_millis(100);

// Vendor requests
pub const MSTAR_READ: u8 = 0x7A;
pub const MSTAR_WRITE: u8 = 0x7B;
pub const MSTAR_DATA_OUT: u8 = 0x7C;
pub const MSTAR_DATA_IN: u8 = 0x7F;

// `value` of the scaler requests
pub const PORT_ISP: u16 = 0x0000;
pub const PORT_DEBUG: u16 = 0x0001;

// Serial debug
pub const SERIAL_DEBUG_ENTER: &[u8] = b"SERDB";
pub const SERIAL_DEBUG_EXIT: &[u8] = &[0x45];
pub const SINGLE_STEP_ENTER: [&[u8]; 2] = [&[0x10, 0xC0, 0xC1, 0x53], &[0x10, 0x1F, 0xC1, 0x53]];
pub const SINGLE_STEP_EXIT: &[u8] = &[0x10, 0xC0, 0xC1, 0xFF];
pub const DEBUG_MODE_ENTER: &[u8] = &[0x10, 0x00, 0x00, 0x00];

// I2C bus, each byte sent on its own
pub const I2C_CHANNEL_0: &[u8] = &[0x80, 0x82, 0x84, 0x51, 0x7F, 0x37, 0x61];
pub const I2C_CHANNEL_4: &[u8] = &[0x80, 0x82, 0x85, 0x53, 0x7F];
pub const I2C_BUS_CONTROL: &[u8] = &[0x35, 0x71];

// Register access on the debug port
pub const REG_WRITE: u8 = 0x10;
/// Secondary (R2) CPU control register
pub const R2_CONTROL_REG: [u8; 4] = [0x00, 0x10, 0x0F, 0xD7];
pub const R2_PAUSE: u8 = 0x80;
pub const R2_PAUSE_SETTLE: Duration = Duration::from_millis(200);

// ISP port
pub const ISP_ENTER: &[u8] = b"MSTAR";
pub const ISP_EXIT: &[u8] = &[0x24];
pub const SERIAL_SETTLE: Duration = Duration::from_millis(1);

// Flash command framing on the ISP port
pub const CMD_DATA_WRITE: u8 = 0x10;
pub const CMD_DATA_READ: u8 = 0x11;
pub const CMD_DATA_END: u8 = 0x12;

/// Status bits that must be clear before the next flash command
pub const STATUS_BUSY_MASK: u8 = 0x81;

/// Largest flash read per command
pub const TRANSFER_SIZE: usize = 0x100;

/// Vendor request codes for the scaler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalerVendorCommands {
    /// IN request
    pub read: u8,
    /// OUT request
    pub write: u8,
}

impl ScalerVendorCommands {
    /// Requests of hubs with basic scaler support
    pub const DEFAULT: Self = Self {
        read: MSTAR_READ,
        write: MSTAR_WRITE,
    };

    /// Data in/out requests, hub scaler support level 2 and up
    pub const DATA_IN_OUT: Self = Self {
        read: MSTAR_DATA_IN,
        write: MSTAR_DATA_OUT,
    };

    /// Choose from the hub's MStar scaler support level
    pub fn for_support_level(level: u8) -> Self {
        if level >= 2 {
            Self::DATA_IN_OUT
        } else {
            Self::DEFAULT
        }
    }
}

/// GPIO pin that holds the flash write-protect line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteProtectGpio {
    /// Output level register
    pub out_reg: u16,
    /// Output enable register (bit clear drives the pin)
    pub en_reg: u16,
    /// Pin bit in both registers
    pub mask: u8,
    /// Level that releases write protection
    pub release_high: bool,
}

/// Scaler chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerModel {
    /// MStar TSUM G
    TsumG,
    /// MStar MST9U, with a secondary R2 CPU
    Mst9u,
}

impl ScalerModel {
    /// Parse a model name as used in options
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "tsumg" => Some(Self::TsumG),
            "mst9u" => Some(Self::Mst9u),
            _ => None,
        }
    }

    /// Default write-protect pin
    pub const fn write_protect(self) -> WriteProtectGpio {
        match self {
            Self::TsumG => WriteProtectGpio {
                out_reg: 0x0426,
                en_reg: 0x0428,
                mask: 0x01,
                release_high: true,
            },
            Self::Mst9u => WriteProtectGpio {
                out_reg: 0x0426,
                en_reg: 0x0428,
                mask: 0x01,
                release_high: false,
            },
        }
    }

    /// Whether the secondary CPU must be paused before ISP
    pub const fn has_r2_cpu(self) -> bool {
        matches!(self, Self::Mst9u)
    }
}

impl std::fmt::Display for ScalerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TsumG => write!(f, "TSUM_G"),
            Self::Mst9u => write!(f, "MST9U"),
        }
    }
}

/// How far the ISP entry chain got
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IspStage {
    /// Nothing entered
    Normal,
    /// Serial debug unlocked
    SerialDebug,
    /// CPU halted in single step
    SingleStep,
    /// I2C routed to the flash controller
    I2cChannelSelected,
    /// Debug mode entered
    DebugMode,
    /// Write-protect pin released
    WriteProtectDisabled,
    /// Secondary CPU paused
    PowerPaused,
    /// ISP port unlocked
    EnteredIsp,
}

/// Frame a flash command for the ISP port
pub fn data_write(opcode: u8, addr: Option<u32>, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5 + payload.len());
    frame.push(CMD_DATA_WRITE);
    frame.push(opcode);
    if let Some(addr) = addr {
        frame.extend_from_slice(&addr.to_be_bytes()[1..]);
    }
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_command_choice() {
        assert_eq!(ScalerVendorCommands::for_support_level(1), ScalerVendorCommands::DEFAULT);
        assert_eq!(
            ScalerVendorCommands::for_support_level(2),
            ScalerVendorCommands::DATA_IN_OUT
        );
        assert_eq!(ScalerVendorCommands::DATA_IN_OUT.read, 0x7F);
    }

    #[test]
    fn test_stage_order() {
        assert!(IspStage::Normal < IspStage::SerialDebug);
        assert!(IspStage::SingleStep < IspStage::DebugMode);
        assert!(IspStage::PowerPaused < IspStage::EnteredIsp);
    }

    #[test]
    fn test_model_names() {
        assert_eq!(ScalerModel::from_name("TSUM_G"), Some(ScalerModel::TsumG));
        assert_eq!(ScalerModel::from_name("mst9u"), Some(ScalerModel::Mst9u));
        assert_eq!(ScalerModel::from_name("tsum_v"), None);
        assert!(ScalerModel::Mst9u.has_r2_cpu());
        assert!(!ScalerModel::TsumG.has_r2_cpu());
    }

    #[test]
    fn test_data_write() {
        assert_eq!(data_write(0x06, None, &[]), vec![0x10, 0x06]);
        assert_eq!(
            data_write(0x02, Some(0x01_2345), &[0xAA]),
            vec![0x10, 0x02, 0x01, 0x23, 0x45, 0xAA]
        );
    }
}
