//! Genesys hub vendor protocol constants and framing
//!
//! Flash access goes through three vendor requests (switch, read, write).
//! The `value` field of a write tells the device what follows: 0x00 in the
//! low byte is page data, 0x02 an opcode with optional payload, 0x03 an
//! opcode with a sector index in `index`.

#![allow(dead_code)]

use genesys_core::image::HubModel;
use genesys_core::spi::sector_index;

// String descriptor indexes of the tool strings
pub const STATIC_TOOL_DESC_IDX_USB3: u8 = 0x84;
pub const DYNAMIC_TOOL_DESC_IDX_USB3: u8 = 0x85;
pub const STATIC_TOOL_DESC_IDX_USB2: u8 = 0x81;
pub const DYNAMIC_TOOL_DESC_IDX_USB2: u8 = 0x82;
pub const FW_INFO_DESC_IDX: u8 = 0x83;
pub const VENDOR_SUPPORT_DESC_IDX: u8 = 0x86;

/// Length requested for every tool-string descriptor
pub const TOOL_DESC_LEN: usize = 64;

// Signature of an image stored on flash
pub const FW_SIG_TEXT: &[u8; 4] = b"XROM";

// Code-sign ISP requests
pub const CS_ISP_SW: u8 = 0xA1;
pub const CS_ISP_READ: u8 = 0xA2;
pub const CS_ISP_WRITE: u8 = 0xA3;

// Legacy ISP requests
pub const ISP_SW: u8 = 0x81;
pub const ISP_READ: u8 = 0x82;
pub const ISP_WRITE: u8 = 0x83;

/// Authentication request
pub const GL_HUB_VERIFY: u8 = 0x71;

// Firmware-info bytes mixed into the authentication challenge
pub const ENCRYPT_REGION_START: u8 = 0x01;
pub const ENCRYPT_REGION_END: u8 = 0x15;

// GL3523 code-sign trailer
pub const GL3523_PUBLIC_KEY_LEN: usize = 0x212;
pub const GL3523_SIG_LEN: usize = 0x100;

/// Upper bound on a single flash transfer
pub const MAX_RW_SIZE: usize = 512;
/// Transfer size cap for hub models on USB 3
pub const HUB_RW_SIZE_CAP: usize = 256;
/// Transfer size on USB 2
pub const USB2_RW_SIZE: usize = 64;

/// `value` switch argument that resets the hub
pub const SWITCH_RESET: u16 = 0x0003;

/// Vendor request codes used for ISP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorCommandSet {
    /// Switch ISP mode / reset
    pub switch: u8,
    /// Read flash / status / ID
    pub read: u8,
    /// Write flash / opcode
    pub write: u8,
}

impl VendorCommandSet {
    /// Requests of hubs without code signing
    pub const LEGACY: Self = Self {
        switch: ISP_SW,
        read: ISP_READ,
        write: ISP_WRITE,
    };

    /// Requests of code-signed hubs
    pub const CS_ISP: Self = Self {
        switch: CS_ISP_SW,
        read: CS_ISP_READ,
        write: CS_ISP_WRITE,
    };

    /// Choose the set from the HP proprietary support level
    pub fn for_hp_proprietary(level: u8) -> Self {
        if level != 0 {
            Self::CS_ISP
        } else {
            Self::LEGACY
        }
    }

    /// Whether this is the code-sign set (the only one that authenticates)
    pub fn is_cs_isp(&self) -> bool {
        *self == Self::CS_ISP
    }
}

/// `value` argument of the switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IspMode {
    /// Back to normal operation
    Exit = 0,
    /// Into ISP mode
    Enter = 1,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    /// Not authenticated, not in ISP
    Normal,
    /// Challenge passed
    Authenticated,
    /// Flash access allowed
    EnteredIsp,
}

/// `(value, index)` addressing a flash byte
pub const fn address_setup(addr: u32) -> (u16, u16) {
    (((addr & 0x0F_0000) >> 4) as u16, (addr & 0xFFFF) as u16)
}

/// `value` for an opcode-only or opcode-plus-payload write, also used for
/// status reads
pub const fn opcode_value(opcode: u8) -> u16 {
    ((opcode as u16) << 8) | 0x02
}

/// `(value, index)` for a sector erase
pub const fn erase_setup(opcode: u8, addr: u32) -> (u16, u16) {
    (((opcode as u16) << 8) | 0x03, sector_index(addr) as u16)
}

/// `value` for an identify command
pub const fn identify_value(opcode: u8, dummy_address: bool) -> u16 {
    ((opcode as u16) << 8) | if dummy_address { 0x01 } else { 0x02 }
}

/// Flash layout of a hub model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLayout {
    /// Start of the two firmware banks
    pub bank_addr: [u32; 2],
    /// Size of one bank's firmware window
    pub fw_window: usize,
    /// Fixed code size, `None` when it must be read from flash
    pub code_size: Option<usize>,
    /// Trailer after the code (public key and signature)
    pub extend_size: usize,
}

impl ModelLayout {
    /// Layout for `model` at IC `revision`
    pub fn for_model(model: HubModel, revision: u8) -> Self {
        match model {
            HubModel::Gl3523 if revision == 50 => Self {
                bank_addr: [0x0000, 0x8000],
                fw_window: 0x8000,
                code_size: None,
                extend_size: GL3523_PUBLIC_KEY_LEN + GL3523_SIG_LEN,
            },
            HubModel::Gl3523 => Self {
                bank_addr: [0x0000, 0x8000],
                fw_window: 0x6000,
                code_size: Some(0x6000),
                extend_size: GL3523_PUBLIC_KEY_LEN + GL3523_SIG_LEN,
            },
            HubModel::Gl3590 => Self {
                bank_addr: [0x0000, 0x10000],
                fw_window: 0x8000,
                code_size: None,
                extend_size: 0,
            },
        }
    }
}

/// Largest flash transfer the hub accepts for the identified chip
///
/// `write_length` uses the registry encoding: values above 0x80 mean
/// `(value - 0x80) * 128` bytes.
pub fn flash_rw_size(
    write_length: u8,
    aai: bool,
    model: HubModel,
    revision: u8,
    is_mask_code: bool,
    usb3: bool,
) -> usize {
    // GL3523-10 mask ROM cannot do AAI bursts
    if aai && model == HubModel::Gl3523 && revision == 10 && is_mask_code {
        return 1;
    }

    let len = usize::from(write_length);
    if len <= 64 {
        return len;
    }
    if !usb3 {
        return USB2_RW_SIZE;
    }
    if len <= 128 {
        return len;
    }
    let mut len = (len - 128) * 128;
    if len > 128 {
        len = HUB_RW_SIZE_CAP;
    }
    len.min(MAX_RW_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_setup() {
        assert_eq!(address_setup(0x0000), (0x0000, 0x0000));
        assert_eq!(address_setup(0x8123), (0x0000, 0x8123));
        assert_eq!(address_setup(0x1_2345), (0x1000, 0x2345));
        assert_eq!(address_setup(0x7_0000), (0x7000, 0x0000));
    }

    #[test]
    fn test_write_framings_are_distinct() {
        // low byte of value: 0x00 data, 0x02 opcode, 0x03 erase
        assert_eq!(address_setup(0x1_0000).0 & 0xFF, 0x00);
        assert_eq!(opcode_value(0x06), 0x0602);
        assert_eq!(erase_setup(0x20, 0x1_2000), (0x2003, 0x12));
    }

    #[test]
    fn test_identify_value() {
        assert_eq!(identify_value(0x9F, false), 0x9F02);
        assert_eq!(identify_value(0x90, true), 0x9001);
    }

    #[test]
    fn test_command_set_choice() {
        assert_eq!(VendorCommandSet::for_hp_proprietary(0), VendorCommandSet::LEGACY);
        assert!(VendorCommandSet::for_hp_proprietary(1).is_cs_isp());
    }

    #[test]
    fn test_rw_size_small_lengths() {
        assert_eq!(flash_rw_size(0x40, false, HubModel::Gl3523, 10, false, false), 64);
        assert_eq!(flash_rw_size(0x20, false, HubModel::Gl3590, 10, false, true), 32);
    }

    #[test]
    fn test_rw_size_usb3_encoded() {
        assert_eq!(flash_rw_size(0x80, false, HubModel::Gl3523, 10, false, true), 128);
        assert_eq!(flash_rw_size(0x82, false, HubModel::Gl3523, 10, false, true), 256);
        assert_eq!(flash_rw_size(0x81, false, HubModel::Gl3590, 10, false, true), 128);
        assert_eq!(flash_rw_size(0xFF, false, HubModel::Gl3590, 10, false, true), 256);
    }

    #[test]
    fn test_rw_size_usb2() {
        assert_eq!(flash_rw_size(0x82, false, HubModel::Gl3523, 10, false, false), 64);
    }

    #[test]
    fn test_rw_size_aai_mask_workaround() {
        assert_eq!(flash_rw_size(0x82, true, HubModel::Gl3523, 10, true, true), 1);
        // only on the mask ROM of revision 10
        assert_eq!(flash_rw_size(0x01, true, HubModel::Gl3523, 10, false, true), 1);
        assert_eq!(flash_rw_size(0x82, true, HubModel::Gl3523, 50, true, true), 256);
    }

    #[test]
    fn test_layouts() {
        let l = ModelLayout::for_model(HubModel::Gl3523, 10);
        assert_eq!(l.code_size, Some(0x6000));
        assert_eq!(l.extend_size, 0x312);
        let l = ModelLayout::for_model(HubModel::Gl3523, 50);
        assert_eq!(l.code_size, None);
        assert_eq!(l.fw_window, 0x8000);
        let l = ModelLayout::for_model(HubModel::Gl3590, 10);
        assert_eq!(l.bank_addr, [0, 0x10000]);
    }
}
