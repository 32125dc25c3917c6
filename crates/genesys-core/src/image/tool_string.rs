//! Hub tool strings
//!
//! The hub reports its identity through vendor string descriptors (and
//! embeds the static one in its firmware image). Each layout is a fixed
//! byte array read through offset accessors.

use core::fmt;

use super::ascii;
use crate::error::{Error, Result};

/// Tool-string version from which a vendor-support string is available
pub const TOOL_STRING_VERSION_VENDOR_SUPPORT: u8 = 3;

/// Interpret an ASCII digit field (`'0'..='9'`, `'A'..='F'`); other bytes are raw
fn level(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'A'..=b'F' => b - b'A' + 10,
        b'a'..=b'f' => b - b'a' + 10,
        _ => b,
    }
}

/// Copy a tool string into its fixed layout, zero-padding a short tail
///
/// A 64-byte string descriptor carries at most 31 payload bytes, so the
/// 32-byte dynamic layout always arrives one byte short.
fn copy_fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    if bytes.is_empty() {
        return Err(Error::InvalidResponse(format!("{} tool string is empty", what)));
    }
    let mut raw = [0u8; N];
    let n = bytes.len().min(N);
    raw[..n].copy_from_slice(&bytes[..n]);
    Ok(raw)
}

/// Static tool string (31 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StaticToolString {
    raw: [u8; Self::SIZE],
}

impl StaticToolString {
    /// Encoded size
    pub const SIZE: usize = 31;

    /// Decode, zero-padding input shorter than [`Self::SIZE`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            raw: copy_fixed(bytes, "static")?,
        })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.raw
    }

    /// Raw version byte (0xFF means unsupported)
    pub fn version_raw(&self) -> u8 {
        self.raw[0]
    }

    /// Tool-string version, `None` when the hub reports 0xFF
    pub fn version(&self) -> Option<u8> {
        match self.raw[0] {
            0xFF => None,
            b => Some(level(b)),
        }
    }

    /// Mask ROM project code
    pub fn mask_project_code(&self) -> &[u8] {
        &self.raw[1..5]
    }

    /// Mask ROM project hardware revision digit
    pub fn mask_project_hardware(&self) -> u8 {
        self.raw[5]
    }

    /// Mask ROM project firmware
    pub fn mask_project_firmware(&self) -> &[u8] {
        &self.raw[6..8]
    }

    /// Mask ROM IC type, e.g. `352310` for GL3523-10
    pub fn mask_project_ic_type(&self) -> &[u8] {
        &self.raw[8..14]
    }

    /// Running project code
    pub fn running_project_code(&self) -> &[u8] {
        &self.raw[14..18]
    }

    /// Running project hardware revision digit
    pub fn running_project_hardware(&self) -> u8 {
        self.raw[18]
    }

    /// Running project firmware
    pub fn running_project_firmware(&self) -> &[u8] {
        &self.raw[19..21]
    }

    /// Running project IC type
    pub fn running_project_ic_type(&self) -> &[u8] {
        &self.raw[21..27]
    }

    /// Firmware version (`MMmm`)
    pub fn firmware_version(&self) -> &[u8] {
        &self.raw[27..31]
    }

    /// Two-digit IC revision from the mask IC type (`10` in `352310`)
    pub fn ic_revision(&self) -> Option<u8> {
        let ic = self.mask_project_ic_type();
        let (hi, lo) = (ic[4], ic[5]);
        if hi.is_ascii_digit() && lo.is_ascii_digit() {
            Some((hi - b'0') * 10 + (lo - b'0'))
        } else {
            None
        }
    }

    /// Key/value export of every field
    pub fn describe(&self) -> Vec<(String, String)> {
        vec![
            ("tool_string_version".into(), ascii(&self.raw[0..1])),
            ("mask_project_code".into(), ascii(self.mask_project_code())),
            (
                "mask_project_hardware".into(),
                display_hardware(self.mask_project_hardware()),
            ),
            (
                "mask_project_firmware".into(),
                ascii(self.mask_project_firmware()),
            ),
            (
                "mask_project_ic_type".into(),
                display_ic_type(self.mask_project_ic_type()),
            ),
            (
                "running_project_code".into(),
                ascii(self.running_project_code()),
            ),
            (
                "running_project_hardware".into(),
                display_hardware(self.running_project_hardware()),
            ),
            (
                "running_project_firmware".into(),
                ascii(self.running_project_firmware()),
            ),
            (
                "running_project_ic_type".into(),
                display_ic_type(self.running_project_ic_type()),
            ),
            ("firmware_version".into(), ascii(self.firmware_version())),
        ]
    }
}

impl fmt::Debug for StaticToolString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToolString")
            .field("version", &self.version())
            .field("mask_ic_type", &ascii(self.mask_project_ic_type()))
            .field("running_ic_type", &ascii(self.running_project_ic_type()))
            .field("firmware_version", &ascii(self.firmware_version()))
            .finish()
    }
}

/// Hardware digit shifted into a letter, `'1'` becomes `'A'`
pub fn display_hardware(b: u8) -> String {
    char::from(b.wrapping_add(0x10)).to_string()
}

/// IC type rendered as `GLxxxx-xx`
pub fn display_ic_type(ic: &[u8]) -> String {
    let ic = ascii(ic);
    match (ic.get(..4), ic.get(4..6)) {
        (Some(model), Some(rev)) => format!("GL{}-{}", model, rev),
        _ => format!("GL{}", ic),
    }
}

/// Dynamic tool string (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicToolString {
    raw: [u8; Self::SIZE],
}

impl DynamicToolString {
    /// Encoded size
    pub const SIZE: usize = 32;

    /// Decode, zero-padding input shorter than [`Self::SIZE`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            raw: copy_fixed(bytes, "dynamic")?,
        })
    }

    /// `'M'` when running from mask ROM, `'C'` for code in flash
    pub fn running_mode(&self) -> u8 {
        self.raw[0]
    }

    /// Whether the hub runs its mask ROM code
    pub fn is_mask_code(&self) -> bool {
        self.raw[0] == b'M'
    }

    /// Super-speed port count
    pub fn ss_port_number(&self) -> u8 {
        self.raw[1]
    }

    /// High-speed port count
    pub fn hs_port_number(&self) -> u8 {
        self.raw[2]
    }

    /// Per-port connection status bitfields (SS, HS, FS, LS)
    pub fn connection_status(&self) -> [u8; 4] {
        [self.raw[3], self.raw[4], self.raw[5], self.raw[6]]
    }

    /// Charging port bitfield
    pub fn charging(&self) -> u8 {
        self.raw[7]
    }

    /// Non-removable port bitfield
    pub fn non_removable_port_status(&self) -> u8 {
        self.raw[8]
    }

    /// Bonding register snapshot
    pub fn bonding(&self) -> u8 {
        self.raw[9]
    }
}

/// Firmware-info tool string (31 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfoToolString {
    raw: [u8; Self::SIZE],
}

impl FirmwareInfoToolString {
    /// Encoded size
    pub const SIZE: usize = 31;

    /// Decode, zero-padding input shorter than [`Self::SIZE`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            raw: copy_fixed(bytes, "firmware info")?,
        })
    }

    /// Raw bytes, also the input of the authentication challenge
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.raw
    }

    /// ISP tool version
    pub fn tool_version(&self) -> &[u8] {
        &self.raw[0..6]
    }

    /// 3 or 4 byte addressing
    pub fn address_mode(&self) -> u8 {
        self.raw[6]
    }

    /// Build time (`YYYYMMDDhhmm`)
    pub fn build_time(&self) -> String {
        ascii(&self.raw[7..19])
    }

    /// Last update time (`YYYYMMDDhhmm`)
    pub fn update_time(&self) -> String {
        ascii(&self.raw[19..31])
    }
}

/// Vendor-support tool string (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VendorSupportToolString {
    raw: [u8; Self::SIZE],
}

impl VendorSupportToolString {
    /// Encoded size
    pub const SIZE: usize = 16;

    /// Decode, zero-padding input shorter than [`Self::SIZE`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            raw: copy_fixed(bytes, "vendor support")?,
        })
    }

    /// Format version
    pub fn version(&self) -> String {
        ascii(&self.raw[0..2])
    }

    /// Downstream device sharing the flash
    pub fn dfp_device(&self) -> u8 {
        level(self.raw[2])
    }

    /// MStar scaler support level (2 selects the data in/out requests)
    pub fn mstar_scaler(&self) -> u8 {
        level(self.raw[3])
    }

    /// Realtek scaler support level
    pub fn realtek_scaler(&self) -> u8 {
        level(self.raw[4])
    }

    /// Richtek PD support level
    pub fn richtek_pd(&self) -> u8 {
        level(self.raw[5])
    }

    /// TI PD support level
    pub fn ti_pd(&self) -> u8 {
        level(self.raw[6])
    }

    /// ST PD support level
    pub fn stm_pd(&self) -> u8 {
        level(self.raw[7])
    }

    /// Rohm PD support level
    pub fn rohm_pd(&self) -> u8 {
        level(self.raw[8])
    }

    /// Eevertech PD support level
    pub fn eevertech_pd(&self) -> u8 {
        level(self.raw[9])
    }

    /// HP proprietary code-sign level, non-zero selects the CS-ISP requests
    pub fn hp_proprietary(&self) -> u8 {
        level(self.raw[10])
    }

    /// Belkin arbitrator support level
    pub fn belkin_arbitrator(&self) -> u8 {
        level(self.raw[11])
    }

    /// GL9510 support level
    pub fn gl9510(&self) -> u8 {
        level(self.raw[12])
    }

    /// I2C master kit support level
    pub fn gl_i2c_master_kit(&self) -> u8 {
        level(self.raw[13])
    }

    /// MCU support level
    pub fn support_mcu(&self) -> u8 {
        level(self.raw[14])
    }

    /// HID support level
    pub fn support_hid(&self) -> u8 {
        level(self.raw[15])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIC: &[u8; 31] = b"3GL01100352310GL02220352310011A";

    #[test]
    fn test_static_fields() {
        let ts = StaticToolString::parse(STATIC).unwrap();
        assert_eq!(ts.version(), Some(3));
        assert_eq!(ts.mask_project_code(), b"GL01");
        assert_eq!(ts.mask_project_ic_type(), b"352310");
        assert_eq!(ts.ic_revision(), Some(10));
        assert_eq!(ts.running_project_ic_type(), b"352310");
        assert_eq!(ts.firmware_version(), b"011A");
    }

    #[test]
    fn test_static_describe() {
        let ts = StaticToolString::parse(STATIC).unwrap();
        let kv = ts.describe();
        let get = |k: &str| kv.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(get("mask_project_ic_type").as_deref(), Some("GL3523-10"));
        assert_eq!(get("mask_project_hardware").as_deref(), Some("A"));
        assert_eq!(get("running_project_hardware").as_deref(), Some("B"));
    }

    #[test]
    fn test_unsupported_version() {
        let mut raw = *STATIC;
        raw[0] = 0xFF;
        assert_eq!(StaticToolString::parse(&raw).unwrap().version(), None);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            StaticToolString::parse(&[]),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_vendor_support_levels() {
        let vs = VendorSupportToolString::parse(b"0120000000100000").unwrap();
        assert_eq!(vs.version(), "01");
        assert_eq!(vs.mstar_scaler(), 0);
        assert_eq!(vs.dfp_device(), 2);
        assert_eq!(vs.hp_proprietary(), 1);
    }

    #[test]
    fn test_short_input_is_padded() {
        let ts = DynamicToolString::parse(&[b'C'; 31]).unwrap();
        assert_eq!(ts.running_mode(), b'C');
        assert_eq!(ts.raw[31], 0);
    }

    #[test]
    fn test_dynamic_mask_mode() {
        let mut raw = [b'0'; 32];
        raw[0] = b'M';
        assert!(DynamicToolString::parse(&raw).unwrap().is_mask_code());
        raw[0] = b'C';
        assert!(!DynamicToolString::parse(&raw).unwrap().is_mask_code());
    }
}
