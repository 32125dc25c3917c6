//! Scaler firmware image and its obfuscated footer
//!
//! The last [`FOOTER_SIZE`] bytes of a scaler image carry the public key
//! text followed by an RSA-header-shaped record, both XORed with
//! [`super::OBFUSCATION_KEY`]. Everything before the footer is payload.

use bitflags::bitflags;

use super::obfuscate::xor_obfuscate;
use super::{ascii, read_u16_le, read_u32_le};
use crate::error::{Error, Result};

/// Size of the public key block
pub const PUBLIC_KEY_SIZE: usize = 0x212;
/// Size of the header block
pub const HEADER_SIZE: usize = 0x100;
/// Total footer size
pub const FOOTER_SIZE: usize = PUBLIC_KEY_SIZE + HEADER_SIZE;

/// Size of the `N = ...\r\n` record
pub const KEY_N_SIZE: usize = 0x206;
/// Size of the `E = ...\r\n` record
pub const KEY_E_SIZE: usize = 0x0C;
const KEY_TAG_LEN: usize = 4;
const KEY_N_TEXT_LEN: usize = 0x200;
const KEY_E_TEXT_LEN: usize = 6;

/// Expected header tag
pub const HEADER_TAG: &[u8; 14] = b"MTK_RSA_HEADER";

/// Size reserved for the on-flash public key when decrypt mode is set
pub const PUBLIC_KEY_FLASH_SIZE: u32 = 0x1000;

/// Header field offsets, relative to the header start
pub mod offsets {
    /// Tag (14 bytes)
    pub const TAG: usize = 0x00;
    /// Model name (16 bytes)
    pub const MODEL_NAME: usize = 0x10;
    /// Size (2 bytes)
    pub const SIZE: usize = 0x21;
    /// Scaler group (10 bytes)
    pub const SCALER_GROUP: usize = 0x28;
    /// Panel type (10 bytes)
    pub const PANEL_TYPE: usize = 0x54;
    /// Packet date (8 bytes)
    pub const PACKET_DATE: usize = 0x62;
    /// Packet version (4 bytes)
    pub const PACKET_VERSION: usize = 0x70;
    /// Configuration byte
    pub const CONFIGURATION: usize = 0x80;
    /// Second image program address (LE u32)
    pub const SECOND_IMAGE_ADDR: usize = 0x86;
    /// Public key address (LE u32)
    pub const PUBLIC_KEY_ADDR: usize = 0x8A;
    /// Two protect sector descriptors, 3 bytes each
    pub const PROTECT_SECTORS: usize = 0x8E;
    /// Boot code size (LE u32)
    pub const BOOT_CODE_SIZE: usize = 0x94;
}

bitflags! {
    /// Configuration byte of the footer header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FooterConfig: u8 {
        /// Payload goes to the second image address
        const SECOND_IMAGE = 1 << 1;
        /// A public key is stored on flash
        const DECRYPT_MODE = 1 << 2;
        /// Dual image turn
        const DUAL_IMAGE_TURN = 1 << 3;
        /// Protect sector descriptors are valid
        const SPECIAL_PROTECT_SECTOR = 1 << 4;
        /// Hawk bypass
        const HAWK_BYPASS = 1 << 5;
        /// Boot code size field is valid
        const BOOT_CODE_SIZE_IN_HEADER = 1 << 6;
    }
}

/// A flash range that must not be erased or programmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectSector {
    /// Start address, 4 KiB aligned
    pub addr: u32,
    /// Length in bytes, multiple of 4 KiB
    pub size: u32,
}

impl ProtectSector {
    /// Decode a 3-byte descriptor; `None` when its size is zero
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let low = u32::from(u16::from_le_bytes([raw[0], raw[1]]));
        let high = u32::from(raw[2] & 0x0F);
        let size = u32::from(raw[2] >> 4);
        if size == 0 {
            return None;
        }
        Some(Self {
            addr: ((high << 16) | low) * 0x1000,
            size: size * 0x1000,
        })
    }

    /// Whether `[addr, addr + len)` overlaps this range
    pub fn overlaps(&self, addr: u32, len: u32) -> bool {
        let end = u64::from(self.addr) + u64::from(self.size);
        u64::from(addr) < end && u64::from(self.addr) < u64::from(addr) + u64::from(len)
    }
}

/// Decoded (plain) footer
#[derive(Clone, PartialEq, Eq)]
pub struct ScalerFooter {
    raw: Vec<u8>,
}

impl core::fmt::Debug for ScalerFooter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScalerFooter")
            .field("model_name", &self.model_name())
            .field("packet_version", &self.packet_version())
            .field("config", &self.config())
            .finish()
    }
}

impl ScalerFooter {
    /// Decode an obfuscated footer as found at the end of an image
    pub fn decode(obfuscated: &[u8]) -> Result<Self> {
        let mut raw = obfuscated.to_vec();
        xor_obfuscate(&mut raw);
        Self::from_plain(raw)
    }

    /// Wrap an already decoded footer, checking size and tag
    pub fn from_plain(raw: Vec<u8>) -> Result<Self> {
        if raw.len() != FOOTER_SIZE {
            return Err(Error::InvalidFooter);
        }
        let footer = Self { raw };
        if footer.header_field(offsets::TAG, HEADER_TAG.len()) != HEADER_TAG {
            return Err(Error::InvalidFooter);
        }
        Ok(footer)
    }

    /// Obfuscated bytes as they appear in the image
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.raw.clone();
        xor_obfuscate(&mut out);
        out
    }

    /// Plain footer bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn header(&self) -> &[u8] {
        &self.raw[PUBLIC_KEY_SIZE..]
    }

    fn header_field(&self, offset: usize, len: usize) -> &[u8] {
        &self.header()[offset..offset + len]
    }

    /// Plain public key block (`N = ...\r\nE = ...\r\n`)
    pub fn public_key(&self) -> &[u8] {
        &self.raw[..PUBLIC_KEY_SIZE]
    }

    /// Modulus as hex text
    pub fn public_key_n(&self) -> String {
        ascii(&self.raw[KEY_TAG_LEN..KEY_TAG_LEN + KEY_N_TEXT_LEN])
    }

    /// Exponent as hex text
    pub fn public_key_e(&self) -> String {
        let start = KEY_N_SIZE + KEY_TAG_LEN;
        ascii(&self.raw[start..start + KEY_E_TEXT_LEN])
    }

    /// Model name
    pub fn model_name(&self) -> String {
        ascii(self.header_field(offsets::MODEL_NAME, 16))
    }

    /// Size field
    pub fn size(&self) -> u16 {
        // in bounds: header is HEADER_SIZE bytes
        read_u16_le(self.header(), offsets::SIZE).unwrap_or_default()
    }

    /// Scaler group
    pub fn scaler_group(&self) -> String {
        ascii(self.header_field(offsets::SCALER_GROUP, 10))
    }

    /// Panel type
    pub fn panel_type(&self) -> String {
        ascii(self.header_field(offsets::PANEL_TYPE, 10))
    }

    /// Packet date
    pub fn packet_date(&self) -> String {
        ascii(self.header_field(offsets::PACKET_DATE, 8))
    }

    /// Packet version
    pub fn packet_version(&self) -> String {
        ascii(self.header_field(offsets::PACKET_VERSION, 4))
    }

    /// Raw configuration byte
    pub fn configuration(&self) -> u8 {
        self.header()[offsets::CONFIGURATION]
    }

    /// Configuration flags
    pub fn config(&self) -> FooterConfig {
        FooterConfig::from_bits_truncate(self.configuration())
    }

    fn header_u32(&self, offset: usize) -> u32 {
        read_u32_le(self.header(), offset).unwrap_or_default()
    }

    /// Second image address, when configured
    pub fn second_image_addr(&self) -> Option<u32> {
        self.config()
            .contains(FooterConfig::SECOND_IMAGE)
            .then(|| self.header_u32(offsets::SECOND_IMAGE_ADDR))
    }

    /// Public key flash address, when configured
    pub fn public_key_addr(&self) -> Option<u32> {
        self.config()
            .contains(FooterConfig::DECRYPT_MODE)
            .then(|| self.header_u32(offsets::PUBLIC_KEY_ADDR))
    }

    /// Protect sectors, when configured (zero-size entries omitted)
    pub fn protect_sectors(&self) -> Vec<ProtectSector> {
        if !self.config().contains(FooterConfig::SPECIAL_PROTECT_SECTOR) {
            return Vec::new();
        }
        self.header_field(offsets::PROTECT_SECTORS, 6)
            .chunks(3)
            .filter_map(ProtectSector::decode)
            .collect()
    }

    /// Boot code size, when configured
    pub fn boot_code_size(&self) -> Option<u32> {
        self.config()
            .contains(FooterConfig::BOOT_CODE_SIZE_IN_HEADER)
            .then(|| self.header_u32(offsets::BOOT_CODE_SIZE))
    }
}

/// A parsed scaler firmware image
#[derive(Debug, Clone)]
pub struct ScalerImage {
    data: Vec<u8>,
    footer: ScalerFooter,
}

impl ScalerImage {
    /// Decode the footer of `data`
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::ImageTooSmall {
                offset: 0,
                len: FOOTER_SIZE,
                size: data.len(),
            });
        }
        let footer = ScalerFooter::decode(&data[data.len() - FOOTER_SIZE..])?;
        Ok(Self { data, footer })
    }

    /// Raw image bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decoded footer
    pub fn footer(&self) -> &ScalerFooter {
        &self.footer
    }

    /// Payload written to flash
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.size()]
    }

    /// Flash address of the payload
    pub fn addr(&self) -> u32 {
        self.footer.second_image_addr().unwrap_or(0)
    }

    /// Payload size
    pub fn size(&self) -> usize {
        self.data.len() - FOOTER_SIZE
    }

    /// Flash region reserved for the public key
    pub fn public_key_region(&self) -> Option<(u32, u32)> {
        self.footer
            .public_key_addr()
            .map(|addr| (addr, PUBLIC_KEY_FLASH_SIZE))
    }

    /// Re-encoded footer, identical to the image tail when unmodified
    pub fn encode_footer(&self) -> Vec<u8> {
        self.footer.encode()
    }

    /// Key/value export of the decoded metadata
    pub fn describe(&self) -> Vec<(String, String)> {
        let f = &self.footer;
        let mut kv = vec![
            ("model_name".into(), f.model_name()),
            ("scaler_group".into(), f.scaler_group()),
            ("panel_type".into(), f.panel_type()),
            ("scaler_packet_date".into(), f.packet_date()),
            ("scaler_packet_version".into(), f.packet_version()),
            (
                "configuration_setting".into(),
                format!("0x{:x}", f.configuration()),
            ),
        ];
        if let Some(addr) = f.second_image_addr() {
            kv.push(("second_image_program_addr".into(), format!("0x{:x}", addr)));
        }
        if let Some((addr, size)) = self.public_key_region() {
            kv.push(("public_key_addr".into(), format!("0x{:x}", addr)));
            kv.push(("public_key_size".into(), format!("0x{:x}", size)));
            kv.push(("N".into(), f.public_key_n()));
            kv.push(("E".into(), f.public_key_e()));
        }
        for (i, ps) in f.protect_sectors().iter().enumerate() {
            kv.push((format!("protect_sector_addr[{}]", i), format!("0x{:x}", ps.addr)));
            kv.push((format!("protect_sector_size[{}]", i), format!("0x{:x}", ps.size)));
        }
        if let Some(size) = f.boot_code_size() {
            kv.push(("boot_code_size".into(), format!("0x{:x}", size)));
        }
        kv.push(("addr".into(), format!("0x{:x}", self.addr())));
        kv.push(("size".into(), format!("0x{:x}", self.size())));
        kv
    }
}

/// Build a plain footer with the given key text and header fields
///
/// Used by tooling and tests to produce images the parser accepts.
pub fn plain_footer(
    n_hex: &str,
    e_hex: &str,
    model_name: &str,
    config: FooterConfig,
    second_image_addr: u32,
    protect: &[(u32, u32)],
) -> Vec<u8> {
    let mut raw = vec![0u8; FOOTER_SIZE];
    let put = |raw: &mut [u8], at: usize, bytes: &[u8], max: usize| {
        let n = bytes.len().min(max);
        raw[at..at + n].copy_from_slice(&bytes[..n]);
    };

    put(&mut raw, 0, b"N = ", KEY_TAG_LEN);
    put(&mut raw, KEY_TAG_LEN, n_hex.as_bytes(), KEY_N_TEXT_LEN);
    put(&mut raw, KEY_N_SIZE - 2, b"\r\n", 2);
    put(&mut raw, KEY_N_SIZE, b"E = ", KEY_TAG_LEN);
    put(&mut raw, KEY_N_SIZE + KEY_TAG_LEN, e_hex.as_bytes(), KEY_E_TEXT_LEN);
    put(&mut raw, PUBLIC_KEY_SIZE - 2, b"\r\n", 2);

    let h = PUBLIC_KEY_SIZE;
    put(&mut raw, h + offsets::TAG, HEADER_TAG, HEADER_TAG.len());
    put(&mut raw, h + offsets::MODEL_NAME, model_name.as_bytes(), 16);
    raw[h + offsets::CONFIGURATION] = config.bits();
    put(
        &mut raw,
        h + offsets::SECOND_IMAGE_ADDR,
        &second_image_addr.to_le_bytes(),
        4,
    );
    for (i, &(addr, size)) in protect.iter().take(2).enumerate() {
        let sector = addr / 0x1000;
        let at = h + offsets::PROTECT_SECTORS + i * 3;
        put(&mut raw, at, &(sector as u16).to_le_bytes(), 2);
        raw[at + 2] = ((sector >> 16) as u8 & 0x0F) | (((size / 0x1000) as u8) << 4);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(payload_len: usize, footer: &[u8]) -> Vec<u8> {
        let mut obf = footer.to_vec();
        xor_obfuscate(&mut obf);
        let mut data: Vec<u8> = (0..payload_len).map(|i| (i * 7) as u8).collect();
        data.extend_from_slice(&obf);
        data
    }

    #[test]
    fn test_parse_basic() {
        let footer = plain_footer("C0FFEE", "010001", "TSUMG", FooterConfig::empty(), 0, &[]);
        let img = ScalerImage::parse(image(0x2000, &footer)).unwrap();
        assert_eq!(img.footer().model_name(), "TSUMG");
        assert_eq!(img.footer().public_key_n(), "C0FFEE");
        assert_eq!(img.footer().public_key_e(), "010001");
        assert_eq!(img.addr(), 0);
        assert_eq!(img.size(), 0x2000);
        assert!(img.public_key_region().is_none());
        assert!(img.footer().protect_sectors().is_empty());
    }

    #[test]
    fn test_second_image_and_protect_sectors() {
        let config = FooterConfig::SECOND_IMAGE
            | FooterConfig::SPECIAL_PROTECT_SECTOR
            | FooterConfig::DECRYPT_MODE;
        let footer = plain_footer(
            "AB",
            "03",
            "MST9U",
            config,
            0x10000,
            &[(0x1_2000, 0x3000), (0, 0)],
        );
        let img = ScalerImage::parse(image(0x1000, &footer)).unwrap();
        assert_eq!(img.addr(), 0x10000);
        assert_eq!(
            img.footer().protect_sectors(),
            vec![ProtectSector {
                addr: 0x1_2000,
                size: 0x3000
            }]
        );
        assert_eq!(img.public_key_region(), Some((0, PUBLIC_KEY_FLASH_SIZE)));
    }

    #[test]
    fn test_protect_sector_high_nibble() {
        // sector 0x1_0010: low 0x0010, high 1, size 2
        let ps = ProtectSector::decode(&[0x10, 0x00, 0x21]).unwrap();
        assert_eq!(ps.addr, 0x1_0010 * 0x1000);
        assert_eq!(ps.size, 0x2000);
        assert!(ProtectSector::decode(&[0x10, 0x00, 0x01]).is_none());
    }

    #[test]
    fn test_overlaps() {
        let ps = ProtectSector {
            addr: 0x2000,
            size: 0x1000,
        };
        assert!(ps.overlaps(0x2000, 0x1000));
        assert!(ps.overlaps(0x1800, 0x1000));
        assert!(!ps.overlaps(0x1000, 0x1000));
        assert!(!ps.overlaps(0x3000, 0x1000));
    }

    #[test]
    fn test_overlaps_at_top_of_address_space() {
        let ps = ProtectSector::decode(&[0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(ps.addr, 0xFFFF_F000);
        assert_eq!(ps.size, 0xF000);
        assert!(!ps.overlaps(0, 0x1000));
        assert!(ps.overlaps(0xFFFF_F000, 0x1000));
        assert!(ps.overlaps(0xFFFF_FF00, u32::MAX));
    }

    #[test]
    fn test_bad_tag() {
        let mut footer = plain_footer("", "", "", FooterConfig::empty(), 0, &[]);
        footer[PUBLIC_KEY_SIZE] = b'X';
        assert!(matches!(
            ScalerImage::parse(image(0x100, &footer)),
            Err(Error::InvalidFooter)
        ));
        // plain (non-obfuscated) footer is rejected too
        let plain = plain_footer("", "", "", FooterConfig::empty(), 0, &[]);
        let mut data = vec![0u8; 0x100];
        data.extend_from_slice(&plain);
        assert!(matches!(ScalerImage::parse(data), Err(Error::InvalidFooter)));
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            ScalerImage::parse(vec![0u8; 0x100]),
            Err(Error::ImageTooSmall { .. })
        ));
    }

    #[test]
    fn test_encode_footer_matches_input() {
        let footer = plain_footer("AA", "03", "X", FooterConfig::HAWK_BYPASS, 0, &[]);
        let data = image(0x40, &footer);
        let img = ScalerImage::parse(data.clone()).unwrap();
        assert_eq!(img.encode_footer(), &data[data.len() - FOOTER_SIZE..]);
        assert_eq!(img.footer().as_bytes(), &footer[..]);
    }

    #[test]
    fn test_boot_code_size() {
        let mut footer = plain_footer(
            "",
            "",
            "",
            FooterConfig::BOOT_CODE_SIZE_IN_HEADER,
            0,
            &[],
        );
        let at = PUBLIC_KEY_SIZE + offsets::BOOT_CODE_SIZE;
        footer[at..at + 4].copy_from_slice(&0x4000u32.to_le_bytes());
        let img = ScalerImage::parse(image(0, &footer)).unwrap();
        assert_eq!(img.footer().boot_code_size(), Some(0x4000));
        assert_eq!(img.size(), 0);
    }
}
