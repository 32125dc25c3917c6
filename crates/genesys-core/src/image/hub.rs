//! Hub firmware image

use core::fmt;

use super::tool_string::StaticToolString;
use super::{field, read_u16_be};
use crate::error::{Error, Result};

/// Offset of the 4-byte signature
pub const SIGNATURE_OFFSET: usize = 0xFC;
/// Offset of the code size byte (in KiB) in images stored on flash
pub const CODE_SIZE_OFFSET: usize = 0xFB;
/// Offset of the static tool string in GL3523 images
pub const STATIC_TS_OFFSET_GL3523: usize = 0x221;
/// Offset of the static tool string in GL3590 images
pub const STATIC_TS_OFFSET_GL3590: usize = 0x241;
/// Offset of the stored big-endian checksum
pub const CHECKSUM_OFFSET: usize = 0x5FFE;
/// Offset of the big-endian version field
pub const VERSION_OFFSET: usize = 0x10E;
/// Code size of most images
pub const DEFAULT_CODE_SIZE: usize = 0x6000;
/// Code size of GL3523 revision 50 images
pub const GL3523_REV50_CODE_SIZE: usize = 0x8000;

/// Hub controller model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubModel {
    /// GL3523
    Gl3523,
    /// GL3590
    Gl3590,
}

impl HubModel {
    /// Match the first four characters of a tool-string IC type
    pub fn from_ic_type(ic_type: &[u8]) -> Option<Self> {
        match ic_type.get(..4)? {
            b"3523" => Some(Self::Gl3523),
            b"3590" => Some(Self::Gl3590),
            _ => None,
        }
    }

    /// Offset of the static tool string inside this model's images
    pub const fn static_tool_string_offset(self) -> usize {
        match self {
            Self::Gl3523 => STATIC_TS_OFFSET_GL3523,
            Self::Gl3590 => STATIC_TS_OFFSET_GL3590,
        }
    }
}

impl fmt::Display for HubModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gl3523 => write!(f, "GL3523"),
            Self::Gl3590 => write!(f, "GL3590"),
        }
    }
}

/// Image signature at [`SIGNATURE_OFFSET`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `XROM`
    Xrom,
    /// `SRON`
    Sron,
}

impl SignatureKind {
    /// Decode a 4-byte signature
    pub fn from_bytes(sig: &[u8]) -> Option<Self> {
        match sig {
            b"XROM" => Some(Self::Xrom),
            b"SRON" => Some(Self::Sron),
            _ => None,
        }
    }

    /// Signature text
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xrom => "XROM",
            Self::Sron => "SRON",
        }
    }
}

/// Stored versus computed image checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    /// Big-endian value stored at [`CHECKSUM_OFFSET`]
    pub stored: u16,
    /// Wrapping byte sum over the code area
    pub computed: u16,
}

impl ChecksumReport {
    /// Whether both values agree
    pub fn is_valid(&self) -> bool {
        self.stored == self.computed
    }
}

/// A parsed hub firmware image
#[derive(Debug, Clone)]
pub struct HubImage {
    data: Vec<u8>,
    signature: SignatureKind,
    model: HubModel,
    static_tool_string: StaticToolString,
    code_size: usize,
    checksum: ChecksumReport,
    raw_version: u16,
}

impl HubImage {
    /// Validate and decode a hub image
    ///
    /// A checksum mismatch is logged and recorded, never fatal.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let signature = SignatureKind::from_bytes(field(&data, SIGNATURE_OFFSET, 4)?)
            .ok_or_else(|| Error::NotSupported("signature not supported".into()))?;

        let (model, static_tool_string) = Self::find_static_tool_string(&data)?;
        if static_tool_string.version().is_none() {
            return Err(Error::NotSupported(
                "static tool string not supported".into(),
            ));
        }

        let code_size = match (model, static_tool_string.ic_revision()) {
            (HubModel::Gl3523, Some(50)) => GL3523_REV50_CODE_SIZE,
            _ => DEFAULT_CODE_SIZE,
        };

        let stored = read_u16_be(&data, CHECKSUM_OFFSET)?;
        let computed = Self::checksum(field(&data, 0, code_size - 2)?);
        let checksum = ChecksumReport { stored, computed };
        if !checksum.is_valid() {
            log::warn!(
                "checksum mismatch, got 0x{:04x}, expected 0x{:04x}",
                computed,
                stored
            );
        }

        let raw_version = read_u16_be(&data, VERSION_OFFSET)?;

        Ok(Self {
            data,
            signature,
            model,
            static_tool_string,
            code_size,
            checksum,
            raw_version,
        })
    }

    fn find_static_tool_string(data: &[u8]) -> Result<(HubModel, StaticToolString)> {
        for model in [HubModel::Gl3523, HubModel::Gl3590] {
            let offset = model.static_tool_string_offset();
            let ts = StaticToolString::parse(field(data, offset, StaticToolString::SIZE)?)?;
            if HubModel::from_ic_type(ts.mask_project_ic_type()) == Some(model) {
                return Ok((model, ts));
            }
        }
        Err(Error::NotSupported("IC type not supported".into()))
    }

    /// 16-bit wrapping byte sum
    pub fn checksum(bytes: &[u8]) -> u16 {
        bytes
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
    }

    /// Store the correct checksum of the first `code_size - 2` bytes
    pub fn update_checksum(bytes: &mut [u8], code_size: usize) -> Result<()> {
        let summed = code_size.checked_sub(2).ok_or(Error::ImageTooSmall {
            offset: 0,
            len: code_size,
            size: bytes.len(),
        })?;
        let sum = Self::checksum(field(bytes, 0, summed)?);
        let len = bytes.len();
        let slot = bytes
            .get_mut(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2)
            .ok_or(Error::ImageTooSmall {
                offset: CHECKSUM_OFFSET,
                len: 2,
                size: len,
            })?;
        slot.copy_from_slice(&sum.to_be_bytes());
        Ok(())
    }

    /// Raw image bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Code area written to bank 0
    pub fn code(&self) -> &[u8] {
        &self.data[..self.code_size.min(self.data.len())]
    }

    /// Image signature
    pub fn signature(&self) -> SignatureKind {
        self.signature
    }

    /// Target hub model
    pub fn model(&self) -> HubModel {
        self.model
    }

    /// Embedded static tool string
    pub fn static_tool_string(&self) -> &StaticToolString {
        &self.static_tool_string
    }

    /// Code size in bytes
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    /// Checksum comparison
    pub fn checksum_report(&self) -> ChecksumReport {
        self.checksum
    }

    /// Whether the stored checksum disagrees with the contents
    pub fn checksum_mismatch(&self) -> bool {
        !self.checksum.is_valid()
    }

    /// Big-endian version field
    pub fn raw_version(&self) -> u16 {
        self.raw_version
    }

    /// Display version, low byte first
    pub fn version(&self) -> String {
        format!(
            "{:02x}.{:02x}",
            self.raw_version & 0x00FF,
            (self.raw_version & 0xFF00) >> 8
        )
    }

    /// Key/value export of the decoded metadata
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut kv = vec![
            ("signature".into(), self.signature.as_str().into()),
            ("model".into(), self.model.to_string()),
            ("code_size".into(), format!("0x{:x}", self.code_size)),
            (
                "checksum".into(),
                format!(
                    "0x{:04x} (computed 0x{:04x})",
                    self.checksum.stored, self.checksum.computed
                ),
            ),
            ("version".into(), self.version()),
        ];
        kv.extend(self.static_tool_string.describe());
        kv
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal image for `ic_type` with version bytes `ver`
    pub(crate) fn build_image(ic_type: &[u8; 6], ver: [u8; 2]) -> Vec<u8> {
        let mut img = vec![0u8; 0x6000];
        img[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(b"XROM");
        img[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&ver);
        let offset = HubModel::from_ic_type(ic_type)
            .unwrap()
            .static_tool_string_offset();
        let mut ts = *b"3GL01100000000GL01100000000011A";
        ts[8..14].copy_from_slice(ic_type);
        ts[21..27].copy_from_slice(ic_type);
        img[offset..offset + ts.len()].copy_from_slice(&ts);
        HubImage::update_checksum(&mut img, DEFAULT_CODE_SIZE).unwrap();
        img
    }

    #[test]
    fn test_parse_end_to_end() {
        let img = build_image(b"352310", [0x0A, 0x01]);
        let parsed = HubImage::parse(img).unwrap();
        assert_eq!(parsed.signature(), SignatureKind::Xrom);
        assert_eq!(parsed.model(), HubModel::Gl3523);
        assert_eq!(parsed.code_size(), 0x6000);
        assert_eq!(parsed.raw_version(), 0x0A01);
        assert_eq!(parsed.version(), "01.0a");
        assert!(!parsed.checksum_mismatch());
    }

    #[test]
    fn test_version_rendering_low_byte_first() {
        let parsed = HubImage::parse(build_image(b"352310", [0x02, 0x01])).unwrap();
        assert_eq!(parsed.raw_version(), 0x0201);
        assert_eq!(parsed.version(), "01.02");
    }

    #[test]
    fn test_gl3590_tool_string_offset() {
        let parsed = HubImage::parse(build_image(b"359010", [0, 1])).unwrap();
        assert_eq!(parsed.model(), HubModel::Gl3590);
        assert_eq!(parsed.code_size(), DEFAULT_CODE_SIZE);
    }

    #[test]
    fn test_gl3523_rev50_code_size() {
        let mut img = build_image(b"352350", [0, 1]);
        img.resize(0x8000, 0);
        let parsed = HubImage::parse(img).unwrap();
        assert_eq!(parsed.code_size(), GL3523_REV50_CODE_SIZE);
    }

    #[test]
    fn test_checksum_mismatch_is_not_fatal() {
        let mut img = build_image(b"352310", [0, 1]);
        img[0x1000] ^= 0x55;
        let parsed = HubImage::parse(img).unwrap();
        assert!(parsed.checksum_mismatch());
        let report = parsed.checksum_report();
        assert_eq!(report.computed.wrapping_sub(report.stored), 0x55);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(HubImage::checksum(&vec![0xFF; 0x1000]), 0xF000);
    }

    #[test]
    fn test_update_checksum_bad_code_size() {
        let mut img = vec![0u8; 0x400];
        assert!(matches!(
            HubImage::update_checksum(&mut img, 1),
            Err(Error::ImageTooSmall { len: 1, size: 0x400, .. })
        ));
        assert!(matches!(
            HubImage::update_checksum(&mut img, 0x800),
            Err(Error::ImageTooSmall { .. })
        ));
        assert!(img.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bad_signature() {
        let mut img = build_image(b"352310", [0, 1]);
        img[SIGNATURE_OFFSET] = b'Y';
        assert!(matches!(HubImage::parse(img), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_sron_signature() {
        let mut img = build_image(b"352310", [0, 1]);
        img[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(b"SRON");
        let parsed = HubImage::parse(img).unwrap();
        assert_eq!(parsed.signature(), SignatureKind::Sron);
    }

    #[test]
    fn test_unknown_ic_type() {
        let mut img = build_image(b"352310", [0, 1]);
        img[STATIC_TS_OFFSET_GL3523 + 8..STATIC_TS_OFFSET_GL3523 + 12].copy_from_slice(b"9999");
        let err = HubImage::parse(img).unwrap_err();
        assert!(matches!(err, Error::NotSupported(msg) if msg.contains("IC type")));
    }

    #[test]
    fn test_unsupported_tool_string_version() {
        let mut img = build_image(b"352310", [0, 1]);
        img[STATIC_TS_OFFSET_GL3523] = 0xFF;
        assert!(matches!(HubImage::parse(img), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_truncated_image() {
        let mut img = build_image(b"352310", [0, 1]);
        img.truncate(0x3000);
        assert!(matches!(
            HubImage::parse(img),
            Err(Error::ImageTooSmall {
                offset: CHECKSUM_OFFSET,
                ..
            })
        ));
    }

    #[test]
    fn test_describe_ic_type() {
        let parsed = HubImage::parse(build_image(b"352310", [0, 1])).unwrap();
        let kv = parsed.describe();
        assert!(kv
            .iter()
            .any(|(k, v)| k == "mask_project_ic_type" && v == "GL3523-10"));
    }
}
