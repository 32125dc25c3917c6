//! Firmware image codec
//!
//! Decoders for the fixed-offset metadata embedded in hub and scaler
//! firmware images. All layouts are accessed through explicit offsets over
//! byte slices; nothing relies on in-memory struct packing.

pub mod hub;
mod obfuscate;
pub mod scaler;
pub mod tool_string;

pub use hub::{ChecksumReport, HubImage, HubModel, SignatureKind};
pub use obfuscate::{xor_obfuscate, OBFUSCATION_KEY};
pub use scaler::{FooterConfig, ProtectSector, ScalerFooter, ScalerImage, FOOTER_SIZE};
pub use tool_string::{
    DynamicToolString, FirmwareInfoToolString, StaticToolString, VendorSupportToolString,
};

use crate::error::{Error, Result};

/// Borrow `len` bytes at `offset`, or fail with [`Error::ImageTooSmall`]
pub(crate) fn field(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(Error::ImageTooSmall {
            offset,
            len,
            size: buf.len(),
        })
}

pub(crate) fn read_u16_be(buf: &[u8], offset: usize) -> Result<u16> {
    let b = field(buf, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16> {
    let b = field(buf, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    let b = field(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Render a fixed-width ASCII field, stopping at the first NUL
pub(crate) fn ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Either kind of firmware image
#[derive(Debug, Clone)]
pub enum FirmwareImage {
    /// USB hub firmware
    Hub(HubImage),
    /// MStar scaler firmware
    Scaler(ScalerImage),
}

impl FirmwareImage {
    /// Parse `bytes` as a hub image, falling back to a scaler image
    pub fn detect(bytes: Vec<u8>) -> Result<Self> {
        match HubImage::parse(bytes.clone()) {
            Ok(image) => Ok(Self::Hub(image)),
            Err(hub_err) => match ScalerImage::parse(bytes) {
                Ok(image) => Ok(Self::Scaler(image)),
                Err(scaler_err) => {
                    log::debug!("not a scaler image: {}", scaler_err);
                    Err(hub_err)
                }
            },
        }
    }

    /// Key/value description of the decoded metadata
    pub fn describe(&self) -> Vec<(String, String)> {
        match self {
            Self::Hub(image) => image.describe(),
            Self::Scaler(image) => image.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_bounds() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(field(&buf, 1, 2).unwrap(), &[2, 3]);
        assert!(matches!(
            field(&buf, 3, 2),
            Err(Error::ImageTooSmall {
                offset: 3,
                len: 2,
                size: 4
            })
        ));
        assert!(field(&buf, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_endianness_helpers() {
        let buf = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_u16_be(&buf, 0).unwrap(), 0x1234);
        assert_eq!(read_u16_le(&buf, 0).unwrap(), 0x3412);
        assert_eq!(read_u32_le(&buf, 0).unwrap(), 0x7856_3412);
    }

    #[test]
    fn test_ascii_stops_at_nul() {
        assert_eq!(ascii(b"TSUM\0\0junk"), "TSUM");
        assert_eq!(ascii(b"ABCD"), "ABCD");
    }

    #[test]
    fn test_detect_rejects_garbage() {
        let err = FirmwareImage::detect(vec![0u8; 0x400]).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
