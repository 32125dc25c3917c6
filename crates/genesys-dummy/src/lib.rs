//! genesys-dummy - In-memory Genesys hub and MStar scaler emulator
//!
//! [`DummyHub`] implements [`UsbTransport`] and answers the same control
//! transfers as a real hub: tool-string descriptors, the authentication
//! challenge, the ISP switch and the flash requests, plus the scaler
//! requests when a scaler is attached. Every transfer and every delay is
//! recorded so tests can check exact ordering without sleeping.

#![warn(rust_2018_idioms)]

mod flash;
mod scaler;

use std::time::Duration;

use genesys_core::chip::{find_by_name, FlashChipProfile, FLASH_CHIPS};
use genesys_core::error::{Error, Result};
use genesys_core::image::hub::{
    HubImage, HubModel, CODE_SIZE_OFFSET, DEFAULT_CODE_SIZE, GL3523_REV50_CODE_SIZE, SIGNATURE_OFFSET,
    VERSION_OFFSET,
};
use genesys_core::image::scaler::{plain_footer, PUBLIC_KEY_SIZE};
use genesys_core::image::FooterConfig;
use genesys_core::spi::opcodes;
use genesys_core::usb::{
    ControlSetup, Direction, RequestType, TransportError, UsbDeviceInfo, UsbTransport,
    DESCRIPTOR_TYPE_STRING, REQUEST_GET_DESCRIPTOR,
};

pub use flash::FlashEmu;
pub use scaler::ScalerEmu;

/// Genesys Logic vendor ID
pub const GENESYS_VID: u16 = 0x05E3;

const GL_HUB_VERIFY: u8 = 0x71;
const SCALER_INFO: u8 = 0xA4;
const LEGACY_REQUESTS: (u8, u8, u8) = (0x81, 0x82, 0x83);
const CS_REQUESTS: (u8, u8, u8) = (0xA1, 0xA2, 0xA3);

/// Modulus text of the emulated scaler's public key
pub fn public_key_n() -> String {
    "C0FFEE".repeat(85) + "AB"
}

/// Exponent text of the emulated scaler's public key
pub const PUBLIC_KEY_E: &str = "010001";

/// Plain public key block the emulated scaler reports
pub fn public_key_block() -> Vec<u8> {
    let footer = plain_footer(
        &public_key_n(),
        PUBLIC_KEY_E,
        "",
        FooterConfig::empty(),
        0,
        &[],
    );
    footer[..PUBLIC_KEY_SIZE].to_vec()
}

/// Configuration for the emulated hub
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Hub model
    pub model: HubModel,
    /// Two-digit IC revision
    pub revision: u8,
    /// Enumerate as USB 3
    pub usb3: bool,
    /// Report HP code-sign support (CS-ISP requests and authentication)
    pub code_sign: bool,
    /// Running from mask ROM
    pub mask_code: bool,
    /// bcdDevice
    pub release: u16,
    /// MStar scaler support level, 0 for no scaler
    pub mstar_scaler: u8,
    /// Hub flash part
    pub hub_chip: &'static FlashChipProfile,
    /// Scaler flash part
    pub scaler_chip: &'static FlashChipProfile,
    /// Answer every authentication with failure
    pub reject_auth: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            model: HubModel::Gl3523,
            revision: 10,
            usb3: true,
            code_sign: true,
            mask_code: false,
            release: 0x9A26,
            mstar_scaler: 0,
            // W25X40 and W25Q80
            hub_chip: &FLASH_CHIPS[2],
            scaler_chip: &FLASH_CHIPS[3],
            reject_auth: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(Error::InvalidParameter(format!("{}: {}", key, value))),
    }
}

fn chip(value: &str) -> Result<&'static FlashChipProfile> {
    find_by_name(value)
        .map(|(_, chip)| chip)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown flash chip: {}", value)))
}

impl DummyConfig {
    /// Parse options from key=value pairs
    pub fn parse_options(options: &[(&str, &str)]) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in options {
            match *key {
                "model" => {
                    config.model = match value.to_lowercase().as_str() {
                        "gl3523" => HubModel::Gl3523,
                        "gl3590" => HubModel::Gl3590,
                        _ => {
                            return Err(Error::InvalidParameter(format!("model: {}", value)));
                        }
                    }
                }
                "rev" => {
                    config.revision = value
                        .parse()
                        .map_err(|_| Error::InvalidParameter(format!("rev: {}", value)))?;
                }
                "usb" => {
                    config.usb3 = match *value {
                        "2" => false,
                        "3" => true,
                        _ => return Err(Error::InvalidParameter(format!("usb: {}", value))),
                    }
                }
                "cs" => config.code_sign = parse_bool(key, value)?,
                "mask" => config.mask_code = parse_bool(key, value)?,
                "scaler" => {
                    config.mstar_scaler = value
                        .parse()
                        .map_err(|_| Error::InvalidParameter(format!("scaler: {}", value)))?;
                }
                "chip" => config.hub_chip = chip(value)?,
                "scaler-chip" => config.scaler_chip = chip(value)?,
                _ => {
                    return Err(Error::InvalidParameter(format!("unknown option: {}", key)));
                }
            }
        }
        Ok(config)
    }

    fn ic_type(&self) -> String {
        let family = match self.model {
            HubModel::Gl3523 => "3523",
            HubModel::Gl3590 => "3590",
        };
        format!("{}{:02}", family, self.revision)
    }

    /// Static tool string (31 bytes)
    pub fn static_tool_string(&self) -> Vec<u8> {
        let ic = self.ic_type();
        format!("3GL01100{ic}GL01100{ic}0100").into_bytes()
    }

    /// Dynamic tool string (running mode and port status)
    pub fn dynamic_tool_string(&self) -> Vec<u8> {
        let mode = if self.mask_code { 'M' } else { 'C' };
        let mut ts = format!("{mode}440000000").into_bytes();
        ts.resize(32, b'0');
        ts
    }

    /// Firmware-info tool string
    pub fn fw_info_tool_string(&self) -> Vec<u8> {
        b"GLTOOL3202104011200202104021300".to_vec()
    }

    /// Vendor-support tool string
    pub fn vendor_support_tool_string(&self) -> Vec<u8> {
        let mut vs = *b"0100000000000000";
        vs[3] = b'0' + self.mstar_scaler.min(9);
        vs[10] = if self.code_sign { b'1' } else { b'0' };
        vs.to_vec()
    }

    /// Code size of the preloaded firmware
    pub fn code_size(&self) -> usize {
        match self.model {
            HubModel::Gl3523 if self.revision != 50 => 0x6000,
            _ => 0x8000,
        }
    }

    /// A valid firmware image for this hub with the given version bytes
    pub fn firmware_image(&self, version: [u8; 2]) -> Result<Vec<u8>> {
        let code_size = self.code_size();
        let mut image: Vec<u8> = (0..code_size).map(|i| (i % 251) as u8).collect();
        image[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(b"XROM");
        image[CODE_SIZE_OFFSET] = (code_size / 1024) as u8;
        let ts = self.static_tool_string();
        let at = self.model.static_tool_string_offset();
        image[at..at + ts.len()].copy_from_slice(&ts);
        image[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&version);
        let summed = match (self.model, self.revision) {
            (HubModel::Gl3523, 50) => GL3523_REV50_CODE_SIZE,
            _ => DEFAULT_CODE_SIZE,
        };
        HubImage::update_checksum(&mut image, summed)?;
        Ok(image)
    }
}

/// One recorded control transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Setup packet
    pub setup: ControlSetup,
    /// Bytes sent (OUT) or returned (IN)
    pub data: Vec<u8>,
}

/// Emulated hub, optionally with a scaler behind it
#[derive(Debug, Clone)]
pub struct DummyHub {
    config: DummyConfig,
    requests: (u8, u8, u8),
    authenticated: bool,
    in_isp: bool,
    /// Hub flash
    pub flash: FlashEmu,
    /// Attached scaler
    pub scaler: Option<ScalerEmu>,
    /// Every control transfer, in order
    pub transfers: Vec<Transfer>,
    /// Every requested delay, in order
    pub delays: Vec<Duration>,
    /// Resets received
    pub resets: u32,
    /// Fail the next N transfers with a timeout
    pub fail_next: u32,
    /// Fail every transfer matching this request code
    pub fail_request: Option<u8>,
}

impl DummyHub {
    /// Build an emulator; the hub flash holds a valid firmware image
    pub fn new(config: DummyConfig) -> Result<Self> {
        let mut flash = FlashEmu::new(config.hub_chip);
        flash.load(0, &config.firmware_image([0x02, 0x01])?);

        let scaler = if config.mstar_scaler > 0 {
            let mut scaler = ScalerEmu::new(FlashEmu::new(config.scaler_chip), public_key_block());
            scaler.level = config.mstar_scaler;
            Some(scaler)
        } else {
            None
        };

        log::debug!("dummy hub: {:?}", config);
        Ok(Self {
            requests: if config.code_sign {
                CS_REQUESTS
            } else {
                LEGACY_REQUESTS
            },
            config,
            authenticated: false,
            in_isp: false,
            flash,
            scaler,
            transfers: Vec::new(),
            delays: Vec::new(),
            resets: 0,
            fail_next: 0,
            fail_request: None,
        })
    }

    /// Emulator with the default configuration
    pub fn new_default() -> Result<Self> {
        Self::new(DummyConfig::default())
    }

    /// Configuration in use
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Whether the hub is in ISP mode
    pub fn in_isp(&self) -> bool {
        self.in_isp
    }

    /// Recorded transfers to `request`
    pub fn transfers_to(&self, request: u8) -> impl Iterator<Item = &Transfer> + Clone + '_ {
        self.transfers
            .iter()
            .filter(move |t| t.setup.request == request)
    }

    /// Expected authentication check for `[start..=end]` of the fw-info string
    pub fn expected_challenge(&self, start: u8, end: u8) -> u8 {
        let fw_info = self.config.fw_info_tool_string();
        let release = self.config.release;
        fw_info[usize::from(start)..=usize::from(end)]
            .iter()
            .fold((release & 0xFF) as u8 ^ (release >> 8) as u8, |acc, b| acc ^ b)
    }

    fn string_descriptor(&self, index: u8, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        let (idx_static, idx_dynamic) = if self.config.usb3 {
            (0x84, 0x85)
        } else {
            (0x81, 0x82)
        };
        let payload = match index {
            i if i == idx_static => self.config.static_tool_string(),
            i if i == idx_dynamic => self.config.dynamic_tool_string(),
            0x83 => self.config.fw_info_tool_string(),
            0x86 => self.config.vendor_support_tool_string(),
            _ => return Err(TransportError::Stall),
        };

        // one byte per UTF-16LE code unit
        let mut raw = vec![0u8, DESCRIPTOR_TYPE_STRING];
        for b in payload {
            raw.extend_from_slice(&[b, 0]);
        }
        raw.truncate(buf.len());
        raw[0] = raw.len() as u8;
        buf[..raw.len()].copy_from_slice(&raw);
        Ok(raw.len())
    }

    fn verify(&mut self, value: u16, index: u16, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        let start = (value & 0xFF) as u8;
        let end = (value >> 8) as u8;
        if start == 0 || end <= start || end >= 0x15 {
            return Err(TransportError::Stall);
        }
        let reply = if index & 0xFF == 1 {
            let ok = !self.config.reject_auth
                && (index >> 8) as u8 == self.expected_challenge(start, end);
            self.authenticated = ok;
            u8::from(ok)
        } else {
            0
        };
        let first = buf.first_mut().ok_or(TransportError::Stall)?;
        *first = reply;
        Ok(1)
    }

    fn switch(&mut self, value: u16) -> std::result::Result<(), TransportError> {
        match value {
            1 => {
                if self.config.code_sign && !self.authenticated {
                    return Err(TransportError::Stall);
                }
                self.in_isp = true;
            }
            0 => {
                self.in_isp = false;
                self.authenticated = false;
            }
            3 => {
                self.in_isp = false;
                self.authenticated = false;
                self.resets += 1;
            }
            _ => return Err(TransportError::Stall),
        }
        Ok(())
    }

    fn hub_read(&mut self, value: u16, index: u16, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        let opcode = (value >> 8) as u8;
        // the switch poll reads the status register on both sides of ISP
        if value & 0xFF == 0x02 && opcode == opcodes::RDSR {
            let status = self.flash.read_status();
            buf.fill(status);
            return Ok(buf.len());
        }
        if !self.in_isp {
            return Err(TransportError::Stall);
        }
        match value & 0xFF {
            0x00 => self.flash.read(hub_address(value, index), buf)?,
            0x01 | 0x02 => self.flash.read_id(opcode, buf),
            _ => return Err(TransportError::Stall),
        }
        Ok(buf.len())
    }

    fn hub_write(&mut self, value: u16, index: u16, data: &[u8]) -> std::result::Result<(), TransportError> {
        if !self.in_isp {
            return Err(TransportError::Stall);
        }
        let opcode = (value >> 8) as u8;
        match value & 0xFF {
            0x00 => self.flash.program(hub_address(value, index), data, true),
            0x02 => self.flash.command(opcode, data),
            0x03 if opcode == opcodes::SE_20 => {
                self.flash.erase_sector(u32::from(index) * 4096)
            }
            _ => Err(TransportError::Stall),
        }
    }

    fn scaler_requests(&self) -> (u8, u8) {
        if self.config.mstar_scaler >= 2 {
            (0x7F, 0x7C)
        } else {
            (0x7A, 0x7B)
        }
    }

    fn dispatch(&mut self, setup: &ControlSetup, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        if setup.request_type == RequestType::Standard {
            if setup.request == REQUEST_GET_DESCRIPTOR
                && setup.value >> 8 == u16::from(DESCRIPTOR_TYPE_STRING)
            {
                return self.string_descriptor((setup.value & 0xFF) as u8, buf);
            }
            return Err(TransportError::Stall);
        }

        let (switch, read, write) = self.requests;
        let (scaler_read, scaler_write) = self.scaler_requests();
        match (setup.direction, setup.request) {
            (Direction::In, GL_HUB_VERIFY) => self.verify(setup.value, setup.index, buf),
            (Direction::Out, r) if r == switch => self.switch(setup.value).map(|_| 0),
            (Direction::In, r) if r == read => self.hub_read(setup.value, setup.index, buf),
            (Direction::Out, r) if r == write => {
                self.hub_write(setup.value, setup.index, buf).map(|_| buf.len())
            }
            (Direction::In, SCALER_INFO) => {
                let scaler = self.scaler.as_ref().ok_or(TransportError::Stall)?;
                scaler.info(setup.value, setup.index, buf)
            }
            (Direction::Out, r) if r == scaler_write => {
                let scaler = self.scaler.as_mut().ok_or(TransportError::Stall)?;
                match setup.value {
                    0 => scaler.isp_write(buf)?,
                    1 => scaler.debug_write(buf)?,
                    _ => return Err(TransportError::Stall),
                }
                Ok(buf.len())
            }
            (Direction::In, r) if r == scaler_read => {
                let scaler = self.scaler.as_mut().ok_or(TransportError::Stall)?;
                match setup.value {
                    0 => scaler.isp_read(buf),
                    1 => scaler.debug_read(buf),
                    _ => Err(TransportError::Stall),
                }
            }
            _ => Err(TransportError::Stall),
        }
    }
}

fn hub_address(value: u16, index: u16) -> u32 {
    ((u32::from(value) << 4) & 0x0F_0000) | u32::from(index)
}

impl UsbTransport for DummyHub {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(TransportError::Timeout);
        }
        if self.fail_request == Some(setup.request) {
            return Err(TransportError::Timeout);
        }

        let result = self.dispatch(setup, buf);
        let data = match (setup.direction, &result) {
            (Direction::Out, _) => buf.to_vec(),
            (Direction::In, Ok(n)) => buf[..*n].to_vec(),
            (Direction::In, Err(_)) => Vec::new(),
        };
        self.transfers.push(Transfer {
            setup: *setup,
            data,
        });
        result
    }

    fn device_info(&self) -> UsbDeviceInfo {
        UsbDeviceInfo {
            vendor_id: GENESYS_VID,
            product_id: match self.config.model {
                HubModel::Gl3523 => 0x0610,
                HubModel::Gl3590 => 0x0625,
            },
            usb_version: if self.config.usb3 { 0x0320 } else { 0x0210 },
            release: self.config.release,
        }
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesys_core::image::{DynamicToolString, FirmwareInfoToolString, StaticToolString, VendorSupportToolString};
    use genesys_core::usb::{descriptor_payload, VendorIo};

    #[test]
    fn test_tool_strings_decode() {
        let config = DummyConfig {
            mstar_scaler: 2,
            ..Default::default()
        };
        let ts = StaticToolString::parse(&config.static_tool_string()).unwrap();
        assert_eq!(ts.version(), Some(3));
        assert_eq!(ts.mask_project_ic_type(), b"352310");
        assert_eq!(config.static_tool_string().len(), 31);

        let dyn_ts = DynamicToolString::parse(&config.dynamic_tool_string()).unwrap();
        assert!(!dyn_ts.is_mask_code());

        assert_eq!(config.fw_info_tool_string().len(), FirmwareInfoToolString::SIZE);

        let vs = VendorSupportToolString::parse(&config.vendor_support_tool_string()).unwrap();
        assert_eq!(vs.mstar_scaler(), 2);
        assert_eq!(vs.hp_proprietary(), 1);
    }

    #[test]
    fn test_descriptor_encoding() {
        let hub = DummyHub::new_default().unwrap();
        let mut buf = [0u8; 64];
        let n = hub.string_descriptor(0x84, &mut buf).unwrap();
        assert_eq!(n, 64);
        assert_eq!(buf[0], 64);
        assert_eq!(buf[1], DESCRIPTOR_TYPE_STRING);
        let payload = descriptor_payload(&buf[..n], 64);
        assert_eq!(payload, DummyConfig::default().static_tool_string());
    }

    #[test]
    fn test_firmware_image_parses() {
        let config = DummyConfig::default();
        let img = HubImage::parse(config.firmware_image([0x0A, 0x01]).unwrap()).unwrap();
        assert_eq!(img.model(), HubModel::Gl3523);
        assert_eq!(img.version(), "01.0a");
        assert!(!img.checksum_mismatch());

        let config = DummyConfig {
            model: HubModel::Gl3590,
            ..DummyConfig::default()
        };
        let img = HubImage::parse(config.firmware_image([0x01, 0x01]).unwrap()).unwrap();
        assert_eq!(img.code_size(), 0x8000);
        assert!(!img.checksum_mismatch());
    }

    #[test]
    fn test_flash_refused_outside_isp() {
        let mut hub = DummyHub::new_default().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            hub.vendor_read(0xA2, 0, 0, &mut buf),
            Err(TransportError::Stall)
        );
    }

    #[test]
    fn test_switch_requires_authentication() {
        let mut hub = DummyHub::new_default().unwrap();
        assert!(hub.vendor_write(0xA1, 1, 0, &[]).is_err());

        let check = hub.expected_challenge(2, 5);
        let mut reply = [0u8];
        hub.vendor_read(GL_HUB_VERIFY, 0x0502, 0, &mut reply).unwrap();
        hub.vendor_read(GL_HUB_VERIFY, 0x0502, 1 | (u16::from(check) << 8), &mut reply)
            .unwrap();
        assert_eq!(reply[0], 1);
        hub.vendor_write(0xA1, 1, 0, &[]).unwrap();
        assert!(hub.in_isp());
    }

    #[test]
    fn test_delays_are_recorded() {
        let mut hub = DummyHub::new_default().unwrap();
        hub.delay(Duration::from_millis(30));
        assert_eq!(hub.delays, vec![Duration::from_millis(30)]);
    }

    #[test]
    fn test_parse_options() {
        let config = DummyConfig::parse_options(&[
            ("model", "gl3590"),
            ("usb", "2"),
            ("cs", "no"),
            ("scaler", "2"),
            ("chip", "mx25l4006e"),
        ])
        .unwrap();
        assert_eq!(config.model, HubModel::Gl3590);
        assert!(!config.usb3);
        assert!(!config.code_sign);
        assert_eq!(config.mstar_scaler, 2);
        assert_eq!(config.hub_chip.name, "MX25L4006E");

        assert!(matches!(
            DummyConfig::parse_options(&[("speed", "fast")]),
            Err(Error::InvalidParameter(_))
        ));
    }
}
