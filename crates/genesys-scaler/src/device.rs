//! MStar scaler session
//!
//! This module provides the [`Scaler`] struct, which drives the serial
//! debug unlock chain of a scaler behind a Genesys hub and exposes its SPI
//! flash through the ISP port.

use std::time::Duration;

use genesys_core::chip::{FlashChipProfile, FlashParams};
use genesys_core::error::{Error, Result, TransportContext};
use genesys_core::flash::{self, FlashCommands, Progress};
use genesys_core::image::scaler::PUBLIC_KEY_SIZE;
use genesys_core::image::{ProtectSector, ScalerImage};
use genesys_core::isp::{with_isp, IspDevice};
use genesys_core::spi::opcodes::{PP, READ, SE_20, WREN, WRSR};
use genesys_core::spi::SECTOR_SIZE;
use genesys_core::usb::{TransportError, UsbTransport, VendorIo};
use genesys_usbhub::DeviceIdentity;

use crate::protocol::*;

/// Configuration options for a scaler session
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    /// Scaler family
    pub model: ScalerModel,
    /// Write-protect pin, defaults to the model's
    pub write_protect: WriteProtectGpio,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            model: ScalerModel::TsumG,
            write_protect: ScalerModel::TsumG.write_protect(),
        }
    }
}

fn parse_hex<T: TryFrom<u32>>(key: &str, value: &str) -> Result<T> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| Error::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
///
/// `model` resets the write-protect pin to that model's default, so the
/// `gpio-*` overrides should follow it.
pub fn parse_options(options: &[(&str, &str)]) -> Result<ScalerConfig> {
    let mut config = ScalerConfig::default();

    for (key, value) in options {
        match *key {
            "model" => {
                config.model = ScalerModel::from_name(value)
                    .ok_or_else(|| Error::InvalidParameter(format!("model: {}", value)))?;
                config.write_protect = config.model.write_protect();
            }
            "gpio-out" => config.write_protect.out_reg = parse_hex(key, value)?,
            "gpio-en" => config.write_protect.en_reg = parse_hex(key, value)?,
            "gpio-mask" => config.write_protect.mask = parse_hex(key, value)?,
            _ => {
                return Err(Error::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// What the scaler reports before ISP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalerInfo {
    /// Update protocol level
    pub level: u8,
    /// Firmware version text
    pub version: String,
    /// Public key block (N and E text)
    pub public_key: Vec<u8>,
}

/// An MStar scaler behind a Genesys hub
pub struct Scaler<T: UsbTransport> {
    transport: T,
    config: ScalerConfig,
    cmds: ScalerVendorCommands,
    stage: IspStage,
    info: ScalerInfo,
    params: Option<FlashParams>,
}

impl<T: UsbTransport> Scaler<T> {
    /// Open the scaler: check hub support, probe, identify the flash
    pub fn open(mut transport: T, config: ScalerConfig) -> Result<Self> {
        let identity = DeviceIdentity::read(&mut transport)?;
        let level = identity.mstar_scaler_support();
        if level == 0 {
            return Err(Error::NotSupported(
                "hub reports no MStar scaler support".into(),
            ));
        }
        let cmds = ScalerVendorCommands::for_support_level(level);
        log::debug!("scaler support level {}, requests {:02x?}", level, cmds);

        let mut scaler = Self {
            transport,
            config,
            cmds,
            stage: IspStage::Normal,
            info: ScalerInfo {
                level: 0,
                version: String::new(),
                public_key: Vec::new(),
            },
            params: None,
        };
        scaler.probe()?;
        let params = with_isp(&mut scaler, |s| flash::identify(s))?;
        scaler.params = Some(params);
        Ok(scaler)
    }

    /// Read level, version and public key
    pub fn probe(&mut self) -> Result<()> {
        let mut level = [0u8; 1];
        self.transport
            .vendor_read(SCALER_INFO, INFO_LEVEL, 0, &mut level)
            .context("error getting level")?;
        self.transport.delay(INFO_SETTLE);

        let mut version = [0u8; VERSION_LEN];
        self.transport
            .vendor_read(SCALER_INFO, INFO_VERSION, 0, &mut version)
            .context("error getting version")?;
        self.transport.delay(INFO_SETTLE);

        let mut public_key = vec![0u8; PUBLIC_KEY_SIZE];
        let mut offset = 0usize;
        for chunk in public_key.chunks_mut(PUBLIC_KEY_CHUNK) {
            self.transport
                .vendor_read(SCALER_INFO, INFO_PUBLIC_KEY, offset as u16, chunk)
                .context("error getting public key")?;
            self.transport.delay(INFO_SETTLE);
            offset += chunk.len();
        }

        // the first byte is not part of the version text
        let text = &version[1..10];
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        self.info = ScalerInfo {
            level: level[0],
            version: String::from_utf8_lossy(&text[..end]).into_owned(),
            public_key,
        };
        log::info!(
            "MStar {} scaler, version {}, level {}",
            self.config.model,
            self.info.version,
            self.info.level
        );
        Ok(())
    }

    /// Underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Probe results
    pub fn info(&self) -> &ScalerInfo {
        &self.info
    }

    /// Scaler family
    pub fn model(&self) -> ScalerModel {
        self.config.model
    }

    /// Vendor requests in use
    pub fn vendor_commands(&self) -> ScalerVendorCommands {
        self.cmds
    }

    /// How far the entry chain got
    pub fn stage(&self) -> IspStage {
        self.stage
    }

    /// Identified flash parameters
    pub fn flash_params(&self) -> Option<&FlashParams> {
        self.params.as_ref()
    }

    /// Identified flash chip
    pub fn flash_chip(&self) -> Option<&'static FlashChipProfile> {
        self.params.map(|p| p.profile())
    }

    /// Read the whole flash
    pub fn dump_firmware(&mut self, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        let chip = self.flash_chip().ok_or(Error::UnknownFlashChip)?;
        let mut buf = vec![0u8; chip.total_size as usize];
        with_isp(self, |s| flash::read_region(s, 0, &mut buf, progress))?;
        progress.finish();
        Ok(buf)
    }

    /// Write the payload of `image` at its footer address
    ///
    /// Sectors inside the footer's protect ranges are neither erased nor
    /// programmed.
    pub fn write_firmware(
        &mut self,
        image: &ScalerImage,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        if image.footer().public_key() != self.info.public_key.as_slice() {
            return Err(Error::PublicKeyMismatch);
        }
        let chip = self.flash_chip().ok_or(Error::UnknownFlashChip)?;
        let addr = image.addr();
        let payload = image.payload();
        if addr % SECTOR_SIZE != 0 {
            return Err(Error::InvalidParameter(format!(
                "image address 0x{:x} is not sector aligned",
                addr
            )));
        }
        if addr as usize + payload.len() > chip.total_size as usize {
            return Err(Error::InvalidParameter(format!(
                "image does not fit in {} ({} bytes at 0x{:x})",
                chip,
                payload.len(),
                addr
            )));
        }

        let protect = image.footer().protect_sectors();
        let ranges = writable_ranges(addr, payload.len(), &protect);
        log::info!(
            "Writing {} bytes to 0x{:06x} in {} range(s)",
            payload.len(),
            addr,
            ranges.len()
        );

        with_isp(self, |s| {
            flash::clear_status_protection(s)?;
            for &(start, len) in &ranges {
                let offset = (start - addr) as usize;
                let data = &payload[offset..offset + len];
                flash::erase_region(s, start, len, progress)?;
                flash::program_region(s, start, data, progress)?;
                flash::verify(s, start, data, progress)?;
            }
            Ok(())
        })?;
        progress.finish();
        Ok(())
    }

    fn debug_write(&mut self, data: &[u8], what: &str) -> Result<()> {
        self.transport
            .vendor_write(self.cmds.write, PORT_DEBUG, 0, data)
            .with_context(|| format!("error {}", what))
    }

    fn debug_write_bytes(&mut self, bytes: &[u8], what: &str) -> Result<()> {
        for &b in bytes {
            self.debug_write(&[b], what)?;
        }
        Ok(())
    }

    fn read_register(&mut self, select: &[u8]) -> Result<u8> {
        let mut frame = vec![REG_WRITE];
        frame.extend_from_slice(select);
        self.debug_write(&frame, "selecting register")?;
        let mut value = [0u8; 1];
        self.transport
            .vendor_read(self.cmds.read, PORT_DEBUG, 0, &mut value)
            .context("error reading register")?;
        Ok(value[0])
    }

    fn write_register(&mut self, select: &[u8], value: u8) -> Result<()> {
        let mut frame = vec![REG_WRITE];
        frame.extend_from_slice(select);
        frame.push(value);
        self.debug_write(&frame, "writing register")
    }

    fn disable_write_protect(&mut self) -> Result<()> {
        let gpio = self.config.write_protect;

        let out_reg = gpio.out_reg.to_be_bytes();
        let out = self.read_register(&out_reg)?;
        let out = if gpio.release_high {
            out | gpio.mask
        } else {
            out & !gpio.mask
        };
        self.write_register(&out_reg, out)?;

        let en_reg = gpio.en_reg.to_be_bytes();
        let en = self.read_register(&en_reg)?;
        self.write_register(&en_reg, en & !gpio.mask)?;
        log::debug!("write protect released (out 0x{:02x})", out);
        Ok(())
    }

    fn pause_r2_cpu(&mut self) -> Result<()> {
        let value = self.read_register(&R2_CONTROL_REG)?;
        self.write_register(&R2_CONTROL_REG, value | R2_PAUSE)?;
        self.transport.delay(R2_PAUSE_SETTLE);
        Ok(())
    }

    fn isp_port_write(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.transport.vendor_write(self.cmds.write, PORT_ISP, 0, data)
    }

    fn enter_isp_port(&mut self) -> Result<()> {
        if let Err(e) = self.isp_port_write(ISP_ENTER) {
            log::debug!("ISP unlock failed ({}), retrying", e);
            self.isp_port_write(ISP_ENTER)
                .context("error entering ISP mode")?;
        }
        self.transport.delay(SERIAL_SETTLE);
        Ok(())
    }

    fn check_isp(&self) -> Result<()> {
        if self.stage == IspStage::EnteredIsp {
            Ok(())
        } else {
            Err(Error::NotInIspMode)
        }
    }

    /// Run one flash command: write frame, optional read, end
    fn flash_command(
        &mut self,
        frame: &[u8],
        response: Option<&mut [u8]>,
        what: &str,
    ) -> Result<()> {
        self.check_isp()?;
        self.isp_port_write(frame)
            .with_context(|| format!("error {}", what))?;
        if let Some(buf) = response {
            self.isp_port_write(&[CMD_DATA_READ])
                .with_context(|| format!("error {}", what))?;
            self.transport
                .vendor_read(self.cmds.read, PORT_ISP, 0, buf)
                .with_context(|| format!("error {}", what))?;
        }
        self.isp_port_write(&[CMD_DATA_END])
            .with_context(|| format!("error {}", what))
    }
}

/// Sector-aligned subranges of `[addr, addr + len)` outside every protect range
fn writable_ranges(addr: u32, len: usize, protect: &[ProtectSector]) -> Vec<(u32, usize)> {
    let end = addr + len as u32;
    let mut ranges: Vec<(u32, usize)> = Vec::new();
    let mut sector = addr;
    while sector < end {
        let next = (sector + SECTOR_SIZE).min(end);
        let size = next - sector;
        if protect.iter().any(|p| p.overlaps(sector, size)) {
            log::debug!("skipping protected sector @0x{:06x}", sector);
        } else {
            match ranges.last_mut() {
                Some((start, len)) if *start + *len as u32 == sector => *len += size as usize,
                _ => ranges.push((sector, size as usize)),
            }
        }
        sector = next;
    }
    ranges
}

impl<T: UsbTransport> IspDevice for Scaler<T> {
    fn enter_isp(&mut self) -> Result<()> {
        if self.stage != IspStage::Normal {
            return Err(Error::AlreadyInIspMode);
        }
        let model = self.config.model;

        self.debug_write(SERIAL_DEBUG_ENTER, "entering serial debug mode")?;
        self.transport.delay(SERIAL_SETTLE);
        self.stage = IspStage::SerialDebug;

        for step in SINGLE_STEP_ENTER {
            self.debug_write(step, "entering single step mode")?;
        }
        self.stage = IspStage::SingleStep;

        self.debug_write_bytes(I2C_CHANNEL_0, "switching I2C channel 0")?;
        self.stage = IspStage::I2cChannelSelected;

        self.debug_write(DEBUG_MODE_ENTER, "entering debug mode")?;
        self.stage = IspStage::DebugMode;

        self.debug_write_bytes(I2C_BUS_CONTROL, "taking I2C bus control")?;
        self.disable_write_protect()?;
        self.stage = IspStage::WriteProtectDisabled;

        if model.has_r2_cpu() {
            self.debug_write_bytes(I2C_CHANNEL_4, "switching I2C channel 4")?;
            self.debug_write_bytes(I2C_BUS_CONTROL, "taking I2C bus control")?;
            self.pause_r2_cpu()?;
            self.stage = IspStage::PowerPaused;
        }

        self.enter_isp_port()?;
        self.stage = IspStage::EnteredIsp;
        log::debug!("scaler entered ISP mode");
        Ok(())
    }

    fn exit_isp(&mut self) -> Result<()> {
        let stage = self.stage;
        self.stage = IspStage::Normal;
        let mut first_err = None;

        if stage >= IspStage::SingleStep {
            if let Err(e) = self.debug_write(SINGLE_STEP_EXIT, "exiting single step mode") {
                first_err.get_or_insert(e);
            }
        }
        if stage >= IspStage::SerialDebug {
            if let Err(e) = self.debug_write(SERIAL_DEBUG_EXIT, "exiting serial debug mode") {
                first_err.get_or_insert(e);
            }
        }
        if stage == IspStage::EnteredIsp {
            if let Err(e) = self
                .isp_port_write(ISP_EXIT)
                .context("error exiting ISP mode")
            {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn in_isp(&self) -> bool {
        self.stage == IspStage::EnteredIsp
    }
}

impl<T: UsbTransport> FlashCommands for Scaler<T> {
    fn chip_params(&self) -> Option<FlashParams> {
        self.params
    }

    fn read_id(&mut self, profile: &FlashChipProfile, buf: &mut [u8]) -> Result<()> {
        let dummy: &[u8] = if profile.dummy_address { &[0, 0, 0] } else { &[] };
        let frame = data_write(profile.id_opcode, None, dummy);
        self.flash_command(&frame, Some(buf), "reading flash chip")
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let mut cur = addr;
        for chunk in buf.chunks_mut(TRANSFER_SIZE) {
            let frame = data_write(READ, Some(cur), &[]);
            let what = format!("reading flash at @0x{:x}", cur);
            self.flash_command(&frame, Some(chunk), &what)?;
            cur += chunk.len() as u32;
        }
        Ok(())
    }

    fn write_enable(&mut self) -> Result<()> {
        self.flash_command(&data_write(WREN, None, &[]), None, "enabling flash write")
    }

    fn write_status(&mut self, value: u8) -> Result<()> {
        self.flash_command(
            &data_write(WRSR, None, &[value]),
            None,
            "writing flash status register",
        )
    }

    fn sector_erase(&mut self, addr: u32) -> Result<()> {
        let what = format!("erasing flash at @0x{:x}", addr);
        self.flash_command(&data_write(SE_20, Some(addr), &[]), None, &what)
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let what = format!("writing flash at @0x{:x}", addr);
        self.flash_command(&data_write(PP, Some(addr), data), None, &what)
    }

    fn read_status(&mut self, register: u8) -> Result<u8> {
        let mut status = [0u8; 1];
        let what = format!("getting flash status register (0x{:02x})", register);
        self.flash_command(&data_write(register, None, &[]), Some(&mut status[..]), &what)?;
        Ok(status[0])
    }

    fn status_mask(&self) -> u8 {
        STATUS_BUSY_MASK
    }

    fn delay(&mut self, duration: Duration) {
        self.transport.delay(duration);
    }
}

impl<T: UsbTransport> Drop for Scaler<T> {
    fn drop(&mut self) {
        if self.stage != IspStage::Normal {
            if let Err(e) = self.exit_isp() {
                log::warn!("failed to leave scaler ISP mode on close: {}", e);
            }
        }
    }
}
