//! Genesys hub session
//!
//! This module provides the [`UsbHub`] struct, which owns one transport to a
//! GL3523/GL3590 hub and implements its ISP state machine and flash access.

use std::time::Duration;

use genesys_core::chip::{FlashChipProfile, FlashParams};
use genesys_core::error::{Error, Result, TransportContext};
use genesys_core::flash::{self, FlashCommands, Progress, StatusPoll};
use genesys_core::image::hub::{CODE_SIZE_OFFSET, SIGNATURE_OFFSET};
use genesys_core::image::tool_string::TOOL_STRING_VERSION_VENDOR_SUPPORT;
use genesys_core::image::{
    DynamicToolString, FirmwareInfoToolString, HubImage, HubModel, StaticToolString,
    VendorSupportToolString,
};
use genesys_core::isp::{with_isp, IspDevice};
use genesys_core::spi::opcodes::{SE_20, WREN, WRSR};
use genesys_core::usb::{descriptor_payload, UsbDeviceInfo, UsbTransport, VendorIo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::*;

/// Configuration options for a hub session
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Reset the hub after a successful write
    pub reset_after_write: bool,
    /// Fixed seed for the authentication challenge
    pub seed: Option<u64>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(Error::InvalidParameter(format!("{}: {}", key, value))),
    }
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<HubConfig> {
    let mut config = HubConfig::default();

    for (key, value) in options {
        match *key {
            "reset" => config.reset_after_write = parse_bool(key, value)?,
            "seed" => {
                config.seed = Some(
                    value
                        .parse()
                        .map_err(|_| Error::InvalidParameter(format!("seed: {}", value)))?,
                );
            }
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

/// Everything the hub reports about itself before ISP
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Static tool string
    pub static_tool_string: StaticToolString,
    /// Dynamic tool string
    pub dynamic_tool_string: DynamicToolString,
    /// Firmware-info tool string
    pub fw_info: FirmwareInfoToolString,
    /// Vendor-support tool string, reported from tool-string version 3 on
    pub vendor_support: Option<VendorSupportToolString>,
    /// Hub model
    pub model: HubModel,
    /// Two-digit IC revision
    pub revision: u8,
    /// Running mask ROM code
    pub is_mask_code: bool,
    /// USB descriptor information
    pub usb: UsbDeviceInfo,
}

impl DeviceIdentity {
    /// Read and decode the tool strings of the hub behind `transport`
    pub fn read<T: UsbTransport + ?Sized>(transport: &mut T) -> Result<Self> {
        let usb = transport.device_info();
        let (static_idx, dynamic_idx) = if usb.is_usb3() {
            (STATIC_TOOL_DESC_IDX_USB3, DYNAMIC_TOOL_DESC_IDX_USB3)
        } else {
            (STATIC_TOOL_DESC_IDX_USB2, DYNAMIC_TOOL_DESC_IDX_USB2)
        };

        let raw = read_tool_string(transport, static_idx, "static tool info")?;
        let static_tool_string = StaticToolString::parse(&raw)?;
        if static_tool_string.version().is_none() {
            return Err(Error::NotSupported(
                "static tool string not supported".into(),
            ));
        }
        let model = HubModel::from_ic_type(static_tool_string.mask_project_ic_type())
            .ok_or_else(|| Error::NotSupported("unknown ISP model".into()))?;
        let revision = static_tool_string.ic_revision().unwrap_or(0);

        let raw = read_tool_string(transport, dynamic_idx, "dynamic tool info")?;
        let dynamic_tool_string = DynamicToolString::parse(&raw)?;

        let raw = read_tool_string(transport, FW_INFO_DESC_IDX, "firmware info")?;
        let fw_info = FirmwareInfoToolString::parse(&raw)?;

        let vendor_support = match static_tool_string.version() {
            Some(v) if v >= TOOL_STRING_VERSION_VENDOR_SUPPORT => {
                let raw =
                    read_tool_string(transport, VENDOR_SUPPORT_DESC_IDX, "vendor support info")?;
                Some(VendorSupportToolString::parse(&raw)?)
            }
            _ => None,
        };

        log::info!(
            "Genesys {}-{:02} hub, {} code",
            model,
            revision,
            if dynamic_tool_string.is_mask_code() {
                "mask"
            } else {
                "bank"
            }
        );

        Ok(Self {
            static_tool_string,
            is_mask_code: dynamic_tool_string.is_mask_code(),
            dynamic_tool_string,
            fw_info,
            vendor_support,
            model,
            revision,
            usb,
        })
    }

    /// Vendor request set implied by the vendor-support string
    pub fn vendor_commands(&self) -> VendorCommandSet {
        VendorCommandSet::for_hp_proprietary(
            self.vendor_support
                .map(|vs| vs.hp_proprietary())
                .unwrap_or(0),
        )
    }

    /// MStar scaler support level, 0 when not reported
    pub fn mstar_scaler_support(&self) -> u8 {
        self.vendor_support
            .map(|vs| vs.mstar_scaler())
            .unwrap_or(0)
    }
}

fn read_tool_string<T: UsbTransport + ?Sized>(
    transport: &mut T,
    index: u8,
    what: &str,
) -> Result<Vec<u8>> {
    let mut buf = [0u8; TOOL_DESC_LEN];
    let len = transport
        .string_descriptor(index, &mut buf)
        .with_context(|| format!("failed to get {} from device", what))?;
    let payload = descriptor_payload(&buf[..len.min(buf.len())], TOOL_DESC_LEN);
    log::trace!("{} (0x{:02x}): {:02x?}", what, index, payload);
    Ok(payload)
}

/// A Genesys GL3523/GL3590 hub
pub struct UsbHub<T: UsbTransport> {
    transport: T,
    config: HubConfig,
    identity: DeviceIdentity,
    cmds: VendorCommandSet,
    state: HubState,
    params: Option<FlashParams>,
    flash_rw_size: usize,
    layout: ModelLayout,
    code_size: usize,
    rng: StdRng,
}

impl<T: UsbTransport> UsbHub<T> {
    /// Open a hub: read its identity, then identify the flash inside ISP
    pub fn open(transport: T, config: HubConfig) -> Result<Self> {
        let mut hub = Self::new(transport, config)?;
        with_isp(&mut hub, |hub| hub.probe_flash())?;
        Ok(hub)
    }

    /// Read the identity only; flash parameters stay unknown
    pub fn new(mut transport: T, config: HubConfig) -> Result<Self> {
        let identity = DeviceIdentity::read(&mut transport)?;
        let cmds = identity.vendor_commands();
        let layout = ModelLayout::for_model(identity.model, identity.revision);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        log::debug!("using vendor requests {:02x?}", cmds);

        Ok(Self {
            transport,
            config,
            identity,
            cmds,
            state: HubState::Normal,
            params: None,
            flash_rw_size: 0,
            layout,
            code_size: layout.code_size.unwrap_or(0),
            rng,
        })
    }

    /// Identify the flash chip and derive the firmware layout
    ///
    /// Requires ISP mode.
    pub fn probe_flash(&mut self) -> Result<()> {
        let params = flash::identify(self)?;
        let chip = params.profile();
        self.flash_rw_size = flash_rw_size(
            chip.write_length,
            chip.aai,
            self.identity.model,
            self.identity.revision,
            self.identity.is_mask_code,
            self.identity.usb.is_usb3(),
        );
        self.params = Some(params);
        log::debug!("flash transfer size {}", self.flash_rw_size);

        if self.layout.code_size.is_none() {
            self.code_size = self.code_size_from_flash(0)?;
        }
        log::info!(
            "Code size 0x{:x}, extend size 0x{:x}",
            self.code_size,
            self.layout.extend_size
        );
        Ok(())
    }

    /// Read the code size stored in the image in `bank`
    fn code_size_from_flash(&mut self, bank: usize) -> Result<usize> {
        let base = self.layout.bank_addr[bank];
        let mut sig = [0u8; 4];
        self.read_flash(base + SIGNATURE_OFFSET as u32, &mut sig)?;
        if &sig != FW_SIG_TEXT {
            return Err(Error::InvalidResponse(format!(
                "wrong firmware signature in bank {}",
                bank
            )));
        }
        let mut kbs = [0u8; 1];
        self.read_flash(base + CODE_SIZE_OFFSET as u32, &mut kbs)?;
        Ok(1024 * usize::from(kbs[0]))
    }

    /// Underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Hub identity
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Vendor requests in use
    pub fn vendor_commands(&self) -> VendorCommandSet {
        self.cmds
    }

    /// Identified flash parameters, once probed
    pub fn flash_params(&self) -> Option<&FlashParams> {
        self.params.as_ref()
    }

    /// Identified flash chip, once probed
    pub fn flash_chip(&self) -> Option<&'static FlashChipProfile> {
        self.params.map(|p| p.profile())
    }

    /// Largest flash transfer
    pub fn flash_rw_size(&self) -> usize {
        self.flash_rw_size
    }

    /// Code size of the installed firmware
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    /// Trailer size after the code
    pub fn extend_size(&self) -> usize {
        self.layout.extend_size
    }

    /// Flash layout of this model
    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    /// Current session state
    pub fn state(&self) -> HubState {
        self.state
    }

    /// Run the authentication challenge
    ///
    /// Only code-signed hubs authenticate; others fail with
    /// [`Error::NotSupported`].
    pub fn authenticate(&mut self) -> Result<()> {
        if !self.cmds.is_cs_isp() {
            return Err(Error::NotSupported(
                "device authentication not supported".into(),
            ));
        }

        let release = self.identity.usb.release;
        let mut challenge = (release & 0xFF) as u8 ^ (release >> 8) as u8;
        let start = self
            .rng
            .gen_range(ENCRYPT_REGION_START..ENCRYPT_REGION_END - 1);
        let end = self.rng.gen_range(start + 1..ENCRYPT_REGION_END);
        let fw_info = self.identity.fw_info.as_bytes();
        for i in start..=end {
            challenge ^= fw_info[usize::from(i)];
        }
        log::debug!(
            "authenticating with fw info [{}..={}], check 0x{:02x}",
            start,
            end,
            challenge
        );

        let value = (u16::from(end) << 8) | u16::from(start);
        let mut reply = [0u8; 1];
        self.transport
            .vendor_read(GL_HUB_VERIFY, value, 0, &mut reply)
            .context("error authenticating device: control transfer error (req: 0x71)")?;
        self.transport
            .vendor_read(
                GL_HUB_VERIFY,
                value,
                1 | (u16::from(challenge) << 8),
                &mut reply,
            )
            .context("error authenticating device: control transfer error (req: 0x71)")?;
        if reply[0] != 1 {
            return Err(Error::AuthenticationFailed);
        }

        self.state = HubState::Authenticated;
        Ok(())
    }

    /// Switch ISP mode and wait for the hub to settle
    pub fn set_isp_mode(&mut self, mode: IspMode) -> Result<()> {
        self.transport
            .vendor_write(self.cmds.switch, mode as u16, 0, &[])
            .with_context(|| {
                format!(
                    "error setting isp mode - control transfer error (reg 0x{:02x})",
                    self.cmds.switch
                )
            })?;

        match mode {
            IspMode::Enter => {
                let previous = self.state;
                self.state = HubState::EnteredIsp;
                if let Err(e) = self.wait_status(&StatusPoll::HUB_ISP_SWITCH) {
                    self.state = previous;
                    return Err(e);
                }
            }
            IspMode::Exit => {
                let result = self.wait_status(&StatusPoll::HUB_ISP_SWITCH);
                self.state = HubState::Normal;
                result?;
            }
        }
        Ok(())
    }

    /// Reset the hub so it boots the new firmware
    pub fn reset(&mut self) -> Result<()> {
        self.transport
            .vendor_write(self.cmds.switch, SWITCH_RESET, 0, &[])
            .context("error resetting device")?;
        self.state = HubState::Normal;
        Ok(())
    }

    /// Read the installed firmware (code plus trailer) from bank 0
    pub fn dump_firmware(&mut self, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        let size = self.code_size + self.layout.extend_size;
        let base = self.layout.bank_addr[0];
        let mut buf = vec![0u8; size];
        with_isp(self, |hub| flash::read_region(hub, base, &mut buf, progress))?;
        progress.finish();
        Ok(buf)
    }

    /// Write `image` to bank 0
    pub fn write_firmware(&mut self, image: &HubImage, progress: &mut dyn Progress) -> Result<()> {
        if image.model() != self.identity.model {
            return Err(Error::NotSupported(format!(
                "firmware is for {}, device is {}",
                image.model(),
                self.identity.model
            )));
        }
        if image.checksum_mismatch() {
            log::warn!("writing an image whose checksum does not match");
        }

        let base = self.layout.bank_addr[0];
        let code = image.code();
        log::info!(
            "Writing {} bytes of firmware {} to 0x{:06x}",
            code.len(),
            image.version(),
            base
        );
        with_isp(self, |hub| {
            flash::erase_region(hub, base, code.len(), progress)?;
            flash::program_region(hub, base, code, progress)?;
            flash::verify(hub, base, code, progress)
        })?;
        progress.finish();

        if self.config.reset_after_write {
            self.reset()?;
        }
        Ok(())
    }

    fn check_isp(&self) -> Result<()> {
        if self.state == HubState::EnteredIsp {
            Ok(())
        } else {
            Err(Error::NotInIspMode)
        }
    }

    fn chunk_size(&self) -> usize {
        // before identification only tiny reads are issued
        if self.flash_rw_size == 0 {
            USB2_RW_SIZE
        } else {
            self.flash_rw_size
        }
    }
}

impl<T: UsbTransport> IspDevice for UsbHub<T> {
    fn enter_isp(&mut self) -> Result<()> {
        if self.state == HubState::EnteredIsp {
            return Err(Error::AlreadyInIspMode);
        }
        self.authenticate()?;
        self.set_isp_mode(IspMode::Enter)?;
        log::debug!("entered ISP mode");
        Ok(())
    }

    fn exit_isp(&mut self) -> Result<()> {
        match self.state {
            HubState::EnteredIsp => {
                self.set_isp_mode(IspMode::Exit)?;
                log::debug!("left ISP mode");
            }
            HubState::Authenticated => self.state = HubState::Normal,
            HubState::Normal => {}
        }
        Ok(())
    }

    fn in_isp(&self) -> bool {
        self.state == HubState::EnteredIsp
    }
}

impl<T: UsbTransport> FlashCommands for UsbHub<T> {
    fn chip_params(&self) -> Option<FlashParams> {
        self.params
    }

    fn read_id(&mut self, profile: &FlashChipProfile, buf: &mut [u8]) -> Result<()> {
        self.check_isp()?;
        let value = identify_value(profile.id_opcode, profile.dummy_address);
        self.transport
            .vendor_read(self.cmds.read, value, 0, buf)
            .context("error reading flash chip")?;
        Ok(())
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.check_isp()?;
        let chunk_size = self.chunk_size();
        let mut cur = addr;
        for chunk in buf.chunks_mut(chunk_size) {
            let (value, index) = address_setup(cur);
            self.transport
                .vendor_read(self.cmds.read, value, index, chunk)
                .with_context(|| format!("error reading flash at @0x{:x}", cur))?;
            cur += chunk.len() as u32;
        }
        Ok(())
    }

    fn write_enable(&mut self) -> Result<()> {
        self.check_isp()?;
        self.transport
            .vendor_write(self.cmds.write, opcode_value(WREN), 0, &[])
            .context("error enabling flash write")
    }

    fn write_status(&mut self, value: u8) -> Result<()> {
        self.check_isp()?;
        self.transport
            .vendor_write(self.cmds.write, opcode_value(WRSR), 0, &[value])
            .context("error writing flash status register")
    }

    fn sector_erase(&mut self, addr: u32) -> Result<()> {
        self.check_isp()?;
        let (value, index) = erase_setup(SE_20, addr);
        self.transport
            .vendor_write(self.cmds.write, value, index, &[])
            .with_context(|| format!("error erasing flash at @0x{:x}", addr))
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_isp()?;
        let chunk_size = self.chunk_size();
        let mut cur = addr;
        for chunk in data.chunks(chunk_size) {
            let (value, index) = address_setup(cur);
            self.transport
                .vendor_write(self.cmds.write, value, index, chunk)
                .with_context(|| format!("error writing flash at @0x{:x}", cur))?;
            cur += chunk.len() as u32;
        }
        Ok(())
    }

    fn read_status(&mut self, register: u8) -> Result<u8> {
        self.check_isp()?;
        let mut status = [0u8; 1];
        self.transport
            .vendor_read(self.cmds.read, opcode_value(register), 0, &mut status)
            .with_context(|| format!("error getting flash status register (0x{:02x})", register))?;
        Ok(status[0])
    }

    fn delay(&mut self, duration: Duration) {
        self.transport.delay(duration);
    }
}

impl<T: UsbTransport> Drop for UsbHub<T> {
    fn drop(&mut self) {
        if self.state != HubState::Normal {
            if let Err(e) = self.exit_isp() {
                log::warn!("failed to leave ISP mode on close: {}", e);
            }
        }
    }
}
