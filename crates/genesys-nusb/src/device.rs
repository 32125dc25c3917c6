//! nusb transport
//!
//! This module provides [`NusbTransport`], which implements
//! [`UsbTransport`] on top of a claimed nusb interface.

use std::time::Duration;

use genesys_core::usb::{
    ControlSetup, Direction, Recipient, RequestType, TransportError, UsbDeviceInfo, UsbTransport,
};
use nusb::transfer::{ControlIn, ControlOut, ControlType};
use nusb::{Interface, MaybeFuture};

use crate::error::{NusbError, Result};

/// Genesys Logic USB vendor ID
pub const GENESYS_VID: u16 = 0x05E3;

/// Configuration options for opening a hub
#[derive(Debug, Clone)]
pub struct NusbConfig {
    /// Vendor ID to match
    pub vid: u16,
    /// Product ID to match, any when unset
    pub pid: Option<u16>,
    /// Index among matching devices
    pub index: usize,
}

impl Default for NusbConfig {
    fn default() -> Self {
        Self {
            vid: GENESYS_VID,
            pid: None,
            index: 0,
        }
    }
}

fn parse_id(key: &str, value: &str) -> Result<u16> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map_err(|_| NusbError::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<NusbConfig> {
    let mut config = NusbConfig::default();

    for (key, value) in options {
        match *key {
            "vid" => config.vid = parse_id(key, value)?,
            "pid" => config.pid = Some(parse_id(key, value)?),
            "device" | "index" => {
                config.index = value
                    .parse()
                    .map_err(|_| NusbError::InvalidParameter(format!("{}: {}", key, value)))?;
            }
            _ => {
                return Err(NusbError::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// Bus location of a matching device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubLocation {
    /// Bus number
    pub bus: u8,
    /// Device address
    pub address: u8,
    /// Product ID
    pub pid: u16,
}

/// A Genesys hub opened through nusb
pub struct NusbTransport {
    interface: Interface,
    info: UsbDeviceInfo,
}

impl NusbTransport {
    /// Open the first hub matching the default configuration
    pub fn open() -> Result<Self> {
        Self::open_with_config(&NusbConfig::default())
    }

    /// Open the hub selected by `config`
    pub fn open_with_config(config: &NusbConfig) -> Result<Self> {
        let devices = matching_devices(config)?;
        let device_info = devices.get(config.index).ok_or(NusbError::DeviceNotFound {
            vid: config.vid,
            pid: config.pid,
        })?;

        log::info!(
            "Opening hub {:04x}:{:04x} at bus {} address {}",
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| NusbError::OpenFailed(e.to_string()))?;

        let desc = device.device_descriptor();
        let info = UsbDeviceInfo {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            usb_version: desc.usb_version(),
            release: desc.device_version(),
        };
        log::debug!(
            "bcdUSB {:04x}, bcdDevice {:04x}",
            info.usb_version,
            info.release
        );

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| NusbError::ClaimFailed(e.to_string()))?;

        Ok(Self { interface, info })
    }

    /// List the hubs matching `config`
    pub fn list_devices(config: &NusbConfig) -> Result<Vec<HubLocation>> {
        Ok(matching_devices(config)?
            .iter()
            .map(|d| HubLocation {
                bus: d.busnum(),
                address: d.device_address(),
                pid: d.product_id(),
            })
            .collect())
    }
}

fn matching_devices(config: &NusbConfig) -> Result<Vec<nusb::DeviceInfo>> {
    Ok(nusb::list_devices()
        .wait()
        .map_err(|e| NusbError::ListFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == config.vid && config.pid.map_or(true, |p| d.product_id() == p))
        .collect())
}

fn control_type(request_type: RequestType) -> ControlType {
    match request_type {
        RequestType::Standard => ControlType::Standard,
        RequestType::Class => ControlType::Class,
        RequestType::Vendor => ControlType::Vendor,
    }
}

fn recipient(recipient: Recipient) -> nusb::transfer::Recipient {
    match recipient {
        Recipient::Device => nusb::transfer::Recipient::Device,
        Recipient::Interface => nusb::transfer::Recipient::Interface,
        Recipient::Endpoint => nusb::transfer::Recipient::Endpoint,
        Recipient::Other => nusb::transfer::Recipient::Other,
    }
}

fn transfer_error(e: nusb::transfer::TransferError) -> TransportError {
    match e {
        // nusb cancels transfers that hit their timeout
        nusb::transfer::TransferError::Cancelled => TransportError::Timeout,
        nusb::transfer::TransferError::Stall => TransportError::Stall,
        nusb::transfer::TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::Other(other.to_string()),
    }
}

impl UsbTransport for NusbTransport {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        let length = u16::try_from(buf.len())
            .map_err(|_| TransportError::Other(format!("transfer too long: {}", buf.len())))?;

        match setup.direction {
            Direction::In => {
                let data = self
                    .interface
                    .control_in(
                        ControlIn {
                            control_type: control_type(setup.request_type),
                            recipient: recipient(setup.recipient),
                            request: setup.request,
                            value: setup.value,
                            index: setup.index,
                            length,
                        },
                        timeout,
                    )
                    .wait()
                    .map_err(transfer_error)?;
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Direction::Out => {
                self.interface
                    .control_out(
                        ControlOut {
                            control_type: control_type(setup.request_type),
                            recipient: recipient(setup.recipient),
                            request: setup.request,
                            value: setup.value,
                            index: setup.index,
                            data: buf,
                        },
                        timeout,
                    )
                    .wait()
                    .map_err(transfer_error)?;
                Ok(buf.len())
            }
        }
    }

    fn device_info(&self) -> UsbDeviceInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_defaults() {
        let config = parse_options(&[]).unwrap();
        assert_eq!(config.vid, 0x05E3);
        assert_eq!(config.pid, None);
        assert_eq!(config.index, 0);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("pid", "0x0610"), ("index", "1")]).unwrap();
        assert_eq!(config.pid, Some(0x0610));
        assert_eq!(config.index, 1);

        let config = parse_options(&[("vid", "1d5c")]).unwrap();
        assert_eq!(config.vid, 0x1D5C);
    }

    #[test]
    fn test_parse_options_rejects() {
        assert!(matches!(
            parse_options(&[("pid", "zz")]),
            Err(NusbError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("speed", "fast")]),
            Err(NusbError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_transfer_error_mapping() {
        assert_eq!(
            transfer_error(nusb::transfer::TransferError::Stall),
            TransportError::Stall
        );
        assert_eq!(
            transfer_error(nusb::transfer::TransferError::Cancelled),
            TransportError::Timeout
        );
    }
}
