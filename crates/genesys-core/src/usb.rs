//! USB transport abstraction
//!
//! All vendor protocol framing in this workspace is expressed through the
//! single [`UsbTransport::control_transfer`] primitive. Device enumeration,
//! interface claiming and the like belong to the backend crates
//! (`genesys-nusb`, `genesys-dummy`).

use std::time::Duration;

use thiserror::Error;

/// Timeout used for every vendor control transfer
pub const USB_TIMEOUT: Duration = Duration::from_secs(5);

/// US English language ID for string descriptors
pub const LANGID_EN_US: u16 = 0x0409;

/// Standard GET_DESCRIPTOR request
pub const REQUEST_GET_DESCRIPTOR: u8 = 0x06;

/// String descriptor type
pub const DESCRIPTOR_TYPE_STRING: u8 = 0x03;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Control request type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Standard USB request
    Standard,
    /// Class-specific request
    Class,
    /// Vendor-specific request
    Vendor,
}

/// Control request recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Device
    Device,
    /// Interface
    Interface,
    /// Endpoint
    Endpoint,
    /// Other
    Other,
}

/// Setup packet of a control transfer, minus `wLength` (taken from the buffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    /// Transfer direction
    pub direction: Direction,
    /// Request type
    pub request_type: RequestType,
    /// Recipient
    pub recipient: Recipient,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
}

impl ControlSetup {
    /// Vendor device-to-host request addressed to the device
    pub const fn vendor_in(request: u8, value: u16, index: u16) -> Self {
        Self {
            direction: Direction::In,
            request_type: RequestType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
        }
    }

    /// Vendor host-to-device request addressed to the device
    pub const fn vendor_out(request: u8, value: u16, index: u16) -> Self {
        Self {
            direction: Direction::Out,
            request_type: RequestType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
        }
    }

    /// Standard GET_DESCRIPTOR for a string descriptor
    pub const fn get_string_descriptor(index: u8, langid: u16) -> Self {
        Self {
            direction: Direction::In,
            request_type: RequestType::Standard,
            recipient: Recipient::Device,
            request: REQUEST_GET_DESCRIPTOR,
            value: ((DESCRIPTOR_TYPE_STRING as u16) << 8) | index as u16,
            index: langid,
        }
    }

    /// Encoded bmRequestType byte
    pub fn request_type_byte(&self) -> u8 {
        let dir = match self.direction {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        };
        let kind = match self.request_type {
            RequestType::Standard => 0x00,
            RequestType::Class => 0x20,
            RequestType::Vendor => 0x40,
        };
        let recipient = match self.recipient {
            Recipient::Device => 0x00,
            Recipient::Interface => 0x01,
            Recipient::Endpoint => 0x02,
            Recipient::Other => 0x03,
        };
        dir | kind | recipient
    }
}

/// Static information about the opened USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsbDeviceInfo {
    /// idVendor
    pub vendor_id: u16,
    /// idProduct
    pub product_id: u16,
    /// bcdUSB (0x0300 for USB 3.0)
    pub usb_version: u16,
    /// bcdDevice
    pub release: u16,
}

impl UsbDeviceInfo {
    /// Whether the device enumerated as USB 3.0 or newer
    pub fn is_usb3(&self) -> bool {
        self.usb_version >= 0x300
    }
}

/// Errors reported by a transport backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Transfer did not complete within the timeout
    #[error("transfer timed out")]
    Timeout,
    /// Device stalled the request
    #[error("request stalled")]
    Stall,
    /// Device is gone
    #[error("device disconnected")]
    Disconnected,
    /// Any other backend failure
    #[error("USB transfer failed: {0}")]
    Other(String),
}

/// Synchronous USB control-transfer capability
///
/// Every call blocks until the transfer completes or times out. One
/// transport is owned by exactly one session at a time.
pub trait UsbTransport {
    /// Perform a control transfer
    ///
    /// For [`Direction::In`] the device's data is written into `buf`; for
    /// [`Direction::Out`] `buf` is sent. Returns the number of bytes
    /// transferred.
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Descriptor-level information about the device
    fn device_info(&self) -> UsbDeviceInfo;

    /// Sleep between protocol steps
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: UsbTransport + ?Sized> UsbTransport for &mut T {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).control_transfer(setup, buf, timeout)
    }

    fn device_info(&self) -> UsbDeviceInfo {
        (**self).device_info()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

impl<T: UsbTransport + ?Sized> UsbTransport for Box<T> {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).control_transfer(setup, buf, timeout)
    }

    fn device_info(&self) -> UsbDeviceInfo {
        (**self).device_info()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// Convenience wrappers for the vendor requests used by both device families
pub trait VendorIo: UsbTransport {
    /// Vendor IN request with the default timeout
    fn vendor_read(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let setup = ControlSetup::vendor_in(request, value, index);
        let len = self.control_transfer(&setup, buf, USB_TIMEOUT)?;
        log::trace!(
            "vendor IN  req=0x{:02x} value=0x{:04x} index=0x{:04x} -> {:02x?}",
            request,
            value,
            index,
            &buf[..len.min(buf.len())]
        );
        Ok(len)
    }

    /// Vendor OUT request with the default timeout
    fn vendor_write(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), TransportError> {
        log::trace!(
            "vendor OUT req=0x{:02x} value=0x{:04x} index=0x{:04x} data={:02x?}",
            request,
            value,
            index,
            data
        );
        let setup = ControlSetup::vendor_out(request, value, index);
        let mut buf = data.to_vec();
        self.control_transfer(&setup, &mut buf, USB_TIMEOUT)?;
        Ok(())
    }

    /// Fetch a raw string descriptor (including the 2-byte header)
    fn string_descriptor(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let setup = ControlSetup::get_string_descriptor(index, LANGID_EN_US);
        self.control_transfer(&setup, buf, USB_TIMEOUT)
    }
}

impl<T: UsbTransport + ?Sized> VendorIo for T {}

/// Extract the payload of a vendor tool-string descriptor
///
/// The hub stores one byte per UTF-16LE code unit: skip the length/type
/// header and keep every other byte.
pub fn descriptor_payload(raw: &[u8], max_len: usize) -> Vec<u8> {
    raw.get(2..)
        .unwrap_or(&[])
        .iter()
        .step_by(2)
        .take(max_len)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_byte() {
        assert_eq!(ControlSetup::vendor_in(0x82, 0, 0).request_type_byte(), 0xC0);
        assert_eq!(ControlSetup::vendor_out(0x83, 0, 0).request_type_byte(), 0x40);
        assert_eq!(
            ControlSetup::get_string_descriptor(0x84, LANGID_EN_US).request_type_byte(),
            0x80
        );
    }

    #[test]
    fn test_string_descriptor_value() {
        let setup = ControlSetup::get_string_descriptor(0x83, LANGID_EN_US);
        assert_eq!(setup.value, 0x0383);
        assert_eq!(setup.index, 0x0409);
    }

    #[test]
    fn test_descriptor_payload() {
        let raw = [10, 3, b'3', 0, b'5', 0, b'2', 0, b'3', 0];
        assert_eq!(descriptor_payload(&raw, 31), b"3523".to_vec());
        assert_eq!(descriptor_payload(&raw, 2), b"35".to_vec());
        assert!(descriptor_payload(&[4], 8).is_empty());
    }
}
