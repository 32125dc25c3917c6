//! genesys-nusb - nusb transport for Genesys hubs
//!
//! Implements [`genesys_core::usb::UsbTransport`] with nusb control
//! transfers on interface 0 of the hub, so the same hub and scaler
//! sessions that run against the emulator drive real hardware.
//!
//! # Example
//!
//! ```no_run
//! use genesys_nusb::{parse_options, NusbTransport};
//! use genesys_usbhub::UsbHub;
//!
//! let config = parse_options(&[("pid", "0610")])?;
//! let transport = NusbTransport::open_with_config(&config)?;
//! let hub = UsbHub::open(transport, Default::default())?;
//! println!("{}", hub.identity().model);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `vid=HEX`: vendor ID (default: 05e3)
//! - `pid=HEX`: product ID (default: any)
//! - `device=N` or `index=N`: select the Nth matching device (0-indexed)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod device;
mod error;

pub use device::{parse_options, HubLocation, NusbConfig, NusbTransport, GENESYS_VID};
pub use error::{NusbError, Result};
