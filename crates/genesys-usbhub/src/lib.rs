//! genesys-usbhub - Genesys Logic GL3523/GL3590 hub firmware update
//!
//! The hubs keep their firmware in a small SPI flash that is reachable
//! through three vendor control requests once the hub is switched into
//! In-System-Programming mode. Hubs with HP code-sign support use a
//! separate request set and must pass a challenge before the switch.
//!
//! # Protocol Overview
//!
//! - Identity comes from vendor string descriptors ("tool strings"):
//!   static (IC type, revision), dynamic (running mode), firmware info and,
//!   from tool-string version 3, vendor support (code sign, scaler).
//! - ISP entry: authenticate (request 0x71), switch request with value 1,
//!   poll the flash status until the hub settles.
//! - Flash access: read/write requests whose `value`/`index` carry the
//!   address or the SPI opcode.
//!
//! # Example
//!
//! ```no_run
//! use genesys_core::flash::NoProgress;
//! use genesys_usbhub::{parse_options, UsbHub};
//! # fn transport() -> genesys_dummy::DummyHub { genesys_dummy::DummyHub::new_default().unwrap() }
//!
//! let config = parse_options(&[("reset", "yes")])?;
//! let mut hub = UsbHub::open(transport(), config)?;
//! println!("{} flash: {:?}", hub.identity().model, hub.flash_chip());
//! let firmware = hub.dump_firmware(&mut NoProgress)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `reset=yes|no`: reset the hub after a successful write
//! - `seed=N`: fixed seed for the authentication challenge

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod device;
mod protocol;

pub use device::{parse_options, DeviceIdentity, HubConfig, UsbHub};
pub use genesys_core::{Error, Result};
pub use protocol::{HubState, IspMode, ModelLayout, VendorCommandSet};
