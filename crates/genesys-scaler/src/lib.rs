//! genesys-scaler - MStar display scaler behind a Genesys hub
//!
//! Monitors built around a GL3523/GL3590 hub can carry an MStar scaler on
//! the hub's I2C bus. The hub reports the support level in its vendor
//! support tool string and forwards two vendor requests to the scaler.
//!
//! # Protocol Overview
//!
//! - Probe (request 0xA4): support level, version text and the public key
//!   the scaler accepts images for.
//! - ISP entry on the serial debug port: `SERDB`, single step, I2C channel
//!   and bus control, debug mode, write-protect GPIO release and, on MST9U,
//!   pausing the R2 CPU. Then `MSTAR` on the ISP port.
//! - Flash access on the ISP port: every SPI command is framed as data
//!   write (0x10), optional data read (0x11), end (0x12).
//!
//! # Example
//!
//! ```no_run
//! use genesys_core::flash::NoProgress;
//! use genesys_scaler::{parse_options, Scaler};
//! # fn transport() -> genesys_dummy::DummyHub { genesys_dummy::DummyHub::new_default().unwrap() }
//!
//! let config = parse_options(&[("model", "tsum_g")])?;
//! let mut scaler = Scaler::open(transport(), config)?;
//! println!("scaler version {}", scaler.info().version);
//! let firmware = scaler.dump_firmware(&mut NoProgress)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `model=tsum_g|mst9u`: scaler family (default: tsum_g)
//! - `gpio-out=HEX`: write-protect output register
//! - `gpio-en=HEX`: write-protect output-enable register
//! - `gpio-mask=HEX`: write-protect pin bit

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod device;
mod protocol;

pub use device::{parse_options, Scaler, ScalerConfig, ScalerInfo};
pub use genesys_core::{Error, Result};
pub use protocol::{IspStage, ScalerModel, ScalerVendorCommands, WriteProtectGpio};
