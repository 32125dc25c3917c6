//! genesys-core - Core library for Genesys hub and MStar scaler firmware updates
//!
//! This crate holds everything that does not depend on a particular device
//! family or USB backend: the flash chip registry and identifier, the
//! firmware image codec, the [`usb::UsbTransport`] seam, the generic flash
//! command layer and the scoped ISP session helper.
//!
//! # Example
//!
//! ```ignore
//! use genesys_core::{flash, isp::{self, with_isp}};
//!
//! fn probe<D>(dev: &mut D) -> genesys_core::Result<()>
//! where
//!     D: isp::IspDevice + flash::FlashCommands,
//! {
//!     with_isp(dev, |dev| {
//!         let params = flash::identify(dev)?;
//!         println!("Found: {}", params.profile());
//!         Ok(())
//!     })
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chip;
pub mod error;
pub mod flash;
pub mod image;
pub mod isp;
pub mod spi;
pub mod usb;

pub use error::{Error, Result};
