//! Flash chip profiles and registry
//!
//! The hubs and the scaler only talk to a handful of small serial flash
//! parts. Each part is described once by a [`FlashChipProfile`] in the
//! static [`FLASH_CHIPS`] table; [`crate::flash::identify`] walks that table
//! in order and returns the first profile whose identify response matches.

mod registry;
mod types;

pub use registry::*;
pub use types::*;
