//! Flash command layer and generic operations
//!
//! Both device families expose the same handful of SPI primitives over
//! vendor control transfers. [`FlashCommands`] captures those primitives;
//! the functions in this module build identify, erase, program, read and
//! verify on top of them.

mod commands;
#[cfg(test)]
pub(crate) mod mock;
mod operations;
mod progress;

pub use commands::{FlashCommands, StatusPoll};
pub use operations::{
    clear_status_protection, erase_region, identify, program_region, read_region, verify,
};
pub use progress::{NoProgress, Progress};
