//! CLI command implementations
//!
//! Every device command opens one session (hub or scaler, selected with
//! `--target`) over one transport (`dummy` emulator or `usb`) and runs a
//! single operation on it. The session's `Drop` leaves ISP mode if an
//! operation was interrupted.

mod device;
mod dump;
mod info;
mod list;
mod parse;
mod progress;
mod write;

pub use device::{open_session, Session};
pub use dump::run_dump;
pub use info::run_info;
pub use list::list_chips;
pub use parse::run_parse;
pub use write::run_write;
