//! Scoped ISP sessions

use crate::error::{Error, Result};

/// A device that must be switched into In-System-Programming mode before
/// its flash can be touched
pub trait IspDevice {
    /// Run the device-specific entry sequence
    ///
    /// Fails with [`Error::AlreadyInIspMode`] when called twice without an
    /// exit in between.
    fn enter_isp(&mut self) -> Result<()>;

    /// Undo whatever part of the entry sequence was reached
    ///
    /// A no-op when nothing was entered.
    fn exit_isp(&mut self) -> Result<()>;

    /// Whether the full entry sequence has completed
    fn in_isp(&self) -> bool;
}

/// Run `f` inside ISP mode
///
/// The exit sequence always runs once entry was attempted. If `f` (or the
/// entry itself) failed, a failing exit is only logged and the first error
/// is returned. If `f` succeeded, a failing exit is returned.
pub fn with_isp<D, T, F>(dev: &mut D, f: F) -> Result<T>
where
    D: IspDevice + ?Sized,
    F: FnOnce(&mut D) -> Result<T>,
{
    let result = match dev.enter_isp() {
        Ok(()) => f(dev),
        // the outer session owns the exit
        Err(e @ Error::AlreadyInIspMode) => return Err(e),
        Err(e) => Err(e),
    };

    match (result, dev.exit_isp()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(exit_err)) => Err(exit_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(exit_err)) => {
            log::warn!("failed to leave ISP mode after error: {}", exit_err);
            Err(e)
        }
    }
}
