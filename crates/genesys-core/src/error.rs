//! Error types for genesys-core
//!
//! Every hardware-facing failure bubbles up as an [`Error`]. Transport
//! failures carry a context string naming the step that was running, the
//! same way the device crates prefix their USB errors.

use thiserror::Error;

use crate::usb::TransportError;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// A control transfer failed
    #[error("{context}: {source}")]
    Transport {
        /// Step that issued the transfer (e.g. "error reading flash at @0x8000")
        context: String,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// No registry entry answered its identify command
    #[error("unknown flash chip")]
    UnknownFlashChip,

    /// A status register never reached the expected value
    #[error("status register 0x{register:02x} not ready after {attempts} attempts (last value 0x{last:02x})")]
    StatusTimeout {
        /// Register (opcode) that was polled
        register: u8,
        /// Number of reads performed
        attempts: u32,
        /// Last value read back
        last: u8,
    },

    /// The hub rejected the authentication challenge
    #[error("device authentication failed")]
    AuthenticationFailed,

    /// Image or device variant not handled
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Scaler footer tag did not decode to the expected header
    #[error("invalid footer")]
    InvalidFooter,

    /// A fixed-offset field lies outside the image
    #[error("image too small: need {len} bytes at 0x{offset:x}, image is 0x{size:x} bytes")]
    ImageTooSmall {
        /// Offset of the field
        offset: usize,
        /// Length of the field
        len: usize,
        /// Size of the image
        size: usize,
    },

    /// A flash operation was attempted outside ISP mode
    #[error("device is not in ISP mode")]
    NotInIspMode,

    /// ISP mode was requested while already entered
    #[error("device is already in ISP mode")]
    AlreadyInIspMode,

    /// The device answered with something unexpected
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Read-back after programming differs from the image
    #[error("verify failed at address 0x{addr:06x}")]
    VerifyMismatch {
        /// First differing flash address
        addr: u32,
    },

    /// The image was signed for a different scaler key
    #[error("firmware public key does not match device public key")]
    PublicKeyMismatch,

    /// Bad configuration option
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Attach a step description to a transport result
pub trait TransportContext<T> {
    /// Convert a transport failure into [`Error::Transport`] with the given context
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`TransportContext::context`] but the context is only built on failure
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> TransportContext<T> for std::result::Result<T, TransportError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| Error::Transport {
            context: context.into(),
            source,
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|source| Error::Transport {
            context: f(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_context_prefix() {
        let r: std::result::Result<(), TransportError> = Err(TransportError::Timeout);
        let err = r.context("error reading flash at @0x8000").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error reading flash at @0x8000: transfer timed out"
        );
    }

    #[test]
    fn test_status_timeout_display() {
        let err = Error::StatusTimeout {
            register: 0x05,
            attempts: 3,
            last: 0x01,
        };
        assert_eq!(
            err.to_string(),
            "status register 0x05 not ready after 3 attempts (last value 0x01)"
        );
    }
}
