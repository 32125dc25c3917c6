//! Flash command layer shared by the hub and scaler sessions

use std::time::Duration;

use crate::chip::{FlashChipProfile, FlashParams};
use crate::error::{Error, Result};
use crate::spi::opcodes::RDSR;

/// How to poll a status register until it settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPoll {
    /// Register (read opcode) to poll
    pub register: u8,
    /// Bits that must equal `expected`
    pub mask: u8,
    /// Value of the masked bits once ready
    pub expected: u8,
    /// Number of reads before giving up
    pub max_retries: u32,
    /// Sleep between two reads
    pub retry_delay: Duration,
}

impl StatusPoll {
    /// After a page program
    pub const PROGRAM: Self = Self::new(RDSR, 20, 10);
    /// After a sector erase
    pub const ERASE: Self = Self::new(RDSR, 500, 10);
    /// After a status register write
    pub const WRITE_STATUS: Self = Self::new(RDSR, 20, 10);
    /// After the hub switches in or out of ISP mode
    pub const HUB_ISP_SWITCH: Self = Self::new(RDSR, 5, 30);

    /// Poll `register` for an all-zero value
    pub const fn new(register: u8, max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            register,
            mask: 0xFF,
            expected: 0,
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    /// Same poll with a different mask
    pub const fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    /// Same poll with enough retries to cover `budget_ms`
    pub fn within(mut self, budget_ms: u32) -> Self {
        let step = u64::try_from(self.retry_delay.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let retries = u64::from(budget_ms).div_ceil(step).max(1);
        self.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        self
    }

    /// Whether `value` satisfies the poll
    pub const fn is_ready(&self, value: u8) -> bool {
        value & self.mask == self.expected & self.mask
    }
}

/// Flash primitives issued over a vendor control channel
///
/// Every primitive fails with [`Error::NotInIspMode`] unless the session
/// has entered ISP mode.
pub trait FlashCommands {
    /// Issue `profile`'s identify command and read `buf.len()` bytes back
    fn read_id(&mut self, profile: &FlashChipProfile, buf: &mut [u8]) -> Result<()>;

    /// Read flash contents starting at `addr`
    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Set the write enable latch
    fn write_enable(&mut self) -> Result<()>;

    /// Write status register 1
    fn write_status(&mut self, value: u8) -> Result<()>;

    /// Erase the 4 KiB sector containing `addr`
    fn sector_erase(&mut self, addr: u32) -> Result<()>;

    /// Program up to one page at `addr`
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Read a status register
    fn read_status(&mut self, register: u8) -> Result<u8>;

    /// Sleep
    fn delay(&mut self, duration: Duration);

    /// Parameters of the identified chip, `None` until identification
    fn chip_params(&self) -> Option<FlashParams> {
        None
    }

    /// Busy bits checked by the generic erase/program loops
    fn status_mask(&self) -> u8 {
        0xFF
    }

    /// Poll a status register until it is ready
    ///
    /// Reads at most `poll.max_retries` times and sleeps only between
    /// attempts. Transport failures count as a failed attempt; if the final
    /// attempt failed that way its error is returned instead of
    /// [`Error::StatusTimeout`].
    fn wait_status(&mut self, poll: &StatusPoll) -> Result<()> {
        let mut last = 0;
        let mut last_err = None;
        for attempt in 0..poll.max_retries {
            if attempt > 0 {
                self.delay(poll.retry_delay);
            }
            match self.read_status(poll.register) {
                Ok(value) if poll.is_ready(value) => return Ok(()),
                Ok(value) => {
                    last = value;
                    last_err = None;
                }
                Err(e @ Error::Transport { .. }) => {
                    log::debug!("status read {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Err(Error::StatusTimeout {
                register: poll.register,
                attempts: poll.max_retries,
                last,
            }),
        }
    }
}
