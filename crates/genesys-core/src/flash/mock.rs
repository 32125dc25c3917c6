//! In-memory [`FlashCommands`] used by the core unit tests

use std::collections::VecDeque;
use std::time::Duration;

use super::FlashCommands;
use crate::chip::{FlashChipProfile, FlashParams};
use crate::error::{Error, Result, TransportContext};
use crate::spi::{sector_start, SECTOR_SIZE};
use crate::usb::TransportError;

pub(crate) struct MockFlash {
    pub data: Vec<u8>,
    pub in_isp: bool,
    pub wel: bool,
    /// Status values returned in order, 0 once exhausted
    pub status_script: Vec<u8>,
    /// First N status reads fail with a timeout
    pub status_errors: u32,
    pub status_reads: u32,
    pub delays: Vec<Duration>,
    /// Chip that answers identify, as (opcode, response)
    pub id: Option<(u8, Vec<u8>)>,
    pub id_queries: Vec<u8>,
    pub erased: Vec<u32>,
    pub programmed: Vec<(u32, usize)>,
    /// Reported through `chip_params`
    pub params: Option<FlashParams>,
    script: VecDeque<u8>,
}

impl MockFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            in_isp: true,
            wel: false,
            status_script: Vec::new(),
            status_errors: 0,
            status_reads: 0,
            delays: Vec::new(),
            id: None,
            id_queries: Vec::new(),
            erased: Vec::new(),
            programmed: Vec::new(),
            params: None,
            script: VecDeque::new(),
        }
    }

    fn check_isp(&self) -> Result<()> {
        if self.in_isp {
            Ok(())
        } else {
            Err(Error::NotInIspMode)
        }
    }

    fn take_wel(&mut self) -> Result<()> {
        if !self.wel {
            return Err(Error::InvalidResponse("write enable latch not set".into()));
        }
        self.wel = false;
        Ok(())
    }
}

impl FlashCommands for MockFlash {
    fn chip_params(&self) -> Option<FlashParams> {
        self.params
    }

    fn read_id(&mut self, profile: &FlashChipProfile, buf: &mut [u8]) -> Result<()> {
        self.check_isp()?;
        self.id_queries.push(profile.id_opcode);
        buf.fill(0xFF);
        if let Some((opcode, response)) = &self.id {
            if *opcode == profile.id_opcode {
                let n = buf.len().min(response.len());
                buf[..n].copy_from_slice(&response[..n]);
            }
        }
        Ok(())
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.check_isp()?;
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_enable(&mut self) -> Result<()> {
        self.check_isp()?;
        self.wel = true;
        Ok(())
    }

    fn write_status(&mut self, _value: u8) -> Result<()> {
        self.check_isp()?;
        self.take_wel()
    }

    fn sector_erase(&mut self, addr: u32) -> Result<()> {
        self.check_isp()?;
        self.take_wel()?;
        let start = sector_start(addr) as usize;
        self.data[start..start + SECTOR_SIZE as usize].fill(0xFF);
        self.erased.push(addr);
        Ok(())
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_isp()?;
        self.take_wel()?;
        let start = addr as usize;
        for (dst, src) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        self.programmed.push((addr, data.len()));
        Ok(())
    }

    fn read_status(&mut self, _register: u8) -> Result<u8> {
        self.check_isp()?;
        if self.status_reads == 0 {
            self.script = self.status_script.iter().copied().collect();
        }
        self.status_reads += 1;
        if self.status_reads <= self.status_errors {
            return Err(TransportError::Timeout).context("error reading status");
        }
        Ok(self.script.pop_front().unwrap_or(0))
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}
