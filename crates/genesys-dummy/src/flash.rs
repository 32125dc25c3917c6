//! Emulated SPI flash behind the hub or the scaler

use genesys_core::chip::FlashChipProfile;
use genesys_core::spi::{opcodes, SECTOR_SIZE, STATUS_WIP};
use genesys_core::usb::TransportError;

/// In-memory flash part answering to one registry profile
#[derive(Debug, Clone)]
pub struct FlashEmu {
    profile: &'static FlashChipProfile,
    data: Vec<u8>,
    write_enabled: bool,
    status: u8,
    busy_polls: u32,
    busy_left: u32,
    /// Sector erases performed, by start address
    pub erased: Vec<u32>,
    /// Status register writes
    pub status_writes: Vec<u8>,
}

impl FlashEmu {
    /// An erased part of `profile.total_size` bytes
    pub fn new(profile: &'static FlashChipProfile) -> Self {
        Self {
            profile,
            data: vec![0xFF; profile.total_size as usize],
            write_enabled: false,
            status: 0,
            busy_polls: 0,
            busy_left: 0,
            erased: Vec::new(),
            status_writes: Vec::new(),
        }
    }

    /// Report WIP for `polls` status reads after every erase or program
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Set the status register (e.g. block protection bits)
    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    /// Current status register, without WIP
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Profile this part answers to
    pub fn profile(&self) -> &'static FlashChipProfile {
        self.profile
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite contents starting at `addr`
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let start = addr as usize;
        let end = (start + bytes.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
    }

    /// Identify response for `opcode`; unknown opcodes float high
    pub fn read_id(&self, opcode: u8, buf: &mut [u8]) {
        buf.fill(0xFF);
        if opcode == self.profile.id_opcode {
            let id = self.profile.expected_id();
            let n = id.len().min(buf.len());
            buf[..n].copy_from_slice(&id[..n]);
        }
    }

    /// Copy `buf.len()` bytes from `addr`
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), TransportError> {
        let start = addr as usize;
        let src = self
            .data
            .get(start..start + buf.len())
            .ok_or(TransportError::Stall)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    /// Status read, WIP set while an operation is pending
    pub fn read_status(&mut self) -> u8 {
        if self.busy_left > 0 {
            self.busy_left -= 1;
            self.status | STATUS_WIP
        } else {
            self.status
        }
    }

    /// Execute an opcode-only or opcode-plus-payload command
    pub fn command(&mut self, opcode: u8, payload: &[u8]) -> Result<(), TransportError> {
        match opcode {
            opcodes::WREN => {
                self.write_enabled = true;
                Ok(())
            }
            opcodes::WRSR => {
                self.require_wel()?;
                let value = payload.first().copied().unwrap_or(0);
                self.status = value & !STATUS_WIP;
                self.status_writes.push(value);
                self.write_enabled = false;
                self.busy_left = self.busy_polls;
                Ok(())
            }
            _ => {
                log::debug!("dummy flash: unsupported opcode 0x{:02x}", opcode);
                Err(TransportError::Stall)
            }
        }
    }

    /// Erase the 4 KiB sector at `addr`
    pub fn erase_sector(&mut self, addr: u32) -> Result<(), TransportError> {
        self.require_wel()?;
        let start = (addr - addr % SECTOR_SIZE) as usize;
        let sector = self
            .data
            .get_mut(start..start + SECTOR_SIZE as usize)
            .ok_or(TransportError::Stall)?;
        sector.fill(0xFF);
        self.erased.push(start as u32);
        self.write_enabled = false;
        self.busy_left = self.busy_polls;
        Ok(())
    }

    /// Program `bytes` at `addr`; bits only go from 1 to 0
    ///
    /// WEL stays set when `keep_wel` so one page can arrive in several
    /// transfers.
    pub fn program(&mut self, addr: u32, bytes: &[u8], keep_wel: bool) -> Result<(), TransportError> {
        self.require_wel()?;
        let start = addr as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(TransportError::Stall)?;
        for (d, s) in dst.iter_mut().zip(bytes) {
            *d &= *s;
        }
        if !keep_wel {
            self.write_enabled = false;
        }
        self.busy_left = self.busy_polls;
        Ok(())
    }

    fn require_wel(&self) -> Result<(), TransportError> {
        if self.write_enabled {
            Ok(())
        } else {
            log::debug!("dummy flash: write without WREN");
            Err(TransportError::Stall)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesys_core::chip::find_by_name;

    fn w25x40() -> FlashEmu {
        FlashEmu::new(find_by_name("W25X40").unwrap().1)
    }

    #[test]
    fn test_identify_response() {
        let flash = w25x40();
        let mut buf = [0u8; 3];
        flash.read_id(opcodes::RDID, &mut buf);
        assert_eq!(buf, [0xEF, 0x30, 0x13]);
        flash.read_id(opcodes::RES, &mut buf);
        assert_eq!(buf, [0xFF; 3]);
    }

    #[test]
    fn test_program_needs_wren() {
        let mut flash = w25x40();
        assert_eq!(flash.program(0, &[0], false), Err(TransportError::Stall));
        flash.command(opcodes::WREN, &[]).unwrap();
        flash.program(0, &[0x0F, 0xF0], false).unwrap();
        assert_eq!(&flash.data()[..2], &[0x0F, 0xF0]);
        assert!(flash.program(2, &[0], false).is_err());
    }

    #[test]
    fn test_erase_and_busy() {
        let mut flash = w25x40();
        flash.set_busy_polls(2);
        flash.load(0x1000, &[0u8; 16]);
        flash.command(opcodes::WREN, &[]).unwrap();
        flash.erase_sector(0x1010).unwrap();
        assert_eq!(flash.erased, vec![0x1000]);
        assert!(flash.data()[0x1000..0x1010].iter().all(|&b| b == 0xFF));
        assert_eq!(flash.read_status() & STATUS_WIP, STATUS_WIP);
        assert_eq!(flash.read_status() & STATUS_WIP, STATUS_WIP);
        assert_eq!(flash.read_status(), 0);
    }

    #[test]
    fn test_write_status() {
        let mut flash = w25x40();
        flash.set_status(0x1C);
        flash.command(opcodes::WREN, &[]).unwrap();
        flash.command(opcodes::WRSR, &[0]).unwrap();
        assert_eq!(flash.status(), 0);
        assert_eq!(flash.status_writes, vec![0]);
    }
}
