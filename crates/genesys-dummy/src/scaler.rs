//! Emulated MStar scaler behind the hub

use std::collections::BTreeMap;

use genesys_core::spi::opcodes;
use genesys_core::usb::TransportError;

use crate::flash::FlashEmu;

// Serial-debug port commands
const SERDB: &[u8] = b"SERDB";
const SERDB_EXIT: u8 = 0x45;
const SINGLE_STEP_A: [u8; 4] = [0x10, 0xC0, 0xC1, 0x53];
const SINGLE_STEP_B: [u8; 4] = [0x10, 0x1F, 0xC1, 0x53];
const SINGLE_STEP_EXIT: [u8; 4] = [0x10, 0xC0, 0xC1, 0xFF];
const DEBUG_MODE: [u8; 4] = [0x10, 0x00, 0x00, 0x00];

// ISP port commands
const ISP_ENTER: &[u8] = b"MSTAR";
const ISP_EXIT: u8 = 0x24;
const CMD_DATA_WRITE: u8 = 0x10;
const CMD_DATA_READ: u8 = 0x11;
const CMD_DATA_END: u8 = 0x12;

/// Scaler-side state the tests look at
#[derive(Debug, Clone)]
pub struct ScalerEmu {
    /// Support level reported through request 0xA4 value 4
    pub level: u8,
    /// Version block reported through request 0xA4 value 5
    pub version: [u8; 16],
    /// Public key block reported through request 0xA4 value 6
    pub public_key: Vec<u8>,
    /// Attached flash
    pub flash: FlashEmu,
    /// Serial debug unlocked
    pub serial_debug: bool,
    /// Single step engaged (both halves)
    pub single_step: bool,
    /// Debug mode entered
    pub debug_mode: bool,
    /// ISP mode entered
    pub isp: bool,
    /// Single bytes sent to the debug port (I2C channel and bus control)
    pub i2c_bytes: Vec<u8>,
    /// Debug-port register space
    pub registers: BTreeMap<u32, u8>,
    /// Refuse this many ISP unlocks before accepting
    pub isp_refusals: u32,
    single_step_half: bool,
    selected: Option<u32>,
    pending: Vec<u8>,
    read_offset: u32,
}

impl ScalerEmu {
    /// A scaler with `flash` attached
    pub fn new(flash: FlashEmu, public_key: Vec<u8>) -> Self {
        let mut version = [0u8; 16];
        version[..10].copy_from_slice(b"\x00MST9100A1");
        Self {
            level: 1,
            version,
            public_key,
            flash,
            serial_debug: false,
            single_step: false,
            debug_mode: false,
            isp: false,
            i2c_bytes: Vec::new(),
            registers: BTreeMap::new(),
            isp_refusals: 0,
            single_step_half: false,
            selected: None,
            pending: Vec::new(),
            read_offset: 0,
        }
    }

    /// Request 0xA4 probe reads
    pub fn info(&self, value: u16, index: u16, buf: &mut [u8]) -> Result<usize, TransportError> {
        let src: &[u8] = match value {
            4 => std::slice::from_ref(&self.level),
            5 => &self.version,
            6 => self
                .public_key
                .get(usize::from(index)..)
                .ok_or(TransportError::Stall)?,
            _ => return Err(TransportError::Stall),
        };
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }

    /// OUT transfer on the serial debug port
    pub fn debug_write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data == SERDB {
            self.serial_debug = true;
            return Ok(());
        }
        if !self.serial_debug {
            return Err(TransportError::Stall);
        }
        match data {
            [SERDB_EXIT] => {
                self.serial_debug = false;
                self.debug_mode = false;
            }
            [byte] => self.i2c_bytes.push(*byte),
            d if d == SINGLE_STEP_A => self.single_step_half = true,
            d if d == SINGLE_STEP_B && self.single_step_half => self.single_step = true,
            d if d == SINGLE_STEP_EXIT => {
                self.single_step = false;
                self.single_step_half = false;
            }
            d if d == DEBUG_MODE => self.debug_mode = true,
            [0x10, hi, lo] => self.selected = Some(u32::from_be_bytes([0, 0, *hi, *lo])),
            [0x10, hi, lo, val] => {
                self.registers
                    .insert(u32::from_be_bytes([0, 0, *hi, *lo]), *val);
            }
            [0x10, a, b, c, d] => self.selected = Some(u32::from_be_bytes([*a, *b, *c, *d])),
            [0x10, a, b, c, d, val] => {
                self.registers
                    .insert(u32::from_be_bytes([*a, *b, *c, *d]), *val);
            }
            _ => return Err(TransportError::Stall),
        }
        Ok(())
    }

    /// IN transfer on the serial debug port: value of the selected register
    pub fn debug_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let addr = self.selected.take().ok_or(TransportError::Stall)?;
        let value = self.registers.get(&addr).copied().unwrap_or(0);
        let first = buf.first_mut().ok_or(TransportError::Stall)?;
        *first = value;
        Ok(1)
    }

    /// OUT transfer on the ISP port
    pub fn isp_write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data == ISP_ENTER {
            if !self.single_step {
                return Err(TransportError::Stall);
            }
            if self.isp_refusals > 0 {
                self.isp_refusals -= 1;
                return Err(TransportError::Timeout);
            }
            self.isp = true;
            return Ok(());
        }
        if data == [ISP_EXIT] {
            self.isp = false;
            return Ok(());
        }
        if !self.isp {
            return Err(TransportError::Stall);
        }

        match data.split_first() {
            Some((&CMD_DATA_WRITE, rest)) => {
                self.pending = rest.to_vec();
                self.read_offset = 0;
                self.execute_write()
            }
            Some((&CMD_DATA_READ, [])) => Ok(()),
            Some((&CMD_DATA_END, [])) => {
                self.pending.clear();
                Ok(())
            }
            _ => Err(TransportError::Stall),
        }
    }

    fn execute_write(&mut self) -> Result<(), TransportError> {
        let Some((&opcode, rest)) = self.pending.split_first() else {
            return Err(TransportError::Stall);
        };
        match opcode {
            opcodes::WREN | opcodes::WRSR => self.flash.command(opcode, rest),
            opcodes::SE_20 => self.flash.erase_sector(address(rest)?),
            opcodes::PP => {
                let addr = address(rest)?;
                self.flash.program(addr, &rest[3..], false)
            }
            // read-type commands answer on the next IN transfer
            _ => Ok(()),
        }
    }

    /// IN transfer on the ISP port: response to the pending command
    pub fn isp_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.isp {
            return Err(TransportError::Stall);
        }
        let Some((&opcode, rest)) = self.pending.split_first() else {
            return Err(TransportError::Stall);
        };
        match opcode {
            opcodes::RDSR => {
                let status = self.flash.read_status();
                buf.fill(status);
            }
            opcodes::READ => {
                let addr = address(rest)? + self.read_offset;
                self.flash.read(addr, buf)?;
                self.read_offset += buf.len() as u32;
            }
            _ => self.flash.read_id(opcode, buf),
        }
        Ok(buf.len())
    }
}

fn address(bytes: &[u8]) -> Result<u32, TransportError> {
    match bytes {
        [a, b, c, ..] => Ok(u32::from_be_bytes([0, *a, *b, *c])),
        _ => Err(TransportError::Stall),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesys_core::chip::find_by_name;

    fn emu() -> ScalerEmu {
        ScalerEmu::new(FlashEmu::new(find_by_name("W25Q80").unwrap().1), vec![0xAB; 0x212])
    }

    fn unlock(s: &mut ScalerEmu) {
        s.debug_write(SERDB).unwrap();
        s.debug_write(&SINGLE_STEP_A).unwrap();
        s.debug_write(&SINGLE_STEP_B).unwrap();
        s.isp_write(ISP_ENTER).unwrap();
    }

    #[test]
    fn test_isp_needs_single_step() {
        let mut s = emu();
        s.debug_write(SERDB).unwrap();
        assert!(s.isp_write(ISP_ENTER).is_err());
        s.debug_write(&SINGLE_STEP_A).unwrap();
        s.debug_write(&SINGLE_STEP_B).unwrap();
        s.isp_write(ISP_ENTER).unwrap();
        assert!(s.isp);
    }

    #[test]
    fn test_register_read_modify_write() {
        let mut s = emu();
        s.debug_write(SERDB).unwrap();
        s.registers.insert(0x0426, 0x40);
        s.debug_write(&[0x10, 0x04, 0x26]).unwrap();
        let mut b = [0u8];
        s.debug_read(&mut b).unwrap();
        assert_eq!(b[0], 0x40);
        s.debug_write(&[0x10, 0x04, 0x26, 0x41]).unwrap();
        assert_eq!(s.registers[&0x0426], 0x41);
    }

    #[test]
    fn test_read_id_and_data() {
        let mut s = emu();
        unlock(&mut s);
        s.flash.load(0x100, &[1, 2, 3, 4]);

        s.isp_write(&[CMD_DATA_WRITE, opcodes::RDID]).unwrap();
        s.isp_write(&[CMD_DATA_READ]).unwrap();
        let mut id = [0u8; 3];
        s.isp_read(&mut id).unwrap();
        s.isp_write(&[CMD_DATA_END]).unwrap();
        assert_eq!(id, [0xEF, 0x40, 0x14]);

        s.isp_write(&[CMD_DATA_WRITE, opcodes::READ, 0, 1, 0]).unwrap();
        s.isp_write(&[CMD_DATA_READ]).unwrap();
        let mut a = [0u8; 2];
        let mut b = [0u8; 2];
        s.isp_read(&mut a).unwrap();
        s.isp_read(&mut b).unwrap();
        assert_eq!((a, b), ([1, 2], [3, 4]));
    }

    #[test]
    fn test_flash_rejected_outside_isp() {
        let mut s = emu();
        assert_eq!(
            s.isp_write(&[CMD_DATA_WRITE, opcodes::WREN]),
            Err(TransportError::Stall)
        );
    }
}
