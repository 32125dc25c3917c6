//! High-level flash operations built on [`FlashCommands`]

use super::commands::{FlashCommands, StatusPoll};
use super::progress::Progress;
use crate::chip::{FlashParams, FLASH_CHIPS};
use crate::error::{Error, Result};
use crate::spi::{sector_start, PAGE_SIZE, SECTOR_SIZE};

/// Read granularity used for progress updates
const READ_CHUNK: usize = 4096;

/// Identify the attached flash chip
///
/// Tries every registry entry in table order and stops at the first
/// byte-exact identify response.
pub fn identify<C: FlashCommands + ?Sized>(cmds: &mut C) -> Result<FlashParams> {
    let mut buf = [0u8; 3];
    for (index, chip) in FLASH_CHIPS.iter().enumerate() {
        let response = &mut buf[..usize::from(chip.id_len)];
        cmds.read_id(chip, response)?;
        log::trace!("identify 0x{:02x} -> {:02x?}", chip.id_opcode, response);
        if chip.matches(response) {
            log::info!("Found flash chip {}", chip);
            return FlashParams::from_index(index).ok_or(Error::UnknownFlashChip);
        }
    }
    Err(Error::UnknownFlashChip)
}

/// Status poll after a sector erase, sized by the identified chip
fn erase_poll<C: FlashCommands + ?Sized>(cmds: &C) -> StatusPoll {
    let poll = StatusPoll::ERASE.with_mask(cmds.status_mask());
    match cmds.chip_params() {
        Some(params) => poll.within(params.erase_delay_ms),
        None => poll,
    }
}

/// Status poll after a page program, sized by the identified chip
fn program_poll<C: FlashCommands + ?Sized>(cmds: &C) -> StatusPoll {
    let poll = StatusPoll::PROGRAM.with_mask(cmds.status_mask());
    match cmds.chip_params() {
        Some(params) => poll.within(params.write_delay_ms),
        None => poll,
    }
}

/// Erase every 4 KiB sector overlapping `[addr, addr + len)`
pub fn erase_region<C: FlashCommands + ?Sized>(
    cmds: &mut C,
    addr: u32,
    len: usize,
    progress: &mut dyn Progress,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let poll = erase_poll(cmds);
    let start = sector_start(addr);
    let end = addr + len as u32;
    let total = (end - start) as usize;
    progress.phase("Erasing", total);

    let mut sector = start;
    while sector < end {
        log::debug!("erasing sector @0x{:06x}", sector);
        cmds.write_enable()?;
        cmds.sector_erase(sector)?;
        cmds.wait_status(&poll)?;
        sector += SECTOR_SIZE;
        progress.advance(((sector - start) as usize).min(total));
    }
    Ok(())
}

/// Program `data` at `addr`, one page per program command
///
/// Transfers never cross a 256-byte page boundary.
pub fn program_region<C: FlashCommands + ?Sized>(
    cmds: &mut C,
    addr: u32,
    data: &[u8],
    progress: &mut dyn Progress,
) -> Result<()> {
    let poll = program_poll(cmds);
    progress.phase("Writing", data.len());

    let mut offset = 0usize;
    while offset < data.len() {
        let cur = addr + offset as u32;
        let page_left = (PAGE_SIZE - cur % PAGE_SIZE) as usize;
        let chunk = page_left.min(data.len() - offset);
        cmds.write_enable()?;
        cmds.page_program(cur, &data[offset..offset + chunk])?;
        cmds.wait_status(&poll)?;
        offset += chunk;
        progress.advance(offset);
    }
    Ok(())
}

/// Read `buf.len()` bytes starting at `addr`
pub fn read_region<C: FlashCommands + ?Sized>(
    cmds: &mut C,
    addr: u32,
    buf: &mut [u8],
    progress: &mut dyn Progress,
) -> Result<()> {
    progress.phase("Reading", buf.len());
    let mut done = 0usize;
    for chunk in buf.chunks_mut(READ_CHUNK) {
        cmds.read_flash(addr + done as u32, chunk)?;
        done += chunk.len();
        progress.advance(done);
    }
    Ok(())
}

/// Read back `expected.len()` bytes at `addr` and compare
pub fn verify<C: FlashCommands + ?Sized>(
    cmds: &mut C,
    addr: u32,
    expected: &[u8],
    progress: &mut dyn Progress,
) -> Result<()> {
    let mut actual = vec![0u8; expected.len()];
    read_region(cmds, addr, &mut actual, progress)?;
    match actual.iter().zip(expected).position(|(a, e)| a != e) {
        Some(pos) => Err(Error::VerifyMismatch {
            addr: addr + pos as u32,
        }),
        None => Ok(()),
    }
}

/// Clear the block protection bits in status register 1
pub fn clear_status_protection<C: FlashCommands + ?Sized>(cmds: &mut C) -> Result<()> {
    let poll = StatusPoll::WRITE_STATUS.with_mask(cmds.status_mask());
    cmds.write_enable()?;
    cmds.write_status(0)?;
    cmds.wait_status(&poll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::find_by_name;
    use crate::flash::mock::MockFlash;
    use crate::flash::NoProgress;
    use crate::spi::opcodes::{RDID, REMS};

    #[test]
    fn test_identify_first_match() {
        let mut flash = MockFlash::new(0x1000);
        flash.id = Some((RDID, vec![0xC2, 0x20, 0x13]));
        let params = identify(&mut flash).unwrap();
        assert_eq!(params.profile().name, "MX25L4006E");
        let (index, _) = find_by_name("MX25L4006E").unwrap();
        assert_eq!(params.index(), index);
        // nothing after the match was queried
        assert_eq!(flash.id_queries.len(), index + 1);
    }

    #[test]
    fn test_identify_legacy_part() {
        let mut flash = MockFlash::new(0x1000);
        flash.id = Some((REMS, vec![0xBF, 0x49]));
        let params = identify(&mut flash).unwrap();
        assert_eq!(params.profile().name, "SST25VF010A");
        assert!(params.profile().aai);
    }

    #[test]
    fn test_identify_unknown() {
        let mut flash = MockFlash::new(0x1000);
        flash.id = Some((RDID, vec![0x12, 0x34, 0x56]));
        assert!(matches!(identify(&mut flash), Err(Error::UnknownFlashChip)));
        assert_eq!(flash.id_queries.len(), FLASH_CHIPS.len());
    }

    #[test]
    fn test_identify_requires_isp() {
        let mut flash = MockFlash::new(0x1000);
        flash.in_isp = false;
        assert!(matches!(identify(&mut flash), Err(Error::NotInIspMode)));
    }

    #[test]
    fn test_erase_covers_partial_sectors() {
        let mut flash = MockFlash::new(0x4000);
        flash.data.fill(0x00);
        erase_region(&mut flash, 0x0800, 0x1000, &mut NoProgress).unwrap();
        assert_eq!(flash.erased, vec![0x0000, 0x1000]);
        assert!(flash.data[..0x2000].iter().all(|&b| b == 0xFF));
        assert!(flash.data[0x2000..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_program_splits_on_pages() {
        let mut flash = MockFlash::new(0x1000);
        let data: Vec<u8> = (0..0x180).map(|i| i as u8).collect();
        program_region(&mut flash, 0x80, &data, &mut NoProgress).unwrap();
        assert_eq!(flash.programmed, vec![(0x80, 0x80), (0x100, 0x100)]);
        assert_eq!(&flash.data[0x80..0x200], &data[..]);
        verify(&mut flash, 0x80, &data, &mut NoProgress).unwrap();
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let mut flash = MockFlash::new(0x1000);
        let mut expected = vec![0xFF; 0x100];
        expected[0x42] = 0x00;
        let err = verify(&mut flash, 0x200, &expected, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::VerifyMismatch { addr: 0x242 }));
    }

    #[test]
    fn test_poll_budget_follows_chip() {
        let mut flash = MockFlash::new(0x1000);
        assert_eq!(erase_poll(&flash), StatusPoll::ERASE);
        assert_eq!(program_poll(&flash), StatusPoll::PROGRAM);

        // 10 x 100 ms sector unit vs 4 x 1 s chip unit
        let (x10, _) = find_by_name("W25X10").unwrap();
        let (q80, _) = find_by_name("W25Q80").unwrap();
        flash.params = FlashParams::from_index(x10);
        assert_eq!(erase_poll(&flash).max_retries, 100);
        flash.params = FlashParams::from_index(q80);
        assert_eq!(erase_poll(&flash).max_retries, 400);
        // write delay floor of 500 ms at 10 ms per read
        assert_eq!(program_poll(&flash).max_retries, 50);
    }

    #[test]
    fn test_erase_gives_up_after_chip_budget() {
        let (x10, _) = find_by_name("W25X10").unwrap();
        let mut flash = MockFlash::new(0x1000);
        flash.params = FlashParams::from_index(x10);
        flash.status_script = vec![0x01; 200];
        let err = erase_region(&mut flash, 0, 0x1000, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::StatusTimeout { attempts: 100, .. }));
        assert_eq!(flash.status_reads, 100);
    }

    #[test]
    fn test_clear_status_protection() {
        let mut flash = MockFlash::new(0x1000);
        clear_status_protection(&mut flash).unwrap();
        assert!(!flash.wel);
        assert_eq!(flash.status_reads, 1);
    }
}
