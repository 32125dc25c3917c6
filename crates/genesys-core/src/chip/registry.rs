//! Built-in flash chip table

use super::types::{EraseDelayUnit, FlashChipProfile};
use crate::spi::opcodes::{RDID, REMS, RES};

#[allow(clippy::too_many_arguments)]
const fn chip(
    vendor: &'static str,
    name: &'static str,
    id_opcode: u8,
    id: &[u8],
    write_length: u8,
    erase_delay: u16,
    erase_unit: EraseDelayUnit,
    aai: bool,
    total_size: u32,
) -> FlashChipProfile {
    let mut bytes = [0u8; 3];
    let mut i = 0;
    while i < id.len() && i < 3 {
        bytes[i] = id[i];
        i += 1;
    }
    FlashChipProfile {
        vendor,
        name,
        id_opcode,
        // REMS and RES expect an address phase before the ID shifts out
        dummy_address: id_opcode != RDID,
        id: bytes,
        id_len: id.len() as u8,
        write_length,
        erase_delay,
        erase_unit,
        write_delay_ms: 5,
        aai,
        total_size,
    }
}

use EraseDelayUnit::{Chip, Sector};

/// Every flash part the hubs and scaler are known to ship with
///
/// Order matters: identification stops at the first matching entry, so
/// JEDEC parts come before the legacy REMS/RES parts.
pub static FLASH_CHIPS: [FlashChipProfile; 15] = [
    chip("Winbond", "W25X10", RDID, &[0xEF, 0x30, 0x11], 0x82, 10, Sector, false, 128 * 1024),
    chip("Winbond", "W25X20", RDID, &[0xEF, 0x30, 0x12], 0x82, 10, Sector, false, 256 * 1024),
    chip("Winbond", "W25X40", RDID, &[0xEF, 0x30, 0x13], 0x82, 10, Sector, false, 512 * 1024),
    chip("Winbond", "W25Q80", RDID, &[0xEF, 0x40, 0x14], 0x82, 4, Chip, false, 1024 * 1024),
    chip("Macronix", "MX25L512", RDID, &[0xC2, 0x20, 0x10], 0x40, 2, Chip, false, 64 * 1024),
    chip("Macronix", "MX25L1006E", RDID, &[0xC2, 0x20, 0x11], 0x82, 2, Chip, false, 128 * 1024),
    chip("Macronix", "MX25L4006E", RDID, &[0xC2, 0x20, 0x13], 0x82, 4, Chip, false, 512 * 1024),
    chip("GigaDevice", "GD25Q10", RDID, &[0xC8, 0x40, 0x11], 0x82, 10, Sector, false, 128 * 1024),
    chip("GigaDevice", "GD25Q40", RDID, &[0xC8, 0x40, 0x13], 0x82, 30, Sector, false, 512 * 1024),
    chip("Eon", "EN25F05", RDID, &[0x1C, 0x31, 0x10], 0x40, 3, Chip, false, 64 * 1024),
    chip("Eon", "EN25F10", RDID, &[0x1C, 0x31, 0x11], 0x40, 3, Chip, false, 128 * 1024),
    chip("Atmel", "AT25F512B", RDID, &[0x1F, 0x65, 0x01], 0x40, 2, Chip, false, 64 * 1024),
    chip("AMIC", "A25L512", RDID, &[0x37, 0x30, 0x10], 0x40, 2, Chip, false, 64 * 1024),
    chip("SST", "SST25VF010A", REMS, &[0xBF, 0x49], 0x01, 1, Chip, true, 128 * 1024),
    chip("PMC", "Pm25LV512", RES, &[0x9D, 0x7B], 0x40, 1, Chip, false, 64 * 1024),
];

/// Look up a profile by registry index
pub fn by_index(index: usize) -> Option<&'static FlashChipProfile> {
    FLASH_CHIPS.get(index)
}

/// Look up a profile by part name (case-insensitive)
pub fn find_by_name(name: &str) -> Option<(usize, &'static FlashChipProfile)> {
    FLASH_CHIPS
        .iter()
        .enumerate()
        .find(|(_, chip)| chip.name.eq_ignore_ascii_case(name))
}

/// Look up the first profile answering `opcode` with `response`
pub fn find_by_id(opcode: u8, response: &[u8]) -> Option<(usize, &'static FlashChipProfile)> {
    FLASH_CHIPS
        .iter()
        .enumerate()
        .find(|(_, chip)| chip.id_opcode == opcode && chip.matches(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name() {
        let (index, chip) = find_by_name("w25x40").unwrap();
        assert_eq!(chip.name, "W25X40");
        assert_eq!(by_index(index), Some(chip));
        assert!(find_by_name("W99X99").is_none());
    }

    #[test]
    fn test_find_by_id() {
        let (_, chip) = find_by_id(RDID, &[0xC8, 0x40, 0x13]).unwrap();
        assert_eq!(chip.name, "GD25Q40");
        // same bytes but answered to the wrong opcode
        assert!(find_by_id(REMS, &[0xC8, 0x40, 0x13]).is_none());
    }

    #[test]
    fn test_legacy_parts_use_dummy_address() {
        for chip in FLASH_CHIPS.iter() {
            assert_eq!(chip.dummy_address, chip.id_opcode != RDID, "{}", chip.name);
            assert!(chip.id_len as usize <= chip.id.len());
            assert!(chip.total_size.is_power_of_two());
        }
    }

    #[test]
    fn test_unique_ids() {
        for (i, a) in FLASH_CHIPS.iter().enumerate() {
            for b in FLASH_CHIPS.iter().skip(i + 1) {
                assert!(
                    !(a.id_opcode == b.id_opcode && a.expected_id() == b.expected_id()),
                    "{} and {} share an ID",
                    a.name,
                    b.name
                );
            }
        }
    }
}
