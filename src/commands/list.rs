//! List commands implementation

use genesys_core::chip::FLASH_CHIPS;

/// List all supported chips
pub fn list_chips(vendor_filter: Option<&str>) {
    println!("Supported flash chips:");
    println!();
    println!(
        "{:<12} {:<14} {:>10} {:>8} {:>10}",
        "Vendor", "Name", "Size", "Opcode", "ID"
    );
    println!("{}", "-".repeat(58));

    for chip in FLASH_CHIPS.iter() {
        if let Some(vendor) = vendor_filter {
            if !chip.vendor.to_lowercase().contains(&vendor.to_lowercase()) {
                continue;
            }
        }

        let id: Vec<String> = chip
            .expected_id()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();

        println!(
            "{:<12} {:<14} {:>10} {:>8} {:>10}",
            chip.vendor,
            chip.name,
            format_size(chip.total_size),
            format!("0x{:02X}", chip.id_opcode),
            id.join(" ")
        );
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(64 * 1024), "64 KiB");
        assert_eq!(format_size(1024 * 1024), "1 MiB");
        assert_eq!(format_size(100), "100 B");
    }
}
