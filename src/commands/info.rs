//! Info command implementation

use genesys_core::chip::FlashParams;

use super::Session;

fn print_flash(params: Option<&FlashParams>) {
    match params {
        Some(params) => {
            let chip = params.profile();
            println!("Flash:           {}", chip);
            println!(
                "Flash size:      {} bytes ({} KiB)",
                chip.total_size,
                chip.total_size / 1024
            );
            println!("Erase delay:     {} ms", params.erase_delay_ms);
            println!("Write delay:     {} ms", params.write_delay_ms);
        }
        None => println!("Flash:           not identified"),
    }
}

/// Print what the session learned while opening
pub fn run_info(session: &Session) {
    match session {
        Session::Hub(hub) => {
            let id = hub.identity();
            println!("Hub Information");
            println!("===============");
            println!();
            println!("Model:           {} (revision {})", id.model, id.revision);
            println!(
                "USB:             {:04x}:{:04x}, bcdUSB {:04x}, bcdDevice {:04x}",
                id.usb.vendor_id, id.usb.product_id, id.usb.usb_version, id.usb.release
            );
            println!(
                "Running:         {}",
                if id.is_mask_code { "mask ROM" } else { "flash code" }
            );
            println!(
                "Code sign:       {}",
                if hub.vendor_commands().is_cs_isp() { "yes" } else { "no" }
            );
            println!("Build time:      {}", id.fw_info.build_time());
            println!("Update time:     {}", id.fw_info.update_time());
            if let Some(vs) = &id.vendor_support {
                println!("MStar scaler:    level {}", vs.mstar_scaler());
            }
            print_flash(hub.flash_params());
            println!("Code size:       0x{:x}", hub.code_size());
            println!("Extend size:     0x{:x}", hub.extend_size());
            println!("Transfer size:   {} bytes", hub.flash_rw_size());
            println!();
            println!("Static tool string:");
            for (key, value) in id.static_tool_string.describe() {
                println!("  {:<26} {}", key, value);
            }
        }
        Session::Scaler(scaler) => {
            let info = scaler.info();
            println!("Scaler Information");
            println!("==================");
            println!();
            println!("Model:           MStar {}", scaler.model());
            println!("Version:         {}", info.version);
            println!("Level:           {}", info.level);
            let key = String::from_utf8_lossy(&info.public_key);
            let n = key.lines().next().unwrap_or_default();
            let shown: String = n.chars().take(48).collect();
            println!(
                "Public key:      {}{}",
                shown,
                if n.chars().count() > 48 { "..." } else { "" }
            );
            print_flash(scaler.flash_params());
        }
    }
}
