//! Write command implementation

use std::path::Path;

use genesys_core::image::{HubImage, ScalerImage};

use super::progress::BarProgress;
use super::Session;

/// Validate the image in `input` and write it to the target
pub fn run_write(session: &mut Session, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);
    let mut progress = BarProgress::new();

    match session {
        Session::Hub(hub) => {
            let image = HubImage::parse(data)?;
            println!(
                "Image: {} firmware version {}",
                image.model(),
                image.version()
            );
            if image.checksum_mismatch() {
                println!("Warning: image checksum does not match");
            }
            hub.write_firmware(&image, &mut progress)?;
        }
        Session::Scaler(scaler) => {
            let image = ScalerImage::parse(data)?;
            println!(
                "Image: {} ({} bytes at 0x{:x})",
                image.footer().model_name(),
                image.size(),
                image.addr()
            );
            scaler.write_firmware(&image, &mut progress)?;
        }
    }

    println!("Write complete");
    Ok(())
}
