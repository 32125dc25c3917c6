//! Parse command implementation

use std::path::Path;

use genesys_core::image::FirmwareImage;

/// Decode an image file and print its metadata
pub fn run_parse(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    let image = FirmwareImage::detect(data)?;

    match &image {
        FirmwareImage::Hub(hub) => {
            println!("Hub firmware image ({})", hub.model());
            if hub.checksum_mismatch() {
                println!("Checksum: MISMATCH");
            }
        }
        FirmwareImage::Scaler(_) => println!("Scaler firmware image"),
    }
    println!();

    for (key, value) in image.describe() {
        println!("{:<28} {}", key, value);
    }
    Ok(())
}
