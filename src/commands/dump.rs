//! Dump command implementation

use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::progress::BarProgress;
use super::Session;

/// Read the target's firmware into `output`
pub fn run_dump(session: &mut Session, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = BarProgress::new();
    let data = match session {
        Session::Hub(hub) => hub.dump_firmware(&mut progress)?,
        Session::Scaler(scaler) => scaler.dump_firmware(&mut progress)?,
    };

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}
