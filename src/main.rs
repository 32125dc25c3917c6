//! genesys-isp - Genesys hub and MStar scaler firmware tool
//!
//! Reads, writes and decodes the firmware of Genesys Logic GL3523/GL3590
//! USB hubs and of MStar display scalers attached behind them.
//!
//! # Architecture
//!
//! The CLI picks a transport (`dummy` emulator or `usb` through nusb) and a
//! target session:
//! - **hub** - `genesys-usbhub`, ISP through the hub's own vendor requests
//! - **scaler** - `genesys-scaler`, ISP through the scaler's serial debug
//!   and ISP ports forwarded by the hub
//!
//! Both sessions implement the same flash command layer, so dump and write
//! share the erase/program/verify loops in `genesys-core`.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Info { device } => {
            let session = commands::open_session(&device)?;
            commands::run_info(&session);
            Ok(())
        }
        Commands::Dump { device, output } => {
            let mut session = commands::open_session(&device)?;
            commands::run_dump(&mut session, &output)
        }
        Commands::Write { device, input } => {
            let mut session = commands::open_session(&device)?;
            commands::run_write(&mut session, &input)
        }
        Commands::Parse { input } => commands::run_parse(&input),
        Commands::ListChips { vendor } => {
            commands::list_chips(vendor.as_deref());
            Ok(())
        }
    }
}
