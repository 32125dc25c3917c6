//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const DEVICE_HELP: &str = "Device to use: dummy[:key=value,...] or usb[:key=value,...]";

#[derive(Parser)]
#[command(name = "genesys-isp")]
#[command(author, version, about = "Genesys hub and MStar scaler firmware tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which chip behind the hub to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Target {
    /// The hub's own firmware flash
    #[default]
    Hub,
    /// The MStar scaler's flash
    Scaler,
}

/// Device options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    #[arg(short, long, help = DEVICE_HELP)]
    pub device: String,

    /// Chip to operate on
    #[arg(short, long, value_enum, default_value_t = Target::Hub)]
    pub target: Target,

    /// Session option for the target (key=value, repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("Invalid option format: '{}' (expected key=value)", s))
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the device and its flash chip
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read the firmware to a file
    Dump {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a firmware image
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Input image path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Decode a firmware image file
    Parse {
        /// Image path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List supported flash chips
    ListChips {
        /// Filter by vendor
        #[arg(long)]
        vendor: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write_command() {
        let cli = Cli::try_parse_from([
            "genesys-isp",
            "-v",
            "write",
            "-d",
            "dummy:scaler=1",
            "--target",
            "scaler",
            "-O",
            "model=mst9u",
            "-i",
            "fw.bin",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Write { device, input } => {
                assert_eq!(device.device, "dummy:scaler=1");
                assert_eq!(device.target, Target::Scaler);
                assert_eq!(device.options, vec![("model".to_string(), "mst9u".to_string())]);
                assert_eq!(input, PathBuf::from("fw.bin"));
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_bad_option_rejected() {
        assert!(Cli::try_parse_from(["genesys-isp", "info", "-d", "usb", "-O", "reset"]).is_err());
    }
}
