//! Device string handling and session setup

use genesys_core::usb::UsbTransport;
use genesys_dummy::{DummyConfig, DummyHub};
use genesys_scaler::Scaler;
use genesys_usbhub::UsbHub;

use crate::cli::{DeviceArgs, Target};

/// Transport behind a session, chosen at runtime
pub type BoxedTransport = Box<dyn UsbTransport>;

/// An opened hub or scaler
pub enum Session {
    /// Hub firmware session
    Hub(UsbHub<BoxedTransport>),
    /// Scaler firmware session
    Scaler(Scaler<BoxedTransport>),
}

/// Split "name" or "name:key1=value1,key2=value2" into name and options
pub fn parse_device_string(s: &str) -> Result<(&str, Vec<(&str, &str)>), Box<dyn std::error::Error>> {
    let (name, opts) = s.split_once(':').unwrap_or((s, ""));
    let mut options = Vec::new();
    for opt in opts.split(',').filter(|o| !o.is_empty()) {
        match opt.split_once('=') {
            Some(kv) => options.push(kv),
            None => {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                )
            }
        }
    }
    Ok((name, options))
}

fn open_transport(device: &str) -> Result<BoxedTransport, Box<dyn std::error::Error>> {
    let (name, options) = parse_device_string(device)?;

    match name {
        "dummy" => {
            let config = DummyConfig::parse_options(&options)?;
            log::info!("Using emulated {} hub", config.model);
            Ok(Box::new(DummyHub::new(config)?))
        }

        #[cfg(feature = "usb")]
        "usb" => {
            let config = genesys_nusb::parse_options(&options)?;
            let transport = genesys_nusb::NusbTransport::open_with_config(&config).map_err(|e| {
                format!(
                    "Failed to open hub: {}\nMake sure the device is connected and you have permissions.",
                    e
                )
            })?;
            Ok(Box::new(transport))
        }

        _ => Err(format!(
            "Unknown device: {}\nAvailable devices: dummy{}",
            name,
            if cfg!(feature = "usb") { ", usb" } else { "" }
        )
        .into()),
    }
}

/// Open the transport and the session selected by `args`
pub fn open_session(args: &DeviceArgs) -> Result<Session, Box<dyn std::error::Error>> {
    let transport = open_transport(&args.device)?;
    let options: Vec<(&str, &str)> = args
        .options
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let session = match args.target {
        Target::Hub => {
            let config = genesys_usbhub::parse_options(&options)?;
            Session::Hub(UsbHub::open(transport, config)?)
        }
        Target::Scaler => {
            let config = genesys_scaler::parse_options(&options)?;
            Session::Scaler(Scaler::open(transport, config)?)
        }
    };
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(device: &str, target: Target) -> DeviceArgs {
        DeviceArgs {
            device: device.to_string(),
            target,
            options: Vec::new(),
        }
    }

    #[test]
    fn test_parse_device_string() {
        let (name, options) = parse_device_string("usb").unwrap();
        assert_eq!(name, "usb");
        assert!(options.is_empty());

        let (name, options) = parse_device_string("dummy:model=gl3590,scaler=2").unwrap();
        assert_eq!(name, "dummy");
        assert_eq!(options, vec![("model", "gl3590"), ("scaler", "2")]);

        assert!(parse_device_string("dummy:model").is_err());
    }

    #[test]
    fn test_open_dummy_sessions() {
        match open_session(&args("dummy", Target::Hub)).unwrap() {
            Session::Hub(hub) => assert_eq!(hub.flash_chip().unwrap().name, "W25X40"),
            Session::Scaler(_) => panic!("expected hub"),
        }
        match open_session(&args("dummy:scaler=1", Target::Scaler)).unwrap() {
            Session::Scaler(scaler) => assert_eq!(scaler.flash_chip().unwrap().name, "W25Q80"),
            Session::Hub(_) => panic!("expected scaler"),
        }
    }

    #[test]
    fn test_unknown_device() {
        assert!(open_session(&args("ch341a", Target::Hub)).is_err());
    }
}
