//! Tether CLI - list interfaces and discover devices

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether::{
    list_interfaces, DeviceIdentification, DeviceManager, EthernetIdentification,
    EthernetProtocol, LogLevel, Settings, UsbIdentification,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Discover USB and Ethernet devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tether.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error, critical, off)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List usable local network interfaces
    Interfaces {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Discover devices matching the given criteria, or those in the config file
    Devices {
        /// USB device as VID:PID in hex, e.g. 0403:6010
        #[arg(long, value_name = "VID:PID")]
        usb: Vec<String>,

        /// IP address or glob to probe; `*` scans every local subnet
        #[arg(long)]
        ip: Option<String>,

        /// Port to probe
        #[arg(long)]
        port: Option<u16>,

        /// Probe with UDP instead of TCP
        #[arg(long, conflicts_with = "http")]
        udp: bool,

        /// Probe as an HTTP device
        #[arg(long)]
        http: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Parse `VID:PID` with hexadecimal ids
fn parse_usb(text: &str) -> Result<UsbIdentification> {
    let Some((vid, pid)) = text.split_once(':') else {
        bail!("expected VID:PID, got '{}'", text);
    };
    let vid = u16::from_str_radix(vid.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid vendor id '{}'", vid))?;
    let pid = u16::from_str_radix(pid.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid product id '{}'", pid))?;
    Ok(UsbIdentification::new(vid, pid))
}

fn ethernet_criteria(ip: Option<String>, port: Option<u16>, udp: bool, http: bool) -> Option<DeviceIdentification> {
    if ip.is_none() && port.is_none() && !http {
        return None;
    }

    let protocol = if udp { EthernetProtocol::Udp } else { EthernetProtocol::Tcp };
    let criteria = EthernetIdentification::host(ip.unwrap_or_else(|| "*".to_string()), port.unwrap_or(0), protocol);
    Some(if http {
        DeviceIdentification::Http(criteria)
    } else {
        DeviceIdentification::Ethernet(criteria)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let found = args.config.exists();
    let mut settings = if found {
        Settings::load(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        Settings::default()
    };
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    tether::logging::init(&settings.logging, None)?;

    info!("Tether v{}", tether::version());
    if found {
        info!(path = %args.config.display(), "Configuration loaded");
    } else {
        info!(
            path = %args.config.display(),
            "Configuration file not found, using defaults"
        );
    }

    match args.command {
        Command::Interfaces { json } => {
            let interfaces = tokio::task::spawn_blocking(list_interfaces).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&interfaces)?);
            } else {
                println!("Found {} interfaces:", interfaces.len());
                for interface in interfaces {
                    println!("  - {}", interface);
                }
            }
        }
        Command::Devices {
            usb,
            ip,
            port,
            udp,
            http,
            json,
        } => {
            let mut criteria = usb
                .iter()
                .map(|text| parse_usb(text).map(DeviceIdentification::from))
                .collect::<Result<Vec<_>>>()?;
            criteria.extend(ethernet_criteria(ip, port, udp, http));
            if criteria.is_empty() {
                criteria = settings.devices.clone();
            }
            if criteria.is_empty() {
                bail!("no criteria given; pass --usb, --ip/--port or add [[device]] entries to the config file");
            }

            let manager = DeviceManager::from_settings(&settings);
            let devices = manager.discover(&criteria).await?;

            if json {
                let identities: Vec<_> = devices.iter().map(|device| device.info()).collect();
                println!("{}", serde_json::to_string_pretty(&identities)?);
            } else {
                println!("Discovered {} devices:", devices.len());
                for device in &devices {
                    println!("  - {}", device);
                }
            }

            manager.shutdown().await;
        }
    }

    Ok(())
}
