//! FX Pedal GW
//!
//! Bridges foot pedals and a joystick to a virtual MIDI port as effect toggles.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxpedal_gw::config::parse_vid_pid;
use fxpedal_gw::hid::HidApiTransport;
use fxpedal_gw::midi::VirtualPort;
use fxpedal_gw::sniffer::{self, SniffOptions};
use fxpedal_gw::{AppConfig, Dispatcher};

/// FX Pedal Gateway - toggle MIDI effects from HID pedals and joysticks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, env = "FXPEDAL_CONFIG")]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// List connected HID devices
    #[arg(long)]
    list_devices: bool,

    /// Print the reports of one HID device (VID:PID, hex)
    #[arg(long, value_name = "VID:PID", value_parser = parse_vid_pid)]
    sniff: Option<(u16, u16)>,

    /// Sniffer run time in seconds
    #[arg(long, default_value = "30")]
    duration: u64,

    /// Sniffer prints every report, not only new patterns
    #[arg(long)]
    all_reports: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        return sniffer::list_ports();
    }

    if args.list_devices {
        return sniffer::list_devices();
    }

    if let Some((vendor_id, product_id)) = args.sniff {
        let options = SniffOptions {
            duration: Duration::from_secs(args.duration),
            all_reports: args.all_reports,
        };
        return sniffer::run_hid_sniffer(vendor_id, product_id, options).await;
    }

    let config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            AppConfig::load(path).await?
        }
        None => {
            info!("No configuration file given, using built-in defaults");
            AppConfig::builtin()
        }
    };

    if args.dump_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    info!("Starting FX Pedal GW v{}...", env!("CARGO_PKG_VERSION"));

    let port = VirtualPort::open(&config.midi.port_name)
        .context("MIDI output is required, aborting")?;
    info!(
        "🎹 MIDI port '{}' on channel {}",
        port.name(),
        config.midi.channel
    );

    let transport = HidApiTransport::new().context("Failed to initialise HID")?;
    let mut dispatcher = Dispatcher::from_config(&config, transport, port)?;

    let connected = dispatcher.connect_all();
    if connected == 0 {
        warn!("No input device connected yet, retrying every {}ms", config.polling.tick_ms);
    }
    dispatcher.log_mappings();
    info!("Ready. Press Ctrl+C to exit");

    dispatcher.run(shutdown_signal()).await;

    info!("FX Pedal GW shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
