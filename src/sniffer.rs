//! Diagnostic tools: MIDI port listing, HID enumeration and a HID report sniffer
//!
//! The sniffer is what you use to learn the byte patterns of a new pedal
//! before adding it as a `custom` device.

use anyhow::{Context, Result};
use colored::*;
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hid::{format_ids, DeviceDescriptor, HidApiTransport, HidHandle, HidTransport, MAX_REPORT_LEN};
use crate::midi::{format_hex, list_output_ports};

/// How often the sniffer polls the device
const SNIFF_POLL: Duration = Duration::from_millis(10);

/// Sniffer behaviour
#[derive(Debug, Clone)]
pub struct SniffOptions {
    pub duration: Duration,
    /// Print every report instead of only the first of each kind
    pub all_reports: bool,
}

/// Distinct reports in order of first appearance
#[derive(Debug, Default)]
pub struct PatternLog {
    seen: HashSet<Vec<u8>>,
    order: Vec<Vec<u8>>,
    total: usize,
}

impl PatternLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report; `true` the first time this exact report is seen
    pub fn observe(&mut self, report: &[u8]) -> bool {
        self.total += 1;
        if self.seen.insert(report.to_vec()) {
            self.order.push(report.to_vec());
            true
        } else {
            false
        }
    }

    pub fn unique(&self) -> &[Vec<u8>] {
        &self.order
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// List MIDI output ports, numbered
pub fn list_ports() -> Result<()> {
    let ports = list_output_ports().context("Failed to query MIDI output ports")?;

    println!("\n{}", "=== Available MIDI Output Ports ===".bold().cyan());
    if ports.is_empty() {
        println!("  {}", "No output ports found".dimmed());
    } else {
        for (idx, name) in ports.iter().enumerate() {
            println!("  {} {}", format!("[{}]", idx).yellow(), name);
        }
    }
    println!();
    Ok(())
}

/// List every HID device the system exposes
pub fn list_devices() -> Result<()> {
    let mut transport = HidApiTransport::new().context("Failed to initialise HID")?;
    let devices = transport.enumerate_all();

    println!("\n{}", "=== HID Devices ===".bold().cyan());
    if devices.is_empty() {
        println!("  {}", "No HID devices found".dimmed());
    }
    for device in &devices {
        print_device(device);
    }
    println!();
    Ok(())
}

fn print_device(device: &DeviceDescriptor) {
    let na = || "N/A".to_string();
    println!("\n  {}", device.id_string().bold().green());
    println!("    Manufacturer: {}", device.manufacturer.clone().unwrap_or_else(na));
    println!("    Product:      {}", device.product.clone().unwrap_or_else(na));
    println!("    Serial:       {}", device.serial_number.clone().unwrap_or_else(na));
    println!("    Interface:    {}", device.interface_number);
    println!(
        "    Path:         {}",
        device
            .path
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(na)
            .dimmed()
    );
}

/// Open `vendor_id:product_id` with hidapi and print its reports until
/// Ctrl+C or the configured duration elapses
pub async fn run_hid_sniffer(vendor_id: u16, product_id: u16, options: SniffOptions) -> Result<()> {
    let mut transport = HidApiTransport::new().context("Failed to initialise HID")?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let log = sniff(&mut transport, vendor_id, product_id, &options, shutdown).await?;
    print_summary(&log);
    Ok(())
}

/// Poll one device and record its reports
pub async fn sniff<T, F>(
    transport: &mut T,
    vendor_id: u16,
    product_id: u16,
    options: &SniffOptions,
    shutdown: F,
) -> Result<PatternLog>
where
    T: HidTransport,
    F: Future<Output = ()>,
{
    let ids = format_ids(vendor_id, product_id);
    let mut handle = transport
        .open(vendor_id, product_id)
        .with_context(|| format!("Failed to open HID device {}", ids))?;
    handle
        .set_nonblocking(true)
        .context("Failed to enable non-blocking reads")?;

    println!("{}", format!("=== HID Sniffer ({}) ===", ids).bold().cyan());
    println!(
        "Press buttons on the device. Stops after {}s or Ctrl+C\n",
        options.duration.as_secs()
    );

    let mut log = PatternLog::new();
    let mut buf = [0u8; MAX_REPORT_LEN];
    let started = Instant::now();
    let deadline = tokio::time::sleep(options.duration);
    let mut ticker = tokio::time::interval(SNIFF_POLL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match handle.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        let report = &buf[..n];
                        let new = log.observe(report);
                        if new || options.all_reports {
                            print_report(started.elapsed(), report, new);
                        }
                    }
                    Err(e) => {
                        println!("{} {}", "Device lost:".red(), e);
                        break;
                    }
                }
            }
            _ = &mut deadline => {
                debug!("Sniff duration elapsed");
                break;
            }
            _ = &mut shutdown => {
                info!("Sniffer interrupted");
                break;
            }
        }
    }

    if let Err(e) = handle.close() {
        debug!("Ignoring close error on {}: {}", ids, e);
    }
    Ok(log)
}

fn print_report(elapsed: Duration, report: &[u8], new: bool) {
    let marker = if new { "NEW".green() } else { "   ".normal() };
    println!(
        "[{:>8}ms] {} {:?} | {}",
        elapsed.as_millis().to_string().dimmed(),
        marker,
        report,
        format_hex(report).bright_black()
    );
}

fn print_summary(log: &PatternLog) {
    println!(
        "\n{}",
        format!(
            "=== {} unique pattern(s) in {} report(s) ===",
            log.unique().len(),
            log.total()
        )
        .bold()
        .yellow()
    );
    for (idx, pattern) in log.unique().iter().enumerate() {
        println!("  {:>3}: {:?}", idx + 1, pattern);
    }
}
