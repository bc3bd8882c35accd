use crate::types::HostInfo;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CSV_HEADER: [&str; 8] = [
    "IP Address",
    "MAC Address",
    "Vendor",
    "Hostname",
    "Is Reachable",
    "Response Time (ms)",
    "Open Ports",
    "Services",
];

/// Write `hosts` as CSV to `path`, one row per host in the given order.
pub fn export_csv(path: &Path, hosts: &[HostInfo]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(file, hosts)
}

/// CSV rendering shared by file export and tests.
pub fn write_csv<W: Write>(writer: W, hosts: &[HostInfo]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for host in hosts {
        wtr.write_record(host_row(host))?;
    }
    wtr.flush()?;
    Ok(())
}

fn host_row(host: &HostInfo) -> [String; 8] {
    let ports: Vec<String> = host.services.iter().map(|s| s.port.to_string()).collect();
    let services: Vec<String> = host
        .services
        .iter()
        .map(|s| {
            if s.version.is_empty() {
                format!("{}/{}", s.port, s.service)
            } else {
                format!("{}/{} ({})", s.port, s.service, s.version)
            }
        })
        .collect();

    [
        host.ip.clone(),
        host.mac.clone(),
        host.vendor.clone(),
        host.hostname.clone(),
        host.is_reachable.to_string(),
        format!("{:.2}", host.response_time.as_secs_f64() * 1000.0),
        ports.join(";"),
        services.join(";"),
    ]
}
