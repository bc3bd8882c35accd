//! Host-level lookups that depend on the operating system: ICMP reachability
//! through the platform `ping`, reverse DNS and the neighbour (ARP) table.

use crate::netdetect;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound for reverse DNS and neighbour-table subprocesses.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

static RE_MAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}").unwrap());

/// Reachability check for a single host.
///
/// The scanner only ever talks to this seam, so tests can script which hosts
/// answer.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Returns whether the host answered and how long the check took.
    async fn probe_reachability(
        &self,
        ip: Ipv4Addr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (bool, Duration);
}

/// Reachability through one echo request sent by the system `ping` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

#[async_trait]
impl Reachability for PingProbe {
    async fn probe_reachability(
        &self,
        ip: Ipv4Addr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (bool, Duration) {
        let start = Instant::now();
        let mut cmd = ping_command(ip, timeout);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // ping enforces its own deadline; the outer one covers a wedged binary.
        let outer = ping_wait(timeout) + Duration::from_secs(1);
        let ok = tokio::select! {
            _ = cancel.cancelled() => false,
            res = time::timeout(outer, cmd.status()) => match res {
                Ok(Ok(status)) => status.success(),
                Ok(Err(e)) => {
                    debug!(%ip, error = %e, "failed to spawn ping");
                    false
                }
                Err(_) => false,
            },
        };
        (ok, start.elapsed())
    }
}

#[cfg(windows)]
fn ping_command(ip: Ipv4Addr, timeout: Duration) -> Command {
    let mut cmd = Command::new("ping");
    cmd.arg("-n")
        .arg("1")
        .arg("-w")
        .arg(timeout.as_millis().to_string())
        .arg(ip.to_string());
    cmd
}

#[cfg(not(windows))]
fn ping_command(ip: Ipv4Addr, timeout: Duration) -> Command {
    let mut cmd = Command::new("ping");
    cmd.arg("-c")
        .arg("1")
        .arg("-W")
        .arg(ping_wait(timeout).as_secs().to_string())
        .arg(ip.to_string());
    cmd
}

/// Wait passed to ping. POSIX ping takes whole seconds, so anything below one
/// second becomes one second.
pub fn ping_wait(timeout: Duration) -> Duration {
    if cfg!(windows) {
        timeout
    } else {
        Duration::from_secs(timeout.as_secs().max(1))
    }
}

/// Reverse DNS name for `ip` without the trailing dot, or empty.
pub async fn reverse_dns(ip: Ipv4Addr) -> String {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)));
    match time::timeout(LOOKUP_TIMEOUT, lookup).await {
        Ok(Ok(Ok(name))) => {
            let name = name.trim_end_matches('.');
            // Resolvers without a PTR record hand the address back.
            if name == ip.to_string() {
                String::new()
            } else {
                name.to_string()
            }
        }
        _ => String::new(),
    }
}

/// MAC address of `ip` from the neighbour table, upper-case and colon
/// separated, or empty when it cannot be found.
///
/// On POSIX `ip neighbor` is asked first and `arp -n` second. If both come up
/// empty and the host is on a directly attached network, one `arping` is sent
/// to populate the table before asking again.
pub async fn lookup_mac(ip: Ipv4Addr) -> String {
    let target = ip.to_string();

    if cfg!(windows) {
        let out = run_capture("arp", &["-a", &target]).await;
        return parse_mac(&out, &target).unwrap_or_default();
    }

    let mut out = run_capture("ip", &["neighbor", "show", &target]).await;
    if out.trim().is_empty() {
        out = run_capture("arp", &["-n", &target]).await;
    }
    if out.trim().is_empty() && netdetect::is_in_local_subnet(ip) {
        let _ = run_capture("arping", &["-c", "1", "-w", "1", &target]).await;
        out = run_capture("ip", &["neighbor", "show", &target]).await;
    }
    parse_mac(&out, &target).unwrap_or_default()
}

/// Pull a MAC address out of `ip neighbor` / `arp` output for `target`.
pub fn parse_mac(output: &str, target: &str) -> Option<String> {
    for line in output.lines() {
        if cfg!(windows) && !line.contains(target) {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(pos) = fields.iter().position(|f| *f == "lladdr") {
            if let Some(mac) = fields.get(pos + 1) {
                return Some(normalize_mac(mac));
            }
        }

        if let Some(mac) = fields.iter().find(|f| RE_MAC.is_match(f)) {
            return Some(normalize_mac(mac));
        }
    }
    None
}

/// Upper-case, colon-separated form of a MAC address.
pub fn normalize_mac(mac: &str) -> String {
    mac.replace('-', ":").to_uppercase()
}

async fn run_capture(program: &str, args: &[&str]) -> String {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match time::timeout(LOOKUP_TIMEOUT, cmd.output()).await {
        Ok(Ok(out)) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        Ok(Ok(_)) => String::new(),
        Ok(Err(e)) => {
            debug!(program, error = %e, "neighbour lookup command failed");
            String::new()
        }
        Err(_) => String::new(),
    }
}
