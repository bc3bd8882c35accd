use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// Transport a service was probed over. Only TCP connect probes exist today.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    #[serde(rename = "TCP")]
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

/// One probed port on one host.
///
/// Hosts only retain services whose probe completed with an open connection.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub port: u16,
    pub protocol: Protocol,
    pub service: String,
    pub version: String,
    pub banner: String,
    pub is_open: bool,
    #[serde(rename = "response_time_ms", serialize_with = "serialize_millis")]
    pub response_time: Duration,
}

/// One scanned address and everything learned about it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct HostInfo {
    pub ip: String,
    pub mac: String,
    pub vendor: String,
    pub hostname: String,
    pub is_reachable: bool,
    #[serde(rename = "response_time_ms", serialize_with = "serialize_millis")]
    pub response_time: Duration,
    /// Ascending by port once the host is finalized.
    pub services: Vec<ServiceInfo>,
}

impl HostInfo {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }
}

/// Lifecycle of a scan run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Enumerating,
    Scanning,
    Complete,
}

/// Point-in-time copy of the scan counters.
///
/// `hosts_scanned <= total_hosts` and `active_hosts <= hosts_scanned` hold for
/// every snapshot.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub current_host: String,
    pub hosts_scanned: usize,
    pub total_hosts: usize,
    pub active_hosts: usize,
    pub open_ports: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    /// `None` until the scan completes.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}
