use crate::ports::PortSelection;
use std::time::Duration;

/// Hosts probed in parallel.
pub const HOST_WORKERS: usize = 10;
/// Ports probed in parallel per host for one-shot scans.
pub const BATCH_PORT_WORKERS: usize = 20;
/// Ports probed in parallel per host for live scans.
pub const CONTINUOUS_PORT_WORKERS: usize = 100;
/// Per-port (and per-ping) timeout when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Settings for one scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Connect, banner-read and ping timeout.
    pub timeout: Duration,
    pub host_workers: usize,
    pub port_workers: usize,
    pub ports: PortSelection,
    /// Stop after reachability, DNS and MAC lookups.
    pub discovery_only: bool,
    /// Hard bound on the time spent on a single host.
    pub host_deadline: Option<Duration>,
}

impl ScanConfig {
    /// Settings for the CSV path: few port workers and a per-host deadline of
    /// ten timeouts so dead subnets finish quickly.
    pub fn batch(ports: PortSelection, timeout: Duration, discovery_only: bool) -> Self {
        Self {
            timeout,
            host_workers: HOST_WORKERS,
            port_workers: BATCH_PORT_WORKERS,
            ports,
            discovery_only,
            host_deadline: Some(timeout * 10),
        }
    }

    /// Settings for the live dashboard.
    pub fn continuous(ports: PortSelection, timeout: Duration, discovery_only: bool) -> Self {
        Self {
            timeout,
            host_workers: HOST_WORKERS,
            port_workers: CONTINUOUS_PORT_WORKERS,
            ports,
            discovery_only,
            host_deadline: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::continuous(PortSelection::default(), DEFAULT_TIMEOUT, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_bounds_each_host() {
        let cfg = ScanConfig::batch(PortSelection::default(), Duration::from_millis(300), false);
        assert_eq!(cfg.host_deadline, Some(Duration::from_secs(3)));
        assert_eq!(cfg.port_workers, BATCH_PORT_WORKERS);
        assert_eq!(ScanConfig::default().host_deadline, None);
    }
}
