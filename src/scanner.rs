use crate::config::ScanConfig;
use crate::discovery::{self, PingProbe, Reachability};
use crate::netdetect::{expand_subnet, parse_subnet};
use crate::pool::run_bounded;
use crate::probe::probe;
use crate::state::{ScanState, ScanTicket};
use crate::types::{HostInfo, ServiceInfo};
use crate::vendor::VendorResolver;
use anyhow::Result;
use ipnet::Ipv4Net;
use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives host workers and, per host, port workers.
///
/// Hosts are taken `host_workers` at a time; each host runs its own pool of
/// `port_workers` probes, so a host that stalls holds one host slot and
/// nothing else.
pub struct Scanner {
    vendor: Arc<VendorResolver>,
    reachability: Arc<dyn Reachability>,
    state: Arc<ScanState>,
}

impl Scanner {
    pub fn new(
        vendor: Arc<VendorResolver>,
        reachability: Arc<dyn Reachability>,
        state: Arc<ScanState>,
    ) -> Self {
        Self {
            vendor,
            reachability,
            state,
        }
    }

    /// Scanner using the system `ping` for reachability.
    pub fn with_ping(vendor: Arc<VendorResolver>, state: Arc<ScanState>) -> Self {
        Self::new(vendor, Arc::new(PingProbe), state)
    }

    pub fn state(&self) -> &Arc<ScanState> {
        &self.state
    }

    pub fn vendor(&self) -> &Arc<VendorResolver> {
        &self.vendor
    }

    /// One-shot scan: every address in `subnet` is probed and returned,
    /// reachable or not, in completion order.
    pub async fn scan_subnet(
        self: &Arc<Self>,
        subnet: Ipv4Net,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Vec<HostInfo> {
        let ips = expand_subnet(subnet);
        info!(%subnet, hosts = ips.len(), "starting one-shot scan");

        let scanner = self.clone();
        let config = Arc::new(config.clone());
        let host_workers = config.host_workers;
        let scan_cancel = cancel.clone();
        run_bounded(ips, host_workers, cancel, move |ip| {
            let scanner = scanner.clone();
            let config = config.clone();
            let cancel = scan_cancel.clone();
            async move { scanner.scan_host(ip, &config, &cancel).await }
        })
        .await
    }

    /// Start a live scan in the background and return at once.
    ///
    /// The shared state is reset first and any scan still running is
    /// cancelled. Only an unparseable subnet fails.
    pub async fn start_scan(
        self: &Arc<Self>,
        subnet: &str,
        config: ScanConfig,
    ) -> Result<JoinHandle<()>> {
        let net = parse_subnet(subnet)?;
        let ticket = self.state.begin().await;
        let scanner = self.clone();
        Ok(tokio::spawn(async move {
            scanner.run_continuous(net, config, ticket).await;
        }))
    }

    async fn run_continuous(self: Arc<Self>, subnet: Ipv4Net, config: ScanConfig, ticket: ScanTicket) {
        let ips = expand_subnet(subnet);
        info!(%subnet, hosts = ips.len(), "starting live scan");
        self.state.set_total(&ticket, ips.len()).await;

        let scanner = self.clone();
        let config = Arc::new(config);
        let host_workers = config.host_workers;
        let job_ticket = ticket.clone();
        run_bounded(ips, host_workers, &ticket.cancel, move |ip| {
            let scanner = scanner.clone();
            let config = config.clone();
            let ticket = job_ticket.clone();
            async move {
                scanner.state.mark_current(&ticket, &ip.to_string()).await;
                let host = scanner.scan_host(ip, &config, &ticket.cancel).await;
                scanner.state.record_host(&ticket, host).await;
            }
        })
        .await;

        self.state.finish(&ticket).await;
        info!(%subnet, "live scan finished");
    }

    /// Probe one host: reachability, then hostname, MAC and vendor, then the
    /// port fan-out.
    ///
    /// An unreachable host is returned right after the reachability check.
    /// Lookup failures leave the corresponding field empty.
    pub async fn scan_host(
        &self,
        ip: Ipv4Addr,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> HostInfo {
        let cancel = cancel.child_token();
        let _done = cancel.clone().drop_guard();
        if let Some(deadline) = config.host_deadline {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = time::sleep(deadline) => timer.cancel(),
                    _ = timer.cancelled() => {}
                }
            });
        }

        let mut host = HostInfo::new(ip.to_string());
        let (reachable, response_time) = self
            .reachability
            .probe_reachability(ip, config.timeout, &cancel)
            .await;
        host.is_reachable = reachable;
        host.response_time = response_time;
        if !reachable {
            return host;
        }

        host.hostname = tokio::select! {
            _ = cancel.cancelled() => String::new(),
            name = discovery::reverse_dns(ip) => name,
        };
        host.mac = tokio::select! {
            _ = cancel.cancelled() => String::new(),
            mac = discovery::lookup_mac(ip) => mac,
        };
        if !host.mac.is_empty() {
            host.vendor = self.lookup_vendor(&host.mac, &cancel).await;
        }

        if config.discovery_only {
            return host;
        }

        host.services = scan_ports(ip, config, &cancel).await;
        debug!(%ip, open = host.services.len(), "host finished");
        host
    }

    /// Vendor for `mac`, or empty once `cancel` fires. A registry download
    /// abandoned here is picked up again by the next lookup.
    async fn lookup_vendor(&self, mac: &str, cancel: &CancellationToken) -> String {
        tokio::select! {
            _ = cancel.cancelled() => String::new(),
            vendor = self.vendor.resolve(mac) => vendor,
        }
    }
}

/// Probe the configured ports of one host; open ones come back ascending.
async fn scan_ports(ip: Ipv4Addr, config: &ScanConfig, cancel: &CancellationToken) -> Vec<ServiceInfo> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let timeout = config.timeout;
    let sink = found.clone();
    let port_cancel = cancel.clone();
    run_bounded(config.ports.ports(), config.port_workers, cancel, move |port| {
        let sink = sink.clone();
        let cancel = port_cancel.clone();
        async move {
            if let Ok(service) = probe(IpAddr::V4(ip), port, timeout, &cancel).await {
                sink.lock().await.push(service);
            }
        }
    })
    .await;

    let mut services = std::mem::take(&mut *found.lock().await);
    services.sort_by_key(|s| s.port);
    services
}

/// Sort hosts by IP: IPv4 addresses ascending by numeric value, then anything
/// that does not parse as IPv4 in lexical order. Stable.
///
/// Mixed pairs are not compared lexically: numeric order for parseable pairs
/// plus lexical order for mixed ones is not transitive, so every address
/// sorts ahead of every non-address instead.
pub fn sort_hosts_by_ip(hosts: &mut [HostInfo]) {
    hosts.sort_by(|a, b| compare_ips(&a.ip, &b.ip));
}

fn compare_ips(a: &str, b: &str) -> Ordering {
    match (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) {
        (Ok(x), Ok(y)) => u32::from(x).cmp(&u32::from(y)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
