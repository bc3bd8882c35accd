use crate::scanner::sort_hosts_by_ip;
use crate::types::{HostInfo, ScanPhase, ScanProgress};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Live store of a continuous scan, written by host workers and polled by the
/// dashboard.
///
/// Every accessor copies out under the read lock, so callers never see a
/// half-updated counter set or result list. Each scan run gets a generation
/// number; writes carrying a stale generation are ignored, which lets a
/// rescan discard whatever a superseded run is still finishing.
#[derive(Debug, Default)]
pub struct ScanState {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    phase: ScanPhase,
    cancel: Option<CancellationToken>,
    start_time: Option<OffsetDateTime>,
    end_time: Option<OffsetDateTime>,
    current_host: String,
    hosts_scanned: usize,
    total_hosts: usize,
    active_hosts: usize,
    open_ports: usize,
    results: Vec<HostInfo>,
}

/// Handle a scan run uses to write into [`ScanState`].
#[derive(Debug, Clone)]
pub struct ScanTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn progress(&self) -> ScanProgress {
        let s = self.inner.read().await;
        ScanProgress {
            phase: s.phase,
            current_host: s.current_host.clone(),
            hosts_scanned: s.hosts_scanned,
            total_hosts: s.total_hosts,
            active_hosts: s.active_hosts,
            open_ports: s.open_ports,
            start_time: s.start_time,
            end_time: s.end_time,
        }
    }

    /// Copy of the reachable hosts found so far, ascending by IP.
    pub async fn results(&self) -> Vec<HostInfo> {
        self.inner.read().await.results.clone()
    }

    /// True when no scan is running (including before the first one).
    pub async fn is_complete(&self) -> bool {
        matches!(
            self.inner.read().await.phase,
            ScanPhase::Idle | ScanPhase::Complete
        )
    }

    /// Reset everything for a new run and cancel the previous one.
    pub async fn begin(&self) -> ScanTicket {
        let mut s = self.inner.write().await;
        if let Some(old) = s.cancel.take() {
            old.cancel();
        }
        let cancel = CancellationToken::new();
        let generation = s.generation + 1;
        *s = Inner {
            generation,
            phase: ScanPhase::Enumerating,
            cancel: Some(cancel.clone()),
            start_time: Some(OffsetDateTime::now_utc()),
            ..Inner::default()
        };
        ScanTicket { generation, cancel }
    }

    pub async fn set_total(&self, ticket: &ScanTicket, total: usize) {
        let mut s = self.inner.write().await;
        if s.generation == ticket.generation {
            s.total_hosts = total;
            s.phase = ScanPhase::Scanning;
        }
    }

    pub async fn mark_current(&self, ticket: &ScanTicket, ip: &str) {
        let mut s = self.inner.write().await;
        if s.generation == ticket.generation {
            s.current_host = ip.to_string();
        }
    }

    /// Fold one finished host into the counters. Only reachable hosts join
    /// the result list, which stays sorted by IP after every insertion.
    pub async fn record_host(&self, ticket: &ScanTicket, host: HostInfo) {
        let mut s = self.inner.write().await;
        if s.generation != ticket.generation || s.hosts_scanned >= s.total_hosts {
            return;
        }
        s.hosts_scanned += 1;
        if host.is_reachable {
            s.active_hosts += 1;
            s.open_ports += host.services.len();
            s.results.push(host);
            sort_hosts_by_ip(&mut s.results);
        }
    }

    pub async fn finish(&self, ticket: &ScanTicket) {
        let mut s = self.inner.write().await;
        if s.generation == ticket.generation {
            s.phase = ScanPhase::Complete;
            s.end_time = Some(OffsetDateTime::now_utc());
            s.cancel = None;
        }
    }
}
