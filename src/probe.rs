use crate::ports::service_name;
use crate::types::{Protocol, ServiceInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

const BANNER_READ_LIMIT: usize = 1024;
const BANNER_MAX_CHARS: usize = 100;

static RE_HTTP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(Apache|nginx|IIS)/([0-9.]+)").unwrap());
static RE_SSH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(OpenSSH)[_\s]([0-9.]+)").unwrap());
static RE_FTP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(FileZilla|vsftpd|ProFTPD)\s+([0-9.]+)").unwrap());
static RE_SMTP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(Postfix|Sendmail|Exchange)\s+([0-9.]+)").unwrap());
static RE_GENERIC_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+\.[0-9]+(?:\.[0-9]+)?").unwrap());

/// Why a probe did not yield an open port.
#[derive(Debug, Error)]
pub enum ProbeErrorKind {
    #[error("connect timed out")]
    TimedOut,
    #[error("probe cancelled")]
    Cancelled,
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
}

/// A failed probe. `service` is still filled in (closed, with the time spent)
/// for diagnostics.
#[derive(Debug, Error)]
#[error("{addr}: {kind}")]
pub struct ProbeError {
    pub addr: SocketAddr,
    #[source]
    pub kind: ProbeErrorKind,
    pub service: ServiceInfo,
}

/// Single TCP connect to `ip:port` bounded by `timeout`, followed by a banner
/// read bounded by the same timeout.
///
/// No retries. Cancelling `cancel` aborts an in-flight connect or read.
pub async fn probe(
    ip: IpAddr,
    port: u16,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ServiceInfo, ProbeError> {
    let addr = SocketAddr::new(ip, port);
    let service = service_name(port);
    let start = Instant::now();

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeErrorKind::Cancelled),
        res = time::timeout(timeout, TcpStream::connect(addr)) => match res {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ProbeErrorKind::Connect(e)),
            Err(_) => Err(ProbeErrorKind::TimedOut),
        },
    };
    let response_time = start.elapsed();

    let mut stream = match connected {
        Ok(stream) => stream,
        Err(kind) => {
            return Err(ProbeError {
                addr,
                kind,
                service: ServiceInfo {
                    port,
                    protocol: Protocol::Tcp,
                    service: service.to_string(),
                    version: String::new(),
                    banner: String::new(),
                    is_open: false,
                    response_time,
                },
            });
        }
    };

    let banner = tokio::select! {
        _ = cancel.cancelled() => String::new(),
        b = grab_banner(&mut stream, ip, port, timeout) => b,
    };
    let version = extract_version(&banner, service);

    Ok(ServiceInfo {
        port,
        protocol: Protocol::Tcp,
        service: service.to_string(),
        version,
        banner,
        is_open: true,
        response_time,
    })
}

/// Send the port's trigger (if any) and read up to 1 KiB, returning the
/// cleaned banner or an empty string.
async fn grab_banner(stream: &mut TcpStream, ip: IpAddr, port: u16, timeout: Duration) -> String {
    if let Some(trigger) = trigger_for(port, ip) {
        if stream.write_all(trigger.as_bytes()).await.is_err() {
            return String::new();
        }
    }

    let mut buf = vec![0u8; BANNER_READ_LIMIT];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => clean_banner(&buf[..n]),
        _ => String::new(),
    }
}

/// Bytes to send before reading. Other services are read passively.
fn trigger_for(port: u16, ip: IpAddr) -> Option<String> {
    match port {
        80 | 8080 => Some(format!("GET / HTTP/1.1\r\nHost: {ip}\r\n\r\n")),
        _ => None,
    }
}

/// Keep runs of printable ASCII, join them with single spaces and cap the
/// result at 100 characters plus `...`.
pub fn clean_banner(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let runs: Vec<&str> = text
        .trim()
        .split(|c: char| !(c == ' ' || c.is_ascii_graphic()))
        .filter(|run| !run.is_empty())
        .collect();
    let mut cleaned = runs.join(" ");
    if cleaned.len() > BANNER_MAX_CHARS {
        cleaned.truncate(BANNER_MAX_CHARS);
        cleaned.push_str("...");
    }
    cleaned
}

/// Infer a version string from a banner.
///
/// Services with a dedicated pattern yield `"<product> <version>"`; otherwise
/// the first `major.minor[.patch]` token in the banner is used.
pub fn extract_version(banner: &str, service: &str) -> String {
    if banner.is_empty() {
        return String::new();
    }

    let specific = match service {
        "HTTP" => Some(&*RE_HTTP),
        "SSH" => Some(&*RE_SSH),
        "FTP" => Some(&*RE_FTP),
        "SMTP" => Some(&*RE_SMTP),
        _ => None,
    };
    if let Some(caps) = specific.and_then(|re| re.captures(banner)) {
        return format!("{} {}", &caps[1], &caps[2]);
    }

    RE_GENERIC_VERSION
        .find(banner)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
