use anyhow::{bail, Context, Result};
use serde::Serialize;

/// Well-known ports and the service names reported for them.
const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
];

/// Which ports a host worker fans out over.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortSelection {
    /// Explicit list, probed as given.
    List(Vec<u16>),
    /// Inclusive range.
    Range { start: u16, end: u16 },
}

impl PortSelection {
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortSelection::List(ports) => ports.clone(),
            PortSelection::Range { start, end } => (*start..=*end).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PortSelection::List(ports) => ports.is_empty(),
            PortSelection::Range { start, end } => start > end,
        }
    }
}

impl Default for PortSelection {
    fn default() -> Self {
        PortSelection::List(default_ports())
    }
}

/// Parse a comma-separated port list such as `"22, 80,,443"`.
///
/// Tokens are trimmed and blank tokens skipped; order is preserved and
/// duplicates are kept. Any non-numeric token or value outside 1..=65535 is an
/// error.
pub fn parse_port_list(s: &str) -> Result<Vec<u16>> {
    let mut out = Vec::new();
    for token in s.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let port = parse_port_str(token).with_context(|| format!("invalid port '{token}'"))?;
        out.push(port);
    }
    Ok(out)
}

/// Service name for a port, `"Unknown"` outside the well-known table.
pub fn service_name(port: u16) -> &'static str {
    WELL_KNOWN
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// The well-known ports, ascending. Scanned when no list or range is given.
pub fn default_ports() -> Vec<u16> {
    WELL_KNOWN.iter().map(|(p, _)| *p).collect()
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: i64 = s.parse::<i64>().map_err(|e| anyhow::anyhow!(e))?;
    if !(1..=65535).contains(&val) {
        bail!("port {val} out of range (1-65535)");
    }
    Ok(val as u16)
}
