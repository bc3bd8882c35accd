use anyhow::{anyhow, bail, Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use std::net::Ipv4Addr;

/// Detect the subnet of the first usable local interface.
///
/// An interface address qualifies when it is IPv4, not loopback, not
/// link-local and inside a private range. The returned network is the one the
/// interface's own netmask describes.
pub fn detect_local_subnet() -> Result<Ipv4Net> {
    let ifaces = get_if_addrs().context("failed to get network interfaces")?;
    let candidates = ifaces.into_iter().filter_map(|iface| match iface.addr {
        IfAddr::V4(v4) => Some((v4.ip, v4.netmask)),
        IfAddr::V6(_) => None,
    });
    select_subnet(candidates).ok_or_else(|| anyhow!("no suitable network interface found"))
}

/// Pick the first qualifying `(address, netmask)` pair and return its network.
pub fn select_subnet(addrs: impl IntoIterator<Item = (Ipv4Addr, Ipv4Addr)>) -> Option<Ipv4Net> {
    addrs
        .into_iter()
        .filter(|(ip, _)| is_scannable_local(*ip))
        .find_map(|(ip, mask)| Ipv4Net::with_netmask(ip, mask).ok().map(|n| n.trunc()))
}

/// RFC 1918 address that is neither loopback nor link-local.
pub fn is_scannable_local(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && ip.is_private()
}

/// Parse an operator-supplied subnet.
///
/// A bare address is treated as a single host (`/32`). Host bits are masked
/// off, so `192.168.1.7/24` scans `192.168.1.0/24`.
pub fn parse_subnet(s: &str) -> Result<Ipv4Net> {
    let s = s.trim();
    let cidr = if s.contains('/') {
        s.to_string()
    } else {
        format!("{s}/32")
    };
    match cidr.parse::<IpNet>() {
        Ok(IpNet::V4(n4)) => Ok(n4.trunc()),
        Ok(IpNet::V6(_)) => bail!("IPv6 subnets are not supported: {s}"),
        Err(e) => bail!("invalid CIDR {s}: {e}"),
    }
}

/// Expand a subnet into every contained address, ascending.
///
/// The network and broadcast addresses are part of the sequence.
pub fn expand_subnet(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    (start..=end).map(Ipv4Addr::from).collect()
}

/// Whether `ip` sits inside a network attached to one of the local interfaces.
pub fn is_in_local_subnet(ip: Ipv4Addr) -> bool {
    let Ok(ifaces) = get_if_addrs() else {
        return false;
    };
    ifaces.into_iter().any(|iface| match iface.addr {
        IfAddr::V4(v4) if !v4.ip.is_loopback() => Ipv4Net::with_netmask(v4.ip, v4.netmask)
            .map(|n| n.contains(&ip))
            .unwrap_or(false),
        _ => false,
    })
}
