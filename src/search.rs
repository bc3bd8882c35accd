use crate::scanner::sort_hosts_by_ip;
use crate::types::HostInfo;
use std::collections::BTreeSet;

/// `text` contains `pattern`, or `pattern`'s characters appear in `text` in
/// order. An empty pattern matches everything.
pub fn fuzzy_match(text: &str, pattern: &str) -> bool {
    if pattern.is_empty() || text.contains(pattern) {
        return true;
    }
    let mut wanted = pattern.chars().peekable();
    for c in text.chars() {
        if wanted.peek() == Some(&c) {
            wanted.next();
        }
    }
    wanted.peek().is_none()
}

/// Match `term` (already lower-case) against every text field of a host and
/// its services.
pub fn matches_search(host: &HostInfo, term: &str) -> bool {
    let field = |s: &str| !s.is_empty() && fuzzy_match(&s.to_lowercase(), term);

    fuzzy_match(&host.ip.to_lowercase(), term)
        || field(&host.hostname)
        || field(&host.vendor)
        || field(&host.mac)
        || host
            .services
            .iter()
            .any(|s| fuzzy_match(&s.service.to_lowercase(), term) || field(&s.version) || field(&s.banner))
}

/// Match `term` (already lower-case) against the IP and vendor only.
pub fn matches_focused_search(host: &HostInfo, term: &str) -> bool {
    fuzzy_match(&host.ip.to_lowercase(), term)
        || (!host.vendor.is_empty() && fuzzy_match(&host.vendor.to_lowercase(), term))
}

/// Only digits and dots.
pub fn is_ip_pattern(term: &str) -> bool {
    !term.is_empty() && term.chars().all(|c| c == '.' || c.is_ascii_digit())
}

/// Contains at least one ASCII letter.
pub fn is_vendor_pattern(term: &str) -> bool {
    term.chars().any(|c| c.is_ascii_alphabetic())
}

/// Hosts matching `term`, sorted by IP.
///
/// Focused mode only looks at IP and vendor; an IP-looking term is then a
/// plain substring match on the IP and a term with letters a plain substring
/// match on the vendor. A blank term yields every host.
pub fn filter_hosts(hosts: &[HostInfo], term: &str, focused: bool) -> Vec<HostInfo> {
    let term = term.trim().to_lowercase();
    let mut out: Vec<HostInfo> = hosts
        .iter()
        .filter(|h| term.is_empty() || host_matches(h, &term, focused))
        .cloned()
        .collect();
    sort_hosts_by_ip(&mut out);
    out
}

fn host_matches(host: &HostInfo, term: &str, focused: bool) -> bool {
    if !focused {
        return matches_search(host, term);
    }
    if is_ip_pattern(term) {
        host.ip.to_lowercase().contains(term)
    } else if is_vendor_pattern(term) {
        !host.vendor.is_empty() && host.vendor.to_lowercase().contains(term)
    } else {
        matches_focused_search(host, term)
    }
}

/// Short list of the distinct known vendors, for summaries.
pub fn unique_vendors(hosts: &[HostInfo]) -> String {
    let vendors: BTreeSet<&str> = hosts
        .iter()
        .map(|h| h.vendor.as_str())
        .filter(|v| !v.is_empty() && *v != crate::vendor::UNKNOWN_VENDOR)
        .collect();

    if vendors.is_empty() {
        return "None detected".to_string();
    }
    let names: Vec<&str> = vendors.iter().copied().collect();
    if names.len() > 5 {
        format!("{} and {} more", names[..5].join(", "), names.len() - 5)
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(ip: &str, vendor: &str, hostname: &str) -> HostInfo {
        HostInfo {
            vendor: vendor.into(),
            hostname: hostname.into(),
            ..HostInfo::new(ip)
        }
    }

    fn sample() -> Vec<HostInfo> {
        vec![
            host("192.168.1.1", "Dell", "server1"),
            host("192.168.1.2", "HP", "server2"),
            host("10.0.0.1", "Cisco", "router"),
        ]
    }

    #[test]
    fn fuzzy_subsequence() {
        assert!(fuzzy_match("raspberry pi", "rpi"));
        assert!(fuzzy_match("anything", ""));
        assert!(!fuzzy_match("cisco", "ocs"));
    }

    #[test]
    fn full_search_counts() {
        let hosts = sample();
        assert_eq!(filter_hosts(&hosts, "dell", false).len(), 1);
        assert_eq!(filter_hosts(&hosts, "192.168", false).len(), 2);
        assert_eq!(filter_hosts(&hosts, "server", false).len(), 2);
        assert_eq!(filter_hosts(&hosts, "", false).len(), 3);
        assert_eq!(filter_hosts(&hosts, "notfound", false).len(), 0);
    }

    #[test]
    fn focused_search_ignores_hostname() {
        let hosts = sample();
        assert!(filter_hosts(&hosts, "router", true).is_empty());
        let found = filter_hosts(&hosts, "CISCO", true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ip, "10.0.0.1");
    }

    #[test]
    fn results_are_ip_ordered() {
        let found = filter_hosts(&sample(), "", false);
        assert_eq!(found[0].ip, "10.0.0.1");
    }

    #[test]
    fn vendor_summary() {
        let mut hosts = sample();
        hosts.push(host("10.0.0.9", "Unknown", ""));
        hosts.push(host("10.0.0.8", "Dell", ""));
        assert_eq!(unique_vendors(&hosts), "Cisco, Dell, HP");
        assert_eq!(unique_vendors(&[]), "None detected");

        let many: Vec<_> = (0..7)
            .map(|i| host(&format!("10.0.1.{i}"), &format!("V{i}"), ""))
            .collect();
        assert_eq!(unique_vendors(&many), "V0, V1, V2, V3, V4 and 2 more");
    }
}
