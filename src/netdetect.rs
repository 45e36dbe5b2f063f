use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Detect the `/24` prefixes (`a.b.c`) of local non-loopback IPv4 interfaces.
///
/// For example, an interface IP `192.168.1.42` yields `192.168.1`.
/// Duplicates are removed and the result is sorted by network address.
pub fn detect_local_prefixes() -> Result<Vec<String>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(ip));
        }
    }
    let mut nets: Vec<Ipv4Net> = set.into_iter().collect();
    // Sort for stable output
    nets.sort_by_key(|n| u32::from(n.network()));
    Ok(nets.into_iter().map(cidr_prefix).collect())
}

/// First detected local prefix, if any. Used when the operator gives bare octets
/// without naming a prefix.
pub fn default_prefix() -> Option<String> {
    detect_local_prefixes().ok()?.into_iter().next()
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24)
        .unwrap_or_else(|_| Ipv4Net::from(Ipv4Addr::new(o[0], o[1], o[2], 0)))
}

/// The first three octets of a network's address, as accepted by the range parser.
pub fn cidr_prefix(net: Ipv4Net) -> String {
    let o = net.network().octets();
    format!("{}.{}.{}", o[0], o[1], o[2])
}
