//! NO_PROXY bypass rules.
//!
//! Follows curl's interpretation of `NO_PROXY`:
//! - comma-separated entries, surrounding whitespace ignored
//! - `*` bypasses every host
//! - IP addresses and CIDR ranges match literal IP hosts only
//! - a domain matches itself and its subdomains, with or without a leading dot
//! - `host:port` restricts a domain entry to one port

use std::net::IpAddr;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    All,
    Ip(IpAddr),
    Cidr(IpAddr, u8),
    Domain { name: String, port: Option<u16> },
}

/// Parsed NO_PROXY list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMatcher {
    rules: Vec<Rule>,
}

impl ProxyMatcher {
    /// Read `NO_PROXY`, then `no_proxy`. Call at configuration time only.
    pub fn from_env() -> Self {
        let raw = std::env::var("NO_PROXY")
            .or_else(|_| std::env::var("no_proxy"))
            .unwrap_or_default();
        Self::from_string(&raw)
    }

    pub fn from_string(no_proxy: &str) -> Self {
        let rules = no_proxy
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(parse_rule)
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a request to `host` (port `port`) goes direct.
    pub fn should_bypass(&self, host: &str, port: Option<u16>) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let ip = host.parse::<IpAddr>().ok();
        let host = host.to_ascii_lowercase();

        self.rules.iter().any(|rule| match rule {
            Rule::All => true,
            Rule::Ip(addr) => ip == Some(*addr),
            Rule::Cidr(net, prefix) => ip.is_some_and(|ip| cidr_contains(*net, *prefix, ip)),
            Rule::Domain { name, port: want } => {
                if want.is_some() && *want != port {
                    return false;
                }
                host == *name
                    || host
                        .strip_suffix(name.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
        })
    }

    pub fn should_bypass_url(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| self.should_bypass(h, url.port_or_known_default()))
    }
}

fn parse_rule(part: &str) -> Rule {
    if part == "*" {
        return Rule::All;
    }
    if let Some((ip, prefix)) = part.split_once('/') {
        if let (Ok(ip), Ok(prefix)) = (ip.parse::<IpAddr>(), prefix.parse::<u8>()) {
            return Rule::Cidr(ip, prefix);
        }
    }
    let bare = part.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Rule::Ip(ip);
    }

    let (name, port) = match part.rsplit_once(':') {
        Some((name, port)) => match port.parse::<u16>() {
            Ok(port) => (name, Some(port)),
            Err(_) => (part, None),
        },
        None => (part, None),
    };
    Rule::Domain {
        name: name.trim_start_matches('.').to_ascii_lowercase(),
        port,
    }
}

fn cidr_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            (u32::from(net) & mask) == (u32::from(ip) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            (u128::from(net) & mask) == (u128::from(ip) & mask)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard() {
        let m = ProxyMatcher::from_string(" * ");
        assert!(m.should_bypass("anything.test", Some(443)));
    }

    #[test]
    fn test_domain_and_subdomains() {
        let m = ProxyMatcher::from_string(".example.com");
        assert!(m.should_bypass("example.com", None));
        assert!(m.should_bypass("API.Example.com", None));
        assert!(!m.should_bypass("notexample.com", None));
    }

    #[test]
    fn test_domain_with_port() {
        let m = ProxyMatcher::from_string("internal.test:8080");
        assert!(m.should_bypass("internal.test", Some(8080)));
        assert!(!m.should_bypass("internal.test", Some(443)));
    }

    #[test]
    fn test_ip_and_cidr() {
        let m = ProxyMatcher::from_string("127.0.0.1, 10.0.0.0/8, ::1, fd00::/8");
        assert!(m.should_bypass("127.0.0.1", None));
        assert!(m.should_bypass("10.200.1.1", None));
        assert!(!m.should_bypass("11.0.0.1", None));
        assert!(m.should_bypass("[::1]", None));
        assert!(m.should_bypass("fd12::1", None));
        assert!(!m.should_bypass("fe80::1", None));
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let m = ProxyMatcher::from_string("0.0.0.0/0");
        assert!(m.should_bypass("8.8.8.8", None));
        assert!(!m.should_bypass("::1", None));
    }

    #[test]
    fn test_url_helper() {
        let m = ProxyMatcher::from_string("localhost");
        assert!(m.should_bypass_url(&Url::parse("http://localhost:3000/x").unwrap()));
        assert!(!m.should_bypass_url(&Url::parse("https://example.org/").unwrap()));
        assert!(ProxyMatcher::from_string(" , ").is_empty());
    }
}
