use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use thiserror::Error;
use url::Url;

/// The three ways a candidate feed URL can fail validation. Distinguishable
/// by kind so callers (the scheduler, the `add-feed` CLI command) can report
/// a precise reason rather than a single opaque error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL scheme not allowed: {0}")]
    InvalidScheme(String),

    #[error("URL resolves to a private or loopback address")]
    PrivateIp,
}

/// Whether to resolve DNS and check the resolved addresses, or to trust a
/// hostname that isn't an obvious loopback/private literal. Production code
/// always uses [`Mode::Strict`]; only the test harness uses [`Mode::Relaxed`]
/// so it can point the fetcher at a local mock server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Relaxed,
}

const LITERAL_PRIVATE_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Validate a feed URL per the scheme/SSRF policy. Must be called before any
/// outbound request is issued, except when `mode` is [`Mode::Relaxed`].
pub fn validate_url(raw: &str, mode: Mode) -> Result<(), UrlError> {
    if raw.is_empty() {
        return Err(UrlError::InvalidUrl("empty URL".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match url.scheme().to_ascii_lowercase().as_str() {
        "http" | "https" => {}
        scheme => return Err(UrlError::InvalidScheme(scheme.to_string())),
    }

    let host = url
        .host_str()
        .ok_or_else(|| UrlError::InvalidUrl("URL has no host".to_string()))?;

    // `Url::host_str` returns IPv6 literals bracketed (`"[::1]"`), which
    // matches neither the literal-host list nor `str::parse::<IpAddr>`, so
    // the brackets are stripped once up front for both checks below.
    let bare_host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if LITERAL_PRIVATE_HOSTS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(bare_host))
    {
        return if mode == Mode::Relaxed {
            Ok(())
        } else {
            Err(UrlError::PrivateIp)
        };
    }

    // A host that is itself an IP literal is checked directly, without a
    // DNS round-trip.
    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        return if is_private_ip(&ip) && mode == Mode::Strict {
            Err(UrlError::PrivateIp)
        } else {
            Ok(())
        };
    }

    if mode == Mode::Relaxed {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    // The string form (rather than the `(&str, u16)` tuple impl) is what
    // `ToSocketAddrs` needs to parse a bracketed IPv6 literal correctly.
    let addrs: Vec<IpAddr> = format!("{host}:{port}")
        .to_socket_addrs()
        .map_err(|e| UrlError::InvalidUrl(format!("DNS resolution failed: {e}")))?
        .map(|addr| addr.ip())
        .collect();

    if addrs.is_empty() {
        return Err(UrlError::InvalidUrl(
            "DNS resolution returned no addresses".to_string(),
        ));
    }

    if addrs.iter().any(is_private_ip) {
        return Err(UrlError::PrivateIp);
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_multicast() && is_link_local_multicast_v4(ip)
}

fn is_link_local_multicast_v4(ip: &Ipv4Addr) -> bool {
    // 224.0.0.0/24 is the link-local multicast block.
    let o = ip.octets();
    o[0] == 224 && o[1] == 0 && o[2] == 0
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }

    let segments = ip.segments();

    // Link-local unicast, fe80::/10.
    if segments[0] & 0xffc0 == 0xfe80 {
        return true;
    }

    // Unique local addresses, fc00::/7 (RFC 1918 analogue).
    if segments[0] & 0xfe00 == 0xfc00 {
        return true;
    }

    // Link-local multicast, ff02::/16.
    if segments[0] == 0xff02 {
        return true;
    }

    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&v4);
    }

    false
}
