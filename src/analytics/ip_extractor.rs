//! Client IP extraction from HTTP headers with trust validation
//!
//! The address is only taken from forwarding headers when the configured
//! proxy mode says those headers can be trusted. Chains are walked right to
//! left, skipping hops that belong to trusted proxies.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{TrustedProxyMode, VisitorConfig};

/// Extract the client IP address for a request
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &VisitorConfig) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Prefer RFC 7239 `Forwarded`, then `X-Forwarded-For`
fn extract_standard_ip(headers: &HeaderMap, config: &VisitorConfig) -> Option<IpAddr> {
    let forwarded = forwarded_chain(headers);
    if !forwarded.is_empty() {
        return pick_from_chain(&forwarded, config);
    }
    pick_from_chain(&x_forwarded_for_chain(headers), config)
}

/// Strip quotes, brackets and ports from a `for=` node
fn parse_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    // v4 with port
    value.rsplit_once(':').and_then(|(host, _)| host.parse().ok())
}

fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("forwarded")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(','))
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (key, value) = param.trim().split_once('=')?;
                key.eq_ignore_ascii_case("for").then(|| parse_node(value)).flatten()
            })
        })
        .collect()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

fn pick_from_chain(ips: &[IpAddr], config: &VisitorConfig) -> Option<IpAddr> {
    if ips.is_empty() {
        return None;
    }

    // Skip a fixed number of hops from the right
    if let Some(num_trusted) = config.num_trusted_proxies {
        return if ips.len() > num_trusted {
            Some(ips[ips.len() - num_trusted - 1])
        } else {
            ips.first().copied()
        };
    }

    // First hop from the right that is not a trusted proxy
    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| ips.first())
            .copied();
    }

    ips.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> VisitorConfig {
        VisitorConfig {
            trusted_proxy_mode: mode,
            ..Default::default()
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let socket_addr = ip("192.168.1.1");
        let config = create_config(TrustedProxyMode::None);

        assert_eq!(extract_client_ip(&headers, socket_addr, &config), socket_addr);
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_extract_x_forwarded_for_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("198.51.100.1"));
    }

    #[test]
    fn test_trusted_proxy_cidrs_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.1.2.3, 10.9.9.9"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = vec!["10.0.0.0/8".parse().unwrap()];

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_num_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 203.0.113.1, 10.0.0.2"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8::1]:4711\";proto=https, for=192.0.2.60:8080"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = vec!["192.0.2.0/24".parse().unwrap()];

        let result = extract_client_ip(&headers, ip("127.0.0.1"), &config);
        assert_eq!(result, ip("2001:db8::1"));
    }
}
