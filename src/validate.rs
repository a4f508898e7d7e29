//! Request validator (C1): URL shape, SSRF host-literal rejection, timeout
//! range, wait-event closed set.
//!
//! Grounded on Kirky-X-crawlrs's `validators::validate_url` call site in
//! `playwright_engine.rs` ("SSRF protection" comment ahead of the scrape), here
//! expanded into the concrete rules SPEC_FULL.md §4.1 names.

use std::net::IpAddr;

use url::Url;

use crate::error::AppError;

pub const WAIT_EVENTS: &[&str] = &["domContentLoaded", "load", "networkIdle", "networkAlmostIdle"];

/// Parse and validate a render/robots target URL. Does not perform DNS
/// resolution itself — callers that need the resolved-host SSRF check use
/// [`check_ssrf`] after resolving.
pub fn parse_target_url(raw: &str) -> Result<Url, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::invalid_url("url must not be empty"));
    }
    let url = Url::parse(raw).map_err(|e| AppError::invalid_url(format!("unparsable url: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::invalid_url("url must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(AppError::invalid_url("url must have a host"));
    }
    Ok(url)
}

pub fn validate_timeout(seconds: u64) -> Result<(), AppError> {
    if !(1..=60).contains(&seconds) {
        Err(AppError::invalid_timeout(format!(
            "timeout must be in 1..=60, got {seconds}"
        )))
    } else {
        Ok(())
    }
}

pub fn validate_wait_event(event: &str) -> Result<(), AppError> {
    if event.is_empty() || WAIT_EVENTS.contains(&event) {
        Ok(())
    } else {
        Err(AppError::invalid_wait_event(format!(
            "wait_event must be one of {WAIT_EVENTS:?}, got {event:?}"
        )))
    }
}

/// True if `ip` falls in a loopback, link-local, private, or reserved range.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_private()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local addresses
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// SSRF host-literal check against a hostname that may itself be an IP literal
/// (`127.0.0.1`, `::1`) or the bare word `localhost`.
pub fn check_host_literal(host: &str) -> Result<(), AppError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err(AppError::ssrf_blocked("localhost is not renderable"));
    }
    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(AppError::ssrf_blocked(format!("{ip} is a blocked host literal")));
        }
    }
    Ok(())
}

/// SSRF check against a resolved IP address (post-DNS-resolution).
pub fn check_resolved_ip(ip: IpAddr) -> Result<(), AppError> {
    if is_blocked_ip(ip) {
        Err(AppError::ssrf_blocked(format!("{ip} resolves to a blocked range")))
    } else {
        Ok(())
    }
}

/// Resolve `host` and apply the SSRF policy to every resolved address,
/// rejecting if any of them is blocked. Literal IP hosts skip resolution.
pub async fn validate_host_ssrf(host: &str) -> Result<(), AppError> {
    check_host_literal(host)?;

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let lookup_target = format!("{host}:0");
    let addrs = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| AppError::domain_not_found(format!("could not resolve {host}: {e}")))?;

    let mut any = false;
    for addr in addrs {
        any = true;
        check_resolved_ip(addr.ip())?;
    }
    if !any {
        return Err(AppError::domain_not_found(format!("no addresses for {host}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_unparsable() {
        assert!(parse_target_url("").is_err());
        assert!(parse_target_url("not a url").is_err());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(parse_target_url("ftp://example.com/").is_err());
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_target_url("http://example.com/").is_ok());
        assert!(parse_target_url("https://example.com/path?q=1").is_ok());
    }

    #[test]
    fn timeout_range() {
        assert!(validate_timeout(1).is_ok());
        assert!(validate_timeout(60).is_ok());
        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(61).is_err());
    }

    #[test]
    fn wait_event_closed_set() {
        assert!(validate_wait_event("").is_ok());
        assert!(validate_wait_event("load").is_ok());
        assert!(validate_wait_event("networkIdle").is_ok());
        assert!(validate_wait_event("bogus").is_err());
    }

    #[test]
    fn ssrf_host_literals() {
        for host in ["localhost", "127.0.0.1", "10.0.0.5", "192.168.1.10", "::1", "fc00::1"] {
            assert!(check_host_literal(host).is_err(), "{host} should be blocked");
        }
        assert!(check_host_literal("example.com").is_ok());
        assert!(check_host_literal("8.8.8.8").is_ok());
    }
}
