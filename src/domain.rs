//! Registrable-domain comparison, shared by the SSRF check, the extractors'
//! `is_external` classification, and the subresource trace's `is_internal` flag.
//!
//! A full public-suffix-list lookup is out of proportion for this service; a
//! small, explicit table of known multi-label suffixes covers the common case
//! the way a handful of other crawler/extractor examples in the pack do it
//! inline rather than pulling in a PSL crate.

use once_cell::sync::Lazy;
use std::collections::HashSet;

static MULTI_LABEL_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.jp", "co.nz",
        "co.in", "com.br", "com.cn", "com.mx",
    ]
    .into_iter()
    .collect()
});

/// Returns the registrable domain ("example.com" out of "www.example.com"),
/// or the host itself if it has two or fewer labels.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    if MULTI_LABEL_SUFFIXES.contains(last_two.as_str()) && labels.len() >= 3 {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

/// Whether `candidate_host` is external relative to `reference_host` (different
/// registrable domain).
pub fn is_external(reference_host: &str, candidate_host: &str) -> bool {
    registrable_domain(reference_host) != registrable_domain(candidate_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_two_label() {
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn subdomain_reduces_to_registrable() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.c.example.com"), "example.com");
    }

    #[test]
    fn multi_label_suffix() {
        assert_eq!(registrable_domain("www.example.co.uk"), "example.co.uk");
    }

    #[test]
    fn external_comparison() {
        assert!(!is_external("example.com", "cdn.example.com"));
        assert!(is_external("example.com", "example.net"));
    }
}
