//! Built-in host registry the category flags (`block_ads`, `block_analytics`,
//! `block_social`, `block_tracking`) resolve against, per §4.5 step 3. A
//! request-level filter predicate is derived from whichever categories are
//! set; subresources whose host matches are aborted and recorded with
//! `blocked = true`.

const AD_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "adsrvr.org",
    "adnxs.com",
    "taboola.com",
    "outbrain.com",
];

const ANALYTICS_HOSTS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "segment.io",
    "mixpanel.com",
    "amplitude.com",
    "hotjar.com",
];

const SOCIAL_HOSTS: &[&str] = &[
    "facebook.net",
    "connect.facebook.net",
    "platform.twitter.com",
    "platform.linkedin.com",
    "assets.pinterest.com",
];

const TRACKING_HOSTS: &[&str] = &[
    "scorecardresearch.com",
    "quantserve.com",
    "criteo.com",
    "bluekai.com",
    "adsafeprotected.com",
];

/// Host substrings to match for the categories that are set, built once per
/// render and checked against each subresource's URL host.
pub fn host_patterns_for_categories(ads: bool, analytics: bool, social: bool, tracking: bool) -> Vec<String> {
    let mut patterns = Vec::new();
    if ads {
        patterns.extend(AD_HOSTS.iter().map(|s| s.to_string()));
    }
    if analytics {
        patterns.extend(ANALYTICS_HOSTS.iter().map(|s| s.to_string()));
    }
    if social {
        patterns.extend(SOCIAL_HOSTS.iter().map(|s| s.to_string()));
    }
    if tracking {
        patterns.extend(TRACKING_HOSTS.iter().map(|s| s.to_string()));
    }
    patterns
}

pub fn matches_any(url: &str, patterns: &[String]) -> bool {
    let Some(host) = reqwest::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return false;
    };
    patterns.iter().any(|pattern| host.ends_with(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ads_category_matches_known_ad_host() {
        let patterns = host_patterns_for_categories(true, false, false, false);
        assert!(matches_any("https://doubleclick.net/pixel", &patterns));
        assert!(!matches_any("https://example.com/app.js", &patterns));
    }

    #[test]
    fn no_categories_set_matches_nothing() {
        let patterns = host_patterns_for_categories(false, false, false, false);
        assert!(patterns.is_empty());
        assert!(!matches_any("https://doubleclick.net/pixel", &patterns));
    }
}
