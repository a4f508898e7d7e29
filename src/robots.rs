//! Robots advisor (C8): fetches `robots.txt` for a host and reports whether
//! a fixed bot identifier may fetch a given path. Fail-open per §4.8 — any
//! 4xx/5xx/network/parse failure reports `allowed = true`.

use std::time::Duration;

use url::Url;

use crate::error::AppError;
use crate::validate::parse_target_url;

const BOT_USER_AGENT: &str = "Googlebot";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RobotsAdvisor {
    client: reqwest::Client,
}

impl RobotsAdvisor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(BOT_USER_AGENT)
                .build()
                .expect("robots http client config is always valid"),
        }
    }

    /// Returns whether `target` is allowed for [`BOT_USER_AGENT`]. Never
    /// errors on its own account beyond the caller's own URL validation —
    /// every advisor-side failure degrades to `true`.
    pub async fn is_allowed(&self, target: &str) -> Result<bool, AppError> {
        let url = parse_target_url(target)?;
        let robots_url = robots_txt_url(&url);

        let response = match self.client.get(robots_url).send().await {
            Ok(r) => r,
            Err(_) => return Ok(true),
        };
        if !response.status().is_success() {
            return Ok(true);
        }
        let body = match response.text().await {
            Ok(b) => b,
            Err(_) => return Ok(true),
        };

        Ok(evaluate(&body, url.path()))
    }
}

impl Default for RobotsAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

fn robots_txt_url(target: &Url) -> Url {
    let mut url = target.clone();
    url.set_path("/robots.txt");
    url.set_query(None);
    url
}

/// Minimal grammar: case-insensitive `User-agent`/`Disallow`/`Allow` lines,
/// grouped by blank-line-separated records; the fixed bot identifier falls
/// back to the `*` group when it has no dedicated one.
fn evaluate(robots_txt: &str, path: &str) -> bool {
    let mut current_group_matches = false;
    let mut wildcard_rules: Vec<(bool, String)> = Vec::new();
    let mut specific_rules: Vec<(bool, String)> = Vec::new();
    let mut in_specific = false;
    let mut in_wildcard = false;

    for raw_line in robots_txt.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if value == "*" {
                    in_wildcard = true;
                    in_specific = false;
                } else if value.eq_ignore_ascii_case(BOT_USER_AGENT) {
                    in_specific = true;
                    in_wildcard = false;
                } else {
                    in_wildcard = false;
                    in_specific = false;
                }
                current_group_matches = in_wildcard || in_specific;
            }
            "disallow" if current_group_matches && !value.is_empty() => {
                push_rule(in_specific, &mut specific_rules, &mut wildcard_rules, false, value);
            }
            "allow" if current_group_matches => {
                push_rule(in_specific, &mut specific_rules, &mut wildcard_rules, true, value);
            }
            _ => {}
        }
    }

    let rules = if specific_rules.is_empty() { &wildcard_rules } else { &specific_rules };
    decide(rules, path)
}

fn push_rule(in_specific: bool, specific: &mut Vec<(bool, String)>, wildcard: &mut Vec<(bool, String)>, allow: bool, pattern: &str) {
    if in_specific {
        specific.push((allow, pattern.to_string()));
    } else {
        wildcard.push((allow, pattern.to_string()));
    }
}

fn decide(rules: &[(bool, String)], path: &str) -> bool {
    let mut best: Option<(usize, bool)> = None;
    for (allow, pattern) in rules {
        if path.starts_with(pattern.as_str()) {
            let specificity = pattern.len();
            if best.map(|(len, _)| specificity > len).unwrap_or(true) {
                best = Some((specificity, *allow));
            }
        }
    }
    best.map(|(_, allow)| allow).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_rule_blocks_matching_path() {
        let robots = "User-agent: *\nDisallow: /private/\n";
        assert!(!evaluate(robots, "/private/page"));
        assert!(evaluate(robots, "/public/page"));
    }

    #[test]
    fn specific_googlebot_group_is_matched_by_identity() {
        let robots = "User-agent: Googlebot\nDisallow: /private/\n";
        assert!(!evaluate(robots, "/private/page"));
        assert!(evaluate(robots, "/public/page"));
    }

    #[test]
    fn more_specific_allow_overrides_wildcard_disallow() {
        let robots = "User-agent: *\nDisallow: /private/\nAllow: /private/public-ok\n";
        assert!(evaluate(robots, "/private/public-ok/x"));
    }

    #[test]
    fn empty_robots_allows_everything() {
        assert!(evaluate("", "/anything"));
    }

    #[test]
    fn robots_txt_url_strips_path_and_query() {
        let target = Url::parse("https://example.com/a/b?c=1").unwrap();
        assert_eq!(robots_txt_url(&target).as_str(), "https://example.com/robots.txt");
    }

    #[tokio::test]
    async fn disallowed_path_is_reported_via_http() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/robots.txt"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"))
            .mount(&server)
            .await;

        let advisor = RobotsAdvisor::new();
        assert!(!advisor.is_allowed(&format!("{}/private/page", server.uri())).await.unwrap());
        assert!(advisor.is_allowed(&format!("{}/public/page", server.uri())).await.unwrap());
    }

    #[tokio::test]
    async fn missing_robots_txt_fails_open() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/robots.txt"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let advisor = RobotsAdvisor::new();
        assert!(advisor.is_allowed(&format!("{}/anything", server.uri())).await.unwrap());
    }

    #[tokio::test]
    async fn origin_outage_fails_open() {
        let advisor = RobotsAdvisor::new();
        assert!(advisor.is_allowed("http://127.0.0.1:1/anything").await.unwrap());
    }
}
