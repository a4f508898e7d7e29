//! Extractors (C6): pure, total transformations over `(final_url, markup,
//! subresource_trace, response_headers)`. Never error — missing or malformed
//! elements degrade to empty/zero values, per §4.6.
//!
//! Grounded on riptide's `scraper`-based markup parsing (see its manifest);
//! field semantics follow SPEC_FULL.md §4.6 verbatim.

pub mod links;
pub mod robots_meta;

use std::collections::HashMap;

use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::domain::is_external;
use crate::render::events::SubresourceRecord;

use links::{extract_images, extract_links, Image, Link};
use robots_meta::{parse_meta_robots, parse_x_robots_tag, RobotsDirectives};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HreflangEntry {
    pub lang: String,
    pub href: String,
    pub source: HreflangSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HreflangSource {
    Link,
    Header,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub canonical_url: Option<String>,
    pub hreflang: Vec<HreflangEntry>,
    pub indexable: bool,
    pub follow: bool,
    pub indexable_reason: Option<String>,
    pub open_graph: HashMap<String, String>,
    pub structured_data: Vec<String>,
    pub word_count: usize,
    pub text_ratio: f64,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
}

/// Runs every extractor over one render's markup + trace. `status_code` and
/// `response_headers` come from the driver (scripted renders report 200
/// once markup is captured; the plain-fetch path passes its real status and
/// headers).
pub fn extract(
    final_url: &str,
    markup: &str,
    subresources: &[SubresourceRecord],
    response_headers: &HeaderMap,
    status_code: u16,
) -> ExtractedFields {
    let document = Html::parse_document(markup);

    let title = first_text(&document, "title");
    let meta_description = meta_content(&document, "description");

    let h1 = headings(&document, "h1");
    let h2 = headings(&document, "h2");
    let h3 = headings(&document, "h3");

    let canonical_url = canonical_link(&document, final_url);
    let hreflang = hreflang_entries(&document, response_headers, final_url);

    let meta_robots = meta_content(&document, "robots");
    let x_robots_tag = response_headers
        .get("x-robots-tag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let meta_directives = meta_robots.as_deref().map(parse_meta_robots).unwrap_or_default();
    let header_directives = x_robots_tag.as_deref().map(parse_x_robots_tag).unwrap_or_default();
    let directives = RobotsDirectives {
        noindex: meta_directives.noindex || header_directives.noindex,
        nofollow: meta_directives.nofollow || header_directives.nofollow,
    };

    let canonical_matches = match &canonical_url {
        None => true,
        Some(canonical) => strip_fragment(canonical) == strip_fragment(final_url),
    };

    let (indexable, indexable_reason) = if status_code != 200 {
        (false, Some(format!("status_code {status_code} is not 200")))
    } else if directives.noindex {
        (false, Some("noindex directive present".to_string()))
    } else if !canonical_matches {
        (false, Some("canonical url points elsewhere".to_string()))
    } else {
        (true, None)
    };

    let open_graph = open_graph_map(&document);
    let structured_data = structured_data_blobs(&document);

    let text = visible_text(&document);
    let word_count = text.split_whitespace().filter(|s| !s.is_empty()).count();
    let text_ratio = if markup.is_empty() {
        0.0
    } else {
        round4(text.len() as f64 / markup.len() as f64)
    };

    let final_host = reqwest::Url::parse(final_url).ok().and_then(|u| u.host_str().map(str::to_string));
    let links = extract_links(&document, final_url, final_host.as_deref());
    let images = extract_images(&document, final_url, final_host.as_deref(), subresources);

    ExtractedFields {
        title,
        meta_description,
        h1,
        h2,
        h3,
        canonical_url,
        hreflang,
        indexable,
        follow: !directives.nofollow,
        indexable_reason,
        open_graph,
        structured_data,
        word_count,
        text_ratio,
        links,
        images,
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{name}" i]"#)).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(|s| collapse_whitespace(s))
        .filter(|s| !s.is_empty())
}

fn headings(document: &Html, tag: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(tag) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn canonical_link(document: &Html, final_url: &str) -> Option<String> {
    let selector = Selector::parse(r#"link[rel="canonical" i]"#).ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    absolutize(href, final_url)
}

fn hreflang_entries(document: &Html, headers: &HeaderMap, final_url: &str) -> Vec<HreflangEntry> {
    let mut entries = Vec::new();
    if let Ok(selector) = Selector::parse(r#"link[rel="alternate" i][hreflang]"#) {
        for el in document.select(&selector) {
            let (Some(lang), Some(href)) = (el.value().attr("hreflang"), el.value().attr("href")) else {
                continue;
            };
            if let Some(href) = absolutize(href, final_url) {
                entries.push(HreflangEntry {
                    lang: lang.to_string(),
                    href,
                    source: HreflangSource::Link,
                });
            }
        }
    }
    for value in headers.get_all(reqwest::header::LINK).iter() {
        if let Ok(text) = value.to_str() {
            entries.extend(parse_link_header_hreflang(text, final_url));
        }
    }
    entries
}

fn parse_link_header_hreflang(header: &str, final_url: &str) -> Vec<HreflangEntry> {
    let mut out = Vec::new();
    for part in header.split(',') {
        let mut url_part = None;
        let mut hreflang = None;
        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url_part = Some(&segment[1..segment.len() - 1]);
            } else if let Some(value) = segment.strip_prefix("hreflang=") {
                hreflang = Some(value.trim_matches('"').to_string());
            }
        }
        if let (Some(url), Some(lang)) = (url_part, hreflang) {
            if let Some(href) = absolutize(url, final_url) {
                out.push(HreflangEntry {
                    lang,
                    href,
                    source: HreflangSource::Header,
                });
            }
        }
    }
    out
}

fn open_graph_map(document: &Html) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(selector) = Selector::parse(r#"meta[property^="og:" i]"#) else {
        return map;
    };
    for el in document.select(&selector) {
        if let (Some(property), Some(content)) = (el.value().attr("property"), el.value().attr("content")) {
            map.insert(property.to_string(), content.to_string());
        }
    }
    map
}

fn structured_data_blobs(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json" i]"#) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn visible_text(document: &Html) -> String {
    let Ok(body_selector) = Selector::parse("body") else {
        return document.root_element().text().collect();
    };
    let Ok(skip) = Selector::parse("script,style,noscript") else {
        return document.root_element().text().collect();
    };

    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };
    let skip_nodes: std::collections::HashSet<_> = body.select(&skip).map(|el| el.id()).collect();

    let mut text = String::new();
    for descendant in body.descendants() {
        let Some(node_text) = descendant.value().as_text() else {
            continue;
        };
        if descendant.ancestors().any(|ancestor| skip_nodes.contains(&ancestor.id())) {
            continue;
        }
        text.push_str(&node_text.text);
    }
    text
}

fn absolutize(href: &str, base: &str) -> Option<String> {
    if let Ok(base_url) = reqwest::Url::parse(base) {
        base_url.join(href).ok().map(|u| u.to_string())
    } else {
        Some(href.to_string())
    }
}

fn strip_fragment(url: &str) -> String {
    url.split('#').next().unwrap_or(url).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round4(value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(3 - magnitude);
    (value * scale).round() / scale
}

pub(crate) fn is_external_link(final_url: &str, candidate: &str) -> bool {
    let (Some(final_host), Ok(candidate_url)) = (
        reqwest::Url::parse(final_url).ok().and_then(|u| u.host_str().map(str::to_string)),
        reqwest::Url::parse(candidate),
    ) else {
        return false;
    };
    match candidate_url.host_str() {
        Some(candidate_host) => is_external(&final_host, candidate_host),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    const SAMPLE: &str = r#"
        <html><head>
            <title>  Example   Domain </title>
            <meta name="description" content="An example page">
            <meta name="robots" content="noindex, nofollow">
            <link rel="canonical" href="/canon">
            <meta property="og:title" content="Example">
        </head><body>
            <h1>Hello</h1>
            <p>Some visible words here</p>
            <a href="https://other.com/x" rel="nofollow sponsored">Ad</a>
            <a href="/relative">Internal</a>
        </body></html>
    "#;

    #[test]
    fn extracts_title_and_meta() {
        let result = extract(
            "https://example.com/",
            SAMPLE,
            &[],
            &HeaderMap::new(),
            200,
        );
        assert_eq!(result.title.as_deref(), Some("Example Domain"));
        assert_eq!(result.meta_description.as_deref(), Some("An example page"));
        assert_eq!(result.h1, vec!["Hello".to_string()]);
    }

    #[test]
    fn noindex_meta_makes_page_unindexable() {
        let result = extract("https://example.com/", SAMPLE, &[], &HeaderMap::new(), 200);
        assert!(!result.indexable);
        assert!(!result.follow);
    }

    #[test]
    fn non_200_status_overrides_meta() {
        let result = extract(
            "https://example.com/",
            "<html><head><title>ok</title></head><body></body></html>",
            &[],
            &HeaderMap::new(),
            404,
        );
        assert!(!result.indexable);
    }

    #[test]
    fn links_are_classified() {
        let result = extract("https://example.com/", SAMPLE, &[], &HeaderMap::new(), 200);
        let external = result.links.iter().find(|l| l.href.contains("other.com")).unwrap();
        assert!(external.is_external);
        assert!(external.is_sponsored);
        let internal = result.links.iter().find(|l| l.href.ends_with("/relative")).unwrap();
        assert!(!internal.is_external);
    }

    #[test]
    fn empty_markup_yields_total_defaults() {
        let result = extract("https://example.com/", "", &[], &HeaderMap::new(), 200);
        assert_eq!(result.title, None);
        assert_eq!(result.word_count, 0);
        assert_eq!(result.text_ratio, 0.0);
        assert!(result.links.is_empty());
    }

    #[test]
    fn word_count_excludes_script_and_style_text() {
        let markup = r#"
            <html><head><title>t</title></head>
            <body>
                <script>var totallyNotVisible = "lots of fake words here";</script>
                <style>.hidden { content: "also not visible words"; }</style>
                <p>two words</p>
            </body></html>
        "#;
        let result = extract("https://example.com/", markup, &[], &HeaderMap::new(), 200);
        assert_eq!(result.word_count, 2);
    }
}
