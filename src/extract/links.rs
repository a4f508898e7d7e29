//! Link and image extraction per §3/§4.6.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::domain::is_external;
use crate::render::events::SubresourceRecord;

static CSS_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
    pub is_external: bool,
    pub is_dofollow: bool,
    pub is_image_link: bool,
    pub is_absolute: bool,
    pub is_social: bool,
    pub is_ugc: bool,
    pub is_sponsored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt: Option<String>,
    pub is_external: bool,
    pub is_absolute: bool,
    pub is_in_link: bool,
    pub link_href: Option<String>,
    pub size: u64,
}

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "pinterest.com",
    "tiktok.com",
    "youtube.com",
];

pub fn extract_links(document: &Html, final_url: &str, final_host: Option<&str>) -> Vec<Link> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let is_absolute = is_absolute_url(href);
            let resolved = absolutize(href, final_url)?;
            let rel = el.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
            let rel_tokens: Vec<&str> = rel.split_whitespace().collect();

            let resolved_host = reqwest::Url::parse(&resolved).ok().and_then(|u| u.host_str().map(str::to_string));
            let is_external = match (final_host, resolved_host.as_deref()) {
                (Some(final_host), Some(candidate)) => is_external(final_host, candidate),
                _ => false,
            };
            let is_social = resolved_host
                .as_deref()
                .map(|host| SOCIAL_DOMAINS.iter().any(|d| host.ends_with(d)))
                .unwrap_or(false);

            let element_children: Vec<_> = el.children().filter_map(scraper::ElementRef::wrap).collect();
            let only_child_is_image =
                element_children.len() == 1 && element_children[0].value().name() == "img";

            Some(Link {
                href: resolved,
                text: el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "),
                is_external,
                is_dofollow: !rel_tokens.contains(&"nofollow"),
                is_image_link: only_child_is_image,
                is_absolute,
                is_social,
                is_ugc: rel_tokens.contains(&"ugc"),
                is_sponsored: rel_tokens.contains(&"sponsored"),
            })
        })
        .collect()
}

pub fn extract_images(
    document: &Html,
    final_url: &str,
    final_host: Option<&str>,
    subresources: &[SubresourceRecord],
) -> Vec<Image> {
    let Ok(img_selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let Ok(link_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for el in document.select(&img_selector) {
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        let is_absolute = is_absolute_url(src);
        let Some(resolved) = absolutize(src, final_url) else {
            continue;
        };
        let resolved_host = reqwest::Url::parse(&resolved).ok().and_then(|u| u.host_str().map(str::to_string));
        let is_external = match (final_host, resolved_host.as_deref()) {
            (Some(final_host), Some(candidate)) => is_external(final_host, candidate),
            _ => false,
        };

        let size = subresources
            .iter()
            .find(|s| s.url == resolved)
            .map(|s| s.size)
            .unwrap_or(0);

        images.push(Image {
            src: resolved,
            alt: el.value().attr("alt").map(|s| s.to_string()),
            is_external,
            is_absolute,
            is_in_link: false,
            link_href: None,
            size,
        });
    }

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        for img in link.select(&img_selector) {
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if let Some(resolved_src) = absolutize(src, final_url) {
                if let Some(entry) = images.iter_mut().find(|i| i.src == resolved_src) {
                    entry.is_in_link = true;
                    entry.link_href = absolutize(href, final_url);
                }
            }
        }
    }

    images.extend(extract_css_background_images(document, final_url, final_host, subresources, &images));
    images
}

/// Picks up `background-image: url(...)` in inline `style` attributes, since
/// these never show up as `img[src]` elements but still count as images per
/// the extraction scope.
fn extract_css_background_images(
    document: &Html,
    final_url: &str,
    final_host: Option<&str>,
    subresources: &[SubresourceRecord],
    already_found: &[Image],
) -> Vec<Image> {
    let Ok(styled_selector) = Selector::parse("[style]") else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for el in document.select(&styled_selector) {
        let Some(style) = el.value().attr("style") else {
            continue;
        };
        for caps in CSS_URL.captures_iter(style) {
            let raw = caps[1].trim();
            if raw.is_empty() || raw.starts_with("data:") {
                continue;
            }
            let Some(resolved) = absolutize(raw, final_url) else {
                continue;
            };
            if already_found.iter().any(|i| i.src == resolved) || found.iter().any(|i: &Image| i.src == resolved) {
                continue;
            }

            let resolved_host = reqwest::Url::parse(&resolved).ok().and_then(|u| u.host_str().map(str::to_string));
            let is_external = match (final_host, resolved_host.as_deref()) {
                (Some(final_host), Some(candidate)) => is_external(final_host, candidate),
                _ => false,
            };
            let size = subresources.iter().find(|s| s.url == resolved).map(|s| s.size).unwrap_or(0);

            found.push(Image {
                src: resolved,
                alt: None,
                is_external,
                is_absolute: is_absolute_url(raw),
                is_in_link: false,
                link_href: None,
                size,
            });
        }
    }
    found
}

fn is_absolute_url(href: &str) -> bool {
    href.contains("://") || href.starts_with("//")
}

fn absolutize(href: &str, base: &str) -> Option<String> {
    reqwest::Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_link_detection() {
        let html = Html::parse_document(
            r#"<html><body><a href="/x"><img src="/a.png"></a><img src="/b.png" alt="b"></body></html>"#,
        );
        let images = extract_images(&html, "https://example.com/", Some("example.com"), &[]);
        assert_eq!(images.len(), 2);
        let linked = images.iter().find(|i| i.src.ends_with("a.png")).unwrap();
        assert!(linked.is_in_link);
        assert_eq!(linked.link_href.as_deref(), Some("https://example.com/x"));
    }

    #[test]
    fn css_background_image_is_extracted() {
        let html = Html::parse_document(
            r#"<html><body><div style="background-image: url('/hero.jpg');"></div></body></html>"#,
        );
        let images = extract_images(&html, "https://example.com/", Some("example.com"), &[]);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].src, "https://example.com/hero.jpg");
    }

    #[test]
    fn css_data_uri_background_is_skipped() {
        let html = Html::parse_document(
            r#"<html><body><div style="background-image: url(data:image/png;base64,AAAA);"></div></body></html>"#,
        );
        let images = extract_images(&html, "https://example.com/", Some("example.com"), &[]);
        assert!(images.is_empty());
    }

    #[test]
    fn absolute_vs_relative_href() {
        let html = Html::parse_document(r#"<html><body><a href="https://a.com/x">a</a><a href="/y">b</a></body></html>"#);
        let links = extract_links(&html, "https://example.com/", Some("example.com"));
        assert!(links[0].is_absolute);
        assert!(!links[1].is_absolute);
    }
}
