//! Markup collaborators consumed by the resolution and crawl layers.
//!
//! Everything here is parsing glue over the fetched document text: scans for
//! the config values the source embeds in its pages, anchor extraction with
//! absolute-address resolution, and the address rules that decide which links
//! count as content. The core treats these as replaceable helpers; nothing in
//! this module holds state or performs I/O.

use scraper::{Html, Selector};
use url::Url;

use crate::error::WikiError;

/// Paths and hosts that never lead to article content.
const NON_CONTENT_MARKERS: [&str; 12] = [
    "/w/index.php?",
    "/wiki/Special:",
    "/wiki/Help:",
    "/wiki/Wikipedia:",
    "/wiki/Talk:",
    "/wiki/Portal:",
    "/wiki/Template:",
    "/wiki/Template_talk:",
    "/wiki/Category:",
    "/wiki/File:",
    "/wiki/Main_Page",
    "wikimediafoundation.org",
];

/// An outbound link: absolute address plus its display text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LinkRef {
    pub address: String,
    pub text: String,
}

/// Outbound links of a page, deduplicated by address and partitioned into
/// same-ecosystem and external sets.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LinkSet {
    pub internal: Vec<LinkRef>,
    pub external: Vec<LinkRef>,
}

impl LinkSet {
    /// Addresses of internal links that pass the content filter, in document
    /// order. This is the child set a crawl expands.
    pub fn content_addresses(&self) -> Vec<String> {
        self.internal
            .iter()
            .filter(|link| is_content_link(&link.address))
            .map(|link| link.address.clone())
            .collect()
    }
}

/// Scans the document text for an embedded config value, e.g. `"wgArticleId":42,`.
fn embedded_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("\"{key}\"");
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find(',')?;
    Some(rest[..end].trim_start_matches([':', ' ']))
}

/// The article id embedded in the fetched document body.
pub fn article_id(text: &str) -> Option<u64> {
    let raw = embedded_value(text, "wgArticleId")?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// The page title embedded in the fetched document body.
pub fn page_title(text: &str) -> Option<String> {
    embedded_quoted(text, "wgTitle")
}

/// The content language embedded in the fetched document body.
pub fn page_language(text: &str) -> Option<String> {
    embedded_quoted(text, "wgPageContentLanguage")
}

/// The namespace number embedded in the fetched document body.
pub fn page_namespace(text: &str) -> Option<i64> {
    let raw = embedded_value(text, "wgNamespaceNumber")?;
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().ok()
}

fn embedded_quoted(text: &str, key: &str) -> Option<String> {
    let raw = embedded_value(text, key)?;
    let first = raw.find('"')?;
    let last = raw.rfind('"')?;
    if last > first {
        Some(raw[first + 1..last].to_string())
    } else {
        None
    }
}

/// Whether `url` belongs to the source site's host family.
pub fn is_wiki_host(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => host == "wikipedia.org" || host.ends_with(".wikipedia.org"),
        None => false,
    }
}

/// Whether `url` matches the article content-path pattern.
pub fn is_article_url(url: &Url) -> bool {
    is_wiki_host(url) && url.path().starts_with("/wiki/") && url.path().len() > "/wiki/".len()
}

/// Whether `url` uses the mobile host variant.
pub fn is_mobile_url(url: &Url) -> bool {
    url.host_str()
        .map(|host| host.ends_with(".m.wikipedia.org"))
        .unwrap_or(false)
}

/// Validates `address` as an article address and normalizes the mobile host
/// variant to the canonical one.
pub fn normalize_address(address: &str) -> Result<Url, WikiError> {
    let mut url = Url::parse(address)
        .map_err(|e| WikiError::InvalidTarget(format!("{address}: {e}")))?;
    if is_mobile_url(&url) {
        let desktop = url
            .host_str()
            .map(|host| host.replacen(".m.wikipedia.org", ".wikipedia.org", 1));
        if let Some(host) = desktop {
            url.set_host(Some(&host))
                .map_err(|e| WikiError::InvalidTarget(format!("{address}: {e}")))?;
        }
    }
    if !is_article_url(&url) {
        return Err(WikiError::InvalidTarget(format!(
            "{address} does not match the article address pattern"
        )));
    }
    Ok(url)
}

/// Whether an internal address leads to article content rather than an
/// administrative page.
pub fn is_content_link(address: &str) -> bool {
    !NON_CONTENT_MARKERS
        .iter()
        .any(|marker| address.contains(marker))
}

/// Extracts every anchor from `html`, resolving relative targets against
/// `base`. Anchor-only links are dropped; the rest are deduplicated by
/// address and partitioned by host.
pub fn link_set(html: &str, base: &Url) -> LinkSet {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut seen = std::collections::HashSet::new();
    let mut links = LinkSet::default();

    for element in document.select(&anchors) {
        let href = match element.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let resolved = match Url::parse(href).or_else(|_| base.join(href)) {
            Ok(url) => url,
            Err(_) => continue,
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let mut address = resolved.clone();
        address.set_fragment(None);
        let address = address.to_string();
        if !seen.insert(address.clone()) {
            continue;
        }
        let text = element.text().collect::<String>().trim().to_string();
        let link = LinkRef { address, text };
        if is_wiki_host(&resolved) {
            links.internal.push(link);
        } else {
            links.external.push(link);
        }
    }

    links
}

/// First paragraphs of the document as plain text, capped at roughly
/// `max_chars` characters.
pub fn plain_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let paragraphs = Selector::parse("p").expect("static selector");

    let mut out = String::new();
    for paragraph in document.select(&paragraphs) {
        let text = paragraph.text().collect::<String>();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(text);
        if out.len() >= max_chars {
            break;
        }
    }
    out
}
