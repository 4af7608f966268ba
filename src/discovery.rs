//! Gallery link discovery
//!
//! Resolves a listing URL into the gallery title and the ordered,
//! deduplicated sequence of item page links, following the pagination
//! control and any interstitial warning page on the way.

use crate::client::PageFetcher;
use crate::error::{Error, Result};
use crate::types::ItemLink;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Marker phrases identifying an interstitial warning/redirect page
const INTERSTITIAL_MARKERS: &[&str] = &["Content Warning", "Offensive For Everyone"];

/// Label of the interstitial's continue link
const CONTINUE_LINK_TEXT: &str = "View Gallery";

/// Site suffixes stripped from the document title
const TITLE_SUFFIXES: &[&str] = &[" - E-Hentai Galleries", " - ExHentai.org"];

/// A discovered gallery: resolved title plus the ordered item list
#[derive(Clone, Debug)]
pub struct Gallery {
    /// Title extracted from the listing page
    pub title: String,
    /// Effective listing URL (differs from the input when an interstitial
    /// page was followed)
    pub url: String,
    /// Ordered, deduplicated item links
    pub items: Vec<ItemLink>,
}

/// Discover the full item list of a gallery.
///
/// Fetches the listing page (following an interstitial warning page once if
/// present), extracts the title and the first page's item links, then walks
/// the pagination control fetching each remaining page with `page_delay`
/// between requests. The accumulated links are deduplicated preserving
/// first-seen order.
///
/// # Errors
///
/// Fails if the (effective) listing page cannot be fetched or parsed —
/// discovery failure is fatal for the task. Errors on *subsequent* pages are
/// logged and skipped so one bad page does not lose the rest of the gallery.
pub async fn discover(
    fetcher: &dyn PageFetcher,
    listing_url: &str,
    page_delay: Duration,
) -> Result<Gallery> {
    let mut effective_url = listing_url.to_string();
    let mut html = fetcher.fetch_text(&effective_url).await?;

    if is_interstitial(&html) {
        let continue_url = find_continue_link(&html, &effective_url).ok_or_else(|| {
            Error::Parse("interstitial page has no continue link".to_string())
        })?;
        tracing::info!(url = %continue_url, "Following interstitial continue link");
        effective_url = continue_url;
        html = fetcher.fetch_text(&effective_url).await?;
    }

    let title = extract_title(&html)
        .ok_or_else(|| Error::Parse("listing page has no title".to_string()))?;

    let pattern = item_pattern(&effective_url)?;
    let mut raw_links = extract_item_urls(&html, &pattern);

    if let Some(last_page) = last_page_index(&html) {
        tracing::info!(pages = last_page + 1, "Gallery is paginated");
        for page in 1..=last_page {
            tokio::time::sleep(page_delay).await;
            let page_url = listing_page_url(&effective_url, page);
            match fetcher.fetch_text(&page_url).await {
                Ok(page_html) => {
                    let links = extract_item_urls(&page_html, &pattern);
                    tracing::debug!(page = page + 1, links = links.len(), "Fetched listing page");
                    raw_links.extend(links);
                }
                Err(e) => {
                    tracing::warn!(
                        page = page + 1,
                        error = %e,
                        "Failed to fetch listing page, skipping"
                    );
                }
            }
        }
    }

    // Deduplicate preserving first-seen order: pages may overlap or be refetched
    let mut seen = HashSet::new();
    let items: Vec<ItemLink> = raw_links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .filter_map(|link| {
            let parsed = ItemLink::from_page_url(&link);
            if parsed.is_none() {
                tracing::warn!(link = %link, "Item link has no usable sequence index, skipping");
            }
            parsed
        })
        .collect();

    tracing::info!(title = %title, items = items.len(), "Discovery complete");

    Ok(Gallery {
        title,
        url: effective_url,
        items,
    })
}

/// True if the page is an interstitial warning page rather than the listing.
fn is_interstitial(html: &str) -> bool {
    INTERSTITIAL_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Find the interstitial's continue link, resolved against the current URL.
fn find_continue_link(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a").ok()?;

    for anchor in document.select(&selector) {
        let text: String = anchor.text().collect();
        if text.contains(CONTINUE_LINK_TEXT) {
            let href = anchor.value().attr("href")?;
            return resolve_href(base_url, href);
        }
    }
    None
}

/// Resolve a possibly-relative href against a base URL.
fn resolve_href(base_url: &str, href: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Extract the gallery title from the document `<title>`, stripping known
/// site suffixes.
fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    let mut title = raw.trim();
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim();
            break;
        }
    }
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Build the item-identifier pattern for the listing's scheme and host:
/// `<scheme>://<host>/s/<token>/<gallery-id>-<sequence>`.
fn item_pattern(listing_url: &str) -> Result<Regex> {
    let url = Url::parse(listing_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Parse(format!("listing URL has no host: {listing_url}")))?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let pattern = format!(
        r"{}://{}/s/[a-z0-9]+/\d+-\d+",
        regex::escape(url.scheme()),
        regex::escape(&authority)
    );
    Regex::new(&pattern).map_err(|e| Error::Parse(format!("bad item pattern: {e}")))
}

/// All item page URLs on one listing page, in document order.
fn extract_item_urls(html: &str, pattern: &Regex) -> Vec<String> {
    pattern.find_iter(html).map(|m| m.as_str().to_string()).collect()
}

/// Highest page index in the pagination control, if the gallery is paginated.
///
/// Pages are zero-indexed in the `?p=` query parameter; the first page has no
/// parameter. The `>` navigation anchor (when present) sits after the last
/// numbered page and is excluded.
fn last_page_index(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("table.ptt a").ok()?;
    let anchors: Vec<_> = document.select(&selector).collect();
    if anchors.len() <= 1 {
        return None;
    }

    let last_anchor = {
        let last_text: String = anchors[anchors.len() - 1].text().collect();
        if last_text.contains('>') {
            anchors[anchors.len() - 2]
        } else {
            anchors[anchors.len() - 1]
        }
    };

    let href = last_anchor.value().attr("href")?;
    let page_param = Regex::new(r"[?&]p=(\d+)").ok()?;
    let captures = page_param.captures(href)?;
    captures.get(1)?.as_str().parse().ok()
}

/// URL of a subsequent listing page (`p` is zero-indexed).
fn listing_page_url(listing_url: &str, page: u32) -> String {
    let separator = if listing_url.contains('?') { '&' } else { '?' };
    format!("{listing_url}{separator}p={page}")
}
