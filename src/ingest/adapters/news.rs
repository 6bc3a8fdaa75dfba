// src/ingest/adapters/news.rs
//! HTML news adapter: walks configured outlets, pulls headline cards with
//! per-outlet CSS selectors, and shapes candidates through the normalize
//! helpers. One outlet failing never stops the others.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use reqwest::header;
use scraper::{ElementRef, Html, Selector};

use crate::config::NewsSource;
use crate::error::{Error, Result};
use crate::ingest::adapters::http_client;
use crate::ingest::types::{FetchBatch, SourceAdapter};
use crate::model::{CandidateItem, DataType, SourceMetadata};
use crate::normalize::{calculate_priority, categorize, extract_tags};

/// Headline cards kept per outlet per run.
const ITEMS_PER_OUTLET: usize = 10;

// Inner selectors are shared across outlets; only the card container varies.
fn title_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| {
        Selector::parse("h3, h2, .promo-title, .headline").expect("valid title selector")
    })
}

fn description_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| {
        Selector::parse("p, .summary, .description").expect("valid description selector")
    })
}

fn anchor_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("a").expect("valid anchor selector"))
}

fn image_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("img").expect("valid image selector"))
}

#[derive(Debug)]
struct Outlet {
    source: NewsSource,
    container: Selector,
}

#[derive(Debug)]
pub struct NewsAdapter {
    outlets: Vec<Outlet>,
    client: reqwest::Client,
    timeout: Duration,
}

impl NewsAdapter {
    /// Compiles each outlet's container selector up front so a bad catalog
    /// entry fails at wiring time, not mid-run.
    pub fn new(sources: Vec<NewsSource>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut outlets = Vec::with_capacity(sources.len());
        for source in sources {
            let container = Selector::parse(&source.selector).map_err(|e| {
                Error::Config(format!(
                    "invalid selector '{}' for outlet '{}': {e}",
                    source.selector, source.name
                ))
            })?;
            outlets.push(Outlet { source, container });
        }
        Ok(NewsAdapter {
            outlets,
            client: http_client(user_agent)?,
            timeout,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl SourceAdapter for NewsAdapter {
    fn job_name(&self) -> &'static str {
        "news-scraper"
    }

    fn data_type(&self) -> DataType {
        DataType::News
    }

    fn source_label(&self) -> &'static str {
        "multiple"
    }

    async fn fetch(&self) -> Result<FetchBatch> {
        let mut batch = FetchBatch::new();
        for outlet in &self.outlets {
            batch.sources_attempted += 1;
            let page = match self.fetch_page(&outlet.source.url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        outlet = %outlet.source.name,
                        error = %e,
                        "outlet fetch failed"
                    );
                    batch.source_failed(&outlet.source.name, &e);
                    continue;
                }
            };
            let items = parse_outlet_page(&outlet.source, &outlet.container, &page);
            tracing::debug!(
                target: "ingest",
                outlet = %outlet.source.name,
                items = items.len(),
                "outlet parsed"
            );
            batch.candidates.extend(items);
        }
        Ok(batch)
    }
}

/// Extracts up to [`ITEMS_PER_OUTLET`] candidates from one outlet page.
/// Cards without both a title and a link are dropped.
fn parse_outlet_page(outlet: &NewsSource, container: &Selector, html: &str) -> Vec<CandidateItem> {
    let doc = Html::parse_document(html);
    let base = reqwest::Url::parse(&outlet.url).ok();
    let mut out = Vec::new();

    for card in doc.select(container) {
        let Some(title) = first_text(&card, title_selector()) else {
            continue;
        };
        let Some(href) = card
            .select(anchor_selector())
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Some(url) = resolve_url(base.as_ref(), href) else {
            continue;
        };
        let description = first_text(&card, description_selector()).unwrap_or_default();
        let image_url = card
            .select(image_selector())
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve_url(base.as_ref(), src));

        let tags = extract_tags(&format!("{title} {description}"));
        let priority = calculate_priority(&title, &description);
        let category = categorize(&title, &description).to_string();
        out.push(CandidateItem {
            source: outlet.name.clone(),
            data_type: DataType::News,
            title,
            description,
            url,
            image_url,
            published_at: Utc::now(),
            metadata: SourceMetadata::News {
                outlet: outlet.name.clone(),
                author: None,
            },
            tags,
            priority,
            category,
        });
        if out.len() == ITEMS_PER_OUTLET {
            break;
        }
    }
    out
}

/// First matching descendant's text, whitespace-collapsed. None when blank.
fn first_text(card: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let node = card.select(selector).next()?;
    let text = node.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Absolute URLs pass through; relative ones resolve against the outlet base.
fn resolve_url(base: Option<&reqwest::Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PRIORITY_MAX;

    const BBC_HTML: &str = include_str!("../../../tests/fixtures/news_page.html");

    fn bbc() -> (NewsSource, Selector) {
        let source = NewsSource {
            name: "BBC News".into(),
            url: "https://www.bbc.com/news".into(),
            selector: ".gs-c-promo".into(),
        };
        let container = Selector::parse(&source.selector).unwrap();
        (source, container)
    }

    #[test]
    fn parses_cards_and_resolves_relative_links() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);

        let first = &items[0];
        assert_eq!(first.title, "Government announces election date");
        assert_eq!(first.url, "https://www.bbc.com/news/uk-politics-100");
        assert_eq!(first.source, "BBC News");
        assert_eq!(first.data_type, DataType::News);
        assert_eq!(first.category, "politics");
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://www.bbc.com/img/election.jpg")
        );
    }

    #[test]
    fn absolute_links_pass_through_untouched() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);
        assert!(items
            .iter()
            .any(|i| i.url == "https://example.org/external/story"));
    }

    #[test]
    fn cards_missing_title_or_link_are_dropped() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);
        assert!(items.iter().all(|i| !i.title.is_empty()));
        assert!(items.iter().all(|i| !i.url.is_empty()));
        // Fixture has 13 cards; one lacks a link, one lacks a title.
        assert_eq!(items.len(), ITEMS_PER_OUTLET);
    }

    #[test]
    fn caps_at_ten_cards_per_outlet() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);
        assert_eq!(items.len(), ITEMS_PER_OUTLET);
    }

    #[test]
    fn urgent_headline_gets_max_priority_and_tags() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);
        let urgent = items
            .iter()
            .find(|i| i.title.starts_with("Breaking"))
            .expect("urgent card present");
        assert_eq!(urgent.priority, PRIORITY_MAX);
        assert!(urgent.tags.contains(&"breaking".to_string()));
        assert!(urgent.tags.len() <= crate::model::MAX_TAGS);
    }

    #[test]
    fn whitespace_in_titles_is_collapsed() {
        let (source, container) = bbc();
        let items = parse_outlet_page(&source, &container, BBC_HTML);
        let spread = items
            .iter()
            .find(|i| i.url.ends_with("/tech-200"))
            .expect("multiline card present");
        assert_eq!(spread.title, "New software platform reshapes industry");
    }

    #[test]
    fn bad_selector_is_rejected_at_construction() {
        let sources = vec![NewsSource {
            name: "Broken".into(),
            url: "https://example.org".into(),
            selector: ":::nope".into(),
        }];
        let err = NewsAdapter::new(sources, Duration::from_secs(30), "test-agent").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
