//! Lenta.ru archive scraper.
//!
//! Lenta publishes a listing per day at `https://lenta.ru/news/YYYY/MM/DD/`,
//! paginated through a "load more" link. Two generations of markup are in the
//! archive; every selector below lists both, legacy first.
//!
//! # URL Pattern
//!
//! Article links are relative (`/news/2019/05/06/slug/`) and are resolved
//! against `https://lenta.ru`.

use crate::error::ParseError;
use crate::models::ExtractedArticle;
use crate::scrapers::ExtractionStrategy;
use crate::utils::normalize_whitespace;
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

const BASE_URL: &str = "https://lenta.ru";

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.item.news.b-tabloid__topic_news a[href], a.card-full-news[href]").unwrap()
});
static NEXT_PAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.loadmore[href]").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"h1[itemprop="headline"], .topic-body__title"#).unwrap()
});
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[itemprop="articleBody"], div.topic-body__content"#).unwrap()
});
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TOPIC_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.b-header-inner__block, a.topic-header__rubric").unwrap()
});
static TAG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.item.dark.active, a.rubric-header__link._active").unwrap()
});

/// Extraction strategy for Lenta.ru.
#[derive(Debug, Clone)]
pub struct LentaStrategy {
    base: Url,
}

impl LentaStrategy {
    pub fn new() -> Self {
        Self {
            base: Url::parse(BASE_URL).unwrap(),
        }
    }

    /// Use a different origin (mirrors, local fixtures).
    pub fn with_base(base: Url) -> Self {
        Self { base }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let mut url = self.base.join(href.trim()).ok()?;
        url.set_fragment(None);
        Some(url.to_string())
    }
}

/// Normalised text of the first element matching `selector`, if non-empty.
fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

impl ExtractionStrategy for LentaStrategy {
    fn name(&self) -> &str {
        "lenta"
    }

    fn earliest_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(1999, 8, 30).unwrap()
    }

    fn listing_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/news/{}/",
            self.base.as_str().trim_end_matches('/'),
            date.format("%Y/%m/%d")
        )
    }

    fn extract_links(&self, listing_html: &str) -> Vec<String> {
        let document = Html::parse_document(listing_html);
        document
            .select(&LINK_SELECTOR)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.resolve(href))
            .unique()
            .collect()
    }

    fn extract_next_page(&self, listing_html: &str) -> Option<String> {
        let document = Html::parse_document(listing_html);
        document
            .select(&NEXT_PAGE_SELECTOR)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| self.resolve(href))
    }

    fn extract_article(&self, article_html: &str) -> Result<ExtractedArticle, ParseError> {
        let document = Html::parse_document(article_html);

        let body_el = document
            .select(&BODY_SELECTOR)
            .next()
            .ok_or(ParseError::MissingContainer("article body"))?;

        let body = body_el
            .select(&PARAGRAPH_SELECTOR)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .join(" ");
        if body.is_empty() {
            return Err(ParseError::EmptyBody);
        }

        Ok(ExtractedArticle {
            title: first_text(&document, &TITLE_SELECTOR),
            body,
            topic: first_text(&document, &TOPIC_SELECTOR),
            tags: first_text(&document, &TAG_SELECTOR),
        })
    }
}
