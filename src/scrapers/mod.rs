//! Source-specific extraction strategies.
//!
//! The pipeline never looks at markup itself. Everything it needs to know
//! about a site goes through [`ExtractionStrategy`]:
//!
//! 1. **Listing**: where a date's listing lives, which article links it
//!    holds, and whether it links to a further page
//! 2. **Article**: title, body, topic and tags of one article page
//!
//! Strategies are pure functions over HTML strings, so they can run on the
//! CPU worker pool and be tested against fixture markup.
//!
//! # Supported Sources
//!
//! | Source | Module | Archive floor |
//! |--------|--------|---------------|
//! | Lenta.ru | [`lenta`] | 1999-08-30 |

pub mod lenta;

use crate::error::ParseError;
use crate::models::ExtractedArticle;
use chrono::NaiveDate;

/// Pluggable, side-effect-free view of one news site.
pub trait ExtractionStrategy: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Oldest date the site publishes a listing for.
    fn earliest_date(&self) -> NaiveDate;

    /// Absolute URL of the first listing page for `date`.
    fn listing_url(&self, date: NaiveDate) -> String;

    /// Absolute article URLs on a listing page, in page order, without
    /// duplicates.
    fn extract_links(&self, listing_html: &str) -> Vec<String>;

    /// Absolute URL of the following listing page, if the page links one.
    fn extract_next_page(&self, listing_html: &str) -> Option<String>;

    /// Structured content of an article page.
    ///
    /// # Errors
    ///
    /// [`ParseError`] when the body container is missing or empty. Missing
    /// title, topic or tags degrade to `None`.
    fn extract_article(&self, article_html: &str) -> Result<ExtractedArticle, ParseError>;
}
