//! Background context for the `context` probing setting.
//!
//! Context is best-effort: a missing page or a failed request yields an
//! empty string, and the probe then behaves like plain few-shot prompting.
//! The general context joins the plain-text lead section with the header /
//! value rows of the page's infobox.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::relation::Relation;

/// Upper bound on the administrative-divisions text, in characters.
pub const MAX_DIVISIONS_CHARS: usize = 32_000;

/// Supplies reference text about a subject.
#[async_trait]
pub trait ContextLoader: Send + Sync + std::fmt::Debug {
    /// Context for probing `relation` of `subject`; empty when unavailable.
    async fn load(&self, subject: &str, relation: Relation) -> String;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsedPage>,
}

#[derive(Debug, Deserialize)]
struct ParsedPage {
    #[serde(default)]
    text: String,
}

/// Context from English Wikipedia via the MediaWiki `extracts` and `parse` APIs.
#[derive(Debug, Clone)]
pub struct WikipediaContext {
    client: Client,
    endpoint: Url,
}

impl WikipediaContext {
    /// Create a loader for `endpoint` (e.g. `https://en.wikipedia.org/w/api.php`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid wikipedia endpoint {endpoint}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build wikipedia client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// Plain-text extract of `title`; only the lead section when `intro_only`.
    async fn extract(
        &self,
        title: &str,
        intro_only: bool,
    ) -> std::result::Result<Option<String>, String> {
        let mut params = vec![
            ("action", "query"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("format", "json"),
            ("formatversion", "2"),
            ("titles", title),
        ];
        if intro_only {
            params.push(("exintro", "1"));
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("wikipedia returned {}", response.status()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected response body: {e}"))?;

        Ok(body
            .query
            .and_then(|q| q.pages.into_iter().next())
            .filter(|page| !page.missing)
            .and_then(|page| page.extract)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    /// Rendered HTML of `title`, or `None` when the page does not exist.
    async fn rendered_html(&self, title: &str) -> std::result::Result<Option<String>, String> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("action", "parse"),
                ("prop", "text"),
                ("redirects", "1"),
                ("format", "json"),
                ("formatversion", "2"),
                ("page", title),
            ])
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("wikipedia returned {}", response.status()));
        }

        let body: ParseResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected response body: {e}"))?;
        Ok(body.parse.map(|page| page.text).filter(|html| !html.is_empty()))
    }

    async fn infobox_or_empty(&self, title: &str) -> Vec<(String, String)> {
        match self.rendered_html(title).await {
            Ok(Some(html)) => parse_infobox(&html),
            Ok(None) => Vec::new(),
            Err(reason) => {
                tracing::warn!(
                    name: "context.failed",
                    title,
                    reason = %reason,
                    "Wikipedia infobox lookup failed; continuing without it"
                );
                Vec::new()
            }
        }
    }

    async fn extract_or_empty(&self, title: &str, intro_only: bool) -> String {
        match self.extract(title, intro_only).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!(name: "context.missing", title, "No Wikipedia page");
                String::new()
            }
            Err(reason) => {
                tracing::warn!(
                    name: "context.failed",
                    title,
                    reason = %reason,
                    "Wikipedia lookup failed; continuing without context"
                );
                String::new()
            }
        }
    }
}

#[async_trait]
impl ContextLoader for WikipediaContext {
    async fn load(&self, subject: &str, relation: Relation) -> String {
        if relation == Relation::CountryHasStates {
            let title = format!("Administrative divisions of {subject}");
            let text = self.extract_or_empty(&title, false).await;
            return text.chars().take(MAX_DIVISIONS_CHARS).collect();
        }

        let intro = self.extract_or_empty(subject, true).await;
        let infobox = self.infobox_or_empty(subject).await;
        format_context(&intro, &infobox)
    }
}

/// Header / value rows of the first infobox table of `html`, in page order.
///
/// Rows without both a header and a value cell are skipped. Value text nodes
/// are trimmed and joined with `", "`. A repeated header keeps its first
/// position and takes the later value.
#[must_use]
pub fn parse_infobox(html: &str) -> Vec<(String, String)> {
    let (Ok(table), Ok(row), Ok(header), Ok(cell)) = (
        Selector::parse(r#"table[class*="infobox"]"#),
        Selector::parse("tr"),
        Selector::parse("th"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let Some(infobox) = document.select(&table).next() else {
        return Vec::new();
    };

    let mut rows: Vec<(String, String)> = Vec::new();
    for tr in infobox.select(&row) {
        let (Some(th), Some(td)) = (tr.select(&header).next(), tr.select(&cell).next()) else {
            continue;
        };
        let key = th.text().collect::<String>().trim().to_string();
        let value = td
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        match rows.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => rows.push((key, value)),
        }
    }
    rows
}

/// Render infobox rows as `{"Header": "value", ...}`.
#[must_use]
pub fn format_infobox(rows: &[(String, String)]) -> String {
    let fields: Vec<String> = rows
        .iter()
        .map(|(k, v)| format!("{}: {}", Value::from(k.as_str()), Value::from(v.as_str())))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// Join a lead section and infobox rows into probe context; empty when both are.
#[must_use]
pub fn format_context(intro: &str, infobox: &[(String, String)]) -> String {
    match (intro.is_empty(), infobox.is_empty()) {
        (false, false) => format!(
            "Wikipedia introduction: \"{intro}\"; Wikipedia Infobox: {}.",
            format_infobox(infobox)
        ),
        (false, true) => format!("Wikipedia introduction: \"{intro}\"."),
        (true, false) => format!("Wikipedia Infobox: {}", format_infobox(infobox)),
        (true, true) => String::new(),
    }
}
