//! Entity disambiguation: map free-text object labels to knowledge-base ids.
//!
//! A [`Strategy`] decides how one label is resolved:
//!
//! - [`Strategy::Baseline`]: first-ranked search candidate.
//! - [`Strategy::CaseBased`]: a small table of known-bad labels, then baseline.
//! - [`Strategy::KeywordBased`]: first candidate whose description matches a
//!   keyword pattern, then baseline.
//! - [`Strategy::LmArbitrated`]: ask a chat model to pick among candidates.
//!
//! Every strategy falls back to the label itself when the search service
//! returns nothing. The [`DispatchTable`] says which strategy each relation
//! uses; the [`Orchestrator`] applies it to a whole prediction batch.
//!
//! # Example
//!
//! ```rust,ignore
//! let table = DispatchTable::standard()?;
//! let orchestrator = Orchestrator::new(table, search, Some(arbiter));
//! orchestrator.run(&predictions_dir, Relation::PersonHasEmployer).await?;
//! ```

pub mod arbiter;
pub mod cases;
pub mod orchestrator;
pub mod table;

pub use arbiter::LlmArbiter;
pub use orchestrator::{DisambiguationSummary, Orchestrator, Outcome};
pub use table::DispatchTable;

use regex::RegexSet;

use crate::error::{Error, Result};
use crate::prompt::render_question;
use crate::relation::Relation;
use crate::search::{CandidateEntity, EntitySearch, search_union};

/// Result of resolving one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A knowledge-base id was found.
    Resolved(String),
    /// Nothing matched; the original label is kept.
    Unresolved(String),
}

impl Resolution {
    /// The string written to the record's id list.
    #[must_use]
    pub fn into_id(self) -> String {
        match self {
            Self::Resolved(id) | Self::Unresolved(id) => id,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Compiled keyword patterns matched against candidate descriptions.
#[derive(Debug, Clone)]
pub struct KeywordSet(RegexSet);

impl KeywordSet {
    /// Compile `patterns` (regular expressions, unanchored).
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RegexSet::new(patterns).map(Self)
    }

    /// Whether any pattern occurs in `description`.
    #[must_use]
    pub fn matches(&self, description: &str) -> bool {
        self.0.is_match(description)
    }

    /// The source patterns, in insertion order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        self.0.patterns()
    }
}

/// Collaborators a strategy may need while resolving one label.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Entity search service.
    pub search: &'a dyn EntitySearch,
    /// Chat-model arbiter; only the LM-arbitrated strategy uses it.
    pub arbiter: Option<&'a LlmArbiter>,
    /// Subject of the record the label belongs to.
    pub subject: &'a str,
}

/// How a label is mapped to an identifier.
#[derive(Debug, Clone)]
pub enum Strategy {
    Baseline,
    CaseBased,
    KeywordBased {
        keywords: KeywordSet,
    },
    LmArbitrated {
        /// Question with a `{subject_entity}` placeholder.
        question_template: String,
    },
}

impl Strategy {
    /// Short name for logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::CaseBased => "case-based",
            Self::KeywordBased { .. } => "keyword-based",
            Self::LmArbitrated { .. } => "lm-based",
        }
    }

    /// Resolve `item`, an object label predicted for `relation`.
    ///
    /// # Errors
    ///
    /// Only the LM-arbitrated strategy can fail: when no arbiter is
    /// configured, or when the chat call exhausts its retries.
    pub async fn resolve(
        &self,
        item: &str,
        relation: Relation,
        ctx: &ResolveContext<'_>,
    ) -> Result<Resolution> {
        match self {
            Self::Baseline => Ok(first_ranked(&ctx.search.search(item).await, item)),
            Self::CaseBased => {
                if let Some(id) = cases::lookup(item, relation) {
                    return Ok(Resolution::Resolved(id.to_string()));
                }
                Ok(first_ranked(&ctx.search.search(item).await, item))
            }
            Self::KeywordBased { keywords } => {
                let candidates = search_union(ctx.search, &keyword_queries(item, relation)).await;
                let matched = candidates.iter().find(|c| {
                    c.description
                        .as_deref()
                        .is_some_and(|d| keywords.matches(d))
                });
                match matched {
                    Some(candidate) => Ok(Resolution::Resolved(candidate.id.clone())),
                    None => Ok(first_ranked(&candidates, item)),
                }
            }
            Self::LmArbitrated { question_template } => {
                let candidates = search_union(ctx.search, &arbitration_queries(item, relation)).await;
                if candidates.len() > 1 {
                    let arbiter = ctx.arbiter.ok_or_else(|| {
                        Error::Config(format!(
                            "relation {relation} uses LM arbitration but no chat model is configured"
                        ))
                    })?;
                    let question = render_question(question_template, ctx.subject);
                    if let Some(id) = arbiter.choose(&candidates, &question).await? {
                        return Ok(Resolution::Resolved(id));
                    }
                }
                Ok(first_ranked(&candidates, item))
            }
        }
    }
}

fn first_ranked(candidates: &[CandidateEntity], item: &str) -> Resolution {
    candidates.first().map_or_else(
        || Resolution::Unresolved(item.to_string()),
        |c| Resolution::Resolved(c.id.clone()),
    )
}

/// Book titles are often predicted with a subtitle; also search the title alone.
fn keyword_queries(item: &str, relation: Relation) -> Vec<String> {
    let mut queries = vec![item.to_string()];
    if relation == Relation::PersonHasAutobiography && !item.is_empty() {
        let title = item.split(':').next().unwrap_or(item);
        queries.push(title.to_string());
    }
    queries
}

/// River names are often predicted without the word "River".
fn arbitration_queries(item: &str, relation: Relation) -> Vec<String> {
    let mut queries = vec![item.to_string()];
    if relation == Relation::CityLocatedAtRiver && !item.is_empty() && !item.contains("River") {
        queries.push(format!("{item} River"));
        queries.push(format!("River {item}"));
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set_is_unanchored() {
        let set = KeywordSet::new(["musician", "singer"]).unwrap();
        assert!(set.matches("American singer-songwriter"));
        assert!(!set.matches("album by Queen"));
        assert_eq!(set.patterns(), ["musician", "singer"]);
    }

    #[test]
    fn test_invalid_keyword_pattern() {
        assert!(KeywordSet::new(["(unclosed"]).is_err());
    }

    #[test]
    fn test_autobiography_queries() {
        assert_eq!(
            keyword_queries("Dreams from My Father: A Story", Relation::PersonHasAutobiography),
            vec!["Dreams from My Father: A Story", "Dreams from My Father"]
        );
        assert_eq!(
            keyword_queries("", Relation::PersonHasAutobiography),
            vec![""]
        );
        assert_eq!(keyword_queries("guitar", Relation::BandHasMember), vec!["guitar"]);
    }

    #[test]
    fn test_river_queries() {
        assert_eq!(
            arbitration_queries("Seine", Relation::CityLocatedAtRiver),
            vec!["Seine", "Seine River", "River Seine"]
        );
        assert_eq!(
            arbitration_queries("Hudson River", Relation::CityLocatedAtRiver),
            vec!["Hudson River"]
        );
        assert_eq!(
            arbitration_queries("Seine", Relation::PersonHasSpouse),
            vec!["Seine"]
        );
    }

    #[test]
    fn test_resolution_collapses_to_id() {
        assert_eq!(Resolution::Resolved("Q1".into()).into_id(), "Q1");
        let unresolved = Resolution::Unresolved("Atlantis".into());
        assert!(!unresolved.is_resolved());
        assert_eq!(unresolved.into_id(), "Atlantis");
    }
}
