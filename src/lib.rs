//! LLM knowledge-base probing harness
//!
//! Probes chat models for (subject, relation, object) triples, links the
//! predicted object labels to Wikidata entities, and scores the predictions
//! against a Wikidata-derived ground truth.
//!
//! # Architecture
//!
//! - **Probing**: prompt a chat model per subject, parse its free-text reply
//! - **Disambiguation**: resolve labels to ids through per-relation strategies
//! - **Evaluation**: precision / recall / F1 per pair and per relation
//! - **Graph extraction**: zero-shot graph generation with one repair pass
//!
//! # Modules
//!
//! - [`llm`]: chat client trait, OpenAI-compatible client, retry policy
//! - [`parser`]: model reply → answer list
//! - [`search`]: Wikidata entity search
//! - [`disambiguation`]: strategies, dispatch table and batch orchestrator
//! - [`probe`] / [`evaluate`]: the `run` and `evaluate` tasks
//! - [`store`]: JSONL record batches

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::float_cmp)]

pub mod config;
pub mod context;
pub mod disambiguation;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod llm;
pub mod parser;
pub mod probe;
pub mod prompt;
pub mod record;
pub mod relation;
pub mod search;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use error::{Error, Result};
pub use record::Record;
pub use relation::Relation;
