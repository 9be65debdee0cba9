//! Zero-shot knowledge-graph extraction with one-shot syntax repair.

use std::fmt;
use std::sync::Arc;

use oxrdfxml::RdfXmlParser;
use oxttl::{N3Parser, NTriplesParser, TurtleParser};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LlmError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, RetryPolicy};

const EXTRACTION_TEMPERATURE: f32 = 0.5;

const ENGINEER_PERSONA: &str = "You are a knowledge engineer. You can only output knowledge \
graphs in the specified format, without providing any explanations or additional commentary.";

const PARSER_PERSONA: &str =
    "You are a knowledge engineer with expertise in reading and parsing graph data.";

/// Graph serialization requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GraphFormat {
    Turtle,
    #[value(alias = "xml")]
    RdfXml,
    JsonLd,
    #[value(aliases = ["nt", "ntriples"])]
    NTriples,
    N3,
}

impl GraphFormat {
    /// Name used in prompts.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Turtle => "Turtle",
            Self::RdfXml => "RDF/XML",
            Self::JsonLd => "JSON-LD",
            Self::NTriples => "N-Triples",
            Self::N3 => "Notation-3",
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Check that `text` parses as a non-empty graph in `format`.
///
/// Returns a human-readable description of the first problem found.
/// No base IRI is assumed, so relative IRIs are rejected.
pub fn check_syntax(text: &str, format: GraphFormat) -> std::result::Result<(), String> {
    let statements = match format {
        GraphFormat::Turtle => count_statements(TurtleParser::new().for_reader(text.as_bytes()))?,
        GraphFormat::NTriples => {
            count_statements(NTriplesParser::new().for_reader(text.as_bytes()))?
        }
        GraphFormat::N3 => count_statements(N3Parser::new().for_reader(text.as_bytes()))?,
        GraphFormat::RdfXml => count_statements(RdfXmlParser::new().for_reader(text.as_bytes()))?,
        GraphFormat::JsonLd => return check_json_ld(text),
    };
    if statements == 0 {
        return Err("no triples found".to_string());
    }
    Ok(())
}

fn count_statements<T, E: fmt::Display>(
    parsed: impl Iterator<Item = std::result::Result<T, E>>,
) -> std::result::Result<usize, String> {
    let mut count = 0;
    for statement in parsed {
        statement.map_err(|e| e.to_string())?;
        count += 1;
    }
    Ok(count)
}

/// JSON syntax plus the shape of the JSON-LD keywords a graph relies on.
fn check_json_ld(text: &str) -> std::result::Result<(), String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    match &value {
        Value::Object(node) => check_node(node),
        Value::Array(items) => items.iter().try_for_each(|item| match item {
            Value::Object(node) => check_node(node),
            other => Err(format!("top-level item must be an object, found {}", kind(other))),
        }),
        other => Err(format!(
            "JSON-LD document must be an object or an array, found {}",
            kind(other)
        )),
    }
}

fn check_node(node: &Map<String, Value>) -> std::result::Result<(), String> {
    for (key, value) in node {
        match key.as_str() {
            "@context" => check_context(value)?,
            "@id" | "@language" | "@base" | "@vocab" if !value.is_string() => {
                return Err(format!("{key} must be a string, found {}", kind(value)));
            }
            "@type" => {
                let valid = match value {
                    Value::String(_) => true,
                    Value::Array(items) => items.iter().all(Value::is_string),
                    _ => false,
                };
                if !valid {
                    return Err(format!(
                        "@type must be a string or an array of strings, found {}",
                        kind(value)
                    ));
                }
            }
            "@graph" | "@list" | "@set" if !(value.is_array() || value.is_object()) => {
                return Err(format!("{key} must be an array or an object, found {}", kind(value)));
            }
            "@value" if value.is_array() || value.is_object() => {
                return Err(format!("@value must be a scalar, found {}", kind(value)));
            }
            _ => check_nested(value)?,
        }
    }
    Ok(())
}

fn check_nested(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Object(node) => check_node(node),
        Value::Array(items) => items.iter().try_for_each(check_nested),
        _ => Ok(()),
    }
}

fn check_context(context: &Value) -> std::result::Result<(), String> {
    match context {
        Value::Null | Value::String(_) => Ok(()),
        Value::Array(items) => items.iter().try_for_each(|item| match item {
            Value::Array(_) => Err("@context arrays cannot be nested".to_string()),
            other => check_context(other),
        }),
        Value::Object(terms) => {
            for (term, definition) in terms {
                let valid = match term.as_str() {
                    "@base" | "@vocab" | "@language" => {
                        definition.is_string() || definition.is_null()
                    }
                    "@version" => definition.is_number(),
                    "@protected" | "@propagate" => definition.is_boolean(),
                    _ => definition.is_string() || definition.is_object() || definition.is_null(),
                };
                if !valid {
                    return Err(format!(
                        "invalid @context entry {term:?}: unexpected {}",
                        kind(definition)
                    ));
                }
            }
            Ok(())
        }
        other => Err(format!(
            "@context must be a string, an object or an array, found {}",
            kind(other)
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extracts knowledge graphs from free text with a chat model.
#[derive(Debug, Clone)]
pub struct GraphExtractor {
    chat: Arc<dyn ChatModel>,
    retry: RetryPolicy<LlmError>,
    model: Option<String>,
}

impl GraphExtractor {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatModel>, retry: RetryPolicy<LlmError>) -> Self {
        Self {
            chat,
            retry,
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Ask the model for the graph of `text` under `ontology`, serialized in
    /// `format`, then [`validate`](Self::validate) it.
    pub async fn extract(&self, text: &str, ontology: &str, format: GraphFormat) -> Result<String> {
        let raw = self
            .ask(vec![
                ChatMessage::assistant(ENGINEER_PERSONA),
                ChatMessage::user(format!(
                    "Given the input text: {text}, extract the knowledge graph using the \
                     ontology {ontology} and convert the resulting graph into the {format} format."
                )),
            ])
            .await?;
        self.validate(&raw, format).await
    }

    /// Return `graph` unchanged when it parses. Otherwise send one correction
    /// request carrying the detected error and return its reply as-is.
    pub async fn validate(&self, graph: &str, format: GraphFormat) -> Result<String> {
        let Err(problem) = check_syntax(graph, format) else {
            return Ok(graph.to_string());
        };

        tracing::warn!(
            name: "graph.invalid",
            format = %format,
            problem = %problem,
            "Extracted graph failed to parse; requesting a correction"
        );

        self.ask(vec![
            ChatMessage::assistant(PARSER_PERSONA),
            ChatMessage::user(format!(
                "The provided graph is not correctly formatted as {format}. Detected error: \
                 {problem}. Correct the syntax issues in the graph text and return the graph in \
                 the proper format, ensuring the graph's content remains unchanged. You can only \
                 output knowledge graphs in the specified format, without providing any \
                 explanations or additional commentary.\n\n{graph}"
            )),
        ])
        .await
    }

    async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest::new(messages)
            .with_temperature(EXTRACTION_TEMPERATURE)
            .with_model(self.model.clone());
        let reply = self
            .retry
            .run("graph", || self.chat.complete(&request))
            .await?;
        Ok(reply)
    }
}
