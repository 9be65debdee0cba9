//! Chat-model arbitration between search candidates.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, RetryPolicy};
use crate::search::CandidateEntity;

static ENTITY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Q\d+").expect("static pattern"));

/// Asks a chat model which candidate answers a question.
#[derive(Debug, Clone)]
pub struct LlmArbiter {
    chat: Arc<dyn ChatModel>,
    retry: RetryPolicy<LlmError>,
    model: Option<String>,
    temperature: f32,
}

impl LlmArbiter {
    /// Create an arbiter with temperature 0 and the client's default model.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatModel>, retry: RetryPolicy<LlmError>) -> Self {
        Self {
            chat,
            retry,
            model: None,
            temperature: 0.0,
        }
    }

    /// Use `model` instead of the client's default.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Ask the model to pick one of `candidates` for `question`.
    ///
    /// Returns the first `Q<digits>` token of the reply, or `None` when the
    /// reply holds none. Only candidates with a description are shown.
    ///
    /// # Errors
    ///
    /// Returns the last [`LlmError`] once the retry policy gives up.
    pub async fn choose(
        &self,
        candidates: &[CandidateEntity],
        question: &str,
    ) -> Result<Option<String>, LlmError> {
        let request = ChatRequest::new(vec![ChatMessage::user(arbitration_prompt(
            candidates, question,
        ))])
        .with_temperature(self.temperature)
        .with_model(self.model.clone());

        let reply = self
            .retry
            .run("disambiguation", || self.chat.complete(&request))
            .await?;

        let chosen = ENTITY_ID.find(&reply).map(|m| m.as_str().to_string());
        tracing::debug!(
            name: "disambiguation.arbitrated",
            candidates = candidates.len(),
            chosen = chosen.as_deref().unwrap_or(""),
            "Arbiter replied"
        );
        Ok(chosen)
    }
}

/// Build the arbitration prompt. Candidates are listed as
/// `{"<id>": {"label": ..., "description": ...}}` objects, in rank order.
#[must_use]
pub fn arbitration_prompt(candidates: &[CandidateEntity], question: &str) -> String {
    let listed: Vec<Value> = candidates
        .iter()
        .filter_map(|c| {
            let description = c.description.as_ref()?;
            let mut entry = Map::new();
            entry.insert(
                c.id.clone(),
                json!({ "label": c.label, "description": description }),
            );
            Some(Value::Object(entry))
        })
        .collect();

    format!(
        "Given the candidates {}, which one should be the answer to the question '{question}' \
         Return only the key of the candidate, such as 'Q123456'.",
        Value::Array(listed)
    )
}
