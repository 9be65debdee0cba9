//! The `run` task: probe a chat model for the objects of every subject of a
//! relation and write the predictions batch.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::ContextLoader;
use crate::disambiguation::{ResolveContext, Strategy};
use crate::error::{Error, LlmError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, RetryPolicy};
use crate::parser::parse_response;
use crate::prompt::{
    self, ANSWER_FORMAT_SUFFIX, FewShotExamples, PromptType, build_examples, context_follow_up,
    probe_messages, render_prompt,
};
use crate::record::Record;
use crate::relation::Relation;
use crate::search::EntitySearch;
use crate::store;
use crate::workspace::{RunSpec, Workspace};

/// Sampling temperature for probe queries.
const PROBE_TEMPERATURE: f32 = 1.0;

/// How much help the model gets with each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeSetting {
    /// The query alone.
    ZeroShot,
    /// Examples from the training split.
    FewShot,
    /// Pre-selected examples, then a second turn with Wikipedia context.
    Context,
    /// Pre-selected (semantically similar) examples.
    SemSim,
}

impl ProbeSetting {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroShot => "zero-shot",
            Self::FewShot => "few-shot",
            Self::Context => "context",
            Self::SemSim => "sem-sim",
        }
    }
}

impl fmt::Display for ProbeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a probing run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSummary {
    pub relation: Relation,
    /// Subjects probed.
    pub records: usize,
    /// Subjects for which the model predicted nothing.
    pub empty: usize,
    /// Where the batch was written.
    pub output: PathBuf,
}

/// Runs probes against a chat model.
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    chat: Arc<dyn ChatModel>,
    search: Arc<dyn EntitySearch>,
    context: Arc<dyn ContextLoader>,
    retry: RetryPolicy<LlmError>,
    workspace: Workspace,
}

impl ProbeRunner {
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatModel>,
        search: Arc<dyn EntitySearch>,
        context: Arc<dyn ContextLoader>,
        retry: RetryPolicy<LlmError>,
        workspace: Workspace,
    ) -> Self {
        Self {
            chat,
            search,
            context,
            retry,
            workspace,
        }
    }

    /// Probe every subject of `spec.relation` in `spec.dataset`.
    ///
    /// Predicted labels are linked with the baseline strategy, except for
    /// numeric relations whose ids are the labels themselves.
    ///
    /// # Errors
    ///
    /// Fails on unreadable inputs, a missing template or example file, and
    /// chat calls that exhaust their retries.
    pub async fn run(&self, spec: &RunSpec) -> Result<ProbeSummary> {
        let relation: Relation = spec.relation.parse()?;
        let subjects = store::read_relation(
            self.workspace.dataset_path(&spec.dataset),
            relation.as_str(),
        )?;
        let template = self.template(spec.prompt_type, relation)?;
        let examples = self.examples(spec, relation, &template)?;

        tracing::info!(
            name: "probe.started",
            run = %spec.run_name(),
            relation = %relation,
            subjects = subjects.len(),
            examples = examples.len(),
            "Starting probing"
        );

        let mut results = Vec::with_capacity(subjects.len());
        let mut empty = 0;
        for row in &subjects {
            let query = format!(
                "{}{ANSWER_FORMAT_SUFFIX}",
                render_prompt(spec.prompt_type, &row.subject, &template)
            );
            let objects = self
                .probe(spec, relation, &row.subject, &query, &examples)
                .await?;
            if objects == [""] {
                empty += 1;
            }

            let ids = self.link(relation, &row.subject, &objects).await?;
            let mut record = Record::new(
                row.subject_id.clone(),
                row.subject.clone(),
                relation.as_str(),
                objects,
            );
            record.object_ids = Some(ids);
            results.push(record);
        }

        let output = self.workspace.predictions_path(spec);
        store::write_records(&output, &results)?;

        tracing::info!(
            name: "probe.completed",
            run = %spec.run_name(),
            relation = %relation,
            records = results.len(),
            empty,
            output = %output.display(),
            "Finished probing"
        );

        Ok(ProbeSummary {
            relation,
            records: results.len(),
            empty,
            output,
        })
    }

    fn template(&self, prompt_type: PromptType, relation: Relation) -> Result<String> {
        let templates = match prompt_type {
            PromptType::Question => prompt::load_question_templates(&self.workspace.question_prompts)?,
            PromptType::Triple => prompt::QuestionTemplates::new(),
        };
        prompt::template_for(prompt_type, relation, &templates)
    }

    fn examples(
        &self,
        spec: &RunSpec,
        relation: Relation,
        template: &str,
    ) -> Result<FewShotExamples> {
        match spec.setting {
            ProbeSetting::ZeroShot => Ok(FewShotExamples::new()),
            ProbeSetting::FewShot => {
                let records = store::read_records(self.workspace.train_path())?;
                Ok(build_examples(
                    spec.prompt_type,
                    &records,
                    relation,
                    template,
                    false,
                ))
            }
            ProbeSetting::SemSim | ProbeSetting::Context => {
                let path = &self.workspace.similar_examples;
                if !path.exists() {
                    return Err(Error::MissingExamples(path.clone()));
                }
                let records = store::read_records(path)?;
                Ok(build_examples(
                    spec.prompt_type,
                    &records,
                    relation,
                    template,
                    true,
                ))
            }
        }
    }

    /// Ask the model about one subject and parse its final reply.
    async fn probe(
        &self,
        spec: &RunSpec,
        relation: Relation,
        subject: &str,
        query: &str,
        examples: &FewShotExamples,
    ) -> Result<Vec<String>> {
        let mut messages = probe_messages(query, examples);
        let mut reply = self.complete(spec, &messages).await?;

        if spec.setting == ProbeSetting::Context {
            let context = self.context.load(subject, relation).await;
            if !context.is_empty() {
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(context_follow_up(
                    relation, &context, query,
                )));
                reply = self.complete(spec, &messages).await?;
            }
        }

        let answers = parse_response(&reply);
        tracing::debug!(
            name: "probe.answered",
            subject,
            reply = %reply,
            answers = answers.len(),
            "Model answered"
        );
        Ok(answers)
    }

    async fn complete(&self, spec: &RunSpec, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest::new(messages.to_vec())
            .with_temperature(PROBE_TEMPERATURE)
            .with_model(Some(spec.model.clone()));
        let reply = self
            .retry
            .run("probe", || self.chat.complete(&request))
            .await?;
        Ok(reply)
    }

    async fn link(&self, relation: Relation, subject: &str, objects: &[String]) -> Result<Vec<String>> {
        if relation.is_numeric() {
            return Ok(objects.to_vec());
        }

        let ctx = ResolveContext {
            search: self.search.as_ref(),
            arbiter: None,
            subject,
        };
        let mut ids = Vec::with_capacity(objects.len());
        for label in objects {
            ids.push(
                Strategy::Baseline
                    .resolve(label, relation, &ctx)
                    .await?
                    .into_id(),
            );
        }
        Ok(ids)
    }
}
