//! Batch disambiguation of one relation's prediction file.

use std::path::Path;
use std::sync::Arc;

use super::{DispatchTable, LlmArbiter, ResolveContext, Strategy};
use crate::error::Result;
use crate::record::Record;
use crate::relation::Relation;
use crate::search::EntitySearch;
use crate::store;
use crate::workspace::ALL_RELATIONS;

/// Counts from one disambiguation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisambiguationSummary {
    pub relation: Relation,
    /// Records rewritten.
    pub records: usize,
    /// Object labels seen across all records.
    pub labels: usize,
    /// Labels mapped to a knowledge-base id.
    pub resolved: usize,
    /// Labels kept as-is because nothing matched.
    pub unresolved: usize,
}

/// What happened to a relation's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The batch was resolved and rewritten.
    Completed(DisambiguationSummary),
    /// The relation has no dispatch entry; the batch was left untouched.
    Unsupported,
}

/// Applies the dispatch table to prediction batches.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    table: DispatchTable,
    search: Arc<dyn EntitySearch>,
    arbiter: Option<LlmArbiter>,
}

impl Orchestrator {
    /// Create an orchestrator. `arbiter` is required only by relations
    /// dispatched to [`Strategy::LmArbitrated`].
    #[must_use]
    pub fn new(
        table: DispatchTable,
        search: Arc<dyn EntitySearch>,
        arbiter: Option<LlmArbiter>,
    ) -> Self {
        Self {
            table,
            search,
            arbiter,
        }
    }

    #[must_use]
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Relations to disambiguate under `dir` for a run's relation argument.
    ///
    /// [`ALL_RELATIONS`] selects every dispatched relation whose batch file
    /// exists. A name that is not a relation selects nothing.
    #[must_use]
    pub fn select(&self, dir: &Path, relation: &str) -> Vec<Relation> {
        if relation == ALL_RELATIONS {
            return self
                .table
                .relations()
                .filter(|r| dir.join(format!("{r}.jsonl")).exists())
                .collect();
        }
        match relation.parse::<Relation>() {
            Ok(relation) => vec![relation],
            Err(e) => {
                tracing::warn!(
                    name: "disambiguation.unsupported",
                    relation = %relation,
                    error = %e,
                    "No disambiguation assigned"
                );
                Vec::new()
            }
        }
    }

    /// Re-resolve every object label of `{dir}/{relation}.jsonl` and rewrite
    /// the file.
    ///
    /// Existing ids are discarded. Record order and per-record label order
    /// are kept, so the id list ends up index-aligned with the labels.
    ///
    /// # Errors
    ///
    /// Fails when the batch cannot be read or written, or when an
    /// LM-arbitrated resolution fails.
    pub async fn run(&self, dir: &Path, relation: Relation) -> Result<Outcome> {
        let Some(strategy) = self.table.get(relation) else {
            tracing::warn!(
                name: "disambiguation.unsupported",
                relation = %relation,
                "No disambiguation assigned to relation"
            );
            return Ok(Outcome::Unsupported);
        };

        let path = dir.join(format!("{relation}.jsonl"));
        let mut records = store::read_records(&path)?;

        tracing::info!(
            name: "disambiguation.started",
            relation = %relation,
            strategy = strategy.kind(),
            records = records.len(),
            "Disambiguating batch"
        );

        let summary = self.resolve_records(strategy, relation, &mut records).await?;
        store::write_records(&path, &records)?;

        tracing::info!(
            name: "disambiguation.completed",
            relation = %relation,
            labels = summary.labels,
            resolved = summary.resolved,
            unresolved = summary.unresolved,
            "Batch rewritten"
        );
        Ok(Outcome::Completed(summary))
    }

    /// Resolve the labels of `records` in place with `strategy`.
    pub async fn resolve_records(
        &self,
        strategy: &Strategy,
        relation: Relation,
        records: &mut [Record],
    ) -> Result<DisambiguationSummary> {
        let mut summary = DisambiguationSummary {
            relation,
            records: records.len(),
            labels: 0,
            resolved: 0,
            unresolved: 0,
        };

        for record in records.iter_mut() {
            let ctx = ResolveContext {
                search: self.search.as_ref(),
                arbiter: self.arbiter.as_ref(),
                subject: &record.subject,
            };

            let mut ids = Vec::with_capacity(record.objects.len());
            for label in &record.objects {
                let resolution = strategy.resolve(label, relation, &ctx).await?;
                if resolution.is_resolved() {
                    summary.resolved += 1;
                } else {
                    summary.unresolved += 1;
                }
                ids.push(resolution.into_id());
            }
            summary.labels += ids.len();
            record.object_ids = Some(ids);
        }

        Ok(summary)
    }
}
