//! On-disk layout of datasets, prediction runs and evaluation reports.
//!
//! ```text
//! data/{dataset}.jsonl                      subjects to probe / ground truth
//! data/test.query.jsonl                     ground truth of the `test` split
//! predictions/{run}/{relation}.jsonl        one batch per relation
//! predictions/{run}.jsonl                   all relations, concatenated
//! evaluations/{run}/{relation}.txt          per-relation report
//! evaluations/{run}.txt                     report over all relations
//! ```
//!
//! where `{run}` is `{dataset}-{model}-{setting}-{prompt}`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::probe::ProbeSetting;
use crate::prompt::PromptType;

/// Relation argument that selects every relation of a run.
pub const ALL_RELATIONS: &str = "all";

/// Identifies one probing run and the relation being worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub dataset: String,
    pub model: String,
    pub setting: ProbeSetting,
    pub prompt_type: PromptType,
    /// Relation name, or [`ALL_RELATIONS`].
    pub relation: String,
}

impl RunSpec {
    /// `{dataset}-{model}-{setting}-{prompt}`.
    #[must_use]
    pub fn run_name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.dataset, self.model, self.setting, self.prompt_type
        )
    }

    #[must_use]
    pub fn is_all_relations(&self) -> bool {
        self.relation == ALL_RELATIONS
    }
}

/// Root directories and files of a working tree.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Workspace {
    pub data_dir: PathBuf,
    pub predictions_dir: PathBuf,
    pub evaluations_dir: PathBuf,
    /// JSON map of relation name to question template.
    pub question_prompts: PathBuf,
    /// Pre-selected few-shot examples for the `sem-sim` and `context` settings.
    pub similar_examples: PathBuf,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl Workspace {
    /// Standard layout under `root`.
    #[must_use]
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            predictions_dir: root.join("predictions"),
            evaluations_dir: root.join("evaluations"),
            question_prompts: root.join("question-prompts.json"),
            similar_examples: root.join("examples.jsonl"),
        }
    }

    #[must_use]
    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(format!("{dataset}.jsonl"))
    }

    /// Source of plain few-shot examples.
    #[must_use]
    pub fn train_path(&self) -> PathBuf {
        self.dataset_path("train")
    }

    /// Ground truth for `dataset`; the `test` split ships it separately.
    #[must_use]
    pub fn ground_truth_path(&self, dataset: &str) -> PathBuf {
        if dataset == "test" {
            self.data_dir.join("test.query.jsonl")
        } else {
            self.dataset_path(dataset)
        }
    }

    #[must_use]
    pub fn run_dir(&self, spec: &RunSpec) -> PathBuf {
        self.predictions_dir.join(spec.run_name())
    }

    /// Batch file of `spec.relation` inside the run directory.
    #[must_use]
    pub fn predictions_path(&self, spec: &RunSpec) -> PathBuf {
        self.run_dir(spec).join(format!("{}.jsonl", spec.relation))
    }

    /// Concatenation of every batch of the run.
    #[must_use]
    pub fn concatenated_path(&self, spec: &RunSpec) -> PathBuf {
        self.predictions_dir
            .join(format!("{}.jsonl", spec.run_name()))
    }

    #[must_use]
    pub fn evaluation_path(&self, spec: &RunSpec) -> PathBuf {
        if spec.is_all_relations() {
            self.evaluations_dir
                .join(format!("{}.txt", spec.run_name()))
        } else {
            self.evaluations_dir
                .join(spec.run_name())
                .join(format!("{}.txt", spec.relation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(relation: &str) -> RunSpec {
        RunSpec {
            dataset: "val".into(),
            model: "gpt-4".into(),
            setting: ProbeSetting::FewShot,
            prompt_type: PromptType::Question,
            relation: relation.into(),
        }
    }

    #[test]
    fn test_run_name() {
        assert_eq!(spec("BandHasMember").run_name(), "val-gpt-4-few-shot-question");
    }

    #[test]
    fn test_layout() {
        let ws = Workspace::rooted_at("/w");
        let s = spec("BandHasMember");
        assert_eq!(
            ws.predictions_path(&s),
            PathBuf::from("/w/predictions/val-gpt-4-few-shot-question/BandHasMember.jsonl")
        );
        assert_eq!(
            ws.evaluation_path(&s),
            PathBuf::from("/w/evaluations/val-gpt-4-few-shot-question/BandHasMember.txt")
        );
        assert_eq!(
            ws.evaluation_path(&spec(ALL_RELATIONS)),
            PathBuf::from("/w/evaluations/val-gpt-4-few-shot-question.txt")
        );
        assert_eq!(
            ws.concatenated_path(&s),
            PathBuf::from("/w/predictions/val-gpt-4-few-shot-question.jsonl")
        );
    }

    #[test]
    fn test_ground_truth_of_test_split() {
        let ws = Workspace::rooted_at("/w");
        assert_eq!(ws.ground_truth_path("test"), PathBuf::from("/w/data/test.query.jsonl"));
        assert_eq!(ws.ground_truth_path("val"), PathBuf::from("/w/data/val.jsonl"));
    }
}
