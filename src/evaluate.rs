//! The `evaluate` task: score prediction ids against the ground truth.
//!
//! Scores are computed per (subject, relation) pair on `ObjectEntitiesID`,
//! macro-averaged per relation, and averaged once more across relations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::store;
use crate::workspace::{RunSpec, Workspace};

/// Label of the cross-relation average row.
pub const AVERAGE_ROW: &str = "*** Average ***";

/// Predictions found in the ground truth, counted once per prediction.
#[must_use]
pub fn true_positives(preds: &[String], gts: &[String]) -> usize {
    preds.iter().filter(|p| gts.contains(p)).count()
}

/// 1.0 when nothing is predicted, whatever the ground truth.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn precision(preds: &[String], gts: &[String]) -> f64 {
    if preds.is_empty() {
        return 1.0;
    }
    (true_positives(preds, gts) as f64 / preds.len() as f64).min(1.0)
}

/// 1.0 when the ground truth is empty (`[]` or `[""]`), whatever is predicted.
///
/// Capped at 1.0: repeated correct predictions count once per prediction.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recall(preds: &[String], gts: &[String]) -> f64 {
    if gts.is_empty() || gts == [""] {
        return 1.0;
    }
    (true_positives(preds, gts) as f64 / gts.len() as f64).min(1.0)
}

#[must_use]
pub fn f1_score(p: f64, r: f64) -> f64 {
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

/// Precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Scores {
    pub p: f64,
    pub r: f64,
    pub f1: f64,
}

impl Scores {
    #[allow(clippy::cast_precision_loss)]
    fn mean<'a>(items: impl IntoIterator<Item = &'a Scores>) -> Self {
        let mut sum = Self::default();
        let mut n = 0usize;
        for s in items {
            sum.p += s.p;
            sum.r += s.r;
            sum.f1 += s.f1;
            n += 1;
        }
        if n == 0 {
            return sum;
        }
        let n = n as f64;
        Self {
            p: sum.p / n,
            r: sum.r / n,
            f1: sum.f1 / n,
        }
    }
}

/// Scores of one (subject, relation) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairScore {
    pub subject: String,
    pub relation: String,
    #[serde(flatten)]
    pub scores: Scores,
}

/// Score every ground-truth pair, sorted by (relation, subject).
///
/// A pair without a prediction is scored as if `[""]` had been predicted.
#[must_use]
pub fn score_pairs(predictions: &[Record], ground_truth: &[Record]) -> Vec<PairScore> {
    let by_key: HashMap<(&str, &str), &[String]> = predictions
        .iter()
        .map(|r| ((r.subject.as_str(), r.relation.as_str()), r.ids()))
        .collect();
    let nothing = [String::new()];

    // Later rows win, as with a keyed map.
    let mut truth: BTreeMap<(&str, &str), &[String]> = BTreeMap::new();
    for row in ground_truth {
        truth.insert((row.relation.as_str(), row.subject.as_str()), row.ids());
    }

    truth
        .into_iter()
        .map(|((relation, subject), gts)| {
            let preds = by_key
                .get(&(subject, relation))
                .copied()
                .unwrap_or(&nothing);
            let p = precision(preds, gts);
            let r = recall(preds, gts);
            PairScore {
                subject: subject.to_string(),
                relation: relation.to_string(),
                scores: Scores {
                    p,
                    r,
                    f1: f1_score(p, r),
                },
            }
        })
        .collect()
}

/// Per-relation averages plus the cross-relation average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTable {
    pub relations: BTreeMap<String, Scores>,
    pub average: Scores,
}

impl ScoreTable {
    #[must_use]
    pub fn from_pairs(pairs: &[PairScore]) -> Self {
        let mut grouped: BTreeMap<String, Vec<Scores>> = BTreeMap::new();
        for pair in pairs {
            grouped
                .entry(pair.relation.clone())
                .or_default()
                .push(pair.scores);
        }
        let relations: BTreeMap<String, Scores> = grouped
            .into_iter()
            .map(|(relation, scores)| (relation, Scores::mean(&scores)))
            .collect();
        let average = Scores::mean(relations.values());
        Self { relations, average }
    }

    /// Fixed-width table, three decimals.
    #[must_use]
    pub fn render(&self) -> String {
        let width = self
            .relations
            .keys()
            .map(String::len)
            .chain(std::iter::once(AVERAGE_ROW.len()))
            .max()
            .unwrap_or_default();

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:>6} {:>6} {:>6}", "", "p", "r", "f1");
        let rows = self
            .relations
            .iter()
            .map(|(name, s)| (name.as_str(), s))
            .chain(std::iter::once((AVERAGE_ROW, &self.average)));
        for (name, s) in rows {
            let _ = writeln!(
                out,
                "{name:<width$}  {:>6.3} {:>6.3} {:>6.3}",
                s.p, s.r, s.f1
            );
        }
        out
    }
}

/// A ground-truth row whose predicted ids differ from the expected ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRecord {
    pub subject_id: String,
    pub subject: String,
    pub relation: String,
    pub predictions: Vec<String>,
    pub ground_truths: Vec<String>,
    pub prediction_ids: Vec<String>,
    pub ground_truth_ids: Vec<String>,
    /// Expected labels that were not predicted.
    pub missing: BTreeSet<String>,
    pub missing_ids: BTreeSet<String>,
    /// Predicted labels that are not expected.
    pub errors: BTreeSet<String>,
    pub error_ids: BTreeSet<String>,
    /// Fewer ids than labels agree: a right answer was linked to the wrong entity.
    pub ambiguous: bool,
}

fn difference(a: &[String], b: &[String]) -> BTreeSet<String> {
    let b: BTreeSet<&String> = b.iter().collect();
    a.iter().filter(|x| !b.contains(x)).cloned().collect()
}

fn shared(a: &[String], b: &[String]) -> usize {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    a.intersection(&b).count()
}

fn same_multiset(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Rows present in both batches whose id multisets differ, in ground-truth
/// order.
#[must_use]
pub fn unmatched_records(predictions: &[Record], ground_truth: &[Record]) -> Vec<UnmatchedRecord> {
    let by_key: HashMap<(&str, &str), &Record> = predictions
        .iter()
        .map(|r| ((r.subject.as_str(), r.relation.as_str()), r))
        .collect();

    ground_truth
        .iter()
        .filter_map(|gt| {
            let pred = by_key.get(&(gt.subject.as_str(), gt.relation.as_str()))?;
            if same_multiset(pred.ids(), gt.ids()) {
                return None;
            }
            Some(UnmatchedRecord {
                subject_id: gt.subject_id.clone(),
                subject: gt.subject.clone(),
                relation: gt.relation.clone(),
                predictions: pred.objects.clone(),
                ground_truths: gt.objects.clone(),
                prediction_ids: pred.ids().to_vec(),
                ground_truth_ids: gt.ids().to_vec(),
                missing: difference(&gt.objects, &pred.objects),
                missing_ids: difference(gt.ids(), pred.ids()),
                errors: difference(&pred.objects, &gt.objects),
                error_ids: difference(pred.ids(), gt.ids()),
                ambiguous: shared(pred.ids(), gt.ids()) < shared(&pred.objects, &gt.objects),
            })
        })
        .collect()
}

/// One block per unmatched record.
#[must_use]
pub fn render_unmatched(records: &[UnmatchedRecord]) -> String {
    fn list<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
        let quoted: Vec<String> = items.into_iter().map(|s| format!("{s:?}")).collect();
        format!("[{}]", quoted.join(", "))
    }

    let mut out = String::new();
    let _ = writeln!(out, "Unmatched records: {}", records.len());
    for r in records {
        let _ = writeln!(out, "----");
        let _ = writeln!(out, "Subject entity:      {} ({})", r.subject, r.subject_id);
        let _ = writeln!(out, "Relation:            {}", r.relation);
        let _ = writeln!(out, "Predictions:         {}", list(&r.predictions));
        let _ = writeln!(out, "Ground truths:       {}", list(&r.ground_truths));
        let _ = writeln!(out, "Predictions ID:      {}", list(&r.prediction_ids));
        let _ = writeln!(out, "Ground truths ID:    {}", list(&r.ground_truth_ids));
        let _ = writeln!(out, "Missing entities:    {}", list(&r.missing));
        let _ = writeln!(out, "Missing entities ID: {}", list(&r.missing_ids));
        let _ = writeln!(out, "Error entities:      {}", list(&r.errors));
        let _ = writeln!(out, "Error entities ID:   {}", list(&r.error_ids));
        let _ = writeln!(out, "Ambiguities:         {}", r.ambiguous);
    }
    out
}

/// Switches of the `evaluate` task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Include the unmatched-record report.
    pub compare: bool,
    /// Save the report under the evaluations directory.
    pub write: bool,
}

/// Result of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub pairs: Vec<PairScore>,
    pub table: ScoreTable,
    /// Present when comparison was requested.
    pub unmatched: Option<Vec<UnmatchedRecord>>,
    /// Rendered report.
    pub report: String,
    /// Where the report was saved, if it was.
    pub saved_to: Option<PathBuf>,
}

/// Evaluates prediction runs of a workspace.
#[derive(Debug, Clone)]
pub struct Evaluator {
    workspace: Workspace,
}

impl Evaluator {
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Score the predictions of `spec` against its dataset's ground truth.
    ///
    /// For the `all` relation the run directory is concatenated first,
    /// unless an `all.jsonl` batch already exists in it.
    pub fn evaluate(&self, spec: &RunSpec, options: EvaluateOptions) -> Result<Evaluation> {
        let predictions = self.predictions(spec)?;
        let mut ground_truth = store::read_records(self.workspace.ground_truth_path(&spec.dataset))?;
        if !spec.is_all_relations() {
            ground_truth.retain(|r| r.relation == spec.relation);
        }

        let pairs = score_pairs(&predictions, &ground_truth);
        let table = ScoreTable::from_pairs(&pairs);
        let mut report = table.render();

        let unmatched = options
            .compare
            .then(|| unmatched_records(&predictions, &ground_truth));
        if let Some(records) = &unmatched {
            report.push('\n');
            report.push_str(&render_unmatched(records));
        }

        tracing::info!(
            name: "evaluation.completed",
            run = %spec.run_name(),
            relation = %spec.relation,
            pairs = pairs.len(),
            f1 = table.average.f1,
            "Evaluation completed"
        );

        let saved_to = if options.write {
            let path = self.workspace.evaluation_path(spec);
            write_report(&path, &report)?;
            Some(path)
        } else {
            None
        };

        Ok(Evaluation {
            pairs,
            table,
            unmatched,
            report,
            saved_to,
        })
    }

    fn predictions(&self, spec: &RunSpec) -> Result<Vec<Record>> {
        let path = self.workspace.predictions_path(spec);
        if spec.is_all_relations() && !path.exists() {
            let records = store::concat_records(
                self.workspace.run_dir(spec),
                self.workspace.concatenated_path(spec),
            )?;
            return Ok(records);
        }
        Ok(store::read_records(&path)?)
    }
}

fn write_report(path: &std::path::Path, report: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, report).map_err(write_err)?;
    tracing::info!(
        name: "evaluation.saved",
        path = %path.display(),
        "Evaluation results saved"
    );
    Ok(())
}
