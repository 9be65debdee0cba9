//! Probe prompts: templates, few-shot example sets and chat transcripts.
//!
//! A probe asks for the objects of one (subject, relation) pair, phrased
//! either as a natural-language question from a per-relation template or as
//! a bare `"{subject}, {relation}:"` triple. Few-shot examples are earlier
//! (prompt, answer-list) pairs replayed as user/assistant turns.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, StoreError};
use crate::llm::ChatMessage;
use crate::record::Record;
use crate::relation::Relation;

/// Placeholder replaced by the subject in question templates.
pub const SUBJECT_PLACEHOLDER: &str = "{subject_entity}";

/// Appended to every probe query.
pub const ANSWER_FORMAT_SUFFIX: &str =
    " Format the response as a Python list such as '[\"answer_a\", \"answer_b\"]'.";

/// System instruction when few-shot examples precede the query.
pub const FEW_SHOT_INSTRUCTION: &str = "Provide context and examples to the model. The output \
should follow the exact format as the example output, which is a list of strings, such as \
'['answer_a', 'answer_b]'. Return a list with an empty string [\"\"] if no information is \
available.";

/// System instruction when the query stands alone.
pub const ZERO_SHOT_INSTRUCTION: &str = "The output should follow the exact format, which is a \
list of strings, such as \"[\"answer_a\", \"answer_b\"]\". Return a list with an empty string \
[\"\"] if no information is available.";

/// How a probe query is phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    /// Natural-language question from a per-relation template.
    Question,
    /// `"{subject}, {relation}:"`.
    Triple,
}

impl PromptType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Triple => "triple",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substitute `subject` into a question template.
#[must_use]
pub fn render_question(template: &str, subject: &str) -> String {
    template.replace(SUBJECT_PLACEHOLDER, subject)
}

/// Render a probe prompt. For [`PromptType::Triple`], `template` is the
/// relation name.
#[must_use]
pub fn render_prompt(prompt_type: PromptType, subject: &str, template: &str) -> String {
    match prompt_type {
        PromptType::Question => render_question(template, subject),
        PromptType::Triple => format!("{subject}, {template}:"),
    }
}

/// Question templates keyed by relation name.
pub type QuestionTemplates = BTreeMap<String, String>;

/// Load a JSON object mapping relation names to question templates.
pub fn load_question_templates(path: impl AsRef<Path>) -> Result<QuestionTemplates> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| Error::Templates {
        path: path.to_path_buf(),
        source,
    })
}

/// The template to probe `relation` with.
pub fn template_for(
    prompt_type: PromptType,
    relation: Relation,
    templates: &QuestionTemplates,
) -> Result<String> {
    match prompt_type {
        PromptType::Question => templates
            .get(relation.as_str())
            .cloned()
            .ok_or_else(|| Error::MissingTemplate(relation.to_string())),
        PromptType::Triple => Ok(relation.to_string()),
    }
}

/// Render an answer list with double-quoted items, e.g. `["a", "b"]`.
///
/// An empty list renders as `[""]`.
#[must_use]
pub fn format_answer_list(objects: &[String]) -> String {
    format!("[\"{}\"]", objects.join("\", \""))
}

/// Ordered (prompt, answer) pairs. Inserting an existing prompt replaces its
/// answer in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FewShotExamples {
    pairs: Vec<(String, String)>,
}

impl FewShotExamples {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prompt: String, answer: String) {
        match self.pairs.iter_mut().find(|(p, _)| *p == prompt) {
            Some(pair) => pair.1 = answer,
            None => self.pairs.push((prompt, answer)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(p, a)| (p.as_str(), a.as_str()))
    }

    fn has_answer(&self, answer: &str) -> bool {
        self.pairs.iter().any(|(_, a)| a == answer)
    }
}

/// Number of records turned into examples.
const EXAMPLES_PER_RELATION: usize = 5;
/// Leading records skipped when examples are not pre-selected.
const SKIPPED_RECORDS: usize = 2;

/// Build few-shot examples for `relation` from `records`.
///
/// `similar` marks a pre-selected example file: it is used from the start,
/// whereas a plain training file skips its first two records. Relations
/// whose ground truth is often empty get an extra `[""]` example when none
/// of the chosen ones is empty and the source has one.
#[must_use]
pub fn build_examples(
    prompt_type: PromptType,
    records: &[Record],
    relation: Relation,
    template: &str,
    similar: bool,
) -> FewShotExamples {
    let pool: Vec<&Record> = records
        .iter()
        .filter(|r| r.relation == relation.as_str())
        .skip(if similar { 0 } else { SKIPPED_RECORDS })
        .collect();

    let mut examples = FewShotExamples::new();
    for record in pool.iter().take(EXAMPLES_PER_RELATION) {
        examples.insert(
            render_prompt(prompt_type, &record.subject, template),
            format_answer_list(&record.objects),
        );
    }

    let empty = format_answer_list(&[String::new()]);
    if relation.expects_empty_answers() && !examples.has_answer(&empty) {
        if let Some(record) = pool.iter().find(|r| r.objects == [""]) {
            examples.insert(render_prompt(prompt_type, &record.subject, template), empty);
        }
    }
    examples
}

/// Chat transcript for one probe: system instruction, replayed examples,
/// then the query.
#[must_use]
pub fn probe_messages(query: &str, examples: &FewShotExamples) -> Vec<ChatMessage> {
    let instruction = if examples.is_empty() {
        ZERO_SHOT_INSTRUCTION
    } else {
        FEW_SHOT_INSTRUCTION
    };

    let mut messages = Vec::with_capacity(examples.len() * 2 + 2);
    messages.push(ChatMessage::system(instruction));
    for (prompt, answer) in examples.iter() {
        messages.push(ChatMessage::user(prompt));
        messages.push(ChatMessage::assistant(answer));
    }
    messages.push(ChatMessage::user(query));
    messages
}

/// Second-turn message asking the model to revise its answer given `context`.
#[must_use]
pub fn context_follow_up(relation: Relation, context: &str, query: &str) -> String {
    if relation == Relation::SeriesHasNumberOfEpisodes {
        format!(
            "Given the context: \"{context}\", compared and combined with the previous \
             predictions. If IMDb knows, use the information on IMDb. If Wikipedia knows, use \
             the information on Wikipedia. Otherwise, use your own knowledge. If there are \
             multiple answers, only return one of them. {query}"
        )
    } else {
        format!(
            "Given the context: \"{context}\", compared and combined with the previous \
             predictions, {query}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn record(subject: &str, relation: Relation, objects: &[&str]) -> Record {
        Record::new(
            "",
            subject,
            relation.as_str(),
            objects.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn test_render_prompt() {
        assert_eq!(
            render_prompt(
                PromptType::Question,
                "Vanillin",
                "What are the chemical components of {subject_entity}?"
            ),
            "What are the chemical components of Vanillin?"
        );
        assert_eq!(
            render_prompt(PromptType::Triple, "Vanillin", "CompoundHasParts"),
            "Vanillin, CompoundHasParts:"
        );
    }

    #[test]
    fn test_format_answer_list() {
        assert_eq!(
            format_answer_list(&["carbon".into(), "oxygen".into()]),
            r#"["carbon", "oxygen"]"#
        );
        assert_eq!(format_answer_list(&[]), r#"[""]"#);
    }

    #[test]
    fn test_examples_skip_first_two_unless_similar() {
        let relation = Relation::PersonHasSpouse;
        let records: Vec<_> = (0..9)
            .map(|i| record(&format!("S{i}"), relation, &["x"]))
            .collect();

        let plain = build_examples(PromptType::Triple, &records, relation, "PersonHasSpouse", false);
        let prompts: Vec<_> = plain.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            prompts,
            vec![
                "S2, PersonHasSpouse:",
                "S3, PersonHasSpouse:",
                "S4, PersonHasSpouse:",
                "S5, PersonHasSpouse:",
                "S6, PersonHasSpouse:"
            ]
        );

        let similar = build_examples(PromptType::Triple, &records, relation, "PersonHasSpouse", true);
        assert_eq!(similar.iter().next().unwrap().0, "S0, PersonHasSpouse:");
    }

    #[test]
    fn test_examples_ignore_other_relations() {
        let records = vec![
            record("A", Relation::BandHasMember, &["x"]),
            record("B", Relation::PersonHasSpouse, &["y"]),
        ];
        let examples = build_examples(
            PromptType::Triple,
            &records,
            Relation::PersonHasSpouse,
            "PersonHasSpouse",
            true,
        );
        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn test_empty_example_added_for_sparse_relations() {
        let relation = Relation::PersonCauseOfDeath;
        let mut records: Vec<_> = (0..6)
            .map(|i| record(&format!("P{i}"), relation, &["stroke"]))
            .collect();
        records.push(record("Alive", relation, &[""]));

        let examples = build_examples(PromptType::Triple, &records, relation, "PersonCauseOfDeath", true);
        assert_eq!(examples.len(), 6);
        let last = examples.iter().last().unwrap();
        assert_eq!(last, ("Alive, PersonCauseOfDeath:", r#"[""]"#));
    }

    #[test]
    fn test_duplicate_prompts_overwrite_in_place() {
        let mut examples = FewShotExamples::new();
        examples.insert("q1".into(), "a".into());
        examples.insert("q2".into(), "b".into());
        examples.insert("q1".into(), "c".into());
        let pairs: Vec<_> = examples.iter().collect();
        assert_eq!(pairs, vec![("q1", "c"), ("q2", "b")]);
    }

    #[test]
    fn test_probe_messages_layout() {
        let mut examples = FewShotExamples::new();
        examples.insert("q1".into(), r#"["a"]"#.into());

        let messages = probe_messages("q2", &examples);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(messages[0].content, FEW_SHOT_INSTRUCTION);

        let zero = probe_messages("q2", &FewShotExamples::new());
        assert_eq!(zero.len(), 2);
        assert_eq!(zero[0].content, ZERO_SHOT_INSTRUCTION);
    }

    #[test]
    fn test_template_for() {
        let mut templates = QuestionTemplates::new();
        templates.insert("PersonHasSpouse".into(), "Who is married to {subject_entity}?".into());

        assert_eq!(
            template_for(PromptType::Question, Relation::PersonHasSpouse, &templates).unwrap(),
            "Who is married to {subject_entity}?"
        );
        assert!(matches!(
            template_for(PromptType::Question, Relation::BandHasMember, &templates),
            Err(Error::MissingTemplate(_))
        ));
        assert_eq!(
            template_for(PromptType::Triple, Relation::BandHasMember, &templates).unwrap(),
            "BandHasMember"
        );
    }
}
