//! The (subject, relation, objects) record exchanged between pipeline stages.

use serde::{Deserialize, Deserializer, Serialize};

/// One (subject, relation) fact under evaluation.
///
/// `objects` keeps the model's output order and may contain duplicates.
/// Once disambiguated, `object_ids` is index-aligned with `objects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Knowledge-base id of the subject (absent in example files).
    #[serde(rename = "SubjectEntityID", default)]
    pub subject_id: String,
    /// Subject label.
    #[serde(rename = "SubjectEntity")]
    pub subject: String,
    /// Relation name.
    #[serde(rename = "Relation")]
    pub relation: String,
    /// Object labels.
    #[serde(
        rename = "ObjectEntities",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub objects: Vec<String>,
    /// Object identifiers, parallel to `objects`.
    #[serde(
        rename = "ObjectEntitiesID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_ids: Option<Vec<String>>,
    /// Fields this harness does not interpret, kept on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Create a record with no identifiers.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        subject: impl Into<String>,
        relation: impl Into<String>,
        objects: Vec<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            subject: subject.into(),
            relation: relation.into(),
            objects,
            object_ids: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Identifiers, or an empty slice before disambiguation.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        self.object_ids.as_deref().unwrap_or_default()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
