//! Relation → strategy dispatch.

use std::collections::BTreeMap;

use super::{KeywordSet, Strategy};
use crate::relation::Relation;

/// Which [`Strategy`] disambiguates each relation.
///
/// Relations without an entry are not disambiguated. The table is built
/// once and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    entries: BTreeMap<Relation, Strategy>,
}

impl DispatchTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table tuned for the LM-KBC dataset.
    pub fn standard() -> Result<Self, regex::Error> {
        let lm = |question: &str| Strategy::LmArbitrated {
            question_template: question.to_string(),
        };

        Ok(Self::new()
            .with(
                Relation::BandHasMember,
                Strategy::KeywordBased {
                    keywords: KeywordSet::new([
                        "musician",
                        "singer",
                        "guitarist",
                        "drummer",
                        "pianist",
                        "vocalist",
                        "bassist",
                    ])?,
                },
            )
            .with(
                Relation::CityLocatedAtRiver,
                lm("Which river is {subject_entity} located at?"),
            )
            .with(Relation::CompoundHasParts, Strategy::CaseBased)
            .with(
                Relation::CountryHasOfficialLanguage,
                Strategy::KeywordBased {
                    keywords: KeywordSet::new(["language"])?,
                },
            )
            .with(
                Relation::CountryHasStates,
                lm("What are the first-level administrative territorial entities of {subject_entity}?"),
            )
            .with(Relation::FootballerPlaysPosition, Strategy::CaseBased)
            .with(
                Relation::PersonHasAutobiography,
                Strategy::KeywordBased {
                    keywords: KeywordSet::new(["book", "memoir", "novel"])?,
                },
            )
            .with(Relation::PersonHasEmployer, Strategy::CaseBased)
            .with(Relation::PersonHasProfession, Strategy::CaseBased)
            .with(
                Relation::PersonHasSpouse,
                lm("What is the name of the spouse of {subject_entity}?"),
            )
            .with(Relation::PersonPlaysInstrument, Strategy::CaseBased)
            .with(Relation::RiverBasinsCountry, Strategy::CaseBased)
            .with(
                Relation::StateBordersState,
                lm("Which states border the state of {subject_entity}?"),
            ))
    }

    /// Add or replace the entry for `relation`.
    #[must_use]
    pub fn with(mut self, relation: Relation, strategy: Strategy) -> Self {
        self.entries.insert(relation, strategy);
        self
    }

    #[must_use]
    pub fn get(&self, relation: Relation) -> Option<&Strategy> {
        self.entries.get(&relation)
    }

    /// Relations with an entry, in declaration order of [`Relation`].
    pub fn relations(&self) -> impl Iterator<Item = Relation> + '_ {
        self.entries.keys().copied()
    }
}
