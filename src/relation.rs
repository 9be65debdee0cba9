//! The fixed set of LM-KBC relations.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A relation of the LM-KBC probing dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    BandHasMember,
    CityLocatedAtRiver,
    CompanyHasParentOrganisation,
    CompoundHasParts,
    CountryBordersCountry,
    CountryHasOfficialLanguage,
    CountryHasStates,
    FootballerPlaysPosition,
    PersonCauseOfDeath,
    PersonHasAutobiography,
    PersonHasEmployer,
    PersonHasNoblePrize,
    PersonHasNumberOfChildren,
    PersonHasPlaceOfDeath,
    PersonHasProfession,
    PersonHasSpouse,
    PersonPlaysInstrument,
    PersonSpeaksLanguage,
    RiverBasinsCountry,
    SeriesHasNumberOfEpisodes,
    StateBordersState,
}

impl Relation {
    /// Every relation, in dataset order.
    pub const ALL: [Relation; 21] = [
        Self::BandHasMember,
        Self::CityLocatedAtRiver,
        Self::CompanyHasParentOrganisation,
        Self::CompoundHasParts,
        Self::CountryBordersCountry,
        Self::CountryHasOfficialLanguage,
        Self::CountryHasStates,
        Self::FootballerPlaysPosition,
        Self::PersonCauseOfDeath,
        Self::PersonHasAutobiography,
        Self::PersonHasEmployer,
        Self::PersonHasNoblePrize,
        Self::PersonHasNumberOfChildren,
        Self::PersonHasPlaceOfDeath,
        Self::PersonHasProfession,
        Self::PersonHasSpouse,
        Self::PersonPlaysInstrument,
        Self::PersonSpeaksLanguage,
        Self::RiverBasinsCountry,
        Self::SeriesHasNumberOfEpisodes,
        Self::StateBordersState,
    ];

    /// Name as it appears in the `Relation` field of a record.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BandHasMember => "BandHasMember",
            Self::CityLocatedAtRiver => "CityLocatedAtRiver",
            Self::CompanyHasParentOrganisation => "CompanyHasParentOrganisation",
            Self::CompoundHasParts => "CompoundHasParts",
            Self::CountryBordersCountry => "CountryBordersCountry",
            Self::CountryHasOfficialLanguage => "CountryHasOfficialLanguage",
            Self::CountryHasStates => "CountryHasStates",
            Self::FootballerPlaysPosition => "FootballerPlaysPosition",
            Self::PersonCauseOfDeath => "PersonCauseOfDeath",
            Self::PersonHasAutobiography => "PersonHasAutobiography",
            Self::PersonHasEmployer => "PersonHasEmployer",
            Self::PersonHasNoblePrize => "PersonHasNoblePrize",
            Self::PersonHasNumberOfChildren => "PersonHasNumberOfChildren",
            Self::PersonHasPlaceOfDeath => "PersonHasPlaceOfDeath",
            Self::PersonHasProfession => "PersonHasProfession",
            Self::PersonHasSpouse => "PersonHasSpouse",
            Self::PersonPlaysInstrument => "PersonPlaysInstrument",
            Self::PersonSpeaksLanguage => "PersonSpeaksLanguage",
            Self::RiverBasinsCountry => "RiverBasinsCountry",
            Self::SeriesHasNumberOfEpisodes => "SeriesHasNumberOfEpisodes",
            Self::StateBordersState => "StateBordersState",
        }
    }

    /// Numeric relations carry literal values, not entities; they are never
    /// disambiguated.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::PersonHasNumberOfChildren | Self::SeriesHasNumberOfEpisodes
        )
    }

    /// Relations whose ground truth is often empty, so few-shot prompts need
    /// an explicit `[""]` example.
    #[must_use]
    pub fn expects_empty_answers(self) -> bool {
        matches!(
            self,
            Self::CompanyHasParentOrganisation
                | Self::PersonCauseOfDeath
                | Self::PersonHasNoblePrize
                | Self::PersonHasPlaceOfDeath
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::UnknownRelation(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for relation in Relation::ALL {
            assert_eq!(relation.as_str().parse::<Relation>().unwrap(), relation);
        }
    }

    #[test]
    fn test_unknown_relation() {
        assert!(matches!(
            "PersonHasPet".parse::<Relation>(),
            Err(Error::UnknownRelation(name)) if name == "PersonHasPet"
        ));
    }

    #[test]
    fn test_numeric_relations() {
        assert!(Relation::SeriesHasNumberOfEpisodes.is_numeric());
        assert!(!Relation::CityLocatedAtRiver.is_numeric());
    }
}
