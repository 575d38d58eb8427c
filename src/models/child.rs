use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a child record in the profile store
pub type ChildId = Uuid;

/// Enrollment program of a child
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Program {
    Infant,
    Toddler,
    Preschool,
    #[serde(alias = "pre-k", alias = "pre_k")]
    Prekindergarten,
}

/// Broad grouping of interest tags, used by the interest catalog endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InterestCategory {
    Creative,
    Physical,
    Cognitive,
    Social,
    Building,
}

/// Fixed vocabulary of activity interests a child can have
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    ArtsCrafts,
    Music,
    Dancing,
    Reading,
    OutdoorPlay,
    BuildingBlocks,
    Puzzles,
    Sports,
    Cooking,
    Science,
    Storytelling,
    Drawing,
    Singing,
    Running,
    Swimming,
    BoardGames,
    PretendPlay,
    Gardening,
    Animals,
    Technology,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown interest tag: {0}")]
pub struct UnknownInterest(pub String);

impl Interest {
    /// Every tag in catalog order
    pub const ALL: [Interest; 20] = [
        Interest::ArtsCrafts,
        Interest::Music,
        Interest::Dancing,
        Interest::Reading,
        Interest::OutdoorPlay,
        Interest::BuildingBlocks,
        Interest::Puzzles,
        Interest::Sports,
        Interest::Cooking,
        Interest::Science,
        Interest::Storytelling,
        Interest::Drawing,
        Interest::Singing,
        Interest::Running,
        Interest::Swimming,
        Interest::BoardGames,
        Interest::PretendPlay,
        Interest::Gardening,
        Interest::Animals,
        Interest::Technology,
    ];

    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Interest::ArtsCrafts => "arts_crafts",
            Interest::Music => "music",
            Interest::Dancing => "dancing",
            Interest::Reading => "reading",
            Interest::OutdoorPlay => "outdoor_play",
            Interest::BuildingBlocks => "building_blocks",
            Interest::Puzzles => "puzzles",
            Interest::Sports => "sports",
            Interest::Cooking => "cooking",
            Interest::Science => "science",
            Interest::Storytelling => "storytelling",
            Interest::Drawing => "drawing",
            Interest::Singing => "singing",
            Interest::Running => "running",
            Interest::Swimming => "swimming",
            Interest::BoardGames => "board_games",
            Interest::PretendPlay => "pretend_play",
            Interest::Gardening => "gardening",
            Interest::Animals => "animals",
            Interest::Technology => "technology",
        }
    }

    pub fn category(&self) -> InterestCategory {
        match self {
            Interest::ArtsCrafts
            | Interest::Music
            | Interest::Dancing
            | Interest::Drawing
            | Interest::Singing
            | Interest::Storytelling => InterestCategory::Creative,
            Interest::OutdoorPlay | Interest::Sports | Interest::Running | Interest::Swimming => {
                InterestCategory::Physical
            }
            Interest::Reading
            | Interest::Puzzles
            | Interest::Science
            | Interest::BoardGames
            | Interest::Technology => InterestCategory::Cognitive,
            Interest::PretendPlay | Interest::Cooking | Interest::Gardening | Interest::Animals => {
                InterestCategory::Social
            }
            Interest::BuildingBlocks => InterestCategory::Building,
        }
    }
}

impl Display for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interest {
    type Err = UnknownInterest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Interest::ALL
            .iter()
            .copied()
            .find(|interest| interest.as_str() == needle)
            .ok_or_else(|| UnknownInterest(s.to_string()))
    }
}

fn default_active() -> bool {
    true
}

/// A child record as exposed by the profile store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub id: ChildId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    /// Informational only, never part of the similarity score
    #[serde(default)]
    pub gender: Option<String>,
    pub program: Program,
    #[serde(default)]
    pub interests: BTreeSet<Interest>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl ChildProfile {
    /// Creates an active profile with no interests
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: NaiveDate,
        program: Program,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            gender: None,
            program,
            interests: BTreeSet::new(),
            active: true,
        }
    }

    pub fn with_interests(mut self, interests: impl IntoIterator<Item = Interest>) -> Self {
        self.interests = interests.into_iter().collect();
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whole months lived as of the given day.
    ///
    /// A month only counts once its day-of-month has been reached. Birth dates
    /// in the future yield zero.
    pub fn age_in_months(&self, as_of: NaiveDate) -> u32 {
        let born = self.date_of_birth;
        let mut months = (as_of.year() - born.year()) * 12 + as_of.month() as i32
            - born.month() as i32;
        if as_of.day() < born.day() {
            months -= 1;
        }
        months.max(0) as u32
    }
}

/// Whole years for display, derived from a month count
pub fn months_to_years(months: u32) -> u32 {
    months / 12
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_in_months_counts_whole_months() {
        let child = ChildProfile::new("Emma", "Johnson", date(2020, 3, 15), Program::Preschool);
        assert_eq!(child.age_in_months(date(2023, 3, 15)), 36);
        assert_eq!(child.age_in_months(date(2023, 3, 14)), 35);
        assert_eq!(child.age_in_months(date(2023, 4, 1)), 36);
    }

    #[test]
    fn test_age_in_months_future_birth_is_zero() {
        let child = ChildProfile::new("Baby", "Doe", date(2024, 6, 1), Program::Infant);
        assert_eq!(child.age_in_months(date(2024, 1, 1)), 0);
    }

    #[test]
    fn test_interest_parsing() {
        assert_eq!("music".parse::<Interest>(), Ok(Interest::Music));
        assert_eq!(" Arts_Crafts ".parse::<Interest>(), Ok(Interest::ArtsCrafts));
        assert_eq!(
            "underwater_basket_weaving".parse::<Interest>(),
            Err(UnknownInterest("underwater_basket_weaving".to_string()))
        );
    }

    #[test]
    fn test_interest_wire_names_match_serde() {
        for interest in Interest::ALL {
            let json = serde_json::to_string(&interest).unwrap();
            assert_eq!(json, format!("\"{}\"", interest.as_str()));
        }
    }

    #[test]
    fn test_program_accepts_pre_k_alias() {
        let program: Program = serde_json::from_str("\"pre-k\"").unwrap();
        assert_eq!(program, Program::Prekindergarten);
        assert_eq!(serde_json::to_string(&program).unwrap(), "\"prekindergarten\"");
    }

    #[test]
    fn test_profile_deserialization_defaults() {
        let profile: ChildProfile = serde_json::from_value(serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "firstName": "Liam",
            "lastName": "Smith",
            "dateOfBirth": "2020-05-22",
            "program": "preschool"
        }))
        .unwrap();

        assert!(profile.active);
        assert!(profile.interests.is_empty());
        assert_eq!(profile.display_name(), "Liam Smith");
    }
}
