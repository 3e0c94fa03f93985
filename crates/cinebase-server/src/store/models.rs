//! Local store records

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use cinebase_common::text::normalize_name;

/// How completely a movie was imported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    /// Passed the quality criteria; credits and genres stored
    Full,
    /// Minimal record; `failed_criteria` says why
    Soft,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Full => "full",
            ImportStatus::Soft => "soft",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ImportStatus::Full),
            "soft" => Ok(ImportStatus::Soft),
            _ => Err(format!("Invalid import status: {}", s)),
        }
    }
}

/// Membership of a movie in a curated list, stored under the list key in
/// `canonical_sources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub import_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub tmdb_id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<f64>,
    pub vote_count: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Vec<String>,
    pub import_status: ImportStatus,
    pub failed_criteria: Vec<String>,
    /// list key -> [`CanonicalEntry`]
    pub canonical_sources: Value,
    pub omdb_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movie {
    pub fn year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    pub fn is_canonical(&self, list_key: &str) -> bool {
        self.canonical_sources.get(list_key).is_some()
    }
}

/// Movie fields as fetched from the metadata source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewMovie {
    pub tmdb_id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<f64>,
    pub vote_count: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub name: String,
    pub popularity: Option<f64>,
    /// Created from a nomination without a resolvable identity
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPerson {
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub name: String,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditKind {
    Cast,
    Crew,
}

impl CreditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditKind::Cast => "cast",
            CreditKind::Crew => "crew",
        }
    }
}

impl FromStr for CreditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cast" => Ok(CreditKind::Cast),
            "crew" => Ok(CreditKind::Crew),
            _ => Err(format!("Invalid credit kind: {}", s)),
        }
    }
}

/// A credit to store with a full import
#[derive(Debug, Clone, PartialEq)]
pub struct NewCredit {
    pub person: NewPerson,
    pub kind: CreditKind,
    /// Character for cast, job for crew
    pub role: String,
    pub department: Option<String>,
    pub order: Option<i32>,
}

/// A stored credit joined with its person
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieCredit {
    pub person: Person,
    pub kind: CreditKind,
    pub role: String,
    pub department: Option<String>,
    pub order: Option<i32>,
}

impl MovieCredit {
    pub fn is_director(&self) -> bool {
        self.kind == CreditKind::Crew && self.role.eq_ignore_ascii_case("director")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ceremony {
    pub id: i64,
    pub festival: String,
    pub year: i32,
    pub source_format: String,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNomination {
    pub ceremony_id: i64,
    pub category: String,
    pub won: bool,
    pub movie_id: Option<i64>,
    pub pending_tmdb_id: Option<i64>,
    pub person_id: Option<i64>,
    pub raw_title: String,
    pub normalized_title: String,
    pub raw_person: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nomination {
    pub id: i64,
    pub ceremony_id: i64,
    pub category: String,
    pub won: bool,
    pub movie_id: Option<i64>,
    pub pending_tmdb_id: Option<i64>,
    pub person_id: Option<i64>,
    pub raw_title: String,
    pub normalized_title: String,
    pub raw_person: Option<String>,
}

/// A nomination's links as the duplicate check sees them, with the linked
/// movie's TMDb id and the person's placeholder flag resolved by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NominationLinks {
    pub movie_id: Option<i64>,
    pub pending_tmdb_id: Option<i64>,
    /// TMDb id of the linked movie, else the pending one
    pub tmdb_id: Option<i64>,
    pub person_id: Option<i64>,
    pub placeholder_person: bool,
    pub normalized_title: String,
    pub raw_person: Option<String>,
}

/// Link columns to write over an existing nomination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkUpgrade {
    pub movie_id: Option<i64>,
    pub pending_tmdb_id: Option<i64>,
    pub person_id: Option<i64>,
}

impl NominationLinks {
    /// Whether both rows record the same nomination within one category.
    ///
    /// Films compare by TMDb id when both sides have one, else by normalized
    /// title. People compare by id, or by name when either side is a
    /// placeholder or unresolved.
    pub fn same_nomination(&self, other: &NominationLinks) -> bool {
        let same_film = match (self.tmdb_id, other.tmdb_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.normalized_title == other.normalized_title,
        };
        if !same_film {
            return false;
        }
        if self.person_id == other.person_id {
            return true;
        }
        let weak = |links: &NominationLinks| links.person_id.is_none() || links.placeholder_person;
        let same_name = match (&self.raw_person, &other.raw_person) {
            (Some(a), Some(b)) => normalize_name(a) == normalize_name(b),
            _ => false,
        };
        same_name && (weak(self) || weak(other))
    }

    /// Links to store when `newer` resolves more than this row did; `None`
    /// when the stored row is already as strong.
    pub fn upgrade_with(&self, newer: &NominationLinks) -> Option<LinkUpgrade> {
        let movie_id = self.movie_id.or(newer.movie_id);
        let pending_tmdb_id = match movie_id {
            Some(_) => None,
            None => self.pending_tmdb_id.or(newer.pending_tmdb_id),
        };
        let newer_is_real = newer.person_id.is_some() && !newer.placeholder_person;
        let stored_is_real = self.person_id.is_some() && !self.placeholder_person;
        let person_id = if newer_is_real && !stored_is_real {
            newer.person_id
        } else {
            self.person_id.or(newer.person_id)
        };
        let upgrade = LinkUpgrade {
            movie_id,
            pending_tmdb_id,
            person_id,
        };
        let current = LinkUpgrade {
            movie_id: self.movie_id,
            pending_tmdb_id: self.pending_tmdb_id,
            person_id: self.person_id,
        };
        (upgrade != current).then_some(upgrade)
    }
}

/// Result of [`super::MovieStore::insert_nomination`]
#[derive(Debug, Clone, PartialEq)]
pub enum NominationWrite {
    Inserted(Nomination),
    /// An earlier, weaker row for the same nomination now has stronger links
    Upgraded(Nomination),
    Duplicate,
}

/// Structured "no data available" marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLookup {
    pub source: String,
    pub identifier: String,
    pub reason: String,
    pub context: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn links(movie_id: Option<i64>, pending: Option<i64>, tmdb_id: Option<i64>) -> NominationLinks {
        NominationLinks {
            movie_id,
            pending_tmdb_id: pending,
            tmdb_id,
            person_id: None,
            placeholder_person: false,
            normalized_title: "parasite".into(),
            raw_person: None,
        }
    }

    #[test]
    fn test_title_only_row_upgrades_to_movie() {
        let stored = links(None, None, None);
        let resolved = links(Some(4), None, Some(496243));
        assert!(stored.same_nomination(&resolved));
        assert_eq!(
            stored.upgrade_with(&resolved),
            Some(LinkUpgrade {
                movie_id: Some(4),
                pending_tmdb_id: None,
                person_id: None
            })
        );
        // A weaker re-import leaves the resolved row alone
        assert!(resolved.same_nomination(&stored));
        assert_eq!(resolved.upgrade_with(&stored), None);
    }

    #[test]
    fn test_pending_row_matches_imported_movie() {
        let pending = links(None, Some(496243), Some(496243));
        let imported = links(Some(4), None, Some(496243));
        assert!(pending.same_nomination(&imported));
        assert_eq!(pending.upgrade_with(&imported).and_then(|u| u.pending_tmdb_id), None);

        let other = NominationLinks {
            normalized_title: "parasite".into(),
            ..links(Some(9), None, Some(1))
        };
        assert!(!imported.same_nomination(&other));
    }

    #[test]
    fn test_placeholder_person_upgrades_to_real_person() {
        let placeholder = NominationLinks {
            person_id: Some(7),
            placeholder_person: true,
            raw_person: Some("Bong Joon-ho".into()),
            ..links(Some(4), None, Some(496243))
        };
        let real = NominationLinks {
            person_id: Some(21684),
            placeholder_person: false,
            raw_person: Some("bong  joon-ho".into()),
            ..placeholder.clone()
        };
        assert!(placeholder.same_nomination(&real));
        assert_eq!(placeholder.upgrade_with(&real).and_then(|u| u.person_id), Some(21684));
        assert_eq!(real.upgrade_with(&placeholder), None);

        let other_real = NominationLinks {
            person_id: Some(99),
            ..real.clone()
        };
        assert!(!real.same_nomination(&other_real));
    }

    #[test]
    fn test_movie_canonical_and_year() {
        let movie = Movie {
            id: 1,
            tmdb_id: 496243,
            imdb_id: Some("tt6751668".into()),
            title: "Parasite".into(),
            original_title: None,
            release_date: NaiveDate::from_ymd_opt(2019, 5, 30),
            popularity: Some(80.0),
            vote_count: Some(17000),
            runtime: Some(133),
            genres: vec![],
            import_status: ImportStatus::Full,
            failed_criteria: vec![],
            canonical_sources: json!({"criterion": {"import_id": 3, "added_at": "2026-01-01T00:00:00Z"}}),
            omdb_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(movie.year(), Some(2019));
        assert!(movie.is_canonical("criterion"));
        assert!(!movie.is_canonical("sight_and_sound"));
    }
}
