//! External identifiers
//!
//! TMDb ids are positive integers; IMDb title ids look like `tt0111161` and
//! person ids like `nm0000151`. Both are validated once at the boundary so the
//! rest of the code can treat them as opaque keys.

use crate::error::{CinebaseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TMDb numeric identifier (movie or person, depending on context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TmdbId(pub i64);

impl TmdbId {
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(CinebaseError::InvalidId(format!("TMDb id must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TmdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TmdbId {
    type Err = CinebaseError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|_| CinebaseError::InvalidId(format!("not a TMDb id: {}", s)))?;
        Self::new(value)
    }
}

/// Kind of IMDb identifier, taken from its two-letter prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImdbKind {
    Title,
    Name,
}

/// IMDb identifier (`tt` titles, `nm` names)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImdbId(String);

impl ImdbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> ImdbKind {
        if self.0.starts_with("nm") {
            ImdbKind::Name
        } else {
            ImdbKind::Title
        }
    }

    pub fn is_title(&self) -> bool {
        self.kind() == ImdbKind::Title
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ImdbId {
    type Err = CinebaseError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let prefix = s.get(..2).unwrap_or_default();
        let digits = s.get(2..).unwrap_or_default();
        let valid_prefix = prefix == "tt" || prefix == "nm";
        let valid_digits = digits.len() >= 7 && digits.chars().all(|c| c.is_ascii_digit());
        if !valid_prefix || !valid_digits {
            return Err(CinebaseError::InvalidId(format!("not an IMDb id: {}", s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ImdbId {
    type Error = CinebaseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ImdbId> for String {
    fn from(id: ImdbId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_id_rejects_non_positive() {
        assert!(TmdbId::new(0).is_err());
        assert!(TmdbId::new(-5).is_err());
        assert_eq!(TmdbId::new(550).unwrap().get(), 550);
        assert_eq!("  603 ".parse::<TmdbId>().unwrap(), TmdbId(603));
        assert!("abc".parse::<TmdbId>().is_err());
    }

    #[test]
    fn test_imdb_id_parsing() {
        let title: ImdbId = "tt0111161".parse().unwrap();
        assert!(title.is_title());
        let name: ImdbId = "nm0000151".parse().unwrap();
        assert_eq!(name.kind(), ImdbKind::Name);

        assert!("tt12".parse::<ImdbId>().is_err());
        assert!("xx0111161".parse::<ImdbId>().is_err());
        assert!("tt01111a1".parse::<ImdbId>().is_err());
        assert!("".parse::<ImdbId>().is_err());
    }

    #[test]
    fn test_imdb_id_serde() {
        let id: ImdbId = serde_json::from_str("\"tt10872600\"").unwrap();
        assert_eq!(id.as_str(), "tt10872600");
        assert!(serde_json::from_str::<ImdbId>("\"bogus\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tt10872600\"");
    }
}
