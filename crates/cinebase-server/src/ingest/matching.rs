//! Fuzzy reconciliation of festival titles and names
//!
//! Candidates are filtered by a similarity threshold, scored with weighted
//! components and accepted only when the best score leads the runner-up by
//! at least the configured gap. An ambiguous result is a rejection; the
//! caller moves on to its next tier.

use serde::Serialize;

use super::config::MatchingConfig;
use cinebase_common::text::{name_similarity, title_similarity};

/// A film candidate from the local store or an external search
#[derive(Debug, Clone, PartialEq)]
pub struct FilmCandidate<T> {
    pub item: T,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
}

/// A person candidate from an external search
#[derive(Debug, Clone, PartialEq)]
pub struct PersonCandidate<T> {
    pub item: T,
    pub name: String,
    pub popularity: Option<f64>,
    pub known_for: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<T> {
    pub item: T,
    pub similarity: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<T> {
    Accepted(Scored<T>),
    /// The best candidate did not lead the runner-up by the required gap
    Ambiguous { best: Scored<T>, runner_up: Scored<T> },
    NoMatch,
}

impl<T> MatchResult<T> {
    pub fn accepted(self) -> Option<Scored<T>> {
        match self {
            MatchResult::Accepted(scored) => Some(scored),
            _ => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MatchResult::Ambiguous { .. })
    }
}

/// Closeness of two years in `[0, 1]`, `None` when outside the tolerance.
///
/// A query without a year cannot be checked and scores a neutral 0.5; a
/// candidate without a year never matches a query that has one.
pub fn year_proximity(query: Option<i32>, candidate: Option<i32>, tolerance: i32) -> Option<f64> {
    match (query, candidate) {
        (None, _) => Some(0.5),
        (Some(_), None) => None,
        (Some(q), Some(c)) => {
            let diff = (q - c).abs();
            if diff > tolerance {
                None
            } else {
                Some(1.0 - f64::from(diff) / f64::from(tolerance + 1))
            }
        },
    }
}

/// Score one film candidate; `None` when it fails the title threshold or the
/// year window.
pub fn score_film<T>(
    config: &MatchingConfig,
    title: &str,
    year: Option<i32>,
    candidate: FilmCandidate<T>,
) -> Option<Scored<T>> {
    let primary = title_similarity(title, &candidate.title);
    let original = candidate
        .original_title
        .as_deref()
        .map_or(0.0, |original| title_similarity(title, original));
    let similarity = primary.max(original);
    if similarity < config.title_threshold {
        return None;
    }
    let proximity = year_proximity(year, candidate.year, config.year_tolerance)?;
    Some(Scored {
        item: candidate.item,
        similarity,
        score: config.title_weight * similarity + config.year_weight * proximity,
    })
}

/// Map popularity onto `[0, 1)`.
fn popularity_factor(popularity: Option<f64>) -> f64 {
    match popularity {
        Some(p) if p.is_finite() && p > 0.0 => p / (p + 10.0),
        _ => 0.0,
    }
}

/// Score a person from an external search by name, popularity and whether
/// they are known for the nominated film.
pub fn score_person<T>(
    config: &MatchingConfig,
    name: &str,
    film_title: Option<&str>,
    candidate: PersonCandidate<T>,
) -> Option<Scored<T>> {
    let similarity = name_similarity(name, &candidate.name);
    let known_for = film_title.map_or(0.0, |film| {
        let hit = candidate
            .known_for
            .iter()
            .any(|title| title_similarity(film, title) >= config.title_threshold);
        if hit {
            1.0
        } else {
            0.0
        }
    });
    let score = config.person_name_weight * similarity
        + config.person_popularity_weight * popularity_factor(candidate.popularity)
        + config.person_known_for_weight * known_for;
    if score < config.person_search_threshold {
        return None;
    }
    Some(Scored {
        item: candidate.item,
        similarity,
        score,
    })
}

/// Pick the best of already-scored candidates, rejecting near ties.
pub fn select_best<T>(mut scored: Vec<Scored<T>>, ambiguity_gap: f64) -> MatchResult<T> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut ranked = scored.into_iter();
    let Some(best) = ranked.next() else {
        return MatchResult::NoMatch;
    };
    match ranked.next() {
        Some(runner_up) if best.score - runner_up.score < ambiguity_gap => MatchResult::Ambiguous { best, runner_up },
        _ => MatchResult::Accepted(best),
    }
}

/// Score and select film candidates in one go.
pub fn match_film<T>(
    config: &MatchingConfig,
    title: &str,
    year: Option<i32>,
    candidates: impl IntoIterator<Item = FilmCandidate<T>>,
) -> MatchResult<T> {
    let scored = candidates
        .into_iter()
        .filter_map(|c| score_film(config, title, year, c))
        .collect();
    select_best(scored, config.ambiguity_gap)
}

/// Score and select person candidates in one go.
pub fn match_person<T>(
    config: &MatchingConfig,
    name: &str,
    film_title: Option<&str>,
    candidates: impl IntoIterator<Item = PersonCandidate<T>>,
) -> MatchResult<T> {
    let scored = candidates
        .into_iter()
        .filter_map(|c| score_person(config, name, film_title, c))
        .collect();
    select_best(scored, config.ambiguity_gap)
}

/// Pick the credited person whose name is closest to `name`, rejecting
/// names below the credits threshold and near ties.
pub fn match_credit<T>(
    config: &MatchingConfig,
    name: &str,
    credited: impl IntoIterator<Item = (String, T)>,
) -> MatchResult<T> {
    let scored = credited
        .into_iter()
        .filter_map(|(credited_name, item)| {
            let similarity = name_similarity(name, &credited_name);
            (similarity >= config.person_name_threshold).then_some(Scored {
                item,
                similarity,
                score: similarity,
            })
        })
        .collect();
    select_best(scored, config.ambiguity_gap)
}
