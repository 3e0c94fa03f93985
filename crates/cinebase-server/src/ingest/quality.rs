//! Full versus soft import decision

use super::config::QualityCriteria;
use crate::sources::MovieDetails;

/// Names of the criteria `movie` fails; empty means a full import.
pub fn failed_criteria(criteria: &QualityCriteria, movie: &MovieDetails) -> Vec<String> {
    let mut failed = Vec::new();

    if criteria.require_imdb_id && movie.imdb_id.as_deref().map_or(true, str::is_empty) {
        failed.push("missing_imdb_id".to_string());
    }
    if criteria.require_release_date && movie.release_date.is_none() {
        failed.push("missing_release_date".to_string());
    }
    if movie.vote_count.unwrap_or(0) < criteria.min_vote_count {
        failed.push(format!("vote_count_below_{}", criteria.min_vote_count));
    }
    if criteria.min_runtime > 0 && movie.runtime.map_or(true, |r| r < criteria.min_runtime) {
        failed.push(format!("runtime_below_{}", criteria.min_runtime));
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn movie() -> MovieDetails {
        MovieDetails {
            tmdb_id: 580175,
            imdb_id: Some("tt10288566".into()),
            title: "Another Round".into(),
            original_title: Some("Druk".into()),
            release_date: NaiveDate::from_ymd_opt(2020, 9, 24),
            popularity: Some(21.4),
            vote_count: Some(2900),
            runtime: Some(117),
            genres: vec!["Drama".into()],
            cast: vec![],
            crew: vec![],
        }
    }

    #[test]
    fn test_complete_movie_passes() {
        assert!(failed_criteria(&QualityCriteria::default(), &movie()).is_empty());
    }

    #[test]
    fn test_every_failure_is_reported() {
        let sparse = MovieDetails {
            imdb_id: None,
            release_date: None,
            vote_count: Some(1),
            runtime: None,
            ..movie()
        };
        assert_eq!(
            failed_criteria(&QualityCriteria::default(), &sparse),
            vec!["missing_imdb_id", "missing_release_date", "vote_count_below_5", "runtime_below_40"]
        );
    }

    #[test]
    fn test_criteria_are_configurable() {
        let lenient = QualityCriteria {
            require_imdb_id: false,
            require_release_date: false,
            min_vote_count: 0,
            min_runtime: 0,
        };
        let sparse = MovieDetails {
            imdb_id: None,
            release_date: None,
            vote_count: None,
            runtime: None,
            ..movie()
        };
        assert!(failed_criteria(&lenient, &sparse).is_empty());
    }
}
