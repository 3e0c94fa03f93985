//! Follow-up workers for fully imported movies

use serde_json::json;
use tracing::{debug, instrument, warn};

use super::context::Services;
use crate::queue::runner::{JobError, JobOutcome, JobResult};
use crate::store::{lookup_source, CreditKind, FailedLookup, MovieCredit};

/// Attach OMDb ratings to a movie.
#[instrument(skip(services))]
pub async fn enrich_movie(services: &Services, movie_id: i64) -> JobResult {
    let Some(movie) = services.store.movie(movie_id).await? else {
        return Ok(JobOutcome::Cancel(format!("movie {} no longer exists", movie_id)));
    };
    let Some(imdb_id) = movie.imdb_id.as_deref() else {
        return Ok(JobOutcome::Complete(json!({"skipped": "no_imdb_id"})));
    };
    if services
        .store
        .failed_lookup(lookup_source::OMDB, imdb_id)
        .await?
        .is_some()
    {
        return Ok(JobOutcome::Complete(json!({"skipped": "known_failed_lookup"})));
    }

    match services.ratings.ratings(imdb_id).await {
        Ok(ratings) => {
            let data = serde_json::to_value(&ratings).map_err(JobError::permanent)?;
            services.store.update_omdb(movie_id, data.clone()).await?;
            debug!(imdb_id, "Stored OMDb ratings");
            Ok(JobOutcome::Complete(json!({"omdb": data})))
        },
        Err(e) if e.is_permanent() => {
            warn!(imdb_id, error = %e, "No OMDb data");
            services
                .store
                .record_failed_lookup(FailedLookup {
                    source: lookup_source::OMDB.to_string(),
                    identifier: imdb_id.to_string(),
                    reason: e.to_string(),
                    context: json!({"movie_id": movie_id}),
                })
                .await?;
            Ok(JobOutcome::Cancel(format!("no data available: {}", e)))
        },
        Err(e) => Err(e.into()),
    }
}

/// Director-to-director and director-to-top-cast pairs for one movie.
pub fn collaboration_pairs(credits: &[MovieCredit], top_cast: usize) -> Vec<(i64, i64)> {
    let mut directors: Vec<i64> = credits
        .iter()
        .filter(|c| c.is_director())
        .map(|c| c.person.id)
        .collect();
    directors.sort_unstable();
    directors.dedup();

    let mut cast: Vec<&MovieCredit> = credits.iter().filter(|c| c.kind == CreditKind::Cast).collect();
    cast.sort_by_key(|c| (c.order.unwrap_or(i32::MAX), c.person.id));
    let mut billed: Vec<i64> = Vec::new();
    for credit in cast {
        if billed.len() >= top_cast {
            break;
        }
        if !billed.contains(&credit.person.id) {
            billed.push(credit.person.id);
        }
    }

    let mut pairs = Vec::new();
    for (i, a) in directors.iter().enumerate() {
        for b in directors.iter().skip(i + 1) {
            pairs.push((*a, *b));
        }
        for b in &billed {
            if a != b {
                pairs.push(((*a).min(*b), (*a).max(*b)));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

/// Record collaboration edges for a movie's directors and top-billed cast.
#[instrument(skip(services))]
pub async fn update_collaborations(services: &Services, movie_id: i64) -> JobResult {
    if services.store.movie(movie_id).await?.is_none() {
        return Ok(JobOutcome::Cancel(format!("movie {} no longer exists", movie_id)));
    }
    let credits = services.store.movie_credits(movie_id).await?;
    let pairs = collaboration_pairs(&credits, services.config.fetch.collaboration_top_cast);

    let mut recorded = 0usize;
    for (a, b) in &pairs {
        if services.store.record_collaboration(*a, *b, movie_id).await? {
            recorded += 1;
        }
    }
    debug!(pairs = pairs.len(), recorded, "Updated collaborations");
    Ok(JobOutcome::Complete(json!({"pairs": pairs.len(), "recorded": recorded})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Person;

    fn credit(id: i64, kind: CreditKind, role: &str, order: Option<i32>) -> MovieCredit {
        MovieCredit {
            person: Person {
                id,
                tmdb_id: Some(id),
                imdb_id: None,
                name: format!("person {}", id),
                popularity: None,
                placeholder: false,
            },
            kind,
            role: role.into(),
            department: None,
            order,
        }
    }

    #[test]
    fn test_pairs_link_directors_with_top_cast() {
        let credits = vec![
            credit(1, CreditKind::Crew, "Director", None),
            credit(2, CreditKind::Cast, "Martin", Some(0)),
            credit(3, CreditKind::Cast, "Tommy", Some(1)),
            credit(4, CreditKind::Cast, "Extra", Some(9)),
            credit(5, CreditKind::Crew, "Editor", None),
        ];
        assert_eq!(collaboration_pairs(&credits, 2), vec![(1, 2), (1, 3)]);
    }

    #[test]
    fn test_co_directors_and_acting_director() {
        let credits = vec![
            credit(7, CreditKind::Crew, "Director", None),
            credit(3, CreditKind::Crew, "Director", None),
            credit(7, CreditKind::Cast, "Himself", Some(0)),
        ];
        assert_eq!(collaboration_pairs(&credits, 5), vec![(3, 7)]);
    }

    #[test]
    fn test_no_director_no_pairs() {
        let credits = vec![credit(2, CreditKind::Cast, "Martin", Some(0))];
        assert!(collaboration_pairs(&credits, 5).is_empty());
    }
}
