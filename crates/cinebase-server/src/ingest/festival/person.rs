//! Person resolution for nominations
//!
//! IMDb id, then the credits of the resolved film, then an external person
//! search. Whoever is still unknown gets a placeholder person so the
//! nomination keeps its name.

use tracing::debug;

use super::formats::ParsedPerson;
use crate::ingest::context::Services;
use crate::ingest::matching::{match_credit, match_person, MatchResult, PersonCandidate};
use crate::queue::runner::JobError;
use crate::sources::SourceError;
use crate::store::{NewPerson, Person};

#[derive(Debug, Clone, PartialEq)]
pub struct PersonResolution {
    pub person: Person,
    pub via: &'static str,
}

impl PersonResolution {
    pub fn is_placeholder(&self) -> bool {
        self.person.placeholder
    }
}

pub async fn resolve_person(
    services: &Services,
    person: &ParsedPerson,
    movie_id: Option<i64>,
    film_title: Option<&str>,
) -> Result<PersonResolution, JobError> {
    let matching = &services.config.matching;

    if let Some(imdb_id) = person.imdb_id.as_deref() {
        if let Some(found) = services.store.person_by_imdb_id(imdb_id).await? {
            return Ok(PersonResolution {
                person: found,
                via: "imdb_id",
            });
        }
    }

    if let Some(movie_id) = movie_id {
        let mut credited: Vec<(String, Person)> = Vec::new();
        for credit in services.store.movie_credits(movie_id).await? {
            if !credited.iter().any(|(_, p)| p.id == credit.person.id) {
                credited.push((credit.person.name.clone(), credit.person));
            }
        }
        match match_credit(matching, &person.name, credited) {
            MatchResult::Accepted(scored) => {
                debug!(name = %person.name, similarity = scored.similarity, "Matched person in film credits");
                return Ok(PersonResolution {
                    person: scored.item,
                    via: "credits",
                });
            },
            MatchResult::Ambiguous { best, runner_up } => {
                debug!(
                    name = %person.name,
                    best = best.item.id,
                    runner_up = runner_up.item.id,
                    "Ambiguous credits match rejected"
                );
            },
            MatchResult::NoMatch => {},
        }
    }

    let hits = match services.movies.search_people(&person.name).await {
        Ok(hits) => hits,
        Err(SourceError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let candidates = hits.into_iter().map(|hit| PersonCandidate {
        name: hit.name.clone(),
        popularity: hit.popularity,
        known_for: hit.known_for.clone(),
        item: hit,
    });
    match match_person(matching, &person.name, film_title, candidates) {
        MatchResult::Accepted(scored) => {
            let hit = scored.item;
            let found = match services.store.person_by_tmdb_id(hit.tmdb_id).await? {
                Some(found) => found,
                None => {
                    services
                        .store
                        .upsert_person(NewPerson {
                            tmdb_id: Some(hit.tmdb_id),
                            imdb_id: person.imdb_id.clone(),
                            name: hit.name,
                            popularity: hit.popularity,
                        })
                        .await?
                },
            };
            return Ok(PersonResolution {
                person: found,
                via: "search",
            });
        },
        MatchResult::Ambiguous { best, runner_up } => {
            debug!(
                name = %person.name,
                best = best.item.tmdb_id,
                runner_up = runner_up.item.tmdb_id,
                "Ambiguous person match rejected"
            );
        },
        MatchResult::NoMatch => {},
    }

    let placeholder = services.store.placeholder_person(&person.name).await?;
    Ok(PersonResolution {
        person: placeholder,
        via: "placeholder",
    })
}
