//! In-memory movie store

use async_trait::async_trait;
use chrono::Utc;
use cinebase_common::text::normalize_name;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use super::models::*;
use super::{MovieStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct CreditRow {
    movie_id: i64,
    person_id: i64,
    kind: CreditKind,
    role: String,
    department: Option<String>,
    order: Option<i32>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    movies: BTreeMap<i64, Movie>,
    people: BTreeMap<i64, Person>,
    credits: Vec<CreditRow>,
    ceremonies: BTreeMap<i64, Ceremony>,
    nominations: BTreeMap<i64, Nomination>,
    failed_lookups: HashMap<(String, String), FailedLookup>,
    collaborations: HashSet<(i64, i64, i64)>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn movie_by_tmdb(&self, tmdb_id: i64) -> Option<&Movie> {
        self.movies.values().find(|m| m.tmdb_id == tmdb_id)
    }

    fn insert_movie(&mut self, new: NewMovie, status: ImportStatus, failed: Vec<String>) -> Movie {
        if let Some(existing) = self.movie_by_tmdb(new.tmdb_id) {
            return existing.clone();
        }
        // IMDb ids are unique; a second claimant is stored without one
        let imdb_id = new
            .imdb_id
            .filter(|imdb| !self.movies.values().any(|m| m.imdb_id.as_deref() == Some(imdb.as_str())));
        let now = Utc::now();
        let id = self.next_id();
        let movie = Movie {
            id,
            tmdb_id: new.tmdb_id,
            imdb_id,
            title: new.title,
            original_title: new.original_title,
            release_date: new.release_date,
            popularity: new.popularity,
            vote_count: new.vote_count,
            runtime: new.runtime,
            genres: if status == ImportStatus::Full { new.genres } else { Vec::new() },
            import_status: status,
            failed_criteria: failed,
            canonical_sources: Value::Object(Default::default()),
            omdb_data: None,
            created_at: now,
            updated_at: now,
        };
        self.movies.insert(id, movie.clone());
        movie
    }

    fn upsert_person(&mut self, new: NewPerson) -> Person {
        let existing = self.people.values().find(|p| {
            (new.tmdb_id.is_some() && p.tmdb_id == new.tmdb_id)
                || (new.imdb_id.is_some() && p.imdb_id == new.imdb_id)
        });
        if let Some(person) = existing {
            return person.clone();
        }
        let id = self.next_id();
        let person = Person {
            id,
            tmdb_id: new.tmdb_id,
            imdb_id: new.imdb_id,
            name: new.name,
            popularity: new.popularity,
            placeholder: false,
        };
        self.people.insert(id, person.clone());
        person
    }

    fn links_of(
        &self,
        movie_id: Option<i64>,
        pending_tmdb_id: Option<i64>,
        person_id: Option<i64>,
        normalized_title: &str,
        raw_person: &Option<String>,
    ) -> NominationLinks {
        let movie_tmdb_id = movie_id.and_then(|id| self.movies.get(&id)).map(|m| m.tmdb_id);
        NominationLinks {
            movie_id,
            pending_tmdb_id,
            tmdb_id: movie_tmdb_id.or(pending_tmdb_id),
            person_id,
            placeholder_person: person_id
                .and_then(|id| self.people.get(&id))
                .is_some_and(|p| p.placeholder),
            normalized_title: normalized_title.to_string(),
            raw_person: raw_person.clone(),
        }
    }
}

/// Movie store held in process memory
#[derive(Default)]
pub struct MemoryMovieStore {
    inner: RwLock<Inner>,
}

impl MemoryMovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn movie_count(&self) -> usize {
        self.inner.read().await.movies.len()
    }

    pub async fn people(&self) -> Vec<Person> {
        self.inner.read().await.people.values().cloned().collect()
    }
}

#[async_trait]
impl MovieStore for MemoryMovieStore {
    async fn movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        Ok(self.inner.read().await.movies.get(&id).cloned())
    }

    async fn movie_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Movie>> {
        Ok(self.inner.read().await.movie_by_tmdb(tmdb_id).cloned())
    }

    async fn movie_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Movie>> {
        let inner = self.inner.read().await;
        Ok(inner
            .movies
            .values()
            .find(|m| m.imdb_id.as_deref() == Some(imdb_id))
            .cloned())
    }

    async fn known_tmdb_ids(&self) -> StoreResult<HashSet<i64>> {
        Ok(self.inner.read().await.movies.values().map(|m| m.tmdb_id).collect())
    }

    async fn movies_near_year(&self, year: Option<i32>, tolerance: i32, limit: usize) -> StoreResult<Vec<Movie>> {
        let inner = self.inner.read().await;
        Ok(inner
            .movies
            .values()
            .filter(|m| match (year, m.year()) {
                (Some(y), Some(my)) => (my - y).abs() <= tolerance,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_full_movie(&self, movie: NewMovie, credits: Vec<NewCredit>) -> StoreResult<Movie> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.movie_by_tmdb(movie.tmdb_id) {
            return Ok(existing.clone());
        }
        let stored = inner.insert_movie(movie, ImportStatus::Full, Vec::new());
        for credit in credits {
            let person = inner.upsert_person(credit.person);
            let duplicate = inner.credits.iter().any(|c| {
                c.movie_id == stored.id && c.person_id == person.id && c.kind == credit.kind && c.role == credit.role
            });
            if !duplicate {
                inner.credits.push(CreditRow {
                    movie_id: stored.id,
                    person_id: person.id,
                    kind: credit.kind,
                    role: credit.role,
                    department: credit.department,
                    order: credit.order,
                });
            }
        }
        Ok(stored)
    }

    async fn insert_soft_movie(&self, movie: NewMovie, failed_criteria: Vec<String>) -> StoreResult<Movie> {
        let mut inner = self.inner.write().await;
        Ok(inner.insert_movie(movie, ImportStatus::Soft, failed_criteria))
    }

    async fn update_omdb(&self, movie_id: i64, data: Value) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let movie = inner
            .movies
            .get_mut(&movie_id)
            .ok_or_else(|| StoreError::not_found("Movie", movie_id))?;
        movie.omdb_data = Some(data);
        movie.updated_at = Utc::now();
        Ok(())
    }

    async fn movie_credits(&self, movie_id: i64) -> StoreResult<Vec<MovieCredit>> {
        let inner = self.inner.read().await;
        Ok(inner
            .credits
            .iter()
            .filter(|c| c.movie_id == movie_id)
            .filter_map(|c| {
                inner.people.get(&c.person_id).map(|person| MovieCredit {
                    person: person.clone(),
                    kind: c.kind,
                    role: c.role.clone(),
                    department: c.department.clone(),
                    order: c.order,
                })
            })
            .collect())
    }

    async fn mark_canonical(&self, movie_id: i64, list_key: &str, entry: CanonicalEntry) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let movie = inner
            .movies
            .get_mut(&movie_id)
            .ok_or_else(|| StoreError::not_found("Movie", movie_id))?;
        if movie.is_canonical(list_key) {
            return Ok(false);
        }
        let entry = serde_json::to_value(entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if !movie.canonical_sources.is_object() {
            movie.canonical_sources = Value::Object(Default::default());
        }
        if let Some(map) = movie.canonical_sources.as_object_mut() {
            map.insert(list_key.to_string(), entry);
        }
        movie.updated_at = Utc::now();
        Ok(true)
    }

    async fn count_canonical(&self, list_key: &str) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.movies.values().filter(|m| m.is_canonical(list_key)).count() as i64)
    }

    async fn person_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Person>> {
        let inner = self.inner.read().await;
        Ok(inner
            .people
            .values()
            .find(|p| p.imdb_id.as_deref() == Some(imdb_id))
            .cloned())
    }

    async fn person_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Person>> {
        let inner = self.inner.read().await;
        Ok(inner.people.values().find(|p| p.tmdb_id == Some(tmdb_id)).cloned())
    }

    async fn upsert_person(&self, person: NewPerson) -> StoreResult<Person> {
        Ok(self.inner.write().await.upsert_person(person))
    }

    async fn placeholder_person(&self, name: &str) -> StoreResult<Person> {
        let mut inner = self.inner.write().await;
        let normalized = normalize_name(name);
        if let Some(existing) = inner
            .people
            .values()
            .find(|p| p.placeholder && normalize_name(&p.name) == normalized)
        {
            return Ok(existing.clone());
        }
        let id = inner.next_id();
        let person = Person {
            id,
            tmdb_id: None,
            imdb_id: None,
            name: name.trim().to_string(),
            popularity: None,
            placeholder: true,
        };
        inner.people.insert(id, person.clone());
        Ok(person)
    }

    async fn ceremony(&self, festival: &str, year: i32) -> StoreResult<Option<Ceremony>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ceremonies
            .values()
            .find(|c| c.festival == festival && c.year == year)
            .cloned())
    }

    async fn upsert_ceremony(&self, festival: &str, year: i32, source_format: &str) -> StoreResult<Ceremony> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .ceremonies
            .values()
            .find(|c| c.festival == festival && c.year == year)
        {
            return Ok(existing.clone());
        }
        let id = inner.next_id();
        let ceremony = Ceremony {
            id,
            festival: festival.to_string(),
            year,
            source_format: source_format.to_string(),
            imported_at: Utc::now(),
        };
        inner.ceremonies.insert(id, ceremony.clone());
        Ok(ceremony)
    }

    async fn ceremony_years(&self, festival: &str) -> StoreResult<Vec<i32>> {
        let inner = self.inner.read().await;
        let mut years: Vec<i32> = inner
            .ceremonies
            .values()
            .filter(|c| c.festival == festival)
            .map(|c| c.year)
            .collect();
        years.sort_unstable();
        Ok(years)
    }

    async fn insert_nomination(&self, new: NewNomination) -> StoreResult<NominationWrite> {
        let mut inner = self.inner.write().await;
        let incoming = inner.links_of(
            new.movie_id,
            new.pending_tmdb_id,
            new.person_id,
            &new.normalized_title,
            &new.raw_person,
        );
        let matched = inner
            .nominations
            .values()
            .filter(|n| n.ceremony_id == new.ceremony_id && n.category == new.category)
            .find_map(|n| {
                let stored = inner.links_of(
                    n.movie_id,
                    n.pending_tmdb_id,
                    n.person_id,
                    &n.normalized_title,
                    &n.raw_person,
                );
                stored
                    .same_nomination(&incoming)
                    .then(|| (n.id, stored.upgrade_with(&incoming)))
            });
        match matched {
            Some((_, None)) => return Ok(NominationWrite::Duplicate),
            Some((id, Some(upgrade))) => {
                let nomination = inner
                    .nominations
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("nomination {}", id)))?;
                nomination.movie_id = upgrade.movie_id;
                nomination.pending_tmdb_id = upgrade.pending_tmdb_id;
                nomination.person_id = upgrade.person_id;
                return Ok(NominationWrite::Upgraded(nomination.clone()));
            },
            None => {},
        }
        let id = inner.next_id();
        let nomination = Nomination {
            id,
            ceremony_id: new.ceremony_id,
            category: new.category,
            won: new.won,
            movie_id: new.movie_id,
            pending_tmdb_id: new.pending_tmdb_id,
            person_id: new.person_id,
            raw_title: new.raw_title,
            normalized_title: new.normalized_title,
            raw_person: new.raw_person,
        };
        inner.nominations.insert(id, nomination.clone());
        Ok(NominationWrite::Inserted(nomination))
    }

    async fn nominations(&self, ceremony_id: i64) -> StoreResult<Vec<Nomination>> {
        let inner = self.inner.read().await;
        Ok(inner
            .nominations
            .values()
            .filter(|n| n.ceremony_id == ceremony_id)
            .cloned()
            .collect())
    }

    async fn resolve_pending_nominations(&self, tmdb_id: i64, movie_id: i64) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut resolved = 0;
        for nomination in inner.nominations.values_mut() {
            if nomination.pending_tmdb_id == Some(tmdb_id) {
                nomination.movie_id = Some(movie_id);
                nomination.pending_tmdb_id = None;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn record_failed_lookup(&self, lookup: FailedLookup) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .failed_lookups
            .insert((lookup.source.clone(), lookup.identifier.clone()), lookup);
        Ok(())
    }

    async fn failed_lookup(&self, source: &str, identifier: &str) -> StoreResult<Option<FailedLookup>> {
        let inner = self.inner.read().await;
        Ok(inner
            .failed_lookups
            .get(&(source.to_string(), identifier.to_string()))
            .cloned())
    }

    async fn failed_identifiers(&self, source: &str) -> StoreResult<HashSet<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .failed_lookups
            .keys()
            .filter(|(s, _)| s == source)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn record_collaboration(&self, person_a: i64, person_b: i64, movie_id: i64) -> StoreResult<bool> {
        let (a, b) = (person_a.min(person_b), person_a.max(person_b));
        Ok(self.inner.write().await.collaborations.insert((a, b, movie_id)))
    }

    async fn collaboration_count(&self, person_a: i64, person_b: i64) -> StoreResult<i64> {
        let (a, b) = (person_a.min(person_b), person_a.max(person_b));
        let inner = self.inner.read().await;
        Ok(inner
            .collaborations
            .iter()
            .filter(|(x, y, _)| *x == a && *y == b)
            .count() as i64)
    }
}
