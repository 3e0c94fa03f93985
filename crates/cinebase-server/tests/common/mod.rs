//! Shared harness for pipeline integration tests
//!
//! Wires [`Services`] to the in-memory queue, progress store and movie
//! store, with scripted sources standing in for TMDb, OMDb, the id export
//! and the event pages. Jobs run in the foreground through
//! [`QueueRunner::drain`].

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cinebase_server::ingest::{Dispatcher, IngestConfig, Services};
use cinebase_server::notify::{ImportEvent, Notifier};
use cinebase_server::progress::MemoryProgressStore;
use cinebase_server::queue::runner::{DrainSummary, QueueRunner, RunnerConfig};
use cinebase_server::queue::MemoryJobQueue;
use cinebase_server::sources::{
    CeremonySource, CrewMember, IdUniverse, ListInfo, ListItem, ListSource, MovieCandidate, MovieDetails, MovieSource,
    PersonCandidate, Ratings, RatingsSource, SourceError, SourceResult, Universe, UniverseEntry,
};
use cinebase_server::store::{MemoryMovieStore, Movie, MovieStore, NewMovie};

/// Movie details that pass the default quality criteria
pub fn details(tmdb_id: i64, title: &str, year: i32) -> MovieDetails {
    MovieDetails {
        tmdb_id,
        imdb_id: Some(format!("tt{:07}", tmdb_id)),
        title: title.to_string(),
        original_title: None,
        release_date: NaiveDate::from_ymd_opt(year, 6, 1),
        popularity: Some(10.0),
        vote_count: Some(250),
        runtime: Some(110),
        genres: vec!["Drama".to_string()],
        cast: Vec::new(),
        crew: Vec::new(),
    }
}

pub fn director(details: MovieDetails, tmdb_id: i64, name: &str) -> MovieDetails {
    let mut details = details;
    details.crew.push(CrewMember {
        tmdb_id,
        name: name.to_string(),
        job: "Director".to_string(),
        department: Some("Directing".to_string()),
        popularity: Some(5.0),
        imdb_id: None,
    });
    details
}

/// Scripted TMDb: movies by id, list pages, and canned search results
#[derive(Default)]
pub struct FakeTmdb {
    movies: Mutex<HashMap<i64, MovieDetails>>,
    lists: Mutex<HashMap<String, Vec<SourceResult<Vec<ListItem>>>>>,
    searches: Mutex<HashMap<String, Vec<MovieCandidate>>>,
    searches_by_year: Mutex<HashMap<(String, Option<i32>), Vec<MovieCandidate>>>,
    search_log: Mutex<Vec<(String, Option<i32>)>>,
    people: Mutex<HashMap<String, Vec<PersonCandidate>>>,
    calls: Mutex<Vec<i64>>,
}

pub fn candidate(tmdb_id: i64, title: &str, year: i32) -> MovieCandidate {
    MovieCandidate {
        tmdb_id,
        title: title.to_string(),
        original_title: None,
        release_date: NaiveDate::from_ymd_opt(year, 5, 1),
        popularity: Some(5.0),
    }
}

impl FakeTmdb {
    pub fn add_movie(&self, details: MovieDetails) {
        self.movies.lock().unwrap().insert(details.tmdb_id, details);
    }

    /// Register a list whose pages return these results in order
    pub fn add_list(&self, list_id: &str, pages: Vec<SourceResult<Vec<ListItem>>>) {
        self.lists.lock().unwrap().insert(list_id.to_string(), pages);
    }

    /// Results for `query` whatever year is asked for
    pub fn add_search(&self, query: &str, hits: Vec<MovieCandidate>) {
        self.searches.lock().unwrap().insert(query.to_string(), hits);
    }

    /// Results for `query` searched with exactly this year filter
    pub fn add_search_for_year(&self, query: &str, year: Option<i32>, hits: Vec<MovieCandidate>) {
        self.searches_by_year
            .lock()
            .unwrap()
            .insert((query.to_string(), year), hits);
    }

    /// Movie searches made, in call order
    pub fn searches(&self) -> Vec<(String, Option<i32>)> {
        self.search_log.lock().unwrap().clone()
    }

    pub fn add_people(&self, query: &str, hits: Vec<PersonCandidate>) {
        self.people.lock().unwrap().insert(query.to_string(), hits);
    }

    /// Ids passed to `get_movie`, in call order
    pub fn fetched(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

fn clone_result<T: Clone>(result: &SourceResult<T>) -> SourceResult<T> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(SourceError::NotFound(m)) => Err(SourceError::NotFound(m.clone())),
        Err(SourceError::Forbidden(m)) => Err(SourceError::Forbidden(m.clone())),
        Err(SourceError::Unauthorized(m)) => Err(SourceError::Unauthorized(m.clone())),
        Err(SourceError::RateLimited(m)) => Err(SourceError::RateLimited(m.clone())),
        Err(e) => Err(SourceError::Timeout(e.to_string())),
    }
}

#[async_trait]
impl MovieSource for FakeTmdb {
    async fn get_movie(&self, tmdb_id: i64) -> SourceResult<MovieDetails> {
        self.calls.lock().unwrap().push(tmdb_id);
        self.movies
            .lock()
            .unwrap()
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("movie {}", tmdb_id)))
    }

    async fn find_by_imdb_id(&self, imdb_id: &str) -> SourceResult<Vec<MovieCandidate>> {
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.imdb_id.as_deref() == Some(imdb_id))
            .map(|m| MovieCandidate {
                tmdb_id: m.tmdb_id,
                title: m.title.clone(),
                original_title: m.original_title.clone(),
                release_date: m.release_date,
                popularity: m.popularity,
            })
            .collect())
    }

    async fn search_movies(&self, query: &str, year: Option<i32>) -> SourceResult<Vec<MovieCandidate>> {
        self.search_log.lock().unwrap().push((query.to_string(), year));
        let key = (query.to_string(), year);
        if let Some(hits) = self.searches_by_year.lock().unwrap().get(&key) {
            return Ok(hits.clone());
        }
        Ok(self.searches.lock().unwrap().get(query).cloned().unwrap_or_default())
    }

    async fn search_people(&self, query: &str) -> SourceResult<Vec<PersonCandidate>> {
        Ok(self.people.lock().unwrap().get(query).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ListSource for FakeTmdb {
    async fn list_info(&self, list_id: &str) -> SourceResult<ListInfo> {
        let lists = self.lists.lock().unwrap();
        let pages = lists
            .get(list_id)
            .ok_or_else(|| SourceError::NotFound(format!("list {}", list_id)))?;
        let item_count = pages
            .iter()
            .map(|p| p.as_ref().map(|items| items.len() as u32).unwrap_or(0))
            .sum();
        Ok(ListInfo {
            list_id: list_id.to_string(),
            name: format!("List {}", list_id),
            total_pages: pages.len() as u32,
            item_count,
        })
    }

    async fn list_page(&self, list_id: &str, page: u32) -> SourceResult<Vec<ListItem>> {
        let lists = self.lists.lock().unwrap();
        let pages = lists
            .get(list_id)
            .ok_or_else(|| SourceError::NotFound(format!("list {}", list_id)))?;
        match pages.get(page.saturating_sub(1) as usize) {
            Some(result) => clone_result(result),
            None => Err(SourceError::NotFound(format!("list {} page {}", list_id, page))),
        }
    }
}

/// OMDb with no data for anything
pub struct NoRatings;

#[async_trait]
impl RatingsSource for NoRatings {
    async fn ratings(&self, imdb_id: &str) -> SourceResult<Ratings> {
        Err(SourceError::NotFound(format!("ratings {}", imdb_id)))
    }
}

#[derive(Clone)]
enum CeremonyReply {
    Document(String),
    Unavailable,
}

/// Ceremony documents keyed by (event id, year)
#[derive(Default)]
pub struct FakeCeremonies {
    replies: Mutex<HashMap<(String, i32), (CeremonyReply, Duration)>>,
    in_flight: Mutex<(usize, usize)>,
}

impl FakeCeremonies {
    pub fn add(&self, event_id: &str, year: i32, body: impl Into<String>) {
        self.add_delayed(event_id, year, body, Duration::ZERO);
    }

    /// A document that takes `delay` to arrive
    pub fn add_delayed(&self, event_id: &str, year: i32, body: impl Into<String>, delay: Duration) {
        self.replies
            .lock()
            .unwrap()
            .insert((event_id.to_string(), year), (CeremonyReply::Document(body.into()), delay));
    }

    /// The event page answers 503 for this year
    pub fn add_unavailable(&self, event_id: &str, year: i32) {
        self.replies
            .lock()
            .unwrap()
            .insert((event_id.to_string(), year), (CeremonyReply::Unavailable, Duration::ZERO));
    }

    /// Most fetches that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }
}

#[async_trait]
impl CeremonySource for FakeCeremonies {
    async fn fetch_ceremony(&self, event_id: &str, year: i32) -> SourceResult<String> {
        let scripted = self.replies.lock().unwrap().get(&(event_id.to_string(), year)).cloned();
        let Some((reply, delay)) = scripted else {
            return Err(SourceError::NotFound(format!("{} {}", event_id, year)));
        };

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }
        tokio::time::sleep(delay).await;
        self.in_flight.lock().unwrap().0 -= 1;

        match reply {
            CeremonyReply::Document(body) => Ok(body),
            CeremonyReply::Unavailable => Err(SourceError::Server {
                status: 503,
                url: format!("{}/{}", event_id, year),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeUniverse {
    entries: Mutex<Vec<UniverseEntry>>,
}

impl FakeUniverse {
    pub fn set_ids(&self, ids: impl IntoIterator<Item = i64>) {
        *self.entries.lock().unwrap() = ids
            .into_iter()
            .map(|tmdb_id| UniverseEntry {
                tmdb_id,
                popularity: Some(1.0),
                title: None,
            })
            .collect();
    }
}

#[async_trait]
impl IdUniverse for FakeUniverse {
    async fn snapshot(&self) -> SourceResult<Universe> {
        Ok(Universe {
            entries: Arc::new(self.entries.lock().unwrap().clone()),
            baseline_at: Utc::now(),
        })
    }
}

/// Keeps every published event for assertions
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, ImportEvent)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(String, ImportEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.name()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, topic: &str, event: ImportEvent) {
        self.events.lock().unwrap().push((topic.to_string(), event));
    }
}

/// How long a claimed job may sit in `executing` before a drain takes it back
pub const RESCUE_AFTER: Duration = Duration::from_millis(50);

pub struct TestPipeline {
    pub services: Services,
    pub queue: Arc<MemoryJobQueue>,
    pub store: Arc<MemoryMovieStore>,
    pub tmdb: Arc<FakeTmdb>,
    pub ceremonies: Arc<FakeCeremonies>,
    pub universe: Arc<FakeUniverse>,
    pub notifier: Arc<RecordingNotifier>,
    runner: QueueRunner,
}

impl TestPipeline {
    pub fn new() -> Self {
        Self::with_config(IngestConfig::default())
    }

    pub fn with_config(config: IngestConfig) -> Self {
        let queue = Arc::new(MemoryJobQueue::new());
        let store = Arc::new(MemoryMovieStore::new());
        let tmdb = Arc::new(FakeTmdb::default());
        let ceremonies = Arc::new(FakeCeremonies::default());
        let universe = Arc::new(FakeUniverse::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let services = Services {
            queue: queue.clone(),
            progress: Arc::new(MemoryProgressStore::new()),
            store: store.clone(),
            movies: tmdb.clone(),
            lists: tmdb.clone(),
            ratings: Arc::new(NoRatings),
            ceremonies: ceremonies.clone(),
            universe: universe.clone(),
            notifier: notifier.clone(),
            config: Arc::new(config.clone()),
        };

        let runner = QueueRunner::new(
            queue.clone(),
            Arc::new(Dispatcher::new(services.clone())),
            RunnerConfig {
                node: "test".to_string(),
                queues: config.queue_limits(),
                poll_interval: Duration::from_millis(10),
                job_timeout: Duration::from_secs(5),
                // Drains run one job at a time, so nothing of ours is
                // executing when a drain starts
                rescue_after: RESCUE_AFTER,
            },
        );

        Self {
            services,
            queue,
            store,
            tmdb,
            ceremonies,
            universe,
            notifier,
            runner,
        }
    }

    /// Run everything due now
    pub async fn drain_now(&self) -> DrainSummary {
        self.runner.drain(false, 50).await.unwrap()
    }

    /// Run everything, including jobs scheduled for later
    pub async fn drain_all(&self, max_rounds: usize) -> DrainSummary {
        self.runner.drain(true, max_rounds).await.unwrap()
    }

    /// Store a movie directly, bypassing the fetch worker
    pub async fn seed_movie(&self, tmdb_id: i64, title: &str, year: i32) -> Movie {
        let d = details(tmdb_id, title, year);
        self.store
            .insert_full_movie(
                NewMovie {
                    tmdb_id,
                    imdb_id: d.imdb_id,
                    title: d.title,
                    original_title: None,
                    release_date: d.release_date,
                    popularity: d.popularity,
                    vote_count: d.vote_count,
                    runtime: d.runtime,
                    genres: d.genres,
                },
                Vec::new(),
            )
            .await
            .unwrap()
    }
}
