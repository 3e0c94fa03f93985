//! Gap analysis and the fetch worker against the in-memory pipeline

mod common;

use cinebase_server::ingest::gap::{self, GapQuery};
use cinebase_server::ingest::{self, jobs::workers};
use cinebase_server::progress::keys;
use cinebase_server::queue::{JobFilter, JobState};
use cinebase_server::store::{lookup_source, ImportStatus, MovieStore};
use common::{details, TestPipeline};

#[tokio::test]
async fn test_gap_returns_only_what_is_missing() {
    let pipeline = TestPipeline::new();
    for id in 1..=995 {
        pipeline.seed_movie(id, &format!("Known {}", id), 2010).await;
    }
    pipeline.universe.set_ids(1..=1000);

    let query = GapQuery {
        limit: Some(10),
        ..Default::default()
    };
    let missing = gap::find_missing_ids(&pipeline.services, &query).await.unwrap();
    let ids: Vec<i64> = missing.iter().map(|m| m.tmdb_id).collect();
    assert_eq!(ids, vec![996, 997, 998, 999, 1000]);

    let recorded = pipeline.services.progress.get(keys::GAP_MISSING_COUNT).await.unwrap();
    assert_eq!(recorded, Some(serde_json::json!(5)));
    assert_eq!(gap::missing_count(&pipeline.services, None).await.unwrap(), 5);
}

#[tokio::test]
async fn test_duplicate_fetch_is_not_queued_twice() {
    let pipeline = TestPipeline::new();
    pipeline.tmdb.add_movie(details(42, "Movie 42", 2015));

    let first = ingest::queue_fetch(&pipeline.services, 42).await.unwrap();
    let second = ingest::queue_fetch(&pipeline.services, 42).await.unwrap();
    assert!(!first.conflict);
    assert!(second.conflict);
    assert_eq!(second.job_id, first.job_id);

    pipeline.drain_now().await;
    assert_eq!(pipeline.tmdb.fetched(), vec![42]);
    let movie = pipeline.store.movie_by_tmdb_id(42).await.unwrap().unwrap();
    assert_eq!(movie.import_status, ImportStatus::Full);
}

#[tokio::test]
async fn test_stored_movie_is_not_fetched_again() {
    let pipeline = TestPipeline::new();
    pipeline.seed_movie(7, "Movie 7", 2001).await;

    ingest::queue_fetch(&pipeline.services, 7).await.unwrap();
    let summary = pipeline.drain_now().await;

    assert!(summary.completed >= 1);
    assert!(pipeline.tmdb.fetched().is_empty());
}

#[tokio::test]
async fn test_low_quality_movie_is_soft_imported() {
    let pipeline = TestPipeline::new();
    let mut sparse = details(55, "Obscure Short", 2019);
    sparse.imdb_id = None;
    sparse.vote_count = Some(1);
    pipeline.tmdb.add_movie(sparse);

    ingest::queue_fetch(&pipeline.services, 55).await.unwrap();
    pipeline.drain_now().await;

    let movie = pipeline.store.movie_by_tmdb_id(55).await.unwrap().unwrap();
    assert_eq!(movie.import_status, ImportStatus::Soft);
    assert!(movie.failed_criteria.iter().any(|c| c == "missing_imdb_id"));
    assert!(pipeline.store.movie_credits(movie.id).await.unwrap().is_empty());

    // Soft imports get no follow-up enrichment
    let enrich = JobFilter::worker(workers::ENRICH_MOVIE);
    assert_eq!(pipeline.services.queue.count(&enrich).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_movie_is_recorded_and_left_out_of_the_gap() {
    let pipeline = TestPipeline::new();
    pipeline.universe.set_ids([404, 405]);
    pipeline.tmdb.add_movie(details(405, "Movie 405", 2012));

    ingest::queue_fetch(&pipeline.services, 404).await.unwrap();
    let summary = pipeline.drain_now().await;
    assert_eq!(summary.cancelled, 1);

    let cancelled = JobFilter::worker(workers::FETCH_MOVIE).states(&[JobState::Cancelled]);
    assert_eq!(pipeline.services.queue.count(&cancelled).await.unwrap(), 1);

    let lookup = pipeline
        .store
        .failed_lookup(lookup_source::TMDB_MOVIE, "404")
        .await
        .unwrap()
        .unwrap();
    assert!(lookup.reason.contains("404"));

    let missing = gap::find_missing_ids(&pipeline.services, &GapQuery::default()).await.unwrap();
    let ids: Vec<i64> = missing.iter().map(|m| m.tmdb_id).collect();
    assert_eq!(ids, vec![405]);
}
