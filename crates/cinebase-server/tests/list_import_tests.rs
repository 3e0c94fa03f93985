//! Curated list imports end to end: orchestrator, pages, completion checker

mod common;

use cinebase_server::ingest::lists::{self, completion::CHECKS_EXHAUSTED, ListImportStatus};
use cinebase_server::ingest::{jobs::workers, ImportError, IngestConfig};
use cinebase_server::notify::ImportEvent;
use cinebase_server::queue::{JobFilter, JobState};
use cinebase_server::sources::{ListItem, SourceError};
use cinebase_server::store::MovieStore;
use common::{details, TestPipeline};

fn item(tmdb_id: i64, position: i32) -> ListItem {
    ListItem {
        tmdb_id,
        title: format!("Movie {}", tmdb_id),
        position: Some(position),
    }
}

#[tokio::test]
async fn test_list_import_completes_after_all_pages() {
    let pipeline = TestPipeline::new();
    for id in 1..=3 {
        pipeline.seed_movie(id, &format!("Movie {}", id), 1990).await;
    }
    pipeline.tmdb.add_movie(details(4, "Movie 4", 1991));
    pipeline.tmdb.add_list(
        "8250",
        vec![Ok(vec![item(1, 1), item(2, 2)]), Ok(vec![item(3, 3), item(4, 4)]), Ok(vec![])],
    );

    lists::queue_import(&pipeline.services, "criterion", "8250").await.unwrap();
    pipeline.drain_all(10).await;

    let view = lists::import_view(&pipeline.services, "criterion").await.unwrap();
    assert_eq!(view.status, Some(ListImportStatus::Completed));
    assert_eq!(view.display, "completed");
    let details = view.details.unwrap();
    assert_eq!(details.total_pages, Some(3));
    assert!(details.finished_at.is_some());
    // Counted when the checker ran, before the queued fetch finished
    assert_eq!(details.total_movies, Some(3));

    // The fetched movie is tagged by the fetch worker afterwards
    assert_eq!(pipeline.store.count_canonical("criterion").await.unwrap(), 4);
    let fetched = pipeline.store.movie_by_tmdb_id(4).await.unwrap().unwrap();
    assert!(fetched.is_canonical("criterion"));

    let names = pipeline.notifier.names();
    assert!(names.contains(&"list_import.started"));
    assert_eq!(names.iter().filter(|n| **n == "list_import.page_processed").count(), 3);
    assert!(names.contains(&"list_import.completed"));
}

#[tokio::test]
async fn test_already_canonical_movies_are_skipped() {
    let pipeline = TestPipeline::new();
    pipeline.seed_movie(1, "Movie 1", 1990).await;
    pipeline.tmdb.add_list("1", vec![Ok(vec![item(1, 1)])]);

    lists::queue_import(&pipeline.services, "short", "1").await.unwrap();
    pipeline.drain_all(10).await;
    lists::queue_import(&pipeline.services, "short", "1").await.unwrap();
    pipeline.drain_all(10).await;

    let skipped: Vec<u32> = pipeline
        .notifier
        .events()
        .into_iter()
        .filter_map(|(_, e)| match e {
            ImportEvent::ListPageProcessed { skipped, .. } => Some(skipped),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![0, 1]);
}

#[tokio::test]
async fn test_empty_list_reports_no_data() {
    let pipeline = TestPipeline::new();
    pipeline.tmdb.add_list("empty", vec![]);

    lists::queue_import(&pipeline.services, "empty", "empty").await.unwrap();
    pipeline.drain_all(10).await;

    let view = lists::import_view(&pipeline.services, "empty").await.unwrap();
    assert_eq!(view.status, Some(ListImportStatus::NoData));
    assert_eq!(view.display, "no_data");
    let pages = JobFilter::worker(workers::LIST_PAGE);
    assert_eq!(pipeline.services.queue.count(&pages).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_list_fails_orchestration() {
    let pipeline = TestPipeline::new();

    lists::queue_import(&pipeline.services, "missing", "404").await.unwrap();
    let summary = pipeline.drain_all(10).await;

    assert_eq!(summary.cancelled, 1);
    let view = lists::import_view(&pipeline.services, "missing").await.unwrap();
    assert_eq!(view.status, Some(ListImportStatus::Failed));
    assert!(view.display.starts_with("failed:list_info_unavailable"));
    let checkers = JobFilter::worker(workers::LIST_COMPLETION);
    assert_eq!(pipeline.services.queue.count(&checkers).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_page_fails_import() {
    let pipeline = TestPipeline::new();
    pipeline.seed_movie(1, "Movie 1", 1990).await;
    pipeline.tmdb.add_list(
        "8250",
        vec![
            Ok(vec![item(1, 1)]),
            Err(SourceError::Forbidden("list 8250 page 2".to_string())),
        ],
    );

    lists::queue_import(&pipeline.services, "criterion", "8250").await.unwrap();
    pipeline.drain_all(10).await;

    let view = lists::import_view(&pipeline.services, "criterion").await.unwrap();
    assert_eq!(view.status, Some(ListImportStatus::Failed));
    assert_eq!(view.display, "failed:1 of 2 pages failed");

    let discarded = JobFilter::worker(workers::LIST_PAGE).states(&[JobState::Discarded]);
    assert_eq!(pipeline.services.queue.count(&discarded).await.unwrap(), 1);
    assert!(pipeline.notifier.names().contains(&"list_import.failed"));
}

#[tokio::test]
async fn test_checker_gives_up_after_max_checks() {
    let mut config = IngestConfig::default();
    config.lists.max_checks = 1;
    let pipeline = TestPipeline::with_config(config);
    pipeline.tmdb.add_list(
        "slow",
        vec![Err(SourceError::RateLimited("tmdb".to_string()))],
    );

    lists::queue_import(&pipeline.services, "slow", "slow").await.unwrap();
    // Orchestrator, then the retrying page and the first check
    pipeline.drain_all(2).await;

    let view = lists::import_view(&pipeline.services, "slow").await.unwrap();
    assert_eq!(view.status, Some(ListImportStatus::Failed));
    assert_eq!(view.display, format!("failed:{}", CHECKS_EXHAUSTED));
}

#[tokio::test]
async fn test_running_import_refuses_second_request() {
    let pipeline = TestPipeline::new();
    pipeline.tmdb.add_list("8250", vec![Ok(vec![item(1, 1)])]);

    lists::queue_import(&pipeline.services, "criterion", "8250").await.unwrap();
    // Pages run; the checker stays scheduled
    pipeline.drain_now().await;

    let second = lists::queue_import(&pipeline.services, "criterion", "8250").await;
    assert!(matches!(second, Err(ImportError::AlreadyRunning(key)) if key == "criterion"));
}
