//! Festival discovery: ceremony import, reconciliation and pending links

mod common;

use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use cinebase_server::ingest::config::FestivalSpec;
use cinebase_server::ingest::jobs::workers;
use cinebase_server::ingest::{self, festival, ImportError, IngestConfig};
use cinebase_server::progress::{self, keys};
use cinebase_server::queue::runner::JobOutcome;
use cinebase_server::queue::{JobFilter, JobState};
use cinebase_server::sources::PersonCandidate;
use cinebase_server::store::MovieStore;
use common::{candidate, details, director, TestPipeline};

/// A one-category ceremony document
fn ceremony(category: &str, nominees: Value) -> String {
    json!({"categories": [{"name": category, "nominees": nominees}]}).to_string()
}

fn completed_meta(outcome: JobOutcome) -> Value {
    match outcome {
        JobOutcome::Complete(meta) => meta,
        other => panic!("expected a completed job, got {:?}", other),
    }
}

fn ceremony_2020() -> String {
    json!({
        "categories": [
            {
                "name": "Best Film",
                "nominees": [
                    {"title": "Another Round", "year": 2020, "won": true,
                     "people": [{"name": "Thomas Vinterberg"}]},
                    {"title": "Nomadland", "year": 2020, "tmdb_id": 581734,
                     "people": [{"name": "Chloé Zhao"}]}
                ]
            }
        ]
    })
    .to_string()
}

async fn pipeline_with_ceremony() -> TestPipeline {
    let pipeline = TestPipeline::new();
    pipeline
        .tmdb
        .add_movie(director(details(580175, "Another Round", 2020), 77, "Thomas Vinterberg"));
    ingest::queue_fetch(&pipeline.services, 580175).await.unwrap();
    pipeline.drain_now().await;

    pipeline.tmdb.add_movie(details(581734, "Nomadland", 2020));
    pipeline.ceremonies.add("ev0000147", 2020, ceremony_2020());
    pipeline
}

#[tokio::test]
async fn test_ceremony_import_links_films_and_people() {
    let pipeline = pipeline_with_ceremony().await;

    festival::queue_import(&pipeline.services, "cannes", &[2020]).await.unwrap();
    pipeline.drain_all(10).await;

    let ceremony = pipeline.store.ceremony("cannes", 2020).await.unwrap().unwrap();
    let nominations = pipeline.store.nominations(ceremony.id).await.unwrap();
    assert_eq!(nominations.len(), 2);

    let another_round = pipeline.store.movie_by_tmdb_id(580175).await.unwrap().unwrap();
    let nomadland = pipeline.store.movie_by_tmdb_id(581734).await.unwrap().unwrap();

    let winner = nominations.iter().find(|n| n.raw_title == "Another Round").unwrap();
    assert!(winner.won);
    assert_eq!(winner.movie_id, Some(another_round.id));
    let vinterberg = pipeline.store.person_by_tmdb_id(77).await.unwrap().unwrap();
    assert_eq!(winner.person_id, Some(vinterberg.id));

    // The fetch worker resolved the pending link once the film was stored
    let pending = nominations.iter().find(|n| n.raw_title == "Nomadland").unwrap();
    assert_eq!(pending.movie_id, Some(nomadland.id));
    assert_eq!(pending.pending_tmdb_id, None);
    assert_eq!(pending.raw_person.as_deref(), Some("Chloé Zhao"));

    let zhao = pipeline.store.placeholder_person("Chloé Zhao").await.unwrap();
    assert_eq!(pending.person_id, Some(zhao.id));

    let recorded: Value = progress::read(pipeline.services.progress.as_ref(), &keys::festival_import("cannes", 2020))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded["status"], "completed");
    assert_eq!(recorded["summary"]["linked"], 1);
    assert_eq!(recorded["summary"]["pending"], 1);
    assert_eq!(recorded["summary"]["placeholders"], 1);

    assert!(pipeline.notifier.names().contains(&"festival_import.completed"));
}

#[tokio::test]
async fn test_reimport_skips_recorded_nominations() {
    let pipeline = pipeline_with_ceremony().await;
    festival::queue_import(&pipeline.services, "cannes", &[2020]).await.unwrap();
    pipeline.drain_all(10).await;

    let summary = festival::import_year(&pipeline.services, "cannes", 2020).await.unwrap();
    assert_eq!(summary.parsed, 2);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.linked, 2);

    let ceremony = pipeline.store.ceremony("cannes", 2020).await.unwrap().unwrap();
    assert_eq!(pipeline.store.nominations(ceremony.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_ceremony_is_recorded_as_failed() {
    let pipeline = TestPipeline::new();
    festival::queue_import(&pipeline.services, "venice", &[2019]).await.unwrap();
    pipeline.drain_all(5).await;

    let recorded: Value = progress::read(pipeline.services.progress.as_ref(), &keys::festival_import("venice", 2019))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded["status"], "failed");
    assert!(pipeline.store.ceremony("venice", 2019).await.unwrap().is_none());
}

#[tokio::test]
async fn test_queue_import_validates_request() {
    let pipeline = TestPipeline::new();

    let unknown = festival::queue_import(&pipeline.services, "nowhere", &[2020]).await;
    assert!(matches!(unknown, Err(ImportError::UnknownFestival(_))));

    let too_early = festival::queue_import(&pipeline.services, "sundance", &[1970]).await;
    assert!(matches!(too_early, Err(ImportError::InvalidYear { year: 1970, .. })));

    let empty = festival::queue_import(&pipeline.services, "berlin", &[]).await;
    assert!(matches!(empty, Err(ImportError::NoYears)));
}

#[tokio::test]
async fn test_resync_upgrades_unresolved_nomination_in_place() {
    let pipeline = TestPipeline::new();
    pipeline.ceremonies.add(
        "ev0000147",
        2021,
        ceremony(
            "Un Certain Regard",
            json!([{"title": "Obscure Film", "year": 2020, "people": [{"name": "Jane Roe"}]}]),
        ),
    );

    let first = festival::import_year(&pipeline.services, "cannes", 2021).await.unwrap();
    assert_eq!(first.unresolved, 1);
    assert_eq!(first.placeholders, 1);
    assert_eq!(first.inserted, 1);

    // The film and the person become known between the two imports
    let movie = pipeline.seed_movie(4242, "Obscure Film", 2020).await;
    pipeline.tmdb.add_people(
        "Jane Roe",
        vec![PersonCandidate {
            tmdb_id: 9001,
            name: "Jane Roe".into(),
            popularity: Some(3.0),
            known_for: vec!["Obscure Film".into()],
        }],
    );

    let second = festival::import_year(&pipeline.services, "cannes", 2021).await.unwrap();
    assert_eq!(second.linked, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.upgraded, 1);
    assert_eq!(second.duplicates, 0);

    let ceremony = pipeline.store.ceremony("cannes", 2021).await.unwrap().unwrap();
    let nominations = pipeline.store.nominations(ceremony.id).await.unwrap();
    assert_eq!(nominations.len(), 1);
    assert_eq!(nominations[0].movie_id, Some(movie.id));
    let jane = pipeline.store.person_by_tmdb_id(9001).await.unwrap().unwrap();
    assert_eq!(nominations[0].person_id, Some(jane.id));

    // A third pass has nothing left to improve
    let third = festival::import_year(&pipeline.services, "cannes", 2021).await.unwrap();
    assert_eq!((third.inserted, third.upgraded, third.duplicates), (0, 0, 1));
}

#[tokio::test]
async fn test_search_drops_year_only_when_nothing_found() {
    let pipeline = TestPipeline::new();
    pipeline.ceremonies.add(
        "ev0000091",
        2019,
        ceremony(
            "Golden Bear",
            json!([
                {"title": "Synonyms", "year": 2019, "won": true},
                {"title": "Ghost Town Anthology", "year": 2019}
            ]),
        ),
    );
    // Listed under its premiere year in one source and its release year in the other
    pipeline
        .tmdb
        .add_search_for_year("Synonyms", None, vec![candidate(575813, "Synonyms", 2019)]);
    pipeline.tmdb.add_search_for_year(
        "Ghost Town Anthology",
        Some(2019),
        vec![candidate(1, "Holiday Blues", 2019)],
    );
    pipeline.tmdb.add_search_for_year(
        "Ghost Town Anthology",
        None,
        vec![candidate(568160, "Ghost Town Anthology", 2019)],
    );

    let summary = festival::import_year(&pipeline.services, "berlin", 2019).await.unwrap();
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.unresolved, 1);

    let searches = pipeline.tmdb.searches();
    assert!(searches.contains(&("Synonyms".to_string(), Some(2019))));
    assert!(searches.contains(&("Synonyms".to_string(), None)));
    assert!(searches.contains(&("Ghost Town Anthology".to_string(), Some(2019))));
    assert!(!searches.contains(&("Ghost Town Anthology".to_string(), None)));

    let ceremony = pipeline.store.ceremony("berlin", 2019).await.unwrap().unwrap();
    let nominations = pipeline.store.nominations(ceremony.id).await.unwrap();
    let synonyms = nominations.iter().find(|n| n.raw_title == "Synonyms").unwrap();
    assert_eq!(synonyms.pending_tmdb_id, Some(575813));
}

#[tokio::test]
async fn test_import_years_requeues_transient_failures() {
    let mut config = IngestConfig::default();
    config.festivals.concurrency = 2;
    let pipeline = TestPipeline::with_config(config);
    let document = || ceremony("Grand Jury Prize", json!([{"title": "Minding the Gap", "year": 2018}]));
    pipeline.ceremonies.add_delayed("ev0000631", 2016, document(), Duration::from_millis(100));
    pipeline.ceremonies.add_delayed("ev0000631", 2017, document(), Duration::from_millis(100));
    pipeline.ceremonies.add_delayed("ev0000631", 2018, document(), Duration::from_millis(100));
    pipeline.ceremonies.add_unavailable("ev0000631", 2019);

    let outcome = festival::import_years(&pipeline.services, "sundance", &[2016, 2017, 2018, 2019, 2020])
        .await
        .unwrap();
    let meta = completed_meta(outcome);

    let imported: Vec<i64> = meta["imported"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["year"].as_i64().unwrap())
        .collect();
    assert_eq!(imported, vec![2016, 2017, 2018]);
    assert_eq!(meta["failed"], json!([2019, 2020]));
    // 2020 has no event page at all, which is not worth retrying
    assert_eq!(meta["requeued"], json!([2019]));
    assert_eq!(pipeline.ceremonies.max_in_flight(), 2);

    let retry = JobFilter::worker(workers::FESTIVAL)
        .args_contains(json!({"action": "import_year", "festival": "sundance", "year": 2019}))
        .states(&JobState::PENDING);
    assert_eq!(pipeline.services.queue.count(&retry).await.unwrap(), 1);

    let recorded: Value = progress::read(pipeline.services.progress.as_ref(), &keys::festival_import("sundance", 2019))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded["status"], "failed");
}

#[tokio::test]
async fn test_import_years_times_out_slow_year() {
    let mut config = IngestConfig::default();
    config.festivals.year_timeout_secs = 1;
    let pipeline = TestPipeline::with_config(config);
    let document = ceremony("Golden Lion", json!([{"title": "Happening", "year": 2021}]));
    pipeline
        .ceremonies
        .add_delayed("ev0000681", 2020, document.clone(), Duration::from_secs(3));
    pipeline.ceremonies.add("ev0000681", 2021, document);

    let meta = completed_meta(festival::import_years(&pipeline.services, "venice", &[2020, 2021]).await.unwrap());
    assert_eq!(meta["failed"], json!([2020]));
    assert_eq!(meta["requeued"], json!([2020]));
    assert_eq!(meta["imported"][0]["year"], 2021);

    let recorded: Value = progress::read(pipeline.services.progress.as_ref(), &keys::festival_import("venice", 2020))
        .await
        .unwrap()
        .unwrap();
    assert!(recorded["reason"].as_str().unwrap().contains("timed out"));
}

fn recent_festival(first_year: i32) -> IngestConfig {
    let mut config = IngestConfig::default();
    config
        .festivals
        .festivals
        .push(FestivalSpec::new("locarno", "Locarno Film Festival", "ev0000400", first_year));
    config
}

#[tokio::test]
async fn test_sync_missing_queues_years_without_completed_import() {
    let this_year = Utc::now().year();
    let pipeline = TestPipeline::with_config(recent_festival(this_year - 2));
    pipeline.ceremonies.add(
        "ev0000400",
        this_year - 2,
        ceremony("Golden Leopard", json!([{"title": "Mantagheye Payani", "year": this_year - 2}])),
    );
    festival::import_year(&pipeline.services, "locarno", this_year - 2).await.unwrap();

    // An import that died after writing the ceremony row
    pipeline
        .store
        .upsert_ceremony("locarno", this_year - 1, "imdb_next_data")
        .await
        .unwrap();

    let meta = completed_meta(festival::sync_missing(&pipeline.services, "locarno").await.unwrap());
    assert_eq!(meta["missing_years"], json!([this_year - 1, this_year]));
    assert_eq!(meta["jobs"], 1);

    let queued = JobFilter::worker(workers::FESTIVAL)
        .args_contains(json!({"action": "import_years", "years": [this_year - 1, this_year]}));
    assert_eq!(pipeline.services.queue.count(&queued).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resync_all_requeues_stored_years() {
    let this_year = Utc::now().year();
    let pipeline = TestPipeline::with_config(recent_festival(this_year - 5));
    for year in [this_year - 4, this_year - 2] {
        pipeline
            .store
            .upsert_ceremony("locarno", year, "imdb_next_data")
            .await
            .unwrap();
    }

    let meta = completed_meta(festival::resync_all(&pipeline.services, "locarno").await.unwrap());
    assert_eq!(meta["years"], json!([this_year - 4, this_year - 2]));
    assert_eq!(meta["jobs"], 1);

    let queued = JobFilter::worker(workers::FESTIVAL)
        .args_contains(json!({"action": "import_years", "festival": "locarno"}))
        .states(&JobState::PENDING);
    assert_eq!(pipeline.services.queue.count(&queued).await.unwrap(), 1);

    assert!(matches!(
        festival::queue_resync_all(&pipeline.services, "nowhere").await,
        Err(ImportError::UnknownFestival(_))
    ));
}
