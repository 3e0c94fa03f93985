//! Postgres-backed movie store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cinebase_common::text::normalize_name;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::models::*;
use super::{MovieStore, StoreError, StoreResult};

const MOVIE_COLUMNS: &str = "id, tmdb_id, imdb_id, title, original_title, release_date, popularity, \
     vote_count, runtime, genres, import_status, failed_criteria, canonical_sources, omdb_data, \
     created_at, updated_at";

const PERSON_COLUMNS: &str = "id, tmdb_id, imdb_id, name, popularity, placeholder";

const NOMINATION_COLUMNS: &str = "id, ceremony_id, category, won, movie_id, pending_tmdb_id, person_id, \
     raw_title, normalized_title, raw_person";

const NOMINATION_COLUMNS_N: &str = "n.id, n.ceremony_id, n.category, n.won, n.movie_id, n.pending_tmdb_id, \
     n.person_id, n.raw_title, n.normalized_title, n.raw_person";

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: i64,
    tmdb_id: i64,
    imdb_id: Option<String>,
    title: String,
    original_title: Option<String>,
    release_date: Option<NaiveDate>,
    popularity: Option<f64>,
    vote_count: Option<i32>,
    runtime: Option<i32>,
    genres: Vec<String>,
    import_status: String,
    failed_criteria: Vec<String>,
    canonical_sources: Value,
    omdb_data: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MovieRow> for Movie {
    type Error = StoreError;

    fn try_from(row: MovieRow) -> Result<Self, Self::Error> {
        Ok(Movie {
            import_status: row.import_status.parse().map_err(StoreError::Corrupt)?,
            id: row.id,
            tmdb_id: row.tmdb_id,
            imdb_id: row.imdb_id,
            title: row.title,
            original_title: row.original_title,
            release_date: row.release_date,
            popularity: row.popularity,
            vote_count: row.vote_count,
            runtime: row.runtime,
            genres: row.genres,
            failed_criteria: row.failed_criteria,
            canonical_sources: row.canonical_sources,
            omdb_data: row.omdb_data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PersonRow {
    id: i64,
    tmdb_id: Option<i64>,
    imdb_id: Option<String>,
    name: String,
    popularity: Option<f64>,
    placeholder: bool,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Person {
            id: row.id,
            tmdb_id: row.tmdb_id,
            imdb_id: row.imdb_id,
            name: row.name,
            popularity: row.popularity,
            placeholder: row.placeholder,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NominationRow {
    id: i64,
    ceremony_id: i64,
    category: String,
    won: bool,
    movie_id: Option<i64>,
    pending_tmdb_id: Option<i64>,
    person_id: Option<i64>,
    raw_title: String,
    normalized_title: String,
    raw_person: Option<String>,
}

impl From<NominationRow> for Nomination {
    fn from(row: NominationRow) -> Self {
        Nomination {
            id: row.id,
            ceremony_id: row.ceremony_id,
            category: row.category,
            won: row.won,
            movie_id: row.movie_id,
            pending_tmdb_id: row.pending_tmdb_id,
            person_id: row.person_id,
            raw_title: row.raw_title,
            normalized_title: row.normalized_title,
            raw_person: row.raw_person,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkedNominationRow {
    #[sqlx(flatten)]
    nomination: NominationRow,
    movie_tmdb_id: Option<i64>,
    placeholder_person: bool,
}

#[derive(sqlx::FromRow)]
struct CeremonyRow {
    id: i64,
    festival: String,
    year: i32,
    source_format: String,
    imported_at: DateTime<Utc>,
}

impl From<CeremonyRow> for Ceremony {
    fn from(row: CeremonyRow) -> Self {
        Ceremony {
            id: row.id,
            festival: row.festival,
            year: row.year,
            source_format: row.source_format,
            imported_at: row.imported_at,
        }
    }
}

#[derive(Clone)]
pub struct PgMovieStore {
    pool: PgPool,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_movie<T>(&self, column: &str, value: T) -> StoreResult<Option<Movie>>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let sql = format!("SELECT {} FROM movies WHERE {} = $1", MOVIE_COLUMNS, column);
        let row: Option<MovieRow> = sqlx::query_as(&sql).bind(value).fetch_optional(&self.pool).await?;
        row.map(Movie::try_from).transpose()
    }

    /// Rows already recorded for the nomination's ceremony and category,
    /// with their resolved links
    async fn category_links(
        conn: &mut PgConnection,
        ceremony_id: i64,
        category: &str,
    ) -> StoreResult<Vec<(Nomination, NominationLinks)>> {
        let sql = format!(
            r#"
            SELECT {}, m.tmdb_id AS movie_tmdb_id, COALESCE(p.placeholder, FALSE) AS placeholder_person
            FROM nominations n
            LEFT JOIN movies m ON m.id = n.movie_id
            LEFT JOIN people p ON p.id = n.person_id
            WHERE n.ceremony_id = $1 AND n.category = $2
            ORDER BY n.id
            "#,
            NOMINATION_COLUMNS_N
        );
        let rows: Vec<LinkedNominationRow> = sqlx::query_as(&sql)
            .bind(ceremony_id)
            .bind(category)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let nomination = Nomination::from(row.nomination);
                let links = NominationLinks {
                    movie_id: nomination.movie_id,
                    pending_tmdb_id: nomination.pending_tmdb_id,
                    tmdb_id: row.movie_tmdb_id.or(nomination.pending_tmdb_id),
                    person_id: nomination.person_id,
                    placeholder_person: row.placeholder_person,
                    normalized_title: nomination.normalized_title.clone(),
                    raw_person: nomination.raw_person.clone(),
                };
                (nomination, links)
            })
            .collect())
    }

    async fn new_links(conn: &mut PgConnection, new: &NewNomination) -> StoreResult<NominationLinks> {
        let movie_tmdb_id: Option<i64> = match new.movie_id {
            Some(id) => sqlx::query_scalar("SELECT tmdb_id FROM movies WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?,
            None => None,
        };
        let placeholder_person: bool = match new.person_id {
            Some(id) => sqlx::query_scalar("SELECT placeholder FROM people WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .unwrap_or(false),
            None => false,
        };
        Ok(NominationLinks {
            movie_id: new.movie_id,
            pending_tmdb_id: new.pending_tmdb_id,
            tmdb_id: movie_tmdb_id.or(new.pending_tmdb_id),
            person_id: new.person_id,
            placeholder_person,
            normalized_title: new.normalized_title.clone(),
            raw_person: new.raw_person.clone(),
        })
    }

    async fn insert_movie_tx(
        tx: &mut Transaction<'_, Postgres>,
        movie: &NewMovie,
        status: ImportStatus,
        failed_criteria: &[String],
    ) -> StoreResult<Option<Movie>> {
        let sql = format!(
            r#"
            INSERT INTO movies (tmdb_id, imdb_id, title, original_title, release_date, popularity,
                                vote_count, runtime, genres, import_status, failed_criteria)
            VALUES ($1,
                    CASE WHEN EXISTS (SELECT 1 FROM movies WHERE imdb_id = $2) THEN NULL ELSE $2 END,
                    $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tmdb_id) DO NOTHING
            RETURNING {}
            "#,
            MOVIE_COLUMNS
        );
        let genres: Vec<String> = if status == ImportStatus::Full {
            movie.genres.clone()
        } else {
            Vec::new()
        };
        let row: Option<MovieRow> = sqlx::query_as(&sql)
            .bind(movie.tmdb_id)
            .bind(&movie.imdb_id)
            .bind(&movie.title)
            .bind(&movie.original_title)
            .bind(movie.release_date)
            .bind(movie.popularity)
            .bind(movie.vote_count)
            .bind(movie.runtime)
            .bind(&genres)
            .bind(status.as_str())
            .bind(failed_criteria)
            .fetch_optional(&mut **tx)
            .await?;
        let inserted = row.map(Movie::try_from).transpose()?;
        if let Some(stored) = &inserted {
            if stored.imdb_id.is_none() && movie.imdb_id.is_some() {
                warn!(
                    tmdb_id = movie.tmdb_id,
                    imdb_id = movie.imdb_id.as_deref(),
                    "IMDb id already belongs to another movie, stored without it"
                );
            }
        }
        Ok(inserted)
    }

    async fn upsert_person_tx(tx: &mut Transaction<'_, Postgres>, person: &NewPerson) -> StoreResult<Person> {
        let select = format!(
            "SELECT {} FROM people WHERE ($1::bigint IS NOT NULL AND tmdb_id = $1) \
             OR ($2::text IS NOT NULL AND imdb_id = $2) ORDER BY id LIMIT 1",
            PERSON_COLUMNS
        );
        let existing: Option<PersonRow> = sqlx::query_as(&select)
            .bind(person.tmdb_id)
            .bind(&person.imdb_id)
            .fetch_optional(&mut **tx)
            .await?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        let insert = format!(
            "INSERT INTO people (tmdb_id, imdb_id, name, normalized_name, popularity, placeholder) \
             VALUES ($1, $2, $3, $4, $5, FALSE) RETURNING {}",
            PERSON_COLUMNS
        );
        let row: PersonRow = sqlx::query_as(&insert)
            .bind(person.tmdb_id)
            .bind(&person.imdb_id)
            .bind(&person.name)
            .bind(normalize_name(&person.name))
            .bind(person.popularity)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        self.fetch_movie("id", id).await
    }

    async fn movie_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Movie>> {
        self.fetch_movie("tmdb_id", tmdb_id).await
    }

    async fn movie_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Movie>> {
        self.fetch_movie("imdb_id", imdb_id.to_string()).await
    }

    async fn known_tmdb_ids(&self) -> StoreResult<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT tmdb_id FROM movies")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn movies_near_year(&self, year: Option<i32>, tolerance: i32, limit: usize) -> StoreResult<Vec<Movie>> {
        let sql = format!(
            r#"
            SELECT {} FROM movies
            WHERE $1::int IS NULL
               OR EXTRACT(YEAR FROM release_date) BETWEEN $1 - $2 AND $1 + $2
            ORDER BY popularity DESC NULLS LAST, id
            LIMIT $3
            "#,
            MOVIE_COLUMNS
        );
        let rows: Vec<MovieRow> = sqlx::query_as(&sql)
            .bind(year)
            .bind(tolerance)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Movie::try_from).collect()
    }

    async fn insert_full_movie(&self, movie: NewMovie, credits: Vec<NewCredit>) -> StoreResult<Movie> {
        let mut tx = self.pool.begin().await?;

        let Some(stored) = Self::insert_movie_tx(&mut tx, &movie, ImportStatus::Full, &[]).await? else {
            tx.rollback().await?;
            debug!(tmdb_id = movie.tmdb_id, "Movie already stored");
            return self
                .movie_by_tmdb_id(movie.tmdb_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Movie", movie.tmdb_id));
        };

        for credit in &credits {
            let person = Self::upsert_person_tx(&mut tx, &credit.person).await?;
            sqlx::query(
                r#"
                INSERT INTO credits (movie_id, person_id, kind, role, department, billing_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(stored.id)
            .bind(person.id)
            .bind(credit.kind.as_str())
            .bind(&credit.role)
            .bind(&credit.department)
            .bind(credit.order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn insert_soft_movie(&self, movie: NewMovie, failed_criteria: Vec<String>) -> StoreResult<Movie> {
        let mut tx = self.pool.begin().await?;
        let inserted = Self::insert_movie_tx(&mut tx, &movie, ImportStatus::Soft, &failed_criteria).await?;
        tx.commit().await?;
        match inserted {
            Some(stored) => Ok(stored),
            None => self
                .movie_by_tmdb_id(movie.tmdb_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Movie", movie.tmdb_id)),
        }
    }

    async fn update_omdb(&self, movie_id: i64, data: Value) -> StoreResult<()> {
        let result = sqlx::query("UPDATE movies SET omdb_data = $2, updated_at = NOW() WHERE id = $1")
            .bind(movie_id)
            .bind(data)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Movie", movie_id));
        }
        Ok(())
    }

    async fn movie_credits(&self, movie_id: i64) -> StoreResult<Vec<MovieCredit>> {
        let rows: Vec<(i64, Option<i64>, Option<String>, String, Option<f64>, bool, String, String, Option<String>, Option<i32>)> =
            sqlx::query_as(
                r#"
                SELECT p.id, p.tmdb_id, p.imdb_id, p.name, p.popularity, p.placeholder,
                       c.kind, c.role, c.department, c.billing_order
                FROM credits c
                JOIN people p ON p.id = c.person_id
                WHERE c.movie_id = $1
                ORDER BY c.kind, c.billing_order NULLS LAST, p.id
                "#,
            )
            .bind(movie_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, tmdb_id, imdb_id, name, popularity, placeholder, kind, role, department, order)| {
                Ok(MovieCredit {
                    person: Person {
                        id,
                        tmdb_id,
                        imdb_id,
                        name,
                        popularity,
                        placeholder,
                    },
                    kind: kind.parse().map_err(StoreError::Corrupt)?,
                    role,
                    department,
                    order,
                })
            })
            .collect()
    }

    async fn mark_canonical(&self, movie_id: i64, list_key: &str, entry: CanonicalEntry) -> StoreResult<bool> {
        let entry = serde_json::to_value(entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut tx = self.pool.begin().await?;

        let sources: Option<Value> =
            sqlx::query_scalar("SELECT canonical_sources FROM movies WHERE id = $1 FOR UPDATE")
                .bind(movie_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(sources) = sources else {
            return Err(StoreError::not_found("Movie", movie_id));
        };
        if sources.get(list_key).is_some() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE movies SET canonical_sources = canonical_sources || jsonb_build_object($2::text, $3::jsonb), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(movie_id)
        .bind(list_key)
        .bind(entry)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn count_canonical(&self, list_key: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE canonical_sources ? $1")
            .bind(list_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn person_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Person>> {
        let sql = format!("SELECT {} FROM people WHERE imdb_id = $1", PERSON_COLUMNS);
        let row: Option<PersonRow> = sqlx::query_as(&sql).bind(imdb_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Person::from))
    }

    async fn person_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Person>> {
        let sql = format!("SELECT {} FROM people WHERE tmdb_id = $1", PERSON_COLUMNS);
        let row: Option<PersonRow> = sqlx::query_as(&sql).bind(tmdb_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Person::from))
    }

    async fn upsert_person(&self, person: NewPerson) -> StoreResult<Person> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::upsert_person_tx(&mut tx, &person).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn placeholder_person(&self, name: &str) -> StoreResult<Person> {
        let normalized = normalize_name(name);
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('placeholder:' || $1))")
            .bind(&normalized)
            .execute(&mut *tx)
            .await?;

        let select = format!(
            "SELECT {} FROM people WHERE placeholder AND normalized_name = $1 ORDER BY id LIMIT 1",
            PERSON_COLUMNS
        );
        let existing: Option<PersonRow> = sqlx::query_as(&select)
            .bind(&normalized)
            .fetch_optional(&mut *tx)
            .await?;
        let person = match existing {
            Some(row) => row.into(),
            None => {
                let insert = format!(
                    "INSERT INTO people (name, normalized_name, placeholder) VALUES ($1, $2, TRUE) RETURNING {}",
                    PERSON_COLUMNS
                );
                let row: PersonRow = sqlx::query_as(&insert)
                    .bind(name.trim())
                    .bind(&normalized)
                    .fetch_one(&mut *tx)
                    .await?;
                row.into()
            },
        };
        tx.commit().await?;
        Ok(person)
    }

    async fn ceremony(&self, festival: &str, year: i32) -> StoreResult<Option<Ceremony>> {
        let row: Option<CeremonyRow> = sqlx::query_as(
            "SELECT id, festival, year, source_format, imported_at FROM ceremonies WHERE festival = $1 AND year = $2",
        )
        .bind(festival)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Ceremony::from))
    }

    async fn upsert_ceremony(&self, festival: &str, year: i32, source_format: &str) -> StoreResult<Ceremony> {
        let row: CeremonyRow = sqlx::query_as(
            r#"
            INSERT INTO ceremonies (festival, year, source_format)
            VALUES ($1, $2, $3)
            ON CONFLICT (festival, year) DO UPDATE SET festival = EXCLUDED.festival
            RETURNING id, festival, year, source_format, imported_at
            "#,
        )
        .bind(festival)
        .bind(year)
        .bind(source_format)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn ceremony_years(&self, festival: &str) -> StoreResult<Vec<i32>> {
        let years = sqlx::query_scalar("SELECT year FROM ceremonies WHERE festival = $1 ORDER BY year")
            .bind(festival)
            .fetch_all(&self.pool)
            .await?;
        Ok(years)
    }

    async fn insert_nomination(&self, new: NewNomination) -> StoreResult<NominationWrite> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(new.ceremony_id)
            .execute(&mut *tx)
            .await?;

        let incoming = Self::new_links(&mut *tx, &new).await?;
        let stored = Self::category_links(&mut *tx, new.ceremony_id, &new.category).await?;
        if let Some((existing, links)) = stored.into_iter().find(|(_, links)| links.same_nomination(&incoming)) {
            let Some(upgrade) = links.upgrade_with(&incoming) else {
                tx.rollback().await?;
                return Ok(NominationWrite::Duplicate);
            };
            let sql = format!(
                "UPDATE nominations SET movie_id = $2, pending_tmdb_id = $3, person_id = $4 \
                 WHERE id = $1 RETURNING {}",
                NOMINATION_COLUMNS
            );
            let row: NominationRow = sqlx::query_as(&sql)
                .bind(existing.id)
                .bind(upgrade.movie_id)
                .bind(upgrade.pending_tmdb_id)
                .bind(upgrade.person_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(NominationWrite::Upgraded(row.into()));
        }

        let sql = format!(
            r#"
            INSERT INTO nominations (ceremony_id, category, won, movie_id, pending_tmdb_id, person_id,
                                     raw_title, normalized_title, raw_person)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            NOMINATION_COLUMNS
        );
        let row: NominationRow = sqlx::query_as(&sql)
            .bind(new.ceremony_id)
            .bind(&new.category)
            .bind(new.won)
            .bind(new.movie_id)
            .bind(new.pending_tmdb_id)
            .bind(new.person_id)
            .bind(&new.raw_title)
            .bind(&new.normalized_title)
            .bind(&new.raw_person)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(NominationWrite::Inserted(row.into()))
    }

    async fn nominations(&self, ceremony_id: i64) -> StoreResult<Vec<Nomination>> {
        let sql = format!(
            "SELECT {} FROM nominations WHERE ceremony_id = $1 ORDER BY id",
            NOMINATION_COLUMNS
        );
        let rows: Vec<NominationRow> = sqlx::query_as(&sql).bind(ceremony_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Nomination::from).collect())
    }

    async fn resolve_pending_nominations(&self, tmdb_id: i64, movie_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE nominations SET movie_id = $2, pending_tmdb_id = NULL WHERE pending_tmdb_id = $1",
        )
        .bind(tmdb_id)
        .bind(movie_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_failed_lookup(&self, lookup: FailedLookup) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_lookups (source, identifier, reason, context)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source, identifier)
            DO UPDATE SET reason = EXCLUDED.reason, context = EXCLUDED.context, recorded_at = NOW()
            "#,
        )
        .bind(&lookup.source)
        .bind(&lookup.identifier)
        .bind(&lookup.reason)
        .bind(&lookup.context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn failed_lookup(&self, source: &str, identifier: &str) -> StoreResult<Option<FailedLookup>> {
        let row: Option<(String, String, String, Value)> = sqlx::query_as(
            "SELECT source, identifier, reason, context FROM failed_lookups WHERE source = $1 AND identifier = $2",
        )
        .bind(source)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(source, identifier, reason, context)| FailedLookup {
            source,
            identifier,
            reason,
            context,
        }))
    }

    async fn failed_identifiers(&self, source: &str) -> StoreResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT identifier FROM failed_lookups WHERE source = $1")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn record_collaboration(&self, person_a: i64, person_b: i64, movie_id: i64) -> StoreResult<bool> {
        let (a, b) = (person_a.min(person_b), person_a.max(person_b));
        let result = sqlx::query(
            "INSERT INTO collaborations (person_a, person_b, movie_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(a)
        .bind(b)
        .bind(movie_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn collaboration_count(&self, person_a: i64, person_b: i64) -> StoreResult<i64> {
        let (a, b) = (person_a.min(person_b), person_a.max(person_b));
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM collaborations WHERE person_a = $1 AND person_b = $2")
            .bind(a)
            .bind(b)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
