//! Ceremony document formats
//!
//! Three shapes are understood, tried in this order:
//!
//! 1. An IMDb event page, with the nominations in the `__NEXT_DATA__` script
//!    (or that JSON on its own)
//! 2. `{"categories": [{"name", "nominees": [...]}]}`
//! 3. `{"awards": [{"category", "title", ...}]}`

use cinebase_common::ids::ImdbId;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyFormat {
    ImdbNextData,
    Categories,
    FlatAwards,
}

impl CeremonyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyFormat::ImdbNextData => "imdb_next_data",
            CeremonyFormat::Categories => "categories",
            CeremonyFormat::FlatAwards => "awards",
        }
    }
}

impl fmt::Display for CeremonyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unrecognized ceremony document")]
    Unknown,

    #[error("Malformed {format} document: {message}")]
    Malformed { format: CeremonyFormat, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPerson {
    pub name: String,
    pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNomination {
    pub category: String,
    pub won: bool,
    pub title: String,
    /// Release year when the document carries one
    pub year: Option<i32>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub people: Vec<ParsedPerson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCeremony {
    pub format: CeremonyFormat,
    pub nominations: Vec<ParsedNomination>,
}

/// Keep an IMDb id only when it is well formed and of the expected kind.
fn valid_imdb(raw: Option<String>, title: bool) -> Option<String> {
    let id: ImdbId = raw?.parse().ok()?;
    (id.is_title() == title).then(|| id.as_str().to_string())
}

pub fn parse_ceremony(body: &str) -> Result<ParsedCeremony, FormatError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let data = next_data(trimmed).ok_or(FormatError::Unknown)?;
        return parse_next_data(&data);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|_| FormatError::Unknown)?;
    if value.pointer("/props/pageProps").is_some() {
        parse_next_data(&value)
    } else if value.get("categories").is_some_and(Value::is_array) {
        parse_categories(value)
    } else if value.get("awards").is_some_and(Value::is_array) {
        parse_flat(value)
    } else {
        Err(FormatError::Unknown)
    }
}

fn next_data(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let script = document.select(&selector).next()?;
    let text: String = script.text().collect();
    serde_json::from_str(&text).ok()
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn imdb_people(entities: &Value, key: &str) -> Vec<ParsedPerson> {
    array_at(entities, key)
        .iter()
        .filter_map(|n| {
            Some(ParsedPerson {
                name: text_at(n, "/name/nameText/text")?,
                imdb_id: valid_imdb(text_at(n, "/name/id"), false),
            })
        })
        .collect()
}

/// Walk `edition.awards[].nominationCategories.edges[].node.nominations`.
///
/// Film awards list the film under `awardTitles` and credited people under
/// `secondaryAwardNames`; acting awards are the other way round.
fn parse_next_data(data: &Value) -> Result<ParsedCeremony, FormatError> {
    let edition = data
        .pointer("/props/pageProps/edition")
        .ok_or_else(|| FormatError::Malformed {
            format: CeremonyFormat::ImdbNextData,
            message: "missing props.pageProps.edition".to_string(),
        })?;

    let mut nominations = Vec::new();
    for award in array_at(edition, "/awards") {
        for category_edge in array_at(award, "/nominationCategories/edges") {
            let category = text_at(category_edge, "/node/category/text")
                .or_else(|| text_at(award, "/text"))
                .unwrap_or_else(|| "Unknown".to_string());

            for nomination_edge in array_at(category_edge, "/node/nominations/edges") {
                let node = &nomination_edge["node"];
                let entities = &node["awardedEntities"];
                let titles = match array_at(entities, "/awardTitles") {
                    [] => array_at(entities, "/secondaryAwardTitles"),
                    titles => titles,
                };
                let Some(film) = titles.first() else {
                    continue;
                };
                let Some(title) = text_at(film, "/title/titleText/text") else {
                    continue;
                };
                let mut people = imdb_people(entities, "/awardNames");
                people.extend(imdb_people(entities, "/secondaryAwardNames"));

                nominations.push(ParsedNomination {
                    category: category.clone(),
                    won: node["isWinner"].as_bool().unwrap_or(false),
                    title,
                    year: film
                        .pointer("/title/releaseDate/year")
                        .and_then(Value::as_i64)
                        .and_then(|y| i32::try_from(y).ok()),
                    imdb_id: valid_imdb(text_at(film, "/title/id"), true),
                    tmdb_id: None,
                    people,
                });
            }
        }
    }

    Ok(ParsedCeremony {
        format: CeremonyFormat::ImdbNextData,
        nominations,
    })
}

#[derive(Debug, Deserialize)]
struct JsonPerson {
    name: String,
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonNominee {
    title: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    tmdb_id: Option<i64>,
    #[serde(default, alias = "winner")]
    won: bool,
    #[serde(default)]
    people: Vec<JsonPerson>,
}

#[derive(Debug, Deserialize)]
struct JsonCategory {
    name: String,
    nominees: Vec<JsonNominee>,
}

#[derive(Debug, Deserialize)]
struct CategoriesDocument {
    categories: Vec<JsonCategory>,
}

fn convert_people(people: Vec<JsonPerson>) -> Vec<ParsedPerson> {
    people
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .map(|p| ParsedPerson {
            name: p.name.trim().to_string(),
            imdb_id: valid_imdb(p.imdb_id, false),
        })
        .collect()
}

fn parse_categories(value: Value) -> Result<ParsedCeremony, FormatError> {
    let document: CategoriesDocument = serde_json::from_value(value).map_err(|e| FormatError::Malformed {
        format: CeremonyFormat::Categories,
        message: e.to_string(),
    })?;

    let nominations = document
        .categories
        .into_iter()
        .flat_map(|category| {
            let name = category.name;
            category.nominees.into_iter().map(move |n| ParsedNomination {
                category: name.clone(),
                won: n.won,
                title: n.title.trim().to_string(),
                year: n.year,
                imdb_id: valid_imdb(n.imdb_id, true),
                tmdb_id: n.tmdb_id,
                people: convert_people(n.people),
            })
        })
        .filter(|n| !n.title.is_empty())
        .collect();

    Ok(ParsedCeremony {
        format: CeremonyFormat::Categories,
        nominations,
    })
}

#[derive(Debug, Deserialize)]
struct FlatAward {
    category: String,
    title: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    tmdb_id: Option<i64>,
    #[serde(default, alias = "won")]
    winner: bool,
    #[serde(default)]
    person: Option<String>,
    #[serde(default)]
    person_imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatDocument {
    awards: Vec<FlatAward>,
}

fn parse_flat(value: Value) -> Result<ParsedCeremony, FormatError> {
    let document: FlatDocument = serde_json::from_value(value).map_err(|e| FormatError::Malformed {
        format: CeremonyFormat::FlatAwards,
        message: e.to_string(),
    })?;

    let nominations = document
        .awards
        .into_iter()
        .filter(|a| !a.title.trim().is_empty())
        .map(|a| ParsedNomination {
            category: a.category,
            won: a.winner,
            title: a.title.trim().to_string(),
            year: a.year,
            imdb_id: valid_imdb(a.imdb_id, true),
            tmdb_id: a.tmdb_id,
            people: convert_people(
                a.person
                    .map(|name| {
                        vec![JsonPerson {
                            name,
                            imdb_id: a.person_imdb_id,
                        }]
                    })
                    .unwrap_or_default(),
            ),
        })
        .collect();

    Ok(ParsedCeremony {
        format: CeremonyFormat::FlatAwards,
        nominations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imdb_page() -> String {
        let data = json!({
            "props": {"pageProps": {"edition": {"awards": [{
                "text": "Palme d'Or",
                "nominationCategories": {"edges": [{
                    "node": {
                        "category": null,
                        "nominations": {"edges": [
                            {"node": {
                                "isWinner": true,
                                "awardedEntities": {
                                    "awardTitles": [{"title": {
                                        "id": "tt6751668",
                                        "titleText": {"text": "Parasite"},
                                        "releaseDate": {"year": 2019}
                                    }}],
                                    "secondaryAwardNames": [{"name": {
                                        "id": "nm0094435",
                                        "nameText": {"text": "Bong Joon Ho"}
                                    }}]
                                }
                            }},
                            {"node": {
                                "isWinner": false,
                                "awardedEntities": {"awardTitles": []}
                            }}
                        ]}
                    }
                }]}
            }]}}}
        });
        format!(
            r#"<html><head></head><body><div id="root"></div><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
            data
        )
    }

    #[test]
    fn test_imdb_event_page() {
        let parsed = parse_ceremony(&imdb_page()).unwrap();
        assert_eq!(parsed.format, CeremonyFormat::ImdbNextData);
        assert_eq!(parsed.nominations.len(), 1);

        let palme = &parsed.nominations[0];
        assert_eq!(palme.category, "Palme d'Or");
        assert!(palme.won);
        assert_eq!(palme.title, "Parasite");
        assert_eq!(palme.year, Some(2019));
        assert_eq!(palme.imdb_id.as_deref(), Some("tt6751668"));
        assert_eq!(
            palme.people,
            vec![ParsedPerson {
                name: "Bong Joon Ho".into(),
                imdb_id: Some("nm0094435".into()),
            }]
        );
    }

    #[test]
    fn test_categories_document() {
        let body = json!({"categories": [{
            "name": "Golden Lion",
            "nominees": [
                {"title": "Nomadland", "year": 2020, "tmdb_id": 581734, "winner": true,
                 "people": [{"name": "Chloé Zhao"}]},
                {"title": "  ", "year": 2020},
                {"title": "Quo Vadis, Aida?", "imdb_id": "not-an-id"}
            ]
        }]})
        .to_string();

        let parsed = parse_ceremony(&body).unwrap();
        assert_eq!(parsed.format, CeremonyFormat::Categories);
        assert_eq!(parsed.nominations.len(), 2);
        assert!(parsed.nominations[0].won);
        assert_eq!(parsed.nominations[0].tmdb_id, Some(581734));
        assert_eq!(parsed.nominations[0].people[0].name, "Chloé Zhao");
        assert_eq!(parsed.nominations[1].imdb_id, None);
    }

    #[test]
    fn test_flat_awards_document() {
        let body = json!({"awards": [
            {"category": "Golden Bear", "title": "Synonyms", "year": 2019, "winner": true,
             "person": "Nadav Lapid", "person_imdb_id": "nm1807386"},
            {"category": "Silver Bear", "title": "By the Grace of God"}
        ]})
        .to_string();

        let parsed = parse_ceremony(&body).unwrap();
        assert_eq!(parsed.format, CeremonyFormat::FlatAwards);
        assert_eq!(parsed.nominations.len(), 2);
        assert_eq!(parsed.nominations[0].people[0].imdb_id.as_deref(), Some("nm1807386"));
        assert!(parsed.nominations[1].people.is_empty());
        assert!(!parsed.nominations[1].won);
    }

    #[test]
    fn test_unknown_documents() {
        assert!(matches!(parse_ceremony("<html><body>nothing</body></html>"), Err(FormatError::Unknown)));
        assert!(matches!(parse_ceremony(r#"{"films": []}"#), Err(FormatError::Unknown)));
        assert!(matches!(parse_ceremony("not json"), Err(FormatError::Unknown)));
    }

    #[test]
    fn test_malformed_known_format() {
        let err = parse_ceremony(r#"{"categories": [{"nominees": []}]}"#).unwrap_err();
        assert!(matches!(
            err,
            FormatError::Malformed {
                format: CeremonyFormat::Categories,
                ..
            }
        ));
    }
}
