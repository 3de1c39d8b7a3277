//! Enriched aggregate records as produced by the source enrichment queries.
//!
//! Records are decoded from the JSON object each enrichment query builds per
//! aggregate root. They are immutable once yielded by an extraction worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role a person plays in a film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Actor,
    Writer,
    Director,
    /// Any role the index does not partition on
    #[serde(other)]
    Other,
}

/// Id plus display name of a related entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A person linked to a film work, tagged with the role they played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePerson {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// Film work aggregate: the root row plus every related-entity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWorkRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub age_limit: Option<i32>,
    /// Film work type ("movie", "tv_show", ...)
    #[serde(rename = "type")]
    pub kind: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub persons: Vec<RolePerson>,
    #[serde(default)]
    pub genres: Vec<NamedRef>,
    #[serde(default)]
    pub marks: Vec<NamedRef>,
}

/// Short film reference embedded in person records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieRef {
    pub id: String,
    pub title: String,
}

/// Films a person took part in, grouped under one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMovies {
    pub role: String,
    pub movies: Vec<MovieRef>,
}

/// Person aggregate for the persons index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub full_name: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub movies: Vec<RoleMovies>,
}

/// Genre row for the genres index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreRecord {
    pub id: String,
    pub name: String,
    pub modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_film_work_from_enrichment_json() {
        let json = serde_json::json!({
            "id": "3d825f60-9fff-4dfe-b294-1a45fa1e115d",
            "title": "Star Wars: Episode IV - A New Hope",
            "description": null,
            "rating": 8.6,
            "age_limit": 12,
            "type": "movie",
            "modified": "2021-06-16T20:14:09.221+00:00",
            "persons": [
                {"id": "p1", "name": "Mark Hamill", "role": "actor"},
                {"id": "p2", "name": "George Lucas", "role": "director"},
                {"id": "p3", "name": "Someone", "role": "producer"}
            ],
            "genres": [{"id": "g1", "name": "Sci-Fi"}],
            "marks": []
        });

        let record: FilmWorkRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.kind, "movie");
        assert!(record.description.is_none());
        assert_eq!(record.persons.len(), 3);
        assert_eq!(record.persons[1].role, Role::Director);
        assert_eq!(record.persons[2].role, Role::Other);
        assert_eq!(record.genres, vec![NamedRef::new("g1", "Sci-Fi")]);
    }

    #[test]
    fn test_film_work_missing_lists_default_empty() {
        let json = serde_json::json!({
            "id": "1",
            "title": "t",
            "type": "movie",
            "modified": "2021-06-16T20:14:09Z"
        });
        let record: FilmWorkRecord = serde_json::from_value(json).unwrap();
        assert!(record.persons.is_empty());
        assert!(record.rating.is_none());
        assert!(record.age_limit.is_none());
    }

    #[test]
    fn test_film_work_missing_title_is_error() {
        let json = serde_json::json!({"id": "1", "type": "movie", "modified": "2021-06-16T20:14:09Z"});
        assert!(serde_json::from_value::<FilmWorkRecord>(json).is_err());
    }

    #[test]
    fn test_person_record() {
        let json = serde_json::json!({
            "id": "p1",
            "full_name": "George Lucas",
            "modified": "2021-06-16T20:14:09Z",
            "movies": [{"role": "director", "movies": [{"id": "f1", "title": "A New Hope"}]}]
        });
        let record: PersonRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.movies[0].role, "director");
        assert_eq!(record.movies[0].movies[0].title, "A New Hope");
    }
}
