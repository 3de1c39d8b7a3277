//! Destination documents, one per index.
//!
//! These mirror the index mappings the search API reads. The document id is
//! addressed separately in the bulk request, so fields the index does not
//! store (`modified`, and `id` for persons and genres) are never serialized.

use serde::Serialize;

use crate::record::{NamedRef, RoleMovies};

/// A document that can be written to a search index by id.
pub trait IndexDocument: Serialize + Send + Sync {
    /// The `_id` this document is upserted under.
    fn document_id(&self) -> &str;
}

/// Document stored in the movies index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilmDocument {
    pub id: String,
    pub fw_type: String,
    pub rars_rating: i32,
    pub title: String,
    pub description: String,
    pub imdb_rating: f64,
    pub genres: Vec<NamedRef>,
    pub genre: Vec<String>,
    pub mark: Vec<String>,
    pub actors: Vec<NamedRef>,
    pub writers: Vec<NamedRef>,
    pub directors: Vec<NamedRef>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub directors_names: Vec<String>,
}

impl IndexDocument for FilmDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}

/// Document stored in the persons index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonDocument {
    #[serde(skip_serializing)]
    pub id: String,
    pub full_name: String,
    pub movies: Vec<RoleMovies>,
}

impl IndexDocument for PersonDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}

/// Document stored in the genres index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreDocument {
    #[serde(skip_serializing)]
    pub id: String,
    pub name: String,
}

impl IndexDocument for GenreDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_document_omits_id() {
        let doc = PersonDocument {
            id: "p1".to_string(),
            full_name: "George Lucas".to_string(),
            movies: vec![],
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(doc.document_id(), "p1");
        assert!(json.get("id").is_none());
        assert_eq!(json["full_name"], "George Lucas");
    }

    #[test]
    fn test_genre_document_omits_id() {
        let doc = GenreDocument {
            id: "g1".to_string(),
            name: "Drama".to_string(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Drama"}));
    }
}
