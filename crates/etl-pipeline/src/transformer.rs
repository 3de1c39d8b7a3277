//! Record → document transformers.
//!
//! Transformers are pure. Missing optional scalars are normalized here
//! rather than in the documents' serde attributes.

use etl_types::{
    FilmDocument, FilmWorkRecord, GenreDocument, GenreRecord, IndexDocument, NamedRef,
    PersonDocument, PersonRecord, Role,
};
use serde::de::DeserializeOwned;

use crate::error::PipelineError;

/// Reshape one enriched record into the document an index stores.
pub trait Transform: Send + Sync {
    type Record: DeserializeOwned + Send;
    type Document: IndexDocument;

    fn transform(&self, record: Self::Record) -> Result<Self::Document, PipelineError>;
}

fn require_id(kind: &str, id: &str) -> Result<(), PipelineError> {
    if id.trim().is_empty() {
        return Err(PipelineError::Transform(format!("{} record without id", kind)));
    }
    Ok(())
}

/// Film works into movies-index documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilmTransformer;

impl Transform for FilmTransformer {
    type Record = FilmWorkRecord;
    type Document = FilmDocument;

    fn transform(&self, record: FilmWorkRecord) -> Result<FilmDocument, PipelineError> {
        require_id("film work", &record.id)?;

        let imdb_rating = match record.rating {
            Some(r) if !r.is_finite() => {
                return Err(PipelineError::Transform(format!(
                    "film work {}: rating is not a number",
                    record.id
                )))
            }
            Some(r) => (r * 10.0).round() / 10.0,
            None => 0.0,
        };

        let mut actors = Vec::new();
        let mut writers = Vec::new();
        let mut directors = Vec::new();
        for person in record.persons {
            let target = match person.role {
                Role::Actor => &mut actors,
                Role::Writer => &mut writers,
                Role::Director => &mut directors,
                Role::Other => continue,
            };
            target.push(NamedRef {
                id: person.id,
                name: person.name,
            });
        }
        let names = |refs: &[NamedRef]| refs.iter().map(|r| r.name.clone()).collect::<Vec<_>>();

        Ok(FilmDocument {
            fw_type: record.kind,
            rars_rating: record.age_limit.unwrap_or(0),
            title: record.title,
            description: record.description.unwrap_or_default(),
            imdb_rating,
            genre: names(&record.genres),
            mark: names(&record.marks),
            genres: record.genres,
            actors_names: names(&actors),
            writers_names: names(&writers),
            directors_names: names(&directors),
            actors,
            writers,
            directors,
            id: record.id,
        })
    }
}

/// Persons into persons-index documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonTransformer;

impl Transform for PersonTransformer {
    type Record = PersonRecord;
    type Document = PersonDocument;

    fn transform(&self, record: PersonRecord) -> Result<PersonDocument, PipelineError> {
        require_id("person", &record.id)?;
        Ok(PersonDocument {
            id: record.id,
            full_name: record.full_name,
            movies: record.movies,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenreTransformer;

impl Transform for GenreTransformer {
    type Record = GenreRecord;
    type Document = GenreDocument;

    fn transform(&self, record: GenreRecord) -> Result<GenreDocument, PipelineError> {
        require_id("genre", &record.id)?;
        Ok(GenreDocument {
            id: record.id,
            name: record.name,
        })
    }
}
