//! In-memory source and loader used by the pipeline scenario tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use etl_pipeline::{
    Aggregate, Batch, BulkLoader, ChangeRow, ChangeSource, Entity, LoadError, LoadResult,
    Selection, SourceError,
};
use etl_types::Cursor;
use serde_json::{json, Value};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub name: String,
    pub modified: DateTime<Utc>,
}

impl Row {
    pub fn new(id: &str, name: &str, modified: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            modified,
        }
    }
}

/// Tables of a tiny movies database.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub films: Vec<Row>,
    pub persons: Vec<Row>,
    pub genres: Vec<Row>,
    pub marks: Vec<Row>,
    /// (person_id, film_id, role)
    pub roles: Vec<(String, String, String)>,
    /// (genre_id, film_id)
    pub genre_links: Vec<(String, String)>,
}

impl Catalog {
    pub fn film(&mut self, id: &str, modified: DateTime<Utc>) -> &mut Self {
        self.films.push(Row::new(id, &format!("Film {}", id), modified));
        self
    }

    pub fn person(&mut self, id: &str, modified: DateTime<Utc>) -> &mut Self {
        self.persons.push(Row::new(id, &format!("Person {}", id), modified));
        self
    }

    pub fn genre(&mut self, id: &str, modified: DateTime<Utc>) -> &mut Self {
        self.genres.push(Row::new(id, &format!("Genre {}", id), modified));
        self
    }

    pub fn role(&mut self, person: &str, film: &str, role: &str) -> &mut Self {
        self.roles
            .push((person.to_string(), film.to_string(), role.to_string()));
        self
    }

    pub fn link_genre(&mut self, genre: &str, film: &str) -> &mut Self {
        self.genre_links.push((genre.to_string(), film.to_string()));
        self
    }

    pub fn touch_person(&mut self, id: &str, modified: DateTime<Utc>) {
        if let Some(p) = self.persons.iter_mut().find(|p| p.id == id) {
            p.modified = modified;
        }
    }

    fn table(&self, entity: Entity) -> &[Row] {
        match entity {
            Entity::FilmWork => &self.films,
            Entity::Person => &self.persons,
            Entity::Genre => &self.genres,
            Entity::Mark => &self.marks,
        }
    }

    fn film_row(&self, id: &str) -> Option<&Row> {
        self.films.iter().find(|f| f.id == id)
    }

    fn max(&self, entity: Entity) -> Option<Cursor> {
        self.table(entity)
            .iter()
            .map(|r| Cursor::new(r.modified, r.id.clone()))
            .max()
    }

    fn scan(
        &self,
        selection: Selection,
        from: &DateTime<Utc>,
        root: Option<&DateTime<Utc>>,
    ) -> Vec<ChangeRow> {
        let mut rows: Vec<ChangeRow> = match selection {
            Selection::Root(entity) => self
                .table(entity)
                .iter()
                .filter(|r| r.modified >= *from)
                .map(|r| ChangeRow::new(r.id.clone(), r.modified, r.id.clone()))
                .collect(),
            Selection::Related(entity) => {
                let links: Vec<(String, String)> = match entity {
                    Entity::Person => self
                        .roles
                        .iter()
                        .map(|(p, f, _)| (p.clone(), f.clone()))
                        .collect(),
                    Entity::Genre => self.genre_links.clone(),
                    _ => Vec::new(),
                };
                links
                    .iter()
                    .filter_map(|(related_id, film_id)| {
                        let related = self.table(entity).iter().find(|r| &r.id == related_id)?;
                        let film = self.film_row(film_id)?;
                        let within_root = root.map_or(true, |root| film.modified <= *root);
                        (related.modified >= *from && film.modified < related.modified && within_root)
                            .then(|| {
                                ChangeRow::new(film.id.clone(), related.modified, related.id.clone())
                            })
                    })
                    .collect()
            }
        };
        rows.sort_by(|a, b| {
            (a.timestamp, &a.id, &a.root_id).cmp(&(b.timestamp, &b.id, &b.root_id))
        });
        rows
    }

    fn film_json(&self, film: &Row) -> Value {
        let persons: Vec<Value> = self
            .roles
            .iter()
            .filter(|(_, f, _)| f == &film.id)
            .filter_map(|(p, _, role)| {
                let person = self.persons.iter().find(|r| &r.id == p)?;
                Some(json!({"id": person.id, "name": person.name, "role": role}))
            })
            .collect();
        let genres: Vec<Value> = self
            .genre_links
            .iter()
            .filter(|(_, f)| f == &film.id)
            .filter_map(|(g, _)| {
                let genre = self.genres.iter().find(|r| &r.id == g)?;
                Some(json!({"id": genre.id, "name": genre.name}))
            })
            .collect();
        json!({
            "id": film.id,
            "title": film.name,
            "description": null,
            "rating": 7.25,
            "age_limit": null,
            "type": "movie",
            "modified": film.modified,
            "persons": persons,
            "genres": genres,
            "marks": []
        })
    }
}

/// Change source answering from a `Catalog`.
#[derive(Debug, Default)]
pub struct FakeSource {
    pub catalog: Catalog,
    /// Selections in the order scans were opened
    pub scans: Vec<Selection>,
    pub enrich_calls: usize,
    pub probes: Vec<Entity>,
    /// Return enrichment payloads that do not decode
    pub corrupt_enrichment: bool,
    pub reachable: bool,
    /// Catalog another writer commits while the next scan is open
    pub commit_during_scan: Option<Catalog>,
    open: Option<VecDeque<ChangeRow>>,
    /// What the open scan sees
    snapshot: Option<Catalog>,
}

impl FakeSource {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            reachable: true,
            ..Self::default()
        }
    }

    pub fn scan_is_open(&self) -> bool {
        self.open.is_some()
    }
}

#[async_trait]
impl ChangeSource for FakeSource {
    async fn open_scan(
        &mut self,
        selection: Selection,
        from: &Cursor,
        root: Option<&Cursor>,
    ) -> Result<(), SourceError> {
        self.scans.push(selection);
        let root = root.map(|c| &c.timestamp);
        self.open = Some(self.catalog.scan(selection, &from.timestamp, root).into());
        self.snapshot = Some(self.catalog.clone());
        Ok(())
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<ChangeRow>, SourceError> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| SourceError::Query("no scan is open".to_string()))?;
        let n = max_rows.min(open.len());
        let rows = open.drain(..n).collect();
        if let Some(catalog) = self.commit_during_scan.take() {
            self.catalog = catalog;
        }
        Ok(rows)
    }

    async fn close_scan(&mut self) -> Result<(), SourceError> {
        self.open = None;
        self.snapshot = None;
        Ok(())
    }

    async fn probe_max(&mut self, entity: Entity) -> Result<Option<Cursor>, SourceError> {
        self.probes.push(entity);
        Ok(self.snapshot.as_ref().unwrap_or(&self.catalog).max(entity))
    }

    async fn enrich(
        &mut self,
        aggregate: Aggregate,
        ids: &[String],
    ) -> Result<Vec<Value>, SourceError> {
        self.enrich_calls += 1;
        if self.corrupt_enrichment {
            return Ok(ids.iter().map(|id| json!({"id": id})).collect());
        }
        let mut ids: Vec<&String> = ids.iter().collect();
        ids.sort();
        let docs = ids
            .into_iter()
            .filter_map(|id| match aggregate {
                Aggregate::FilmWork => self.catalog.film_row(id).map(|f| self.catalog.film_json(f)),
                Aggregate::Person => self.catalog.persons.iter().find(|p| &p.id == id).map(|p| {
                    json!({"id": p.id, "full_name": p.name, "modified": p.modified, "movies": []})
                }),
                Aggregate::Genre => self
                    .catalog
                    .genres
                    .iter()
                    .find(|g| &g.id == id)
                    .map(|g| json!({"id": g.id, "name": g.name, "modified": g.modified})),
            })
            .collect();
        Ok(docs)
    }

    async fn ping(&mut self) -> Result<(), SourceError> {
        if self.reachable {
            Ok(())
        } else {
            Err(SourceError::Connection("connection refused".to_string()))
        }
    }
}

/// Loader keeping an in-memory index and rejecting a fixed number of
/// documents per batch when told to.
#[derive(Debug, Clone)]
pub struct RecordingLoader {
    pub docs: Arc<Mutex<BTreeMap<String, Value>>>,
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
    pub reject_per_batch: usize,
    pub batch_size: usize,
}

impl RecordingLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            docs: Arc::new(Mutex::new(BTreeMap::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
            reject_per_batch: 0,
            batch_size,
        }
    }

    pub fn rejecting(mut self, n: usize) -> Self {
        self.reject_per_batch = n;
        self
    }

    pub fn ids(&self) -> Vec<String> {
        self.docs.lock().unwrap().keys().cloned().collect()
    }

    pub fn doc(&self, id: &str) -> Option<Value> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl BulkLoader for RecordingLoader {
    fn index(&self) -> &str {
        "test"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn pre_check(&self) -> Result<(), LoadError> {
        Ok(())
    }

    async fn write_batch(&self, batch: &Batch) -> Result<LoadResult, LoadError> {
        let sent = batch.len();
        let keep = sent.saturating_sub(self.reject_per_batch);
        let mut docs = self.docs.lock().unwrap();
        for entry in &batch.entries()[..keep] {
            docs.insert(entry.id.clone(), entry.source.clone());
        }
        self.batches
            .lock()
            .unwrap()
            .push(batch.entries().iter().map(|e| e.id.clone()).collect());
        Ok(LoadResult {
            sent,
            accepted: keep,
        })
    }
}
