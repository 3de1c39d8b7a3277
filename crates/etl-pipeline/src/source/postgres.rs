//! PostgreSQL change source.
//!
//! Scans run inside a REPEATABLE READ transaction through a server-side
//! cursor (`DECLARE ... NO SCROLL CURSOR` then `FETCH n`). When the
//! connection drops mid-scan the source reconnects, declares the cursor
//! again from the last row it handed out and skips rows up to that row.
//! The no-data probe runs inside the open scan transaction so it reads the
//! scan's snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etl_types::Cursor;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

use super::{queries, Aggregate, ChangeRow, ChangeSource, Entity, Selection};
use crate::error::SourceError;
use crate::retry::{RetryPolicy, Retryable};

const CURSOR_NAME: &str = "etl_scan";

/// Sort key of a scan row: `(timestamp, id, root_id)`.
type RowKey = (DateTime<Utc>, String, String);

struct ScanState {
    selection: Selection,
    sql: &'static str,
    from: DateTime<Utc>,
    /// Root stream timestamp bounding related scans
    root: Option<DateTime<Utc>>,
    /// Last row handed out, the resume point after a reconnect
    last: Option<RowKey>,
    declared: bool,
}

pub struct PostgresSource {
    dsn: String,
    retry: RetryPolicy,
    client: Option<Client>,
    scan: Option<ScanState>,
}

impl PostgresSource {
    /// Create a source. No connection is opened until the first request.
    pub fn new(dsn: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            dsn: dsn.into(),
            retry,
            client: None,
            scan: None,
        }
    }

    async fn client(&mut self) -> Result<&Client, SourceError> {
        let usable = self.client.as_ref().is_some_and(|c| !c.is_closed());
        if !usable {
            debug!("Connecting to PostgreSQL");
            let (client, connection) = tokio_postgres::connect(&self.dsn, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "PostgreSQL connection error");
                }
            });
            info!("Connected to PostgreSQL");
            self.client = Some(client);
            // A fresh session holds no transaction and no cursor
            if let Some(scan) = self.scan.as_mut() {
                scan.declared = false;
            }
        }
        self.client
            .as_ref()
            .ok_or_else(|| SourceError::Connection("connection unavailable".to_string()))
    }

    fn drop_connection(&mut self) {
        self.client = None;
        if let Some(scan) = self.scan.as_mut() {
            scan.declared = false;
        }
    }

    async fn declare(&mut self) -> Result<(), SourceError> {
        let (sql, from, root, selection) = match self.scan.as_ref() {
            Some(scan) => (
                scan.sql,
                scan.last.as_ref().map(|l| l.0).unwrap_or(scan.from),
                scan.root,
                scan.selection,
            ),
            None => return Err(SourceError::Query("no scan is open".to_string())),
        };
        let params: Vec<&(dyn ToSql + Sync)> = match selection {
            Selection::Root(_) => vec![&from],
            Selection::Related(_) => vec![&from, &root],
        };

        let client = self.client().await?;
        client
            .batch_execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .await?;
        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", CURSOR_NAME, sql);
        if let Err(e) = client.execute(&declare, &params).await {
            let _ = client.batch_execute("ROLLBACK").await;
            return Err(e.into());
        }
        debug!(selection = %selection, from = %from, "Scan cursor declared");

        if let Some(scan) = self.scan.as_mut() {
            scan.declared = true;
        }
        Ok(())
    }

    async fn fetch_once(&mut self, max_rows: usize) -> Result<Vec<ChangeRow>, SourceError> {
        let declared = match self.scan.as_ref() {
            Some(scan) => scan.declared,
            None => return Err(SourceError::Query("no scan is open".to_string())),
        };
        if !declared {
            self.declare().await?;
        }

        let last = self.scan.as_ref().and_then(|scan| scan.last.clone());
        let mut fill = PageFill::new(max_rows, last);

        while let Some(want) = fill.want() {
            let fetch = format!("FETCH {} FROM {}", want, CURSOR_NAME);
            let rows = self
                .client()
                .await?
                .query(&fetch, &[])
                .await?
                .iter()
                .map(change_row)
                .collect::<Result<Vec<_>, _>>()?;
            fill.push_fetched(want, rows);
        }

        let page = fill.into_page();
        if let (Some(scan), Some(tail)) = (self.scan.as_mut(), page.last()) {
            scan.last = Some((tail.timestamp, tail.id.clone(), tail.root_id.clone()));
        }
        Ok(page)
    }

    async fn enrich_once(
        &mut self,
        aggregate: Aggregate,
        ids: &[String],
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let rows = self
            .client()
            .await?
            .query(queries::enrich(aggregate), &[&ids])
            .await?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, serde_json::Value>("doc")
                    .map_err(|e| SourceError::Data(format!("enrichment row: {}", e)))
            })
            .collect()
    }

    async fn probe_once(&mut self, entity: Entity) -> Result<Option<Cursor>, SourceError> {
        if self.scan.as_ref().is_some_and(|scan| !scan.declared) {
            // The scan's snapshot went with the old connection
            warn!(entity = %entity, "Scan snapshot lost, probe skipped");
            return Ok(None);
        }
        let row = self
            .client()
            .await?
            .query_opt(queries::probe(entity), &[])
            .await?;
        match row {
            Some(row) => {
                let timestamp: DateTime<Utc> = row
                    .try_get("modified")
                    .map_err(|e| SourceError::Data(format!("probe row: {}", e)))?;
                let id: String = row
                    .try_get("id")
                    .map_err(|e| SourceError::Data(format!("probe row: {}", e)))?;
                Ok(Some(Cursor::new(timestamp, id)))
            }
            None => Ok(None),
        }
    }
}

/// One page assembled from as many FETCHes as it takes.
///
/// Rows at or before `last` were handed out before the cursor was declared
/// again and are dropped. The page is short only once the cursor is drained.
struct PageFill {
    max_rows: usize,
    last: Option<RowKey>,
    page: Vec<ChangeRow>,
    drained: bool,
}

impl PageFill {
    fn new(max_rows: usize, last: Option<RowKey>) -> Self {
        Self {
            max_rows,
            last,
            page: Vec::with_capacity(max_rows),
            drained: false,
        }
    }

    /// Rows to fetch next, or `None` once the page is full or the cursor drained.
    fn want(&self) -> Option<usize> {
        if self.drained || self.page.len() >= self.max_rows {
            None
        } else {
            Some(self.max_rows - self.page.len())
        }
    }

    /// Take the result of a `FETCH want`.
    fn push_fetched(&mut self, want: usize, rows: Vec<ChangeRow>) {
        if rows.len() < want {
            self.drained = true;
        }
        let last = self.last.as_ref();
        self.page
            .extend(rows.into_iter().filter(|row| !handed_out(last, row)));
    }

    fn into_page(self) -> Vec<ChangeRow> {
        self.page
    }
}

fn handed_out(last: Option<&RowKey>, row: &ChangeRow) -> bool {
    last.is_some_and(|(ts, id, root)| (row.timestamp, &row.id, &row.root_id) <= (*ts, id, root))
}

fn change_row(row: &Row) -> Result<ChangeRow, SourceError> {
    let decode = |e: tokio_postgres::Error| SourceError::Data(format!("scan row: {}", e));
    Ok(ChangeRow {
        root_id: row.try_get("root_id").map_err(decode)?,
        timestamp: row.try_get("modified").map_err(decode)?,
        id: row.try_get("id").map_err(decode)?,
    })
}

#[async_trait]
impl ChangeSource for PostgresSource {
    async fn open_scan(
        &mut self,
        selection: Selection,
        from: &Cursor,
        root: Option<&Cursor>,
    ) -> Result<(), SourceError> {
        self.close_scan().await?;

        let sql = queries::scan(selection)
            .ok_or_else(|| SourceError::Query(format!("no scan defined for {}", selection)))?;
        self.scan = Some(ScanState {
            selection,
            sql,
            from: from.timestamp,
            root: root.map(|c| c.timestamp),
            last: None,
            declared: false,
        });
        Ok(())
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<ChangeRow>, SourceError> {
        let mut backoff = self.retry.backoff("postgres fetch");
        loop {
            match self.fetch_once(max_rows).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() => {
                    self.drop_connection();
                    if !backoff.pause(&e).await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn close_scan(&mut self) -> Result<(), SourceError> {
        let Some(scan) = self.scan.take() else {
            return Ok(());
        };
        if !scan.declared {
            return Ok(());
        }
        if let Some(client) = self.client.as_ref().filter(|c| !c.is_closed()) {
            let close = format!("CLOSE {}", CURSOR_NAME);
            if let Err(e) = client.batch_execute(&close).await {
                warn!(error = %e, "Cursor CLOSE failed, rolling back");
                let _ = client.batch_execute("ROLLBACK").await;
                return Ok(());
            }
            // Read-only transaction; a lost COMMIT loses nothing
            if let Err(e) = client.batch_execute("COMMIT").await {
                warn!(error = %e, "Scan transaction COMMIT failed");
            }
        }
        Ok(())
    }

    async fn probe_max(&mut self, entity: Entity) -> Result<Option<Cursor>, SourceError> {
        let mut backoff = self.retry.backoff("postgres probe");
        loop {
            match self.probe_once(entity).await {
                Ok(max) => return Ok(max),
                Err(e) if e.is_transient() => {
                    self.drop_connection();
                    if !backoff.pause(&e).await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn enrich(
        &mut self,
        aggregate: Aggregate,
        ids: &[String],
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut backoff = self.retry.backoff("postgres enrich");
        loop {
            match self.enrich_once(aggregate, ids).await {
                Ok(docs) => return Ok(docs),
                Err(e) if e.is_transient() => {
                    self.drop_connection();
                    if !backoff.pause(&e).await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), SourceError> {
        let result = match self.client().await {
            Ok(client) => client.query_one("SELECT 1", &[]).await.map_err(SourceError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if e.is_transient() {
                self.drop_connection();
            }
        }
        result.map(|_| ())
    }
}
