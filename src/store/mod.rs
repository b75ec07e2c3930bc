//! SQLite-backed local store for papers and their citation history.
//!
//! All access goes through one connection behind a mutex. Every
//! [`Store::upsert_paper`] call is a single transaction, so readers never
//! observe a half-written paper and an interrupted fetch leaves only
//! complete upserts behind.

mod error;
mod schema;

pub use error::StoreError;
pub use schema::SCHEMA_VERSION;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::identifiers::{normalize_arxiv, normalize_doi, normalize_title, surnames};
use crate::models::{Alert, CitationSnapshot, Paper, SyncOutcome, SyncStatus, TrackedPaper};

const PAPER_COLUMNS: &str =
    "id, title, doi, arxiv_id, year, venue, authors, first_seen, last_updated";

/// Latest snapshot per (paper, platform)
const LATEST_COUNTS: &str = "
    SELECT c.paper_id, c.platform, c.citation_count FROM citations c
    WHERE c.id = (
        SELECT c2.id FROM citations c2
        WHERE c2.paper_id = c.paper_id AND c2.platform = c.platform
        ORDER BY c2.recorded_at DESC, c2.id DESC LIMIT 1
    )";

const LATEST_COUNTS_AS_OF: &str = "
    SELECT c.paper_id, c.platform, c.citation_count FROM citations c
    WHERE c.id = (
        SELECT c2.id FROM citations c2
        WHERE c2.paper_id = c.paper_id AND c2.platform = c.platform
          AND c2.recorded_at <= ?1
        ORDER BY c2.recorded_at DESC, c2.id DESC LIMIT 1
    )";

/// What a single upsert changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub paper_id: i64,

    /// The paper did not exist before this call
    pub created: bool,

    pub snapshots_appended: usize,

    /// Count change per platform, only for platforms with an earlier snapshot
    pub deltas: BTreeMap<String, i64>,
}

impl UpsertOutcome {
    pub fn total_delta(&self) -> i64 {
        self.deltas.values().sum()
    }
}

/// Local paper and citation store
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;
        schema::apply_pragmas(&conn, false)?;
        schema::run_migrations(&mut conn)?;

        tracing::debug!("Opened store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        schema::apply_pragmas(&conn, true)?;
        schema::run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ---- writes ------------------------------------------------------------

    /// Insert or update one canonical paper and append snapshots for changed counts.
    ///
    /// Identity is resolved in order: normalized DOI, any known
    /// (platform, platform id) pair, arXiv id, then normalized title with a
    /// shared author surname among papers without a DOI (unique match only).
    pub fn upsert_paper(&self, candidate: &Paper, now: DateTime<Utc>) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let doi = candidate.doi.as_deref().and_then(normalize_doi);
        let arxiv = candidate.arxiv_id.as_deref().and_then(normalize_arxiv);

        let (paper_id, created) = match resolve(&tx, candidate, doi.as_deref(), arxiv.as_deref())? {
            Some(id) => {
                update_paper(&tx, id, candidate, doi.as_deref(), arxiv.as_deref(), now)?;
                (id, false)
            }
            None => (insert_paper(&tx, candidate, doi.as_deref(), arxiv.as_deref(), now)?, true),
        };

        for (platform, platform_id) in &candidate.identifiers {
            tx.execute(
                "INSERT OR IGNORE INTO paper_identifiers(paper_id, platform, platform_id)
                 VALUES (?1, ?2, ?3)",
                params![paper_id, platform, platform_id],
            )?;
        }

        let mut outcome = UpsertOutcome {
            paper_id,
            created,
            ..Default::default()
        };

        for (platform, &count) in &candidate.citations {
            let previous: Option<u32> = tx
                .query_row(
                    "SELECT citation_count FROM citations
                     WHERE paper_id = ?1 AND platform = ?2
                     ORDER BY recorded_at DESC, id DESC LIMIT 1",
                    params![paper_id, platform],
                    |row| row.get(0),
                )
                .optional()?;

            if previous == Some(count) {
                continue;
            }

            tx.execute(
                "INSERT INTO citations(paper_id, platform, citation_count, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![paper_id, platform, count, ts(&now)],
            )?;
            outcome.snapshots_appended += 1;

            if let Some(previous) = previous {
                outcome
                    .deltas
                    .insert(platform.clone(), i64::from(count) - i64::from(previous));
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Follow a paper; returns false when it was already tracked
    pub fn track_paper(&self, paper_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let exists: bool = conn
            .prepare("SELECT 1 FROM papers WHERE id = ?1")?
            .exists([paper_id])?;
        if !exists {
            return Err(StoreError::NotFound(format!("#{}", paper_id)));
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tracked_papers(paper_id, added_at, alert_enabled) VALUES (?1, ?2, 1)",
            params![paper_id, ts(&now)],
        )?;
        Ok(inserted > 0)
    }

    /// Switch citation alerts for a tracked paper; false when it is not tracked
    pub fn set_tracked_alerts(&self, paper_id: i64, enabled: bool) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tracked_papers SET alert_enabled = ?2 WHERE paper_id = ?1",
            params![paper_id, enabled],
        )?;
        Ok(updated > 0)
    }

    pub fn untrack_paper(&self, paper_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM tracked_papers WHERE paper_id = ?1", [paper_id])?;
        Ok(removed > 0)
    }

    pub fn record_sync(&self, status: &SyncStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_status(platform, last_sync, status, error_message)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(platform) DO UPDATE SET
                last_sync = excluded.last_sync,
                status = excluded.status,
                error_message = excluded.error_message",
            params![
                status.platform,
                ts(&status.last_sync),
                status.outcome.as_str(),
                status.error_message
            ],
        )?;
        Ok(())
    }

    pub fn add_alert(
        &self,
        paper_id: Option<i64>,
        alert_type: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts(paper_id, alert_type, message, created_at, read)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![paper_id, alert_type, message, ts(&now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark every unread alert as read; returns how many changed
    pub fn mark_alerts_read(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("UPDATE alerts SET read = 1 WHERE read = 0", [])?)
    }

    // ---- reads -------------------------------------------------------------

    pub fn paper(&self, id: i64) -> Result<Option<Paper>, StoreError> {
        let conn = self.conn()?;
        let paper = conn
            .query_row(
                &format!("SELECT {} FROM papers WHERE id = ?1", PAPER_COLUMNS),
                [id],
                paper_from_row,
            )
            .optional()?;

        match paper {
            Some(mut paper) => {
                attach_details(&conn, &mut paper)?;
                Ok(Some(paper))
            }
            None => Ok(None),
        }
    }

    /// All papers with identifiers and latest counts, ordered by id
    pub fn papers(&self) -> Result<Vec<Paper>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!("SELECT {} FROM papers ORDER BY id", PAPER_COLUMNS))?;
        let mut papers = stmt
            .query_map([], paper_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut identifiers: BTreeMap<i64, BTreeMap<String, String>> = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT paper_id, platform, platform_id FROM paper_identifiers")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (paper_id, platform, platform_id) = row?;
            identifiers.entry(paper_id).or_default().insert(platform, platform_id);
        }

        let mut counts = latest_counts(&conn, None)?;

        for paper in &mut papers {
            if let Some(id) = paper.id {
                paper.identifiers = identifiers.remove(&id).unwrap_or_default();
                paper.citations = counts.remove(&id).unwrap_or_default();
            }
        }
        Ok(papers)
    }

    pub fn paper_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn snapshot_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM citations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Snapshots recorded within `[from, to]`, oldest first
    pub fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CitationSnapshot>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT paper_id, platform, citation_count, recorded_at FROM citations
             WHERE recorded_at >= ?1 AND recorded_at <= ?2
             ORDER BY recorded_at, id",
        )?;
        let snapshots = stmt
            .query_map(params![ts(&from), ts(&to)], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    /// Citation history of one paper, oldest first
    pub fn history(
        &self,
        paper_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CitationSnapshot>, StoreError> {
        let conn = self.conn()?;
        let since = since.map(|s| ts(&s)).unwrap_or_default();
        let mut stmt = conn.prepare(
            "SELECT paper_id, platform, citation_count, recorded_at FROM citations
             WHERE paper_id = ?1 AND recorded_at >= ?2
             ORDER BY recorded_at, id",
        )?;
        let snapshots = stmt
            .query_map(params![paper_id, since], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    /// Latest known count per paper and platform at time `at`
    pub fn citations_as_of(
        &self,
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, BTreeMap<String, u32>>, StoreError> {
        let conn = self.conn()?;
        latest_counts(&conn, Some(at))
    }

    pub fn find_by_doi(&self, doi: &str) -> Result<Option<Paper>, StoreError> {
        let Some(doi) = normalize_doi(doi) else {
            return Ok(None);
        };
        self.find_one("SELECT id FROM papers WHERE doi = ?1", &doi)
    }

    pub fn find_by_arxiv(&self, arxiv_id: &str) -> Result<Option<Paper>, StoreError> {
        let Some(arxiv) = normalize_arxiv(arxiv_id) else {
            return Ok(None);
        };
        self.find_one("SELECT id FROM papers WHERE arxiv_id = ?1 ORDER BY id LIMIT 1", &arxiv)
    }

    /// Papers whose normalized title equals the normalized query
    pub fn find_by_title(&self, title: &str) -> Result<Vec<Paper>, StoreError> {
        let key = normalize_title(title);
        if key.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare("SELECT id FROM papers WHERE title_key = ?1 ORDER BY id")?;
            let ids = stmt.query_map([&key], |row| row.get(0))?.collect::<Result<_, _>>()?;
            ids
        };

        let mut papers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(paper) = self.paper(id)? {
                papers.push(paper);
            }
        }
        Ok(papers)
    }

    fn find_one(&self, sql: &str, key: &str) -> Result<Option<Paper>, StoreError> {
        let id: Option<i64> = {
            let conn = self.conn()?;
            let id = conn.query_row(sql, [key], |row| row.get(0)).optional()?;
            id
        };
        match id {
            Some(id) => self.paper(id),
            None => Ok(None),
        }
    }

    pub fn tracked_papers(&self) -> Result<Vec<TrackedPaper>, StoreError> {
        let rows: Vec<(i64, String, bool)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT paper_id, added_at, alert_enabled FROM tracked_papers ORDER BY added_at, paper_id",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<_, _>>()?;
            rows
        };

        let mut tracked = Vec::with_capacity(rows.len());
        for (paper_id, added_at, alert_enabled) in rows {
            let Some(paper) = self.paper(paper_id)? else {
                continue;
            };
            tracked.push(TrackedPaper {
                paper,
                added_at: decode_ts(&added_at)?,
                alert_enabled,
            });
        }
        Ok(tracked)
    }

    pub fn sync_statuses(&self) -> Result<Vec<SyncStatus>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT platform, last_sync, status, error_message FROM sync_status ORDER BY platform",
        )?;
        let statuses = stmt
            .query_map([], sync_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    pub fn sync_status(&self, platform: &str) -> Result<Option<SyncStatus>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT platform, last_sync, status, error_message FROM sync_status WHERE platform = ?1",
                [platform],
                sync_from_row,
            )
            .optional()?)
    }

    /// Newest first
    pub fn alerts(&self, unread_only: bool, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, paper_id, alert_type, message, created_at, read FROM alerts
             WHERE (?1 = 0 OR read = 0)
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let alerts = stmt
            .query_map(params![unread_only, limit as i64], |row| {
                Ok(Alert {
                    id: row.get(0)?,
                    paper_id: row.get(1)?,
                    alert_type: row.get(2)?,
                    message: row.get(3)?,
                    created_at: parse_ts(row, 4)?,
                    read: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }
}

// ---- identity resolution ---------------------------------------------------

fn resolve(
    tx: &Transaction<'_>,
    candidate: &Paper,
    doi: Option<&str>,
    arxiv: Option<&str>,
) -> Result<Option<i64>, StoreError> {
    if let Some(doi) = doi {
        let hit = tx
            .query_row("SELECT id FROM papers WHERE doi = ?1", [doi], |row| row.get(0))
            .optional()?;
        if hit.is_some() {
            return Ok(hit);
        }
    }

    // A stored DOI that differs from the candidate's means a different work
    let compatible = |stored: &Option<String>| match (doi, stored.as_deref()) {
        (Some(mine), Some(theirs)) => mine == theirs,
        _ => true,
    };

    let mut by_identifier = BTreeSet::new();
    for (platform, platform_id) in &candidate.identifiers {
        let hit: Option<(i64, Option<String>)> = tx
            .query_row(
                "SELECT p.id, p.doi FROM paper_identifiers i JOIN papers p ON p.id = i.paper_id
                 WHERE i.platform = ?1 AND i.platform_id = ?2",
                params![platform, platform_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, stored_doi)) = hit {
            if compatible(&stored_doi) {
                by_identifier.insert(id);
            }
        }
    }
    if let Some(&id) = by_identifier.iter().next() {
        if by_identifier.len() > 1 {
            tracing::warn!(
                "'{}' matches stored papers {:?} by identifier; updating #{}",
                candidate.title,
                by_identifier,
                id
            );
        }
        return Ok(Some(id));
    }

    if let Some(arxiv) = arxiv {
        let mut stmt = tx.prepare("SELECT id, doi FROM papers WHERE arxiv_id = ?1 ORDER BY id")?;
        let hits = stmt
            .query_map([arxiv], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let hits: Vec<i64> = hits
            .into_iter()
            .filter(|(_, stored_doi)| compatible(stored_doi))
            .map(|(id, _)| id)
            .collect();
        if let [id] = hits.as_slice() {
            return Ok(Some(*id));
        }
    }

    let key = normalize_title(&candidate.title);
    let names = surnames(&candidate.authors);
    if key.is_empty() || names.is_empty() {
        return Ok(None);
    }

    let mut stmt = tx.prepare("SELECT id, authors FROM papers WHERE title_key = ?1 AND doi IS NULL ORDER BY id")?;
    let rows = stmt
        .query_map([&key], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut matches = Vec::new();
    for (id, authors) in rows {
        let authors: Vec<String> = serde_json::from_str(&authors)?;
        if surnames(&authors).is_disjoint(&names) {
            continue;
        }
        // Two records from one platform are two works
        let platforms: BTreeSet<String> = {
            let mut stmt = tx.prepare("SELECT platform FROM paper_identifiers WHERE paper_id = ?1")?;
            let platforms = stmt.query_map([id], |row| row.get(0))?.collect::<Result<_, _>>()?;
            platforms
        };
        if candidate.identifiers.keys().any(|p| platforms.contains(p)) {
            continue;
        }
        matches.push(id);
    }

    match matches.as_slice() {
        [id] => Ok(Some(*id)),
        [] => Ok(None),
        many => {
            tracing::warn!(
                "'{}' matches {} stored papers by title; storing separately",
                candidate.title,
                many.len()
            );
            Ok(None)
        }
    }
}

fn insert_paper(
    tx: &Transaction<'_>,
    paper: &Paper,
    doi: Option<&str>,
    arxiv: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    tx.execute(
        "INSERT INTO papers(title, title_key, doi, arxiv_id, year, venue, authors, first_seen, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            paper.title,
            normalize_title(&paper.title),
            doi,
            arxiv,
            paper.year,
            paper.venue,
            serde_json::to_string(&paper.authors)?,
            ts(&paper.first_seen.min(now)),
            ts(&now),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_paper(
    tx: &Transaction<'_>,
    id: i64,
    candidate: &Paper,
    doi: Option<&str>,
    arxiv: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let stored: String = tx.query_row("SELECT authors FROM papers WHERE id = ?1", [id], |row| row.get(0))?;
    let stored: Vec<String> = serde_json::from_str(&stored)?;
    let authors = if candidate.authors.len() > stored.len() {
        &candidate.authors
    } else {
        &stored
    };

    tx.execute(
        "UPDATE papers SET
            doi = COALESCE(doi, ?2),
            arxiv_id = COALESCE(arxiv_id, ?3),
            year = COALESCE(year, ?4),
            venue = COALESCE(venue, ?5),
            authors = ?6,
            last_updated = ?7
         WHERE id = ?1",
        params![
            id,
            doi,
            arxiv,
            candidate.year,
            candidate.venue,
            serde_json::to_string(authors)?,
            ts(&now)
        ],
    )?;
    Ok(())
}

// ---- row decoding ----------------------------------------------------------

fn attach_details(conn: &Connection, paper: &mut Paper) -> Result<(), StoreError> {
    let Some(id) = paper.id else {
        return Ok(());
    };

    let mut stmt = conn.prepare("SELECT platform, platform_id FROM paper_identifiers WHERE paper_id = ?1")?;
    paper.identifiers = stmt
        .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(&format!("{} AND c.paper_id = ?1", LATEST_COUNTS))?;
    paper.citations = stmt
        .query_map([id], |row| Ok((row.get(1)?, row.get(2)?)))?
        .collect::<Result<_, _>>()?;
    Ok(())
}

fn latest_counts(
    conn: &Connection,
    at: Option<DateTime<Utc>>,
) -> Result<BTreeMap<i64, BTreeMap<String, u32>>, StoreError> {
    let mut counts: BTreeMap<i64, BTreeMap<String, u32>> = BTreeMap::new();
    let read = |row: &Row<'_>| -> rusqlite::Result<(i64, String, u32)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    };

    let rows = match at {
        Some(at) => {
            let mut stmt = conn.prepare(LATEST_COUNTS_AS_OF)?;
            let rows = stmt.query_map([ts(&at)], read)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(LATEST_COUNTS)?;
            let rows = stmt.query_map([], read)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    for (paper_id, platform, count) in rows {
        counts.entry(paper_id).or_default().insert(platform, count);
    }
    Ok(counts)
}

fn paper_from_row(row: &Row<'_>) -> rusqlite::Result<Paper> {
    let authors: String = row.get(6)?;
    let authors: Vec<String> = serde_json::from_str(&authors)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Paper {
        id: Some(row.get(0)?),
        title: row.get(1)?,
        doi: row.get(2)?,
        arxiv_id: row.get(3)?,
        year: row.get(4)?,
        venue: row.get(5)?,
        authors,
        identifiers: BTreeMap::new(),
        citations: BTreeMap::new(),
        first_seen: parse_ts(row, 7)?,
        last_updated: parse_ts(row, 8)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<CitationSnapshot> {
    Ok(CitationSnapshot {
        paper_id: row.get(0)?,
        platform: row.get(1)?,
        citations: row.get(2)?,
        recorded_at: parse_ts(row, 3)?,
    })
}

fn sync_from_row(row: &Row<'_>) -> rusqlite::Result<SyncStatus> {
    let outcome: String = row.get(2)?;
    Ok(SyncStatus {
        platform: row.get(0)?,
        last_sync: parse_ts(row, 1)?,
        outcome: SyncOutcome::parse(&outcome),
        error_message: row.get(3)?,
    })
}

/// Fixed-width UTC timestamps so text comparison orders chronologically
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(day: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2024-06-{:02}T12:00:00Z", day))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn paper(title: &str, authors: &[&str]) -> Paper {
        let mut paper = Paper::new(title, at(1));
        paper.authors = authors.iter().map(|a| a.to_string()).collect();
        paper
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = Store::open_in_memory().unwrap();
        let mut candidate = paper("Deep Learning Survey", &["Ada Lovelace"]);
        candidate.doi = Some("https://doi.org/10.1/X".into());
        candidate.year = Some(2020);
        candidate.identifiers.insert("crossref".into(), "10.1/x".into());
        candidate.citations.insert("crossref".into(), 4);

        let outcome = store.upsert_paper(&candidate, at(1)).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.snapshots_appended, 1);
        assert!(outcome.deltas.is_empty());

        let stored = store.paper(outcome.paper_id).unwrap().unwrap();
        assert_eq!(stored.doi.as_deref(), Some("10.1/x"));
        assert_eq!(stored.authors, vec!["Ada Lovelace"]);
        assert_eq!(stored.citations["crossref"], 4);
        assert_eq!(stored.identifiers["crossref"], "10.1/x");
        assert_eq!(stored.year, Some(2020));
    }

    #[test]
    fn test_unchanged_upsert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let mut candidate = paper("Paper", &["Ada Lovelace"]);
        candidate.doi = Some("10.1/x".into());
        candidate.citations.insert("semantic_scholar".into(), 5);

        store.upsert_paper(&candidate, at(1)).unwrap();
        let again = store.upsert_paper(&candidate, at(2)).unwrap();

        assert!(!again.created);
        assert_eq!(again.snapshots_appended, 0);
        assert_eq!(store.paper_count().unwrap(), 1);
        assert_eq!(store.snapshot_count().unwrap(), 1);
    }

    #[test]
    fn test_changed_count_appends_snapshot_with_delta() {
        let store = Store::open_in_memory().unwrap();
        let mut candidate = paper("Paper", &["Ada Lovelace"]);
        candidate.doi = Some("10.1/x".into());
        candidate.citations.insert("semantic_scholar".into(), 5);
        store.upsert_paper(&candidate, at(1)).unwrap();

        candidate.citations.insert("semantic_scholar".into(), 8);
        let outcome = store.upsert_paper(&candidate, at(3)).unwrap();
        assert_eq!(outcome.deltas["semantic_scholar"], 3);
        assert_eq!(outcome.total_delta(), 3);

        let history = store.history(outcome.paper_id, None).unwrap();
        assert_eq!(history.iter().map(|s| s.citations).collect::<Vec<_>>(), vec![5, 8]);

        let as_of = store.citations_as_of(at(2)).unwrap();
        assert_eq!(as_of[&outcome.paper_id]["semantic_scholar"], 5);

        let window = store.snapshots_between(at(2), at(4)).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].citations, 8);
    }

    #[test]
    fn test_identity_by_platform_identifier() {
        let store = Store::open_in_memory().unwrap();
        let mut first = paper("Title", &["Ada Lovelace"]);
        first.identifiers.insert("google_scholar".into(), "abc:1".into());
        first.citations.insert("google_scholar".into(), 1);
        let id = store.upsert_paper(&first, at(1)).unwrap().paper_id;

        // Same identifier, new DOI: the DOI is filled in
        let mut second = paper("Title (revised)", &["Ada Lovelace"]);
        second.doi = Some("10.5/y".into());
        second.identifiers.insert("google_scholar".into(), "abc:1".into());
        let outcome = store.upsert_paper(&second, at(2)).unwrap();

        assert_eq!(outcome.paper_id, id);
        assert_eq!(store.find_by_doi("10.5/Y").unwrap().unwrap().id, Some(id));
    }

    #[test]
    fn test_identity_by_title_requires_shared_author() {
        let store = Store::open_in_memory().unwrap();
        let mut first = paper("Deep Learning Survey", &["Ada Lovelace"]);
        first.identifiers.insert("orcid".into(), "1".into());
        store.upsert_paper(&first, at(1)).unwrap();

        let mut stranger = paper("Deep learning survey", &["Grace Hopper"]);
        stranger.identifiers.insert("semantic_scholar".into(), "s".into());
        assert!(store.upsert_paper(&stranger, at(1)).unwrap().created);

        let mut colleague = paper("Deep learning: survey", &["A. Lovelace"]);
        colleague.identifiers.insert("arxiv".into(), "2301.1".into());
        assert!(!store.upsert_paper(&colleague, at(1)).unwrap().created);

        assert_eq!(store.paper_count().unwrap(), 2);
        assert_eq!(store.find_by_title("DEEP LEARNING SURVEY").unwrap().len(), 2);
    }

    #[test]
    fn test_papers_carry_latest_counts() {
        let store = Store::open_in_memory().unwrap();
        let mut a = paper("A", &["X Y"]);
        a.arxiv_id = Some("2301.00001v2".into());
        a.citations.insert("semantic_scholar".into(), 2);
        store.upsert_paper(&a, at(1)).unwrap();
        a.citations.insert("semantic_scholar".into(), 7);
        store.upsert_paper(&a, at(2)).unwrap();

        let papers = store.papers().unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].citations["semantic_scholar"], 7);
        assert!(store.find_by_arxiv("arXiv:2301.00001").unwrap().is_some());
    }

    #[test]
    fn test_tracking() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_paper(&paper("A", &["X Y"]), at(1)).unwrap().paper_id;

        assert!(store.track_paper(id, at(2)).unwrap());
        assert!(!store.track_paper(id, at(3)).unwrap());
        assert!(matches!(store.track_paper(999, at(3)), Err(StoreError::NotFound(_))));

        let tracked = store.tracked_papers().unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].added_at, at(2));
        assert!(tracked[0].alert_enabled);

        assert!(store.set_tracked_alerts(id, false).unwrap());
        assert!(!store.tracked_papers().unwrap()[0].alert_enabled);
        assert!(!store.set_tracked_alerts(999, false).unwrap());

        assert!(store.untrack_paper(id).unwrap());
        assert!(!store.set_tracked_alerts(id, true).unwrap());
    }

    #[test]
    fn test_sync_status_upsert() {
        let store = Store::open_in_memory().unwrap();
        let mut status = SyncStatus {
            platform: "arxiv".into(),
            last_sync: at(1),
            outcome: SyncOutcome::Failed,
            error_message: Some("timeout".into()),
        };
        store.record_sync(&status).unwrap();

        status.outcome = SyncOutcome::Ok;
        status.error_message = None;
        status.last_sync = at(1) + Duration::hours(1);
        store.record_sync(&status).unwrap();

        let statuses = store.sync_statuses().unwrap();
        assert_eq!(statuses, vec![status]);
        assert!(store.sync_status("orcid").unwrap().is_none());
    }

    #[test]
    fn test_alerts() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_paper(&paper("A", &["X Y"]), at(1)).unwrap().paper_id;
        store.add_alert(Some(id), "new_citations", "A gained 3 citations", at(1)).unwrap();
        store.add_alert(None, "new_citations", "B gained 1 citation", at(2)).unwrap();

        let unread = store.alerts(true, 10).unwrap();
        assert_eq!(unread.len(), 2);
        assert_eq!(unread[0].message, "B gained 1 citation");

        assert_eq!(store.mark_alerts_read().unwrap(), 2);
        assert!(store.alerts(true, 10).unwrap().is_empty());
        assert_eq!(store.alerts(false, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("citations.db");

        {
            let store = Store::open(&path).unwrap();
            store.upsert_paper(&paper("A", &["X Y"]), at(1)).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.paper_count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_garbage_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citations.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let err = Store::open(&path).unwrap_err();
        assert!(err.is_fatal(), "unexpected error: {err}");
    }
}
