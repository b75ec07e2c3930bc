//! Pragmas and versioned schema migrations.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::StoreError;

/// One forward-only schema step
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "papers, identifiers and citation snapshots",
        sql: "
            CREATE TABLE papers (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                title        TEXT NOT NULL,
                title_key    TEXT NOT NULL,
                doi          TEXT,
                arxiv_id     TEXT,
                year         INTEGER,
                venue        TEXT,
                authors      TEXT NOT NULL DEFAULT '[]',
                first_seen   TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE UNIQUE INDEX idx_papers_doi ON papers(doi) WHERE doi IS NOT NULL;
            CREATE INDEX idx_papers_arxiv ON papers(arxiv_id);
            CREATE INDEX idx_papers_title_key ON papers(title_key);

            CREATE TABLE paper_identifiers (
                paper_id    INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
                platform    TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                PRIMARY KEY (platform, platform_id)
            );

            CREATE INDEX idx_identifiers_paper ON paper_identifiers(paper_id);

            CREATE TABLE citations (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                paper_id       INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
                platform       TEXT NOT NULL,
                citation_count INTEGER NOT NULL CHECK (citation_count >= 0),
                recorded_at    TEXT NOT NULL
            );

            CREATE INDEX idx_citations_paper_platform ON citations(paper_id, platform, recorded_at);
            CREATE INDEX idx_citations_recorded ON citations(recorded_at);
        ",
    },
    Migration {
        version: 2,
        description: "tracked papers, sync status and alerts",
        sql: "
            CREATE TABLE tracked_papers (
                paper_id      INTEGER PRIMARY KEY REFERENCES papers(id) ON DELETE CASCADE,
                added_at      TEXT NOT NULL,
                alert_enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE sync_status (
                platform      TEXT PRIMARY KEY,
                last_sync     TEXT NOT NULL,
                status        TEXT NOT NULL,
                error_message TEXT
            );

            CREATE TABLE alerts (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                paper_id   INTEGER REFERENCES papers(id) ON DELETE CASCADE,
                alert_type TEXT NOT NULL,
                message    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                read       INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_alerts_read ON alerts(read, created_at);
        ",
    },
];

/// Latest schema version known to this build
pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection, in_memory: bool) -> Result<(), StoreError> {
    if !in_memory {
        // journal_mode returns a row, so it cannot go through execute_batch
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

fn ensure_migrations_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

pub fn applied_versions(conn: &Connection) -> Result<Vec<u32>, StoreError> {
    ensure_migrations_table(conn)?;
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<u32>, _>>()?;
    Ok(versions)
}

/// Apply every migration not yet recorded, each in its own transaction
pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let applied = applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::debug!(
            "Applying migration {}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| match StoreError::from(e) {
                StoreError::Corruption(msg) => StoreError::Corruption(msg),
                other => StoreError::Migration {
                    version: migration.version,
                    message: other.to_string(),
                },
            })?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![migration.version, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_recorded_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(applied_versions(&conn).unwrap(), vec![1, SCHEMA_VERSION]);
    }

    #[test]
    fn test_doi_is_unique() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let insert = "INSERT INTO papers(title, title_key, doi, first_seen, last_updated)
                      VALUES ('t', 't', ?1, 'now', 'now')";
        conn.execute(insert, params!["10.1/x"]).unwrap();
        assert!(conn.execute(insert, params!["10.1/x"]).is_err());

        // Many papers may lack a DOI
        conn.execute(insert, params![Option::<String>::None]).unwrap();
        conn.execute(insert, params![Option::<String>::None]).unwrap();
    }
}
