//! Append-only knowledge event log.
//!
//! Every mutation appends exactly one row here, in the same transaction as
//! the mutation itself, so an observer reading events always sees a
//! consistent prefix of the store's history.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

use crate::db;
use crate::error::Result;
use crate::models::KnowledgeEvent;

pub const SAVE: &str = "save";
pub const EDIT: &str = "edit";
pub const VIEW: &str = "view";
pub const SEARCH: &str = "search";
pub const DELETE: &str = "delete";
pub const RESTORE: &str = "restore";
pub const PURGE: &str = "purge";
pub const LINK: &str = "link";
pub const TAG: &str = "tag";
pub const EXECUTE: &str = "execute";
pub const TASK: &str = "task";
pub const WARNING: &str = "warning";

/// Append an event inside the caller's transaction.
pub async fn record(
    tx: &mut Transaction<'_, Sqlite>,
    event_type: &str,
    doc_id: Option<i64>,
    metadata: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO knowledge_events (event_type, doc_id, session_id, metadata, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(event_type)
    .bind(doc_id)
    .bind(session_id())
    .bind(metadata)
    .bind(db::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Append an event outside any transaction. Used for read-side events
/// (search) and warnings, where there is no mutation to piggyback on.
pub async fn record_standalone(
    pool: &SqlitePool,
    event_type: &str,
    doc_id: Option<i64>,
    metadata: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO knowledge_events (event_type, doc_id, session_id, metadata, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(event_type)
    .bind(doc_id)
    .bind(session_id())
    .bind(metadata)
    .bind(db::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent events, newest first.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<KnowledgeEvent>> {
    use sqlx::Row;

    let rows = sqlx::query(
        r#"
        SELECT id, event_type, doc_id, session_id, metadata, created_at
        FROM knowledge_events
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| KnowledgeEvent {
            id: row.get("id"),
            event_type: row.get("event_type"),
            doc_id: row.get("doc_id"),
            session_id: row.get("session_id"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
        })
        .collect())
}

fn session_id() -> Option<String> {
    std::env::var("EMDX_SESSION_ID").ok()
}
