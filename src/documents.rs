//! Document repository.
//!
//! Owns the document lifecycle: create via [`save`], mutate via
//! [`update_content`] (which snapshots a version and bumps the content
//! hash), soft-delete/restore, permanent purge, and the access-counting
//! [`view`] read. Every mutation runs in one transaction together with its
//! knowledge event; the FTS index follows automatically through the
//! triggers installed by the migrations.

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::db;
use crate::error::{Error, Result};
use crate::events;
use crate::models::{DocType, Document, DocumentVersion};
use crate::tags;

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Create a document with version #1 and its initial tags.
pub async fn save(
    pool: &SqlitePool,
    title: &str,
    content: &str,
    project: Option<&str>,
    doc_type: DocType,
    tag_names: &[String],
) -> Result<Document> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::input("title must not be empty"));
    }

    let hash = sha256_hex(content);
    let now = db::now();

    let mut tx = pool.begin().await?;

    let doc_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (title, content, project, doc_type, content_hash, current_version, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 1, ?, ?)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(project)
    .bind(doc_type.as_str())
    .bind(&hash)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO document_versions (doc_id, version_number, content_hash, character_delta, created_at)
        VALUES (?, 1, ?, ?, ?)
        "#,
    )
    .bind(doc_id)
    .bind(&hash)
    .bind(content.chars().count() as i64)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tags::attach_tags(&mut tx, doc_id, tag_names).await?;

    events::record(&mut tx, events::SAVE, Some(doc_id), None).await?;
    tx.commit().await?;

    get(pool, doc_id).await
}

/// Fetch a document regardless of deletion state.
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Document> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("document {id}")))?;
    doc_from_row(&row)
}

/// Fetch a live (not soft-deleted) document.
pub async fn get_live(pool: &SqlitePool, id: i64) -> Result<Document> {
    let doc = get(pool, id).await?;
    if doc.is_deleted {
        return Err(Error::conflict(format!("document {id} is in the trash")));
    }
    Ok(doc)
}

/// Replace content. No-op when the hash is unchanged; otherwise snapshots a
/// new version and advances `updated_at`.
pub async fn update_content(pool: &SqlitePool, id: i64, new_content: &str) -> Result<Document> {
    let doc = get_live(pool, id).await?;

    let new_hash = sha256_hex(new_content);
    if new_hash == doc.content_hash {
        return Ok(doc);
    }

    let now = db::now();
    let delta = new_content.chars().count() as i64 - doc.content.chars().count() as i64;
    let next_version = doc.current_version + 1;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE documents
        SET content = ?, content_hash = ?, current_version = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(new_content)
    .bind(&new_hash)
    .bind(next_version)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO document_versions (doc_id, version_number, content_hash, character_delta, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(next_version)
    .bind(&new_hash)
    .bind(delta)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    events::record(&mut tx, events::EDIT, Some(id), None).await?;
    tx.commit().await?;

    get(pool, id).await
}

/// Move a document to the trash. It disappears from search immediately.
pub async fn soft_delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let doc = get(pool, id).await?;
    if doc.is_deleted {
        return Err(Error::conflict(format!("document {id} is already deleted")));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE documents SET is_deleted = 1, deleted_at = ? WHERE id = ?")
        .bind(db::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    events::record(&mut tx, events::DELETE, Some(id), None).await?;
    tx.commit().await?;
    Ok(())
}

/// Bring a trashed document back, tags and all.
pub async fn restore(pool: &SqlitePool, id: i64) -> Result<Document> {
    let doc = get(pool, id).await?;
    if !doc.is_deleted {
        return Err(Error::conflict(format!("document {id} is not in the trash")));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE documents SET is_deleted = 0, deleted_at = NULL WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    events::record(&mut tx, events::RESTORE, Some(id), None).await?;
    tx.commit().await?;

    get(pool, id).await
}

/// Permanently delete trashed documents older than the cutoff.
/// Returns the number of purged documents.
pub async fn purge_trash(pool: &SqlitePool, older_than_secs: i64) -> Result<u64> {
    let cutoff = db::now() - older_than_secs;

    let mut tx = pool.begin().await?;
    let result = sqlx::query("DELETE FROM documents WHERE is_deleted = 1 AND deleted_at < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
    let purged = result.rows_affected();
    events::record(
        &mut tx,
        events::PURGE,
        None,
        Some(&format!("{{\"purged\":{purged}}}")),
    )
    .await?;
    tx.commit().await?;

    Ok(purged)
}

/// Read a document for display: bumps `access_count`, sets `accessed_at`.
pub async fn view(pool: &SqlitePool, id: i64) -> Result<Document> {
    let doc = get_live(pool, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE documents SET access_count = access_count + 1, accessed_at = ? WHERE id = ?")
        .bind(db::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    events::record(&mut tx, events::VIEW, Some(id), None).await?;
    tx.commit().await?;

    let mut doc = doc;
    doc.access_count += 1;
    doc.accessed_at = Some(db::now());
    Ok(doc)
}

/// Newest live documents, optionally including qa docs.
pub async fn list_recent(pool: &SqlitePool, limit: i64, include_qa: bool) -> Result<Vec<Document>> {
    let rows = if include_qa {
        sqlx::query("SELECT * FROM documents WHERE is_deleted = 0 ORDER BY updated_at DESC, id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?
    } else {
        sqlx::query(
            "SELECT * FROM documents WHERE is_deleted = 0 AND doc_type != 'qa' ORDER BY updated_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?
    };

    rows.iter().map(doc_from_row).collect()
}

/// All live documents' (id, title) pairs. Used by title-match linking.
pub async fn live_titles(pool: &SqlitePool) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query("SELECT id, title FROM documents WHERE is_deleted = 0")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("title")))
        .collect())
}

/// Version history, oldest first.
pub async fn version_history(pool: &SqlitePool, doc_id: i64) -> Result<Vec<DocumentVersion>> {
    // Existence check keeps NotFound distinct from "no versions".
    get(pool, doc_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT doc_id, version_number, content_hash, character_delta, created_at
        FROM document_versions
        WHERE doc_id = ?
        ORDER BY version_number ASC
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DocumentVersion {
            doc_id: row.get("doc_id"),
            version_number: row.get("version_number"),
            content_hash: row.get("content_hash"),
            character_delta: row.get("character_delta"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub(crate) fn doc_from_row(row: &SqliteRow) -> Result<Document> {
    let doc_type: String = row.get("doc_type");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        project: row.get("project"),
        doc_type: DocType::parse(&doc_type)?,
        content_hash: row.get("content_hash"),
        current_version: row.get("current_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        accessed_at: row.get("accessed_at"),
        access_count: row.get("access_count"),
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        deleted_at: row.get("deleted_at"),
    })
}
