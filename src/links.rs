//! Document link repository.
//!
//! Links are directed edges between live documents, tagged with the kind of
//! evidence that produced them (`title_match`, `entity`, `semantic`,
//! `manual`) and an optional similarity score. `(source, target, kind)` is
//! unique and self-links are rejected. Link insertion never triggers
//! enrichment; only user-facing save/edit does.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::db;
use crate::documents;
use crate::error::{Error, Result};
use crate::events;
use crate::models::{DocumentLink, LinkKind};

/// Create a link. Fails with `Conflict` on self-links and duplicates.
pub async fn link(
    pool: &SqlitePool,
    source_doc_id: i64,
    target_doc_id: i64,
    kind: LinkKind,
    similarity_score: Option<f64>,
) -> Result<DocumentLink> {
    if source_doc_id == target_doc_id {
        return Err(Error::conflict(format!(
            "document {source_doc_id} cannot link to itself"
        )));
    }

    documents::get_live(pool, source_doc_id).await?;
    documents::get_live(pool, target_doc_id).await?;

    let now = db::now();
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM document_links WHERE source_doc_id = ? AND target_doc_id = ? AND kind = ?",
    )
    .bind(source_doc_id)
    .bind(target_doc_id)
    .bind(kind.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        return Err(Error::conflict(format!(
            "link {source_doc_id} -> {target_doc_id} ({}) already exists",
            kind.as_str()
        )));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_links (source_doc_id, target_doc_id, kind, similarity_score, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(source_doc_id)
    .bind(target_doc_id)
    .bind(kind.as_str())
    .bind(similarity_score)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    events::record(
        &mut tx,
        events::LINK,
        Some(source_doc_id),
        Some(&format!(
            "{{\"target\":{target_doc_id},\"kind\":\"{}\"}}",
            kind.as_str()
        )),
    )
    .await?;
    tx.commit().await?;

    Ok(DocumentLink {
        id,
        source_doc_id,
        target_doc_id,
        kind,
        similarity_score,
        created_at: now,
    })
}

/// Idempotent variant used by the enrichment passes: returns `false`
/// instead of erroring when the link already exists or targets self.
pub async fn link_if_absent(
    pool: &SqlitePool,
    source_doc_id: i64,
    target_doc_id: i64,
    kind: LinkKind,
    similarity_score: Option<f64>,
) -> Result<bool> {
    if source_doc_id == target_doc_id {
        return Ok(false);
    }
    match link(pool, source_doc_id, target_doc_id, kind, similarity_score).await {
        Ok(_) => Ok(true),
        Err(Error::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Links touching a document, in either direction, newest first.
pub async fn links_for_doc(pool: &SqlitePool, doc_id: i64) -> Result<Vec<DocumentLink>> {
    let rows = sqlx::query(
        r#"
        SELECT id, source_doc_id, target_doc_id, kind, similarity_score, created_at
        FROM document_links
        WHERE source_doc_id = ? OR target_doc_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(doc_id)
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let kind: String = row.get("kind");
            Ok(DocumentLink {
                id: row.get("id"),
                source_doc_id: row.get("source_doc_id"),
                target_doc_id: row.get("target_doc_id"),
                kind: LinkKind::parse(&kind)?,
                similarity_score: row.get("similarity_score"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}
