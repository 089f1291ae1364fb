//! Tag repository.
//!
//! Tag names are canonical: whitespace-trimmed and lowercased before any
//! lookup or insert, so `"Foo"`, `"foo"`, and `"  foo  "` all resolve to the
//! single tag `foo`. Attachment is idempotent.

use sqlx::sqlite::SqlitePool;
use sqlx::{Row, Sqlite, Transaction};

use crate::documents;
use crate::error::Result;
use crate::events;

/// Canonical form of a tag name. Returns `None` for blank input.
pub fn canonicalize(raw: &str) -> Option<String> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Attach tags inside an existing transaction (used by document save).
/// Unknown tags are created; duplicates are ignored.
pub(crate) async fn attach_tags(
    tx: &mut Transaction<'_, Sqlite>,
    doc_id: i64,
    raw_names: &[String],
) -> Result<()> {
    for raw in raw_names {
        let Some(name) = canonicalize(raw) else {
            continue;
        };

        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(&name)
            .execute(&mut **tx)
            .await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO document_tags (document_id, tag_id)
            SELECT ?, id FROM tags WHERE name = ?
            "#,
        )
        .bind(doc_id)
        .bind(&name)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Add tags to an existing document. Idempotent.
pub async fn add_tags(pool: &SqlitePool, doc_id: i64, raw_names: &[String]) -> Result<Vec<String>> {
    documents::get(pool, doc_id).await?;

    let mut tx = pool.begin().await?;
    attach_tags(&mut tx, doc_id, raw_names).await?;
    events::record(&mut tx, events::TAG, Some(doc_id), None).await?;
    tx.commit().await?;

    list_for_doc(pool, doc_id).await
}

/// Detach tags from a document. Unknown names are ignored.
pub async fn remove_tags(
    pool: &SqlitePool,
    doc_id: i64,
    raw_names: &[String],
) -> Result<Vec<String>> {
    documents::get(pool, doc_id).await?;

    let mut tx = pool.begin().await?;
    for raw in raw_names {
        let Some(name) = canonicalize(raw) else {
            continue;
        };
        sqlx::query(
            "DELETE FROM document_tags WHERE document_id = ? AND tag_id IN (SELECT id FROM tags WHERE name = ?)",
        )
        .bind(doc_id)
        .bind(&name)
        .execute(&mut *tx)
        .await?;
    }
    events::record(&mut tx, events::TAG, Some(doc_id), None).await?;
    tx.commit().await?;

    list_for_doc(pool, doc_id).await
}

/// Tags on a document, alphabetical.
pub async fn list_for_doc(pool: &SqlitePool, doc_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT t.name FROM tags t
        JOIN document_tags dt ON dt.tag_id = t.id
        WHERE dt.document_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// All tags with usage counts over live documents, most used first.
pub async fn legend(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT t.name, COUNT(d.id) AS uses
        FROM tags t
        LEFT JOIN document_tags dt ON dt.tag_id = t.id
        LEFT JOIN documents d ON d.id = dt.document_id AND d.is_deleted = 0
        GROUP BY t.id
        ORDER BY uses DESC, t.name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("name"), row.get("uses")))
        .collect())
}

/// Live doc ids carrying a given tag.
pub async fn docs_with_tag(pool: &SqlitePool, raw_name: &str) -> Result<Vec<i64>> {
    let Some(name) = canonicalize(raw_name) else {
        return Ok(Vec::new());
    };
    let rows = sqlx::query(
        r#"
        SELECT d.id FROM documents d
        JOIN document_tags dt ON dt.document_id = d.id
        JOIN tags t ON t.id = dt.tag_id
        WHERE t.name = ? AND d.is_deleted = 0
        ORDER BY d.id
        "#,
    )
    .bind(&name)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("Foo"), Some("foo".to_string()));
        assert_eq!(canonicalize("  foo  "), Some("foo".to_string()));
        assert_eq!(canonicalize("BUG-Fix"), Some("bug-fix".to_string()));
        assert_eq!(canonicalize("   "), None);
        assert_eq!(canonicalize(""), None);
    }
}
