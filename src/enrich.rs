//! Post-write enrichment pipeline.
//!
//! Three passes run after a user-facing save or edit, each independently
//! togglable and each non-fatal: title-match linking, entity extraction +
//! entity linking, and semantic linking over chunk embeddings. A failing
//! pass logs a warning event; the original save has already committed and
//! is never affected.
//!
//! Small documents are enriched inline; larger ones are handed to a single
//! background worker draining a bounded queue (overflow drops the oldest
//! pending entry with a warning event). Enrichment is triggered only by
//! save/edit — link writes never re-enter the pipeline, so a link created
//! here cannot cascade.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::documents;
use crate::embedding;
use crate::error::Result;
use crate::events;
use crate::links;
use crate::models::{Document, LinkKind};

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").unwrap());
static PROPER_NOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z0-9]+(?:\s[A-Z][a-z0-9]+)+)\b").unwrap());
static CODE_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([A-Za-z_][A-Za-z0-9_.:]{2,})`").unwrap());

/// Owns the background worker and the bounded queue. One per process.
pub struct Enricher {
    pool: SqlitePool,
    config: Config,
    queue: Arc<Queue>,
}

struct Queue {
    pending: Mutex<VecDeque<i64>>,
    notify: Notify,
    capacity: usize,
    /// No-reentry guard: set while the worker is inside the pipeline.
    busy: AtomicBool,
}

impl Enricher {
    /// Create the enricher and spawn its worker task.
    pub fn new(pool: SqlitePool, config: Config) -> Arc<Self> {
        let queue = Arc::new(Queue {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: config.enrichment.queue_capacity,
            busy: AtomicBool::new(false),
        });

        let enricher = Arc::new(Self {
            pool: pool.clone(),
            config: config.clone(),
            queue: queue.clone(),
        });

        let worker = enricher.clone();
        tokio::spawn(async move {
            loop {
                worker.queue.notify.notified().await;
                loop {
                    let next = worker.queue.pending.lock().await.pop_front();
                    let Some(doc_id) = next else { break };
                    worker.queue.busy.store(true, Ordering::SeqCst);
                    if let Err(e) = enrich_document(&worker.pool, &worker.config, doc_id).await {
                        tracing::warn!(doc_id, error = %e, "enrichment worker pass failed");
                    }
                    worker.queue.busy.store(false, Ordering::SeqCst);
                }
            }
        });

        enricher
    }

    /// Called by the facade after a save or edit has committed. Small docs
    /// are enriched inline; larger ones are queued.
    pub async fn after_write(&self, doc: &Document) {
        if !self.config.enrichment.auto_link_on_save {
            return;
        }

        if doc.content.len() <= self.config.enrichment.inline_max_bytes {
            if let Err(e) = enrich_document(&self.pool, &self.config, doc.id).await {
                tracing::warn!(doc_id = doc.id, error = %e, "inline enrichment failed");
            }
            return;
        }

        let mut pending = self.queue.pending.lock().await;
        if pending.len() >= self.queue.capacity {
            if let Some(dropped) = pending.pop_front() {
                tracing::warn!(doc_id = dropped, "enrichment queue full, dropping oldest entry");
                let _ = events::record_standalone(
                    &self.pool,
                    events::WARNING,
                    Some(dropped),
                    Some("{\"reason\":\"enrichment_queue_overflow\"}"),
                )
                .await;
            }
        }
        pending.push_back(doc.id);
        drop(pending);
        self.queue.notify.notify_one();
    }

    /// Wait for the queue to empty. The CLI calls this before exiting so a
    /// short-lived process doesn't abandon queued work.
    pub async fn drain(&self) {
        loop {
            let empty = self.queue.pending.lock().await.is_empty();
            if empty && !self.queue.busy.load(Ordering::SeqCst) {
                return;
            }
            self.queue.notify.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Drop all queued work (cancellation path).
    pub async fn clear(&self) {
        self.queue.pending.lock().await.clear();
    }
}

/// Run the full pipeline for one document. Each layer is retry-safe and
/// individually non-fatal.
pub async fn enrich_document(pool: &SqlitePool, config: &Config, doc_id: i64) -> Result<()> {
    let doc = match documents::get_live(pool, doc_id).await {
        Ok(d) => d,
        // Deleted or purged since the write; nothing to enrich.
        Err(_) => return Ok(()),
    };

    if config.enrichment.title_match {
        if let Err(e) = title_match_pass(pool, &doc).await {
            warn_pass(pool, doc_id, "title_match", &e).await;
        }
    }

    if config.enrichment.entities {
        if let Err(e) = entity_pass(pool, &doc).await {
            warn_pass(pool, doc_id, "entities", &e).await;
        }
    }

    // Chunks are rebuilt whenever content changes; embeddings only when a
    // backend is configured.
    if let Err(e) = reindex_chunks(pool, config, &doc).await {
        warn_pass(pool, doc_id, "chunks", &e).await;
    }

    if config.enrichment.semantic && config.embedding.is_enabled() {
        if let Err(e) = semantic_pass(pool, config, &doc).await {
            warn_pass(pool, doc_id, "semantic", &e).await;
        }
    }

    Ok(())
}

async fn warn_pass(pool: &SqlitePool, doc_id: i64, pass: &str, e: &crate::error::Error) {
    tracing::warn!(doc_id, pass, error = %e, "enrichment pass failed");
    let _ = events::record_standalone(
        pool,
        events::WARNING,
        Some(doc_id),
        Some(&format!("{{\"pass\":\"{pass}\",\"error\":\"enrichment failed\"}}")),
    )
    .await;
}

// ============ Layer 1: title-match linking ============

/// Link to any live document whose title appears verbatim in this doc's
/// content (case-insensitive, word-boundary aware).
async fn title_match_pass(pool: &SqlitePool, doc: &Document) -> Result<()> {
    let titles = documents::live_titles(pool).await?;

    for (other_id, title) in titles {
        if other_id == doc.id || title.trim().len() < 3 {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(title.trim()));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if re.is_match(&doc.content) {
            links::link_if_absent(pool, doc.id, other_id, LinkKind::TitleMatch, None).await?;
        }
    }
    Ok(())
}

// ============ Layer 2: entity extraction + linking ============

/// Extract typed entities from content.
pub fn extract_entities(content: &str) -> Vec<(String, &'static str)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for caps in HEADING.captures_iter(content) {
        let name = caps[1].trim().to_string();
        if name.len() >= 3 && seen.insert((name.clone(), "heading")) {
            out.push((name, "heading"));
        }
    }
    for caps in PROPER_NOUN.captures_iter(content) {
        let name = caps[1].to_string();
        if seen.insert((name.clone(), "proper_noun")) {
            out.push((name, "proper_noun"));
        }
    }
    for caps in CODE_IDENT.captures_iter(content) {
        let name = caps[1].to_string();
        if seen.insert((name.clone(), "code")) {
            out.push((name, "code"));
        }
    }
    out
}

/// Persist this doc's entities, then link any other doc sharing a heading
/// or proper-noun entity.
async fn entity_pass(pool: &SqlitePool, doc: &Document) -> Result<()> {
    let entities = extract_entities(&doc.content);

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM entities WHERE doc_id = ?")
        .bind(doc.id)
        .execute(&mut *tx)
        .await?;
    for (name, entity_type) in &entities {
        sqlx::query("INSERT OR IGNORE INTO entities (doc_id, name, entity_type) VALUES (?, ?, ?)")
            .bind(doc.id)
            .bind(name)
            .bind(entity_type)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    // Shared-entity candidates: headings and proper nouns only.
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT e2.doc_id AS other_id
        FROM entities e1
        JOIN entities e2 ON e2.name = e1.name AND e2.entity_type = e1.entity_type
        JOIN documents d ON d.id = e2.doc_id
        WHERE e1.doc_id = ?
          AND e2.doc_id != ?
          AND e1.entity_type IN ('heading', 'proper_noun')
          AND d.is_deleted = 0
        "#,
    )
    .bind(doc.id)
    .bind(doc.id)
    .fetch_all(pool)
    .await?;

    for row in rows {
        let other_id: i64 = row.get("other_id");
        links::link_if_absent(pool, doc.id, other_id, LinkKind::Entity, None).await?;
    }
    Ok(())
}

// ============ Layer 3: chunks + semantic linking ============

/// Rebuild a document's chunks (and their embeddings when enabled).
pub async fn reindex_chunks(pool: &SqlitePool, config: &Config, doc: &Document) -> Result<()> {
    let chunks = chunk_text(
        doc.id,
        &doc.content,
        config.chunking.max_tokens,
        config.chunking.overlap_tokens,
    );

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunk_vectors WHERE doc_id = ?")
        .bind(doc.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(doc.id)
        .execute(&mut *tx)
        .await?;
    for chunk in &chunks {
        sqlx::query(
            "INSERT INTO chunks (doc_id, chunk_index, text, token_count) VALUES (?, ?, ?, ?)",
        )
        .bind(chunk.doc_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.token_count)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    if config.embedding.is_enabled() {
        let provider = embedding::create_provider(&config.embedding)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        for (batch_start, batch) in texts.chunks(config.embedding.batch_size).enumerate() {
            let vectors = provider.embed(batch).await?;
            let mut tx = pool.begin().await?;
            for (offset, vector) in vectors.iter().enumerate() {
                let index = (batch_start * config.embedding.batch_size + offset) as i64;
                sqlx::query(
                    "INSERT OR REPLACE INTO chunk_vectors (doc_id, chunk_index, embedding) VALUES (?, ?, ?)",
                )
                .bind(doc.id)
                .bind(index)
                .bind(embedding::vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
    }

    Ok(())
}

/// Compare this doc's chunk vectors against every other live doc's chunks;
/// link pairs whose best chunk similarity clears the threshold. Works
/// entirely from stored vectors, so no provider round-trip is needed.
async fn semantic_pass(pool: &SqlitePool, config: &Config, doc: &Document) -> Result<()> {
    let own_rows = sqlx::query("SELECT embedding FROM chunk_vectors WHERE doc_id = ?")
        .bind(doc.id)
        .fetch_all(pool)
        .await?;
    let own_vectors: Vec<Vec<f32>> = own_rows
        .iter()
        .map(|row| embedding::blob_to_vec(row.get("embedding")))
        .collect();
    if own_vectors.is_empty() {
        return Ok(());
    }

    let other_rows = sqlx::query(
        r#"
        SELECT cv.doc_id, cv.embedding
        FROM chunk_vectors cv
        JOIN documents d ON d.id = cv.doc_id
        WHERE cv.doc_id != ? AND d.is_deleted = 0
        "#,
    )
    .bind(doc.id)
    .fetch_all(pool)
    .await?;

    let mut best: HashMap<i64, f32> = HashMap::new();
    for row in &other_rows {
        let other_id: i64 = row.get("doc_id");
        let other_vec = embedding::blob_to_vec(row.get("embedding"));
        for own in &own_vectors {
            let sim = embedding::cosine_similarity(own, &other_vec);
            let entry = best.entry(other_id).or_insert(f32::MIN);
            if sim > *entry {
                *entry = sim;
            }
        }
    }

    for (other_id, score) in best {
        if score >= config.enrichment.semantic_link_threshold {
            links::link_if_absent(pool, doc.id, other_id, LinkKind::Semantic, Some(score as f64))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_headings() {
        let content = "# Rate Limiting\n\nBody text.\n\n## Token Bucket\n\nMore.";
        let entities = extract_entities(content);
        assert!(entities.contains(&("Rate Limiting".to_string(), "heading")));
        assert!(entities.contains(&("Token Bucket".to_string(), "heading")));
    }

    #[test]
    fn test_extract_proper_nouns() {
        let content = "We migrated from Google Drive to a local store.";
        let entities = extract_entities(content);
        assert!(entities.contains(&("Google Drive".to_string(), "proper_noun")));
    }

    #[test]
    fn test_extract_code_identifiers() {
        let content = "Call `update_content` then `documents.purge_trash` to clean up.";
        let entities = extract_entities(content);
        assert!(entities.contains(&("update_content".to_string(), "code")));
        assert!(entities.contains(&("documents.purge_trash".to_string(), "code")));
    }

    #[test]
    fn test_extract_dedupes() {
        let content = "# Alpha\n\n# Alpha\n\nAlpha Beta and Alpha Beta again.";
        let entities = extract_entities(content);
        let headings: Vec<_> = entities.iter().filter(|(_, t)| *t == "heading").collect();
        assert_eq!(headings.len(), 1);
        let nouns: Vec<_> = entities.iter().filter(|(_, t)| *t == "proper_noun").collect();
        assert_eq!(nouns.len(), 1);
    }

    #[test]
    fn test_short_entities_skipped() {
        let entities = extract_entities("# ab\n\n`x`");
        assert!(entities.is_empty());
    }
}
