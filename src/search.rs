//! Search pipeline: keyword, semantic, and hybrid retrieval.
//!
//! - **Keyword** — FTS5 over `documents_fts` with BM25 ranking.
//! - **Semantic** — cosine similarity over stored chunk embeddings,
//!   aggregated per document by max-of-chunk.
//! - **Hybrid** — both lists fused with Reciprocal Rank Fusion
//!   (`rrf(d) = Σ 1/(k + rank)`, k configurable, default 60). RRF is
//!   insensitive to score scales, so BM25 and cosine never need to be
//!   made commensurable; the min-max-normalised component scores are kept
//!   on each result for observability.
//!
//! Ordering: RRF desc, then semantic desc, keyword desc, `updated_at` desc,
//! id asc. Soft-deleted documents are invisible to every mode (the FTS
//! triggers exclude them and the vector scan filters them); `qa` documents
//! are excluded unless explicitly requested.

use rand::seq::SliceRandom;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;

use crate::config::Config;
use crate::documents;
use crate::embedding;
use crate::error::{Error, Result};
use crate::events;
use crate::models::{DocType, Document};
use crate::tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(Error::input(format!(
                "unknown search mode '{other}'; use keyword, semantic, or hybrid"
            ))),
        }
    }
}

/// Post-ranking filters. All are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Doc must carry every one of these tags.
    pub tags_all: Vec<String>,
    /// Doc must carry at least one of these tags.
    pub tags_any: Vec<String>,
    /// Doc must carry none of these tags.
    pub tags_none: Vec<String>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub modified_after: Option<i64>,
    pub modified_before: Option<i64>,
    pub doc_type: Option<DocType>,
    pub project: Option<String>,
    /// qa docs are hidden by default.
    pub include_qa: bool,
}

/// A ranked search hit with its component scores preserved.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub title: String,
    pub project: Option<String>,
    pub doc_type: DocType,
    pub updated_at: i64,
    pub snippet: String,
    /// Fused RRF score (or the single-mode rank score).
    pub score: f64,
    /// Min-max normalised BM25, when the doc appeared in the keyword list.
    pub keyword_score: Option<f64>,
    /// Best chunk cosine similarity, when the doc appeared in the vector list.
    pub semantic_score: Option<f64>,
}

/// Resolve a query + filters into a ranked page of documents.
pub async fn search_documents(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    mode: SearchMode,
    filters: &SearchFilters,
    limit: Option<i64>,
    offset: i64,
    fts_syntax: bool,
) -> Result<Vec<SearchResultItem>> {
    if query.trim().is_empty() {
        return Err(Error::input("search query must not be empty"));
    }

    if mode == SearchMode::Semantic && !config.embedding.is_enabled() {
        return Err(Error::input(
            "semantic mode requires embeddings; set [embedding] provider in config.toml",
        ));
    }

    let fts_query = if fts_syntax {
        query.to_string()
    } else {
        sanitize_query(query)
    };

    let keyword = if mode != SearchMode::Semantic {
        fetch_keyword_candidates(pool, &fts_query, config.retrieval.candidate_k_keyword).await?
    } else {
        Vec::new()
    };

    let semantic = if mode != SearchMode::Keyword && config.embedding.is_enabled() {
        fetch_semantic_candidates(pool, config, query, config.retrieval.candidate_k_vector).await?
    } else {
        Vec::new()
    };

    let mut items = fuse(pool, config, &keyword, &semantic, filters).await?;

    let final_limit = limit.unwrap_or(config.retrieval.final_limit).max(1) as usize;
    let start = (offset.max(0) as usize).min(items.len());
    let end = (start + final_limit).min(items.len());
    items = items[start..end].to_vec();

    events::record_standalone(
        pool,
        events::SEARCH,
        None,
        Some(&serde_json::json!({ "query": query, "hits": items.len() }).to_string()),
    )
    .await?;

    Ok(items)
}

/// Rank documents similar to an existing one, reusing its stored chunk
/// embeddings as the query. No embedding backend required.
pub async fn similar_documents(
    pool: &SqlitePool,
    config: &Config,
    doc_id: i64,
    limit: Option<i64>,
) -> Result<Vec<SearchResultItem>> {
    documents::get_live(pool, doc_id).await?;

    let own_rows = sqlx::query("SELECT embedding FROM chunk_vectors WHERE doc_id = ?")
        .bind(doc_id)
        .fetch_all(pool)
        .await?;
    let own: Vec<Vec<f32>> = own_rows
        .iter()
        .map(|row| embedding::blob_to_vec(row.get("embedding")))
        .collect();
    if own.is_empty() {
        return Err(Error::input(format!(
            "document {doc_id} has no stored embeddings; run `emdx maintain index`"
        )));
    }

    let rows = sqlx::query(
        r#"
        SELECT cv.doc_id, cv.embedding
        FROM chunk_vectors cv
        JOIN documents d ON d.id = cv.doc_id
        WHERE cv.doc_id != ? AND d.is_deleted = 0 AND d.doc_type != 'qa'
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    let mut best: HashMap<i64, f64> = HashMap::new();
    for row in &rows {
        let other_id: i64 = row.get("doc_id");
        let vec = embedding::blob_to_vec(row.get("embedding"));
        for q in &own {
            let sim = embedding::cosine_similarity(q, &vec) as f64;
            let entry = best.entry(other_id).or_insert(f64::MIN);
            if sim > *entry {
                *entry = sim;
            }
        }
    }

    let mut scored: Vec<(i64, f64)> = best.into_iter().collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit.unwrap_or(config.retrieval.final_limit).max(1) as usize);

    let mut items = Vec::with_capacity(scored.len());
    for (id, score) in scored {
        let doc = documents::get(pool, id).await?;
        items.push(SearchResultItem {
            id,
            title: doc.title,
            project: doc.project,
            doc_type: doc.doc_type,
            updated_at: doc.updated_at,
            snippet: excerpt(&doc.content),
            score,
            keyword_score: None,
            semantic_score: Some(score),
        });
    }
    Ok(items)
}

/// Rank normally, then sample `limit` results at random from the top `3 × limit`.
pub async fn wander(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    filters: &SearchFilters,
    limit: Option<i64>,
) -> Result<Vec<SearchResultItem>> {
    let k = limit.unwrap_or(config.retrieval.final_limit).max(1);
    let mut pool_items = search_documents(
        pool,
        config,
        query,
        SearchMode::Hybrid,
        filters,
        Some(k * 3),
        0,
        false,
    )
    .await?;

    let mut rng = rand::thread_rng();
    pool_items.shuffle(&mut rng);
    pool_items.truncate(k as usize);
    Ok(pool_items)
}

// ============ Query sanitisation ============

/// Characters FTS5 treats as syntax. A query containing any of them is
/// quoted wholesale unless the caller opted into operator syntax, so
/// `foo-bar` matches the literal text rather than erroring.
const FTS_OPERATOR_CHARS: &[char] = &['"', ':', '*', '^', '(', ')', '-', '+', '{', '}'];

pub(crate) fn sanitize_query(query: &str) -> String {
    if query.contains(FTS_OPERATOR_CHARS) {
        format!("\"{}\"", query.replace('"', "\"\""))
    } else {
        query.to_string()
    }
}

// ============ Candidates ============

#[derive(Debug, Clone)]
struct DocCandidate {
    doc_id: i64,
    /// Raw engine score: negated BM25 rank or cosine similarity.
    raw_score: f64,
    snippet: Option<String>,
}

/// FTS5 keyword candidates, best first. The virtual table appears only as
/// the subject of `MATCH`; documents are hydrated separately by id.
async fn fetch_keyword_candidates(
    pool: &SqlitePool,
    fts_query: &str,
    candidate_k: i64,
) -> Result<Vec<DocCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT rowid, rank,
               snippet(documents_fts, 1, '', '', '...', 24) AS snippet
        FROM documents_fts
        WHERE documents_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(fts_query)
    .bind(candidate_k)
    .fetch_all(pool)
    .await
    .map_err(|e| match crate::error::Error::from(e) {
        // An unparsable MATCH expression is the user's query, not storage.
        Error::Storage(msg) if msg.contains("fts5") => {
            Error::input(format!("unparsable search query: {msg}"))
        }
        other => other,
    })?;

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            DocCandidate {
                doc_id: row.get("rowid"),
                // FTS5 rank is negative (lower = better); negate to score.
                raw_score: -rank,
                snippet: row.get("snippet"),
            }
        })
        .collect())
}

/// Semantic candidates: embed the query, brute-force cosine over all live
/// chunk vectors, aggregate per doc by max-of-chunk.
async fn fetch_semantic_candidates(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<DocCandidate>> {
    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), query).await?;

    let rows = sqlx::query(
        r#"
        SELECT cv.doc_id, cv.chunk_index, cv.embedding,
               COALESCE(substr(c.text, 1, 160), '') AS snippet
        FROM chunk_vectors cv
        JOIN chunks c ON c.doc_id = cv.doc_id AND c.chunk_index = cv.chunk_index
        JOIN documents d ON d.id = cv.doc_id
        WHERE d.is_deleted = 0
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut best: HashMap<i64, DocCandidate> = HashMap::new();
    for row in &rows {
        let doc_id: i64 = row.get("doc_id");
        let vec = embedding::blob_to_vec(row.get("embedding"));
        let sim = embedding::cosine_similarity(&query_vec, &vec) as f64;
        let snippet: String = row.get("snippet");

        match best.get_mut(&doc_id) {
            Some(existing) if existing.raw_score >= sim => {}
            _ => {
                best.insert(
                    doc_id,
                    DocCandidate {
                        doc_id,
                        raw_score: sim,
                        snippet: Some(snippet),
                    },
                );
            }
        }
    }

    let mut candidates: Vec<DocCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k as usize);
    Ok(candidates)
}

// ============ Fusion ============

/// Reciprocal Rank Fusion over the candidate lists, followed by hydration
/// and post-filters.
async fn fuse(
    pool: &SqlitePool,
    config: &Config,
    keyword: &[DocCandidate],
    semantic: &[DocCandidate],
    filters: &SearchFilters,
) -> Result<Vec<SearchResultItem>> {
    let k = config.retrieval.rrf_k as f64;

    let norm_keyword = normalize_scores(keyword);

    struct Fused {
        rrf: f64,
        keyword_score: Option<f64>,
        semantic_score: Option<f64>,
        snippet: Option<String>,
    }

    let mut fused: HashMap<i64, Fused> = HashMap::new();

    for (rank, cand) in keyword.iter().enumerate() {
        let entry = fused.entry(cand.doc_id).or_insert(Fused {
            rrf: 0.0,
            keyword_score: None,
            semantic_score: None,
            snippet: None,
        });
        entry.rrf += 1.0 / (k + (rank + 1) as f64);
        entry.keyword_score = norm_keyword.get(&cand.doc_id).copied();
        if entry.snippet.is_none() {
            entry.snippet = cand.snippet.clone();
        }
    }

    for (rank, cand) in semantic.iter().enumerate() {
        let entry = fused.entry(cand.doc_id).or_insert(Fused {
            rrf: 0.0,
            keyword_score: None,
            semantic_score: None,
            snippet: None,
        });
        entry.rrf += 1.0 / (k + (rank + 1) as f64);
        entry.semantic_score = Some(cand.raw_score);
        if entry.snippet.is_none() {
            entry.snippet = cand.snippet.clone();
        }
    }

    let mut items = Vec::new();
    for (doc_id, f) in fused {
        let doc = match documents::get(pool, doc_id).await {
            Ok(d) => d,
            Err(Error::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        if doc.is_deleted {
            continue;
        }
        if !passes_filters(pool, &doc, filters).await? {
            continue;
        }
        items.push(SearchResultItem {
            id: doc.id,
            title: doc.title.clone(),
            project: doc.project.clone(),
            doc_type: doc.doc_type,
            updated_at: doc.updated_at,
            snippet: f
                .snippet
                .unwrap_or_else(|| excerpt(&doc.content)),
            score: f.rrf,
            keyword_score: f.keyword_score,
            semantic_score: f.semantic_score,
        });
    }

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| cmp_opt_desc(b.semantic_score, a.semantic_score))
            .then_with(|| cmp_opt_desc(b.keyword_score, a.keyword_score))
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.id.cmp(&b.id))
    });

    Ok(items)
}

fn cmp_opt_desc(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    a.unwrap_or(f64::MIN)
        .partial_cmp(&b.unwrap_or(f64::MIN))
        .unwrap_or(std::cmp::Ordering::Equal)
}

async fn passes_filters(
    pool: &SqlitePool,
    doc: &Document,
    filters: &SearchFilters,
) -> Result<bool> {
    if doc.doc_type == DocType::Qa && !filters.include_qa && filters.doc_type != Some(DocType::Qa) {
        return Ok(false);
    }
    if let Some(dt) = filters.doc_type {
        if doc.doc_type != dt {
            return Ok(false);
        }
    }
    if let Some(ref project) = filters.project {
        if doc.project.as_deref() != Some(project.as_str()) {
            return Ok(false);
        }
    }
    if let Some(after) = filters.created_after {
        if doc.created_at < after {
            return Ok(false);
        }
    }
    if let Some(before) = filters.created_before {
        if doc.created_at > before {
            return Ok(false);
        }
    }
    if let Some(after) = filters.modified_after {
        if doc.updated_at < after {
            return Ok(false);
        }
    }
    if let Some(before) = filters.modified_before {
        if doc.updated_at > before {
            return Ok(false);
        }
    }

    if !filters.tags_all.is_empty() || !filters.tags_any.is_empty() || !filters.tags_none.is_empty()
    {
        let doc_tags = tags::list_for_doc(pool, doc.id).await?;
        let has = |name: &str| {
            tags::canonicalize(name)
                .map(|n| doc_tags.contains(&n))
                .unwrap_or(false)
        };
        if !filters.tags_all.iter().all(|t| has(t)) {
            return Ok(false);
        }
        if !filters.tags_any.is_empty() && !filters.tags_any.iter().any(|t| has(t)) {
            return Ok(false);
        }
        if filters.tags_none.iter().any(|t| has(t)) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Min-max normalise raw scores to `[0, 1]` per doc id. All-equal sets
/// normalise to 1.0.
fn normalize_scores(candidates: &[DocCandidate]) -> HashMap<i64, f64> {
    if candidates.is_empty() {
        return HashMap::new();
    }
    let min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - min) / (max - min)
            };
            (c.doc_id, norm)
        })
        .collect()
}

fn excerpt(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let mut end = line.len().min(160);
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(doc_id: i64, score: f64) -> DocCandidate {
        DocCandidate {
            doc_id,
            raw_score: score,
            snippet: None,
        }
    }

    #[test]
    fn test_sanitize_plain_query_untouched() {
        assert_eq!(sanitize_query("token refresh"), "token refresh");
    }

    #[test]
    fn test_sanitize_quotes_operator_chars() {
        assert_eq!(sanitize_query("foo-bar"), "\"foo-bar\"");
        assert_eq!(sanitize_query("col:value"), "\"col:value\"");
        assert_eq!(sanitize_query("a \"b\" c"), "\"a \"\"b\"\" c\"");
    }

    #[test]
    fn test_normalize_range() {
        let scores = normalize_scores(&[cand(1, 10.0), cand(2, 5.0), cand(3, 0.0)]);
        assert!((scores[&1] - 1.0).abs() < 1e-9);
        assert!((scores[&2] - 0.5).abs() < 1e-9);
        assert!((scores[&3] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        let scores = normalize_scores(&[cand(1, 3.0), cand(2, 3.0)]);
        assert!((scores[&1] - 1.0).abs() < 1e-9);
        assert!((scores[&2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_rrf_prefers_doc_in_both_lists() {
        // Doc 1 ranks first in both lists; doc 2 only in one.
        let k = 60.0;
        let both = 1.0 / (k + 1.0) + 1.0 / (k + 1.0);
        let single = 1.0 / (k + 2.0);
        assert!(both > single);
    }

    #[test]
    fn test_excerpt_skips_blank_lines() {
        assert_eq!(excerpt("\n\n  first real line\nrest"), "first real line");
    }
}
