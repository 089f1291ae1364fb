//! Wiki generation: topic clustering + LLM article synthesis.
//!
//! Topics are tag clusters: every tag carried by at least `MIN_CLUSTER_DOCS`
//! live documents becomes a candidate article. For each cluster the member
//! documents' excerpts are fed to the LLM, and the generated article is
//! saved as a `wiki` document linked back to its sources. Regeneration
//! replaces the previous article for the same topic via content update, so
//! repeated runs do not pile up duplicates.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::documents;
use crate::error::{Error, Result};
use crate::links;
use crate::llm;
use crate::models::{DocType, LinkKind};

const MIN_CLUSTER_DOCS: i64 = 3;
const MAX_CLUSTER_DOCS: i64 = 8;
const EXCERPT_CHARS: usize = 800;

/// A generated or refreshed wiki article.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WikiArticle {
    pub doc_id: i64,
    pub topic: String,
    pub source_doc_ids: Vec<i64>,
}

/// Generate one article per qualifying tag cluster.
pub async fn generate(
    pool: &SqlitePool,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Vec<WikiArticle>> {
    let topics = cluster_topics(pool).await?;
    let mut articles = Vec::new();

    for topic in topics {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match generate_topic(pool, config, &topic, cancel).await {
            Ok(article) => articles.push(article),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "wiki article generation failed"),
        }
    }

    Ok(articles)
}

/// Tags carried by enough live user documents to warrant an article.
async fn cluster_topics(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT t.name, COUNT(d.id) AS members
        FROM tags t
        JOIN document_tags dt ON dt.tag_id = t.id
        JOIN documents d ON d.id = dt.document_id
        WHERE d.is_deleted = 0 AND d.doc_type = 'user'
        GROUP BY t.id
        HAVING members >= ?
        ORDER BY members DESC, t.name
        "#,
    )
    .bind(MIN_CLUSTER_DOCS)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .filter(|name| name != "subagent" && !name.starts_with("agent:") && name != "wiki")
        .collect())
}

async fn generate_topic(
    pool: &SqlitePool,
    config: &Config,
    topic: &str,
    cancel: &CancellationToken,
) -> Result<WikiArticle> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.title, d.content
        FROM documents d
        JOIN document_tags dt ON dt.document_id = d.id
        JOIN tags t ON t.id = dt.tag_id
        WHERE t.name = ? AND d.is_deleted = 0 AND d.doc_type = 'user'
        ORDER BY d.updated_at DESC
        LIMIT ?
        "#,
    )
    .bind(topic)
    .bind(MAX_CLUSTER_DOCS)
    .fetch_all(pool)
    .await?;

    let mut source_doc_ids = Vec::with_capacity(rows.len());
    let mut prompt = format!(
        "Write a concise wiki article about \"{topic}\" from the notes below. \
         Use markdown with a single top-level heading. Synthesize; do not quote \
         the notes verbatim.\n"
    );
    for row in &rows {
        let id: i64 = row.get("id");
        let title: String = row.get("title");
        let content: String = row.get("content");
        source_doc_ids.push(id);
        let mut end = content.len().min(EXCERPT_CHARS);
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }
        prompt.push_str(&format!("\n## Note: {title}\n{}\n", &content[..end]));
    }

    let article = llm::run_llm(&config.execution.llm_command, &prompt, cancel).await?;
    if article.trim().is_empty() {
        return Err(Error::ExecutionFailed("llm returned an empty article".into()));
    }

    let title = format!("Wiki: {topic}");
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE title = ? AND doc_type = 'wiki' AND is_deleted = 0",
    )
    .bind(&title)
    .fetch_optional(pool)
    .await?;

    let doc_id = match existing {
        Some(id) => {
            documents::update_content(pool, id, &article).await?;
            id
        }
        None => {
            let doc = documents::save(
                pool,
                &title,
                &article,
                None,
                DocType::Wiki,
                &["wiki".to_string(), topic.to_string()],
            )
            .await?;
            doc.id
        }
    };

    for &source_id in &source_doc_ids {
        links::link_if_absent(pool, doc_id, source_id, LinkKind::Manual, None).await?;
    }

    Ok(WikiArticle {
        doc_id,
        topic: topic.to_string(),
        source_doc_ids,
    })
}
