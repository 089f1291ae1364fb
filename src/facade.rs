//! Stable operation interface consumed by the CLI (and any other frontend).
//!
//! Every operation is a typed input-output function over the data model,
//! search pipeline, and execution subsystem. Nothing here prints: rendering
//! (plain, rich, or JSON) is the caller's responsibility, and every result
//! type serialises for `--json`.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backup;
use crate::config::Config;
use crate::db;
use crate::documents;
use crate::enrich::{self, Enricher};
use crate::error::{Error, Result};
use crate::events;
use crate::exec::{self, DelegateOutcome, SpawnOpts};
use crate::links;
use crate::llm;
use crate::models::{
    DocType, Document, DocumentLink, DocumentVersion, Execution, ExecutionStatus, KnowledgeEvent,
    Task, TaskStatus,
};
use crate::search::{self, SearchFilters, SearchMode, SearchResultItem};
use crate::tags;
use crate::tasks::{self, AddTaskOpts, EpicProgress, StatusChange};
use crate::wiki::{self, WikiArticle};

/// The open knowledge store: pool + config + enrichment worker.
pub struct Store {
    pool: SqlitePool,
    config: Config,
    enricher: Arc<Enricher>,
}

impl Store {
    /// Open the database, migrate the schema, reap stale executions, and
    /// take the daily backup (best-effort).
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::open(&config).await?;

        let reaped = exec::reap_stale(
            &pool,
            db::now(),
            config.execution.stale_threshold_seconds,
        )
        .await?;
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), "reaped stale executions");
        }

        if let Err(e) = backup::run_daily(&pool, &config).await {
            tracing::warn!(error = %e, "daily backup failed");
        }

        let enricher = Enricher::new(pool.clone(), config.clone());
        Ok(Self {
            pool,
            config,
            enricher,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finish queued background work and close the pool.
    pub async fn shutdown(self) {
        self.enricher.drain().await;
        self.pool.close().await;
    }

    /// Drop queued enrichment on cancellation.
    pub async fn abort_background(&self) {
        self.enricher.clear().await;
    }

    // ============ Documents ============

    pub async fn save(&self, args: SaveArgs) -> Result<SavedDoc> {
        let (content, fallback_title) = match args.source {
            SaveSource::Text(text) => (text, None),
            SaveSource::File(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::input(format!("failed to read {}: {e}", path.display()))
                })?;
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned());
                (content, stem)
            }
        };

        let title = args
            .title
            .or(fallback_title)
            .ok_or_else(|| Error::input("a title is required (pass --title)"))?;

        let doc_type = match args.doc_type {
            Some(dt) => dt,
            None => DocType::parse(&self.config.execution.default_doc_type)?,
        };

        let doc = db::with_busy_retry(|| {
            documents::save(
                &self.pool,
                &title,
                &content,
                args.project.as_deref(),
                doc_type,
                &args.tags,
            )
        })
        .await?;

        if args.auto_link {
            self.enricher.after_write(&doc).await;
        }

        let tags = tags::list_for_doc(&self.pool, doc.id).await?;
        Ok(SavedDoc { document: doc, tags })
    }

    pub async fn edit(&self, id: i64, new_content: &str) -> Result<Document> {
        let before = documents::get_live(&self.pool, id).await?;
        let doc =
            db::with_busy_retry(|| documents::update_content(&self.pool, id, new_content)).await?;
        if doc.current_version != before.current_version {
            self.enricher.after_write(&doc).await;
        }
        Ok(doc)
    }

    pub async fn view(&self, id: i64) -> Result<DocumentView> {
        let document = documents::view(&self.pool, id).await?;
        let tags = tags::list_for_doc(&self.pool, id).await?;
        let links = links::links_for_doc(&self.pool, id).await?;
        Ok(DocumentView {
            document,
            tags,
            links,
        })
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        documents::soft_delete(&self.pool, id).await
    }

    pub async fn restore(&self, id: i64) -> Result<Document> {
        documents::restore(&self.pool, id).await
    }

    pub async fn versions(&self, id: i64) -> Result<Vec<DocumentVersion>> {
        documents::version_history(&self.pool, id).await
    }

    // ============ Search ============

    pub async fn find(&self, args: FindArgs) -> Result<Vec<SearchResultItem>> {
        if let Some(n) = args.recent {
            let docs = documents::list_recent(&self.pool, n, args.filters.include_qa).await?;
            return Ok(docs
                .into_iter()
                .map(|d| SearchResultItem {
                    id: d.id,
                    title: d.title,
                    project: d.project,
                    doc_type: d.doc_type,
                    updated_at: d.updated_at,
                    snippet: d.content.lines().next().unwrap_or("").to_string(),
                    score: 0.0,
                    keyword_score: None,
                    semantic_score: None,
                })
                .collect());
        }

        if let Some(doc_id) = args.similar_to {
            return search::similar_documents(&self.pool, &self.config, doc_id, args.limit).await;
        }

        let query = args
            .query
            .as_deref()
            .ok_or_else(|| Error::input("search query must not be empty"))?;

        if args.wander {
            return search::wander(&self.pool, &self.config, query, &args.filters, args.limit)
                .await;
        }

        search::search_documents(
            &self.pool,
            &self.config,
            query,
            args.mode,
            &args.filters,
            args.limit,
            args.offset,
            args.fts_syntax,
        )
        .await
    }

    /// Answer a question from the store: rank, hand the top chunks to the
    /// LLM, and persist the answer as a `qa` document.
    pub async fn ask(&self, question: &str, cancel: &CancellationToken) -> Result<QaResult> {
        let hits = search::search_documents(
            &self.pool,
            &self.config,
            question,
            SearchMode::Hybrid,
            &SearchFilters::default(),
            Some(self.config.retrieval.final_limit),
            0,
            false,
        )
        .await?;

        if hits.is_empty() {
            return Err(Error::not_found(format!(
                "no documents match '{question}'"
            )));
        }

        let mut context = String::new();
        let mut source_doc_ids = Vec::new();
        let mut remaining = self.config.retrieval.ask_context_chunks;
        for hit in &hits {
            if remaining == 0 {
                break;
            }
            let chunks: Vec<String> = sqlx::query_scalar(
                "SELECT text FROM chunks WHERE doc_id = ? ORDER BY chunk_index LIMIT ?",
            )
            .bind(hit.id)
            .bind(remaining as i64)
            .fetch_all(&self.pool)
            .await?;

            let used = if chunks.is_empty() {
                // Unindexed doc: fall back to its leading content.
                let doc = documents::get(&self.pool, hit.id).await?;
                let mut end = doc.content.len().min(2000);
                while end > 0 && !doc.content.is_char_boundary(end) {
                    end -= 1;
                }
                context.push_str(&format!("\n## {}\n{}\n", hit.title, &doc.content[..end]));
                1
            } else {
                for chunk in &chunks {
                    context.push_str(&format!("\n## {}\n{chunk}\n", hit.title));
                }
                chunks.len()
            };
            remaining = remaining.saturating_sub(used);
            source_doc_ids.push(hit.id);
        }

        let prompt = format!(
            "Answer the question using only the context below. If the context \
             is insufficient, say so.\n\nQuestion: {question}\n\nContext:\n{context}"
        );
        let answer = llm::run_llm(&self.config.execution.llm_command, &prompt, cancel).await?;

        let doc = documents::save(
            &self.pool,
            &format!("Q: {question}"),
            &answer,
            None,
            DocType::Qa,
            &["qa".to_string()],
        )
        .await?;

        Ok(QaResult {
            question: question.to_string(),
            answer,
            source_doc_ids,
            doc_id: doc.id,
        })
    }

    // ============ Executions ============

    /// Spawn one agent per prompt and stream outcomes in completion order.
    pub async fn delegate<F>(
        &self,
        args: DelegateArgs,
        cancel: &CancellationToken,
        on_result: F,
    ) -> Result<DelegateBatch>
    where
        F: FnMut(&DelegateOutcome),
    {
        let task_id = match &args.task {
            Some(task_ref) => Some(tasks::resolve_identifier(&self.pool, task_ref).await?.id),
            None => None,
        };

        let opts = SpawnOpts {
            agent_type: args.agent_type,
            worktree: args.worktree,
            repo_dir: args.repo_dir,
            base_branch: args.base_branch,
            pr: args.pr,
            task_id,
        };

        let outcomes =
            exec::delegate(&self.pool, &self.config, &args.prompts, &opts, cancel, on_result)
                .await?;

        let synthesis_doc_id = if args.synthesize {
            self.synthesize(&outcomes, cancel).await?
        } else {
            None
        };

        Ok(DelegateBatch {
            outcomes,
            synthesis_doc_id,
        })
    }

    async fn synthesize(
        &self,
        outcomes: &[DelegateOutcome],
        cancel: &CancellationToken,
    ) -> Result<Option<i64>> {
        let collected: Vec<&DelegateOutcome> = outcomes
            .iter()
            .filter(|o| o.execution.status == ExecutionStatus::Completed)
            .collect();
        if collected.len() < 2 {
            return Ok(None);
        }

        let mut prompt = String::from(
            "Combine the following agent outputs into one coherent document. \
             Preserve all substantive findings; remove duplication.\n",
        );
        for outcome in &collected {
            if let Some(output) = &outcome.output {
                prompt.push_str(&format!("\n## {}\n{output}\n", outcome.execution.doc_title));
            }
        }

        let combined = llm::run_llm(&self.config.execution.llm_command, &prompt, cancel).await?;
        let doc = documents::save(
            &self.pool,
            &format!("Synthesis of {} agent outputs", collected.len()),
            &combined,
            None,
            DocType::User,
            &["subagent".to_string(), "synthesis".to_string()],
        )
        .await?;
        self.enricher.after_write(&doc).await;
        Ok(Some(doc.id))
    }

    pub async fn executions(&self, status: Option<ExecutionStatus>) -> Result<Vec<Execution>> {
        exec::list(&self.pool, status).await
    }

    pub async fn execution_log(&self, exec_id: i64, max_bytes: usize) -> Result<String> {
        let execution = exec::get(&self.pool, exec_id).await?;
        exec::tail_log(std::path::Path::new(&execution.log_file), max_bytes)
    }

    // ============ Tasks ============

    pub async fn task_add(&self, title: &str, opts: AddTaskOpts) -> Result<Task> {
        tasks::add(&self.pool, title, opts).await
    }

    pub async fn task_status(&self, ident: &str, status: TaskStatus) -> Result<StatusChange> {
        let task = tasks::resolve_identifier(&self.pool, ident).await?;
        tasks::set_status(&self.pool, task.id, status).await
    }

    pub async fn task_view(&self, ident: &str) -> Result<TaskView> {
        let task = tasks::resolve_identifier(&self.pool, ident).await?;
        let blockers = tasks::blockers_of(&self.pool, task.id).await?;
        let dependants = tasks::dependants_of(&self.pool, task.id).await?;
        Ok(TaskView {
            task,
            blockers,
            dependants,
        })
    }

    pub async fn task_list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        tasks::list(&self.pool, status).await
    }

    pub async fn task_ready(&self) -> Result<Vec<Task>> {
        tasks::ready(&self.pool).await
    }

    pub async fn task_dep_add(&self, blocked: &str, blocker: &str) -> Result<()> {
        let blocked = tasks::resolve_identifier(&self.pool, blocked).await?.id;
        let blocker = tasks::resolve_identifier(&self.pool, blocker).await?.id;
        tasks::add_dependency(&self.pool, blocked, blocker).await
    }

    pub async fn task_dep_remove(&self, blocked: &str, blocker: &str) -> Result<()> {
        let blocked = tasks::resolve_identifier(&self.pool, blocked).await?.id;
        let blocker = tasks::resolve_identifier(&self.pool, blocker).await?.id;
        tasks::remove_dependency(&self.pool, blocked, blocker).await
    }

    pub async fn task_chain(&self, ident: &str) -> Result<Vec<Task>> {
        let task = tasks::resolve_identifier(&self.pool, ident).await?;
        tasks::chain(&self.pool, task.id).await
    }

    pub async fn task_epic_progress(&self, ident: &str) -> Result<EpicProgress> {
        tasks::epic_progress(&self.pool, ident).await
    }

    pub async fn task_categories(&self) -> Result<Vec<(String, String, i64)>> {
        tasks::list_categories(&self.pool).await
    }

    // ============ Tags ============

    pub async fn tag_add(&self, doc_id: i64, names: &[String]) -> Result<Vec<String>> {
        tags::add_tags(&self.pool, doc_id, names).await
    }

    pub async fn tag_remove(&self, doc_id: i64, names: &[String]) -> Result<Vec<String>> {
        tags::remove_tags(&self.pool, doc_id, names).await
    }

    pub async fn tag_list(&self, doc_id: i64) -> Result<Vec<String>> {
        documents::get(&self.pool, doc_id).await?;
        tags::list_for_doc(&self.pool, doc_id).await
    }

    pub async fn tag_legend(&self) -> Result<Vec<(String, i64)>> {
        tags::legend(&self.pool).await
    }

    // ============ Maintenance ============

    /// Purge old trash and rebuild the FTS index from the documents table.
    pub async fn maintain_compact(&self, older_than_days: i64) -> Result<CompactReport> {
        let purged = documents::purge_trash(&self.pool, older_than_days * 86_400).await?;

        // The rebuild repopulates from every row; soft-deleted docs are
        // then removed again so search visibility stays correct.
        sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO documents_fts(documents_fts, rowid, title, content, project)
            SELECT 'delete', id, title, content, COALESCE(project, '')
            FROM documents WHERE is_deleted = 1
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(CompactReport { purged })
    }

    /// Rebuild chunks (and embeddings when enabled) for every live doc.
    pub async fn maintain_index(&self) -> Result<usize> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE is_deleted = 0")
            .fetch_all(&self.pool)
            .await?;
        for &id in &ids {
            let doc = documents::get(&self.pool, id).await?;
            enrich::reindex_chunks(&self.pool, &self.config, &doc).await?;
        }
        Ok(ids.len())
    }

    /// Backfill enrichment links for every live doc.
    pub async fn maintain_link(&self) -> Result<usize> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE is_deleted = 0")
            .fetch_all(&self.pool)
            .await?;
        for &id in &ids {
            enrich::enrich_document(&self.pool, &self.config, id).await?;
        }
        Ok(ids.len())
    }

    /// Integrity check + VACUUM. Returns the integrity result string.
    pub async fn maintain_vacuum(&self) -> Result<String> {
        let integrity: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(integrity)
    }

    pub async fn maintain_wiki(&self, cancel: &CancellationToken) -> Result<Vec<WikiArticle>> {
        wiki::generate(&self.pool, &self.config, cancel).await
    }

    // ============ Digests ============

    pub async fn status(&self) -> Result<StatusReport> {
        let count = |sql: &'static str| {
            let pool = self.pool.clone();
            async move {
                let n: i64 = sqlx::query_scalar(sql).fetch_one(&pool).await?;
                Ok::<i64, Error>(n)
            }
        };

        Ok(StatusReport {
            db_path: self.config.db_path().display().to_string(),
            documents_live: count("SELECT COUNT(*) FROM documents WHERE is_deleted = 0").await?,
            documents_trashed: count("SELECT COUNT(*) FROM documents WHERE is_deleted = 1").await?,
            tags: count("SELECT COUNT(*) FROM tags").await?,
            tasks_open: count("SELECT COUNT(*) FROM tasks WHERE status IN ('open','active','blocked')").await?,
            tasks_done: count("SELECT COUNT(*) FROM tasks WHERE status = 'done'").await?,
            executions_running: count("SELECT COUNT(*) FROM executions WHERE status = 'running'")
                .await?,
            events: count("SELECT COUNT(*) FROM knowledge_events").await?,
        })
    }

    /// Compact context digest for agents: recent docs + ready tasks.
    pub async fn prime(&self) -> Result<Digest> {
        Ok(Digest {
            recent_docs: documents::list_recent(&self.pool, 10, false).await?,
            ready_tasks: tasks::ready(&self.pool).await?,
            running_executions: exec::list(&self.pool, Some(ExecutionStatus::Running)).await?,
            recent_events: Vec::new(),
        })
    }

    /// Fuller digest for humans: prime plus the event tail.
    pub async fn briefing(&self) -> Result<Digest> {
        let mut digest = self.prime().await?;
        digest.recent_events = events::recent(&self.pool, 20).await?;
        Ok(digest)
    }
}

// ============ Argument and result types ============

#[derive(Debug, Clone)]
pub enum SaveSource {
    Text(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SaveArgs {
    pub source: SaveSource,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub project: Option<String>,
    pub doc_type: Option<DocType>,
    pub auto_link: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedDoc {
    pub document: Document,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    pub query: Option<String>,
    pub mode: SearchMode,
    pub filters: SearchFilters,
    pub limit: Option<i64>,
    pub offset: i64,
    /// Pass raw FTS operator syntax through unquoted.
    pub fts_syntax: bool,
    /// Newest-N shortcut, skips ranking.
    pub recent: Option<i64>,
    /// Rank by similarity to an existing doc's chunks.
    pub similar_to: Option<i64>,
    /// Sample results from the top of the ranking.
    pub wander: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub document: Document,
    pub tags: Vec<String>,
    pub links: Vec<DocumentLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QaResult {
    pub question: String,
    pub answer: String,
    pub source_doc_ids: Vec<i64>,
    /// The saved `qa` document.
    pub doc_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DelegateArgs {
    pub prompts: Vec<String>,
    pub agent_type: String,
    pub worktree: bool,
    pub repo_dir: Option<PathBuf>,
    pub base_branch: Option<String>,
    pub pr: bool,
    pub synthesize: bool,
    /// Task identifier this batch belongs to.
    pub task: Option<String>,
}

#[derive(Debug)]
pub struct DelegateBatch {
    pub outcomes: Vec<DelegateOutcome>,
    pub synthesis_doc_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task: Task,
    pub blockers: Vec<Task>,
    pub dependants: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactReport {
    pub purged: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub documents_live: i64,
    pub documents_trashed: i64,
    pub tags: i64,
    pub tasks_open: i64,
    pub tasks_done: i64,
    pub executions_running: i64,
    pub events: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub recent_docs: Vec<Document>,
    pub ready_tasks: Vec<Task>,
    pub running_executions: Vec<Execution>,
    pub recent_events: Vec<KnowledgeEvent>,
}
