//! Database schema migrations.
//!
//! Migrations are tracked as a *set* of applied string identifiers in
//! `schema_migrations_applied`, not an ordinal counter. Two divergent
//! branches can each add a migration without colliding on a version number:
//! at startup every known id that is absent from the set is applied, in
//! registration order among the missing ones, each inside its own
//! transaction. Effects are idempotent (`CREATE ... IF NOT EXISTS`,
//! column-probe-guarded `ALTER TABLE`), because a branch may already have
//! applied a subset in a different order.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;

use crate::db;
use crate::error::{Error, Result};

/// Known migrations, in registration order. Ids are stable; never renumber.
pub const MIGRATIONS: &[&str] = &[
    "001_documents",
    "002_documents_fts",
    "003_tags",
    "004_categories_and_tasks",
    "005_task_dependencies",
    "006_document_links",
    "007_executions",
    "008_document_versions",
    "009_knowledge_events",
    "010_chunks_and_vectors",
    "011_entities",
    "012_schema_flags",
    "013_execution_pr_and_task",
    "014_seed_categories",
];

/// Apply every migration whose id is not yet in the applied set.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations_applied (
            id TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT id FROM schema_migrations_applied")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    for &id in MIGRATIONS {
        if applied.contains(id) {
            continue;
        }

        let mut tx = pool.begin().await?;
        apply_migration(&mut tx, id)
            .await
            .map_err(|e| Error::MigrationFailed {
                id: id.to_string(),
                cause: e.to_string(),
            })?;
        sqlx::query("INSERT INTO schema_migrations_applied (id, applied_at) VALUES (?, ?)")
            .bind(id)
            .bind(db::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(migration = id, "applied migration");
    }

    Ok(())
}

/// Dispatch table: every id in [`MIGRATIONS`] has exactly one arm here.
async fn apply_migration(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<()> {
    match id {
        "001_documents" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS documents (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        title TEXT NOT NULL,
                        content TEXT NOT NULL,
                        project TEXT,
                        doc_type TEXT NOT NULL DEFAULT 'user',
                        content_hash TEXT NOT NULL,
                        current_version INTEGER NOT NULL DEFAULT 1,
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL,
                        accessed_at INTEGER,
                        access_count INTEGER NOT NULL DEFAULT 0,
                        is_deleted INTEGER NOT NULL DEFAULT 0,
                        deleted_at INTEGER
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
                    "CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project)",
                    "CREATE INDEX IF NOT EXISTS idx_documents_is_deleted ON documents(is_deleted)",
                ],
            )
            .await
        }
        "002_documents_fts" => {
            // Virtual tables have no IF NOT EXISTS guarantee across SQLite
            // builds, so probe sqlite_master first.
            let fts_exists: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
            )
            .fetch_one(&mut **tx)
            .await?;

            if !fts_exists {
                sqlx::query(
                    r#"
                    CREATE VIRTUAL TABLE documents_fts USING fts5(
                        title,
                        content,
                        project,
                        content='documents',
                        content_rowid='id'
                    )
                    "#,
                )
                .execute(&mut **tx)
                .await?;
            }

            // Triggers keep the index in sync with live rows only.
            // Soft-deleted documents are invisible to MATCH.
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TRIGGER IF NOT EXISTS documents_fts_ai AFTER INSERT ON documents BEGIN
                        INSERT INTO documents_fts(rowid, title, content, project)
                        SELECT new.id, new.title, new.content, COALESCE(new.project, '')
                        WHERE new.is_deleted = 0;
                    END
                    "#,
                    r#"
                    CREATE TRIGGER IF NOT EXISTS documents_fts_ad AFTER DELETE ON documents BEGIN
                        INSERT INTO documents_fts(documents_fts, rowid, title, content, project)
                        SELECT 'delete', old.id, old.title, old.content, COALESCE(old.project, '')
                        WHERE old.is_deleted = 0;
                    END
                    "#,
                    r#"
                    CREATE TRIGGER IF NOT EXISTS documents_fts_au AFTER UPDATE ON documents BEGIN
                        INSERT INTO documents_fts(documents_fts, rowid, title, content, project)
                        SELECT 'delete', old.id, old.title, old.content, COALESCE(old.project, '')
                        WHERE old.is_deleted = 0;
                        INSERT INTO documents_fts(rowid, title, content, project)
                        SELECT new.id, new.title, new.content, COALESCE(new.project, '')
                        WHERE new.is_deleted = 0;
                    END
                    "#,
                ],
            )
            .await
        }
        "003_tags" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS tags (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL UNIQUE
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS document_tags (
                        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                        PRIMARY KEY (document_id, tag_id)
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag_id)",
                ],
            )
            .await
        }
        "004_categories_and_tasks" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS categories (
                        key TEXT PRIMARY KEY,
                        display_name TEXT NOT NULL,
                        next_seq INTEGER NOT NULL DEFAULT 1
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS tasks (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        title TEXT NOT NULL,
                        description TEXT,
                        status TEXT NOT NULL DEFAULT 'open',
                        priority INTEGER NOT NULL DEFAULT 0,
                        category_key TEXT REFERENCES categories(key),
                        sequence_number INTEGER,
                        is_epic INTEGER NOT NULL DEFAULT 0,
                        epic_key TEXT,
                        parent_task_id INTEGER REFERENCES tasks(id),
                        prompt TEXT,
                        created_at INTEGER NOT NULL,
                        completed_at INTEGER,
                        UNIQUE (category_key, sequence_number)
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
                    "CREATE INDEX IF NOT EXISTS idx_tasks_epic_key ON tasks(epic_key)",
                ],
            )
            .await
        }
        "005_task_dependencies" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS task_dependencies (
                        blocker_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                        blocked_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                        PRIMARY KEY (blocker_task_id, blocked_task_id),
                        CHECK (blocker_task_id != blocked_task_id)
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_task_deps_blocked ON task_dependencies(blocked_task_id)",
                ],
            )
            .await
        }
        "006_document_links" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS document_links (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        source_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        target_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        kind TEXT NOT NULL,
                        similarity_score REAL,
                        created_at INTEGER NOT NULL,
                        UNIQUE (source_doc_id, target_doc_id, kind),
                        CHECK (source_doc_id != target_doc_id)
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_document_links_target ON document_links(target_doc_id)",
                ],
            )
            .await
        }
        "007_executions" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS executions (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        doc_id INTEGER REFERENCES documents(id),
                        doc_title TEXT NOT NULL,
                        status TEXT NOT NULL DEFAULT 'running',
                        started_at INTEGER NOT NULL,
                        completed_at INTEGER,
                        log_file TEXT NOT NULL,
                        exit_code INTEGER,
                        pid INTEGER,
                        working_dir TEXT,
                        last_heartbeat INTEGER,
                        agent_type TEXT NOT NULL DEFAULT 'general-purpose'
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)",
                ],
            )
            .await
        }
        "008_document_versions" => {
            execute_batch(
                tx,
                &[r#"
                    CREATE TABLE IF NOT EXISTS document_versions (
                        doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        version_number INTEGER NOT NULL,
                        content_hash TEXT NOT NULL,
                        character_delta INTEGER NOT NULL,
                        created_at INTEGER NOT NULL,
                        PRIMARY KEY (doc_id, version_number)
                    )
                    "#],
            )
            .await
        }
        "009_knowledge_events" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS knowledge_events (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        event_type TEXT NOT NULL,
                        doc_id INTEGER,
                        session_id TEXT,
                        metadata TEXT,
                        created_at INTEGER NOT NULL
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_events_doc ON knowledge_events(doc_id)",
                    "CREATE INDEX IF NOT EXISTS idx_events_created ON knowledge_events(created_at)",
                ],
            )
            .await
        }
        "010_chunks_and_vectors" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS chunks (
                        doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        chunk_index INTEGER NOT NULL,
                        text TEXT NOT NULL,
                        token_count INTEGER NOT NULL,
                        PRIMARY KEY (doc_id, chunk_index)
                    )
                    "#,
                    r#"
                    CREATE TABLE IF NOT EXISTS chunk_vectors (
                        doc_id INTEGER NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        embedding BLOB NOT NULL,
                        PRIMARY KEY (doc_id, chunk_index),
                        FOREIGN KEY (doc_id, chunk_index)
                            REFERENCES chunks(doc_id, chunk_index) ON DELETE CASCADE
                    )
                    "#,
                ],
            )
            .await
        }
        "011_entities" => {
            execute_batch(
                tx,
                &[
                    r#"
                    CREATE TABLE IF NOT EXISTS entities (
                        doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                        name TEXT NOT NULL,
                        entity_type TEXT NOT NULL,
                        PRIMARY KEY (doc_id, name, entity_type)
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name, entity_type)",
                ],
            )
            .await
        }
        "012_schema_flags" => {
            execute_batch(
                tx,
                &[r#"
                    CREATE TABLE IF NOT EXISTS schema_flags (
                        key TEXT PRIMARY KEY,
                        applied_at INTEGER NOT NULL
                    )
                    "#],
            )
            .await
        }
        "013_execution_pr_and_task" => {
            // Added on a separate branch from 007; guard each column probe.
            if !column_exists(tx, "executions", "pr_url").await? {
                sqlx::query("ALTER TABLE executions ADD COLUMN pr_url TEXT")
                    .execute(&mut **tx)
                    .await?;
            }
            if !column_exists(tx, "executions", "task_id").await? {
                sqlx::query("ALTER TABLE executions ADD COLUMN task_id INTEGER REFERENCES tasks(id)")
                    .execute(&mut **tx)
                    .await?;
            }
            Ok(())
        }
        "014_seed_categories" => {
            execute_batch(
                tx,
                &[r#"
                    INSERT OR IGNORE INTO categories (key, display_name) VALUES
                        ('FIX', 'Bug fixes'),
                        ('FEAT', 'Features'),
                        ('DOCS', 'Documentation'),
                        ('CHORE', 'Maintenance')
                    "#],
            )
            .await
        }
        other => Err(Error::MigrationFailed {
            id: other.to_string(),
            cause: "unknown migration id".to_string(),
        }),
    }
}

async fn execute_batch(tx: &mut Transaction<'_, Sqlite>, statements: &[&str]) -> Result<()> {
    for stmt in statements {
        sqlx::query(stmt).execute(&mut **tx).await?;
    }
    Ok(())
}

async fn column_exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
) -> Result<bool> {
    // Table names here come from the migration source, never from users.
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
    ))
    .bind(column)
    .fetch_one(&mut **tx)
    .await?;
    Ok(count > 0)
}
