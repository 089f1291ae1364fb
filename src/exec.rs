//! Execution subsystem: spawn external agent processes, stream their logs,
//! and capture their output back into the store.
//!
//! Every execution is a row born `running`. The spawner pipes the prompt to
//! the child's stdin (argv has OS length limits), redirects stdout+stderr to
//! a per-execution log file, records the pid, and heartbeats the row from a
//! timer task — the child itself never touches the database. On exit 0 the
//! log is collected into a new document tagged `subagent, agent:<type>`;
//! non-zero exits keep the log but save nothing. A reaper promotes `running`
//! rows with stale heartbeats to `stale` without ever signalling the OS
//! process, which may belong to another machine.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::documents;
use crate::error::{Error, Result};
use crate::events;
use crate::models::{DocType, Execution, ExecutionStatus};

/// Log files are bounded; older content is truncated from the head.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const TRUNCATION_MARKER: &str = "--- truncated ---\n";
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct SpawnOpts {
    /// Agent flavour recorded on the row (e.g. `explore`, `general-purpose`).
    pub agent_type: String,
    /// Run the child inside a fresh git worktree of `repo_dir`.
    pub worktree: bool,
    /// Repository the worktree is created from (defaults to the cwd).
    pub repo_dir: Option<PathBuf>,
    /// Base branch for the worktree.
    pub base_branch: Option<String>,
    /// Commit, push, and open a PR from the worktree after a clean exit.
    pub pr: bool,
    /// Task that triggered this execution.
    pub task_id: Option<i64>,
}

/// A spawned child plus the bookkeeping needed to await and collect it.
pub struct ExecutionHandle {
    pub id: i64,
    child: Child,
    heartbeat_stop: CancellationToken,
    log_path: PathBuf,
    working_dir: Option<PathBuf>,
    worktree_repo: Option<PathBuf>,
    pr: bool,
}

// ============ Repository ============

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Execution> {
    let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("execution {id}")))?;
    exec_from_row(&row)
}

pub async fn list(pool: &SqlitePool, status: Option<ExecutionStatus>) -> Result<Vec<Execution>> {
    let rows = match status {
        Some(s) => {
            sqlx::query("SELECT * FROM executions WHERE status = ? ORDER BY id DESC")
                .bind(s.as_str())
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT * FROM executions ORDER BY id DESC")
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(exec_from_row).collect()
}

/// Update `last_heartbeat`. Called by the spawner's timer, never the child.
pub async fn heartbeat(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE executions SET last_heartbeat = ? WHERE id = ?")
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Promote `running` rows whose heartbeat has gone silent to `stale`.
/// Only flips rows; the OS process (if it still exists) is left alone.
pub async fn reap_stale(pool: &SqlitePool, now: i64, threshold_secs: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        r#"
        UPDATE executions
        SET status = 'stale'
        WHERE status = 'running'
          AND ? - COALESCE(last_heartbeat, started_at) > ?
        RETURNING id
        "#,
    )
    .bind(now)
    .bind(threshold_secs)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

async fn set_status(
    pool: &SqlitePool,
    id: i64,
    status: ExecutionStatus,
    exit_code: Option<i64>,
) -> Result<()> {
    sqlx::query("UPDATE executions SET status = ?, exit_code = ?, completed_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(exit_code)
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ============ Spawn ============

/// Result of [`spawn`]: either a running child, or an execution row already
/// marked `failed` with `exit_code = -1` because the process never started.
/// A failed spawn is a status, not an error, so delegate batches account
/// for every prompt.
pub enum Spawned {
    Launched(ExecutionHandle),
    Failed(Execution),
}

/// Create the execution row, then start the agent child process and its
/// heartbeat timer. A launch failure (missing binary, unreadable workspace,
/// worktree setup error) finalises the row as `failed` instead of erroring.
pub async fn spawn(
    pool: &SqlitePool,
    config: &Config,
    prompt: &str,
    opts: &SpawnOpts,
) -> Result<Spawned> {
    if prompt.trim().is_empty() {
        return Err(Error::input("prompt must not be empty"));
    }

    let agent_type = if opts.agent_type.is_empty() {
        "general-purpose".to_string()
    } else {
        opts.agent_type.clone()
    };
    let placeholder_title = derive_title(prompt, 0);
    let now = db::now();

    let mut tx = pool.begin().await?;
    let exec_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO executions (doc_title, status, started_at, log_file, agent_type, last_heartbeat, task_id)
        VALUES (?, 'running', ?, '', ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&placeholder_title)
    .bind(now)
    .bind(&agent_type)
    .bind(now)
    .bind(opts.task_id)
    .fetch_one(&mut *tx)
    .await?;
    events::record(
        &mut tx,
        events::EXECUTE,
        None,
        Some(&format!("{{\"execution\":{exec_id}}}")),
    )
    .await?;
    tx.commit().await?;

    match launch(pool, config, prompt, opts, exec_id).await {
        Ok(handle) => Ok(Spawned::Launched(handle)),
        Err(e) => {
            tracing::warn!(execution = exec_id, error = %e, "spawn failed");
            set_status(pool, exec_id, ExecutionStatus::Failed, Some(-1)).await?;
            Ok(Spawned::Failed(get(pool, exec_id).await?))
        }
    }
}

/// The fallible half of [`spawn`]: workspace setup, process launch, pid
/// recording, heartbeat task. Cleans up its workspace on failure.
async fn launch(
    pool: &SqlitePool,
    config: &Config,
    prompt: &str,
    opts: &SpawnOpts,
    exec_id: i64,
) -> Result<ExecutionHandle> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{exec_id}.log"));

    // Working directory: a fresh worktree for isolation, otherwise a temp dir.
    let (working_dir, worktree_repo) = if opts.worktree {
        let repo = opts
            .repo_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let path = std::env::temp_dir().join(format!("emdx-worktree-{exec_id}"));
        add_worktree(&repo, &path, opts.base_branch.as_deref()).await?;
        (Some(path), Some(repo))
    } else {
        let path = std::env::temp_dir().join(format!("emdx-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        (Some(path), None)
    };

    sqlx::query("UPDATE executions SET log_file = ?, working_dir = ? WHERE id = ?")
        .bind(log_path.display().to_string())
        .bind(working_dir.as_ref().map(|p| p.display().to_string()))
        .bind(exec_id)
        .execute(pool)
        .await?;

    let log_file = std::fs::File::create(&log_path)?;
    let log_err = log_file.try_clone()?;

    let (program, args) = crate::llm::split_command(&config.execution.agent_command)?;
    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_err))
        .env("EMDX_AUTO_SAVE", "1")
        .kill_on_drop(false);
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }
    if let Some(task_id) = opts.task_id {
        cmd.env("EMDX_TASK_ID", task_id.to_string());
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            cleanup_workspace(&working_dir, &worktree_repo).await;
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(Error::ExternalToolMissing {
                    tool: program,
                    hint: format!(
                        "install it or change execution.agent_command (currently '{}')",
                        config.execution.agent_command
                    ),
                });
            }
            return Err(Error::ExecutionFailed(format!("spawn failed: {e}")));
        }
    };

    // Prompt goes over stdin; argv would hit OS length limits. The write
    // runs on its own task so a slow reader cannot stall the spawner.
    if let Some(mut stdin) = child.stdin.take() {
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::warn!(execution = exec_id, error = %e, "failed to write prompt to agent stdin");
            }
        });
    }

    if let Some(pid) = child.id() {
        sqlx::query("UPDATE executions SET pid = ? WHERE id = ?")
            .bind(pid as i64)
            .bind(exec_id)
            .execute(pool)
            .await?;
    }

    let heartbeat_stop = CancellationToken::new();
    let hb_pool = pool.clone();
    let hb_stop = heartbeat_stop.clone();
    let interval = Duration::from_secs(config.execution.heartbeat_interval_seconds.max(1));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hb_stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = heartbeat(&hb_pool, exec_id).await {
                        tracing::warn!(execution = exec_id, error = %e, "heartbeat update failed");
                    }
                }
            }
        }
    });

    Ok(ExecutionHandle {
        id: exec_id,
        child,
        heartbeat_stop,
        log_path,
        working_dir,
        worktree_repo,
        pr: opts.pr,
    })
}

/// Await the child, finalise the row, and (on success) collect its output.
/// Cancellation sends SIGTERM, waits five seconds, then SIGKILLs; the row
/// is marked `killed`.
pub async fn wait_and_collect(
    pool: &SqlitePool,
    config: &Config,
    mut handle: ExecutionHandle,
    cancel: &CancellationToken,
) -> Result<Execution> {
    let exec_id = handle.id;

    let status = tokio::select! {
        result = handle.child.wait() => result,
        _ = cancel.cancelled() => {
            terminate(&mut handle.child).await;
            handle.heartbeat_stop.cancel();
            set_status(pool, exec_id, ExecutionStatus::Killed, None).await?;
            cleanup_workspace(&handle.working_dir, &handle.worktree_repo).await;
            return get(pool, exec_id).await;
        }
    };

    handle.heartbeat_stop.cancel();
    truncate_log_head(&handle.log_path)?;

    let outcome = match status {
        Ok(status) => {
            let code = status.code().unwrap_or(-1) as i64;
            if status.success() {
                set_status(pool, exec_id, ExecutionStatus::Completed, Some(0)).await?;
                if let Err(e) = collect(pool, config, exec_id).await {
                    // The log still holds the output; a later collect retries.
                    tracing::warn!(execution = exec_id, error = %e, "output capture failed");
                }
                if handle.pr {
                    if let Some(dir) = &handle.working_dir {
                        match open_pr(dir, exec_id).await {
                            Ok(url) => {
                                sqlx::query("UPDATE executions SET pr_url = ? WHERE id = ?")
                                    .bind(&url)
                                    .bind(exec_id)
                                    .execute(pool)
                                    .await?;
                            }
                            Err(e) => {
                                tracing::warn!(execution = exec_id, error = %e, "pr creation failed")
                            }
                        }
                    }
                }
                get(pool, exec_id).await
            } else {
                set_status(pool, exec_id, ExecutionStatus::Failed, Some(code)).await?;
                get(pool, exec_id).await
            }
        }
        Err(e) => {
            set_status(pool, exec_id, ExecutionStatus::Failed, Some(-1)).await?;
            tracing::warn!(execution = exec_id, error = %e, "wait failed");
            get(pool, exec_id).await
        }
    };

    cleanup_workspace(&handle.working_dir, &handle.worktree_repo).await;
    outcome
}

/// Save the execution's log output as a document and link it on the row.
/// Idempotent: an execution that already has a `doc_id`, or whose output
/// document already exists by content hash, saves nothing new.
pub async fn collect(pool: &SqlitePool, config: &Config, exec_id: i64) -> Result<Execution> {
    let exec = get(pool, exec_id).await?;

    if exec.doc_id.is_some() {
        return Ok(exec);
    }

    let content = read_log(Path::new(&exec.log_file))?;
    if content.trim().is_empty() {
        return Ok(exec);
    }

    // A previous collect may have saved the doc but lost the row update.
    let hash = documents::sha256_hex(&content);
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ? AND is_deleted = 0")
            .bind(&hash)
            .fetch_optional(pool)
            .await?;

    let doc_id = match existing {
        Some(id) => id,
        None => {
            let title = derive_title(&content, exec_id);
            let doc_type = DocType::parse(&config.execution.default_doc_type)?;
            let doc = documents::save(
                pool,
                &title,
                &content,
                None,
                doc_type,
                &["subagent".to_string(), format!("agent:{}", exec.agent_type)],
            )
            .await?;
            doc.id
        }
    };

    sqlx::query("UPDATE executions SET doc_id = ?, doc_title = ? WHERE id = ?")
        .bind(doc_id)
        .bind(derive_title(&content, exec_id))
        .bind(exec_id)
        .execute(pool)
        .await?;

    get(pool, exec_id).await
}

// ============ Delegate ============

/// One finished delegate slot, streamed to the caller as it completes.
#[derive(Debug)]
pub struct DelegateOutcome {
    pub execution: Execution,
    /// Tail of the log for immediate display.
    pub output: Option<String>,
}

/// Run one agent per prompt with at most `max_concurrency` children alive,
/// invoking `on_result` in completion order (not launch order). Every
/// prompt yields exactly one outcome — a spawn failure surfaces as a
/// `failed` execution with `exit_code = -1`, same as a non-zero exit —
/// unless the batch is cancelled.
pub async fn delegate<F>(
    pool: &SqlitePool,
    config: &Config,
    prompts: &[String],
    opts: &SpawnOpts,
    cancel: &CancellationToken,
    mut on_result: F,
) -> Result<Vec<DelegateOutcome>>
where
    F: FnMut(&DelegateOutcome),
{
    if prompts.is_empty() {
        return Err(Error::input("delegate requires at least one prompt"));
    }
    if prompts.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::input("delegate prompts must not be empty"));
    }

    let semaphore = std::sync::Arc::new(Semaphore::new(config.execution.max_concurrency));
    let mut join_set = tokio::task::JoinSet::new();

    for prompt in prompts.iter().cloned() {
        let pool = pool.clone();
        let config = config.clone();
        let opts = opts.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match spawn(&pool, &config, &prompt, &opts).await? {
                Spawned::Launched(handle) => {
                    let execution = wait_and_collect(&pool, &config, handle, &cancel).await?;
                    let output = match execution.doc_id {
                        Some(_) => read_log(Path::new(&execution.log_file)).ok(),
                        None => None,
                    };
                    Ok(DelegateOutcome { execution, output })
                }
                Spawned::Failed(execution) => Ok(DelegateOutcome {
                    execution,
                    output: None,
                }),
            }
        });
    }

    let mut outcomes = Vec::with_capacity(prompts.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                on_result(&outcome);
                outcomes.push(outcome);
            }
            Ok(Err(Error::Cancelled)) => {}
            Ok(Err(e)) => {
                // Row bookkeeping itself failed; nothing usable to report.
                tracing::warn!(error = %e, "delegate slot failed");
            }
            Err(e) => tracing::warn!(error = %e, "delegate task panicked"),
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(outcomes)
}

// ============ Log files ============

/// Read the whole log, bounded to the last [`MAX_LOG_BYTES`].
pub fn read_log(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    if data.len() as u64 <= MAX_LOG_BYTES {
        return Ok(String::from_utf8_lossy(&data).into_owned());
    }
    let start = data.len() - MAX_LOG_BYTES as usize;
    let tail = String::from_utf8_lossy(&data[start..]).into_owned();
    Ok(format!("{TRUNCATION_MARKER}{tail}"))
}

/// Rewrite an over-limit log file in place, keeping the newest bytes and
/// stamping the truncation marker at the head.
pub fn truncate_log_head(path: &Path) -> Result<()> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };
    if meta.len() <= MAX_LOG_BYTES {
        return Ok(());
    }
    let content = read_log(path)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Last `max_bytes` of a log for display.
pub fn tail_log(path: &Path, max_bytes: usize) -> Result<String> {
    let content = read_log(path)?;
    if content.len() <= max_bytes {
        return Ok(content);
    }
    let mut start = content.len() - max_bytes;
    while start < content.len() && !content.is_char_boundary(start) {
        start += 1;
    }
    Ok(content[start..].to_string())
}

// ============ Helpers ============

/// Title for the captured document: first markdown heading, else the first
/// non-trivial line, else a fallback naming the execution.
pub(crate) fn derive_title(content: &str, exec_id: i64) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == TRUNCATION_MARKER.trim() {
            continue;
        }
        let stripped = trimmed.trim_start_matches('#').trim();
        if stripped.len() >= 3 {
            let mut end = stripped.len().min(80);
            while end > 0 && !stripped.is_char_boundary(end) {
                end -= 1;
            }
            return stripped[..end].to_string();
        }
    }
    format!("Agent output {exec_id}")
}

async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn cleanup_workspace(working_dir: &Option<PathBuf>, worktree_repo: &Option<PathBuf>) {
    let Some(dir) = working_dir else { return };
    match worktree_repo {
        Some(repo) => {
            if let Err(e) = remove_worktree(repo, dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "worktree removal failed");
            }
        }
        None => {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

// ============ git / gh ============

async fn run_tool(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ExternalToolMissing {
                tool: program.to_string(),
                hint: format!("{program} is required for this operation"),
            }
        } else {
            Error::ExecutionFailed(e.to_string())
        }
    })?;

    if !output.status.success() {
        return Err(Error::ExecutionFailed(format!(
            "{program} {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn add_worktree(repo: &Path, path: &Path, base_branch: Option<&str>) -> Result<()> {
    let path_str = path.display().to_string();
    let mut args = vec!["worktree", "add", "--detach", path_str.as_str()];
    if let Some(branch) = base_branch {
        args.push(branch);
    }
    run_tool("git", &args, Some(repo)).await?;
    Ok(())
}

async fn remove_worktree(repo: &Path, path: &Path) -> Result<()> {
    let path_str = path.display().to_string();
    run_tool(
        "git",
        &["worktree", "remove", "--force", path_str.as_str()],
        Some(repo),
    )
    .await?;
    Ok(())
}

/// Commit, push, and open a PR from the execution's working dir. Returns
/// the PR URL printed by `gh`.
async fn open_pr(dir: &Path, exec_id: i64) -> Result<String> {
    let branch = format!("emdx-exec-{exec_id}");
    run_tool("git", &["checkout", "-b", &branch], Some(dir)).await?;
    run_tool("git", &["add", "-A"], Some(dir)).await?;
    run_tool(
        "git",
        &["commit", "-m", &format!("Agent execution {exec_id}")],
        Some(dir),
    )
    .await?;
    run_tool("git", &["push", "-u", "origin", &branch], Some(dir)).await?;
    let output = run_tool("gh", &["pr", "create", "--fill"], Some(dir)).await?;

    output
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with("https://"))
        .map(|l| l.trim().to_string())
        .ok_or_else(|| Error::ExecutionFailed("gh did not print a PR URL".into()))
}

fn exec_from_row(row: &SqliteRow) -> Result<Execution> {
    let status: String = row.get("status");
    Ok(Execution {
        id: row.get("id"),
        doc_id: row.get("doc_id"),
        doc_title: row.get("doc_title"),
        status: ExecutionStatus::parse(&status)?,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        log_file: row.get("log_file"),
        exit_code: row.get("exit_code"),
        pid: row.get("pid"),
        working_dir: row.get("working_dir"),
        last_heartbeat: row.get("last_heartbeat"),
        agent_type: row.get("agent_type"),
        pr_url: row.get("pr_url"),
        task_id: row.get("task_id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_prefers_heading() {
        let content = "\n\n# Findings on Token Refresh\n\nbody";
        assert_eq!(derive_title(content, 1), "Findings on Token Refresh");
    }

    #[test]
    fn test_derive_title_first_line_fallback() {
        let content = "The fix turned out to be a clock skew issue.\nMore text.";
        assert_eq!(
            derive_title(content, 1),
            "The fix turned out to be a clock skew issue."
        );
    }

    #[test]
    fn test_derive_title_truncates() {
        let long = "x".repeat(300);
        assert_eq!(derive_title(&long, 1).len(), 80);
    }

    #[test]
    fn test_derive_title_empty_fallback() {
        assert_eq!(derive_title("", 7), "Agent output 7");
        assert_eq!(derive_title("\n \n", 9), "Agent output 9");
    }

    #[test]
    fn test_read_log_small_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.log");
        std::fs::write(&path, "line one\nline two\n").unwrap();
        assert_eq!(read_log(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_tail_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.log");
        std::fs::write(&path, "aaaa\nbbbb\ncccc\n").unwrap();
        let tail = tail_log(&path, 5).unwrap();
        assert_eq!(tail, "cccc\n");
    }
}
