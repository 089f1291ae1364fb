//! Task repository: status FSM, category-prefixed identifiers, dependency
//! graph, and epic rollup.
//!
//! Tasks are born `open`, move through `active`/`blocked`, and terminate in
//! `done` or `wontdo`; reopening returns them to `open`. Categorised tasks
//! get a `KEY-N` identifier where `N` comes from the category's monotonic
//! sequence counter, allocated inside the insert transaction so two
//! concurrent `add` calls can never mint the same number. The dependency
//! graph stays acyclic: an edge that would close a cycle is rejected before
//! insertion.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::{HashMap, HashSet};

use crate::db;
use crate::error::{Error, Result};
use crate::events;
use crate::models::{Task, TaskStatus};

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#?(\d+)$").unwrap());
static CATEGORY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]+)-(\d+)$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct AddTaskOpts {
    pub description: Option<String>,
    pub priority: i64,
    /// Category key; uppercased, created on first use.
    pub category: Option<String>,
    /// Epic identifier (`CAT-N` or `#id`); the target must be an epic.
    pub epic: Option<String>,
    pub parent_task_id: Option<i64>,
    pub is_epic: bool,
    /// Set when the task originated from a delegate call.
    pub prompt: Option<String>,
}

/// Create a task. Allocates a category sequence number when categorised.
pub async fn add(pool: &SqlitePool, title: &str, opts: AddTaskOpts) -> Result<Task> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::input("task title must not be empty"));
    }

    // Resolve the epic before opening the write transaction.
    let epic_key = match &opts.epic {
        Some(epic_ref) => {
            if opts.is_epic {
                return Err(Error::input("an epic cannot have an epic parent"));
            }
            let epic = resolve_identifier(pool, epic_ref).await?;
            if !epic.is_epic {
                return Err(Error::input(format!(
                    "{} is not an epic",
                    epic.display_id()
                )));
            }
            Some(epic.display_id())
        }
        None => None,
    };

    if let Some(parent_id) = opts.parent_task_id {
        get(pool, parent_id).await?;
    }

    let category = opts
        .category
        .as_deref()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty());

    let now = db::now();
    let mut tx = pool.begin().await?;

    let sequence_number = match &category {
        Some(key) => {
            sqlx::query("INSERT OR IGNORE INTO categories (key, display_name) VALUES (?, ?)")
                .bind(key)
                .bind(key)
                .execute(&mut *tx)
                .await?;
            // The counter bump and the read happen in one statement under the
            // writer lock, so concurrent adds cannot mint the same number.
            let seq: i64 = sqlx::query_scalar(
                "UPDATE categories SET next_seq = next_seq + 1 WHERE key = ? RETURNING next_seq - 1",
            )
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;
            Some(seq)
        }
        None => None,
    };

    let task_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tasks (title, description, status, priority, category_key, sequence_number,
                           is_epic, epic_key, parent_task_id, prompt, created_at)
        VALUES (?, ?, 'open', ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(&opts.description)
    .bind(opts.priority)
    .bind(&category)
    .bind(sequence_number)
    .bind(opts.is_epic as i64)
    .bind(&epic_key)
    .bind(opts.parent_task_id)
    .bind(&opts.prompt)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    events::record(
        &mut tx,
        events::TASK,
        None,
        Some(&format!("{{\"task\":{task_id},\"op\":\"add\"}}")),
    )
    .await?;
    tx.commit().await?;

    get(pool, task_id).await
}

/// Parse `#?<id>` or `<CAT>-<N>` and fetch the task.
pub async fn resolve_identifier(pool: &SqlitePool, s: &str) -> Result<Task> {
    let s = s.trim();

    if let Some(caps) = NUMERIC_ID.captures(s) {
        let id: i64 = caps[1]
            .parse()
            .map_err(|_| Error::input(format!("task id out of range: {s}")))?;
        return get(pool, id).await;
    }

    if let Some(caps) = CATEGORY_ID.captures(s) {
        let key = caps[1].to_uppercase();
        let seq: i64 = caps[2]
            .parse()
            .map_err(|_| Error::input(format!("task id out of range: {s}")))?;
        let row = sqlx::query("SELECT * FROM tasks WHERE category_key = ? AND sequence_number = ?")
            .bind(&key)
            .bind(seq)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("task {key}-{seq}")))?;
        return task_from_row(&row);
    }

    Err(Error::input(format!(
        "malformed task identifier '{s}'; expected #<id> or CAT-<n>"
    )))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Task> {
    let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("task #{id}")))?;
    task_from_row(&row)
}

/// Result of a status change, carrying any soft warnings and the ids of
/// dependants that became unblocked.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub task: Task,
    pub warnings: Vec<String>,
    pub unblocked: Vec<i64>,
}

/// Move a task through the FSM. `done` stamps `completed_at`; leaving a
/// terminal state clears it. Completing a blocker auto-unblocks dependants
/// with no other open blockers.
pub async fn set_status(pool: &SqlitePool, id: i64, status: TaskStatus) -> Result<StatusChange> {
    let task = get(pool, id).await?;
    let mut warnings = Vec::new();

    if task.is_epic && status == TaskStatus::Done {
        let progress = epic_progress_for(pool, &task).await?;
        if progress.remaining > 0 {
            warnings.push(format!(
                "epic {} still has {} unfinished child task(s)",
                task.display_id(),
                progress.remaining
            ));
        }
    }

    let completed_at = if status == TaskStatus::Done {
        Some(db::now())
    } else {
        None
    };

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(completed_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // Auto-unblock: dependants whose every blocker is now terminal.
    let mut unblocked = Vec::new();
    if status.is_terminal() {
        let dependant_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT t.id FROM tasks t
            JOIN task_dependencies td ON td.blocked_task_id = t.id
            WHERE td.blocker_task_id = ? AND t.status = 'blocked'
              AND NOT EXISTS (
                  SELECT 1 FROM task_dependencies other
                  JOIN tasks b ON b.id = other.blocker_task_id
                  WHERE other.blocked_task_id = t.id
                    AND b.id != ?
                    AND b.status NOT IN ('done', 'wontdo')
              )
            "#,
        )
        .bind(id)
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        for dep_id in &dependant_ids {
            sqlx::query("UPDATE tasks SET status = 'open' WHERE id = ?")
                .bind(dep_id)
                .execute(&mut *tx)
                .await?;
        }
        unblocked = dependant_ids;
    }

    events::record(
        &mut tx,
        events::TASK,
        None,
        Some(&format!(
            "{{\"task\":{id},\"op\":\"status\",\"to\":\"{}\"}}",
            status.as_str()
        )),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusChange {
        task: get(pool, id).await?,
        warnings,
        unblocked,
    })
}

/// Add a `blocker -> blocked` edge, rejecting self-cycles and indirect
/// cycles.
pub async fn add_dependency(pool: &SqlitePool, blocked: i64, blocker: i64) -> Result<()> {
    if blocked == blocker {
        return Err(Error::conflict("a task cannot block itself"));
    }
    get(pool, blocked).await?;
    get(pool, blocker).await?;

    // Cycle check: the new edge closes a loop iff `blocker` is already
    // downstream of `blocked` in the blocker -> blocked direction.
    let edges = all_edges(pool).await?;
    if reachable(&edges, blocked, blocker) {
        return Err(Error::conflict(format!(
            "dependency would create a cycle: #{blocker} is already blocked (transitively) by #{blocked}"
        )));
    }

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO task_dependencies (blocker_task_id, blocked_task_id) VALUES (?, ?)",
    )
    .bind(blocker)
    .bind(blocked)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(Error::conflict(format!(
            "#{blocked} already depends on #{blocker}"
        )));
    }
    events::record(
        &mut tx,
        events::TASK,
        None,
        Some(&format!(
            "{{\"task\":{blocked},\"op\":\"dep\",\"blocker\":{blocker}}}"
        )),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn remove_dependency(pool: &SqlitePool, blocked: i64, blocker: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    let removed = sqlx::query(
        "DELETE FROM task_dependencies WHERE blocker_task_id = ? AND blocked_task_id = ?",
    )
    .bind(blocker)
    .bind(blocked)
    .execute(&mut *tx)
    .await?;
    if removed.rows_affected() == 0 {
        return Err(Error::not_found(format!(
            "dependency #{blocked} on #{blocker}"
        )));
    }
    events::record(
        &mut tx,
        events::TASK,
        None,
        Some(&format!(
            "{{\"task\":{blocked},\"op\":\"undep\",\"blocker\":{blocker}}}"
        )),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Tasks that can be worked right now: `open` or `active`, not epics, with
/// every blocker terminal. Ordered by priority desc, category, id.
pub async fn ready(pool: &SqlitePool) -> Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"
        SELECT t.* FROM tasks t
        WHERE t.status IN ('open', 'active')
          AND t.is_epic = 0
          AND NOT EXISTS (
              SELECT 1 FROM task_dependencies td
              JOIN tasks b ON b.id = td.blocker_task_id
              WHERE td.blocked_task_id = t.id
                AND b.status NOT IN ('done', 'wontdo')
          )
        ORDER BY t.priority DESC, t.category_key IS NULL, t.category_key, t.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(task_from_row).collect()
}

/// All tasks, optionally filtered by status.
pub async fn list(pool: &SqlitePool, status: Option<TaskStatus>) -> Result<Vec<Task>> {
    let rows = match status {
        Some(s) => {
            sqlx::query("SELECT * FROM tasks WHERE status = ? ORDER BY priority DESC, id")
                .bind(s.as_str())
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT * FROM tasks ORDER BY priority DESC, id")
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(task_from_row).collect()
}

/// Direct blockers of a task (upstream edges).
pub async fn blockers_of(pool: &SqlitePool, id: i64) -> Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"
        SELECT b.* FROM tasks b
        JOIN task_dependencies td ON td.blocker_task_id = b.id
        WHERE td.blocked_task_id = ?
        ORDER BY b.id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(task_from_row).collect()
}

/// Tasks directly blocked by this one (downstream edges).
pub async fn dependants_of(pool: &SqlitePool, id: i64) -> Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"
        SELECT t.* FROM tasks t
        JOIN task_dependencies td ON td.blocked_task_id = t.id
        WHERE td.blocker_task_id = ?
        ORDER BY t.id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(task_from_row).collect()
}

/// Full upstream chain of a task: every transitive blocker, closest first.
pub async fn chain(pool: &SqlitePool, id: i64) -> Result<Vec<Task>> {
    get(pool, id).await?;
    let edges = all_edges(pool).await?;

    // Walk upstream breadth-first over blocked -> blocker edges.
    let mut upstream: HashMap<i64, Vec<i64>> = HashMap::new();
    for (blocker, blocked) in &edges {
        upstream.entry(*blocked).or_default().push(*blocker);
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut frontier = vec![id];
    while let Some(current) = frontier.pop() {
        for &blocker in upstream.get(&current).map(|v| v.as_slice()).unwrap_or(&[]) {
            if seen.insert(blocker) {
                order.push(blocker);
                frontier.push(blocker);
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for task_id in order {
        out.push(get(pool, task_id).await?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct EpicProgress {
    pub epic_id: i64,
    pub done: i64,
    pub total: i64,
    pub remaining: i64,
    pub percent: f64,
}

/// Aggregate an epic's children by status.
pub async fn epic_progress(pool: &SqlitePool, epic_ref: &str) -> Result<EpicProgress> {
    let epic = resolve_identifier(pool, epic_ref).await?;
    if !epic.is_epic {
        return Err(Error::input(format!("{} is not an epic", epic.display_id())));
    }
    epic_progress_for(pool, &epic).await
}

async fn epic_progress_for(pool: &SqlitePool, epic: &Task) -> Result<EpicProgress> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(status = 'done'), 0) AS done,
            COALESCE(SUM(status NOT IN ('done', 'wontdo')), 0) AS remaining
        FROM tasks WHERE epic_key = ?
        "#,
    )
    .bind(epic.display_id())
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    let done: i64 = row.get("done");
    let remaining: i64 = row.get("remaining");
    let percent = if total == 0 {
        0.0
    } else {
        (total - remaining) as f64 * 100.0 / total as f64
    };

    Ok(EpicProgress {
        epic_id: epic.id,
        done,
        total,
        remaining,
        percent,
    })
}

/// List known categories with their counters.
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<(String, String, i64)>> {
    let rows = sqlx::query("SELECT key, display_name, next_seq FROM categories ORDER BY key")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get("key"),
                row.get("display_name"),
                row.get::<i64, _>("next_seq"),
            )
        })
        .collect())
}

async fn all_edges(pool: &SqlitePool) -> Result<Vec<(i64, i64)>> {
    let rows = sqlx::query("SELECT blocker_task_id, blocked_task_id FROM task_dependencies")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("blocker_task_id"), row.get("blocked_task_id")))
        .collect())
}

/// Depth-first reachability over blocker -> blocked edges.
fn reachable(edges: &[(i64, i64)], from: i64, to: i64) -> bool {
    let mut downstream: HashMap<i64, Vec<i64>> = HashMap::new();
    for (blocker, blocked) in edges {
        downstream.entry(*blocker).or_default().push(*blocked);
    }

    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(nexts) = downstream.get(&current) {
            stack.extend(nexts);
        }
    }
    false
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let status: String = row.get("status");
    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::parse(&status)?,
        priority: row.get("priority"),
        category_key: row.get("category_key"),
        sequence_number: row.get("sequence_number"),
        is_epic: row.get::<i64, _>("is_epic") != 0,
        epic_key: row.get("epic_key"),
        parent_task_id: row.get("parent_task_id"),
        prompt: row.get("prompt"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_direct() {
        let edges = vec![(1, 2)];
        assert!(reachable(&edges, 1, 2));
        assert!(!reachable(&edges, 2, 1));
    }

    #[test]
    fn test_reachable_transitive() {
        // blocker -> blocked: 1 -> 2, 2 -> 3
        let edges = vec![(1, 2), (2, 3)];
        assert!(reachable(&edges, 1, 3));
        assert!(!reachable(&edges, 3, 1));
    }

    #[test]
    fn test_reachable_diamond() {
        let edges = vec![(1, 2), (1, 3), (2, 4), (3, 4)];
        assert!(reachable(&edges, 1, 4));
        assert!(!reachable(&edges, 4, 2));
    }

    #[test]
    fn test_identifier_regexes() {
        assert!(NUMERIC_ID.is_match("42"));
        assert!(NUMERIC_ID.is_match("#42"));
        assert!(CATEGORY_ID.is_match("FIX-3"));
        assert!(CATEGORY_ID.is_match("feat-12"));
        assert!(!NUMERIC_ID.is_match("FIX-3"));
        assert!(!CATEGORY_ID.is_match("FIX3"));
        assert!(!CATEGORY_ID.is_match("-3"));
    }
}
