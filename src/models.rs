//! Core data models for the knowledge store.
//!
//! Every table has a typed record struct and every status/kind column a typed
//! enum that round-trips through its canonical lowercase string. All reads
//! hydrate rows into these types; no layer passes raw rows around.

use serde::Serialize;

use crate::error::{Error, Result};

/// Document class. `qa` docs are ephemeral answers and are hidden from search
/// unless explicitly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    User,
    Wiki,
    Qa,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::User => "user",
            DocType::Wiki => "wiki",
            DocType::Qa => "qa",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(DocType::User),
            "wiki" => Ok(DocType::Wiki),
            "qa" => Ok(DocType::Qa),
            other => Err(Error::input(format!(
                "unknown doc type '{other}'; expected user, wiki, or qa"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub project: Option<String>,
    pub doc_type: DocType,
    pub content_hash: String,
    pub current_version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub accessed_at: Option<i64>,
    pub access_count: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    /// Short uppercase key, e.g. `FIX`, `FEAT`.
    pub key: String,
    pub display_name: String,
    pub next_seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Active,
    Blocked,
    Done,
    Wontdo,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Active => "active",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Wontdo => "wontdo",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "active" => Ok(TaskStatus::Active),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            "wontdo" => Ok(TaskStatus::Wontdo),
            other => Err(Error::input(format!("unknown task status '{other}'"))),
        }
    }

    /// Terminal states no longer gate dependants.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Wontdo)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: i64,
    pub category_key: Option<String>,
    pub sequence_number: Option<i64>,
    pub is_epic: bool,
    pub epic_key: Option<String>,
    pub parent_task_id: Option<i64>,
    /// Present iff the task originated from a delegate call.
    pub prompt: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl Task {
    /// User-visible identifier: `{CATEGORY}-{seq}` when categorised, else `#{id}`.
    pub fn display_id(&self) -> String {
        match (&self.category_key, self.sequence_number) {
            (Some(cat), Some(seq)) => format!("{cat}-{seq}"),
            _ => format!("#{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    TitleMatch,
    Entity,
    Semantic,
    Manual,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::TitleMatch => "title_match",
            LinkKind::Entity => "entity",
            LinkKind::Semantic => "semantic",
            LinkKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "title_match" => Ok(LinkKind::TitleMatch),
            "entity" => Ok(LinkKind::Entity),
            "semantic" => Ok(LinkKind::Semantic),
            "manual" => Ok(LinkKind::Manual),
            other => Err(Error::input(format!("unknown link kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentLink {
    pub id: i64,
    pub source_doc_id: i64,
    pub target_doc_id: i64,
    pub kind: LinkKind,
    pub similarity_score: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Killed,
    Stale,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Killed => "killed",
            ExecutionStatus::Stale => "stale",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "killed" => Ok(ExecutionStatus::Killed),
            "stale" => Ok(ExecutionStatus::Stale),
            other => Err(Error::input(format!("unknown execution status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub id: i64,
    /// Set once the output document has been saved.
    pub doc_id: Option<i64>,
    pub doc_title: String,
    pub status: ExecutionStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub log_file: String,
    pub exit_code: Option<i64>,
    pub pid: Option<i64>,
    pub working_dir: Option<String>,
    pub last_heartbeat: Option<i64>,
    pub agent_type: String,
    pub pr_url: Option<String>,
    /// Links back to the task that triggered this execution.
    pub task_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentVersion {
    pub doc_id: i64,
    pub version_number: i64,
    pub content_hash: String,
    pub character_delta: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEvent {
    pub id: i64,
    pub event_type: String,
    pub doc_id: Option<i64>,
    pub session_id: Option<String>,
    /// Opaque JSON blob.
    pub metadata: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub doc_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub doc_id: i64,
    pub name: String,
    pub entity_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in ["open", "active", "blocked", "done", "wontdo"] {
            assert_eq!(TaskStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(TaskStatus::parse("paused").is_err());
    }

    #[test]
    fn test_link_kind_roundtrip() {
        for s in ["title_match", "entity", "semantic", "manual"] {
            assert_eq!(LinkKind::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_display_id() {
        let mut task = Task {
            id: 7,
            title: "x".into(),
            description: None,
            status: TaskStatus::Open,
            priority: 0,
            category_key: None,
            sequence_number: None,
            is_epic: false,
            epic_key: None,
            parent_task_id: None,
            prompt: None,
            created_at: 0,
            completed_at: None,
        };
        assert_eq!(task.display_id(), "#7");
        task.category_key = Some("FIX".into());
        task.sequence_number = Some(3);
        assert_eq!(task.display_id(), "FIX-3");
    }
}
