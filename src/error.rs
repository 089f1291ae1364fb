//! Unified error kinds for the knowledge store engine.
//!
//! Every layer below the CLI returns [`Result`]; the binary translates the
//! kind into an exit code and a one-line message at the boundary. Enrichment
//! is the one exception to propagation: its failures are logged as warning
//! events and never surface to the caller of `save`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identifier, empty title, invalid date range, bad flag value.
    #[error("invalid input: {0}")]
    Input(String),

    /// Document, task, or execution id not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate link, dependency cycle, sequence collision. Often recoverable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error not otherwise classified.
    #[error("storage error: {0}")]
    Storage(String),

    /// A migration failed to apply; the database is untouched beyond the
    /// failed transaction's rollback.
    #[error("migration {id} failed: {cause}")]
    MigrationFailed { id: String, cause: String },

    /// Child exit != 0 or spawn failure. Recorded on the execution row;
    /// `delegate` surfaces this as a status, not an error.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Operation aborted by the user or a timeout.
    #[error("cancelled")]
    Cancelled,

    /// git, gh, or the LLM command is not installed.
    #[error("{tool} not found: {hint}")]
    ExternalToolMissing { tool: String, hint: String },
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Stable kind tag used by `--json` error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Input(_) => "input",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Storage(_) => "storage",
            Error::MigrationFailed { .. } => "migration_failed",
            Error::ExecutionFailed(_) => "execution_failed",
            Error::Cancelled => "cancelled",
            Error::ExternalToolMissing { .. } => "external_tool_missing",
        }
    }

    /// Process exit code for the CLI boundary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::Input(_) | Error::ExternalToolMissing { .. } => 3,
            Error::Cancelled => 130,
            _ => 1,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Error::NotFound("row".to_string()),
            sqlx::Error::Database(db) => {
                let msg = db.message().to_string();
                if db.is_unique_violation() {
                    Error::Conflict(format!("unique constraint: {msg}"))
                } else if db.is_foreign_key_violation() {
                    Error::Conflict(format!("foreign key constraint: {msg}"))
                } else if msg.contains("malformed") || msg.contains("corrupt") {
                    Error::Storage(format!(
                        "{msg} (database may be corrupt; run `emdx maintain vacuum` to check integrity)"
                    ))
                } else {
                    Error::Storage(msg)
                }
            }
            _ => Error::Storage(e.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::not_found("doc 9").exit_code(), 2);
        assert_eq!(Error::input("empty title").exit_code(), 3);
        assert_eq!(Error::Cancelled.exit_code(), 130);
        assert_eq!(Error::Storage("disk".into()).exit_code(), 1);
        assert_eq!(
            Error::ExternalToolMissing {
                tool: "gh".into(),
                hint: "install from https://cli.github.com".into()
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::conflict("dup").kind(), "conflict");
        assert_eq!(
            Error::MigrationFailed {
                id: "001_base".into(),
                cause: "x".into()
            }
            .kind(),
            "migration_failed"
        );
    }
}
