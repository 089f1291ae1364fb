//! Opaque LLM invocation via a configured subprocess.
//!
//! The engine never talks to a model API directly; `ask`, synthesis, and
//! wiki generation all shell out to `llm_command` (default `claude --print`)
//! with the prompt piped to stdin. Prompts can exceed OS argv limits, so
//! they are never passed as arguments. There is no built-in timeout; the
//! caller supplies a cancellation token.

use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Split a configured command string into program + args.
pub fn split_command(command: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| Error::input("llm command is empty"))?;
    Ok((program, parts.collect()))
}

/// Run the LLM with the prompt on stdin and return its stdout.
pub async fn run_llm(command: &str, prompt: &str, cancel: &CancellationToken) -> Result<String> {
    let (program, args) = split_command(command)?;

    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExternalToolMissing {
                    tool: program.clone(),
                    hint: format!("install it or change execution.llm_command (currently '{command}')"),
                }
            } else {
                Error::ExecutionFailed(format!("failed to spawn {program}: {e}"))
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to write prompt: {e}")))?;
        drop(stdin);
    }

    let output = tokio::select! {
        result = child.wait_with_output() => {
            result.map_err(|e| Error::ExecutionFailed(e.to_string()))?
        }
        _ = cancel.cancelled() => {
            return Err(Error::Cancelled);
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ExecutionFailed(format!(
            "{program} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        let (program, args) = split_command("claude --print --model sonnet").unwrap();
        assert_eq!(program, "claude");
        assert_eq!(args, vec!["--print", "--model", "sonnet"]);
    }

    #[test]
    fn test_split_command_empty() {
        assert!(split_command("   ").is_err());
    }

    #[tokio::test]
    async fn test_run_llm_missing_tool() {
        let cancel = CancellationToken::new();
        let err = run_llm("definitely-not-a-real-binary-zz", "hi", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalToolMissing { .. }));
    }

    #[tokio::test]
    async fn test_run_llm_pipes_stdin() {
        let cancel = CancellationToken::new();
        let out = run_llm("cat", "hello prompt", &cancel).await.unwrap();
        assert_eq!(out, "hello prompt");
    }

    #[tokio::test]
    async fn test_run_llm_nonzero_exit() {
        let cancel = CancellationToken::new();
        let err = run_llm("false", "x", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed(_)));
    }
}
