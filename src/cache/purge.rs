//! Purge executor.
//!
//! Runs the external purge tool against the proxy/CDN layer. The exit status
//! of the tool is the only success signal.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use super::scope::PurgeTarget;

pub const DEFAULT_PURGE_TOOL: &str = "site-tools-client";

const METRIC_PURGE_TOTAL: &str = "purgeline_purge_total";
const METRIC_PURGE_MS: &str = "purgeline_purge_ms";

/// Result of one purge command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub succeeded: bool,
    /// Process exit code; `None` when the process was terminated by a signal.
    pub exit_status: Option<i32>,
}

impl PurgeOutcome {
    /// Map an exit code to an outcome. Only `Some(0)` is a success.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        Self {
            succeeded: code == Some(0),
            exit_status: code,
        }
    }
}

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("failed to launch purge tool `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Issues a purge for a resolved target against the proxy/CDN layer.
#[async_trait]
pub trait PurgeCommand: Send + Sync {
    async fn purge(&self, target: &PurgeTarget) -> Result<PurgeOutcome, PurgeError>;
}

/// Purge command backed by the hosting control tool.
///
/// The tool is invoked as
/// `<tool> domain-all update id=<hostname> flush_cache=1 path='<pattern>'`.
/// Arguments are passed without a shell, so the quotes around the pattern are
/// only part of the rendered command line.
#[derive(Debug, Clone)]
pub struct ProcessPurgeCommand {
    program: PathBuf,
}

impl ProcessPurgeCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Argument vector handed to the tool.
    pub fn arguments(target: &PurgeTarget) -> Vec<String> {
        vec![
            "domain-all".to_string(),
            "update".to_string(),
            format!("id={}", target.hostname),
            "flush_cache=1".to_string(),
            format!("path={}", target.pattern),
        ]
    }

    /// Shell rendering of the command, for logs.
    pub fn command_line(&self, target: &PurgeTarget) -> String {
        format!(
            "{} domain-all update id={} flush_cache=1 path='{}'",
            self.program.display(),
            target.hostname,
            target.pattern
        )
    }
}

impl Default for ProcessPurgeCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_TOOL)
    }
}

#[async_trait]
impl PurgeCommand for ProcessPurgeCommand {
    async fn purge(&self, target: &PurgeTarget) -> Result<PurgeOutcome, PurgeError> {
        let started_at = Instant::now();
        debug!(command = %self.command_line(target), "Running purge command");

        let output = Command::new(&self.program)
            .args(Self::arguments(target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| {
                counter!(METRIC_PURGE_TOTAL, "result" => "spawn_error").increment(1);
                PurgeError::Spawn {
                    program: self.program.display().to_string(),
                    source,
                }
            })?;

        let outcome = PurgeOutcome::from_exit_code(output.status.code());
        histogram!(METRIC_PURGE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        counter!(
            METRIC_PURGE_TOTAL,
            "result" => if outcome.succeeded { "success" } else { "failure" }
        )
        .increment(1);

        if !outcome.succeeded {
            warn!(
                hostname = %target.hostname,
                pattern = %target.pattern,
                exit_status = ?outcome.exit_status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Purge command failed"
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::scope::PathPattern;

    fn target() -> PurgeTarget {
        PurgeTarget {
            hostname: "example.com".to_string(),
            pattern: PathPattern::recursive("/posts/5"),
        }
    }

    #[test]
    fn exit_code_mapping_is_total() {
        assert!(PurgeOutcome::from_exit_code(Some(0)).succeeded);
        for code in [1, 2, 127, 255, -1, i32::MAX, i32::MIN] {
            assert!(!PurgeOutcome::from_exit_code(Some(code)).succeeded);
        }
        assert!(!PurgeOutcome::from_exit_code(None).succeeded);
    }

    #[test]
    fn renders_purge_command_line() {
        let command = ProcessPurgeCommand::default();
        assert_eq!(
            command.command_line(&target()),
            "site-tools-client domain-all update id=example.com flush_cache=1 path='/posts/5(.*)'"
        );
    }

    #[test]
    fn arguments_match_shell_word_splitting() {
        assert_eq!(
            ProcessPurgeCommand::arguments(&target()),
            vec![
                "domain-all",
                "update",
                "id=example.com",
                "flush_cache=1",
                "path=/posts/5(.*)",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success() {
        let outcome = ProcessPurgeCommand::new("true")
            .purge(&target())
            .await
            .expect("true should launch");
        assert_eq!(
            outcome,
            PurgeOutcome {
                succeeded: true,
                exit_status: Some(0)
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let outcome = ProcessPurgeCommand::new("false")
            .purge(&target())
            .await
            .expect("false should launch");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_status, Some(1));
    }

    #[tokio::test]
    async fn missing_tool_is_spawn_error() {
        let err = ProcessPurgeCommand::new("/nonexistent/purgeline-tool")
            .purge(&target())
            .await
            .expect_err("missing binary");
        assert!(matches!(err, PurgeError::Spawn { .. }));
    }
}
