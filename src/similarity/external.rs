//! External vector index process adapter.
//!
//! The external index is a separate executable invoked per operation with a
//! command word on its argv; it prints a JSON payload on stdout and signals
//! success through its exit code. Its stdout routinely carries stray log
//! and warning lines around the payload, so the payload is located by
//! scanning lines from the end backwards.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ExternalIndexError {
    #[error("failed to spawn index process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("index process exited with status {code:?}")]
    NonZeroExit { code: Option<i32> },

    #[error("index process timed out after {0:?}")]
    Timeout(Duration),

    #[error("no JSON payload found in index process output")]
    MissingPayload,

    #[error("malformed index process payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("index process reported failure")]
    BuildRefused,
}

/// One search hit from the external index. Extra fields in the payload are
/// ignored; only the id and score matter, full records come from the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalHit {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub similarity: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct BuildReport {
    success: bool,
}

/// Narrow port to the external vector index.
#[async_trait]
pub trait VectorIndexPort: Send + Sync {
    /// Rebuild the external index over the full corpus. The process has its
    /// own access to the store; nothing is passed along.
    async fn build(&self) -> Result<(), ExternalIndexError>;

    /// Query by text, at most `limit` hits, best first.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<ExternalHit>, ExternalIndexError>;
}

/// Process-spawning implementation of [`VectorIndexPort`].
pub struct ProcessVectorIndex {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ProcessVectorIndex {
    pub fn new(program: impl Into<String>, base_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout,
        }
    }

    /// Build an adapter from a configured command line, program first.
    pub fn from_command(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, base_args) = command.split_first()?;
        Some(Self::new(program.clone(), base_args.to_vec(), timeout))
    }

    async fn run(&self, extra_args: &[String]) -> Result<std::process::Output, ExternalIndexError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExternalIndexError::Timeout(self.timeout))?
            .map_err(ExternalIndexError::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            // diagnostics only, never parsed
            log::debug!("index process stderr: {}", stderr.trim());
        }

        Ok(output)
    }
}

#[async_trait]
impl VectorIndexPort for ProcessVectorIndex {
    async fn build(&self) -> Result<(), ExternalIndexError> {
        let output = self.run(&["build_index".to_string()]).await?;

        if !output.status.success() {
            return Err(ExternalIndexError::NonZeroExit {
                code: output.status.code(),
            });
        }

        // The exit code is the primary signal; the JSON report is advisory
        // and unparseable output still counts as success.
        let stdout = String::from_utf8_lossy(&output.stdout);
        match last_line_starting_with(&stdout, '{')
            .and_then(|line| serde_json::from_str::<BuildReport>(line).ok())
        {
            Some(report) if !report.success => Err(ExternalIndexError::BuildRefused),
            _ => Ok(()),
        }
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<ExternalHit>, ExternalIndexError> {
        let output = self
            .run(&[
                "find_by_text".to_string(),
                text.to_string(),
                limit.to_string(),
            ])
            .await?;

        if !output.status.success() {
            return Err(ExternalIndexError::NonZeroExit {
                code: output.status.code(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload =
            last_line_starting_with(&stdout, '[').ok_or(ExternalIndexError::MissingPayload)?;

        serde_json::from_str(payload).map_err(ExternalIndexError::MalformedPayload)
    }
}

/// Last stdout line starting with the given character, trimmed. The process
/// may log freely before (or after) printing its payload line.
pub(crate) fn last_line_starting_with(output: &str, prefix: char) -> Option<&str> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout_ms: u64) -> ProcessVectorIndex {
        // the command word appended by the adapter lands in $3 and is ignored
        ProcessVectorIndex::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_payload_after_warning_lines() {
        let output = "warning: deprecated\n[{\"id\":\"a\"}]";
        assert_eq!(
            last_line_starting_with(output, '['),
            Some("[{\"id\":\"a\"}]")
        );
    }

    #[test]
    fn test_payload_takes_last_array_line() {
        let output = "[\"stale\"]\nsome log\n[\"fresh\"]\ntrailing note";
        assert_eq!(last_line_starting_with(output, '['), Some("[\"fresh\"]"));
    }

    #[test]
    fn test_payload_missing() {
        assert_eq!(last_line_starting_with("no json here\nat all", '['), None);
        assert_eq!(last_line_starting_with("", '['), None);
    }

    #[test]
    fn test_payload_tolerates_indentation() {
        let output = "log line\n   [1, 2, 3]";
        assert_eq!(last_line_starting_with(output, '['), Some("[1, 2, 3]"));
    }

    #[tokio::test]
    async fn test_query_parses_hits_from_noisy_stdout() {
        let port = sh(
            r#"echo "warning: deprecated"; echo '[{"_id":"a","similarity":0.9},{"id":"b"}]'"#,
            5000,
        );

        let hits = port.query("anything", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].similarity, Some(0.9));
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[1].similarity, None);
    }

    #[tokio::test]
    async fn test_query_nonzero_exit_is_failure() {
        let port = sh("echo '[]'; exit 3", 5000);

        let result = port.query("anything", 5).await;
        assert!(matches!(
            result,
            Err(ExternalIndexError::NonZeroExit { code: Some(3) })
        ));
    }

    #[tokio::test]
    async fn test_query_without_payload_is_failure() {
        let port = sh("echo 'just a log line'", 5000);

        let result = port.query("anything", 5).await;
        assert!(matches!(result, Err(ExternalIndexError::MissingPayload)));
    }

    #[tokio::test]
    async fn test_query_non_array_payload_is_failure() {
        let port = sh("echo '[not json'", 5000);

        let result = port.query("anything", 5).await;
        assert!(matches!(
            result,
            Err(ExternalIndexError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_error_is_failure() {
        let port = ProcessVectorIndex::new(
            "/nonexistent/similarity-index",
            vec![],
            Duration::from_secs(5),
        );

        let result = port.build().await;
        assert!(matches!(result, Err(ExternalIndexError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let port = sh("sleep 5", 100);

        let result = port.query("anything", 5).await;
        assert!(matches!(result, Err(ExternalIndexError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_build_lenient_on_unparseable_output() {
        let port = sh("echo 'built ok, trust me'", 5000);
        assert!(port.build().await.is_ok());
    }

    #[tokio::test]
    async fn test_build_honors_explicit_refusal() {
        let port = sh(r#"echo '{"success": false}'"#, 5000);

        let result = port.build().await;
        assert!(matches!(result, Err(ExternalIndexError::BuildRefused)));
    }

    #[tokio::test]
    async fn test_build_accepts_success_report() {
        let port = sh(r#"echo 'indexing...'; echo '{"success": true}'"#, 5000);
        assert!(port.build().await.is_ok());
    }

    #[test]
    fn test_from_command_empty_is_none() {
        assert!(ProcessVectorIndex::from_command(&[], Duration::from_secs(1)).is_none());
    }
}
