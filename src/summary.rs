//! Short description generation for prompt content.
//!
//! Same degradation shape as the similarity engine: try the external
//! summarizer process, then fall back to a keyword heuristic that always
//! produces something.

use crate::config::SummaryConfig;
use crate::fallback::{run_chain, Strategy};
use crate::similarity::external::last_line_starting_with;
use anyhow::{anyhow, bail};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Generated descriptions are clipped to this length
const MAX_DESCRIPTION_LENGTH: usize = 150;

const ACTION_WORDS: &[&str] = &[
    "write", "create", "generate", "analyze", "explain", "help", "assist", "code", "debug",
    "review",
];

const TECH_WORDS: &[&str] = &[
    "javascript",
    "python",
    "rust",
    "react",
    "vue",
    "html",
    "css",
    "sql",
    "api",
    "function",
    "component",
];

#[derive(Debug, Deserialize)]
struct SummarizerReport {
    success: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct SummaryService {
    command: Vec<String>,
    timeout: Duration,
}

impl SummaryService {
    pub fn new(config: &SummaryConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.process_timeout_secs),
        }
    }

    /// Generate a one-line description for the given prompt content.
    ///
    /// Blank content is a caller error; everything past that always yields
    /// a description, however plain.
    pub async fn generate(&self, content: &str) -> anyhow::Result<String> {
        let content = content.trim();
        if content.is_empty() {
            bail!("prompt content is required");
        }

        let strategies = vec![Strategy::new("external-summarizer", async move {
            self.generate_external(content).await
        })];

        if let Some(description) = run_chain(strategies).await {
            return Ok(description);
        }

        Ok(Self::generate_heuristic(content))
    }

    async fn generate_external(&self, content: &str) -> anyhow::Result<Option<String>> {
        let Some((program, base_args)) = self.command.split_first() else {
            return Ok(None);
        };

        let mut cmd = Command::new(program);
        cmd.args(base_args)
            .arg("generate_description")
            .arg(content)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("summarizer timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "summarizer exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = last_line_starting_with(&stdout, '{')
            .ok_or_else(|| anyhow!("no JSON payload in summarizer output"))?;

        let report: SummarizerReport = serde_json::from_str(payload)?;
        match report {
            SummarizerReport {
                success: true,
                description: Some(description),
            } if !description.trim().is_empty() => Ok(Some(description)),
            _ => Ok(None),
        }
    }

    /// Keyword heuristic used when no summarizer is available.
    fn generate_heuristic(content: &str) -> String {
        let lowered = content.to_lowercase();

        let action = ACTION_WORDS.iter().find(|word| lowered.contains(*word));
        let tech = TECH_WORDS.iter().find(|word| lowered.contains(*word));

        let description = match (action, tech) {
            (Some(action), Some(tech)) => {
                format!("A prompt to {action} {tech} code and solutions")
            }
            (Some(action), None) => {
                format!("A helpful prompt to {action} content and provide assistance")
            }
            (None, Some(tech)) => format!("A {tech} focused prompt for development tasks"),
            (None, None) => {
                if content.len() < 50 {
                    "A concise AI prompt for quick tasks and queries".to_string()
                } else if content.len() > 200 {
                    "A comprehensive AI prompt with detailed instructions".to_string()
                } else {
                    "A useful AI prompt for various tasks and assistance".to_string()
                }
            }
        };

        if description.len() > MAX_DESCRIPTION_LENGTH {
            let truncated: String = description.chars().take(MAX_DESCRIPTION_LENGTH - 3).collect();
            format!("{truncated}...")
        } else {
            description
        }
    }
}
