use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use tutor_core::errors::GenerationError;
use tutor_core::messages::PromptBlock;
use tutor_core::provider::Generator;

use crate::gemma;

/// Sampling and process settings for `mlx_lm.generate`.
#[derive(Clone, Debug)]
pub struct MlxConfig {
    pub binary: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout: Duration,
}

impl Default for MlxConfig {
    fn default() -> Self {
        Self {
            binary: "mlx_lm.generate".into(),
            model: "mlx-community/gemma-2-9b-it-4bit".into(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Runs a local MLX model as a one-shot subprocess per turn.
pub struct MlxGenerator {
    config: MlxConfig,
}

impl MlxGenerator {
    pub fn new(config: MlxConfig) -> Self {
        Self { config }
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--model")
            .arg(&self.config.model)
            .arg("--prompt")
            .arg(prompt)
            .arg("--max-tokens")
            .arg(self.config.max_tokens.to_string())
            .arg("--temp")
            .arg(self.config.temperature.to_string())
            .arg("--top-p")
            .arg(self.config.top_p.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Generator for MlxGenerator {
    fn name(&self) -> &str {
        "mlx"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, blocks), fields(model = %self.config.model, blocks = blocks.len()))]
    async fn generate(&self, blocks: &[PromptBlock]) -> Result<String, GenerationError> {
        let prompt = gemma::format_prompt(blocks);
        debug!(prompt_chars = prompt.len(), "spawning mlx");

        let child = self
            .command(&prompt)
            .spawn()
            .map_err(|e| GenerationError::Unavailable(format!("{}: {e}", self.config.binary)))?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| GenerationError::Timeout(self.config.timeout))?
            .map_err(|e| GenerationError::Failure(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() && !stderr.contains("Loading") {
            warn!(stderr = %stderr.trim(), "mlx wrote to stderr");
        }

        if !output.status.success() {
            return Err(GenerationError::Failure(format!(
                "{} exited with {}: {}",
                self.config.binary,
                output.status,
                stderr.trim()
            )));
        }

        let reply = gemma::parse_output(&String::from_utf8_lossy(&output.stdout));
        if reply.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(reply)
    }

    async fn health_check(&self) -> bool {
        let result = Command::new(&self.config.binary)
            .arg("--help")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(Duration::from_secs(10), result).await {
            Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout).contains("usage:"),
            _ => false,
        }
    }
}
