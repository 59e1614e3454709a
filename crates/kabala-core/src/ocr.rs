//! OCR engine contract and the retry loop around it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::PipelineConfig;
use crate::models::receipt::Artifact;

/// What an engine returns for one recognition attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub success: bool,
    pub full_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrOutput {
    pub fn text(full_text: impl Into<String>) -> Self {
        Self {
            success: true,
            full_text: full_text.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            full_text: String::new(),
            error: Some(error.into()),
        }
    }
}

/// External text recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text of one artifact.
    async fn recognize(&self, artifact: &Artifact) -> OcrOutput;
}

/// Run one attempt under the configured time budget.
async fn recognize_once(
    engine: &dyn OcrEngine,
    artifact: &Artifact,
    timeout_ms: u64,
) -> Result<String, OcrError> {
    let output = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        engine.recognize(artifact),
    )
    .await
    .map_err(|_| OcrError::Timeout(timeout_ms))?;

    if output.success {
        Ok(output.full_text)
    } else {
        Err(OcrError::Engine(
            output
                .error
                .unwrap_or_else(|| "unknown OCR failure".to_string()),
        ))
    }
}

/// Recognize `artifact`, retrying failed attempts with exponential backoff.
///
/// The first attempt runs immediately; retry `n` waits
/// [`PipelineConfig::backoff_ms`]`(n)` first. Only the engine call is
/// repeated.
pub async fn recognize_with_retry(
    engine: &dyn OcrEngine,
    artifact: &Artifact,
    config: &PipelineConfig,
) -> Result<String, OcrError> {
    let attempts = config.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = config.backoff_ms(attempt - 1);
            debug!("Waiting {} ms before OCR attempt {}", delay, attempt);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match recognize_once(engine, artifact, config.attempt_timeout_ms).await {
            Ok(text) => {
                if attempt > 1 {
                    info!(
                        "OCR of {} succeeded on attempt {}",
                        artifact.reference, attempt
                    );
                }
                return Ok(text);
            }
            Err(e) => {
                warn!(
                    "OCR attempt {}/{} for {} failed: {}",
                    attempt, attempts, artifact.reference, e
                );
                last_error = match e {
                    OcrError::Engine(message) => message,
                    other => other.to_string(),
                };
            }
        }
    }

    Err(OcrError::Exhausted {
        attempts,
        last_error,
    })
}

/// Engine that reads previously recognized text from disk.
///
/// A text artifact is read as is; for anything else a `.txt` file with the
/// same stem next to it is used.
#[derive(Debug, Clone, Default)]
pub struct TextDumpOcr;

impl TextDumpOcr {
    pub fn new() -> Self {
        Self
    }

    /// File the text is read from.
    pub fn dump_path(reference: &str) -> PathBuf {
        let path = Path::new(reference);
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));

        if is_text {
            path.to_path_buf()
        } else {
            path.with_extension("txt")
        }
    }
}

#[async_trait]
impl OcrEngine for TextDumpOcr {
    async fn recognize(&self, artifact: &Artifact) -> OcrOutput {
        let path = Self::dump_path(&artifact.reference);
        match std::fs::read_to_string(&path) {
            Ok(text) => OcrOutput::text(text),
            Err(e) => OcrOutput::failure(format!("{}: {}", path.display(), e)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Replays a fixed list of outputs; repeats the last one when exhausted.
    pub(crate) struct ScriptedOcr {
        script: Mutex<VecDeque<OcrOutput>>,
        calls: AtomicU32,
    }

    impl ScriptedOcr {
        pub(crate) fn new(script: Vec<OcrOutput>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        /// Fails `failures` times, then returns `text`.
        pub(crate) fn failing_then(failures: usize, text: &str) -> Self {
            let mut script: Vec<_> = (0..failures)
                .map(|i| OcrOutput::failure(format!("engine unavailable ({})", i + 1)))
                .collect();
            script.push(OcrOutput::text(text));
            Self::new(script)
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, _artifact: &Artifact) -> OcrOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap_or_default()
            } else {
                script.front().cloned().unwrap_or_default()
            }
        }
    }

    /// Config without backoff delays.
    pub(crate) fn instant_pipeline() -> PipelineConfig {
        PipelineConfig {
            initial_backoff_ms: 0,
            attempt_timeout_ms: 1000,
            ..PipelineConfig::default()
        }
    }
}
