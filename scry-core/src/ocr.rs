use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ScryError};

/// Callback reporting human-readable readiness phases ("waiting",
/// "checking engine", ...). Implementations invoke it only on distinct
/// transitions, never on every poll.
pub type EngineStatusFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Contract for the external text-recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Block until the engine can accept work, reporting phase changes
    /// through `on_status`.
    async fn await_ready(&self, on_status: EngineStatusFn<'_>) -> Result<()>;

    /// Extract text from one image. May take seconds to minutes; must abort
    /// promptly when `cancel` fires.
    async fn extract_text(&self, path: &Path, cancel: &CancellationToken) -> Result<String>;
}

/// OCR engine shelling out to the tesseract CLI.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
}

impl TesseractEngine {
    pub fn new(language: impl Into<String>) -> Self {
        Self::with_binary("tesseract", language)
    }

    /// Use an explicit binary instead of `tesseract` from `PATH`.
    pub fn with_binary(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    async fn probe(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn await_ready(&self, on_status: EngineStatusFn<'_>) -> Result<()> {
        on_status("checking tesseract install");
        if self.probe().await {
            on_status("ready");
            return Ok(());
        }

        on_status("waiting for tesseract");
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if self.probe().await {
                on_status("ready");
                return Ok(());
            }
        }
    }

    async fn extract_text(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        // PSM 3 = fully automatic page segmentation, OEM 1 = LSTM only.
        let mut child = Command::new(&self.binary)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg("3")
            .arg("--oem")
            .arg("1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScryError::EngineUnavailable(format!("spawn {}: {e}", self.binary)))?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            ScryError::Internal("tesseract stdout not captured".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            ScryError::Internal("tesseract stderr not captured".to_string())
        })?;

        // Both pipes must drain together: tesseract blocks writing warnings
        // once the stderr pipe fills, and stdout never reaches EOF.
        let drain = async {
            let mut output = String::new();
            let mut diagnostics = String::new();
            tokio::try_join!(
                stdout.read_to_string(&mut output),
                stderr.read_to_string(&mut diagnostics),
            )?;
            Ok::<_, std::io::Error>((output, diagnostics))
        };

        tokio::select! {
            result = drain => {
                let (output, diagnostics) = result.map_err(|e| ScryError::Extraction {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                let status = child.wait().await.map_err(|e| ScryError::Extraction {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                if !status.success() {
                    let detail = diagnostics.trim();
                    return Err(ScryError::Extraction {
                        path: path.to_path_buf(),
                        reason: if detail.is_empty() {
                            format!("tesseract exited with {status}")
                        } else {
                            format!("tesseract exited with {status}: {detail}")
                        },
                    });
                }
                debug!(path = %path.display(), chars = output.trim().len(), "ocr complete");
                Ok(output.trim().to_owned())
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.start_kill() {
                    warn!(path = %path.display(), "failed to kill tesseract: {e}");
                }
                // Reap the killed child so it does not linger as a zombie.
                let _ = child.wait().await;
                Err(ScryError::Cancelled(format!(
                    "extraction aborted for {}",
                    path.display()
                )))
            }
        }
    }
}
