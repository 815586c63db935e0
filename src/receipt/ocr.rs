//! Text extraction from receipt images.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::ExtractionError;

/// Turns an image on disk into raw text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image: &Path) -> Result<String, ExtractionError>;
}

/// Runs the `tesseract` command-line tool and reads the text from stdout.
pub struct TesseractExtractor {
    config: OcrConfig,
}

impl TesseractExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn command(&self, image: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract(&self, image: &Path) -> Result<String, ExtractionError> {
        debug!(image = %image.display(), lang = %self.config.language, "Running tesseract");

        let output = self
            .command(image)
            .output()
            .await
            .map_err(|source| ExtractionError::Launch {
                binary: self.config.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                binary: self.config.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ExtractionError::InvalidOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let extractor = TesseractExtractor::new(OcrConfig {
            binary: "/nonexistent/tesseract-binary".into(),
            language: "spa".into(),
        });
        let err = extractor
            .extract(Path::new("/tmp/receipt.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Launch { .. }));
        assert!(err.to_string().contains("/nonexistent/tesseract-binary"));
    }

    #[test]
    fn command_passes_language() {
        let extractor = TesseractExtractor::new(OcrConfig::default());
        let cmd = extractor.command(Path::new("img.png"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["img.png", "stdout", "-l", "spa"]);
        assert_eq!(cmd.as_std().get_program(), "tesseract");
    }
}
