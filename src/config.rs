//! Runtime configuration for front ends.

use crate::image::{ImageFormat, MAX_UPLOAD_BYTES};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "gemini")]
use crate::error::{EditorError, Result};
#[cfg(feature = "gemini")]
use crate::image::providers::{GeminiEditor, GeminiModel};

/// Environment variable selecting the Gemini model by id.
pub const MODEL_ENV_VAR: &str = "GENEDIT_MODEL";

/// Settings shared by the CLI and the JSON-RPC server.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Explicit API key; `None` defers to the environment.
    pub api_key: Option<String>,
    /// Model id override.
    pub model: Option<String>,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Largest accepted upload.
    pub max_upload_bytes: u64,
    /// Directory downloads are written to.
    pub output_dir: PathBuf,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            max_retries: 0,
            timeout: Duration::from_secs(120),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            output_dir: PathBuf::from("."),
        }
    }
}

impl EditorConfig {
    /// Creates a new `EditorConfigBuilder`.
    pub fn builder() -> EditorConfigBuilder {
        EditorConfigBuilder::default()
    }

    /// Builds the Gemini editor described by this configuration.
    #[cfg(feature = "gemini")]
    pub fn gemini_editor(&self) -> Result<GeminiEditor> {
        let mut builder = GeminiEditor::builder().timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(ref id) = self.model {
            let model = GeminiModel::from_id(id).ok_or_else(|| {
                EditorError::InvalidRequest(format!("unknown Gemini model: {id}"))
            })?;
            builder = builder.model(model);
        }
        builder.build()
    }

    /// Default path for downloading an image: `gemini-image-<millis>.<ext>`.
    pub fn download_path(&self, format: ImageFormat) -> PathBuf {
        self.output_dir.join(download_file_name(format))
    }
}

/// File name used when downloading a generated image.
pub fn download_file_name(format: ImageFormat) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("gemini-image-{millis}.{}", format.extension())
}

/// Builder for EditorConfig.
#[derive(Debug, Clone, Default)]
pub struct EditorConfigBuilder {
    config: EditorConfig,
}

impl EditorConfigBuilder {
    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Sets the model id. Falls back to `GENEDIT_MODEL`.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the upload size limit.
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Sets the download directory.
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Finishes the configuration, reading unset values from the environment.
    pub fn build(mut self) -> EditorConfig {
        if self.config.model.is_none() {
            self.config.model = std::env::var(MODEL_ENV_VAR)
                .ok()
                .filter(|m| !m.trim().is_empty());
        }
        self.config
    }
}
