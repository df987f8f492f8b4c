//! Image editor trait and utilities.

use crate::error::Result;
use crate::image::types::{EditRequest, EditResponse};
use async_trait::async_trait;

/// Backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    /// Google Gemini image models.
    Gemini,
}

impl std::fmt::Display for EditorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// A service that generates or edits an image from a prompt.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Sends the prompt, optional image and optional history to the model.
    async fn edit(&self, request: &EditRequest) -> Result<EditResponse>;

    /// Returns the kind of this editor.
    fn kind(&self) -> EditorKind;

    /// Returns the name of this editor for display.
    fn name(&self) -> &str {
        match self.kind() {
            EditorKind::Gemini => "Gemini (Google)",
        }
    }

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

/// Extension trait for editors with retry logic.
#[async_trait]
pub trait ImageEditorExt: ImageEditor {
    /// Edits with automatic retries on transient failures.
    async fn edit_with_retries(
        &self,
        request: &EditRequest,
        max_retries: u32,
    ) -> Result<EditResponse> {
        let mut attempt = 0;
        loop {
            match self.edit(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let delay = e.retry_after().unwrap_or(std::time::Duration::from_secs(1));
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis(),
                        "retrying after transient error: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: ImageEditor + ?Sized> ImageEditorExt for T {}
