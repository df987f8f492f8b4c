//! Editing session state.
//!
//! [`EditorSession`] owns everything a front end shows: the uploaded image,
//! the latest generated image and its description, the loading flag, the
//! last error and the conversation history. Submitting a prompt is split in
//! two halves ([`EditorSession::begin_submit`] / [`EditorSession::finish_submit`])
//! so a caller can release its lock on the session while the network call is
//! in flight; [`EditorSession::submit_prompt`] runs both halves in one go.

use crate::error::{EditorError, Result};
use crate::history::{History, HistoryEntry};
use crate::image::{EditRequest, EditResponse, ImageData, ImageEditor, ImageEditorExt};
use serde::Serialize;

/// Error text shown when the model answers without an image.
pub const NO_IMAGE_ERROR: &str = "No image returned from API";

/// An edit that has been started and awaits the model's answer.
#[derive(Debug, Clone)]
#[must_use = "a pending edit must be finished to clear the loading state"]
pub struct PendingEdit {
    request: EditRequest,
}

impl PendingEdit {
    /// The request to send to the editor.
    pub fn request(&self) -> &EditRequest {
        &self.request
    }
}

/// In-memory state of one editing session.
#[derive(Debug, Default)]
pub struct EditorSession {
    image: Option<ImageData>,
    generated_image: Option<String>,
    description: Option<String>,
    loading: bool,
    error: Option<String>,
    history: History,
}

impl EditorSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the uploaded image; `None` removes it.
    pub fn select_image(&mut self, image: Option<ImageData>) {
        tracing::debug!(selected = image.is_some(), "image selection changed");
        self.image = image;
    }

    /// The uploaded image, as a data URL.
    pub fn uploaded_image(&self) -> Option<String> {
        self.image.as_ref().map(ImageData::to_data_url)
    }

    /// The latest generated image, as a data URL.
    pub fn generated_image(&self) -> Option<&str> {
        self.generated_image.as_deref()
    }

    /// The description returned with the latest generated image.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// True while a prompt is being processed.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The last error, cleared when the next prompt is submitted.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The conversation so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// True when an image was uploaded.
    pub fn has_uploaded_image(&self) -> bool {
        self.image.is_some()
    }

    /// The image the next prompt edits: the generated one, else the upload.
    pub fn current_image(&self) -> Option<String> {
        self.generated_image
            .clone()
            .or_else(|| self.uploaded_image())
    }

    /// True when the next prompt edits an existing image.
    pub fn is_editing(&self) -> bool {
        self.generated_image.is_some() || self.image.is_some()
    }

    /// Starts processing a prompt.
    ///
    /// Fails when the prompt is blank or another prompt is still running.
    /// On success the session is loading and the previous error is cleared.
    pub fn begin_submit(&mut self, prompt: &str) -> Result<PendingEdit> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditorError::InvalidRequest("prompt must not be empty".into()));
        }
        if self.loading {
            return Err(EditorError::Busy);
        }

        self.loading = true;
        self.error = None;

        let mut request = EditRequest::new(prompt).with_history(self.history.entries().to_vec());
        request.image = self.current_image();

        tracing::info!(
            editing = request.is_edit(),
            turns = self.history.len(),
            "prompt submitted"
        );

        Ok(PendingEdit { request })
    }

    /// Applies the outcome of a pending edit and clears the loading flag.
    pub fn finish_submit(&mut self, pending: PendingEdit, outcome: Result<EditResponse>) {
        self.loading = false;
        let PendingEdit { request } = pending;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("error processing request: {e}");
                self.error = Some(e.to_string());
                return;
            }
        };

        let Some(image) = response.image.filter(|s| !s.is_empty()) else {
            tracing::warn!("model answered without an image");
            self.error = Some(NO_IMAGE_ERROR.to_string());
            return;
        };

        let description = response.description.filter(|s| !s.is_empty());
        let user = HistoryEntry::user(request.prompt, request.image);
        let model = HistoryEntry::model(description.clone(), Some(image.clone()));
        if let Err(e) = self.history.push_exchange(user, model) {
            self.error = Some(e.to_string());
            return;
        }

        self.generated_image = Some(image);
        self.description = description;
        tracing::debug!(versions = self.history.version_count(), "history updated");
    }

    /// Submits a prompt through `editor` and applies the result.
    ///
    /// The outcome is recorded in the session; the returned error only
    /// reports prompts that could not be started.
    pub async fn submit_prompt<E>(&mut self, editor: &E, prompt: &str, max_retries: u32) -> Result<()>
    where
        E: ImageEditor + ?Sized,
    {
        let pending = self.begin_submit(prompt)?;
        let outcome = editor.edit_with_retries(pending.request(), max_retries).await;
        self.finish_submit(pending, outcome);
        Ok(())
    }

    /// Discards every piece of state.
    pub fn reset(&mut self) {
        tracing::debug!("session reset");
        *self = Self::default();
    }

    /// Serializable copy of the state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            image: self.uploaded_image(),
            generated_image: self.generated_image.clone(),
            description: self.description.clone(),
            loading: self.loading,
            error: self.error.clone(),
            history: self.history.clone(),
        }
    }
}

/// Point-in-time view of an [`EditorSession`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Uploaded image.
    pub image: Option<String>,
    /// Latest generated image.
    pub generated_image: Option<String>,
    /// Latest description.
    pub description: Option<String>,
    /// Loading flag.
    pub loading: bool,
    /// Last error.
    pub error: Option<String>,
    /// Conversation history.
    pub history: History,
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted editor for session and server tests.

    use super::*;
    use crate::image::EditorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) struct ScriptedEditor {
        responses: Mutex<Vec<Result<EditResponse>>>,
        pub(crate) requests: Mutex<Vec<EditRequest>>,
    }

    impl ScriptedEditor {
        pub(crate) fn new(responses: Vec<Result<EditResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn image(url: &str, description: Option<&str>) -> Result<EditResponse> {
            Ok(EditResponse {
                image: Some(url.to_string()),
                description: description.map(str::to_string),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl ImageEditor for ScriptedEditor {
        async fn edit(&self, request: &EditRequest) -> Result<EditResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(EditorError::UnexpectedResponse("script exhausted".into()));
            }
            responses.remove(0)
        }

        fn kind(&self) -> EditorKind {
            EditorKind::Gemini
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }
}
