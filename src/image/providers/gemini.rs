//! Gemini (Google) image editing provider.

use crate::error::{parse_retry_after, sanitize_error_message, EditorError, Result};
use crate::history::{HistoryEntry, Role};
use crate::image::provider::{EditorKind, ImageEditor};
use crate::image::types::{EditMetadata, EditRequest, EditResponse, ImageData, ImageFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.0 Flash experimental image generation.
    #[default]
    Flash2Exp,
    /// Gemini 2.0 Flash preview image generation.
    Flash2Preview,
    /// Gemini 2.5 Flash Image.
    Flash25Image,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash2Exp => "gemini-2.0-flash-exp-image-generation",
            Self::Flash2Preview => "gemini-2.0-flash-preview-image-generation",
            Self::Flash25Image => "gemini-2.5-flash-image",
        }
    }

    /// Parses an API model identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        [Self::Flash2Exp, Self::Flash2Preview, Self::Flash25Image]
            .into_iter()
            .find(|m| m.as_str() == id.trim())
    }
}

/// Builder for GeminiEditor.
#[derive(Debug, Clone)]
pub struct GeminiEditorBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: String,
    timeout: Duration,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

impl Default for GeminiEditorBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: GeminiModel::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

impl GeminiEditorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets nucleus sampling.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets top-k sampling.
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Builds the editor, resolving the API key.
    pub fn build(self) -> Result<GeminiEditor> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EditorError::Auth(
                    "GEMINI_API_KEY / GOOGLE_API_KEY not set and no API key provided".into(),
                )
            })?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(GeminiEditor {
            client,
            api_key,
            model: self.model,
            base_url: self.base_url,
            timeout: self.timeout,
            sampling: Sampling {
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

/// Gemini image editing provider.
pub struct GeminiEditor {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
    timeout: Duration,
    sampling: Sampling,
}

impl GeminiEditor {
    /// Creates a new `GeminiEditorBuilder`.
    pub fn builder() -> GeminiEditorBuilder {
        GeminiEditorBuilder::new()
    }

    /// Returns the configured model.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    async fn edit_impl(&self, request: &EditRequest) -> Result<EditResponse> {
        let start = Instant::now();

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );

        let body = GeminiRequest::from_edit_request(request, self.sampling)?;

        tracing::debug!(
            model = self.model.as_str(),
            turns = body.contents.len(),
            editing = request.is_edit(),
            "sending edit request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EditorError::Timeout(self.timeout)
                } else {
                    EditorError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let mut edit = gemini_response.into_edit_response()?;
        edit.metadata = EditMetadata {
            model: Some(self.model.as_str().to_string()),
            duration_ms: Some(start.elapsed().as_millis() as u64),
        };

        tracing::info!(
            model = self.model.as_str(),
            duration_ms = edit.metadata.duration_ms,
            has_description = edit.description.is_some(),
            "edit completed"
        );

        Ok(edit)
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> EditorError {
    let text = sanitize_error_message(text);
    if status == 402 {
        return EditorError::Billing(
            "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
        );
    }
    if status == 404 {
        return EditorError::InvalidRequest(
            "Model not found. Verify the model name is correct.".into(),
        );
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(Duration::from_secs);
        return EditorError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return EditorError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return EditorError::ContentBlocked(text);
    }
    EditorError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl ImageEditor for GeminiEditor {
    async fn edit(&self, request: &EditRequest) -> Result<EditResponse> {
        self.edit_impl(request).await
    }

    fn kind(&self) -> EditorKind {
        EditorKind::Gemini
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(EditorError::Auth("Invalid API key".into())),
            404 => Err(EditorError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(EditorError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: Role,
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

impl GeminiRequestPart {
    fn image(data_url: &str) -> Result<Self> {
        let image = ImageData::from_data_url(data_url)?;
        Ok(Self::InlineData {
            inline_data: GeminiInlineData {
                mime_type: image.format.mime_type().to_string(),
                data: image.to_base64(),
            },
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    response_modalities: Vec<String>,
}

impl GeminiContent {
    fn from_history_entry(entry: &HistoryEntry) -> Result<Self> {
        let mut parts = Vec::with_capacity(entry.parts.len());
        for part in &entry.parts {
            if let Some(ref text) = part.text {
                parts.push(GeminiRequestPart::Text { text: text.clone() });
            }
            if let Some(ref image) = part.image {
                parts.push(GeminiRequestPart::image(image)?);
            }
        }
        Ok(Self {
            role: entry.role,
            parts,
        })
    }
}

impl GeminiRequest {
    fn from_edit_request(req: &EditRequest, sampling: Sampling) -> Result<Self> {
        let prompt = req.prompt.trim();
        if prompt.is_empty() {
            return Err(EditorError::InvalidRequest("prompt must not be empty".into()));
        }

        let mut contents = Vec::new();
        for exchange in req.history.as_deref().unwrap_or_default().chunks(2) {
            let [user, model] = exchange else {
                return Err(EditorError::InvalidRequest(
                    "history has a dangling user entry".into(),
                ));
            };
            if user.role != Role::User || model.role != Role::Model {
                return Err(EditorError::InvalidRequest(
                    "history must alternate user and model entries".into(),
                ));
            }
            let user = GeminiContent::from_history_entry(user)?;
            let model = GeminiContent::from_history_entry(model)?;
            // Turns without parts are rejected by the API. Dropping the whole
            // exchange keeps the roles alternating.
            if user.parts.is_empty() || model.parts.is_empty() {
                continue;
            }
            contents.push(user);
            contents.push(model);
        }

        let mut parts = vec![GeminiRequestPart::Text {
            text: prompt.to_string(),
        }];
        if let Some(ref image) = req.image {
            parts.push(GeminiRequestPart::image(image)?);
        }
        contents.push(GeminiContent {
            role: Role::User,
            parts,
        });

        Ok(Self {
            contents,
            generation_config: GeminiConfig {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                top_k: sampling.top_k,
                response_modalities: vec!["Text".to_string(), "Image".to_string()],
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GeminiResponse {
    /// Converts the first candidate into an image data URL plus description.
    ///
    /// A missing image is not an error here; the caller decides what an
    /// image-less answer means.
    fn into_edit_response(self) -> Result<EditResponse> {
        // Prompt blocks come back as HTTP 200
        if let Some(feedback) = self.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(EditorError::ContentBlocked(msg));
            }
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            EditorError::UnexpectedResponse("No candidates in Gemini response".into())
        })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(EditorError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {}",
                        finish_reason
                    )));
                }
                _ => {}
            }
        }

        let mut image = None;
        let mut texts = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                texts.push(text);
            }
            if let Some(inline) = part.inline_data.filter(|_| image.is_none()) {
                let mime = ImageFormat::from_mime_type(&inline.mime_type)
                    .map(|f| f.mime_type())
                    .unwrap_or("image/png");
                image = Some(format!("data:{};base64,{}", mime, inline.data));
            }
        }

        let description = texts.join("").trim().to_string();

        Ok(EditResponse {
            image,
            description: (!description.is_empty()).then_some(description),
            metadata: EditMetadata::default(),
        })
    }
}
