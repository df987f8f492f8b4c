//! Conversation history and version lookup.
//!
//! History is an append-only list of chat turns. Every successful edit adds
//! a user turn followed by a model turn, so roles always alternate
//! user → model. A *version* is a model turn, addressed by its position among
//! model turns; the user turn at the same position holds its prompt.

use crate::error::{EditorError, Result};
use serde::{Deserialize, Serialize};

/// Author of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Prompt sent by the user.
    User,
    /// Response produced by the model.
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// One part of a history entry: text, an image data URL, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image as a base64 data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl HistoryPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// Creates an image part.
    pub fn image(data_url: impl Into<String>) -> Self {
        Self {
            text: None,
            image: Some(data_url.into()),
        }
    }
}

/// A single conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who produced this turn.
    pub role: Role,
    /// Ordered parts of the turn.
    pub parts: Vec<HistoryPart>,
}

impl HistoryEntry {
    /// Builds a user turn: the prompt, followed by the edited image if any.
    pub fn user(prompt: impl Into<String>, image: Option<String>) -> Self {
        let mut parts = vec![HistoryPart::text(prompt)];
        if let Some(image) = image {
            parts.push(HistoryPart::image(image));
        }
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Builds a model turn: the description if any, followed by the image if any.
    pub fn model(description: Option<String>, image: Option<String>) -> Self {
        let mut parts = Vec::new();
        if let Some(text) = description {
            parts.push(HistoryPart::text(text));
        }
        if let Some(image) = image {
            parts.push(HistoryPart::image(image));
        }
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// First text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| p.text.as_deref())
    }

    /// First image part, if any.
    pub fn first_image(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| p.image.as_deref())
    }
}

/// A model-generated image/description pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    /// Position among model turns (0 = oldest).
    pub index: usize,
    /// Display number; the oldest version carries the highest number.
    pub number: usize,
    /// Prompt of the matching user turn, or empty.
    pub prompt: String,
    /// Generated image data URL.
    pub image: Option<String>,
    /// Model description.
    pub description: Option<String>,
}

/// Append-only conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from raw entries, checking role alternation.
    ///
    /// The entries must form complete exchanges: a trailing user entry is
    /// rejected.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Result<Self> {
        let mut history = Self::new();
        for entry in entries {
            history.push(entry)?;
        }
        if history.next_role() != Role::User {
            return Err(EditorError::InvalidRequest(
                "history has a dangling user entry".into(),
            ));
        }
        Ok(history)
    }

    /// Appends one entry. The role must continue the user → model alternation.
    pub fn push(&mut self, entry: HistoryEntry) -> Result<()> {
        let expected = self.next_role();
        if entry.role != expected {
            return Err(EditorError::InvalidRequest(format!(
                "history expects a {expected} entry next, got {}",
                entry.role
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Appends a complete user/model exchange.
    pub fn push_exchange(&mut self, user: HistoryEntry, model: HistoryEntry) -> Result<()> {
        if user.role != Role::User || model.role != Role::Model {
            return Err(EditorError::InvalidRequest(
                "an exchange is a user entry followed by a model entry".into(),
            ));
        }
        if self.next_role() != Role::User {
            return Err(EditorError::InvalidRequest(
                "history has a dangling user entry".into(),
            ));
        }
        self.entries.push(user);
        self.entries.push(model);
        Ok(())
    }

    fn next_role(&self) -> Role {
        match self.entries.last() {
            Some(e) if e.role == Role::User => Role::Model,
            _ => Role::User,
        }
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no exchange has happened yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Model turns in insertion order.
    pub fn model_responses(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.role == Role::Model)
    }

    /// User turns in insertion order.
    pub fn user_prompts(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.role == Role::User)
    }

    /// Number of versions (model turns).
    pub fn version_count(&self) -> usize {
        self.model_responses().count()
    }

    /// Prompt text of the user turn paired with version `index`, or empty.
    pub fn prompt_for_version(&self, index: usize) -> &str {
        self.user_prompts()
            .nth(index)
            .and_then(HistoryEntry::first_text)
            .unwrap_or("")
    }

    /// Looks up the version at `index` among model turns.
    pub fn version(&self, index: usize) -> Option<Version> {
        let count = self.version_count();
        let entry = self.model_responses().nth(index)?;
        Some(Version {
            index,
            number: count - index,
            prompt: self.prompt_for_version(index).to_string(),
            image: entry.first_image().map(str::to_string),
            description: entry.first_text().map(str::to_string),
        })
    }

    /// All versions, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        (0..self.version_count())
            .filter_map(|i| self.version(i))
            .collect()
    }
}
