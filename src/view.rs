//! Tab and panel state derived from an [`EditorSession`].
//!
//! Front ends keep a [`TabsState`] next to the session and call
//! [`TabsView::derive`] after every change to learn what to show.

use crate::error::{EditorError, Result};
use crate::history::Version;
use crate::session::EditorSession;
use serde::Serialize;

/// The two tabs of the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    /// Generate or edit from a prompt.
    #[default]
    Create,
    /// Upload a starting image.
    Upload,
}

impl std::str::FromStr for Tab {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "upload" => Ok(Self::Upload),
            other => Err(EditorError::InvalidRequest(format!("unknown tab: {other}"))),
        }
    }
}

impl std::fmt::Display for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Upload => write!(f, "Upload Image"),
        }
    }
}

/// View-local state: which tab is open and which version is highlighted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabsState {
    active_tab: Tab,
    selected_version: Option<usize>,
}

impl TabsState {
    /// Starts on the create tab with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently open tab.
    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    /// Index of the highlighted version.
    pub fn selected_version(&self) -> Option<usize> {
        self.selected_version
    }

    /// Switches tab. Tabs are disabled while a prompt is processing.
    pub fn set_active_tab(&mut self, session: &EditorSession, tab: Tab) -> Result<()> {
        if session.is_loading() {
            return Err(EditorError::Busy);
        }
        self.active_tab = tab;
        Ok(())
    }

    /// Highlights the version at `index` among model turns.
    pub fn select_version(&mut self, session: &EditorSession, index: usize) -> Result<Version> {
        let version = session.history().version(index).ok_or_else(|| {
            EditorError::InvalidRequest(format!(
                "no version at index {index} ({} available)",
                session.history().version_count()
            ))
        })?;
        self.selected_version = Some(index);
        Ok(version)
    }

    /// Removes the highlight.
    pub fn clear_selection(&mut self) {
        self.selected_version = None;
    }

    /// Image of the highlighted version, falling back to the latest result.
    pub fn selected_version_image(&self, session: &EditorSession) -> Option<String> {
        self.selected_version
            .and_then(|i| session.history().version(i))
            .and_then(|v| v.image)
            .or_else(|| session.generated_image().map(str::to_string))
    }

    /// Resets to the initial view.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One row of the edit-history panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HistoryItem {
    /// The uploaded image.
    Original,
    /// A generated version.
    Version {
        /// Position among model turns.
        index: usize,
        /// Display number.
        number: usize,
        /// Prompt that produced it.
        prompt: String,
        /// Thumbnail source.
        thumbnail: Option<String>,
        /// Whether this row is highlighted.
        selected: bool,
    },
}

impl HistoryItem {
    /// Display label, e.g. `Version 2`.
    pub fn label(&self) -> String {
        match self {
            Self::Original => "Original".to_string(),
            Self::Version { number, .. } => format!("Version {number}"),
        }
    }
}

/// Content of the create tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CreatePanel {
    /// Upload area plus prompt input.
    Input {
        /// Image the prompt would edit.
        current_image: Option<String>,
        /// Prompt input labels.
        prompt: PromptInput,
    },
    /// Placeholder while the model works.
    Loading,
    /// Latest result with follow-up prompt and history.
    Result {
        /// Latest generated image.
        image: String,
        /// Its description.
        description: Option<String>,
        /// Follow-up prompt input.
        prompt: PromptInput,
        /// History rows.
        history: Vec<HistoryItem>,
    },
}

/// Content of the upload tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UploadPanel {
    /// Nothing to edit yet.
    Dropzone,
    /// Preview of the image to edit.
    Editor {
        /// Image the prompt would edit.
        current_image: String,
        /// Prompt input labels.
        prompt: PromptInput,
        /// History rows.
        history: Vec<HistoryItem>,
    },
}

/// Labels and state of the prompt form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    /// Whether the prompt edits an existing image.
    pub editing: bool,
    /// Whether input is disabled.
    pub loading: bool,
}

impl PromptInput {
    /// Creates the prompt form state.
    pub fn new(editing: bool, loading: bool) -> Self {
        Self { editing, loading }
    }

    /// Instruction shown above the input.
    pub fn label(&self) -> &'static str {
        if self.editing {
            "Describe how you want to edit the image"
        } else {
            "Describe the image you want to generate"
        }
    }

    /// Example shown in the empty input.
    pub fn placeholder(&self) -> &'static str {
        if self.editing {
            "Example: Make the background blue and add a rainbow..."
        } else {
            "Example: A 3D rendered image of a pig with wings and a top hat flying over a futuristic city..."
        }
    }

    /// Submit button text.
    pub fn button(&self) -> &'static str {
        match (self.loading, self.editing) {
            (true, _) => "Processing...",
            (false, true) => "Edit Image",
            (false, false) => "Generate Image",
        }
    }

    /// Returns the trimmed prompt, or `None` if it cannot be submitted.
    pub fn accept(&self, text: &str) -> Option<String> {
        let text = text.trim();
        (!self.loading && !text.is_empty()).then(|| text.to_string())
    }
}

/// Everything a front end needs to render the tabs container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabsView {
    /// Open tab.
    pub active_tab: Tab,
    /// True while tab switching is disabled.
    pub tabs_disabled: bool,
    /// Error banner text.
    pub error: Option<String>,
    /// Create tab content.
    pub create: CreatePanel,
    /// Upload tab content.
    pub upload: UploadPanel,
}

impl TabsView {
    /// Derives the view from the session and view-local state.
    pub fn derive(session: &EditorSession, tabs: &TabsState) -> Self {
        let loading = session.is_loading();
        let current_image = session.current_image();
        let history = history_items(session, tabs);

        let create = match (session.generated_image(), loading) {
            (_, true) => CreatePanel::Loading,
            (None, false) => CreatePanel::Input {
                current_image: current_image.clone(),
                prompt: PromptInput::new(current_image.is_some(), false),
            },
            (Some(image), false) => CreatePanel::Result {
                image: image.to_string(),
                description: session.description().map(str::to_string),
                prompt: PromptInput::new(true, false),
                history: history.clone(),
            },
        };

        let upload = match current_image {
            None => UploadPanel::Dropzone,
            Some(current_image) => UploadPanel::Editor {
                current_image,
                prompt: PromptInput::new(true, loading),
                history,
            },
        };

        Self {
            active_tab: tabs.active_tab,
            tabs_disabled: loading,
            error: session.error().map(str::to_string),
            create,
            upload,
        }
    }
}

fn history_items(session: &EditorSession, tabs: &TabsState) -> Vec<HistoryItem> {
    let mut items = Vec::new();
    if session.has_uploaded_image() {
        items.push(HistoryItem::Original);
    }
    items.extend(
        session
            .history()
            .versions()
            .into_iter()
            .map(|v| HistoryItem::Version {
                selected: tabs.selected_version == Some(v.index),
                index: v.index,
                number: v.number,
                prompt: v.prompt,
                thumbnail: v.image,
            }),
    );
    items
}
