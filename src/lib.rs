#![warn(missing_docs)]
//! GenEdit - create and iteratively edit images with Gemini.
//!
//! The crate keeps the whole editing session client-side: an uploaded
//! starting image, the latest generated image and its description, and a
//! user/model conversation history whose model turns are the *versions* of
//! the image. Each prompt is sent together with the current image and the
//! history, so the model can refine its previous output.
//!
//! # Quick Start
//!
//! ```no_run
//! use genedit::{EditorSession, GeminiEditor};
//!
//! #[tokio::main]
//! async fn main() -> genedit::Result<()> {
//!     let editor = GeminiEditor::builder().build()?;
//!     let mut session = EditorSession::new();
//!
//!     session.submit_prompt(&editor, "A pig with wings and a top hat", 0).await?;
//!     session.submit_prompt(&editor, "Make the background blue", 0).await?;
//!
//!     for version in session.history().versions() {
//!         println!("Version {}: {}", version.number, version.prompt);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google) image editing backend
//! - `cli`: Command-line interface (`genedit`)

pub mod config;
mod error;
pub mod history;
pub mod image;
pub mod server;
pub mod session;
pub mod view;

// Re-export error types at crate root
pub use error::{EditorError, Result};

pub use config::EditorConfig;
pub use history::{History, HistoryEntry, HistoryPart, Role, Version};
pub use image::{
    EditRequest, EditResponse, EditorKind, ImageData, ImageEditor, ImageEditorExt, ImageFormat,
};
pub use session::{EditorSession, SessionSnapshot};
pub use view::{Tab, TabsState, TabsView};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiEditor, GeminiEditorBuilder, GeminiModel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{EditorError, Result};
    pub use crate::history::{History, HistoryEntry, Version};
    pub use crate::image::{EditRequest, EditResponse, ImageData, ImageEditor, ImageEditorExt};
    pub use crate::session::EditorSession;
    pub use crate::view::{TabsState, TabsView};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiEditor;
}
