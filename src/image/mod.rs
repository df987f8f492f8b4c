//! Image payloads, uploads and the editor backends.

mod provider;
pub mod providers;
mod types;
pub mod upload;

pub use provider::{EditorKind, ImageEditor, ImageEditorExt};
pub use types::{EditMetadata, EditRequest, EditResponse, ImageData, ImageFormat};
pub(crate) use types::decode_base64_lenient;
pub use upload::{format_file_size, load_upload, validate_upload, Upload, MAX_UPLOAD_BYTES};
