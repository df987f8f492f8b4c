//! JSON-RPC server over stdio.
//!
//! Speaks line-delimited JSON-RPC 2.0 with the MCP tool-call framing, so an
//! agent or a thin GUI can drive an editing session. `edit_image` is a
//! stateless proxy of the model call; the other tools operate on one
//! in-memory session.

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::history::History;
use crate::image::upload::{load_upload_with_limit, validate_upload};
use crate::image::{decode_base64_lenient, EditRequest, ImageData, ImageEditor, ImageEditorExt};
use crate::session::EditorSession;
use crate::view::{TabsState, TabsView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// Validates that an output path is safe to write to.
///
/// Rejects paths containing directory traversal (`..`) components.
fn validate_output_path(path: &str) -> std::result::Result<(), String> {
    let path = std::path::Path::new(path);
    for component in path.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err("Path must not contain '..' components".into());
        }
    }
    Ok(())
}

/// Accepts either a data URL or bare base64 and returns a data URL.
fn normalize_image(input: &str) -> crate::Result<String> {
    if input.trim_start().starts_with("data:") {
        return ImageData::from_data_url(input).map(|i| i.to_data_url());
    }
    let data = decode_base64_lenient(input)?;
    Ok(ImageData::from_bytes(data)?.to_data_url())
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Wraps a JSON payload as MCP text content.
    fn content(id: Value, payload: &Value) -> Self {
        let content = json!([{
            "type": "text",
            "text": serde_json::to_string_pretty(payload).unwrap_or_default()
        }]);
        Self::success(id, json!({ "content": content }))
    }
}

/// MCP tool definition.
#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct EditImageParams {
    prompt: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    history: Option<History>,
}

#[derive(Debug, Deserialize)]
struct SelectImageParams {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitPromptParams {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct SelectVersionParams {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct SetTabParams {
    tab: String,
}

#[derive(Debug, Deserialize)]
struct SaveImageParams {
    #[serde(default)]
    path: Option<String>,
}

/// JSON-RPC server owning one editing session.
pub struct EditorServer {
    initialized: bool,
    editor: Arc<dyn ImageEditor>,
    config: EditorConfig,
    session: EditorSession,
    tabs: TabsState,
}

impl EditorServer {
    /// Creates a server that sends prompts through `editor`.
    pub fn new(editor: Arc<dyn ImageEditor>, config: EditorConfig) -> Self {
        Self {
            initialized: false,
            editor,
            config,
            session: EditorSession::new(),
            tabs: TabsState::new(),
        }
    }

    /// True once a client sent `initialize`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Runs the server on stdin/stdout until stdin closes.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serves requests read line by line from `reader`.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(resp) = self.handle_message(&line).await {
                let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
                    json!({"jsonrpc": "2.0", "id": null, "error": {"code": INTERNAL_ERROR, "message": e.to_string()}}).to_string()
                });
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, "request received");

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id, &request.params)),
            "initialized" | "notifications/initialized" => None,
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, &request.params).await),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    fn handle_initialize(&mut self, id: Value, params: &Value) -> JsonRpcResponse {
        self.initialized = true;

        if let Some(client_info) = params.get("clientInfo") {
            tracing::info!(
                client = client_info
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown"),
                version = client_info
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown"),
                "client connected"
            );
        }

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "genedit",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let tools = vec![
            Tool {
                name: "edit_image",
                description: "Generate or edit an image in one call. Pass the previous turns as history to keep conversational context.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {"type": "string", "description": "Text instruction"},
                        "image": {"type": "string", "description": "Image to edit, as a data URL or base64"},
                        "history": {
                            "type": "array",
                            "description": "Previous turns: [{role: user|model, parts: [{text?, image?}]}]"
                        }
                    },
                    "required": ["prompt"]
                }),
            },
            Tool {
                name: "select_image",
                description: "Upload the starting image of the session (PNG or JPEG, max 10MB). Call without arguments to remove it.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path of a .png/.jpg/.jpeg file"},
                        "image": {"type": "string", "description": "Image as a data URL"}
                    }
                }),
            },
            Tool {
                name: "submit_prompt",
                description: "Generate a new image, or edit the current one, and record the exchange in the session history.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {"type": "string", "description": "Text instruction"}
                    },
                    "required": ["prompt"]
                }),
            },
            Tool {
                name: "select_version",
                description: "Highlight a generated version by its index (0 = oldest).",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "index": {"type": "integer", "minimum": 0}
                    },
                    "required": ["index"]
                }),
            },
            Tool {
                name: "set_tab",
                description: "Switch between the create and upload tabs.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "tab": {"type": "string", "enum": ["create", "upload"]}
                    },
                    "required": ["tab"]
                }),
            },
            Tool {
                name: "get_state",
                description: "Return the session state and the derived tab view.",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Tool {
                name: "save_image",
                description: "Save the selected version (or the latest image) to disk.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Output path (default: gemini-image-<millis>.<ext>)"}
                    }
                }),
            },
            Tool {
                name: "reset",
                description: "Discard the session and start over.",
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ];

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&mut self, id: Value, params: &Value) -> JsonRpcResponse {
        let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match tool_name {
            "edit_image" => self.edit_image(id, arguments).await,
            "select_image" => self.select_image(id, arguments),
            "submit_prompt" => self.submit_prompt(id, arguments).await,
            "select_version" => self.select_version(id, arguments),
            "set_tab" => self.set_tab(id, arguments),
            "get_state" => JsonRpcResponse::content(id, &self.state()),
            "save_image" => self.save_image(id, arguments),
            "reset" => {
                self.session.reset();
                self.tabs.reset();
                JsonRpcResponse::content(id, &self.state())
            }
            _ => JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", tool_name)),
        }
    }

    fn state(&self) -> Value {
        json!({
            "session": self.session.snapshot(),
            "view": TabsView::derive(&self.session, &self.tabs),
            "selectedVersion": self.tabs.selected_version(),
        })
    }

    async fn edit_image(&self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: EditImageParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        let prompt = params.prompt.trim();
        if prompt.is_empty() {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Prompt is required");
        }

        let mut request = EditRequest::new(prompt);
        if let Some(ref image) = params.image {
            match normalize_image(image) {
                Ok(url) => request = request.with_image(url),
                Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
            }
        }
        if let Some(history) = params.history {
            match History::from_entries(history.entries().to_vec()) {
                Ok(history) => request = request.with_history(history.entries().to_vec()),
                Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
            }
        }

        match self
            .editor
            .edit_with_retries(&request, self.config.max_retries)
            .await
        {
            Ok(resp) if resp.image.is_some() => JsonRpcResponse::content(
                id,
                &json!({
                    "image": resp.image,
                    "description": resp.description,
                    "model": resp.metadata.model,
                    "duration_ms": resp.metadata.duration_ms,
                }),
            ),
            Ok(_) => JsonRpcResponse::error(id, INTERNAL_ERROR, EditorError::NoImage.to_string()),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn select_image(&mut self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: SelectImageParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        let image = match (params.path, params.image.filter(|s| !s.is_empty())) {
            (Some(path), _) => {
                match load_upload_with_limit(&path, self.config.max_upload_bytes) {
                    Ok(upload) => Some(upload.image),
                    Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                }
            }
            (None, Some(url)) => {
                let checked = ImageData::from_data_url(&url).and_then(|image| {
                    validate_upload("image", &image, self.config.max_upload_bytes)?;
                    Ok(image)
                });
                match checked {
                    Ok(image) => Some(image),
                    Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                }
            }
            (None, None) => None,
        };

        self.session.select_image(image);
        JsonRpcResponse::content(id, &self.state())
    }

    async fn submit_prompt(&mut self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: SubmitPromptParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        let result = self
            .session
            .submit_prompt(self.editor.as_ref(), &params.prompt, self.config.max_retries)
            .await;
        if let Err(e) = result {
            return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string());
        }

        JsonRpcResponse::content(id, &self.state())
    }

    fn select_version(&mut self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: SelectVersionParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        match self.tabs.select_version(&self.session, params.index) {
            Ok(version) => JsonRpcResponse::content(id, &json!({ "version": version })),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    fn set_tab(&mut self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: SetTabParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        let result = params
            .tab
            .parse()
            .and_then(|tab| self.tabs.set_active_tab(&self.session, tab));
        match result {
            Ok(()) => JsonRpcResponse::content(id, &self.state()),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    fn save_image(&self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: SaveImageParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid parameters: {}", e));
            }
        };

        if let Some(path) = &params.path {
            if let Err(msg) = validate_output_path(path) {
                return JsonRpcResponse::error(id, INVALID_PARAMS, msg);
            }
        }

        let Some(url) = self.tabs.selected_version_image(&self.session) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "No generated image to save");
        };
        let image = match ImageData::from_data_url(&url) {
            Ok(image) => image,
            Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        };

        let path = params
            .path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.download_path(image.format));
        if let Err(e) = image.save(&path) {
            return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string());
        }

        JsonRpcResponse::content(
            id,
            &json!({
                "output": path.display().to_string(),
                "size_bytes": image.size(),
                "format": image.format.extension(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::ScriptedEditor;
    use base64::Engine;

    const PNG: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn png_url() -> String {
        ImageData::new(PNG.to_vec(), crate::image::ImageFormat::Png).to_data_url()
    }

    fn make_server(editor: ScriptedEditor) -> (EditorServer, Arc<ScriptedEditor>) {
        let editor = Arc::new(editor);
        let server = EditorServer::new(editor.clone(), EditorConfig::default());
        (server, editor)
    }

    fn call(name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
        .to_string()
    }

    fn payload(resp: &JsonRpcResponse) -> Value {
        let result = resp.result.as_ref().expect("expected a result");
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();

        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "genedit");
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));

        let resp = server.handle_message("not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);

        let resp = server
            .handle_message(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);

        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"nope"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);

        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (server, _) = make_server(ScriptedEditor::new(vec![]));
        let resp = server.handle_tools_list(json!(1));
        let result = resp.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"edit_image"));
        assert!(names.contains(&"submit_prompt"));
        assert!(names.contains(&"reset"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let resp = server.handle_message(&call("draw", json!({}))).await.unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_edit_image_proxies_request() {
        let (mut server, editor) = make_server(ScriptedEditor::new(vec![ScriptedEditor::image(
            "data:image/png;base64,AAAA",
            Some("A cat."),
        )]));

        let raw_b64 = base64::engine::general_purpose::STANDARD.encode(PNG);
        let history = json!([
            {"role": "user", "parts": [{"text": "a cat"}]},
            {"role": "model", "parts": [{"image": png_url()}]}
        ]);
        let resp = server
            .handle_message(&call(
                "edit_image",
                json!({"prompt": "add a hat", "image": raw_b64, "history": history}),
            ))
            .await
            .unwrap();

        let body = payload(&resp);
        assert_eq!(body["image"], "data:image/png;base64,AAAA");
        assert_eq!(body["description"], "A cat.");

        let requests = editor.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "add a hat");
        assert_eq!(requests[0].image.as_deref(), Some(png_url().as_str()));
        assert_eq!(requests[0].history.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_edit_image_rejects_broken_history() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let history = json!([{"role": "model", "parts": [{"text": "hi"}]}]);
        let resp = server
            .handle_message(&call("edit_image", json!({"prompt": "x", "history": history})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_edit_image_rejects_history_ending_on_user_turn() {
        let (mut server, editor) = make_server(ScriptedEditor::new(vec![]));
        let history = json!([{"role": "user", "parts": [{"text": "a cat"}]}]);
        let resp = server
            .handle_message(&call("edit_image", json!({"prompt": "x", "history": history})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
        assert!(editor.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_image_without_image_in_answer() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![Ok(Default::default())]));
        let resp = server
            .handle_message(&call("edit_image", json!({"prompt": "a cat"})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().message, "No image returned from API");
    }

    #[tokio::test]
    async fn test_session_flow() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![
            ScriptedEditor::image("data:v1", Some("A cat.")),
            ScriptedEditor::image("data:v2", None),
        ]));

        server
            .handle_message(&call("select_image", json!({"image": png_url()})))
            .await
            .unwrap();
        server
            .handle_message(&call("submit_prompt", json!({"prompt": "a cat"})))
            .await
            .unwrap();
        let resp = server
            .handle_message(&call("submit_prompt", json!({"prompt": "add a hat"})))
            .await
            .unwrap();

        let state = payload(&resp);
        assert_eq!(state["session"]["generatedImage"], "data:v2");
        assert_eq!(state["session"]["history"].as_array().unwrap().len(), 4);
        assert_eq!(state["view"]["create"]["kind"], "result");
        let items = state["view"]["create"]["history"].as_array().unwrap();
        assert_eq!(items[0]["kind"], "original");
        assert_eq!(items[1]["number"], 2);

        let resp = server
            .handle_message(&call("select_version", json!({"index": 0})))
            .await
            .unwrap();
        assert_eq!(payload(&resp)["version"]["prompt"], "a cat");

        let resp = server
            .handle_message(&call("select_version", json!({"index": 5})))
            .await
            .unwrap();
        assert!(resp.error.is_some());

        let resp = server.handle_message(&call("reset", json!({}))).await.unwrap();
        let state = payload(&resp);
        assert!(state["session"]["generatedImage"].is_null());
        assert!(state["selectedVersion"].is_null());
    }

    #[tokio::test]
    async fn test_select_image_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.png");
        std::fs::write(&path, PNG).unwrap();
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));

        let resp = server
            .handle_message(&call("select_image", json!({"path": path})))
            .await
            .unwrap();
        let state = payload(&resp);
        assert_eq!(state["session"]["image"], png_url());
        assert_eq!(state["view"]["upload"]["kind"], "editor");

        let resp = server
            .handle_message(&call("select_image", json!({"path": dir.path().join("a.gif")})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = server.handle_message(&call("select_image", json!({}))).await.unwrap();
        assert!(payload(&resp)["session"]["image"].is_null());
    }

    #[tokio::test]
    async fn test_select_image_data_url_follows_upload_rules() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));

        let webp = ImageData::new(
            b"RIFF\x00\x00\x00\x00WEBP".to_vec(),
            crate::image::ImageFormat::WebP,
        );
        let resp = server
            .handle_message(&call("select_image", json!({"image": webp.to_data_url()})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let mut big = vec![0u8; 11 * 1024 * 1024];
        big[..8].copy_from_slice(&PNG[..8]);
        let big = ImageData::new(big, crate::image::ImageFormat::Png);
        let resp = server
            .handle_message(&call("select_image", json!({"image": big.to_data_url()})))
            .await
            .unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.contains("maximum file size is 10 MB"));

        let resp = server.handle_message(&call("get_state", json!({}))).await.unwrap();
        assert!(payload(&resp)["session"]["image"].is_null());
    }

    #[tokio::test]
    async fn test_submit_failure_is_reported_in_state() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![Err(
            EditorError::ContentBlocked("unsafe".into()),
        )]));
        let resp = server
            .handle_message(&call("submit_prompt", json!({"prompt": "a cat"})))
            .await
            .unwrap();
        let state = payload(&resp);
        assert_eq!(state["session"]["error"], "content blocked: unsafe");
        assert_eq!(state["view"]["error"], "content blocked: unsafe");
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let resp = server
            .handle_message(&call("submit_prompt", json!({"prompt": "  "})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_set_tab() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let resp = server
            .handle_message(&call("set_tab", json!({"tab": "upload"})))
            .await
            .unwrap();
        assert_eq!(payload(&resp)["view"]["activeTab"], "upload");

        let resp = server
            .handle_message(&call("set_tab", json!({"tab": "settings"})))
            .await
            .unwrap();
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_save_image() {
        let dir = tempfile::tempdir().unwrap();
        let (mut server, _) =
            make_server(ScriptedEditor::new(vec![ScriptedEditor::image(&png_url(), None)]));
        server.config = EditorConfig::builder().output_dir(dir.path()).build();

        let resp = server.handle_message(&call("save_image", json!({}))).await.unwrap();
        assert!(resp.error.is_some());

        let resp = server
            .handle_message(&call("save_image", json!({"path": 5})))
            .await
            .unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.starts_with("Invalid parameters"));

        server
            .handle_message(&call("submit_prompt", json!({"prompt": "a square"})))
            .await
            .unwrap();

        let resp = server
            .handle_message(&call("save_image", json!({"path": "../escape.png"})))
            .await
            .unwrap();
        assert!(resp.error.is_some());

        let resp = server.handle_message(&call("save_image", json!({}))).await.unwrap();
        let out = payload(&resp);
        let path = PathBuf::from(out["output"].as_str().unwrap());
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(path).unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_response() {
        let (mut server, _) = make_server(ScriptedEditor::new(vec![]));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(r#""id":2"#));
    }

    #[test]
    fn test_validate_output_path() {
        assert!(validate_output_path("../../etc/passwd").is_err());
        assert!(validate_output_path("out/image.png").is_ok());
        assert!(validate_output_path("/tmp/image.png").is_ok());
    }

    #[test]
    fn test_normalize_image() {
        assert_eq!(normalize_image(&png_url()).unwrap(), png_url());
        assert!(normalize_image("not base64 !!").is_err());
    }
}
