//! CLI for GenEdit - iterative image editing with Gemini.

use clap::{Args, Parser, Subcommand};
use genedit::image::{upload::load_upload_with_limit, ImageEditorExt};
use genedit::view::{CreatePanel, HistoryItem, UploadPanel};
use genedit::{
    EditRequest, EditorConfig, EditorSession, GeminiEditor, ImageData, ImageEditor, Tab, TabsState,
    TabsView,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genedit")]
#[command(about = "Create and iteratively edit images with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Gemini model id
    #[arg(long, global = true, env = "GENEDIT_MODEL")]
    model: Option<String>,

    /// Retries for rate limits and network errors
    #[arg(long, global = true, default_value_t = 0)]
    retries: u32,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or edit a single image
    Edit(EditArgs),

    /// Start an interactive editing session
    Session(SessionArgs),

    /// Run as a JSON-RPC server on stdio (for agents and GUIs)
    Serve,
}

#[derive(Args)]
struct EditArgs {
    /// The text prompt
    prompt: String,

    /// Image to edit (.png, .jpg, .jpeg; max 10MB)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file path (default: gemini-image-<millis>.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SessionArgs {
    /// Starting image
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for saved images
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = EditorConfig::builder()
        .max_retries(cli.retries)
        .timeout(Duration::from_secs(cli.timeout));
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Commands::Session(ref args) = cli.command {
        builder = builder.output_dir(&args.output_dir);
    }
    let config = builder.build();

    match cli.command {
        Commands::Edit(args) => edit_once(args, &config).await?,
        Commands::Session(args) => run_session(args, &config).await?,
        Commands::Serve => run_server(config).await?,
    }

    Ok(())
}

async fn edit_once(args: EditArgs, config: &EditorConfig) -> anyhow::Result<()> {
    let editor = config.gemini_editor()?;

    let mut request = EditRequest::new(args.prompt.trim());
    if request.prompt.is_empty() {
        anyhow::bail!("prompt must not be empty");
    }
    if let Some(ref input) = args.input {
        let upload = load_upload_with_limit(input, config.max_upload_bytes)?;
        request = request.with_image(upload.image.to_data_url());
    }

    let response = editor
        .edit_with_retries(&request, config.max_retries)
        .await?;
    let image = response.image_data()?;
    let output = args
        .output
        .unwrap_or_else(|| config.download_path(image.format));
    image.save(&output)?;

    if args.json {
        let result = serde_json::json!({
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": image.size(),
            "format": image.format.extension(),
            "description": response.description,
            "model": response.metadata.model,
            "duration_ms": response.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Saved image: {} ({})",
            output.display(),
            genedit::image::format_file_size(image.size() as u64)
        );
        if let Some(ref description) = response.description {
            println!("{}", description);
        }
        if let Some(duration) = response.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

async fn run_server(config: EditorConfig) -> anyhow::Result<()> {
    tracing::info!("starting JSON-RPC server on stdio");
    let editor: Arc<dyn ImageEditor> = Arc::new(config.gemini_editor()?);
    let mut server = genedit::server::EditorServer::new(editor, config);
    server.run().await?;
    Ok(())
}

const SESSION_HELP: &str = "\
Commands:
  upload <path>      use a .png/.jpg/.jpeg file as the starting image
  clear              remove the uploaded image
  prompt <text>      generate or edit (bare text works too)
  versions           list generated versions
  select <n>         highlight version n (as numbered in `versions`)
  tab <create|upload>
  show               show the current view
  save [path]        save the selected version, or the latest image
  reset              start over
  help               show this help
  quit               exit";

async fn run_session(args: SessionArgs, config: &EditorConfig) -> anyhow::Result<()> {
    let editor = config.gemini_editor()?;
    let mut session = EditorSession::new();
    let mut tabs = TabsState::new();

    if let Some(ref input) = args.input {
        let upload = load_upload_with_limit(input, config.max_upload_bytes)?;
        println!("Loaded {} ({})", upload.name, upload.display_size());
        session.select_image(Some(upload.image));
    }

    println!("{SESSION_HELP}\n");
    print_view(&session, &tabs);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line, ""));

        let result = match command {
            "quit" | "exit" => break,
            "help" => {
                println!("{SESSION_HELP}");
                Ok(())
            }
            "upload" => load_upload_with_limit(rest, config.max_upload_bytes)
                .map(|upload| {
                    println!("Loaded {} ({})", upload.name, upload.display_size());
                    session.select_image(Some(upload.image));
                    print_view(&session, &tabs);
                })
                .map_err(Into::into),
            "clear" => {
                session.select_image(None);
                print_view(&session, &tabs);
                Ok(())
            }
            "versions" => {
                print_versions(&session, &tabs);
                Ok(())
            }
            "select" => select_by_number(&session, &mut tabs, rest),
            "tab" => rest
                .parse::<Tab>()
                .and_then(|tab| tabs.set_active_tab(&session, tab))
                .map(|()| print_view(&session, &tabs))
                .map_err(Into::into),
            "show" => {
                print_view(&session, &tabs);
                Ok(())
            }
            "save" => save_image(&session, &tabs, config, rest),
            "reset" => {
                session.reset();
                tabs.reset();
                println!("Session cleared.");
                Ok(())
            }
            "prompt" => submit(&mut session, &tabs, &editor, rest, config.max_retries).await,
            _ => submit(&mut session, &tabs, &editor, line, config.max_retries).await,
        };

        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }

    Ok(())
}

async fn submit(
    session: &mut EditorSession,
    tabs: &TabsState,
    editor: &GeminiEditor,
    prompt: &str,
    max_retries: u32,
) -> anyhow::Result<()> {
    println!("Processing...");
    session.submit_prompt(editor, prompt, max_retries).await?;
    print_view(session, tabs);
    Ok(())
}

fn select_by_number(
    session: &EditorSession,
    tabs: &mut TabsState,
    arg: &str,
) -> anyhow::Result<()> {
    let number: usize = arg.parse()?;
    let count = session.history().version_count();
    if number == 0 || number > count {
        anyhow::bail!("no version {number} ({count} available)");
    }
    // Version numbers count down from the oldest.
    let version = tabs.select_version(session, count - number)?;
    println!("Selected version {}: {}", version.number, version.prompt);
    Ok(())
}

fn save_image(
    session: &EditorSession,
    tabs: &TabsState,
    config: &EditorConfig,
    path: &str,
) -> anyhow::Result<()> {
    let url = tabs
        .selected_version_image(session)
        .ok_or_else(|| anyhow::anyhow!("no generated image to save"))?;
    let image = ImageData::from_data_url(&url)?;
    let path = if path.is_empty() {
        config.download_path(image.format)
    } else {
        PathBuf::from(path)
    };
    image.save(&path)?;
    println!(
        "Saved {} ({})",
        path.display(),
        genedit::image::format_file_size(image.size() as u64)
    );
    Ok(())
}

fn print_versions(session: &EditorSession, tabs: &TabsState) {
    let view = TabsView::derive(session, tabs);
    let items = match view.create {
        CreatePanel::Result { history, .. } => history,
        _ => match view.upload {
            UploadPanel::Editor { history, .. } => history,
            UploadPanel::Dropzone => Vec::new(),
        },
    };
    if items.is_empty() {
        println!("No versions yet.");
        return;
    }
    for item in items {
        match item {
            HistoryItem::Original => println!("  Original      Original image"),
            HistoryItem::Version {
                ref prompt,
                selected,
                ..
            } => {
                let marker = if selected { "✓" } else { " " };
                println!("{} {:<12} {}", marker, item.label(), prompt);
            }
        }
    }
}

fn print_view(session: &EditorSession, tabs: &TabsState) {
    let view = TabsView::derive(session, tabs);
    println!("[{}]", view.active_tab);
    if let Some(ref error) = view.error {
        println!("! {}", error);
    }

    match (view.active_tab, &view.create, &view.upload) {
        (Tab::Create, CreatePanel::Input { prompt, .. }, _) => {
            println!("{}", prompt.label());
            println!("  {}", prompt.placeholder());
        }
        (Tab::Create, CreatePanel::Loading, _) => println!("Processing..."),
        (
            Tab::Create,
            CreatePanel::Result {
                image,
                description,
                history,
                ..
            },
            _,
        ) => {
            println!("Latest image: {}", summarize(image));
            if let Some(description) = description {
                println!("{}", description);
            }
            println!("{} entries in edit history", history.len());
        }
        (Tab::Upload, _, UploadPanel::Dropzone) => {
            println!("Upload an image to edit or use as a reference (`upload <path>`).");
            println!("Maximum file size: 10MB");
        }
        (Tab::Upload, _, UploadPanel::Editor { current_image, prompt, .. }) => {
            println!("Editing: {}", summarize(current_image));
            println!("{}", prompt.label());
        }
    }
}

fn summarize(data_url: &str) -> String {
    match ImageData::from_data_url(data_url) {
        Ok(image) => format!(
            "{} image, {}",
            image.format.extension(),
            genedit::image::format_file_size(image.size() as u64)
        ),
        Err(_) => "unreadable image".to_string(),
    }
}
