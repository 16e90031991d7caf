use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edit_core::{ClusterMode, EditCommand, Editor, EditorConfig};
use pdf_engine::{default_engine, PageDecoder};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::EditorStateStore;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "retext")]
#[command(about = "Edit the text of a PDF page in place")]
pub struct Cli {
    /// Log decisions at debug level to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the editable text lines detected on page 1, in canvas units.
    Lines {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Write the page 1 raster as a PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply a JSON list of edits to page 1 and write the edited PDF.
    Apply {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "EDITS")]
        edits: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Save or load persisted editor state.
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ViewArgs {
    #[arg(long)]
    scale: Option<f64>,
    #[arg(long)]
    viewport_width: Option<f64>,
    /// TOML editor configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    Save {
        #[command(flatten)]
        key: StateKey,
        #[arg(long)]
        title: Option<String>,
        /// JSON document to store.
        #[arg(long)]
        content: Option<String>,
    },
    Load {
        #[command(flatten)]
        key: StateKey,
    },
}

#[derive(Debug, Args)]
struct StateKey {
    #[arg(long)]
    session: String,
    #[arg(long)]
    doc: Option<String>,
    /// Directory holding the state file, instead of the per-user data dir.
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: PageSizeOutput,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f64,
    height: f64,
}

#[derive(Debug, Serialize)]
struct LinesOutput {
    raster: RasterOutput,
    canvas: edit_core::CanvasSize,
    mode: ClusterMode,
    lines: Vec<doc_model::EditableBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RasterOutput {
    width: u32,
    height: u32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Lines { file, view } => run_lines(&file, &view),
        Commands::Render { file, scale, output } => run_render(&file, scale, output.as_deref()),
        Commands::Apply { file, edits, output, view } => run_apply(&file, &edits, &output, &view),
        Commands::State { action } => run_state(action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    let bytes = read_pdf(file)?;

    let info = default_engine().inspect(&bytes).context("failed to open PDF")?;
    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: info.page_count,
        first_page_size_pt: PageSizeOutput {
            width: info.first_page_size.width_pt,
            height: info.first_page_size.height_pt,
        },
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_lines(file: &Path, view: &ViewArgs) -> Result<()> {
    let bytes = read_pdf(file)?;
    let config = editor_config(view)?;

    let mut editor = Editor::new(default_engine(), config);
    let session = editor.load(bytes).context("failed to open PDF")?;
    let (width, height) = session.raster_size();
    let payload = LinesOutput {
        raster: RasterOutput { width, height },
        canvas: session.canvas(),
        mode: session.mode(),
        lines: session.editable_boxes(),
        text_error: session.text_error().map(ToOwned::to_owned),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_render(file: &Path, scale: Option<f64>, output: Option<&Path>) -> Result<()> {
    let bytes = read_pdf(file)?;
    let scale = match scale {
        Some(scale) => scale,
        None => EditorConfig::from_env()?.render_scale,
    };

    let page = default_engine().decode(&bytes, scale).context("failed to open PDF")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    page.raster
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_apply(file: &Path, edits: &Path, output: &Path, view: &ViewArgs) -> Result<()> {
    let bytes = read_pdf(file)?;
    let config = editor_config(view)?;
    let raw = fs::read_to_string(edits)
        .with_context(|| format!("failed to read edits from {}", edits.display()))?;
    let commands: Vec<EditCommand> =
        serde_json::from_str(&raw).context("edits file is not a valid list of edit commands")?;

    let mut editor = Editor::new(default_engine(), config);
    let session = editor.load(bytes).context("failed to open PDF")?;
    for (index, command) in commands.into_iter().enumerate() {
        let id = session
            .apply(command)
            .with_context(|| format!("edit #{} could not be applied", index + 1))?;
        debug!(index, %id, "applied edit");
    }
    let token = session.token();

    let edited = editor.export(token).context("failed to export PDF")?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, edited)
        .with_context(|| format!("failed to write PDF to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_state(action: StateCommand) -> Result<()> {
    match action {
        StateCommand::Save { key, title, content } => {
            let content = match content {
                Some(raw) => serde_json::from_str(&raw).context("--content is not valid JSON")?,
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            let saved = state_store(&key)?.save(
                &key.session,
                key.doc.as_deref(),
                title.as_deref(),
                content,
            )?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        StateCommand::Load { key } => {
            let loaded = state_store(&key)?.load(&key.session, key.doc.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&loaded)?);
        }
    }
    Ok(())
}

fn state_store(key: &StateKey) -> Result<EditorStateStore> {
    match &key.root {
        Some(root) => Ok(EditorStateStore::with_root(root)),
        None => {
            EditorStateStore::from_default_project().context("failed to locate state directory")
        }
    }
}

/// File first, then environment, then flags.
fn editor_config(view: &ViewArgs) -> Result<EditorConfig> {
    let mut config = match &view.config {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?
            .merge_env()?,
        None => EditorConfig::from_env()?,
    };

    if let Some(scale) = view.scale {
        config = config.with_render_scale(scale);
    }
    if let Some(width) = view.viewport_width {
        config = config.with_viewport_width(width);
    }
    config.validate()?;
    Ok(config)
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn default_render_output(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-1.png"))
}
