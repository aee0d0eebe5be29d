//! Decode CLI - Design to Code from the command line
//!
//! Commands: optimize, placeholders, texts, render, preview, export,
//! history, generate. JSON goes to stdout, logs to stderr.
//! Returns non-zero on failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use decode_core::history::JsonFileBackend;
use decode_core::preview::{export_bundle, preview_document, slugify};
use decode_core::validation::{UploadInput, Validator};
use decode_core::{
    list_placeholders, list_text_fragments, Artifact, HttpGenerator, ImageOptimizer, Overrides,
    PersistentHistory, Renderer, Session, StudioConfig, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "decode-cli")]
#[command(about = "Decode CLI - Design to Code", version = ENGINE_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON config file
    #[arg(short, long, default_value = "decode.config.json", global = true)]
    config: PathBuf,

    /// History file (overrides the config)
    #[arg(long, global = true)]
    history: Option<PathBuf>,
}

#[derive(clap::Args)]
struct OverrideArgs {
    /// JSON file with {"assets": {...}, "text": {...}}
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Asset override TOKEN=URL (repeatable)
    #[arg(long = "asset", value_parser = parse_pair)]
    assets: Vec<(String, String)>,

    /// Text override ORIGINAL=REPLACEMENT (repeatable)
    #[arg(long = "text", value_parser = parse_pair)]
    texts: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Shrink an image into a generator payload
    Optimize {
        /// Design file (PNG, JPG, WEBP, PSD)
        input: PathBuf,

        /// Write the JPEG payload here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List image placeholders in markup
    Placeholders {
        /// Artifact JSON or raw markup file
        artifact: PathBuf,
    },

    /// List editable text fragments in markup
    Texts {
        /// Artifact JSON or raw markup file
        artifact: PathBuf,
    },

    /// Apply overrides and print the final markup
    Render {
        artifact: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Write a standalone preview page
    Preview {
        artifact: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[arg(long, default_value = "Inter")]
        font: String,
        #[arg(short, long, default_value = "preview.html")]
        out: PathBuf,
    },

    /// Write html/css/js files
    Export {
        artifact: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[arg(long, default_value = "Inter")]
        font: String,
        #[arg(long, default_value = "section")]
        name: String,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Inspect or edit saved history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Generate code from a design image and save it to history
    Generate {
        /// Design image; optional when refining a saved entry
        input: Option<PathBuf>,

        #[arg(short, long, default_value = "")]
        guidance: String,

        /// Section name
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        font: Option<String>,

        /// Refine this history entry in place
        #[arg(long)]
        edit: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List entries, newest first
    List,
    /// Print one entry
    Show { id: String },
    /// Delete one entry
    Delete { id: String },
}

#[derive(Serialize)]
struct EntrySummary<'a> {
    id: &'a str,
    name: &'a str,
    timestamp: i64,
    font_family: &'a str,
    fingerprint: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let cli = Cli::parse();

    let mut config = match StudioConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => return fail(format!("Failed to load config: {}", e)),
    };
    if let Some(path) = cli.history {
        config.history.path = path;
    }

    match cli.command {
        Commands::Optimize { input, out } => {
            let bytes = match fs::read(&input) {
                Ok(b) => b,
                Err(e) => return fail(format!("Failed to read {}: {}", input.display(), e)),
            };
            let upload = UploadInput::from_bytes(input.file_name().and_then(|n| n.to_str()), &bytes);
            let validation = Validator::<UploadInput>::for_uploads(&config.upload).validate(&upload);
            if !validation.valid {
                return emit_with_code(&serde_json::json!({ "success": false, "validation": validation }), 2);
            }

            match ImageOptimizer::new(config.optimizer).optimize(&bytes) {
                Ok(payload) => {
                    if let Some(out) = out {
                        if let Err(e) = fs::write(&out, &payload.bytes) {
                            return fail(format!("Failed to write {}: {}", out.display(), e));
                        }
                    }
                    emit(&serde_json::json!({ "success": true, "payload": payload }))
                }
                Err(e) => fail(e.to_string()),
            }
        }

        Commands::Placeholders { artifact } => match read_artifact(&artifact) {
            Ok(a) => emit(&list_placeholders(&a.markup)),
            Err(e) => fail(e),
        },

        Commands::Texts { artifact } => match read_artifact(&artifact) {
            Ok(a) => emit(&list_text_fragments(&a.markup)),
            Err(e) => fail(e),
        },

        Commands::Render { artifact, overrides } => {
            let (artifact, overrides) = match load_inputs(&artifact, &overrides) {
                Ok(v) => v,
                Err(e) => return fail(e),
            };
            let html = Renderer::new(config.placeholder).render_with(&artifact.markup, &overrides);
            emit(&serde_json::json!({ "html": html }))
        }

        Commands::Preview { artifact, overrides, font, out } => {
            let (artifact, overrides) = match load_inputs(&artifact, &overrides) {
                Ok(v) => v,
                Err(e) => return fail(e),
            };
            let rendered = Renderer::new(config.placeholder).render_with(&artifact.markup, &overrides);
            let page = preview_document(&artifact, &rendered, &font);
            if let Err(e) = fs::write(&out, page) {
                return fail(format!("Failed to write {}: {}", out.display(), e));
            }
            emit(&serde_json::json!({ "success": true, "path": out }))
        }

        Commands::Export { artifact, overrides, font, name, out_dir } => {
            let (artifact, overrides) = match load_inputs(&artifact, &overrides) {
                Ok(v) => v,
                Err(e) => return fail(e),
            };
            let rendered = Renderer::new(config.placeholder).render_with(&artifact.markup, &overrides);
            let bundle = export_bundle(&artifact, &rendered, &font, &slugify(&name));
            if let Err(e) = fs::create_dir_all(&out_dir) {
                return fail(format!("Failed to create {}: {}", out_dir.display(), e));
            }
            for file in &bundle.files {
                let path = out_dir.join(&file.filename);
                if let Err(e) = fs::write(&path, &file.content) {
                    return fail(format!("Failed to write {}: {}", path.display(), e));
                }
            }
            let files: Vec<_> = bundle
                .files
                .iter()
                .map(|f| serde_json::json!({ "filename": f.filename, "hash": f.hash }))
                .collect();
            emit(&serde_json::json!({ "success": true, "files": files }))
        }

        Commands::History { action } => {
            let mut history = match open_history(&config) {
                Ok(h) => h,
                Err(e) => return fail(e),
            };
            match action {
                HistoryAction::List => {
                    let entries: Vec<_> = history.all().iter().map(summary).collect();
                    emit(&entries)
                }
                HistoryAction::Show { id } => match history.get(&id) {
                    Some(entry) => emit(entry),
                    None => fail(format!("History entry not found: {}", id)),
                },
                HistoryAction::Delete { id } => match history.remove(&id) {
                    Ok(remaining) => emit(&serde_json::json!({ "success": true, "remaining": remaining.len() })),
                    Err(e) => fail(e.to_string()),
                },
            }
        }

        Commands::Generate { input, guidance, name, font, edit } => {
            let history = match open_history(&config) {
                Ok(h) => h,
                Err(e) => return fail(e),
            };
            let generator = match HttpGenerator::from_env(config.generation.clone()) {
                Ok(g) => g,
                Err(e) => return fail(e.to_string()),
            };
            let mut session = Session::new(&config, generator, history);

            if let Some(id) = &edit {
                if let Err(e) = session.load(id) {
                    return fail(e.to_string());
                }
            }
            if let Some(input) = &input {
                let bytes = match fs::read(input) {
                    Ok(b) => b,
                    Err(e) => return fail(format!("Failed to read {}: {}", input.display(), e)),
                };
                if let Err(e) = session.attach_image(input.file_name().and_then(|n| n.to_str()), bytes) {
                    return fail(e.to_string());
                }
            }
            if let Some(name) = name {
                session.set_section_name(name);
            }
            if let Some(font) = font {
                session.set_typography(font);
            }
            session.set_guidance(guidance);

            match session.generate(edit.is_some()) {
                Ok(entry) => emit(&serde_json::json!({ "success": true, "entry": summary(entry) })),
                Err(e) => emit_with_code(&serde_json::json!({ "success": false, "error": e.to_string() }), 2),
            }
        }
    }
}

fn summary(entry: &decode_core::HistoryEntry) -> EntrySummary<'_> {
    EntrySummary {
        id: &entry.id,
        name: &entry.display_name,
        timestamp: entry.created_at_millis,
        font_family: &entry.typography,
        fingerprint: entry.artifact.fingerprint().unwrap_or_default(),
    }
}

fn open_history(config: &StudioConfig) -> Result<PersistentHistory, String> {
    let backend = JsonFileBackend::new(&config.history.path);
    PersistentHistory::open(Box::new(backend), config.history.capacity).map_err(|e| e.to_string())
}

/// Artifact JSON (`.json`) or a raw markup file
fn read_artifact(path: &Path) -> Result<Artifact, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content).map_err(|e| format!("Invalid artifact: {}", e))
    } else {
        Ok(Artifact::new(content, "", ""))
    }
}

fn load_inputs(path: &Path, args: &OverrideArgs) -> Result<(Artifact, Overrides), String> {
    let artifact = read_artifact(path)?;
    let mut overrides = match &args.overrides {
        Some(file) => {
            let content = fs::read_to_string(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
            serde_json::from_str(&content).map_err(|e| format!("Invalid overrides: {}", e))?
        }
        None => Overrides::new(),
    };
    for (token, url) in &args.assets {
        overrides.set_asset(token, url.clone());
    }
    for (original, replacement) in &args.texts {
        overrides.set_text(original, replacement.clone());
    }
    Ok((artifact, overrides))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn emit(value: &impl Serialize) -> ExitCode {
    emit_with_code(value, 0)
}

fn emit_with_code(value: &impl Serialize, code: u8) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::from(code)
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn fail(message: impl Into<String>) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message.into() });
    println!("{}", output);
    ExitCode::FAILURE
}
