//! Sidenotes - margin note layout for markdown files.
//!
//! # Usage
//!
//! ```bash
//! sidenotes notes.md
//! sidenotes --width 1500 --side right --json notes.md
//! sidenotes --edit 0 --text "revised" notes.md
//! sidenotes --watch notes.md
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use sidenotes::config::{
    AnchorMode, AnnotationFormat, MarginSide, Settings, clear_settings, global_config_path,
    load_layered, local_override_path, save_settings,
};
use sidenotes::edit::{Key, KeyOutcome};
use sidenotes::headless::synthesize_anchors;
use sidenotes::host::{HostDocument, TextDocument};
use sidenotes::layout::note::{CSS_OFFSET, CSS_WIDTH};
use sidenotes::layout::{ContainerGeometry, LayoutPlan, TextMetrics};
use sidenotes::perf;
use sidenotes::session::LayoutSession;
use sidenotes::watcher::DocumentWatcher;

const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Lay out margin notes for a markdown file
#[derive(Parser, Debug)]
#[command(name = "sidenotes", version, about, long_about = None)]
struct Cli {
    /// Markdown file to lay out
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Container width in pixels
    #[arg(long, default_value_t = 1300.0)]
    width: f32,

    /// Width of the centred text column in pixels
    #[arg(long, default_value_t = 700.0)]
    text_width: f32,

    /// How annotations are written in the source
    #[arg(long, value_enum)]
    format: Option<AnnotationFormat>,

    /// Side of the text column the margin sits on
    #[arg(long, value_enum)]
    side: Option<MarginSide>,

    /// Pin the margin to the text column or the container edge
    #[arg(long, value_enum)]
    anchor: Option<AnchorMode>,

    /// Restart numbering at every heading
    #[arg(long)]
    reset_per_heading: bool,

    /// Print the layout plan as JSON
    #[arg(long)]
    json: bool,

    /// Watch the file and print a new plan on every change
    #[arg(short, long)]
    watch: bool,

    /// Replace the text of the note at this position (0-based)
    #[arg(long, value_name = "N", requires = "text")]
    edit: Option<usize>,

    /// New note text for --edit
    #[arg(long, value_name = "TEXT", requires = "edit")]
    text: Option<String>,

    /// Save the effective settings to the global settings file
    #[arg(long)]
    save: bool,

    /// Remove the global settings file before loading
    #[arg(long)]
    clear: bool,

    /// Log timing of scans and layout passes
    #[arg(long)]
    perf: bool,

    /// Write layout debug events to a file
    #[arg(long, value_name = "PATH")]
    layout_debug_log: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of the file settings.
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(side) = self.side {
            settings.side = side;
        }
        if let Some(anchor) = self.anchor {
            settings.anchor = anchor;
        }
        if self.reset_per_heading {
            settings.reset_per_heading = true;
        }
        settings.validated()
    }

    fn geometry(&self) -> ContainerGeometry {
        ContainerGeometry::centered(self.width, self.text_width)
    }
}

fn effective_settings(cli: &Cli) -> Result<Settings> {
    let global_path = global_config_path();
    let local_path = local_override_path();
    if cli.clear {
        clear_settings(&global_path)?;
    }
    let file_settings = load_layered(&[&global_path, &local_path])?;
    let settings = cli.apply(file_settings);
    if cli.save {
        save_settings(&global_path, &settings)?;
    }
    Ok(settings)
}

fn init_debug_log(cli: &Cli) {
    let path = cli
        .layout_debug_log
        .clone()
        .or_else(perf::debug_log_path_from_env);
    if let Err(err) = perf::set_debug_log_path(path.as_deref()) {
        tracing::warn!(
            "failed to open layout debug log {}: {err}",
            path.as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string())
        );
    }
}

fn load_document(path: &Path) -> Result<TextDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(TextDocument::from_text(&text))
}

fn render(
    session: &mut LayoutSession,
    doc: &TextDocument,
    geometry: &ContainerGeometry,
) -> LayoutPlan {
    // The first pass scans; anchors come from the fresh index
    session.render_pass(&[], geometry, doc);
    let anchors = synthesize_anchors(doc, session.index(), geometry);
    session.render_pass(&anchors, geometry, doc)
}

fn print_plan(plan: &LayoutPlan, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(plan).context("Failed to encode layout plan")?;
        println!("{out}");
        return Ok(());
    }
    let vars = plan.css_vars();
    println!(
        "mode: {}  width: {}  offset: {}",
        plan.mode().as_str(),
        vars.get(CSS_WIDTH).map_or("", String::as_str),
        vars.get(CSS_OFFSET).map_or("", String::as_str)
    );
    for note in &plan.notes {
        println!(
            "{:>4}  top={:>7.1}  shift={:>6.1}  {}",
            note.number_label,
            note.top(),
            note.applied_shift,
            note.content.replace('\n', " ")
        );
    }
    Ok(())
}

/// Replace a note's text through the edit session, as typing would.
fn apply_edit(
    session: &mut LayoutSession,
    doc: &mut TextDocument,
    position: usize,
    text: &str,
) -> Result<bool> {
    let (_, opened) = session.activate_note(position, doc);
    if !opened {
        anyhow::bail!("No sidenote at position {position}");
    }
    session.handle_key(Key::SelectAll, doc);
    for ch in text.chars() {
        let key = if ch == '\n' { Key::SoftBreak } else { Key::Char(ch) };
        session.handle_key(key, doc);
    }
    let KeyOutcome::Closed(outcome) = session.handle_key(Key::Enter, doc) else {
        anyhow::bail!("Edit session did not close");
    };
    if !outcome.persisted {
        anyhow::bail!("Sidenote {position} could not be written back");
    }
    Ok(outcome.report.is_some_and(|r| r.mutated))
}

fn watch(
    cli: &Cli,
    session: &mut LayoutSession,
    doc: &mut TextDocument,
    watcher: &mut DocumentWatcher,
) -> Result<()> {
    let geometry = cli.geometry();
    let started = Instant::now();
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let now_ms = started.elapsed().as_millis() as u64;
        if watcher.take_change_ready() {
            let text = std::fs::read_to_string(watcher.target_path())
                .with_context(|| format!("Failed to reload {}", watcher.target_path().display()))?;
            let len = doc.len_bytes();
            doc.replace_range(&text, 0, len);
            session.on_document_changed(now_ms);
        }
        session.poll(now_ms);
        if let Some(pass) = session.on_animation_frame() {
            tracing::debug!(?pass, "running layout pass");
            print_plan(&render(session, doc, &geometry), cli.json)?;
        }
        std::thread::sleep(FRAME_INTERVAL);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = effective_settings(&cli)?;
    perf::set_enabled(cli.perf);
    init_debug_log(&cli);

    if !cli.file.exists() {
        anyhow::bail!("File not found: {}", cli.file.display());
    }
    let mut doc = load_document(&cli.file)?;
    let mut session = LayoutSession::new(settings).with_metrics(TextMetrics {
        char_width: doc.char_width(),
        line_height: doc.line_height(),
    });
    session.switch_document(Some(cli.file.clone()), 0);
    let geometry = cli.geometry();

    let mut watcher = if cli.watch {
        Some(DocumentWatcher::new(&cli.file, WATCH_DEBOUNCE).context("Failed to watch file")?)
    } else {
        None
    };

    if let (Some(position), Some(text)) = (cli.edit, cli.text.as_deref()) {
        render(&mut session, &doc, &geometry);
        if apply_edit(&mut session, &mut doc, position, text)? {
            let updated = doc.text();
            if let Some(watcher) = watcher.as_mut() {
                watcher.expect_own_write(&updated);
            }
            std::fs::write(&cli.file, &updated)
                .with_context(|| format!("Failed to write {}", cli.file.display()))?;
        }
    }

    print_plan(&render(&mut session, &doc, &geometry), cli.json)?;

    match watcher.as_mut() {
        Some(watcher) => {
            session.teardown();
            watch(&cli, &mut session, &mut doc, watcher)
        }
        None => Ok(()),
    }
}
