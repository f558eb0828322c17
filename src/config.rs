//! Persisted sidenote settings.
//!
//! Settings live in a JSON file at the platform config path, with an optional
//! `.sidenotes.json` in the working directory overriding individual keys.
//! Everything that reaches the layout engine goes through
//! [`Settings::validated`] first, so the engine itself can assume ordered
//! breakpoints and a sane width range.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smallest distance kept between two breakpoints after correction.
const MIN_BREAKPOINT_GAP: f32 = 50.0;

/// How annotations are encoded in the document source.
#[derive(
    clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationFormat {
    /// `<span class="sidenote">…</span>` tags in the text flow
    #[default]
    Inline,
    /// `[^id]` references paired with `[^id]: text` definitions
    FootnoteRef,
}

/// Which side of the text column the margin sits on.
#[derive(
    clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum MarginSide {
    #[default]
    Left,
    Right,
}

/// What the margin column's offset is pinned to.
#[derive(
    clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AnchorMode {
    /// Keep a fixed gap to the text column
    #[default]
    Text,
    /// Keep a fixed gap to the container edge
    Edge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub format: AnnotationFormat,
    pub side: MarginSide,
    pub anchor: AnchorMode,
    /// Container widths below this hide the margin entirely
    pub hide_below: f32,
    /// Container widths below this use the compact margin
    pub compact_below: f32,
    /// Container widths at or above this use the full margin
    pub full_above: f32,
    pub compact_width: f32,
    pub normal_width: f32,
    pub full_width: f32,
    /// Width added on top of the mode's base width as the container grows
    pub extra_width: f32,
    pub min_width: f32,
    pub max_width: f32,
    pub gap_to_text: f32,
    pub gap_to_edge: f32,
    /// Vertical space kept between stacked notes
    pub spacing: f32,
    pub reset_per_heading: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format: AnnotationFormat::Inline,
            side: MarginSide::Left,
            anchor: AnchorMode::Text,
            hide_below: 700.0,
            compact_below: 1200.0,
            full_above: 1450.0,
            compact_width: 160.0,
            normal_width: 200.0,
            full_width: 240.0,
            extra_width: 80.0,
            min_width: 120.0,
            max_width: 320.0,
            gap_to_text: 32.0,
            gap_to_edge: 16.0,
            spacing: 8.0,
            reset_per_heading: false,
        }
    }
}

impl Settings {
    /// Correct out-of-range values so the layout engine can trust its input.
    ///
    /// Non-finite or negative lengths fall back to their defaults, breakpoints
    /// are pushed apart until `hide_below < compact_below < full_above`, and an
    /// inverted min/max width pair is swapped.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (name, value, fallback) in [
            ("hideBelow", &mut self.hide_below, defaults.hide_below),
            ("compactBelow", &mut self.compact_below, defaults.compact_below),
            ("fullAbove", &mut self.full_above, defaults.full_above),
            ("compactWidth", &mut self.compact_width, defaults.compact_width),
            ("normalWidth", &mut self.normal_width, defaults.normal_width),
            ("fullWidth", &mut self.full_width, defaults.full_width),
            ("extraWidth", &mut self.extra_width, defaults.extra_width),
            ("minWidth", &mut self.min_width, defaults.min_width),
            ("maxWidth", &mut self.max_width, defaults.max_width),
            ("gapToText", &mut self.gap_to_text, defaults.gap_to_text),
            ("gapToEdge", &mut self.gap_to_edge, defaults.gap_to_edge),
            ("spacing", &mut self.spacing, defaults.spacing),
        ] {
            if !value.is_finite() || *value < 0.0 {
                tracing::warn!(setting = name, value = *value, "invalid length, using default");
                *value = fallback;
            }
        }

        if self.compact_below <= self.hide_below {
            let corrected = self.hide_below + MIN_BREAKPOINT_GAP;
            tracing::warn!(
                compact_below = self.compact_below,
                corrected,
                "compactBelow must exceed hideBelow"
            );
            self.compact_below = corrected;
        }
        if self.full_above <= self.compact_below {
            let corrected = self.compact_below + MIN_BREAKPOINT_GAP;
            tracing::warn!(
                full_above = self.full_above,
                corrected,
                "fullAbove must exceed compactBelow"
            );
            self.full_above = corrected;
        }

        if self.min_width > self.max_width {
            tracing::warn!(
                min_width = self.min_width,
                max_width = self.max_width,
                "minWidth exceeds maxWidth, swapping"
            );
            std::mem::swap(&mut self.min_width, &mut self.max_width);
        }
        self
    }

    /// Whether a change from `previous` invalidates the scanned marker index.
    ///
    /// Geometry-only changes just need a new layout pass.
    pub fn requires_rescan(&self, previous: &Self) -> bool {
        self.format != previous.format || self.reset_per_heading != previous.reset_per_heading
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("sidenotes").join("settings.json");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("sidenotes")
                .join("settings.json");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("sidenotes").join("settings.json");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("sidenotes")
                .join("settings.json");
        }
    }

    PathBuf::from(".sidenotes.json")
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".sidenotes.json")
}

/// Load settings from a single file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    load_layered(&[path])
}

/// Load settings from several files, later files overriding earlier ones key
/// by key. Missing files are skipped.
pub fn load_layered(paths: &[&Path]) -> Result<Settings> {
    let mut merged = serde_json::Map::new();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings {}", path.display()))?;
        let Value::Object(map) = value else {
            anyhow::bail!("Settings {} must contain a JSON object", path.display());
        };
        merged.extend(map);
    }
    let settings: Settings = serde_json::from_value(Value::Object(merged))
        .context("Failed to interpret merged settings")?;
    Ok(settings.validated())
}

/// Validate and write settings, creating the parent directory if needed.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let settings = settings.clone().validated();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&settings).context("Failed to encode settings")?;
    fs::write(path, format!("{json}\n"))
        .with_context(|| format!("Failed to write settings {}", path.display()))
}

pub fn clear_settings(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
