//! Margin note value objects and the plan handed to the host UI.

use std::collections::BTreeMap;

use serde::Serialize;

use super::position::{LayoutMode, MarginPlacement};
use crate::markers::MarkerKind;

/// CSS custom property names consumed by host styling.
pub const CSS_WIDTH: &str = "--sidenote-width";
pub const CSS_OFFSET: &str = "--sidenote-offset";
pub const CSS_MODE: &str = "--sidenote-mode";
pub const CSS_SHIFT: &str = "--sidenote-shift";
pub const CSS_LINE_OFFSET: &str = "--sidenote-line-offset";

/// The side-column element paired with one rendered anchor.
///
/// Derived data: rebuilt on every render pass from the marker index and the
/// host's measurements, never read back as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginNote {
    /// 0-based position of the marker in the index
    pub marker: usize,
    pub kind: MarkerKind,
    pub number_label: String,
    pub content: String,
    pub anchor_y: f32,
    pub height: f32,
    pub applied_shift: f32,
    pub line_offset: f32,
    pub editing: bool,
}

impl MarginNote {
    /// Final top position after collision shifting.
    pub fn top(&self) -> f32 {
        self.anchor_y + self.applied_shift
    }

    /// Per-note custom properties.
    pub fn css_vars(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (CSS_SHIFT, px(self.applied_shift)),
            (CSS_LINE_OFFSET, px(self.line_offset)),
        ])
    }
}

/// Everything the host needs to draw one render pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPlan {
    pub placement: MarginPlacement,
    pub notes: Vec<MarginNote>,
}

impl LayoutPlan {
    pub const fn mode(&self) -> LayoutMode {
        self.placement.mode
    }

    /// Container-level custom properties.
    pub fn css_vars(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (CSS_WIDTH, px(self.placement.margin_width)),
            (CSS_OFFSET, px(self.placement.offset)),
            (CSS_MODE, self.placement.mode.as_str().to_string()),
        ])
    }

    pub fn note_for_marker(&self, marker: usize) -> Option<&MarginNote> {
        self.notes.iter().find(|n| n.marker == marker)
    }
}

fn px(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        "0px".to_string()
    } else {
        format!("{rounded}px")
    }
}
