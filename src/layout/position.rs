//! Responsive horizontal placement of the margin column.
//!
//! Everything here is a pure function of the container geometry and
//! validated [`Settings`]. Offsets are measured from the text column edge on
//! the margin's side: negative values reach left of the text column's left
//! edge, positive values reach right of the text column's right edge.

use serde::Serialize;

use crate::config::{AnchorMode, MarginSide, Settings};

/// Discrete responsive state driven by container width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutMode {
    Hidden,
    Compact,
    Normal,
    Full,
}

impl LayoutMode {
    /// Classify a container width. Intervals are half-open, so a width equal
    /// to a breakpoint lands in the higher bucket. Zero, negative or
    /// non-finite widths (a container not laid out yet) are `Hidden`.
    pub fn for_width(width: f32, settings: &Settings) -> Self {
        if !width.is_finite() || width <= 0.0 || width < settings.hide_below {
            Self::Hidden
        } else if width < settings.compact_below {
            Self::Compact
        } else if width < settings.full_above {
            Self::Normal
        } else {
            Self::Full
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Compact => "compact",
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }

    pub const fn is_visible(self) -> bool {
        !matches!(self, Self::Hidden)
    }
}

/// Measured geometry of the container and the text column inside it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGeometry {
    pub container_width: f32,
    /// Distance from the container's left edge to the text column's left edge
    pub text_left: f32,
    pub text_width: f32,
}

impl ContainerGeometry {
    /// A text column of `text_width` centred in the container.
    pub fn centered(container_width: f32, text_width: f32) -> Self {
        let text_width = text_width.min(container_width).max(0.0);
        Self {
            container_width,
            text_left: ((container_width - text_width) / 2.0).max(0.0),
            text_width,
        }
    }

    /// Free space between the text column and the container edge on `side`.
    pub fn gutter(&self, side: MarginSide) -> f32 {
        match side {
            MarginSide::Left => self.text_left,
            MarginSide::Right => self.container_width - self.text_left - self.text_width,
        }
    }
}

/// Result of one placement computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginPlacement {
    pub mode: LayoutMode,
    pub margin_width: f32,
    /// Offset of the margin's near edge from the text column, see module docs
    pub offset: f32,
}

impl MarginPlacement {
    pub const HIDDEN: Self = Self {
        mode: LayoutMode::Hidden,
        margin_width: 0.0,
        offset: 0.0,
    };
}

/// Growth factor between the hide and full breakpoints, clamped to `0..=1`.
pub fn width_scale(width: f32, settings: &Settings) -> f32 {
    let span = settings.full_above - settings.hide_below;
    if span <= 0.0 {
        return 1.0;
    }
    ((width - settings.hide_below) / span).clamp(0.0, 1.0)
}

/// Margin column width for a container width.
pub fn margin_width(width: f32, settings: &Settings) -> f32 {
    let base = match LayoutMode::for_width(width, settings) {
        LayoutMode::Hidden => return 0.0,
        LayoutMode::Compact => settings.compact_width,
        LayoutMode::Normal => settings.normal_width,
        LayoutMode::Full => settings.full_width,
    };
    (base + settings.extra_width * width_scale(width, settings))
        .clamp(settings.min_width, settings.max_width)
}

/// Compute mode, width and horizontal offset for the margin column.
///
/// Both gaps are minimums. When the gutter is too narrow to honour both,
/// `text` anchoring keeps the edge gap (pulling the margin toward the text)
/// and `edge` anchoring keeps the text gap (pushing it toward the edge).
pub fn place(geometry: &ContainerGeometry, settings: &Settings) -> MarginPlacement {
    let mode = LayoutMode::for_width(geometry.container_width, settings);
    if !mode.is_visible() {
        return MarginPlacement::HIDDEN;
    }
    let width = margin_width(geometry.container_width, settings);
    let gutter = geometry.gutter(settings.side);
    let text_gap = settings.gap_to_text;
    let edge_gap = settings.gap_to_edge;

    let offset = match (settings.side, settings.anchor) {
        // Near edge is the margin's right edge; offset is its left edge
        (MarginSide::Left, AnchorMode::Text) => (-(text_gap + width)).max(edge_gap - gutter),
        (MarginSide::Left, AnchorMode::Edge) => (edge_gap - gutter).min(-(text_gap + width)),
        (MarginSide::Right, AnchorMode::Text) => text_gap.min(gutter - edge_gap - width),
        (MarginSide::Right, AnchorMode::Edge) => (gutter - edge_gap - width).max(text_gap),
    };

    MarginPlacement {
        mode,
        margin_width: width,
        offset,
    }
}

/// Per-wrapper correction that puts every note on the reference line's
/// column, whatever positioned ancestor (list item, callout) it resolves
/// against. Wrappers sharing the reference edge get `0.0`.
pub fn line_offset(reference_left: f32, ancestor_left: f32) -> f32 {
    let delta = reference_left - ancestor_left;
    if delta.abs() < f32::EPSILON { 0.0 } else { delta }
}
