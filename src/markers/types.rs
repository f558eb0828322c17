//! Core marker types.

use std::collections::HashMap;
use std::ops::Range;

use serde::Serialize;

use crate::config::AnnotationFormat;

/// How a marker is encoded in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerKind {
    /// A `<span class="sidenote">` tag carrying its own text
    Inline,
    /// A `[^id]` reference whose text lives in a definition block
    FootnoteRef,
}

impl From<AnnotationFormat> for MarkerKind {
    fn from(format: AnnotationFormat) -> Self {
        match format {
            AnnotationFormat::Inline => Self::Inline,
            AnnotationFormat::FootnoteRef => Self::FootnoteRef,
        }
    }
}

/// One occurrence of an annotation in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub kind: MarkerKind,
    /// Byte range of the whole marker (full tag span, or `[^id]`)
    pub source_range: Range<usize>,
    /// Footnote identifier; `None` for inline markers
    pub stable_id: Option<String>,
    /// 1-based number among markers of the same kind, reset per heading when configured
    pub display_index: usize,
    /// 0-based position among markers of the same kind, never reset
    pub ordinal: usize,
    /// Inner tag text, or the footnote definition body
    pub content: String,
    /// Byte range `content` was read from
    pub content_range: Range<usize>,
    /// Key of the heading section containing the marker
    pub section: Option<String>,
}

impl Marker {
    /// The label shown on the anchor and the margin note.
    ///
    /// Footnotes always show their own identifier so that labels survive
    /// partial rendering; inline markers show their display index.
    pub fn label(&self) -> String {
        match (&self.kind, &self.stable_id) {
            (MarkerKind::FootnoteRef, Some(id)) => id.clone(),
            _ => self.display_index.to_string(),
        }
    }
}

/// A parsed `[^id]: text` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FootnoteDefinition {
    pub id: String,
    /// Body text with continuation indentation removed, lines joined by `\n`
    pub text: String,
    /// The whole definition, prefix included
    pub source_range: Range<usize>,
    /// Everything after the `[^id]:` prefix and its trailing whitespace
    pub body_range: Range<usize>,
}

/// A heading that starts a numbering section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Heading text, suffixed with `#n` for the n-th repeat of the same text
    pub key: String,
    pub heading: String,
    pub level: u8,
    /// Byte offset of the heading line
    pub start: usize,
    /// Number of markers that fell inside this section on the last scan
    pub marker_count: usize,
}

/// The ordered result of one full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerIndex {
    pub(crate) markers: Vec<Marker>,
    pub(crate) definitions: HashMap<String, FootnoteDefinition>,
    pub(crate) sections: Vec<Section>,
    pub(crate) reset_per_heading: bool,
}

impl MarkerIndex {
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Marker at a 0-based position in document order.
    pub fn get(&self, position: usize) -> Option<&Marker> {
        self.markers.get(position)
    }

    pub fn definition(&self, id: &str) -> Option<&FootnoteDefinition> {
        self.definitions.get(id)
    }

    pub const fn definitions(&self) -> &HashMap<String, FootnoteDefinition> {
        &self.definitions
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Position of the marker whose source range contains `offset`.
    pub fn position_at_offset(&self, offset: usize) -> Option<usize> {
        self.markers
            .iter()
            .position(|m| m.source_range.contains(&offset))
    }

    /// The nearest heading at or before `offset`.
    pub fn section_at(&self, offset: usize) -> Option<&Section> {
        let idx = self.sections.partition_point(|s| s.start <= offset);
        idx.checked_sub(1).and_then(|i| self.sections.get(i))
    }

    /// The display index the next marker at or after `offset` receives.
    ///
    /// Lets a host number a partially rendered block without materializing
    /// the markers before it.
    pub fn next_display_index(&self, offset: usize) -> usize {
        let first_after = self
            .markers
            .partition_point(|m| m.source_range.start < offset);
        if let Some(marker) = self.markers.get(first_after) {
            return marker.display_index;
        }
        // Past the last marker: continue the count of the enclosing section
        let section_start = if self.reset_per_heading {
            self.section_at(offset).map_or(0, |s| s.start)
        } else {
            0
        };
        1 + self
            .markers
            .iter()
            .filter(|m| m.source_range.start >= section_start && m.source_range.start < offset)
            .count()
    }
}
