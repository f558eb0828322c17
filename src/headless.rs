//! Anchor synthesis without a rendering host.
//!
//! Stands in for the host renderer's per-block callback: every marker in
//! the index becomes a rendered anchor placed on the [`TextDocument`]'s
//! monospace grid. Note heights are left at zero so the session estimates
//! them.

use crate::host::TextDocument;
use crate::layout::ContainerGeometry;
use crate::markers::{MarkerIndex, MarkerKind};
use crate::sync::RenderedAnchor;

/// One anchor per marker, in document order.
pub fn synthesize_anchors(
    doc: &TextDocument,
    index: &MarkerIndex,
    geometry: &ContainerGeometry,
) -> Vec<RenderedAnchor> {
    index
        .markers()
        .iter()
        .map(|marker| {
            let point = doc.coords_at_offset(marker.source_range.start);
            let text = match (marker.kind, &marker.stable_id) {
                (MarkerKind::FootnoteRef, Some(id)) => format!("[^{id}]"),
                _ => marker.content.clone(),
            };
            RenderedAnchor {
                kind: Some(marker.kind),
                text,
                screen: Some(point),
                pixel_offset: point.x,
                anchor_y: point.y,
                height: 0.0,
                ancestor_left: geometry.text_left,
            }
        })
        .collect()
}
