//! Source synchronization.
//!
//! [`SourceSynchronizer`] keeps a read-only mirror of the host text together
//! with the marker index scanned from it, maps rendered anchors back to
//! markers, and writes committed note text back into the host with a single
//! range replacement.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::host::{HostDocument, ScreenPoint};
use crate::markers::{Marker, MarkerIndex, MarkerKind, ScanOptions, scan};

/// Pixel offsets within a line are folded into the position key below this.
const PIXEL_KEY_SCALE: u64 = 10_000;

/// Indentation written in front of footnote continuation lines.
const CONTINUATION_INDENT: &str = "    ";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern is valid"));
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("markdown link pattern is valid")
});
static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]").expect("wiki link pattern is valid")
});
static CLOSING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</span\s*>").expect("closing tag pattern is valid"));

/// Reduce marker content and rendered anchor text to a comparable form:
/// markup removed, emphasis characters dropped, whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = WIKI_LINK.replace_all(&text, "$1");
    let text = MD_LINK.replace_all(&text, "$1");
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '~' | '`' | '='))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The form inline note text takes in the source: surrounding whitespace
/// is not kept.
pub fn inline_text(text: &str) -> &str {
    text.trim()
}

/// The form footnote body text takes in the source: every line trimmed and
/// blank lines dropped, since a blank line ends the definition.
pub fn footnote_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// An anchor the host rendered for one marker during a render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedAnchor {
    pub kind: Option<MarkerKind>,
    /// Rendered text of an inline anchor, or the visible label of a footnote
    pub text: String,
    /// Screen position of the anchor, when the host could measure it
    pub screen: Option<ScreenPoint>,
    /// Horizontal pixel offset of the anchor within its line
    pub pixel_offset: f32,
    /// Natural top of the margin note before any shift
    pub anchor_y: f32,
    /// Measured height of the margin note
    pub height: f32,
    /// Left edge of the note wrapper's positioned ancestor
    pub ancestor_left: f32,
}

/// Which step of the fallback chain produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMethod {
    /// Exactly one marker carries the anchor's text
    ExactText,
    /// Several markers share the text; the nearest by position won
    NearestMatch,
    /// Several markers share the text and the anchor has no position
    FirstMatch,
    /// No text match; the nearest marker by position won
    NearestPosition,
    /// Nothing matched; defaulted to the first marker
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// 0-based position in the marker index
    pub position: usize,
    pub method: ResolveMethod,
}

/// Everything needed to find a marker again in a newer snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRef {
    pub kind: MarkerKind,
    pub ordinal: usize,
    pub stable_id: Option<String>,
    /// Marker content when the reference was taken
    pub expected_text: String,
    pub source_start: usize,
}

impl From<&Marker> for MarkerRef {
    fn from(marker: &Marker) -> Self {
        Self {
            kind: marker.kind,
            ordinal: marker.ordinal,
            stable_id: marker.stable_id.clone(),
            expected_text: marker.content.clone(),
            source_start: marker.source_range.start,
        }
    }
}

/// The single range replacement a commit issued, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub range: Range<usize>,
    pub replacement: String,
    /// False when the text was unchanged and the host was left alone
    pub mutated: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("footnote definition [^{0}] no longer exists")]
    DefinitionMissing(String),
    #[error("sidenote {ordinal} could not be located in the current document")]
    MarkerMissing { ordinal: usize },
    #[error("footnote marker has no identifier")]
    MissingId,
    #[error("sidenote text may not contain a closing </span> tag")]
    ClosingTag,
}

/// Mirror of the host text plus the marker index scanned from it.
#[derive(Debug, Clone, Default)]
pub struct SourceSynchronizer {
    snapshot: String,
    version: Option<u64>,
    options: ScanOptions,
    index: MarkerIndex,
}

impl SourceSynchronizer {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub const fn index(&self) -> &MarkerIndex {
        &self.index
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub const fn options(&self) -> ScanOptions {
        self.options
    }

    /// Change scan options; the mirror is considered stale until the next
    /// [`refresh`](Self::refresh).
    pub const fn set_options(&mut self, options: ScanOptions) {
        self.options = options;
        self.version = None;
    }

    /// Whether the mirror lags behind the host.
    pub fn is_stale(&self, host: &dyn HostDocument) -> bool {
        self.version != Some(host.version())
    }

    /// Rescan if the host changed since the last scan. Returns true when a
    /// rescan happened.
    pub fn refresh(&mut self, host: &dyn HostDocument) -> bool {
        if !self.is_stale(host) {
            return false;
        }
        self.rescan(host);
        true
    }

    /// Unconditionally take a fresh snapshot and rescan.
    pub fn rescan(&mut self, host: &dyn HostDocument) {
        self.snapshot = host.text();
        self.version = Some(host.version());
        self.index = scan(&self.snapshot, self.options);
    }

    /// Drop the mirror, e.g. when the host switches to another file.
    pub fn clear(&mut self) {
        self.snapshot.clear();
        self.version = None;
        self.index = MarkerIndex::default();
    }

    /// Map a rendered anchor onto a marker position.
    ///
    /// Never fails while the index has markers: ambiguous or stale anchors
    /// degrade through nearest-by-position down to the first marker. Returns
    /// `None` only for an empty index.
    pub fn resolve(&self, anchor: &RenderedAnchor, host: &dyn HostDocument) -> Option<Resolution> {
        let markers = self.index.markers();
        if markers.is_empty() {
            return None;
        }
        let kind = anchor.kind.unwrap_or(markers[0].kind);
        let key = anchor_key(anchor, host);

        let candidates: Vec<usize> = markers
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == kind && text_matches(m, &anchor.text))
            .map(|(i, _)| i)
            .collect();

        let resolution = match (candidates.as_slice(), key) {
            ([only], _) => Resolution {
                position: *only,
                method: ResolveMethod::ExactText,
            },
            ([first, ..], None) => Resolution {
                position: *first,
                method: ResolveMethod::FirstMatch,
            },
            ([_, _, ..], Some(key)) => Resolution {
                position: nearest(markers, candidates.iter().copied(), key).unwrap_or(candidates[0]),
                method: ResolveMethod::NearestMatch,
            },
            ([], Some(key)) => {
                let same_kind = (0..markers.len()).filter(|&i| markers[i].kind == kind);
                nearest(markers, same_kind, key).map_or(
                    Resolution {
                        position: 0,
                        method: ResolveMethod::Fallback,
                    },
                    |position| Resolution {
                        position,
                        method: ResolveMethod::NearestPosition,
                    },
                )
            }
            ([], None) => Resolution {
                position: 0,
                method: ResolveMethod::Fallback,
            },
        };

        if resolution.method != ResolveMethod::ExactText {
            tracing::debug!(
                text = %anchor.text,
                position = resolution.position,
                method = ?resolution.method,
                "anchor resolved without a unique text match"
            );
        }
        Some(resolution)
    }

    /// Current position of a previously referenced marker, if it still
    /// exists.
    pub fn locate(&self, target: &MarkerRef) -> Option<usize> {
        locate(&self.index, target)
    }

    /// Authoritative text of the marker at `position` in the current mirror.
    pub fn current_text(&self, position: usize) -> Option<&str> {
        self.index.get(position).map(|m| m.content.as_str())
    }

    /// Write `new_text` back into the marker's source range.
    ///
    /// The marker is located again in a fresh snapshot, since the source may
    /// have shifted since the anchor was rendered. Exactly one range
    /// replacement is issued, or none when the text is unchanged. The text is
    /// written in its source form, see [`inline_text`] and [`footnote_text`].
    ///
    /// # Errors
    /// Returns [`SyncError`] when the marker can no longer be found or inline
    /// text would close its tag early; the host is not touched in that case.
    pub fn commit(
        &mut self,
        target: &MarkerRef,
        new_text: &str,
        host: &mut dyn HostDocument,
    ) -> Result<CommitReport, SyncError> {
        let snapshot = host.text();
        let fresh = scan(&snapshot, self.options);

        let (range, replacement, unchanged) = match target.kind {
            MarkerKind::FootnoteRef => {
                let id = target.stable_id.as_deref().ok_or(SyncError::MissingId)?;
                let definition = fresh
                    .definition(id)
                    .ok_or_else(|| SyncError::DefinitionMissing(id.to_string()))?;
                let body = definition.body_range.clone();
                let needs_space = !snapshot[..body.start].ends_with([' ', '\t']);
                let text = footnote_text(new_text);
                let replacement = footnote_body(&text, needs_space);
                (body, replacement, definition.text == text)
            }
            MarkerKind::Inline => {
                let text = inline_text(new_text);
                if CLOSING_TAG.is_match(text) {
                    return Err(SyncError::ClosingTag);
                }
                let marker = locate(&fresh, target)
                    .and_then(|position| fresh.get(position))
                    .ok_or(SyncError::MarkerMissing {
                        ordinal: target.ordinal,
                    })?;
                let open = &snapshot[marker.source_range.start..marker.content_range.start];
                let close = &snapshot[marker.content_range.end..marker.source_range.end];
                let replacement = format!("{open}{text}{close}");
                (marker.source_range.clone(), replacement, marker.content == text)
            }
        };

        if unchanged {
            tracing::debug!(ordinal = target.ordinal, "commit skipped, text unchanged");
            self.snapshot = snapshot;
            self.version = Some(host.version());
            self.index = fresh;
            return Ok(CommitReport {
                range,
                replacement,
                mutated: false,
            });
        }

        host.replace_range(&replacement, range.start, range.end);
        crate::perf::log_event(
            "sync.commit",
            format!(
                "kind={:?} ordinal={} range={}..{} bytes={}",
                target.kind,
                target.ordinal,
                range.start,
                range.end,
                replacement.len()
            ),
        );
        self.rescan(host);
        Ok(CommitReport {
            range,
            replacement,
            mutated: true,
        })
    }
}

fn text_matches(marker: &Marker, anchor_text: &str) -> bool {
    match marker.kind {
        MarkerKind::FootnoteRef => {
            let label = anchor_text.trim().trim_start_matches(['[', '^']).trim_end_matches(']');
            marker.stable_id.as_deref() == Some(label)
        }
        MarkerKind::Inline => normalize_text(&marker.content) == normalize_text(anchor_text),
    }
}

/// Sortable position key for an anchor: document offset under the anchor's
/// screen position, refined by its pixel offset within the line.
fn anchor_key(anchor: &RenderedAnchor, host: &dyn HostDocument) -> Option<u64> {
    let offset = host.offset_at_coords(anchor.screen?)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pixel = anchor.pixel_offset.clamp(0.0, (PIXEL_KEY_SCALE - 1) as f32) as u64;
    Some(offset as u64 * PIXEL_KEY_SCALE + pixel)
}

fn nearest(markers: &[Marker], candidates: impl Iterator<Item = usize>, key: u64) -> Option<usize> {
    candidates.min_by_key(|&i| (markers[i].source_range.start as u64 * PIXEL_KEY_SCALE).abs_diff(key))
}

/// Find a marker again: same ordinal if it is still the same marker,
/// otherwise the nearest one that is. Footnote refs match by label, inline
/// markers by their text.
fn locate(index: &MarkerIndex, target: &MarkerRef) -> Option<usize> {
    let same = |m: &Marker| {
        m.kind == target.kind
            && match target.kind {
                MarkerKind::FootnoteRef => m.stable_id == target.stable_id,
                MarkerKind::Inline => m.content == target.expected_text,
            }
    };
    let markers = index.markers();
    if markers.get(target.ordinal).is_some_and(same) {
        return Some(target.ordinal);
    }
    markers
        .iter()
        .enumerate()
        .filter(|(_, m)| same(*m))
        .min_by_key(|(_, m)| m.source_range.start.abs_diff(target.source_start))
        .map(|(i, _)| i)
}

/// Lay out footnote body text so every line stays part of the definition.
/// `text` is expected in [`footnote_text`] form.
fn footnote_body(text: &str, needs_space: bool) -> String {
    let body = text
        .split('\n')
        .collect::<Vec<_>>()
        .join(&format!("\n{CONTINUATION_INDENT}"));
    if needs_space && !body.is_empty() {
        format!(" {body}")
    } else {
        body
    }
}
