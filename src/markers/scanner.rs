//! Marker scanning over a raw document snapshot.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{FootnoteDefinition, Marker, MarkerIndex, MarkerKind, Section};
use crate::config::{AnnotationFormat, Settings};

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<span\b[^>]*?\bclass\s*=\s*(?:"[^"]*\bsidenote\b[^"]*"|'[^']*\bsidenote\b[^']*'|sidenote\b)[^>]*>(.*?)</span\s*>"#,
    )
    .expect("inline tag pattern is valid")
});

static FOOTNOTE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^([^\]\s]+)\]").expect("footnote ref pattern is valid"));

static FOOTNOTE_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\^([^\]\s]+)\]:[ \t]*").expect("footnote definition pattern is valid")
});

/// What to scan for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    pub format: AnnotationFormat,
    pub reset_per_heading: bool,
}

impl From<&Settings> for ScanOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            format: settings.format,
            reset_per_heading: settings.reset_per_heading,
        }
    }
}

/// One source line with its byte offset, line break excluded.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    const fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

fn lines(source: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for raw in source.split_inclusive('\n') {
        let text = raw.trim_end_matches(['\n', '\r']);
        out.push(Line { start, text });
        start += raw.len();
    }
    out
}

/// Document structure gathered in one line walk: fenced code ranges (where
/// markers are ignored) and ATX headings.
#[derive(Debug, Default)]
struct Outline {
    code: Vec<Range<usize>>,
    headings: Vec<(usize, u8, String)>,
}

impl Outline {
    fn in_code(&self, offset: usize) -> bool {
        self.code.iter().any(|range| range.contains(&offset))
    }
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = rest.chars().take_while(|c| *c == ch).count();
    (run >= 3).then_some((ch, run))
}

/// Parse an ATX heading line into its level and text.
fn parse_atx_heading(line: &str) -> Option<(u8, String)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let level = rest.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let after = &rest[level..];
    if !(after.is_empty() || after.starts_with([' ', '\t'])) {
        return None;
    }
    let mut text = after.trim();
    // Closing sequence only counts when separated by whitespace
    let without_hashes = text.trim_end_matches('#');
    if without_hashes.is_empty() || without_hashes.ends_with([' ', '\t']) {
        text = without_hashes.trim_end();
    }
    #[allow(clippy::cast_possible_truncation)]
    Some((level as u8, text.to_string()))
}

fn outline(lines: &[Line<'_>]) -> Outline {
    let mut outline = Outline::default();
    let mut open_fence: Option<(char, usize, usize)> = None;
    for line in lines {
        if let Some((ch, run, start)) = open_fence {
            if fence_marker(line.text).is_some_and(|(c, r)| c == ch && r >= run)
                && line.text.trim().chars().all(|c| c == ch)
            {
                outline.code.push(start..line.end());
                open_fence = None;
            }
            continue;
        }
        if let Some((ch, run)) = fence_marker(line.text) {
            open_fence = Some((ch, run, line.start));
            continue;
        }
        if let Some((level, text)) = parse_atx_heading(line.text) {
            outline.headings.push((line.start, level, text));
        }
    }
    // An unclosed fence runs to the end of the document
    if let Some((_, _, start)) = open_fence {
        let end = lines.last().map_or(start, |l| l.end() + 1);
        outline.code.push(start..end);
    }
    outline
}

fn sections(outline: &Outline) -> Vec<Section> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    outline
        .headings
        .iter()
        .map(|(start, level, text)| {
            let count = seen.entry(text.as_str()).or_insert(0);
            *count += 1;
            let key = if *count == 1 {
                text.clone()
            } else {
                format!("{text}#{count}")
            };
            Section {
                key,
                heading: text.clone(),
                level: *level,
                start: *start,
                marker_count: 0,
            }
        })
        .collect()
}

/// Normalize a footnote body read from the source: the first line as-is,
/// continuation lines with their indentation removed.
fn normalize_body(raw: &str) -> String {
    let mut parts = raw.split('\n').map(|l| l.trim_end_matches('\r'));
    let first = parts.next().unwrap_or_default().trim_end();
    let rest = parts.map(str::trim).filter(|l| !l.is_empty());
    if first.is_empty() {
        rest.collect::<Vec<_>>().join("\n")
    } else {
        std::iter::once(first)
            .chain(rest)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn scan_definitions(
    source: &str,
    lines: &[Line<'_>],
    outline: &Outline,
) -> HashMap<String, FootnoteDefinition> {
    let mut definitions = HashMap::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        if outline.in_code(line.start) {
            continue;
        }
        let Some(caps) = FOOTNOTE_DEF.captures(line.text) else {
            continue;
        };
        let (Some(prefix), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body_start = line.start + prefix.end();
        let mut body_end = line.end();
        while let Some(next) = lines.get(i) {
            let indented = next.text.starts_with([' ', '\t']);
            if next.text.trim().is_empty() || !indented {
                break;
            }
            body_end = next.end();
            i += 1;
        }
        let definition = FootnoteDefinition {
            id: id.as_str().to_string(),
            text: normalize_body(&source[body_start..body_end]),
            source_range: line.start..body_end,
            body_range: body_start..body_end,
        };
        if definitions.contains_key(&definition.id) {
            tracing::debug!(id = %definition.id, "footnote redefined, later definition wins");
        }
        definitions.insert(definition.id.clone(), definition);
    }
    definitions
}

fn scan_inline(source: &str, outline: &Outline) -> Vec<Marker> {
    INLINE_TAG
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            if outline.in_code(whole.start()) {
                return None;
            }
            Some(Marker {
                kind: MarkerKind::Inline,
                source_range: whole.range(),
                stable_id: None,
                display_index: 0,
                ordinal: 0,
                content: inner.as_str().trim().to_string(),
                content_range: inner.range(),
                section: None,
            })
        })
        .collect()
}

fn scan_references(
    source: &str,
    outline: &Outline,
    definitions: &HashMap<String, FootnoteDefinition>,
) -> Vec<Marker> {
    FOOTNOTE_REF
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str();
            if source[whole.end()..].starts_with(':') || outline.in_code(whole.start()) {
                return None;
            }
            let Some(definition) = definitions.get(id) else {
                tracing::debug!(id, offset = whole.start(), "footnote reference without definition");
                return None;
            };
            Some(Marker {
                kind: MarkerKind::FootnoteRef,
                source_range: whole.range(),
                stable_id: Some(id.to_string()),
                display_index: 0,
                ordinal: 0,
                content: definition.text.clone(),
                content_range: definition.body_range.clone(),
                section: None,
            })
        })
        .collect()
}

/// Number markers in document order, restarting after each heading when
/// `reset_per_heading` is set.
fn assign_numbers(markers: &mut [Marker], sections: &mut [Section], reset_per_heading: bool) {
    let mut counter = 0;
    let mut current_section: Option<usize> = None;
    for (ordinal, marker) in markers.iter_mut().enumerate() {
        let section = sections
            .partition_point(|s| s.start <= marker.source_range.start)
            .checked_sub(1);
        if reset_per_heading && section != current_section {
            counter = 0;
        }
        current_section = section;
        counter += 1;
        marker.ordinal = ordinal;
        marker.display_index = counter;
        if let Some(section) = section.and_then(|i| sections.get_mut(i)) {
            section.marker_count += 1;
            marker.section = Some(section.key.clone());
        }
    }
}

/// Scan `source` for markers of the configured format.
pub fn scan(source: &str, options: ScanOptions) -> MarkerIndex {
    let _scope = crate::perf::scope("markers.scan");
    let lines = lines(source);
    let outline = outline(&lines);
    let mut sections = sections(&outline);

    let (mut markers, definitions) = match options.format {
        AnnotationFormat::Inline => (scan_inline(source, &outline), HashMap::new()),
        AnnotationFormat::FootnoteRef => {
            let definitions = scan_definitions(source, &lines, &outline);
            (scan_references(source, &outline, &definitions), definitions)
        }
    };
    assign_numbers(&mut markers, &mut sections, options.reset_per_heading);

    crate::perf::log_event(
        "markers.scan",
        format!(
            "format={:?} markers={} definitions={} sections={}",
            options.format,
            markers.len(),
            definitions.len(),
            sections.len()
        ),
    );

    MarkerIndex {
        markers,
        definitions,
        sections,
        reset_per_heading: options.reset_per_heading,
    }
}
