//! The per-document layout session.
//!
//! A [`LayoutSession`] owns everything the engine keeps between render
//! passes for one open document: settings, the source mirror, the edit
//! state machine, the scheduler and the notes of the last pass. Switching
//! files resets it wholesale.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::edit::{DirtyRegion, EditManager, EditOutcome, EditState, Key, KeyOutcome};
use crate::host::HostDocument;
use crate::layout::{
    ContainerGeometry, LayoutPlan, MarginNote, MarginPlacement, StackItem, TextMetrics,
    estimate_height, line_offset, place, resolve_collisions,
};
use crate::markers::{MarkerIndex, ScanOptions};
use crate::scheduler::{PassRequest, Scheduler, SchedulerTiming, SuppressFlag, Trigger};
use crate::sync::{RenderedAnchor, SourceSynchronizer};

#[derive(Debug)]
pub struct LayoutSession {
    settings: Settings,
    sync: SourceSynchronizer,
    editor: EditManager,
    scheduler: Scheduler,
    suppress: SuppressFlag,
    metrics: TextMetrics,
    path: Option<PathBuf>,
    last_plan: Option<LayoutPlan>,
}

impl LayoutSession {
    pub fn new(settings: Settings) -> Self {
        Self::with_timing(settings, SchedulerTiming::default())
    }

    pub fn with_timing(settings: Settings, timing: SchedulerTiming) -> Self {
        let settings = settings.validated();
        Self {
            sync: SourceSynchronizer::new(ScanOptions::from(&settings)),
            settings,
            editor: EditManager::new(),
            scheduler: Scheduler::new(timing),
            suppress: SuppressFlag::new(),
            metrics: TextMetrics::default(),
            path: None,
            last_plan: None,
        }
    }

    /// Metrics used to estimate the height of notes the host did not measure.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: TextMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    pub const fn index(&self) -> &MarkerIndex {
        self.sync.index()
    }

    pub const fn synchronizer(&self) -> &SourceSynchronizer {
        &self.sync
    }

    pub const fn editor(&self) -> &EditManager {
        &self.editor
    }

    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle to the flag the host checks before forwarding its own change
    /// notifications.
    pub fn suppress_flag(&self) -> SuppressFlag {
        self.suppress.clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub const fn last_plan(&self) -> Option<&LayoutPlan> {
        self.last_plan.as_ref()
    }

    /// Start over on another document.
    ///
    /// Any open edit session is dropped without committing; it belongs to
    /// the previous file.
    pub fn switch_document(&mut self, path: Option<PathBuf>, now_ms: u64) {
        if self.editor.is_editing() {
            tracing::debug!("dropping open edit session on file switch");
        }
        self.editor.reset();
        self.sync.clear();
        self.last_plan = None;
        self.path = path;
        self.scheduler.trigger(Trigger::FileSwitch, now_ms);
    }

    /// Replace the settings. Returns true when markers must be rescanned.
    pub fn update_settings(&mut self, settings: Settings, now_ms: u64) -> bool {
        let settings = settings.validated();
        let rescan = settings.requires_rescan(&self.settings);
        if rescan {
            self.sync.set_options(ScanOptions::from(&settings));
        }
        self.settings = settings;
        self.scheduler.trigger(Trigger::SettingsChanged, now_ms);
        rescan
    }

    /// The host text changed. Ignored while the engine itself is writing.
    pub fn on_document_changed(&mut self, now_ms: u64) -> bool {
        if self.suppress.is_suppressed() {
            tracing::trace!("ignoring self-inflicted document change");
            return false;
        }
        self.scheduler.trigger(Trigger::DocumentChanged, now_ms);
        true
    }

    pub fn on_resize(&mut self, now_ms: u64) {
        self.scheduler.trigger(Trigger::Resize, now_ms);
    }

    pub fn on_scroll(&mut self, now_ms: u64) {
        self.scheduler.trigger(Trigger::Scroll, now_ms);
    }

    /// Host timer callback.
    pub fn poll(&mut self, now_ms: u64) {
        self.scheduler.poll(now_ms);
    }

    /// Host paint callback; returns the pass to run now, if any.
    pub fn on_animation_frame(&mut self) -> Option<PassRequest> {
        self.scheduler.on_animation_frame()
    }

    /// Cancel all pending work.
    pub fn teardown(&mut self) {
        self.scheduler.teardown();
    }

    /// Lay out the margin notes for the anchors the host rendered.
    ///
    /// Anchors that resolve to a marker already placed in this pass are
    /// skipped. The note being edited keeps its live text instead of the
    /// source text.
    pub fn render_pass(
        &mut self,
        anchors: &[RenderedAnchor],
        geometry: &ContainerGeometry,
        host: &dyn HostDocument,
    ) -> LayoutPlan {
        let _scope = crate::perf::scope("session.render_pass");
        if self.sync.refresh(host) {
            tracing::debug!(markers = self.sync.index().len(), "markers rescanned");
        }
        self.editor.relocate(&self.sync);

        let placement = place(geometry, &self.settings);
        if !placement.mode.is_visible() {
            let plan = LayoutPlan {
                placement: MarginPlacement::HIDDEN,
                notes: Vec::new(),
            };
            self.last_plan = Some(plan.clone());
            return plan;
        }

        let editing = self.editor.session().filter(|s| !s.detached);
        let mut seen = HashSet::new();
        let mut notes = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let Some(resolution) = self.sync.resolve(anchor, host) else {
                break;
            };
            if !seen.insert(resolution.position) {
                tracing::debug!(position = resolution.position, "duplicate anchor skipped");
                continue;
            }
            let Some(marker) = self.sync.index().get(resolution.position) else {
                continue;
            };
            let live = editing.filter(|s| s.position == resolution.position);
            let content = live.map_or_else(|| marker.content.clone(), |s| s.live_text());
            let number_label = marker.label();
            let height = if anchor.height > 0.0 {
                anchor.height
            } else {
                estimate_height(&number_label, &content, placement.margin_width, self.metrics)
            };
            notes.push(MarginNote {
                marker: resolution.position,
                kind: marker.kind,
                number_label,
                content,
                anchor_y: anchor.anchor_y,
                height,
                applied_shift: 0.0,
                line_offset: line_offset(geometry.text_left, anchor.ancestor_left),
                editing: live.is_some(),
            });
        }

        let items: Vec<StackItem> = notes
            .iter()
            .map(|n| StackItem {
                order: n.marker,
                anchor_y: n.anchor_y,
                height: n.height,
            })
            .collect();
        let shifts = resolve_collisions(&items, self.settings.spacing);
        for (note, shift) in notes.iter_mut().zip(shifts) {
            note.applied_shift = shift;
        }

        crate::perf::log_event(
            "session.render_pass",
            format!(
                "mode={} width={:.1} offset={:.1} anchors={} notes={}",
                placement.mode.as_str(),
                placement.margin_width,
                placement.offset,
                anchors.len(),
                notes.len()
            ),
        );
        let plan = LayoutPlan { placement, notes };
        self.last_plan = Some(plan.clone());
        plan
    }

    /// Open the note at `position` for editing, committing any other open
    /// note first.
    pub fn activate_note(
        &mut self,
        position: usize,
        host: &mut dyn HostDocument,
    ) -> (Option<EditOutcome>, bool) {
        let _guard = self.suppress.suppress();
        self.editor.activate(position, &mut self.sync, host)
    }

    pub fn handle_key(&mut self, key: Key, host: &mut dyn HostDocument) -> KeyOutcome {
        let _guard = self.suppress.suppress();
        self.editor.handle_key(key, &mut self.sync, host)
    }

    pub fn blur(&mut self, host: &mut dyn HostDocument) -> Option<EditOutcome> {
        let _guard = self.suppress.suppress();
        self.editor.blur(&mut self.sync, host)
    }

    pub fn outside_click(&mut self, host: &mut dyn HostDocument) -> Option<EditOutcome> {
        let _guard = self.suppress.suppress();
        self.editor.outside_click(&mut self.sync, host)
    }

    pub const fn edit_state(&self) -> EditState {
        self.editor.state()
    }

    /// Regions changed by commits since the last call, for views in other
    /// modes to refresh.
    pub fn take_dirty_regions(&mut self) -> Vec<DirtyRegion> {
        self.editor.take_dirty_regions()
    }

    /// Display index of the first marker in a block starting at `offset`.
    pub fn numbering_for_block(&mut self, offset: usize, host: &dyn HostDocument) -> usize {
        self.sync.refresh(host);
        self.sync.index().next_display_index(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnotationFormat;
    use crate::host::TextDocument;
    use crate::layout::LayoutMode;

    const TWO_NOTES: &str = "First<span class=\"sidenote\">alpha</span> line\n\
                             Second<span class=\"sidenote\">beta</span> line\n";

    fn anchor(text: &str, anchor_y: f32, height: f32) -> RenderedAnchor {
        RenderedAnchor {
            text: text.to_string(),
            anchor_y,
            height,
            ..RenderedAnchor::default()
        }
    }

    #[test]
    fn test_render_pass_places_and_stacks_notes() {
        let doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        let geometry = ContainerGeometry::centered(1300.0, 700.0);
        let plan = session.render_pass(
            &[anchor("alpha", 100.0, 40.0), anchor("beta", 110.0, 40.0)],
            &geometry,
            &doc,
        );
        assert_eq!(plan.mode(), LayoutMode::Normal);
        assert_eq!(plan.notes.len(), 2);
        assert_eq!(plan.notes[0].number_label, "1");
        assert_eq!(plan.notes[1].content, "beta");
        assert_eq!(plan.notes[0].applied_shift, 0.0);
        assert_eq!(plan.notes[1].applied_shift, 38.0);
        assert_eq!(session.last_plan(), Some(&plan));
    }

    #[test]
    fn test_render_pass_hidden_when_narrow() {
        let doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        let plan = session.render_pass(
            &[anchor("alpha", 0.0, 20.0)],
            &ContainerGeometry::centered(600.0, 500.0),
            &doc,
        );
        assert_eq!(plan.mode(), LayoutMode::Hidden);
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn test_render_pass_estimates_missing_heights() {
        let doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        let plan = session.render_pass(
            &[anchor("alpha", 0.0, 0.0)],
            &ContainerGeometry::centered(1300.0, 700.0),
            &doc,
        );
        assert_eq!(plan.notes[0].height, 24.0);
    }

    #[test]
    fn test_duplicate_anchors_yield_one_note() {
        let doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        let plan = session.render_pass(
            &[anchor("alpha", 0.0, 20.0), anchor("alpha", 50.0, 20.0)],
            &ContainerGeometry::centered(1300.0, 700.0),
            &doc,
        );
        assert_eq!(plan.notes.len(), 1);
    }

    #[test]
    fn test_editing_note_shows_live_text() {
        let mut doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        let (_, opened) = session.activate_note(1, &mut doc);
        assert!(opened);
        assert_eq!(session.handle_key(Key::Char('B'), &mut doc), KeyOutcome::Handled);
        let plan = session.render_pass(
            &[anchor("alpha", 0.0, 20.0), anchor("beta", 100.0, 20.0)],
            &ContainerGeometry::centered(1300.0, 700.0),
            &doc,
        );
        let note = plan.note_for_marker(1).unwrap();
        assert!(note.editing);
        assert_eq!(note.content, "B");
        assert!(!plan.note_for_marker(0).unwrap().editing);
    }

    #[test]
    fn test_editing_note_follows_marker_after_insert_above() {
        let mut doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        session.activate_note(0, &mut doc);
        session.handle_key(Key::Char('Z'), &mut doc);
        doc.replace_range("<span class=\"sidenote\">gamma</span>\n", 0, 0);
        let plan = session.render_pass(
            &[
                anchor("gamma", 0.0, 20.0),
                anchor("alpha", 100.0, 20.0),
                anchor("beta", 200.0, 20.0),
            ],
            &ContainerGeometry::centered(1300.0, 700.0),
            &doc,
        );
        let inserted = plan.note_for_marker(0).unwrap();
        assert!(!inserted.editing);
        assert_eq!(inserted.content, "gamma");
        let edited = plan.note_for_marker(1).unwrap();
        assert!(edited.editing);
        assert_eq!(edited.content, "Z");
        assert_eq!(session.editor().editing_position(), Some(1));
    }

    #[test]
    fn test_commit_marks_region_dirty_and_rescans() {
        let mut doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        session.activate_note(0, &mut doc);
        for ch in "omega".chars() {
            session.handle_key(Key::Char(ch), &mut doc);
        }
        let outcome = session.blur(&mut doc).unwrap();
        assert!(outcome.persisted);
        assert_eq!(session.edit_state(), EditState::Idle);
        assert_eq!(session.index().get(0).unwrap().content, "omega");
        assert_eq!(session.take_dirty_regions().len(), 1);
        assert!(!session.suppress_flag().is_suppressed());
    }

    #[test]
    fn test_document_change_ignored_while_suppressed() {
        let mut session = LayoutSession::new(Settings::default());
        let flag = session.suppress_flag();
        {
            let _guard = flag.suppress();
            assert!(!session.on_document_changed(0));
        }
        assert!(session.scheduler().is_idle());
        assert!(session.on_document_changed(0));
        assert!(!session.scheduler().is_idle());
    }

    #[test]
    fn test_update_settings_reports_rescan() {
        let mut session = LayoutSession::new(Settings::default());
        let wider = Settings {
            spacing: 12.0,
            ..Settings::default()
        };
        assert!(!session.update_settings(wider, 0));
        let footnotes = Settings {
            format: AnnotationFormat::FootnoteRef,
            ..Settings::default()
        };
        assert!(session.update_settings(footnotes, 10));
        assert_eq!(session.settings().format, AnnotationFormat::FootnoteRef);
    }

    #[test]
    fn test_switch_document_resets_state() {
        let mut doc = TextDocument::from_text(TWO_NOTES);
        let mut session = LayoutSession::new(Settings::default());
        session.activate_note(0, &mut doc);
        session.switch_document(Some(PathBuf::from("other.md")), 0);
        assert_eq!(session.edit_state(), EditState::Idle);
        assert!(session.index().is_empty());
        assert!(session.last_plan().is_none());
        assert_eq!(session.path(), Some(Path::new("other.md")));
        assert!(session.on_animation_frame().is_none());
        assert_eq!(session.on_animation_frame(), Some(PassRequest::RESCAN));
    }

    #[test]
    fn test_numbering_for_block_with_heading_reset() {
        let doc = TextDocument::from_text(
            "# A\n<span class=\"sidenote\">a1</span>\n# B\n<span class=\"sidenote\">b1</span> <span class=\"sidenote\">b2</span>\n",
        );
        let settings = Settings {
            reset_per_heading: true,
            ..Settings::default()
        };
        let mut session = LayoutSession::new(settings);
        let second_heading = doc.text().find("# B").unwrap();
        assert_eq!(session.numbering_for_block(second_heading, &doc), 1);
        let b2 = doc.text().find("<span class=\"sidenote\">b2").unwrap();
        assert_eq!(session.numbering_for_block(b2, &doc), 2);
    }
}
