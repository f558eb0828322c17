use sidenotes::config::{AnnotationFormat, Settings};
use sidenotes::edit::{Key, KeyOutcome};
use sidenotes::headless::synthesize_anchors;
use sidenotes::host::{HostDocument, TextDocument};
use sidenotes::layout::{ContainerGeometry, LayoutMode, LayoutPlan};
use sidenotes::markers::MarkerKind;
use sidenotes::session::LayoutSession;

const ESSAY: &str = include_str!("fixtures/essay.md");

fn render(session: &mut LayoutSession, doc: &TextDocument, width: f32) -> LayoutPlan {
    let geometry = ContainerGeometry::centered(width, 700.0);
    session.render_pass(&[], &geometry, doc);
    let anchors = synthesize_anchors(doc, session.index(), &geometry);
    session.render_pass(&anchors, &geometry, doc)
}

fn footnote_settings() -> Settings {
    Settings {
        format: AnnotationFormat::FootnoteRef,
        ..Settings::default()
    }
}

#[test]
fn test_inline_notes_skip_code_blocks() {
    let doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(Settings::default());
    let plan = render(&mut session, &doc, 1300.0);

    let contents: Vec<_> = plan.notes.iter().map(|n| n.content.as_str()).collect();
    assert_eq!(
        contents,
        ["Marginalia predate the printing press.", "The *last* one.", "Close by."]
    );
    let labels: Vec<_> = plan.notes.iter().map(|n| n.number_label.as_str()).collect();
    assert_eq!(labels, ["1", "2", "3"]);
}

#[test]
fn test_same_line_notes_do_not_overlap() {
    let doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(Settings::default());
    let plan = render(&mut session, &doc, 1300.0);

    let last = &plan.notes[2];
    let prev = &plan.notes[1];
    assert_eq!(last.anchor_y, prev.anchor_y);
    assert!(last.top() >= prev.top() + prev.height + session.settings().spacing);
}

#[test]
fn test_footnote_labels_use_identifiers() {
    let doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(footnote_settings());
    let plan = render(&mut session, &doc, 1300.0);

    assert!(plan.notes.iter().all(|n| n.kind == MarkerKind::FootnoteRef));
    let labels: Vec<_> = plan.notes.iter().map(|n| n.number_label.as_str()).collect();
    assert_eq!(labels, ["bottom", "trip"]);
    assert_eq!(plan.notes[1].content, "Measured in eye movement,\nnot in pages.");
}

#[test]
fn test_width_sweep_walks_through_modes() {
    let doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(Settings::default());
    let modes: Vec<_> = [650.0, 700.0, 1199.0, 1200.0, 1449.0, 1450.0, 1500.0]
        .into_iter()
        .map(|w| render(&mut session, &doc, w).mode())
        .collect();
    assert_eq!(
        modes,
        [
            LayoutMode::Hidden,
            LayoutMode::Compact,
            LayoutMode::Compact,
            LayoutMode::Normal,
            LayoutMode::Normal,
            LayoutMode::Full,
            LayoutMode::Full,
        ]
    );
}

#[test]
fn test_footnote_edit_keeps_prefix_and_indents_continuation() {
    let mut doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(footnote_settings());
    render(&mut session, &doc, 1300.0);

    let (_, opened) = session.activate_note(0, &mut doc);
    assert!(opened);
    for ch in "First line".chars() {
        session.handle_key(Key::Char(ch), &mut doc);
    }
    session.handle_key(Key::SoftBreak, &mut doc);
    for ch in "second".chars() {
        session.handle_key(Key::Char(ch), &mut doc);
    }
    let KeyOutcome::Closed(outcome) = session.handle_key(Key::Enter, &mut doc) else {
        panic!("Enter should close the session");
    };
    assert!(outcome.persisted);
    assert!(doc.text().contains("[^bottom]: First line\n    second\n"));
    assert_eq!(
        session.index().definition("bottom").unwrap().text,
        "First line\nsecond"
    );
    assert_eq!(session.take_dirty_regions().len(), 1);
}

#[test]
fn test_inline_edit_then_escape_leaves_source_alone() {
    let mut doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(Settings::default());
    render(&mut session, &doc, 1300.0);

    session.activate_note(2, &mut doc);
    session.handle_key(Key::Char('x'), &mut doc);
    let KeyOutcome::Closed(outcome) = session.handle_key(Key::Escape, &mut doc) else {
        panic!("Escape should close the session");
    };
    assert_eq!(outcome.final_text, "Close by.");
    assert_eq!(doc.text(), ESSAY);
    assert_eq!(doc.version(), 0);
}

#[test]
fn test_rescan_after_external_edit() {
    let mut doc = TextDocument::from_text(ESSAY);
    let mut session = LayoutSession::new(Settings::default());
    assert_eq!(render(&mut session, &doc, 1300.0).notes.len(), 3);

    let insert_at = doc.text().find("so that").unwrap();
    doc.replace_range("<span class=\"sidenote\">Inserted.</span> ", insert_at, insert_at);
    assert!(session.on_document_changed(0));

    let plan = render(&mut session, &doc, 1300.0);
    assert_eq!(plan.notes.len(), 4);
    assert_eq!(plan.notes[1].content, "Inserted.");
    assert_eq!(plan.notes[1].number_label, "2");
}
