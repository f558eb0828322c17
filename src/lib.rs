// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. markers::MarkerKind)
    clippy::module_name_repetitions
)]

//! # Sidenotes
//!
//! A layout and synchronization engine for margin notes in a markdown
//! editor.
//!
//! Annotations live in the document source either as inline
//! `<span class="sidenote">` tags or as `[^id]` footnote references. The
//! engine finds them, places their notes in a side column that adapts to
//! the container width, keeps stacked notes from overlapping, and writes
//! in-place edits back to the source.
//!
//! ## Modules
//!
//! - [`config`]: Persisted settings and their validation
//! - [`host`]: The host document trait and a rope-backed implementation
//! - [`markers`]: Marker scanning and numbering
//! - [`sync`]: Anchor resolution and write-back
//! - [`layout`]: Margin geometry and collision resolution
//! - [`edit`]: In-place note editing
//! - [`scheduler`]: Debounce, throttle and frame deferral
//! - [`session`]: Per-document state tying the above together
//! - [`headless`]: Anchor synthesis without a renderer
//! - [`watcher`]: File watching
//! - [`perf`]: Timing and the layout debug log

pub mod config;
pub mod edit;
pub mod headless;
pub mod host;
pub mod layout;
pub mod markers;
pub mod perf;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AnchorMode, AnnotationFormat, MarginSide, Settings};
    pub use crate::host::{HostDocument, TextDocument};
    pub use crate::layout::{ContainerGeometry, LayoutMode, LayoutPlan, MarginNote};
    pub use crate::markers::{Marker, MarkerIndex, MarkerKind};
    pub use crate::session::LayoutSession;
    pub use crate::sync::{RenderedAnchor, SourceSynchronizer};
}
