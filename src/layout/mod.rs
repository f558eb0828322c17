//! Margin geometry.
//!
//! - [`position`]: layout mode, margin width and horizontal offset
//! - [`collision`]: vertical stacking of notes
//! - [`measure`]: headless note height estimates
//! - [`note`]: margin note values and the plan handed to the host

pub mod collision;
pub mod measure;
pub mod note;
pub mod position;

pub use collision::{StackItem, resolve_collisions};
pub use measure::{TextMetrics, estimate_height};
pub use note::{LayoutPlan, MarginNote};
pub use position::{ContainerGeometry, LayoutMode, MarginPlacement, line_offset, place};
