//! Question paper rendering: grid arithmetic, text metrics and the PDF writer.

pub mod layout;
pub mod render;
pub mod text;

pub use layout::{fit_within, CellSlot, GridSpec, PageGeometry, Rect};
pub use render::{PaperRenderer, QuestionPaper, RenderError, RenderedPaper};
