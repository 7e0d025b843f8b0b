//! Office document writers
//!
//! Word, PowerPoint and Excel packages plus plain ZIP bundles, all built in
//! memory.

pub mod archive;
mod docx;
mod pptx;
mod xlsx;

pub use archive::{bundle, ZipBuilder};
pub use docx::pages_to_docx;
pub use pptx::{fit_to_slide, pages_to_pptx, Frame, SLIDE_HEIGHT, SLIDE_WIDTH};
pub use xlsx::{Workbook, Worksheet};
