//! PDF processing layer
//!
//! Page assembly and encryption through qpdf, rendering and text through
//! PDFium, and page stamping through lopdf.

pub(crate) mod objects;
mod qpdf;
mod range;
mod reader;
mod stamp;

pub use qpdf::{QpdfWrapper, SplitOutput};
pub use range::{parse_page_order, parse_page_range};
pub use reader::{check_pdf_header, render_pages, PdfReader, RenderOptions, RenderedPage};
pub use stamp::{
    add_signature, add_watermark, rotate_all, rotate_pages, SignaturePlacement,
    WATERMARK_ANGLE, WATERMARK_FONT_SIZE, WATERMARK_OPACITY,
};
