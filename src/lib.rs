//! PDF conversion MCP Server Library
//!
//! MCP tools for everyday PDF work:
//! - page assembly: `merge_pdfs`, `split_pdf`, `delete_pages`, `arrange_pages`, `rotate_pdf`
//! - security: `protect_pdf`, `unprotect_pdf`
//! - stamping: `add_watermark`, `add_signature`
//! - conversion: `pdf_to_word`, `pdf_to_images`, `pdf_to_powerpoint`, `pdf_to_excel`
//!
//! `pdf_to_excel` places images drawn inside empty table cells into the
//! matching spreadsheet cells; see [`reconcile`].

pub mod error;
pub mod office;
pub mod pdf;
pub mod reconcile;
pub mod scratch;
pub mod server;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use server::{
    run_server, run_server_with_config, run_server_with_dirs, PdfServer, PdfSource, ServerConfig,
};
