//! PDF reader wrapper for PDFium
//!
//! Page text for Word conversion and page rasters for image and slide
//! conversion.

use crate::error::{Error, Result};
use pdfium_render::prelude::*;
use std::io::Cursor;

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    // Try to bind to system library or use static linking
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Map PDFium errors to our error type
fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

/// Reject bytes that do not start with a PDF header
pub fn check_pdf_header(data: &[u8]) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

/// One rasterised page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page number (1-indexed)
    pub page: u32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// PNG bytes
    pub png: Vec<u8>,
}

/// Raster settings
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub dpi: u32,
    /// Largest allowed `width * height` of one rendered page, in pixels
    pub max_pixels: u64,
}

/// Text of every page, lines separated by `\n`
#[derive(Debug, Clone)]
pub struct PdfReader {
    page_texts: Vec<String>,
}

impl PdfReader {
    /// Open a PDF from bytes and extract the text of every page
    pub fn open_bytes(data: &[u8], password: Option<&str>) -> Result<Self> {
        check_pdf_header(data)?;

        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, password)
            .map_err(map_pdfium_error)?;

        let pages = document.pages();
        let mut page_texts = Vec::with_capacity(pages.len() as usize);
        for (index, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| Error::Pdfium {
                reason: format!("Failed to read text of page {}: {}", index + 1, e),
            })?;
            page_texts.push(normalize_lines(&text.all()));
        }

        Ok(Self { page_texts })
    }

    /// Get the number of pages
    pub fn page_count(&self) -> u32 {
        self.page_texts.len() as u32
    }

    /// Extract text from a specific page (1-indexed)
    pub fn page_text(&self, page_num: u32) -> Result<&str> {
        if page_num < 1 || page_num > self.page_count() {
            return Err(Error::PageOutOfBounds {
                page: page_num,
                total: self.page_count(),
            });
        }
        Ok(&self.page_texts[(page_num - 1) as usize])
    }

    /// Text of every page in order
    pub fn page_texts(&self) -> &[String] {
        &self.page_texts
    }
}

/// Unify line endings and drop trailing whitespace on each line.
fn normalize_lines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Pixel size of a page rendered at `dpi`.
fn raster_size(width_pt: f32, height_pt: f32, dpi: u32) -> (u64, u64) {
    let scale = dpi as f64 / 72.0;
    (
        (width_pt as f64 * scale).round().max(1.0) as u64,
        (height_pt as f64 * scale).round().max(1.0) as u64,
    )
}

/// Render every page as PNG
pub fn render_pages(
    data: &[u8],
    password: Option<&str>,
    options: RenderOptions,
) -> Result<Vec<RenderedPage>> {
    check_pdf_header(data)?;
    if options.dpi == 0 {
        return Err(Error::ImageDimensionExceeded {
            detail: "dpi must be positive".to_string(),
        });
    }

    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, password)
        .map_err(map_pdfium_error)?;

    let scale = options.dpi as f32 / 72.0;
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .render_form_data(true)
        .render_annotations(true);

    let mut rendered = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_num = index as u32 + 1;

        let (px_width, px_height) = raster_size(page.width().value, page.height().value, options.dpi);
        if px_width * px_height > options.max_pixels {
            return Err(Error::ImageDimensionExceeded {
                detail: format!(
                    "page {} would render at {}x{} pixels (limit {} pixels)",
                    page_num, px_width, px_height, options.max_pixels
                ),
            });
        }

        let bitmap = page.render_with_config(&config).map_err(|e| Error::Pdfium {
            reason: format!("Failed to render page {}: {}", page_num, e),
        })?;

        let dynamic_image = bitmap.as_image();
        let mut png = Vec::new();
        dynamic_image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to encode page {} as PNG: {}", page_num, e),
            })?;

        rendered.push(RenderedPage {
            page: page_num,
            width: dynamic_image.width(),
            height: dynamic_image.height(),
            png,
        });
    }

    tracing::debug!(pages = rendered.len(), dpi = options.dpi, "pages rendered");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pdf_detection() {
        let result = PdfReader::open_bytes(b"not a pdf", None);
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }

    #[test]
    fn test_render_rejects_non_pdf() {
        let options = RenderOptions {
            dpi: 200,
            max_pixels: 1_000_000,
        };
        assert!(matches!(
            render_pages(b"GIF89a", None, options),
            Err(Error::InvalidPdf { .. })
        ));
    }

    #[test]
    fn test_raster_size_at_200_dpi() {
        // US letter at 200 dpi
        assert_eq!(raster_size(612.0, 792.0, 200), (1700, 2200));
        assert_eq!(raster_size(612.0, 792.0, 72), (612, 792));
    }

    #[test]
    fn test_normalize_lines() {
        assert_eq!(normalize_lines("a  \r\nb\rc\n\n"), "a\nb\nc");
        assert_eq!(normalize_lines(""), "");
    }
}
