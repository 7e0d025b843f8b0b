//! MCP Server implementation using rmcp

use crate::error::Error;
use crate::office::{bundle, pages_to_docx, pages_to_pptx, Workbook, ZipBuilder};
use crate::pdf::{
    add_signature, add_watermark, render_pages, rotate_all, rotate_pages, PdfReader, QpdfWrapper,
    RenderOptions, SignaturePlacement, SplitOutput,
};
use crate::reconcile::{
    reconcile_document, sheet_name, DetectedTable, PdfImageSource, PlacementPolicy, SheetWriter,
    TableReport, WriterInstruction,
};
use crate::scratch::{write_atomic, ScratchDir};
use crate::source::{
    decode_base64, read_path, resolve_base64, resolve_cache, resolve_path, Artifact, ArtifactKind,
    CacheManager, ResolvedPdf,
};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// PDF source specification
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF upload
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// Output of an earlier tool call
    CacheRef {
        /// Cache key returned as `output_cache_key`
        cache_key: String,
    },
}

const SOURCE_KEYS: &str = "\"path\", \"base64\", or \"cache_key\"";

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            let kind = match &value {
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Null => "null",
                serde_json::Value::Object(_) => "an object",
            };
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of {}, but got {}",
                SOURCE_KEYS, kind
            )));
        };

        let string_field = |key: &str| -> std::result::Result<Option<String>, D::Error> {
            match obj.get(key) {
                None => Ok(None),
                Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                ))),
            }
        };

        if let Some(path) = string_field("path")? {
            return Ok(PdfSource::Path { path });
        }
        if let Some(base64) = string_field("base64")? {
            return Ok(PdfSource::Base64 { base64 });
        }
        if let Some(cache_key) = string_field("cache_key")? {
            return Ok(PdfSource::CacheRef { cache_key });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of {}, but got keys: {:?}",
            SOURCE_KEYS, keys
        )))
    }
}

/// Signature image specification
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum ImageSource {
    /// PNG or JPEG file path
    Path { path: String },
    /// Base64 encoded PNG or JPEG
    Base64 { base64: String },
}

/// Security and resource configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories that file paths must stay inside. Empty allows any path.
    pub resource_dirs: Vec<String>,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
    /// Resolution for image and slide conversion (default: 200)
    pub render_dpi: u32,
    /// Maximum pixel area of one rendered page (default: 100_000_000)
    pub max_image_pixels: u64,
    /// Size policy for images placed into spreadsheet cells
    pub placement: PlacementPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            cache_max_bytes: 512 * 1024 * 1024, // 512MB
            cache_max_entries: 100,
            render_dpi: 200,
            max_image_pixels: 100_000_000,
            placement: PlacementPolicy::default(),
        }
    }
}

/// PDF conversion MCP Server
#[derive(Clone)]
pub struct PdfServer {
    cache: Arc<CacheManager>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Shared result types
// ============================================================================

/// Result of a tool that produces a PDF
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct PdfOutputResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the output PDF, for chaining with other tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Path where the PDF was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PdfOutputResult {
    fn failed(source: String, error: &Error) -> Self {
        Self {
            source,
            error: Some(error.client_message()),
            ..Self::default()
        }
    }
}

/// Result of a conversion to another document format
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ConversionResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the converted file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Media type of the converted file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Size of the converted file in bytes
    pub output_size: usize,
    /// Number of PDF pages converted
    pub page_count: u32,
    /// Path where the file was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionResult {
    fn failed(source: String, error: &Error) -> Self {
        Self {
            source,
            error: Some(error.client_message()),
            ..Self::default()
        }
    }
}

fn respond<T: Serialize>(result: T) -> String {
    let response = serde_json::json!({ "results": [result] });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

// ============================================================================
// Request/Response types for merge_pdfs
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergePdfsParams {
    /// PDF sources to merge, in order
    pub sources: Vec<PdfSource>,
    /// Output file path (optional). If provided, saves the merged PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct MergePdfsResult {
    /// Number of source PDFs merged
    pub source_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Total pages in output PDF
    pub output_page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for split_pdf
// ============================================================================

const EXTRACTED_ENTRY: &str = "extracted_pages.pdf";
const REMAINING_ENTRY: &str = "remaining_pages.pdf";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SplitPdfParams {
    /// Source PDF to split
    pub source: PdfSource,
    /// Pages to extract, e.g. "1, 3, 5-7" (1-indexed)
    pub pages: String,
    /// Output ZIP path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct SplitPdfResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the output ZIP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// PDFs inside the ZIP
    pub files: Vec<String>,
    pub extracted_page_count: u32,
    pub remaining_page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request types for page editing tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeletePagesParams {
    /// Source PDF
    pub source: PdfSource,
    /// Pages to delete, e.g. "2, 4-6" (1-indexed)
    pub pages: String,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ArrangePagesParams {
    /// Source PDF
    pub source: PdfSource,
    /// New page order as comma-separated 1-indexed page numbers, e.g. "3,1,2".
    /// Must list every page exactly once.
    pub order: String,
    /// Extra clockwise rotation per page, keyed by original page number
    #[serde(default)]
    pub rotations: BTreeMap<u32, i32>,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RotatePdfParams {
    /// Source PDF
    pub source: PdfSource,
    /// Clockwise rotation: 90, 180 or 270
    pub angle: i32,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProtectPdfParams {
    /// Source PDF to protect (must not be encrypted)
    pub source: PdfSource,
    /// User password (required to open the PDF)
    pub user_password: String,
    /// Owner password. If not set, same as user_password.
    #[serde(default)]
    pub owner_password: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnprotectPdfParams {
    /// Encrypted source PDF
    pub source: PdfSource,
    /// Password for the encrypted PDF
    pub password: String,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddWatermarkParams {
    /// Source PDF
    pub source: PdfSource,
    /// Watermark text
    pub text: String,
    #[serde(default)]
    pub output_path: Option<String>,
}

fn default_signature_page() -> u32 {
    SignaturePlacement::default().page
}

fn default_signature_x() -> f64 {
    SignaturePlacement::default().x
}

fn default_signature_y() -> f64 {
    SignaturePlacement::default().y
}

fn default_signature_width() -> f64 {
    SignaturePlacement::default().width
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddSignatureParams {
    /// Source PDF
    pub source: PdfSource,
    /// Signature image (PNG or JPEG)
    pub image: ImageSource,
    /// Page to stamp (1-indexed, default: 1)
    #[serde(default = "default_signature_page")]
    pub page: u32,
    /// Left edge in points from the left of the page (default: 50)
    #[serde(default = "default_signature_x")]
    pub x: f64,
    /// Bottom edge in points from the bottom of the page (default: 50)
    #[serde(default = "default_signature_y")]
    pub y: f64,
    /// Width in points; height follows the image's aspect ratio (default: 150)
    #[serde(default = "default_signature_width")]
    pub width: f64,
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Request/Response types for conversions
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertParams {
    /// Source PDF
    pub source: PdfSource,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToExcelParams {
    /// Source PDF
    pub source: PdfSource,
    /// Tables found by table detection, in sheet order. Each table names its
    /// 1-indexed page and a grid of cells with text and a bounding box
    /// `[x1, y1, x2, y2]` in PDF points measured from the bottom of the page.
    pub tables: Vec<DetectedTable>,
    /// Output .xlsx path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct PdfToExcelResult {
    /// Source identifier
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Size of the workbook in bytes
    pub output_size: usize,
    /// One entry per sheet
    pub tables: Vec<TableReport>,
    /// Images placed across all sheets
    pub images_placed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where a tool output ended up
struct StoredOutput {
    cache_key: Option<String>,
    path: Option<String>,
    size: usize,
}

/// Run CPU-bound PDF work off the async runtime
async fn blocking<T, F>(task: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Pdfium {
            reason: format!("Task join error: {}", e),
        })?
}

/// Fill one sheet per table with cell text, then apply image placements.
fn build_workbook(
    tables: &[DetectedTable],
    instructions: Vec<WriterInstruction>,
) -> crate::error::Result<Workbook> {
    let mut workbook = Workbook::new();
    for (index, table) in tables.iter().enumerate() {
        let sheet = workbook.add_sheet(&sheet_name(index))?;
        for (row, cells) in table.rows.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                sheet.write_text(row as u32, col as u32, cell.text.trim());
            }
        }
    }
    for instruction in instructions {
        workbook.apply(instruction)?;
    }
    Ok(workbook)
}

const SOURCE_FORMAT: &str = "Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}";

#[tool_router]
impl PdfServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new PdfServer restricted to the given directories
    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    /// Create a new PdfServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let cache = CacheManager::new(config.cache_max_entries, config.cache_max_bytes);
        Self {
            cache: Arc::new(cache),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Merge multiple PDFs into one
    #[tool(
        description = "Merge PDF files into a single PDF, in the order given. Encrypted inputs are rejected. The output is always cached (output_cache_key) for chaining with other tools.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn merge_pdfs(&self, Parameters(params): Parameters<MergePdfsParams>) -> String {
        let result = self.process_merge_pdfs(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "merge_pdfs failed");
            MergePdfsResult {
                source_count: params.sources.len() as u32,
                error: Some(e.client_message()),
                ..MergePdfsResult::default()
            }
        });
        respond(result)
    }

    /// Split a PDF into selected and remaining pages
    #[tool(
        description = "Split a PDF into two PDFs packed in a ZIP: extracted_pages.pdf holds the selected pages, remaining_pages.pdf the rest. Either file is left out when it would have no pages.

Page range syntax: comma-separated page numbers or ranges, e.g. \"1, 3, 5-7\" (1-indexed).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn split_pdf(&self, Parameters(params): Parameters<SplitPdfParams>) -> String {
        let result = self.process_split_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "split_pdf failed");
            SplitPdfResult {
                source: Self::source_name(&params.source),
                error: Some(e.client_message()),
                ..SplitPdfResult::default()
            }
        });
        respond(result)
    }

    /// Delete pages from a PDF
    #[tool(
        description = "Delete pages from a PDF. Pages use the same syntax as split_pdf, e.g. \"2, 4-6\". At least one page must remain.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn delete_pages(&self, Parameters(params): Parameters<DeletePagesParams>) -> String {
        let result = self.process_delete_pages(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "delete_pages failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Reorder and rotate pages
    #[tool(
        description = "Reorder the pages of a PDF. `order` lists every page exactly once, e.g. \"3,1,2\". Optional `rotations` maps an original page number to a clockwise angle in multiples of 90, e.g. {\"2\": 90}.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn arrange_pages(&self, Parameters(params): Parameters<ArrangePagesParams>) -> String {
        let result = self.process_arrange_pages(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "arrange_pages failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Rotate all pages
    #[tool(
        description = "Rotate every page of a PDF clockwise by 90, 180 or 270 degrees. The rotation adds to any rotation the pages already have.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn rotate_pdf(&self, Parameters(params): Parameters<RotatePdfParams>) -> String {
        let result = self.process_rotate_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "rotate_pdf failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Add password protection to a PDF
    #[tool(
        description = "Lock a PDF with a password using 256-bit AES encryption. Already encrypted PDFs are rejected.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn protect_pdf(&self, Parameters(params): Parameters<ProtectPdfParams>) -> String {
        let result = self.process_protect_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "protect_pdf failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Remove password protection from a PDF
    #[tool(
        description = "Unlock an encrypted PDF with its password and return an unencrypted copy. Fails if the PDF is not encrypted or the password is wrong.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn unprotect_pdf(&self, Parameters(params): Parameters<UnprotectPdfParams>) -> String {
        let result = self.process_unprotect_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unprotect_pdf failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Stamp a text watermark on every page
    #[tool(
        description = "Add a diagonal text watermark to every page: 50pt Helvetica at 30% opacity, rotated 45 degrees about the page centre.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn add_watermark(&self, Parameters(params): Parameters<AddWatermarkParams>) -> String {
        let result = self.process_add_watermark(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "add_watermark failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Stamp a signature image on one page
    #[tool(
        description = "Place a PNG or JPEG signature image on a page. `x` and `y` give the image's bottom-left corner in points from the bottom-left of the page, `width` its width in points; the height follows the image's aspect ratio. Transparency is kept. Defaults: page 1, x 50, y 50, width 150.

Image format: {\"path\": \"/absolute/path.png\"} or {\"base64\": \"...\"}.
Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn add_signature(&self, Parameters(params): Parameters<AddSignatureParams>) -> String {
        let result = self.process_add_signature(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "add_signature failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Convert to Word
    #[tool(
        description = "Convert a PDF to a Word document (.docx) containing the text of each page, one paragraph per line and a page break between pages. Layout, fonts and images are not preserved.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_word(&self, Parameters(params): Parameters<ConvertParams>) -> String {
        let result = self.process_pdf_to_word(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pdf_to_word failed");
            ConversionResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Convert to page images
    #[tool(
        description = "Render every page of a PDF to PNG and return them in a ZIP as page_1.png, page_2.png, and so on.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_images(&self, Parameters(params): Parameters<ConvertParams>) -> String {
        let result = self.process_pdf_to_images(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pdf_to_images failed");
            ConversionResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Convert to PowerPoint
    #[tool(
        description = "Convert a PDF to a PowerPoint presentation (.pptx) with one slide per page. Each page is rendered as an image scaled to the slide height and centred.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_powerpoint(&self, Parameters(params): Parameters<ConvertParams>) -> String {
        let result = self.process_pdf_to_powerpoint(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pdf_to_powerpoint failed");
            ConversionResult::failed(Self::source_name(&params.source), &e)
        });
        respond(result)
    }

    /// Convert detected tables to Excel
    #[tool(
        description = "Convert tables in a PDF to an Excel workbook (.xlsx), one sheet per table named \"Table 1\", \"Table 2\", and so on. Cell text is written into the grid, and images drawn on the page inside empty cells are embedded in those cells.

`tables` comes from table detection: for each table its 1-indexed `page` and `rows`, a grid of cells `{\"text\": \"...\", \"bbox\": [x1, y1, x2, y2]}` with coordinates in PDF user space (points, y grows upward, same space as the page MediaBox).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_excel(&self, Parameters(params): Parameters<PdfToExcelParams>) -> String {
        let result = self.process_pdf_to_excel(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pdf_to_excel failed");
            PdfToExcelResult {
                source: Self::source_name(&params.source),
                error: Some(e.client_message()),
                ..PdfToExcelResult::default()
            }
        });
        respond(result)
    }
}

impl PdfServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedPdf> {
        match source {
            PdfSource::Path { path } => {
                self.validate_path_access(path)?;
                resolve_path(path)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64),
            PdfSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache),
        }
    }

    fn resolve_image(&self, image: &ImageSource) -> crate::error::Result<Vec<u8>> {
        match image {
            ImageSource::Path { path } => {
                self.validate_path_access(path)?;
                read_path(path)
            }
            ImageSource::Base64 { base64 } => decode_base64(base64),
        }
    }

    fn is_inside_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|canonical_dir| canonical.starts_with(canonical_dir))
                .unwrap_or(false)
        })
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
        if self.is_inside_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let path_obj = Path::new(path);
        let file_name = path_obj.file_name().ok_or_else(denied)?;
        let parent = match path_obj.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let canonical_target = std::fs::canonicalize(parent)
            .map_err(|_| denied())?
            .join(file_name);

        if self.is_inside_resource_dirs(&canonical_target) {
            Ok(canonical_target)
        } else {
            Err(denied())
        }
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        let target = self.validate_output_path_access(path_str)?;
        write_atomic(&target, data)?;
        Ok(Some(path_str.clone()))
    }

    /// Cache a tool output and save it to `output_path` when given.
    fn store_output(
        &self,
        kind: ArtifactKind,
        data: Vec<u8>,
        output_path: &Option<String>,
    ) -> crate::error::Result<StoredOutput> {
        let path = self.write_output(output_path, &data)?;
        let size = data.len();

        let key = self.cache.generate_unique_key();
        let cache_key = if self.cache.put(key.clone(), Artifact::new(kind, data)) {
            Some(key)
        } else {
            tracing::warn!(bytes = size, kind = kind.extension(), "output too large to cache");
            None
        };

        Ok(StoredOutput {
            cache_key,
            path,
            size,
        })
    }

    /// Store a PDF output and count its pages
    fn finish_pdf(
        &self,
        source: String,
        output: Vec<u8>,
        page_count: u32,
        output_path: &Option<String>,
    ) -> crate::error::Result<PdfOutputResult> {
        let stored = self.store_output(ArtifactKind::Pdf, output, output_path)?;
        Ok(PdfOutputResult {
            source,
            output_cache_key: stored.cache_key,
            output_page_count: page_count,
            output_path: stored.path,
            error: None,
        })
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.config.render_dpi,
            max_pixels: self.config.max_image_pixels,
        }
    }

    async fn process_merge_pdfs(
        &self,
        params: &MergePdfsParams,
    ) -> crate::error::Result<MergePdfsResult> {
        if params.sources.is_empty() {
            return Err(Error::InvalidParameter {
                reason: "at least one PDF is required".to_string(),
            });
        }

        let mut inputs: Vec<Vec<u8>> = Vec::with_capacity(params.sources.len());
        for source in &params.sources {
            inputs.push(self.resolve_source(source)?.data);
        }

        let (output, page_count) = blocking(move || {
            let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
            let output = QpdfWrapper::merge(&refs)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        let stored = self.store_output(ArtifactKind::Pdf, output, &params.output_path)?;
        tracing::info!(sources = params.sources.len(), pages = page_count, "PDFs merged");

        Ok(MergePdfsResult {
            source_count: params.sources.len() as u32,
            output_cache_key: stored.cache_key,
            output_page_count: page_count,
            output_path: stored.path,
            error: None,
        })
    }

    async fn process_split_pdf(
        &self,
        params: &SplitPdfParams,
    ) -> crate::error::Result<SplitPdfResult> {
        let resolved = self.resolve_source(&params.source)?;
        let source_name = resolved.source_name;
        let data = resolved.data;
        let pages = params.pages.clone();

        let (archive, files, extracted_count, remaining_count) = blocking(move || {
            let SplitOutput {
                extracted,
                remaining,
            } = QpdfWrapper::split(&data, &pages)?;

            let count = |part: &Option<Vec<u8>>| -> crate::error::Result<u32> {
                part.as_deref()
                    .map_or(Ok(0), |pdf| QpdfWrapper::get_page_count(pdf, None))
            };
            let extracted_count = count(&extracted)?;
            let remaining_count = count(&remaining)?;

            let entries: Vec<(&str, &[u8])> = [
                (EXTRACTED_ENTRY, extracted.as_deref()),
                (REMAINING_ENTRY, remaining.as_deref()),
            ]
            .into_iter()
            .filter_map(|(name, part)| part.map(|pdf| (name, pdf)))
            .collect();
            let files: Vec<String> = entries.iter().map(|(name, _)| name.to_string()).collect();
            let archive = bundle(entries)?;
            Ok((archive, files, extracted_count, remaining_count))
        })
        .await?;

        let stored = self.store_output(ArtifactKind::Zip, archive, &params.output_path)?;

        Ok(SplitPdfResult {
            source: source_name,
            output_cache_key: stored.cache_key,
            files,
            extracted_page_count: extracted_count,
            remaining_page_count: remaining_count,
            output_path: stored.path,
            error: None,
        })
    }

    async fn process_delete_pages(
        &self,
        params: &DeletePagesParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let pages = params.pages.clone();

        let (output, page_count) = blocking(move || {
            let output = QpdfWrapper::delete_pages(&data, &pages)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_arrange_pages(
        &self,
        params: &ArrangePagesParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let order = params.order.clone();
        let rotations = params.rotations.clone();

        let (output, page_count) = blocking(move || {
            // Rotations are keyed by original page number, so they go first
            let data = if rotations.is_empty() {
                data
            } else {
                QpdfWrapper::ensure_unencrypted(&data, "PDF")?;
                rotate_pages(&data, &rotations)?
            };
            let output = QpdfWrapper::arrange(&data, &order)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_rotate_pdf(
        &self,
        params: &RotatePdfParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let angle = params.angle;

        let (output, page_count) = blocking(move || {
            QpdfWrapper::ensure_unencrypted(&data, "PDF")?;
            let output = rotate_all(&data, angle)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_protect_pdf(
        &self,
        params: &ProtectPdfParams,
    ) -> crate::error::Result<PdfOutputResult> {
        if params.user_password.is_empty() {
            return Err(Error::InvalidParameter {
                reason: "user_password must not be empty".to_string(),
            });
        }
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let user_password = params.user_password.clone();
        let owner_password = params.owner_password.clone();

        let (output, page_count) = blocking(move || {
            let output = QpdfWrapper::encrypt(&data, &user_password, owner_password.as_deref())?;
            let page_count = QpdfWrapper::get_page_count(&output, Some(&user_password))?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_unprotect_pdf(
        &self,
        params: &UnprotectPdfParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let password = params.password.clone();

        let (output, page_count) = blocking(move || {
            let output = QpdfWrapper::decrypt(&data, &password)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_add_watermark(
        &self,
        params: &AddWatermarkParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let text = params.text.clone();

        let (output, page_count) = blocking(move || {
            QpdfWrapper::ensure_unencrypted(&data, "PDF")?;
            let output = add_watermark(&data, &text)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_add_signature(
        &self,
        params: &AddSignatureParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source)?;
        let image = self.resolve_image(&params.image)?;
        let data = resolved.data;
        let placement = SignaturePlacement {
            page: params.page,
            x: params.x,
            y: params.y,
            width: params.width,
        };

        let (output, page_count) = blocking(move || {
            QpdfWrapper::ensure_unencrypted(&data, "PDF")?;
            let output = add_signature(&data, &image, &placement)?;
            let page_count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, page_count))
        })
        .await?;

        self.finish_pdf(resolved.source_name, output, page_count, &params.output_path)
    }

    async fn process_pdf_to_word(
        &self,
        params: &ConvertParams,
    ) -> crate::error::Result<ConversionResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let password = params.password.clone();

        let (docx, page_count) = blocking(move || {
            let reader = PdfReader::open_bytes(&data, password.as_deref())?;
            let docx = pages_to_docx(reader.page_texts())?;
            Ok((docx, reader.page_count()))
        })
        .await?;

        self.finish_conversion(
            resolved.source_name,
            ArtifactKind::Docx,
            docx,
            page_count,
            &params.output_path,
        )
    }

    async fn process_pdf_to_images(
        &self,
        params: &ConvertParams,
    ) -> crate::error::Result<ConversionResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let password = params.password.clone();
        let options = self.render_options();

        let (archive, page_count) = blocking(move || {
            let pages = render_pages(&data, password.as_deref(), options)?;

            // Page images are staged on disk and removed with the directory
            let scratch = ScratchDir::new()?;
            let mut zip = ZipBuilder::new();
            for page in &pages {
                let path = scratch.write(&format!("page_{}.png", page.page), &page.png)?;
                zip.add_file(&path)?;
            }
            Ok((zip.finish()?, pages.len() as u32))
        })
        .await?;

        self.finish_conversion(
            resolved.source_name,
            ArtifactKind::Zip,
            archive,
            page_count,
            &params.output_path,
        )
    }

    async fn process_pdf_to_powerpoint(
        &self,
        params: &ConvertParams,
    ) -> crate::error::Result<ConversionResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let password = params.password.clone();
        let options = self.render_options();

        let (pptx, page_count) = blocking(move || {
            let pages = render_pages(&data, password.as_deref(), options)?;
            Ok((pages_to_pptx(&pages)?, pages.len() as u32))
        })
        .await?;

        self.finish_conversion(
            resolved.source_name,
            ArtifactKind::Pptx,
            pptx,
            page_count,
            &params.output_path,
        )
    }

    fn finish_conversion(
        &self,
        source: String,
        kind: ArtifactKind,
        output: Vec<u8>,
        page_count: u32,
        output_path: &Option<String>,
    ) -> crate::error::Result<ConversionResult> {
        let stored = self.store_output(kind, output, output_path)?;
        tracing::info!(
            source = %source,
            format = kind.extension(),
            bytes = stored.size,
            "PDF converted"
        );
        Ok(ConversionResult {
            source,
            output_cache_key: stored.cache_key,
            media_type: Some(kind.media_type().to_string()),
            output_size: stored.size,
            page_count,
            output_path: stored.path,
            error: None,
        })
    }

    async fn process_pdf_to_excel(
        &self,
        params: &PdfToExcelParams,
    ) -> crate::error::Result<PdfToExcelResult> {
        let resolved = self.resolve_source(&params.source)?;
        let data = resolved.data;
        let tables = params.tables.clone();
        let policy = self.config.placement;

        let (workbook, reports, images_placed) = blocking(move || {
            let source = PdfImageSource::load(&data)?;
            let reconciliation = reconcile_document(&source, &tables, &policy)?;
            let images_placed = reconciliation.images_placed();
            let workbook = build_workbook(&tables, reconciliation.instructions)?;
            Ok((workbook.to_bytes()?, reconciliation.tables, images_placed))
        })
        .await?;

        let stored = self.store_output(ArtifactKind::Xlsx, workbook, &params.output_path)?;
        tracing::info!(
            source = %resolved.source_name,
            sheets = reports.len(),
            images = images_placed,
            "PDF tables converted"
        );

        Ok(PdfToExcelResult {
            source: resolved.source_name,
            output_cache_key: stored.cache_key,
            output_size: stored.size,
            tables: reports,
            images_placed,
            output_path: stored.path,
            error: None,
        })
    }
}

impl Default for PdfServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF conversion server: merge, split, reorder, rotate, lock, unlock, watermark \
                 and sign PDFs, and convert them to Word, images, PowerPoint or Excel. Every \
                 output is cached and can be passed to another tool as {\"cache_key\": ...}."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server without path restrictions
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with file access limited to the given directories
pub async fn run_server_with_dirs(resource_dirs: Vec<String>) -> Result<()> {
    run_server_with_config(ServerConfig {
        resource_dirs,
        ..ServerConfig::default()
    })
    .await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        resource_dirs = config.resource_dirs.len(),
        dpi = config.render_dpi,
        "PDF conversion server ready, waiting for connections..."
    );
    let server = PdfServer::with_config(config);

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
