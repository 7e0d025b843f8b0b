//! Error types for the BigPDF MCP server

use thiserror::Error;

/// Result type alias for the BigPDF MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the BigPDF MCP server
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// The operation needs an unencrypted document
    #[error("PDF is encrypted: {name}")]
    EncryptedInput { name: String },

    /// Unlock was requested for a document without encryption
    #[error("PDF is not encrypted")]
    NotEncrypted,

    /// PDF is password protected and no password was provided
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Incorrect password provided
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Invalid page range
    #[error("Invalid page range: {range}")]
    InvalidPageRange { range: String },

    /// Invalid page order for arrange
    #[error("Invalid page order: {reason}")]
    InvalidPageOrder { reason: String },

    /// Page out of bounds
    #[error("Page {page} out of bounds (total: {total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// Page deletion would leave an empty document
    #[error("No pages left after deletion")]
    NoPagesLeft,

    /// Rotation must be a quarter turn
    #[error("Invalid rotation angle: {angle}")]
    InvalidRotation { angle: i32 },

    /// A numeric or textual tool argument is out of its accepted domain
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    /// Signature image is missing, unsupported or undecodable
    #[error("Invalid signature image: {reason}")]
    InvalidSignatureImage { reason: String },

    /// Malformed table or page geometry from a collaborator
    #[error("Invalid input geometry: {reason}")]
    InputGeometry { reason: String },

    /// An embedded image could not be extracted or decoded
    #[error("Image decode failed for {image}: {reason}")]
    ImageDecode { image: String, reason: String },

    /// The table detection pass found nothing in the whole document
    #[error("No tables found in the document")]
    NoTablesFound,

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// lopdf error
    #[error("PDF object error: {0}")]
    Lopdf(#[from] lopdf::Error),

    /// Office document writer error
    #[error("Office writer error: {reason}")]
    OfficeWriter { reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Image dimension exceeded
    #[error("Image dimension exceeded: {detail}")]
    ImageDimensionExceeded { detail: String },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::EncryptedInput { name } => {
                format!("{} is encrypted, unlock it first", name)
            }
            Error::NotEncrypted => "PDF is not encrypted".to_string(),
            Error::PasswordRequired => "PDF is password protected".to_string(),
            Error::IncorrectPassword => "Incorrect password".to_string(),
            Error::InvalidPageRange { range } => format!(
                "Invalid page range: {} (use a format like '1, 3, 5-7')",
                range
            ),
            Error::InvalidPageOrder { reason } => format!("Invalid page order: {}", reason),
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} out of bounds (total: {})", page, total)
            }
            Error::NoPagesLeft => "No pages left after deletion".to_string(),
            Error::InvalidRotation { .. } => "Rotation angle must be 90, 180 or 270".to_string(),
            Error::InvalidParameter { reason } => format!("Invalid parameter: {}", reason),
            Error::InvalidSignatureImage { .. } => {
                "Signature image must be a PNG or JPEG file".to_string()
            }
            Error::InputGeometry { .. } => "Invalid table geometry".to_string(),
            Error::ImageDecode { .. } => "Image could not be decoded".to_string(),
            Error::NoTablesFound => "No tables found in this PDF".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve PDF source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Pdfium { .. } => "PDF processing error".to_string(),
            Error::QpdfError { .. } => "PDF processing error".to_string(),
            Error::Lopdf(_) => "PDF processing error".to_string(),
            Error::OfficeWriter { .. } => "Document conversion error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::ImageDimensionExceeded { detail } => {
                format!("Image dimension exceeded: {}", detail)
            }
        }
    }
}
