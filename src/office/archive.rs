//! In-memory ZIP packaging
//!
//! Used directly for bundles (split results, page images) and as the
//! container for the OOXML packages.

use crate::error::{Error, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn zip_error(err: zip::result::ZipError) -> Error {
    Error::OfficeWriter {
        reason: format!("ZIP packaging failed: {}", err),
    }
}

/// ZIP archive assembled in memory
pub struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    entries: usize,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.writer.start_file(name, self.options).map_err(zip_error)?;
        self.writer.write_all(data)?;
        self.entries += 1;
        Ok(())
    }

    /// Add a file from disk under its own file name
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::OfficeWriter {
                reason: format!("unusable file name: {}", path.display()),
            })?;
        let data = std::fs::read(path)?;
        self.add(name, &data)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.writer.finish().map_err(zip_error)?;
        Ok(cursor.into_inner())
    }
}

impl Default for ZipBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack named entries in the given order
pub fn bundle<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut builder = ZipBuilder::new();
    for (name, data) in entries {
        builder.add(name, data)?;
    }
    builder.finish()
}

/// Escape text for XML element content and attribute values
pub(crate) fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // Control characters other than tab and newlines are invalid in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => escaped.push(c),
        }
    }
    escaped
}
