//! Source resolution for tool inputs

use crate::error::{Error, Result};
use crate::pdf::check_pdf_header;
use crate::source::{ArtifactKind, CacheManager};
use base64::Engine;
use std::path::Path;

/// Resolved PDF data
#[derive(Debug)]
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

/// Read a file, mapping a missing path to `PdfNotFound`
pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(std::fs::read(path)?)
}

/// Decode standard base64
pub fn decode_base64(base64_data: &str) -> Result<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;
    Ok(engine.decode(base64_data.trim())?)
}

/// Resolve a file path to PDF data
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();
    let data = read_path(path)?;
    check_pdf_header(&data)?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

/// Resolve base64 encoded data to PDF data
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let data = decode_base64(base64_data)?;
    check_pdf_header(&data)?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Resolve a cache key to PDF data. Only cached PDF outputs qualify.
pub fn resolve_cache(cache_key: &str, cache: &CacheManager) -> Result<ResolvedPdf> {
    let artifact = cache.get(cache_key).ok_or_else(|| Error::CacheKeyNotFound {
        key: cache_key.to_string(),
    })?;

    if artifact.kind != ArtifactKind::Pdf {
        return Err(Error::SourceResolution {
            reason: format!(
                "cache entry {} holds a {} file, not a PDF",
                cache_key,
                artifact.kind.extension()
            ),
        });
    }

    Ok(ResolvedPdf {
        data: artifact.data,
        source_name: format!("<cache:{}>", cache_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Artifact;

    #[test]
    fn test_resolve_base64_invalid() {
        // Valid base64 but not PDF
        let result = resolve_base64("SGVsbG8gV29ybGQ="); // "Hello World"
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_base64_pdf() {
        // "%PDF-1.7"
        let resolved = resolve_base64("JVBERi0xLjc=").unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let resolved = resolve_path(&path).unwrap();
        assert_eq!(resolved.data, b"%PDF-1.4 body");
    }

    #[test]
    fn test_resolve_cache_kinds() {
        let cache = CacheManager::new(4, 1024);
        cache.put("pdf".to_string(), Artifact::pdf(b"%PDF-1.7".to_vec()));
        cache.put(
            "zip".to_string(),
            Artifact::new(ArtifactKind::Zip, b"PK\x03\x04".to_vec()),
        );

        assert_eq!(resolve_cache("pdf", &cache).unwrap().data, b"%PDF-1.7");
        assert!(matches!(
            resolve_cache("zip", &cache),
            Err(Error::SourceResolution { .. })
        ));
        assert!(matches!(
            resolve_cache("missing", &cache),
            Err(Error::CacheKeyNotFound { .. })
        ));
    }
}
