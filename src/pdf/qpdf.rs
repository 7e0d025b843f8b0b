//! qpdf FFI wrapper for page assembly and encryption
//!
//! Merging, page selection (split, delete, arrange) and password
//! protection go through the qpdf crate (vendored FFI).

use super::range::{parse_page_order, parse_page_range};
use crate::error::{Error, Result};
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// The two halves of a split
#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    /// Selected pages in document order, absent when nothing was selected
    pub extracted: Option<Vec<u8>>,
    /// Every other page, absent when all pages were selected
    pub remaining: Option<Vec<u8>>,
}

/// Helper: open a QPdf from memory, optionally with password
fn open_qpdf(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd).map_err(map_qpdf_error),
        None => QPdf::read_from_memory(data).map_err(map_qpdf_error),
    }
}

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::IncorrectPassword,
        _ => Error::QpdfError {
            reason: e.to_string(),
        },
    }
}

/// Open a document that must not be encrypted; `name` identifies it in the error.
fn open_plain(data: &[u8], name: &str) -> Result<QPdf> {
    let encrypted = || Error::EncryptedInput {
        name: name.to_string(),
    };
    match open_qpdf(data, None) {
        Ok(qpdf) if qpdf.is_encrypted() => Err(encrypted()),
        Ok(qpdf) => Ok(qpdf),
        Err(Error::IncorrectPassword) => Err(encrypted()),
        Err(e) => Err(e),
    }
}

/// Build a document from 1-indexed pages of `source`, in the given order.
fn assemble(source: &QPdf, pages: &[u32]) -> Result<Vec<u8>> {
    let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;
    let dest = QPdf::empty();

    for &page_number in pages {
        let page = page_number
            .checked_sub(1)
            .and_then(|idx| source.get_page(idx))
            .ok_or(Error::PageOutOfBounds {
                page: page_number,
                total: num_pages,
            })?;
        let copied = dest.copy_from_foreign(&page);
        dest.add_page(&copied, false).map_err(map_qpdf_error)?;
    }

    let mut writer = dest.writer();
    writer.preserve_encryption(false);
    writer.write_to_memory().map_err(map_qpdf_error)
}

impl QpdfWrapper {
    /// Fail with [`Error::EncryptedInput`] when the document is encrypted
    pub fn ensure_unencrypted(data: &[u8], name: &str) -> Result<()> {
        open_plain(data, name).map(|_| ())
    }

    /// Merge PDFs in order. Encrypted inputs are rejected by position.
    pub fn merge(inputs: &[&[u8]]) -> Result<Vec<u8>> {
        if inputs.is_empty() {
            return Err(Error::InvalidPdf {
                reason: "No input PDFs provided".to_string(),
            });
        }

        let dest = QPdf::empty();

        for (i, input_data) in inputs.iter().enumerate() {
            let source = open_plain(input_data, &format!("Input {}", i + 1))?;

            let pages = source.get_pages().map_err(|e| Error::QpdfError {
                reason: format!("Failed to get pages from input PDF {}: {}", i + 1, e),
            })?;

            for page in &pages {
                let copied = dest.copy_from_foreign(page);
                dest.add_page(&copied, false).map_err(map_qpdf_error)?;
            }
        }

        dest.writer().write_to_memory().map_err(map_qpdf_error)
    }

    /// Split into the pages named by `range` and the rest.
    pub fn split(input_data: &[u8], range: &str) -> Result<SplitOutput> {
        let source = open_plain(input_data, "PDF")?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;
        let selected = parse_page_range(range, num_pages)?;

        let (extracted, remaining): (Vec<u32>, Vec<u32>) =
            (1..=num_pages).partition(|page| selected.contains(page));

        Ok(SplitOutput {
            extracted: if extracted.is_empty() {
                None
            } else {
                Some(assemble(&source, &extracted)?)
            },
            remaining: if remaining.is_empty() {
                None
            } else {
                Some(assemble(&source, &remaining)?)
            },
        })
    }

    /// Remove the pages named by `range`. At least one page must remain.
    pub fn delete_pages(input_data: &[u8], range: &str) -> Result<Vec<u8>> {
        let source = open_plain(input_data, "PDF")?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;
        let doomed = parse_page_range(range, num_pages)?;

        let kept: Vec<u32> = (1..=num_pages).filter(|page| !doomed.contains(page)).collect();
        if kept.is_empty() {
            return Err(Error::NoPagesLeft);
        }
        assemble(&source, &kept)
    }

    /// Reorder pages. `order` must list every page exactly once.
    pub fn arrange(input_data: &[u8], order: &str) -> Result<Vec<u8>> {
        let source = open_plain(input_data, "PDF")?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;
        let pages = parse_page_order(order, num_pages)?;
        assemble(&source, &pages)
    }

    /// Encrypt a PDF with AES-256 password protection
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes, must not already be encrypted
    /// * `user_password` - Password required to open the PDF
    /// * `owner_password` - Password required to change permissions (if None, same as user_password)
    pub fn encrypt(
        input_data: &[u8],
        user_password: &str,
        owner_password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let qpdf = open_plain(input_data, "PDF")?;

        let owner_pwd = owner_password.unwrap_or(user_password);

        let encryption = EncryptionParams::R6(EncryptionParamsR6 {
            user_password: user_password.to_string(),
            owner_password: owner_pwd.to_string(),
            allow_accessibility: true,
            allow_extract: true,
            allow_assemble: true,
            allow_annotate_and_form: true,
            allow_form_filling: true,
            allow_modify_other: true,
            allow_print: PrintPermission::Full,
            encrypt_metadata: true,
        });

        let mut writer = qpdf.writer();
        writer
            .preserve_encryption(false)
            .encryption_params(encryption);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Remove password protection.
    ///
    /// Fails with [`Error::NotEncrypted`] for plain input and
    /// [`Error::IncorrectPassword`] when the password does not open it.
    pub fn decrypt(input_data: &[u8], password: &str) -> Result<Vec<u8>> {
        match open_qpdf(input_data, None) {
            Ok(qpdf) if !qpdf.is_encrypted() => return Err(Error::NotEncrypted),
            Ok(_) | Err(Error::IncorrectPassword) => {}
            Err(e) => return Err(e),
        }

        let qpdf = open_qpdf(input_data, Some(password))?;
        let mut writer = qpdf.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Get the page count of a PDF
    pub fn get_page_count(input_data: &[u8], password: Option<&str>) -> Result<u32> {
        let qpdf = open_qpdf(input_data, password)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{numbered_pdf, page_labels};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_keeps_input_order() {
        let a = numbered_pdf(2);
        let b = numbered_pdf(1);
        let merged = QpdfWrapper::merge(&[&a, &b]).unwrap();
        assert_eq!(QpdfWrapper::get_page_count(&merged, None).unwrap(), 3);
        assert_eq!(page_labels(&merged), vec!["Page 1", "Page 2", "Page 1"]);
    }

    #[test]
    fn test_merge_requires_inputs() {
        assert!(QpdfWrapper::merge(&[]).is_err());
    }

    #[test]
    fn test_merge_rejects_encrypted_input_by_position() {
        let plain = numbered_pdf(1);
        let locked = QpdfWrapper::encrypt(&plain, "secret", None).unwrap();
        match QpdfWrapper::merge(&[&plain, &locked]) {
            Err(Error::EncryptedInput { name }) => assert_eq!(name, "Input 2"),
            other => panic!("expected EncryptedInput, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_split_partitions_pages() {
        let pdf = numbered_pdf(5);
        let output = QpdfWrapper::split(&pdf, "4, 1-2").unwrap();
        assert_eq!(
            page_labels(&output.extracted.unwrap()),
            vec!["Page 1", "Page 2", "Page 4"]
        );
        assert_eq!(
            page_labels(&output.remaining.unwrap()),
            vec!["Page 3", "Page 5"]
        );
    }

    #[test]
    fn test_split_all_pages_has_no_remainder() {
        let pdf = numbered_pdf(2);
        let output = QpdfWrapper::split(&pdf, "1-2").unwrap();
        assert!(output.extracted.is_some());
        assert!(output.remaining.is_none());
    }

    #[test]
    fn test_delete_pages() {
        let pdf = numbered_pdf(4);
        let output = QpdfWrapper::delete_pages(&pdf, "2-3").unwrap();
        assert_eq!(page_labels(&output), vec!["Page 1", "Page 4"]);
    }

    #[test]
    fn test_delete_every_page_fails() {
        let pdf = numbered_pdf(2);
        assert!(matches!(
            QpdfWrapper::delete_pages(&pdf, "1-2"),
            Err(Error::NoPagesLeft)
        ));
    }

    #[test]
    fn test_arrange_reorders() {
        let pdf = numbered_pdf(3);
        let output = QpdfWrapper::arrange(&pdf, "3,1,2").unwrap();
        assert_eq!(page_labels(&output), vec!["Page 3", "Page 1", "Page 2"]);
    }

    #[test]
    fn test_arrange_rejects_partial_order() {
        let pdf = numbered_pdf(3);
        assert!(matches!(
            QpdfWrapper::arrange(&pdf, "3,1"),
            Err(Error::InvalidPageOrder { .. })
        ));
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let pdf = numbered_pdf(1);
        let locked = QpdfWrapper::encrypt(&pdf, "secret", None).unwrap();

        assert!(matches!(
            QpdfWrapper::ensure_unencrypted(&locked, "PDF"),
            Err(Error::EncryptedInput { .. })
        ));
        assert!(matches!(
            QpdfWrapper::decrypt(&locked, "wrong"),
            Err(Error::IncorrectPassword)
        ));

        let unlocked = QpdfWrapper::decrypt(&locked, "secret").unwrap();
        assert!(QpdfWrapper::ensure_unencrypted(&unlocked, "PDF").is_ok());
        assert_eq!(QpdfWrapper::get_page_count(&unlocked, None).unwrap(), 1);
    }

    #[test]
    fn test_encrypt_rejects_encrypted_input() {
        let pdf = numbered_pdf(1);
        let locked = QpdfWrapper::encrypt(&pdf, "secret", None).unwrap();
        assert!(matches!(
            QpdfWrapper::encrypt(&locked, "again", None),
            Err(Error::EncryptedInput { .. })
        ));
    }

    #[test]
    fn test_decrypt_plain_input_fails() {
        let pdf = numbered_pdf(1);
        assert!(matches!(
            QpdfWrapper::decrypt(&pdf, "anything"),
            Err(Error::NotEncrypted)
        ));
    }
}
