//! Word export: page text only, no layout

use crate::error::{Error, Result};
use docx_rs::{BreakType, Docx, Paragraph, Run};
use std::io::Cursor;

/// Build a `.docx` from the text of each page.
///
/// Every line becomes a paragraph; a page break separates consecutive pages.
/// Blank pages still produce their page break.
pub fn pages_to_docx(pages: &[String]) -> Result<Vec<u8>> {
    let mut docx = Docx::new();

    for (index, text) in pages.iter().enumerate() {
        let mut lines = text.lines().peekable();
        if lines.peek().is_none() {
            docx = docx.add_paragraph(Paragraph::new());
        }
        for line in lines {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
        }

        if index + 1 < pages.len() {
            docx = docx.add_paragraph(
                Paragraph::new().add_run(Run::new().add_break(BreakType::Page)),
            );
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build().pack(&mut buffer).map_err(|e| Error::OfficeWriter {
        reason: format!("Failed to write DOCX: {}", e),
    })?;

    tracing::debug!(pages = pages.len(), bytes = buffer.get_ref().len(), "docx written");
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::office::archive::tests::read_entry_string;

    #[test]
    fn test_lines_become_paragraphs_with_page_breaks() {
        let data = pages_to_docx(&["First line\nSecond & last".to_string(), "Page two".to_string()])
            .unwrap();

        let xml = read_entry_string(&data, "word/document.xml");
        let first = xml.find("First line").unwrap();
        let second = xml.find("Second &amp; last").unwrap();
        let page_break = xml.find(r#"w:type="page""#).unwrap();
        let two = xml.find("Page two").unwrap();
        assert!(first < second && second < page_break && page_break < two);
        assert_eq!(xml.matches(r#"w:type="page""#).count(), 1);
    }

    #[test]
    fn test_blank_pages_keep_breaks() {
        let data = pages_to_docx(&[String::new(), String::new(), "end".to_string()]).unwrap();
        let xml = read_entry_string(&data, "word/document.xml");
        assert_eq!(xml.matches(r#"w:type="page""#).count(), 2);
        assert!(xml.contains("end"));
    }
}
