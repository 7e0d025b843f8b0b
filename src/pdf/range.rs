//! Page range and page order parsing

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashSet};

/// Parse a page range like `"1, 3, 5-7"` into 1-indexed page numbers.
///
/// Items are `N` or `A-B`, separated by commas, whitespace tolerated.
/// Empty items, out-of-range pages, reversed ranges and unparseable items
/// are errors.
pub fn parse_page_range(range: &str, num_pages: u32) -> Result<BTreeSet<u32>> {
    let invalid = || Error::InvalidPageRange {
        range: range.to_string(),
    };

    let mut pages = BTreeSet::new();
    for part in range.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }

        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_page(start), parse_page(end)),
            None => {
                let page = parse_page(part);
                (page, page)
            }
        };
        let (start, end) = (start.ok_or_else(invalid)?, end.ok_or_else(invalid)?);

        if start < 1 || end > num_pages || start > end {
            return Err(invalid());
        }
        pages.extend(start..=end);
    }
    Ok(pages)
}

fn parse_page(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

/// Parse a new page order like `"3, 1, 2"`.
///
/// The order must name every page exactly once.
pub fn parse_page_order(order: &str, num_pages: u32) -> Result<Vec<u32>> {
    let pages = order
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>().map_err(|_| Error::InvalidPageOrder {
                reason: format!("'{}' is not a page number", part),
            })
        })
        .collect::<Result<Vec<u32>>>()?;

    if pages.len() != num_pages as usize {
        return Err(Error::InvalidPageOrder {
            reason: format!(
                "order lists {} pages but the document has {}",
                pages.len(),
                num_pages
            ),
        });
    }
    if let Some(page) = pages.iter().find(|&&p| p < 1 || p > num_pages) {
        return Err(Error::InvalidPageOrder {
            reason: format!("page {} is out of range (1-{})", page, num_pages),
        });
    }
    let mut seen = HashSet::new();
    if let Some(page) = pages.iter().find(|&&p| !seen.insert(p)) {
        return Err(Error::InvalidPageOrder {
            reason: format!("page {} appears more than once", page),
        });
    }

    Ok(pages)
}
