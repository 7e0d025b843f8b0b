//! Turning assignments into spreadsheet writer instructions

use super::model::{Assignment, WriterInstruction};
use crate::error::{Error, Result};
use image::ImageFormat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Fixed size policy for embedded cell images.
///
/// Images are stretched to `image_width x image_height` whatever their
/// aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlacementPolicy {
    /// Embedded width in pixels
    pub image_width: u32,
    /// Embedded height in pixels
    pub image_height: u32,
    /// Height applied to the image's row, in points
    pub row_height: f64,
    /// Width applied to the image's column, in character units
    pub column_width: f64,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            image_width: 80,
            image_height: 80,
            row_height: 70.0,
            column_width: 15.0,
        }
    }
}

/// Consumer of writer instructions.
///
/// Applying an instruction resizes the entire row and column of the target
/// cell, not only the cell itself.
pub trait SheetWriter {
    fn apply(&mut self, instruction: WriterInstruction) -> Result<()>;
}

/// Spreadsheet column letters for a zero-based column: 0 is `A`, 26 is `AA`.
pub fn column_letter(col: u32) -> String {
    let mut n = col as u64 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// A1-style address for a zero-based row and column.
pub fn cell_address(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

/// Build the writer instruction for one assignment.
///
/// The image is decoded and re-encoded as PNG; bytes that do not decode
/// yield [`Error::ImageDecode`] and the caller drops the assignment.
pub fn emit(
    sheet_name: &str,
    assignment: &Assignment,
    policy: &PlacementPolicy,
) -> Result<WriterInstruction> {
    let decode_error = |reason: String| Error::ImageDecode {
        image: assignment.image.to_string(),
        reason,
    };

    let decoded =
        image::load_from_memory(&assignment.image_bytes).map_err(|e| decode_error(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(decode_error("image has zero size".to_string()));
    }

    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| decode_error(e.to_string()))?;

    let row = u32::try_from(assignment.row).map_err(|_| decode_error("row index overflow".into()))?;
    let col = u32::try_from(assignment.col).map_err(|_| decode_error("column index overflow".into()))?;

    Ok(WriterInstruction {
        sheet_name: sheet_name.to_string(),
        cell_address: cell_address(row, col),
        row,
        col,
        image_bytes: png,
        target_width: policy.image_width,
        target_height: policy.image_height,
        row_height_override: policy.row_height,
        column_width_override: policy.column_width,
    })
}
