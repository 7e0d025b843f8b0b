//! Inputs and outputs of table/image reconciliation

use super::geometry::Rect;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stable identity of an embedded raster resource: its indirect object id.
///
/// Every placement of the same XObject on a page shares one `ImageId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId {
    pub number: u32,
    pub generation: u16,
}

impl ImageId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl From<lopdf::ObjectId> for ImageId {
    fn from((number, generation): lopdf::ObjectId) -> Self {
        Self { number, generation }
    }
}

impl From<ImageId> for lopdf::ObjectId {
    fn from(id: ImageId) -> Self {
        (id.number, id.generation)
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xref {} {}", self.number, self.generation)
    }
}

/// One rectangle at which an image is drawn, in the top-left page frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub image: ImageId,
    pub rect: Rect,
}

/// A cell as reported by the external table detector.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DetectedCell {
    /// Text content of the cell (empty when the detector found none)
    #[serde(default)]
    pub text: String,
    /// Cell box `[x1, y1, x2, y2]` in PDF user space (points, y grows upward)
    pub bbox: [f64; 4],
}

/// A table as reported by the external table detector.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DetectedTable {
    /// Page the table sits on (1-indexed)
    pub page: u32,
    /// Cell grid, row-major: `rows[r][c]`
    pub rows: Vec<Vec<DetectedCell>>,
}

impl DetectedTable {
    /// Flatten the grid into cells carrying their grid position.
    pub fn cells(&self) -> Vec<Cell> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(row, cells)| {
                cells.iter().enumerate().map(move |(col, cell)| Cell {
                    row,
                    col,
                    text: cell.text.clone(),
                    bbox: Rect::from(cell.bbox),
                })
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// A table cell with its box still in the detector's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub text: String,
    pub bbox: Rect,
}

/// An image assigned to a cell, with the bytes extracted from the document.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub row: usize,
    pub col: usize,
    pub image: ImageId,
    pub image_bytes: Vec<u8>,
}

/// Instruction for the spreadsheet writer.
///
/// Applying it embeds the image at `cell_address` and also overrides the
/// height of the whole row and the width of the whole column.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterInstruction {
    pub sheet_name: String,
    pub cell_address: String,
    /// Zero-based row of `cell_address`
    pub row: u32,
    /// Zero-based column of `cell_address`
    pub col: u32,
    /// PNG-encoded image
    pub image_bytes: Vec<u8>,
    /// Embedded width in pixels
    pub target_width: u32,
    /// Embedded height in pixels
    pub target_height: u32,
    /// Row height in points
    pub row_height_override: f64,
    /// Column width in character units
    pub column_width_override: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cells_are_row_major_with_positions() {
        let table: DetectedTable = serde_json::from_str(
            r#"{
                "page": 2,
                "rows": [
                    [{"text": "a", "bbox": [0, 10, 5, 20]}, {"bbox": [5, 10, 10, 20]}],
                    [{"text": "c", "bbox": [0, 0, 5, 10]}]
                ]
            }"#,
        )
        .unwrap();

        let cells = table.cells();
        let positions: Vec<(usize, usize)> = cells.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(positions, vec![(0, 0), (0, 1), (1, 0)]);
        assert_eq!(cells[1].text, "");
        assert_eq!(cells[1].bbox, Rect::new(5.0, 10.0, 10.0, 20.0));
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_image_id_display_and_conversion() {
        let id = ImageId::from((12, 0));
        assert_eq!(id.to_string(), "xref 12 0");
        let object_id: lopdf::ObjectId = id.into();
        assert_eq!(object_id, (12, 0));
    }
}
