//! Cell classification and image-to-cell matching

use super::geometry::{unify, Rect};
use super::inventory::PageInventory;
use super::model::{Cell, ImageId, ImagePlacement};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// A cell may receive an image only when it carries no text.
///
/// Cells holding both text and an image are not supported; the image is
/// left out.
pub fn is_candidate(cell: &Cell) -> bool {
    cell.text.trim().is_empty()
}

/// A candidate cell with its box in the top-left page frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnifiedCell {
    pub row: usize,
    pub col: usize,
    pub rect: Rect,
}

/// Keep the candidate cells and move their boxes into the page frame.
///
/// Fails on the first malformed box; the caller skips the whole table.
pub fn unify_candidates(cells: &[Cell], page_height: f64) -> Result<Vec<UnifiedCell>> {
    cells
        .iter()
        .filter(|cell| is_candidate(cell))
        .map(|cell| {
            Ok(UnifiedCell {
                row: cell.row,
                col: cell.col,
                rect: unify(cell.bbox, page_height)?,
            })
        })
        .collect()
}

/// Placements that can still be claimed on one page.
///
/// Shared by every table on the page. Claiming an image removes all of its
/// placements, so one image lands in at most one cell.
#[derive(Debug, Clone)]
pub struct Available {
    placements: Vec<ImagePlacement>,
    consumed: HashSet<ImageId>,
}

/// Outcome of one [`Available::claim_with`] call
#[derive(Debug)]
pub struct Claim<T> {
    /// The image that was accepted and what placing it produced
    pub accepted: Option<(ImageId, T)>,
    /// Images tried before it that could not be placed, in order
    pub rejected: Vec<(ImageId, Error)>,
}

impl Available {
    pub fn new(inventory: &PageInventory) -> Self {
        Self {
            placements: inventory.placements().to_vec(),
            consumed: HashSet::new(),
        }
    }

    /// Offer the images overlapping `rect` to `place`, in inventory order,
    /// until one is accepted.
    ///
    /// Only the accepted image is consumed. A rejected image stays
    /// available for this and later cells.
    pub fn claim_with<T, F>(&mut self, rect: &Rect, mut place: F) -> Claim<T>
    where
        F: FnMut(ImageId) -> Result<T>,
    {
        let mut overlapping: Vec<ImageId> = Vec::new();
        for placement in &self.placements {
            if placement.rect.intersects(rect) && !overlapping.contains(&placement.image) {
                overlapping.push(placement.image);
            }
        }

        let mut rejected = Vec::new();
        for image in overlapping {
            match place(image) {
                Ok(value) => {
                    self.consume(image);
                    return Claim {
                        accepted: Some((image, value)),
                        rejected,
                    };
                }
                Err(e) => rejected.push((image, e)),
            }
        }
        Claim {
            accepted: None,
            rejected,
        }
    }

    /// Take the first placement, in inventory order, that overlaps `rect`.
    ///
    /// First match wins even when a later placement overlaps more.
    pub fn claim(&mut self, rect: &Rect) -> Option<ImageId> {
        self.claim_with(rect, |_| Ok(()))
            .accepted
            .map(|(image, ())| image)
    }

    fn consume(&mut self, image: ImageId) {
        self.placements.retain(|placement| placement.image != image);
        self.consumed.insert(image);
    }

    pub fn is_consumed(&self, image: ImageId) -> bool {
        self.consumed.contains(&image)
    }

    pub fn is_exhausted(&self) -> bool {
        self.placements.is_empty()
    }
}

/// An image chosen for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMatch {
    pub row: usize,
    pub col: usize,
    pub image: ImageId,
}

/// An image that overlapped a cell but could not be placed there
#[derive(Debug)]
pub struct PlacementFailure {
    pub row: usize,
    pub col: usize,
    pub image: ImageId,
    pub error: Error,
}

/// Images placed into the candidate cells of one table
#[derive(Debug)]
pub struct Placed<T> {
    pub matches: Vec<(CellMatch, T)>,
    pub failures: Vec<PlacementFailure>,
}

/// Place images into candidate cells in row-major order.
///
/// Cells are visited by row, then column; the earlier cell wins a contested
/// image. For each cell the overlapping images are offered to `place` in
/// inventory order; when `place` fails, the next overlapping image is tried
/// and the failed one stays available. Cells where nothing is placed are
/// left out of `matches`.
pub fn place_cells<T, F>(
    cells: &[UnifiedCell],
    available: &mut Available,
    mut place: F,
) -> Placed<T>
where
    F: FnMut(&UnifiedCell, ImageId) -> Result<T>,
{
    let mut ordered: Vec<&UnifiedCell> = cells.iter().collect();
    ordered.sort_by_key(|cell| (cell.row, cell.col));
    ordered.dedup_by_key(|cell| (cell.row, cell.col));

    let mut placed = Placed {
        matches: Vec::new(),
        failures: Vec::new(),
    };
    for cell in ordered {
        if available.is_exhausted() {
            break;
        }
        let claim = available.claim_with(&cell.rect, |image| place(cell, image));

        placed
            .failures
            .extend(claim.rejected.into_iter().map(|(image, error)| PlacementFailure {
                row: cell.row,
                col: cell.col,
                image,
                error,
            }));
        if let Some((image, value)) = claim.accepted {
            tracing::trace!(row = cell.row, col = cell.col, %image, "cell matched");
            placed.matches.push((
                CellMatch {
                    row: cell.row,
                    col: cell.col,
                    image,
                },
                value,
            ));
        }
    }
    placed
}

/// Assign images to candidate cells in row-major order, accepting every
/// overlapping image.
pub fn match_cells(cells: &[UnifiedCell], available: &mut Available) -> Vec<CellMatch> {
    place_cells(cells, available, |_, _| Ok(()))
        .matches
        .into_iter()
        .map(|(found, ())| found)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const PAGE_HEIGHT: f64 = 800.0;

    fn placement(number: u32, x1: f64, y1: f64, x2: f64, y2: f64) -> ImagePlacement {
        ImagePlacement {
            image: ImageId::new(number, 0),
            rect: Rect::new(x1, y1, x2, y2),
        }
    }

    fn inventory(placements: Vec<ImagePlacement>) -> PageInventory {
        PageInventory::new(PAGE_HEIGHT, placements)
    }

    /// Cell whose detector box maps onto `top_frame` after the flip
    fn cell(row: usize, col: usize, text: &str, top_frame: Rect) -> Cell {
        Cell {
            row,
            col,
            text: text.to_string(),
            bbox: Rect::new(
                top_frame.x1,
                PAGE_HEIGHT - top_frame.y2,
                top_frame.x2,
                PAGE_HEIGHT - top_frame.y1,
            ),
        }
    }

    fn run(cells: &[Cell], inventory: &PageInventory) -> Vec<CellMatch> {
        let unified = unify_candidates(cells, inventory.height()).unwrap();
        let mut available = Available::new(inventory);
        match_cells(&unified, &mut available)
    }

    #[rstest]
    #[case("", true)]
    #[case("   ", true)]
    #[case("\t\n", true)]
    #[case("x", false)]
    #[case("  42 ", false)]
    fn test_is_candidate(#[case] text: &str, #[case] expected: bool) {
        let c = cell(0, 0, text, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(is_candidate(&c), expected);
    }

    #[test]
    fn test_exact_overlap_assigns_image() {
        let rect = Rect::new(100.0, 100.0, 180.0, 180.0);
        let inv = inventory(vec![placement(7, 100.0, 100.0, 180.0, 180.0)]);

        let matches = run(&[cell(0, 0, "", rect)], &inv);
        assert_eq!(
            matches,
            vec![CellMatch {
                row: 0,
                col: 0,
                image: ImageId::new(7, 0)
            }]
        );
    }

    #[test]
    fn test_contested_image_goes_to_row_major_first_cell() {
        // One image straddling two cells of the same row
        let inv = inventory(vec![placement(7, 90.0, 10.0, 110.0, 40.0)]);
        let cells = [
            cell(0, 1, "", Rect::new(100.0, 0.0, 200.0, 50.0)),
            cell(0, 0, "", Rect::new(0.0, 0.0, 100.0, 50.0)),
        ];

        let matches = run(&cells, &inv);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].row, matches[0].col), (0, 0));
    }

    #[test]
    fn test_text_cell_never_receives_image() {
        let rect = Rect::new(0.0, 0.0, 50.0, 50.0);
        let inv = inventory(vec![placement(3, 0.0, 0.0, 50.0, 50.0)]);

        let matches = run(&[cell(0, 0, "Total", rect)], &inv);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_no_images_leaves_cells_empty() {
        let inv = inventory(vec![]);
        let cells = [
            cell(0, 0, "", Rect::new(0.0, 0.0, 10.0, 10.0)),
            cell(0, 1, "", Rect::new(10.0, 0.0, 20.0, 10.0)),
        ];
        assert!(run(&cells, &inv).is_empty());
    }

    #[test]
    fn test_first_match_not_best_overlap() {
        // Image 1 barely touches the cell, image 2 covers it; image 1 comes first
        let inv = inventory(vec![
            placement(1, 95.0, 0.0, 120.0, 10.0),
            placement(2, 0.0, 0.0, 100.0, 100.0),
        ]);
        let matches = run(&[cell(0, 0, "", Rect::new(0.0, 0.0, 100.0, 100.0))], &inv);
        assert_eq!(matches[0].image, ImageId::new(1, 0));
    }

    #[test]
    fn test_claim_removes_every_placement_of_image() {
        // Image 5 drawn twice; once claimed, its second copy must not match
        let inv = inventory(vec![
            placement(5, 0.0, 0.0, 50.0, 50.0),
            placement(5, 200.0, 0.0, 250.0, 50.0),
            placement(6, 200.0, 0.0, 250.0, 50.0),
        ]);
        let cells = [
            cell(0, 0, "", Rect::new(0.0, 0.0, 100.0, 50.0)),
            cell(0, 1, "", Rect::new(200.0, 0.0, 300.0, 50.0)),
        ];

        let matches = run(&cells, &inv);
        let images: Vec<ImageId> = matches.iter().map(|m| m.image).collect();
        assert_eq!(images, vec![ImageId::new(5, 0), ImageId::new(6, 0)]);
    }

    #[test]
    fn test_consumed_images_carry_across_tables() {
        let inv = inventory(vec![placement(9, 0.0, 0.0, 50.0, 50.0)]);
        let mut available = Available::new(&inv);

        let first = unify_candidates(&[cell(0, 0, "", Rect::new(0.0, 0.0, 50.0, 50.0))], PAGE_HEIGHT).unwrap();
        let second = unify_candidates(&[cell(3, 2, "", Rect::new(0.0, 0.0, 50.0, 50.0))], PAGE_HEIGHT).unwrap();

        assert_eq!(match_cells(&first, &mut available).len(), 1);
        assert!(available.is_consumed(ImageId::new(9, 0)));
        assert!(match_cells(&second, &mut available).is_empty());
    }

    #[test]
    fn test_touching_edges_do_not_match() {
        let inv = inventory(vec![placement(1, 100.0, 0.0, 150.0, 50.0)]);
        let matches = run(&[cell(0, 0, "", Rect::new(0.0, 0.0, 100.0, 50.0))], &inv);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_malformed_box_fails_unification() {
        let bad = Cell {
            row: 0,
            col: 0,
            text: String::new(),
            bbox: Rect::new(0.0, f64::INFINITY, 10.0, 10.0),
        };
        let result = unify_candidates(&[bad], PAGE_HEIGHT);
        assert!(matches!(result, Err(Error::InputGeometry { .. })));
    }

    #[test]
    fn test_text_cells_skip_unification() {
        // A broken box on a text cell is irrelevant
        let text_cell = Cell {
            row: 0,
            col: 0,
            text: "label".to_string(),
            bbox: Rect::new(f64::NAN, 0.0, 1.0, 1.0),
        };
        assert!(unify_candidates(&[text_cell], PAGE_HEIGHT).unwrap().is_empty());
    }

    #[test]
    fn test_dense_grid_keeps_images_and_cells_unique() {
        // 6x6 grid of 40pt cells; images scattered so that many straddle cells
        let mut cells = Vec::new();
        for row in 0..6 {
            for col in 0..6 {
                let text = if (row + col) % 5 == 0 { "txt" } else { "" };
                let x = col as f64 * 40.0;
                let y = row as f64 * 40.0;
                cells.push(cell(row, col, text, Rect::new(x, y, x + 40.0, y + 40.0)));
            }
        }
        let mut placements = Vec::new();
        for n in 0..30u32 {
            let x = (n * 37 % 220) as f64;
            let y = (n * 53 % 220) as f64;
            placements.push(placement(n % 18 + 1, x, y, x + 25.0, y + 25.0));
        }
        let inv = inventory(placements);

        let matches = run(&cells, &inv);
        assert!(!matches.is_empty());

        let images: HashSet<ImageId> = matches.iter().map(|m| m.image).collect();
        assert_eq!(images.len(), matches.len());

        let positions: HashSet<(usize, usize)> = matches.iter().map(|m| (m.row, m.col)).collect();
        assert_eq!(positions.len(), matches.len());

        for m in &matches {
            assert_ne!((m.row + m.col) % 5, 0, "text cell ({}, {}) got an image", m.row, m.col);
        }

        // Row-major emission order
        let mut sorted = matches.clone();
        sorted.sort_by_key(|m| (m.row, m.col));
        assert_eq!(sorted, matches);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let inv = inventory(vec![
            placement(1, 10.0, 10.0, 60.0, 60.0),
            placement(2, 40.0, 40.0, 90.0, 90.0),
        ]);
        let cells = [
            cell(0, 0, "", Rect::new(0.0, 0.0, 50.0, 50.0)),
            cell(1, 1, "", Rect::new(50.0, 50.0, 100.0, 100.0)),
        ];
        assert_eq!(run(&cells, &inv), run(&cells, &inv));
    }

    fn undecodable(image: ImageId) -> Error {
        Error::ImageDecode {
            image: image.to_string(),
            reason: "bad bytes".to_string(),
        }
    }

    #[test]
    fn test_rejected_image_stays_available() {
        let inv = inventory(vec![placement(1, 0.0, 0.0, 40.0, 40.0)]);
        let mut available = Available::new(&inv);
        let rect = Rect::new(0.0, 0.0, 40.0, 40.0);

        let claim: Claim<()> = available.claim_with(&rect, |image| Err(undecodable(image)));
        assert!(claim.accepted.is_none());
        assert_eq!(claim.rejected.len(), 1);
        assert!(!available.is_consumed(ImageId::new(1, 0)));

        assert_eq!(available.claim(&rect), Some(ImageId::new(1, 0)));
    }

    #[test]
    fn test_failed_placement_falls_through_to_next_image() {
        let inv = inventory(vec![
            placement(1, 0.0, 0.0, 40.0, 40.0),
            placement(2, 10.0, 10.0, 30.0, 30.0),
        ]);
        let unified =
            unify_candidates(&[cell(0, 0, "", Rect::new(0.0, 0.0, 40.0, 40.0))], PAGE_HEIGHT)
                .unwrap();
        let mut available = Available::new(&inv);

        let placed = place_cells(&unified, &mut available, |_, image| {
            if image == ImageId::new(1, 0) {
                Err(undecodable(image))
            } else {
                Ok(image.number)
            }
        });

        assert_eq!(placed.matches.len(), 1);
        assert_eq!(placed.matches[0].0.image, ImageId::new(2, 0));
        assert_eq!(placed.matches[0].1, 2);
        assert_eq!(placed.failures.len(), 1);
        assert_eq!(placed.failures[0].image, ImageId::new(1, 0));
        assert!(!available.is_consumed(ImageId::new(1, 0)));
        assert!(available.is_consumed(ImageId::new(2, 0)));
    }
}
