//! Table-cell image reconciliation
//!
//! Given the tables found on a PDF, decides which embedded images belong in
//! which empty table cells and produces instructions for the spreadsheet
//! writer.
//!
//! Per page, the image inventory is built once and a single pool of
//! unclaimed images is shared by every table on that page. Failures local
//! to a page, a table or an image are logged and absorbed; only an empty
//! table list fails the whole run.

pub mod emitter;
pub mod geometry;
pub mod inventory;
pub mod matcher;
pub mod model;

pub use emitter::{PlacementPolicy, SheetWriter};
pub use geometry::Rect;
pub use inventory::{PageImageSource, PageInventory, PdfImageSource};
pub use model::{Assignment, DetectedCell, DetectedTable, ImageId, WriterInstruction};

use crate::error::{Error, Result};
use matcher::Available;
use model::Cell;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::HashMap;

/// Worksheet name for the table at `index` (zero-based)
pub fn sheet_name(index: usize) -> String {
    format!("Table {}", index + 1)
}

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TableReport {
    pub sheet_name: String,
    pub page: u32,
    pub rows: usize,
    pub columns: usize,
    /// Empty cells eligible for an image
    pub candidate_cells: usize,
    pub images_placed: usize,
    /// Images matched to a cell that could not be extracted or decoded
    #[serde(skip_serializing_if = "is_zero")]
    pub image_failures: usize,
    /// Why reconciliation was skipped for this table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Output of a reconciliation run
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub tables: Vec<TableReport>,
    /// Writer instructions in emission order
    pub instructions: Vec<WriterInstruction>,
}

impl Reconciliation {
    pub fn images_placed(&self) -> usize {
        self.instructions.len()
    }

    /// Instructions targeting one sheet
    pub fn instructions_for<'a>(
        &'a self,
        sheet: &'a str,
    ) -> impl Iterator<Item = &'a WriterInstruction> + 'a {
        self.instructions
            .iter()
            .filter(move |instruction| instruction.sheet_name == sheet)
    }
}

/// Per-page state shared by the tables on that page
enum PageScope {
    Ready {
        height: f64,
        origin: (f64, f64),
        available: Available,
    },
    Failed(String),
}

fn open_scope<S: PageImageSource + ?Sized>(source: &S, page: u32) -> PageScope {
    let opened = source.page_height(page).and_then(|height| {
        geometry::check_page_height(height)?;
        let origin = source.page_origin(page)?;
        let inventory = source.inventory(page)?;
        Ok((height, origin, inventory))
    });

    match opened {
        Ok((height, origin, inventory)) => {
            tracing::debug!(
                page,
                images = inventory.images().len(),
                placements = inventory.placements().len(),
                "page inventory built"
            );
            PageScope::Ready {
                height,
                origin,
                available: Available::new(&inventory),
            }
        }
        Err(e) => {
            tracing::warn!(page, error = %e, "page skipped for image placement");
            PageScope::Failed(e.client_message())
        }
    }
}

/// Reconcile every detected table against the images on its page.
///
/// Tables are processed in the order given; sheet names follow that order.
/// Returns [`Error::NoTablesFound`] when `tables` is empty.
pub fn reconcile_document<S: PageImageSource + ?Sized>(
    source: &S,
    tables: &[DetectedTable],
    policy: &PlacementPolicy,
) -> Result<Reconciliation> {
    if tables.is_empty() {
        return Err(Error::NoTablesFound);
    }

    let mut scopes: HashMap<u32, PageScope> = HashMap::new();
    let mut result = Reconciliation::default();

    for (index, table) in tables.iter().enumerate() {
        let sheet = sheet_name(index);
        let cells = table.cells();
        let mut report = TableReport {
            sheet_name: sheet.clone(),
            page: table.page,
            rows: table.row_count(),
            columns: table.column_count(),
            candidate_cells: cells.iter().filter(|cell| matcher::is_candidate(cell)).count(),
            images_placed: 0,
            image_failures: 0,
            skipped: None,
        };

        let scope = scopes
            .entry(table.page)
            .or_insert_with(|| open_scope(source, table.page));

        let (height, origin, available) = match scope {
            PageScope::Ready {
                height,
                origin,
                available,
            } => (*height, *origin, available),
            PageScope::Failed(reason) => {
                report.skipped = Some(reason.clone());
                result.tables.push(report);
                continue;
            }
        };

        let cells: Vec<Cell> = cells
            .into_iter()
            .map(|cell| Cell {
                bbox: cell.bbox.translated(-origin.0, -origin.1),
                ..cell
            })
            .collect();
        let unified = match matcher::unify_candidates(&cells, height) {
            Ok(unified) => unified,
            Err(e) => {
                tracing::warn!(sheet = %sheet, page = table.page, error = %e, "table skipped for image placement");
                report.skipped = Some(e.client_message());
                result.tables.push(report);
                continue;
            }
        };

        let placed = matcher::place_cells(&unified, available, |cell, image| {
            let image_bytes = source.extract(image)?;
            let assignment = Assignment {
                row: cell.row,
                col: cell.col,
                image,
                image_bytes,
            };
            emitter::emit(&sheet, &assignment, policy)
        });

        for failure in placed.failures {
            tracing::warn!(
                sheet = %sheet,
                row = failure.row,
                col = failure.col,
                image = %failure.image,
                error = %failure.error,
                "image could not be placed, trying the next one"
            );
            report.image_failures += 1;
        }
        for (_, instruction) in placed.matches {
            report.images_placed += 1;
            result.instructions.push(instruction);
        }

        tracing::info!(
            sheet = %sheet,
            page = table.page,
            candidates = report.candidate_cells,
            placed = report.images_placed,
            "table reconciled"
        );
        result.tables.push(report);
    }

    Ok(result)
}
