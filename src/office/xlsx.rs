//! Minimal SpreadsheetML writer
//!
//! Enough of the OOXML workbook format for table export: inline string
//! cells, custom row heights and column widths, and pictures anchored to a
//! single cell.

use super::archive::{xml_escape, ZipBuilder};
use crate::error::{Error, Result};
use crate::reconcile::emitter::cell_address;
use crate::reconcile::{SheetWriter, WriterInstruction};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// English Metric Units per pixel at 96 dpi
const EMU_PER_PIXEL: u64 = 9525;

/// Excel's limit on worksheet name length
const MAX_SHEET_NAME: usize = 31;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

#[derive(Debug, Clone, PartialEq)]
struct Picture {
    row: u32,
    col: u32,
    width_px: u32,
    height_px: u32,
    png: Vec<u8>,
}

/// One worksheet
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    name: String,
    cells: BTreeMap<(u32, u32), String>,
    row_heights: BTreeMap<u32, f64>,
    column_widths: BTreeMap<u32, f64>,
    pictures: Vec<Picture>,
}

impl Worksheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the text of a zero-based cell. Empty text clears the cell.
    pub fn write_text(&mut self, row: u32, col: u32, text: &str) {
        if text.is_empty() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), text.to_string());
        }
    }

    pub fn text(&self, row: u32, col: u32) -> Option<&str> {
        self.cells.get(&(row, col)).map(String::as_str)
    }

    /// Row height in points
    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_heights.insert(row, height);
    }

    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    /// Column width in character units
    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    /// Anchor a PNG at the top-left corner of a cell, scaled to the given pixel size
    pub fn insert_picture(&mut self, row: u32, col: u32, png: Vec<u8>, width_px: u32, height_px: u32) {
        self.pictures.push(Picture {
            row,
            col,
            width_px,
            height_px,
            png,
        });
    }

    pub fn picture_count(&self) -> usize {
        self.pictures.len()
    }

    fn sheet_xml(&self, has_drawing: bool) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        let _ = write!(xml, r#"<worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_REL}">"#);

        if !self.column_widths.is_empty() {
            xml.push_str("<cols>");
            for (col, width) in &self.column_widths {
                let _ = write!(
                    xml,
                    r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#,
                    n = col + 1
                );
            }
            xml.push_str("</cols>");
        }

        // Rows that carry text or a custom height, ascending
        let mut rows: BTreeMap<u32, Vec<(u32, &str)>> = BTreeMap::new();
        for row in self.row_heights.keys() {
            rows.entry(*row).or_default();
        }
        for ((row, col), text) in &self.cells {
            rows.entry(*row).or_default().push((*col, text.as_str()));
        }

        xml.push_str("<sheetData>");
        for (row, cells) in &rows {
            let _ = write!(xml, r#"<row r="{}""#, row + 1);
            if let Some(height) = self.row_heights.get(row) {
                let _ = write!(xml, r#" ht="{height}" customHeight="1""#);
            }
            xml.push('>');
            for (col, text) in cells {
                let _ = write!(
                    xml,
                    r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    cell_address(*row, *col),
                    xml_escape(text)
                );
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");

        if has_drawing {
            xml.push_str(r#"<drawing r:id="rId1"/>"#);
        }
        xml.push_str("</worksheet>");
        xml
    }

    /// Drawing part; picture `n` embeds relationship `rIdn`
    fn drawing_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        let _ = write!(
            xml,
            r#"<xdr:wsDr xmlns:xdr="{NS_DRAWING}" xmlns:a="{NS_A}" xmlns:r="{NS_REL}">"#
        );
        for (index, picture) in self.pictures.iter().enumerate() {
            let id = index + 1;
            let cx = picture.width_px as u64 * EMU_PER_PIXEL;
            let cy = picture.height_px as u64 * EMU_PER_PIXEL;
            let _ = write!(
                xml,
                concat!(
                    "<xdr:oneCellAnchor>",
                    "<xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff>",
                    "<xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
                    r#"<xdr:ext cx="{cx}" cy="{cy}"/>"#,
                    "<xdr:pic><xdr:nvPicPr>",
                    r#"<xdr:cNvPr id="{id}" name="Picture {id}"/>"#,
                    r#"<xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr>"#,
                    "</xdr:nvPicPr>",
                    r#"<xdr:blipFill><a:blip r:embed="rId{id}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
                    r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                    r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr>"#,
                    "</xdr:pic><xdr:clientData/></xdr:oneCellAnchor>"
                ),
                col = picture.col,
                row = picture.row,
                cx = cx,
                cy = cy,
                id = id,
            );
        }
        xml.push_str("</xdr:wsDr>");
        xml
    }
}

/// Workbook under construction
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet. Names must be unique, non-empty and at most 31 characters.
    pub fn add_sheet(&mut self, name: &str) -> Result<&mut Worksheet> {
        if name.is_empty()
            || name.chars().count() > MAX_SHEET_NAME
            || name.contains(['[', ']', ':', '*', '?', '/', '\\'])
        {
            return Err(Error::OfficeWriter {
                reason: format!("invalid worksheet name: {:?}", name),
            });
        }
        if self.sheet(name).is_some() {
            return Err(Error::OfficeWriter {
                reason: format!("duplicate worksheet name: {:?}", name),
            });
        }
        self.sheets.push(Worksheet {
            name: name.to_string(),
            ..Worksheet::default()
        });
        let last = self.sheets.len() - 1;
        Ok(&mut self.sheets[last])
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|sheet| sheet.name == name)
    }

    /// Serialize the workbook as an `.xlsx` package
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.sheets.is_empty() {
            return Err(Error::OfficeWriter {
                reason: "workbook has no worksheets".to_string(),
            });
        }

        let mut zip = ZipBuilder::new();
        zip.add("[Content_Types].xml", self.content_types_xml().as_bytes())?;
        zip.add(
            "_rels/.rels",
            relationships(&[("rId1", REL_DOCUMENT, "xl/workbook.xml")]).as_bytes(),
        )?;
        zip.add("xl/workbook.xml", self.workbook_xml().as_bytes())?;
        zip.add("xl/_rels/workbook.xml.rels", self.workbook_rels_xml().as_bytes())?;
        zip.add("xl/styles.xml", STYLES_XML.as_bytes())?;

        let mut media_index = 0usize;
        for (index, sheet) in self.sheets.iter().enumerate() {
            let n = index + 1;
            let has_drawing = !sheet.pictures.is_empty();
            zip.add(
                &format!("xl/worksheets/sheet{n}.xml"),
                sheet.sheet_xml(has_drawing).as_bytes(),
            )?;
            if !has_drawing {
                continue;
            }

            let drawing_target = format!("../drawings/drawing{n}.xml");
            zip.add(
                &format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                relationships(&[("rId1", REL_DRAWING, &drawing_target)]).as_bytes(),
            )?;
            zip.add(&format!("xl/drawings/drawing{n}.xml"), sheet.drawing_xml().as_bytes())?;

            let mut image_rels = Vec::with_capacity(sheet.pictures.len());
            for (pic_index, picture) in sheet.pictures.iter().enumerate() {
                media_index += 1;
                zip.add(&format!("xl/media/image{media_index}.png"), &picture.png)?;
                image_rels.push((
                    format!("rId{}", pic_index + 1),
                    format!("../media/image{media_index}.png"),
                ));
            }
            let rels: Vec<(&str, &str, &str)> = image_rels
                .iter()
                .map(|(id, target)| (id.as_str(), REL_IMAGE, target.as_str()))
                .collect();
            zip.add(
                &format!("xl/drawings/_rels/drawing{n}.xml.rels"),
                relationships(&rels).as_bytes(),
            )?;
        }

        zip.finish()
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
        xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
        xml.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
        xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
        xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
        for (index, sheet) in self.sheets.iter().enumerate() {
            let n = index + 1;
            let _ = write!(
                xml,
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            );
            if !sheet.pictures.is_empty() {
                let _ = write!(
                    xml,
                    r#"<Override PartName="/xl/drawings/drawing{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/>"#
                );
            }
        }
        xml.push_str("</Types>");
        xml
    }

    fn workbook_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        let _ = write!(xml, r#"<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets>"#);
        for (index, sheet) in self.sheets.iter().enumerate() {
            let n = index + 1;
            let _ = write!(
                xml,
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                xml_escape(&sheet.name)
            );
        }
        xml.push_str("</sheets></workbook>");
        xml
    }

    fn workbook_rels_xml(&self) -> String {
        let mut rels: Vec<(String, &str, String)> = self
            .sheets
            .iter()
            .enumerate()
            .map(|(index, _)| {
                (
                    format!("rId{}", index + 1),
                    REL_WORKSHEET,
                    format!("worksheets/sheet{}.xml", index + 1),
                )
            })
            .collect();
        rels.push((
            format!("rId{}", self.sheets.len() + 1),
            REL_STYLES,
            "styles.xml".to_string(),
        ));
        let borrowed: Vec<(&str, &str, &str)> = rels
            .iter()
            .map(|(id, kind, target)| (id.as_str(), *kind, target.as_str()))
            .collect();
        relationships(&borrowed)
    }
}

impl SheetWriter for Workbook {
    fn apply(&mut self, instruction: WriterInstruction) -> Result<()> {
        let sheet = self
            .sheet_mut(&instruction.sheet_name)
            .ok_or_else(|| Error::OfficeWriter {
                reason: format!("no worksheet named {:?}", instruction.sheet_name),
            })?;

        tracing::trace!(
            sheet = %instruction.sheet_name,
            cell = %instruction.cell_address,
            "placing image"
        );
        sheet.set_row_height(instruction.row, instruction.row_height_override);
        sheet.set_column_width(instruction.col, instruction.column_width_override);
        sheet.insert_picture(
            instruction.row,
            instruction.col,
            instruction.image_bytes,
            instruction.target_width,
            instruction.target_height,
        );
        Ok(())
    }
}

fn relationships(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    let _ = write!(xml, r#"<Relationships xmlns="{NS_PKG_REL}">"#);
    for (id, kind, target) in entries {
        let _ = write!(
            xml,
            r#"<Relationship Id="{id}" Type="{kind}" Target="{}"/>"#,
            xml_escape(target)
        );
    }
    xml.push_str("</Relationships>");
    xml
}

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"</styleSheet>"#
);
