//! Page image inventory
//!
//! Walks a page's content stream and records every rectangle at which an
//! image XObject is drawn. One XObject can be drawn several times; all of
//! its placements share the object's [`ImageId`].

use super::geometry::Rect;
use super::model::{ImageId, ImagePlacement};
use crate::error::{Error, Result};
use crate::pdf::objects::{inherited, media_box, name_of, number, resolve, resolve_dict, stream_content};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};

/// Nesting limit for Form XObjects drawn inside Form XObjects
const MAX_FORM_DEPTH: usize = 32;

/// Page inspection collaborator consumed by the reconciler.
pub trait PageImageSource {
    /// Number of pages in the document
    fn page_count(&self) -> u32;

    /// Height of a page in points (1-indexed page)
    fn page_height(&self, page: u32) -> Result<f64>;

    /// Lower-left corner of the page box in user space.
    ///
    /// Detector boxes are shifted by this before the vertical flip, the same
    /// way placements are.
    fn page_origin(&self, _page: u32) -> Result<(f64, f64)> {
        Ok((0.0, 0.0))
    }

    /// Every image placement on a page, top-left frame
    fn inventory(&self, page: u32) -> Result<PageInventory>;

    /// Bytes of an embedded image, as JPEG or PNG
    fn extract(&self, image: ImageId) -> Result<Vec<u8>>;
}

/// The images drawn on one page.
///
/// Placements are grouped by image in order of first appearance; within an
/// image they keep drawing order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInventory {
    height: f64,
    placements: Vec<ImagePlacement>,
}

impl PageInventory {
    pub fn new(height: f64, drawn: Vec<ImagePlacement>) -> Self {
        let mut order: Vec<ImageId> = Vec::new();
        let mut by_image: HashMap<ImageId, Vec<ImagePlacement>> = HashMap::new();
        for placement in drawn {
            by_image
                .entry(placement.image)
                .or_insert_with(|| {
                    order.push(placement.image);
                    Vec::new()
                })
                .push(placement);
        }

        let placements = order
            .iter()
            .flat_map(|id| by_image.remove(id).unwrap_or_default())
            .collect();

        Self { height, placements }
    }

    /// Page height in points
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn placements(&self) -> &[ImagePlacement] {
        &self.placements
    }

    /// Distinct images in enumeration order
    pub fn images(&self) -> Vec<ImageId> {
        let mut images: Vec<ImageId> = Vec::new();
        for placement in &self.placements {
            if images.last() != Some(&placement.image) {
                images.push(placement.image);
            }
        }
        images
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

// ============================================================================
// Content stream walking
// ============================================================================

/// Affine transform `[a b c d e f]` as used by the `cm` operator
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_numbers(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f] => Some(Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Option<Vec<f64>> = operands.iter().map(number).collect();
        Self::from_numbers(&values?)
    }

    /// `self × other`
    fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of the unit square under this transform
    fn unit_square_bounds(&self) -> Option<Rect> {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        Rect::bounding(&corners)
    }
}

/// Map of XObject resource names to object ids
fn xobject_names(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, ObjectId> {
    let mut names = HashMap::new();
    let xobjects = resources
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| resolve_dict(doc, obj));

    if let Some(xobjects) = xobjects {
        for (name, value) in xobjects.iter() {
            if let Object::Reference(id) = value {
                names.insert(name.clone(), *id);
            }
        }
    }
    names
}

struct Walker<'a> {
    doc: &'a Document,
    drawn: Vec<(ImageId, Rect)>,
    active_forms: Vec<ObjectId>,
}

impl<'a> Walker<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            drawn: Vec::new(),
            active_forms: Vec::new(),
        }
    }

    fn walk(&mut self, content: &[u8], resources: Option<&'a Dictionary>, ctm: Matrix) -> Result<()> {
        let content = Content::decode(content)?;
        let xobjects = xobject_names(self.doc, resources);

        let mut saved: Vec<Matrix> = Vec::new();
        let mut ctm = ctm;

        for operation in &content.operations {
            match operation.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        ctm = previous;
                    }
                }
                "cm" => {
                    if let Some(matrix) = Matrix::from_operands(&operation.operands) {
                        ctm = matrix.multiply(&ctm);
                    }
                }
                "Do" => {
                    let target = match operation.operands.first() {
                        Some(Object::Name(name)) => xobjects.get(name.as_slice()).copied(),
                        _ => None,
                    };
                    if let Some(id) = target {
                        self.draw(id, resources, ctm)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn draw(&mut self, id: ObjectId, resources: Option<&'a Dictionary>, ctm: Matrix) -> Result<()> {
        let doc = self.doc;
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(stream)) => stream,
            _ => return Ok(()),
        };

        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|obj| name_of(doc, obj));

        match subtype {
            Some(b"Image") => {
                if let Some(rect) = ctm.unit_square_bounds() {
                    self.drawn.push((ImageId::from(id), rect));
                }
            }
            Some(b"Form") => {
                if self.active_forms.contains(&id) || self.active_forms.len() >= MAX_FORM_DEPTH {
                    return Ok(());
                }

                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|obj| match resolve(doc, obj) {
                        Some(Object::Array(values)) => {
                            let values: Option<Vec<f64>> = values.iter().map(number).collect();
                            Matrix::from_numbers(&values?)
                        }
                        _ => None,
                    })
                    .unwrap_or(Matrix::IDENTITY);

                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|obj| resolve_dict(doc, obj))
                    .or(resources);

                let content = stream_content(stream)?;
                self.active_forms.push(id);
                let result = self.walk(&content, form_resources, form_matrix.multiply(&ctm));
                self.active_forms.pop();

                if let Err(e) = result {
                    tracing::debug!(form = ?id, error = %e, "skipping unreadable form XObject");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Raster extraction
// ============================================================================

#[derive(Debug, Clone)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorModel>, palette: Vec<u8> },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }

    fn parse(doc: &Document, object: &Object) -> Option<Self> {
        match resolve(doc, object)? {
            Object::Name(name) => match name.as_slice() {
                b"DeviceGray" | b"CalGray" | b"G" => Some(ColorModel::Gray),
                b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorModel::Rgb),
                b"DeviceCMYK" | b"CMYK" => Some(ColorModel::Cmyk),
                _ => None,
            },
            Object::Array(items) => {
                let family = items.first().and_then(|obj| name_of(doc, obj))?;
                match family {
                    b"ICCBased" => {
                        let profile = items.get(1).and_then(|obj| resolve_dict(doc, obj))?;
                        match profile.get(b"N").ok().and_then(number)? as i64 {
                            1 => Some(ColorModel::Gray),
                            3 => Some(ColorModel::Rgb),
                            4 => Some(ColorModel::Cmyk),
                            _ => None,
                        }
                    }
                    b"CalGray" => Some(ColorModel::Gray),
                    b"CalRGB" | b"Lab" => Some(ColorModel::Rgb),
                    b"Indexed" | b"I" => {
                        let base = ColorModel::parse(doc, items.get(1)?)?;
                        let palette = match resolve(doc, items.get(3)?)? {
                            Object::String(bytes, _) => bytes.clone(),
                            Object::Stream(stream) => stream_content(stream).ok()?,
                            _ => return None,
                        };
                        Some(ColorModel::Indexed {
                            base: Box::new(base),
                            palette,
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Unpack samples of `bits` width into one byte per sample.
///
/// Rows are padded to a byte boundary. Values are left unscaled.
fn unpack_samples(
    data: &[u8],
    width: usize,
    height: usize,
    per_pixel: usize,
    bits: usize,
) -> Option<Vec<u8>> {
    if !matches!(bits, 1 | 2 | 4 | 8) {
        return None;
    }
    let samples_per_row = width.checked_mul(per_pixel)?;
    let row_bytes = samples_per_row.checked_mul(bits)?.checked_add(7)? / 8;
    let sample_count = samples_per_row.checked_mul(height)?;
    if data.len() < row_bytes.checked_mul(height)? {
        return None;
    }
    if bits == 8 {
        return Some(data[..sample_count].to_vec());
    }

    let mask = (1u16 << bits) as u8 - 1;
    let mut out = Vec::with_capacity(sample_count);
    for row in data.chunks(row_bytes).take(height) {
        for index in 0..samples_per_row {
            let bit = index * bits;
            let shift = 8 - bits - (bit % 8);
            out.push((row[bit / 8] >> shift) & mask);
        }
    }
    Some(out)
}

fn scale_to_byte(value: u8, bits: usize) -> u8 {
    if bits == 8 {
        value
    } else {
        let max = (1u16 << bits) - 1;
        ((value as u16 * 255) / max) as u8
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let ink = |channel: u8| 255u16.saturating_sub(channel as u16 + k as u16).min(255) as u8;
    [ink(c), ink(m), ink(y)]
}

/// Convert unpacked samples to interleaved 8-bit RGB or gray.
fn to_pixels(samples: &[u8], model: &ColorModel, bits: usize) -> Option<(Vec<u8>, bool)> {
    match model {
        ColorModel::Gray => Some((samples.iter().map(|v| scale_to_byte(*v, bits)).collect(), true)),
        ColorModel::Rgb => Some((samples.iter().map(|v| scale_to_byte(*v, bits)).collect(), false)),
        ColorModel::Cmyk => {
            let mut rgb = Vec::with_capacity(samples.len() / 4 * 3);
            for px in samples.chunks_exact(4) {
                let [c, m, y, k] = [px[0], px[1], px[2], px[3]].map(|v| scale_to_byte(v, bits));
                rgb.extend_from_slice(&cmyk_to_rgb(c, m, y, k));
            }
            Some((rgb, false))
        }
        ColorModel::Indexed { base, palette } => {
            let stride = base.components();
            let mut expanded = Vec::with_capacity(samples.len() * stride);
            for &index in samples {
                let start = index as usize * stride;
                let entry = palette.get(start..start + stride)?;
                expanded.extend_from_slice(entry);
            }
            to_pixels(&expanded, base, 8)
        }
    }
}

/// Rebuild a PNG from raw image samples.
fn raster_to_png(
    width: u32,
    height: u32,
    bits: usize,
    model: &ColorModel,
    data: &[u8],
) -> std::result::Result<Vec<u8>, String> {
    if width == 0 || height == 0 {
        return Err("image has zero size".to_string());
    }
    let samples = unpack_samples(
        data,
        width as usize,
        height as usize,
        model.components(),
        bits,
    )
    .ok_or_else(|| format!("sample data does not fit {}x{} at {} bits", width, height, bits))?;

    let (pixels, gray) =
        to_pixels(&samples, model, bits).ok_or_else(|| "palette index out of range".to_string())?;

    let image = if gray {
        GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    }
    .ok_or_else(|| "pixel buffer does not match image size".to_string())?;

    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(png)
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter").ok().and_then(|obj| resolve(doc, obj)) {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|obj| name_of(doc, obj).map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// PDF-backed source
// ============================================================================

/// Page image source over a parsed PDF document
pub struct PdfImageSource {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfImageSource {
    /// Parse a PDF from bytes. Encrypted documents are rejected.
    pub fn load(data: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(data)?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(Error::EncryptedInput {
                name: "document".to_string(),
            });
        }
        let pages = doc.get_pages();
        Ok(Self { doc, pages })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(Error::PageOutOfBounds {
                page,
                total: self.pages.len() as u32,
            })
    }

    /// The page's MediaBox in user space
    pub fn media_box(&self, page: u32) -> Result<Rect> {
        let page_id = self.page_id(page)?;
        media_box(&self.doc, page_id)
            .map(Rect::from)
            .ok_or_else(|| Error::InputGeometry {
                reason: format!("page {} has no usable MediaBox", page),
            })
    }
}

impl PageImageSource for PdfImageSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_height(&self, page: u32) -> Result<f64> {
        Ok(self.media_box(page)?.height())
    }

    fn page_origin(&self, page: u32) -> Result<(f64, f64)> {
        let media = self.media_box(page)?;
        Ok((media.x1, media.y1))
    }

    fn inventory(&self, page: u32) -> Result<PageInventory> {
        let page_id = self.page_id(page)?;
        let media = self.media_box(page)?;

        let resources = inherited(&self.doc, page_id, b"Resources").and_then(|obj| match obj {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        });
        let content = self.doc.get_page_content(page_id)?;

        let mut walker = Walker::new(&self.doc);
        walker.walk(&content, resources, Matrix::IDENTITY)?;

        // User space (bottom-left) to the top-left page frame
        let placements = walker
            .drawn
            .into_iter()
            .map(|(image, user)| ImagePlacement {
                image,
                rect: Rect::new(
                    user.x1 - media.x1,
                    media.y2 - user.y2,
                    user.x2 - media.x1,
                    media.y2 - user.y1,
                ),
            })
            .collect();

        Ok(PageInventory::new(media.height(), placements))
    }

    fn extract(&self, image: ImageId) -> Result<Vec<u8>> {
        let failed = |reason: String| Error::ImageDecode {
            image: image.to_string(),
            reason,
        };

        let stream = match self.doc.get_object(image.into()) {
            Ok(Object::Stream(stream)) => stream,
            Ok(_) => return Err(failed("object is not a stream".to_string())),
            Err(e) => return Err(failed(e.to_string())),
        };
        let dict = &stream.dict;

        let filters = filter_names(&self.doc, dict);
        match filters.last().map(Vec::as_slice) {
            Some(b"DCTDecode") if filters.len() == 1 => return Ok(stream.content.clone()),
            Some(b"DCTDecode") | Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                return Err(failed(format!(
                    "unsupported image filter {}",
                    String::from_utf8_lossy(filters.last().map(Vec::as_slice).unwrap_or_default())
                )));
            }
            _ => {}
        }

        let dimension = |key: &[u8]| {
            dict.get(key)
                .ok()
                .and_then(|obj| resolve(&self.doc, obj))
                .and_then(number)
                .filter(|v| *v > 0.0)
                .map(|v| v as u32)
        };
        let width = dimension(b"Width").ok_or_else(|| failed("missing /Width".to_string()))?;
        let height = dimension(b"Height").ok_or_else(|| failed("missing /Height".to_string()))?;

        let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
        let (bits, model) = if is_mask {
            (1, ColorModel::Gray)
        } else {
            let bits = dimension(b"BitsPerComponent").unwrap_or(8) as usize;
            let model = dict
                .get(b"ColorSpace")
                .ok()
                .and_then(|obj| ColorModel::parse(&self.doc, obj))
                .ok_or_else(|| failed("unsupported color space".to_string()))?;
            (bits, model)
        };

        let samples = stream_content(stream).map_err(|e| failed(e.to_string()))?;
        raster_to_png(width, height, bits, &model, &samples).map_err(failed)
    }
}
