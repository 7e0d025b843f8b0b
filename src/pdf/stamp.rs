//! Page edits with lopdf: rotation, text watermark and image stamps
//!
//! Stamps are drawn over the existing page content. The original content is
//! wrapped in `q`/`Q` so its graphics state cannot leak into the stamp.

use super::objects::{inherited, media_box, number, resolve_dict};
use crate::error::{Error, Result};
use image::{GenericImageView, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const WATERMARK_FONT: &str = "BpWatermarkFont";
const WATERMARK_STATE: &str = "BpWatermarkGs";
const SIGNATURE_IMAGE: &str = "BpSignature";

/// Watermark font size in points
pub const WATERMARK_FONT_SIZE: f64 = 50.0;
/// Watermark fill opacity
pub const WATERMARK_OPACITY: f32 = 0.3;
/// Counter-clockwise rotation of the watermark, in degrees
pub const WATERMARK_ANGLE: f64 = 45.0;

/// Helvetica advance widths for codes 32..=126, in 1/1000 em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Where to put a signature image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignaturePlacement {
    /// Page number (1-indexed)
    pub page: u32,
    /// Left edge in points from the page's left
    pub x: f64,
    /// Bottom edge in points from the page's bottom
    pub y: f64,
    /// Width in points; height follows the image's aspect ratio
    pub width: f64,
}

impl Default for SignaturePlacement {
    fn default() -> Self {
        Self {
            page: 1,
            x: 50.0,
            y: 50.0,
            width: 150.0,
        }
    }
}

fn load(data: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(data)?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(Error::EncryptedInput {
            name: "PDF".to_string(),
        });
    }
    Ok(doc)
}

fn save(mut doc: Document) -> Result<Vec<u8>> {
    doc.compress();
    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    Ok(output)
}

fn find_page(doc: &Document, page: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    pages.get(&page).copied().ok_or(Error::PageOutOfBounds {
        page,
        total: pages.len() as u32,
    })
}

// ============================================================================
// Rotation
// ============================================================================

/// Reduce a quarter-turn angle to `0..360`.
fn normalize_angle(angle: i32) -> Result<i32> {
    if angle % 90 != 0 {
        return Err(Error::InvalidRotation { angle });
    }
    Ok(angle.rem_euclid(360))
}

fn rotate_page(doc: &mut Document, page_id: ObjectId, delta: i32) -> Result<()> {
    let current = inherited(doc, page_id, b"Rotate")
        .and_then(number)
        .unwrap_or(0.0) as i32;
    let rotation = (current + delta).rem_euclid(360);
    doc.get_dictionary_mut(page_id)?
        .set("Rotate", rotation as i64);
    Ok(())
}

/// Rotate every page clockwise by 90, 180 or 270 degrees.
pub fn rotate_all(data: &[u8], angle: i32) -> Result<Vec<u8>> {
    if !matches!(angle, 90 | 180 | 270) {
        return Err(Error::InvalidRotation { angle });
    }
    let mut doc = load(data)?;
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        rotate_page(&mut doc, page_id, angle)?;
    }
    save(doc)
}

/// Rotate individual pages, keyed by 1-indexed page number.
///
/// Angles may be any multiple of 90, negative included.
pub fn rotate_pages(data: &[u8], rotations: &BTreeMap<u32, i32>) -> Result<Vec<u8>> {
    let mut doc = load(data)?;
    for (&page, &angle) in rotations {
        let angle = normalize_angle(angle)?;
        let page_id = find_page(&doc, page)?;
        if angle != 0 {
            rotate_page(&mut doc, page_id, angle)?;
        }
    }
    save(doc)
}

// ============================================================================
// Overlay plumbing
// ============================================================================

/// The page's effective resources as an owned dictionary
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Add `name` to a resource category, copying the category inline.
fn add_resource(doc: &Document, resources: &mut Dictionary, category: &str, name: &str, value: Object) {
    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .cloned()
        .unwrap_or_default();
    entries.set(name, value);
    resources.set(category, entries);
}

/// Draw `overlay` above the page's existing content.
fn overlay_page(doc: &mut Document, page_id: ObjectId, resources: Dictionary, overlay: Vec<u8>) -> Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut closing = b"\nQ\n".to_vec();
    closing.extend_from_slice(&overlay);
    let close_id = doc.add_object(Stream::new(dictionary! {}, closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(())
}

// ============================================================================
// Watermark
// ============================================================================

/// Encode text for a WinAnsi Type 1 font; unmappable characters become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Width of WinAnsi-encoded Helvetica text at `size` points
fn helvetica_width(encoded: &[u8], size: f64) -> f64 {
    let units: u32 = encoded
        .iter()
        .map(|&b| match b {
            0x20..=0x7e => HELVETICA_WIDTHS[(b - 0x20) as usize] as u32,
            _ => 556,
        })
        .sum();
    units as f64 * size / 1000.0
}

fn watermark_content(text: &[u8], center: (f64, f64)) -> Result<Vec<u8>> {
    let (sin, cos) = WATERMARK_ANGLE.to_radians().sin_cos();
    let half_width = helvetica_width(text, WATERMARK_FONT_SIZE) / 2.0;
    let real = |v: f64| Object::Real(v as f32);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(WATERMARK_STATE.into())]),
            Operation::new("g", vec![real(0.0)]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(WATERMARK_FONT.into()), real(WATERMARK_FONT_SIZE)],
            ),
            Operation::new(
                "Tm",
                vec![real(cos), real(sin), real(-sin), real(cos), real(center.0), real(center.1)],
            ),
            Operation::new("Td", vec![real(-half_width), real(0.0)]),
            Operation::new(
                "Tj",
                vec![Object::String(text.to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    Ok(content.encode()?)
}

/// Draw `text` across every page: Helvetica 50 pt, 30% opacity, rotated
/// 45 degrees about the page centre.
pub fn add_watermark(data: &[u8], text: &str) -> Result<Vec<u8>> {
    if text.trim().is_empty() {
        return Err(Error::InvalidParameter {
            reason: "watermark text is empty".to_string(),
        });
    }

    let mut doc = load(data)?;
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => WATERMARK_OPACITY,
        "CA" => WATERMARK_OPACITY,
    });
    let encoded = encode_win_ansi(text);

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        let [x1, y1, x2, y2] = media_box(&doc, page_id).unwrap_or([0.0, 0.0, 612.0, 792.0]);
        let center = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);

        let mut resources = page_resources(&doc, page_id);
        add_resource(&doc, &mut resources, "Font", WATERMARK_FONT, Object::Reference(font_id));
        add_resource(&doc, &mut resources, "ExtGState", WATERMARK_STATE, Object::Reference(state_id));

        let overlay = watermark_content(&encoded, center)?;
        overlay_page(&mut doc, page_id, resources, overlay)?;
    }

    tracing::debug!(chars = encoded.len(), "watermark applied");
    save(doc)
}

// ============================================================================
// Signature
// ============================================================================

/// Decode a PNG or JPEG signature into image XObject streams.
///
/// Returns the colour stream and, when the image has transparency, its
/// soft mask.
fn signature_streams(image_bytes: &[u8]) -> Result<(Stream, Option<Stream>, (u32, u32))> {
    let format = image::guess_format(image_bytes).map_err(|e| Error::InvalidSignatureImage {
        reason: e.to_string(),
    })?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(Error::InvalidSignatureImage {
            reason: format!("unsupported format {:?}", format),
        });
    }

    let decoded = image::load_from_memory_with_format(image_bytes, format).map_err(|e| {
        Error::InvalidSignatureImage {
            reason: e.to_string(),
        }
    })?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::InvalidSignatureImage {
            reason: "image has zero size".to_string(),
        });
    }

    let mask = decoded.color().has_alpha().then(|| {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p[3]).collect();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        )
    });

    let color = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        decoded.to_rgb8().into_raw(),
    );

    Ok((color, mask, (width, height)))
}

/// Stamp an image onto one page.
///
/// The image is `placement.width` points wide; its height keeps the
/// image's aspect ratio. Transparency is kept through a soft mask.
pub fn add_signature(data: &[u8], image_bytes: &[u8], placement: &SignaturePlacement) -> Result<Vec<u8>> {
    if !(placement.width.is_finite() && placement.width > 0.0) {
        return Err(Error::InvalidParameter {
            reason: format!("signature width must be positive, got {}", placement.width),
        });
    }
    if !(placement.x.is_finite() && placement.y.is_finite()) {
        return Err(Error::InvalidParameter {
            reason: "signature position must be finite".to_string(),
        });
    }

    let (mut color, mask, (px_width, px_height)) = signature_streams(image_bytes)?;

    let mut doc = load(data)?;
    let page_id = find_page(&doc, placement.page)?;

    if let Some(mask) = mask {
        let mask_id = doc.add_object(mask);
        color.dict.set("SMask", Object::Reference(mask_id));
    }
    let image_id = doc.add_object(color);

    let width = placement.width;
    let height = width * px_height as f64 / px_width as f64;

    let mut resources = page_resources(&doc, page_id);
    add_resource(&doc, &mut resources, "XObject", SIGNATURE_IMAGE, Object::Reference(image_id));

    let real = |v: f64| Object::Real(v as f32);
    let overlay = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(width), real(0.0), real(0.0), real(height), real(placement.x), real(placement.y)],
            ),
            Operation::new("Do", vec![Object::Name(SIGNATURE_IMAGE.into())]),
            Operation::new("Q", vec![]),
        ],
    }
    .encode()?;
    overlay_page(&mut doc, page_id, resources, overlay)?;

    tracing::debug!(page = placement.page, width, height, "signature stamped");
    save(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{PageImageSource, PdfImageSource, Rect};
    use crate::testing::{build_pdf, numbered_pdf, page_labels, PageSpec};
    use image::{DynamicImage, RgbImage, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn rotation_of(pdf: &[u8], page: u32) -> i64 {
        let doc = Document::load_mem(pdf).unwrap();
        let id = doc.get_pages()[&page];
        inherited(&doc, id, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0)
    }

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn test_rotate_all_adds_to_existing_rotation() {
        let pdf = numbered_pdf(2);
        let once = rotate_all(&pdf, 90).unwrap();
        let twice = rotate_all(&once, 270).unwrap();
        assert_eq!(rotation_of(&once, 1), 90);
        assert_eq!(rotation_of(&once, 2), 90);
        assert_eq!(rotation_of(&twice, 1), 0);
    }

    #[test]
    fn test_rotate_all_rejects_other_angles() {
        let pdf = numbered_pdf(1);
        for angle in [0, 45, 360, -90] {
            assert!(matches!(
                rotate_all(&pdf, angle),
                Err(Error::InvalidRotation { .. })
            ));
        }
    }

    #[test]
    fn test_rotate_selected_pages() {
        let pdf = numbered_pdf(3);
        let rotations = BTreeMap::from([(1, -90), (3, 180), (2, 0)]);
        let out = rotate_pages(&pdf, &rotations).unwrap();
        assert_eq!(rotation_of(&out, 1), 270);
        assert_eq!(rotation_of(&out, 2), 0);
        assert_eq!(rotation_of(&out, 3), 180);
    }

    #[test]
    fn test_rotate_selected_page_out_of_bounds() {
        let pdf = numbered_pdf(1);
        let rotations = BTreeMap::from([(4, 90)]);
        assert!(matches!(
            rotate_pages(&pdf, &rotations),
            Err(Error::PageOutOfBounds { page: 4, total: 1 })
        ));
    }

    #[test]
    fn test_helvetica_width() {
        // "Hi" = 722 + 222
        assert!((helvetica_width(b"Hi", 50.0) - 47.2).abs() < 1e-9);
    }

    #[test]
    fn test_encode_win_ansi_replaces_unmappable() {
        assert_eq!(encode_win_ansi("Caf\u{e9} \u{4e2d}"), b"Caf\xe9 ?".to_vec());
    }

    #[test]
    fn test_watermark_is_drawn_on_every_page() {
        let pdf = numbered_pdf(2);
        let out = add_watermark(&pdf, "DRAFT").unwrap();

        for label in page_labels(&out) {
            assert!(label.contains("DRAFT"), "missing watermark in {:?}", label);
        }

        let doc = Document::load_mem(&out).unwrap();
        for (_, page_id) in doc.get_pages() {
            let resources = page_resources(&doc, page_id);
            let fonts = resources.get(b"Font").ok().and_then(|o| resolve_dict(&doc, o)).unwrap();
            assert!(fonts.has(WATERMARK_FONT.as_bytes()));
            assert!(fonts.has(b"F1"), "existing fonts must survive");
        }
    }

    #[test]
    fn test_watermark_rejects_blank_text() {
        let pdf = numbered_pdf(1);
        assert!(matches!(
            add_watermark(&pdf, "  "),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_signature_keeps_aspect_ratio() {
        let pdf = build_pdf(&[PageSpec::new(595.0, 842.0), PageSpec::new(595.0, 842.0)]);
        let png = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 10, image::Rgb([0, 0, 0]))),
            ImageFormat::Png,
        );
        let placement = SignaturePlacement {
            page: 2,
            ..SignaturePlacement::default()
        };

        let out = add_signature(&pdf, &png, &placement).unwrap();
        let source = PdfImageSource::load(&out).unwrap();
        assert!(source.inventory(1).unwrap().is_empty());

        // 150 wide, 37.5 high, bottom-left at (50, 50)
        let stamped = source.inventory(2).unwrap();
        assert_eq!(stamped.placements().len(), 1);
        let rect = stamped.placements()[0].rect;
        assert!(rect.approx_eq(&Rect::new(50.0, 754.5, 200.0, 792.0), 1e-3), "{}", rect);
    }

    #[test]
    fn test_signature_with_alpha_gets_soft_mask() {
        let pdf = numbered_pdf(1);
        let png = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 255, 128]))),
            ImageFormat::Png,
        );
        let out = add_signature(&pdf, &png, &SignaturePlacement::default()).unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let has_mask = doc.objects.values().any(|obj| match obj {
            Object::Stream(stream) => stream.dict.has(b"SMask"),
            _ => false,
        });
        assert!(has_mask);
    }

    #[test]
    fn test_signature_rejects_other_formats() {
        let pdf = numbered_pdf(1);
        let gif = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]))),
            ImageFormat::Gif,
        );
        assert!(matches!(
            add_signature(&pdf, &gif, &SignaturePlacement::default()),
            Err(Error::InvalidSignatureImage { .. })
        ));
        assert!(matches!(
            add_signature(&pdf, b"not an image", &SignaturePlacement::default()),
            Err(Error::InvalidSignatureImage { .. })
        ));
    }

    #[test]
    fn test_signature_page_out_of_bounds() {
        let pdf = numbered_pdf(1);
        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([9, 9, 9]))),
            ImageFormat::Jpeg,
        );
        let placement = SignaturePlacement {
            page: 3,
            ..SignaturePlacement::default()
        };
        assert!(matches!(
            add_signature(&pdf, &jpeg, &placement),
            Err(Error::PageOutOfBounds { .. })
        ));
    }
}
