//! Performance benchmarks for table image reconciliation
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use bigpdf_mcp_server::reconcile::model::ImagePlacement;
use bigpdf_mcp_server::reconcile::{
    reconcile_document, DetectedCell, DetectedTable, ImageId, PageImageSource, PageInventory,
    PdfImageSource, PlacementPolicy, Rect,
};
use bigpdf_mcp_server::Result;
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;

const PAGE_HEIGHT: f64 = 792.0;
const CELL: f64 = 20.0;

/// One page holding an `n x n` grid with an image in every other cell
struct GridSource {
    size: usize,
    png: Vec<u8>,
}

impl GridSource {
    fn new(size: usize) -> Self {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode PNG");
        Self { size, png }
    }

    fn table(&self) -> DetectedTable {
        let rows = (0..self.size)
            .map(|r| {
                (0..self.size)
                    .map(|c| {
                        let x = c as f64 * CELL;
                        let top = PAGE_HEIGHT - r as f64 * CELL;
                        DetectedCell {
                            text: if (r + c) % 2 == 0 { String::new() } else { "label".to_string() },
                            bbox: [x, top - CELL, x + CELL, top],
                        }
                    })
                    .collect()
            })
            .collect();
        DetectedTable { page: 1, rows }
    }
}

impl PageImageSource for GridSource {
    fn page_count(&self) -> u32 {
        1
    }

    fn page_height(&self, _page: u32) -> Result<f64> {
        Ok(PAGE_HEIGHT)
    }

    fn inventory(&self, _page: u32) -> Result<PageInventory> {
        let mut drawn = Vec::new();
        for r in 0..self.size {
            for c in (0..self.size).filter(|c| (r + c) % 2 == 0) {
                let x = c as f64 * CELL + 2.0;
                let y = r as f64 * CELL + 2.0;
                drawn.push(ImagePlacement {
                    image: ImageId::new((r * self.size + c + 1) as u32, 0),
                    rect: Rect::new(x, y, x + CELL - 4.0, y + CELL - 4.0),
                });
            }
        }
        Ok(PageInventory::new(PAGE_HEIGHT, drawn))
    }

    fn extract(&self, _image: ImageId) -> Result<Vec<u8>> {
        Ok(self.png.clone())
    }
}

/// A page with `count` raw RGB images drawn in a row
fn pdf_with_images(count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut xobjects = lopdf::Dictionary::new();
    let mut content = String::new();

    for i in 0..count {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 8,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![128; 8 * 8 * 3],
        ));
        let name = format!("Im{}", i);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        let x = (i % 30) as f64 * 20.0;
        let y = (i / 30) as f64 * 20.0;
        content.push_str(&format!("q 16 0 0 16 {} {} cm /{} Do Q\n", x, y, name));
    }

    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save PDF");
    buffer
}

/// Benchmark matching and emission on growing grids
fn bench_reconcile_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_grid");
    let policy = PlacementPolicy::default();

    for size in [8usize, 16, 32] {
        let source = GridSource::new(size);
        let tables = vec![source.table()];
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &tables, |b, tables| {
            b.iter(|| {
                let result = reconcile_document(&source, black_box(tables), &policy).unwrap();
                black_box(result.images_placed())
            });
        });
    }

    group.finish();
}

/// Benchmark building a page inventory from PDF content streams
fn bench_page_inventory(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_inventory");

    for count in [10usize, 100, 500] {
        let data = pdf_with_images(count);
        let source = PdfImageSource::load(&data).unwrap();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| black_box(source.inventory(1).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile_grid, bench_page_inventory);
criterion_main!(benches);
