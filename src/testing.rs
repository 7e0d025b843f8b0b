//! Synthetic PDFs for unit tests

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// Description of one test page
#[derive(Debug, Clone)]
pub struct PageSpec {
    width: f64,
    height: f64,
    origin: (f64, f64),
    images: Vec<(String, u32, u32)>,
    forms: Vec<(String, String, f64, f64, f64, f64)>,
    content: String,
}

impl PageSpec {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            origin: (0.0, 0.0),
            images: Vec::new(),
            forms: Vec::new(),
            content: String::new(),
        }
    }

    /// Move the lower-left corner of the MediaBox
    pub fn origin(mut self, x: f64, y: f64) -> Self {
        self.origin = (x, y);
        self
    }

    /// Register an 8-bit RGB image XObject of the given pixel size
    pub fn image(mut self, name: &str, width: u32, height: u32) -> Self {
        self.images.push((name.to_string(), width, height));
        self
    }

    /// Draw a registered image at `(x, y)` with size `w x h` (user space)
    pub fn draw(mut self, name: &str, x: f64, y: f64, w: f64, h: f64) -> Self {
        self.content.push_str(&format!(
            "q {} 0 0 {} {} {} cm /{} Do Q\n",
            w, h, x, y, name
        ));
        self
    }

    /// Draw `image` at `w x h` inside a form XObject placed at `(x, y)` via its /Matrix
    pub fn form_drawing(mut self, form: &str, image: &str, w: f64, h: f64, x: f64, y: f64) -> Self {
        self.forms
            .push((form.to_string(), image.to_string(), w, h, x, y));
        self.content.push_str(&format!("/{} Do\n", form));
        self
    }

    /// Show a line of Helvetica text
    pub fn text(mut self, text: &str, x: f64, y: f64) -> Self {
        self.content.push_str(&format!(
            "BT /F1 12 Tf {} {} Td ({}) Tj ET\n",
            x, y, text
        ));
        self
    }
}

fn rgb_image(doc: &mut Document, width: u32, height: u32) -> Object {
    let samples: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i * 40 % 256) as u8, 120, 200])
        .collect();
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        samples,
    );
    Object::Reference(doc.add_object(stream))
}

/// Build a PDF with one page per spec
pub fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for spec in pages {
        let mut xobjects = Dictionary::new();
        for (name, width, height) in &spec.images {
            let image = rgb_image(&mut doc, *width, *height);
            xobjects.set(name.as_bytes().to_vec(), image);
        }

        for (form, image, w, h, x, y) in &spec.forms {
            let mut form_xobjects = Dictionary::new();
            if let Ok(image_ref) = xobjects.get(image.as_bytes()) {
                form_xobjects.set(image.as_bytes().to_vec(), image_ref.clone());
            }
            let content = format!("q {} 0 0 {} 0 0 cm /{} Do Q", w, h, image);
            let form_stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 1000.into(), 1000.into()],
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), Object::Real(*x as f32), Object::Real(*y as f32)],
                    "Resources" => dictionary! { "XObject" => form_xobjects },
                },
                content.into_bytes(),
            );
            let form_id = doc.add_object(form_stream);
            xobjects.set(form.as_bytes().to_vec(), Object::Reference(form_id));
        }

        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            spec.content.clone().into_bytes(),
        ));
        let (x0, y0) = spec.origin;
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Real(x0 as f32),
                Object::Real(y0 as f32),
                Object::Real((x0 + spec.width) as f32),
                Object::Real((y0 + spec.height) as f32),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// A PDF with `count` blank letter-size pages, each labelled with its number
pub fn numbered_pdf(count: usize) -> Vec<u8> {
    let pages: Vec<PageSpec> = (1..=count)
        .map(|n| PageSpec::new(612.0, 792.0).text(&format!("Page {}", n), 72.0, 720.0))
        .collect();
    build_pdf(&pages)
}

/// Text shown on each page, in page order
pub fn page_labels(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .keys()
        .map(|&n| doc.extract_text(&[n]).unwrap_or_default().trim().to_string())
        .collect()
}
