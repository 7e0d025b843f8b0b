//! PowerPoint export: one slide per rendered page

use super::archive::ZipBuilder;
use crate::error::{Error, Result};
use crate::pdf::RenderedPage;
use std::fmt::Write as _;

/// 4:3 slide, in EMU
pub const SLIDE_WIDTH: u64 = 9_144_000;
pub const SLIDE_HEIGHT: u64 = 6_858_000;

const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/";

/// Position and size of a picture on the slide, in EMU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub x: u64,
    pub y: u64,
    pub cx: u64,
    pub cy: u64,
}

/// Scale a `width x height` image to the slide height and centre it
/// horizontally. Images too wide for that are fitted to the slide width
/// and centred vertically instead.
pub fn fit_to_slide(width: u32, height: u32) -> Frame {
    let (w, h) = (width.max(1) as u64, height.max(1) as u64);

    let cx_at_full_height = w * SLIDE_HEIGHT / h;
    if cx_at_full_height <= SLIDE_WIDTH {
        Frame {
            x: (SLIDE_WIDTH - cx_at_full_height) / 2,
            y: 0,
            cx: cx_at_full_height,
            cy: SLIDE_HEIGHT,
        }
    } else {
        let cy = h * SLIDE_WIDTH / w;
        Frame {
            x: 0,
            y: (SLIDE_HEIGHT - cy) / 2,
            cx: SLIDE_WIDTH,
            cy,
        }
    }
}

/// Build a `.pptx` holding one blank-layout slide per page image
pub fn pages_to_pptx(pages: &[RenderedPage]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::OfficeWriter {
            reason: "presentation has no slides".to_string(),
        });
    }

    let mut zip = ZipBuilder::new();
    zip.add("[Content_Types].xml", content_types_xml(pages.len()).as_bytes())?;
    zip.add(
        "_rels/.rels",
        relationships(&[("rId1", "officeDocument", "ppt/presentation.xml")]).as_bytes(),
    )?;
    zip.add("ppt/presentation.xml", presentation_xml(pages.len()).as_bytes())?;
    zip.add(
        "ppt/_rels/presentation.xml.rels",
        presentation_rels_xml(pages.len()).as_bytes(),
    )?;
    zip.add("ppt/slideMasters/slideMaster1.xml", master_xml().as_bytes())?;
    zip.add(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        relationships(&[
            ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
            ("rId2", "theme", "../theme/theme1.xml"),
        ])
        .as_bytes(),
    )?;
    zip.add("ppt/slideLayouts/slideLayout1.xml", layout_xml().as_bytes())?;
    zip.add(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        relationships(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
    )?;
    zip.add("ppt/theme/theme1.xml", THEME_XML.as_bytes())?;

    for (index, page) in pages.iter().enumerate() {
        let n = index + 1;
        let frame = fit_to_slide(page.width, page.height);
        zip.add(&format!("ppt/media/image{n}.png"), &page.png)?;
        zip.add(&format!("ppt/slides/slide{n}.xml"), slide_xml(page.page, frame).as_bytes())?;
        let image_target = format!("../media/image{n}.png");
        zip.add(
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            relationships(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "image", &image_target),
            ])
            .as_bytes(),
        )?;
    }

    tracing::debug!(slides = pages.len(), "pptx written");
    zip.finish()
}

fn xml_header() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#
}

fn relationships(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(xml_header());
    let _ = write!(xml, r#"<Relationships xmlns="{NS_PKG_REL}">"#);
    for (id, kind, target) in entries {
        let _ = write!(
            xml,
            r#"<Relationship Id="{id}" Type="{REL_BASE}{kind}" Target="{target}"/>"#
        );
    }
    xml.push_str("</Relationships>");
    xml
}

fn content_types_xml(slides: usize) -> String {
    let mut xml = String::from(xml_header());
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#);
    for n in 1..=slides {
        let _ = write!(
            xml,
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn presentation_xml(slides: usize) -> String {
    let mut xml = String::from(xml_header());
    let _ = write!(
        xml,
        r#"<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}">"#
    );
    xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);
    xml.push_str("<p:sldIdLst>");
    for index in 0..slides {
        let _ = write!(
            xml,
            r#"<p:sldId id="{}" r:id="rId{}"/>"#,
            256 + index,
            index + 2
        );
    }
    xml.push_str("</p:sldIdLst>");
    let _ = write!(
        xml,
        r#"<p:sldSz cx="{SLIDE_WIDTH}" cy="{SLIDE_HEIGHT}"/><p:notesSz cx="{SLIDE_HEIGHT}" cy="{SLIDE_WIDTH}"/>"#
    );
    xml.push_str("</p:presentation>");
    xml
}

fn presentation_rels_xml(slides: usize) -> String {
    let slide_entries: Vec<(String, String)> = (1..=slides)
        .map(|n| (format!("rId{}", n + 1), format!("slides/slide{n}.xml")))
        .collect();
    let theme_id = format!("rId{}", slides + 2);

    let mut entries: Vec<(&str, &str, &str)> =
        vec![("rId1", "slideMaster", "slideMasters/slideMaster1.xml")];
    entries.extend(
        slide_entries
            .iter()
            .map(|(id, target)| (id.as_str(), "slide", target.as_str())),
    );
    entries.push((&theme_id, "theme", "theme/theme1.xml"));
    relationships(&entries)
}

/// Empty group shape tree shared by master, layout and slides
fn empty_tree_start() -> &'static str {
    concat!(
        r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
        r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/>"#,
        r#"<a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#
    )
}

fn master_xml() -> String {
    let mut xml = String::from(xml_header());
    let _ = write!(xml, r#"<p:sldMaster xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}">"#);
    xml.push_str("<p:cSld>");
    xml.push_str(empty_tree_start());
    xml.push_str("</p:spTree></p:cSld>");
    xml.push_str(concat!(
        r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" "#,
        r#"accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#
    ));
    xml.push_str(r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#);
    xml.push_str("</p:sldMaster>");
    xml
}

fn layout_xml() -> String {
    let mut xml = String::from(xml_header());
    let _ = write!(
        xml,
        r#"<p:sldLayout xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" type="blank" preserve="1">"#
    );
    xml.push_str(r#"<p:cSld name="Blank">"#);
    xml.push_str(empty_tree_start());
    xml.push_str("</p:spTree></p:cSld>");
    xml.push_str("<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>");
    xml
}

fn slide_xml(page: u32, frame: Frame) -> String {
    let mut xml = String::from(xml_header());
    let _ = write!(xml, r#"<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}">"#);
    xml.push_str("<p:cSld>");
    xml.push_str(empty_tree_start());
    let _ = write!(
        xml,
        concat!(
            "<p:pic><p:nvPicPr>",
            r#"<p:cNvPr id="2" name="Page {page}"/>"#,
            r#"<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/>"#,
            "</p:nvPicPr>",
            r#"<p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#,
            r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>"#,
            "</p:pic>"
        ),
        page = page,
        x = frame.x,
        y = frame.y,
        cx = frame.cx,
        cy = frame.cy,
    );
    xml.push_str("</p:spTree></p:cSld>");
    xml.push_str("<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");
    xml
}

const THEME_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme">"#,
    r#"<a:themeElements>"#,
    r#"<a:clrScheme name="Office">"#,
    r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>"#,
    r#"<a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink>"#,
    r#"</a:clrScheme>"#,
    r#"<a:fontScheme name="Office">"#,
    r#"<a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    r#"</a:fontScheme>"#,
    r#"<a:fmtScheme name="Office">"#,
    r#"<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>"#,
    r#"<a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>"#,
    r#"<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle>"#,
    r#"<a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>"#,
    r#"<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>"#,
    r#"</a:fmtScheme>"#,
    r#"</a:themeElements>"#,
    r#"</a:theme>"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::office::archive::tests::{entry_names, read_entry, read_entry_string};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn page(page: u32, width: u32, height: u32) -> RenderedPage {
        RenderedPage {
            page,
            width,
            height,
            png: format!("png {page}").into_bytes(),
        }
    }

    #[rstest]
    // Letter portrait at 200 dpi
    #[case(1700, 2200, Frame { x: 1_922_318, y: 0, cx: 5_299_363, cy: SLIDE_HEIGHT })]
    // Exactly 4:3 fills the slide
    #[case(400, 300, Frame { x: 0, y: 0, cx: SLIDE_WIDTH, cy: SLIDE_HEIGHT })]
    // Wide banner is fitted to the width
    #[case(2000, 500, Frame { x: 0, y: 2_286_000, cx: SLIDE_WIDTH, cy: 2_286_000 })]
    fn test_fit_to_slide(#[case] width: u32, #[case] height: u32, #[case] expected: Frame) {
        assert_eq!(fit_to_slide(width, height), expected);
    }

    #[test]
    fn test_one_slide_per_page() {
        let data = pages_to_pptx(&[page(1, 1700, 2200), page(2, 1700, 2200)]).unwrap();
        let names = entry_names(&data);
        for expected in [
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/media/image2.png",
            "ppt/theme/theme1.xml",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(read_entry(&data, "ppt/media/image2.png"), b"png 2");

        let presentation = read_entry_string(&data, "ppt/presentation.xml");
        assert_eq!(presentation.matches("<p:sldId ").count(), 2);

        let rels = read_entry_string(&data, "ppt/_rels/presentation.xml.rels");
        assert!(rels.contains(r#"Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme""#));

        let slide = read_entry_string(&data, "ppt/slides/slide1.xml");
        assert!(slide.contains(r#"<a:off x="1922318" y="0"/><a:ext cx="5299363" cy="6858000"/>"#));
    }

    #[test]
    fn test_empty_presentation_rejected() {
        assert!(matches!(pages_to_pptx(&[]), Err(Error::OfficeWriter { .. })));
    }
}
