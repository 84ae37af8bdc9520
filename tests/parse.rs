use std::path::PathBuf;
use std::sync::Arc;

pub mod setup;
use crate::setup::{create_test_pdf_with_config, write_test_pdf, PdfConfig};
use dsi_split::config::OverlayConfig;
use dsi_split::error::SourceError;
use dsi_split::overlay::{Compositor, OverlayImage};
use dsi_split::page::Page;
use dsi_split::parse::{load_pdf, DocumentSource, PdfDocument};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{Document, Object};

fn source() -> PdfDocument {
    PdfDocument::from_document(create_test_pdf_with_config(&PdfConfig::default()))
}

fn overlay(width: u32, height: u32) -> Arc<OverlayImage> {
    let img = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    Arc::new(OverlayImage::from_image(&DynamicImage::ImageRgb8(img)))
}

/// Names in the XObject resources of each page of `doc`, in page order.
fn xobject_names(doc: &Document) -> Vec<Vec<String>> {
    doc.get_pages()
        .values()
        .map(|page_id| {
            let page = doc.get_dictionary(*page_id).unwrap();
            let Ok(resources) = page.get(b"Resources").and_then(Object::as_dict) else {
                return Vec::new();
            };
            resources
                .get(b"XObject")
                .and_then(Object::as_dict)
                .map(|xobjects| {
                    xobjects
                        .iter()
                        .map(|(name, _)| String::from_utf8_lossy(name).to_string())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

#[test]
fn test_load_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example.pdf");
    write_test_pdf(&PdfConfig::default(), &path).unwrap();

    let result = load_pdf(&path);
    assert!(result.is_ok(), "Should successfully load the test PDF");

    let pdf = PdfDocument::open(&path).unwrap();
    assert_eq!(pdf.page_count(), 4);
}

#[test]
fn test_load_pdf_invalid_path() {
    let invalid_path = PathBuf::from("nonexistent.pdf");
    assert!(load_pdf(&invalid_path).is_err());
    assert!(matches!(
        PdfDocument::open(&invalid_path),
        Err(SourceError::Load { .. })
    ));
}

#[test]
fn test_page_text_is_split_into_lines() {
    let pdf = source();

    let text = pdf.page_text(0).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "CUIT - 20 1234 5678 90",
            "AF00012345 Declaracion jurada",
            "Periodo 2024-01"
        ]
    );

    assert!(matches!(
        pdf.page_text(4),
        Err(SourceError::PageOutOfRange { index: 4, count: 4 })
    ));
    assert!(pdf.page(3).is_ok());
    assert!(pdf.page(4).is_err());
}

#[test]
fn test_serialized_block_holds_only_its_pages() {
    let pdf = source();

    let bytes = pdf
        .serialize_block(&[Page::new(1), Page::new(2)])
        .unwrap();
    let block = PdfDocument::from_bytes(&bytes).unwrap();

    assert_eq!(block.page_count(), 2);
    assert_eq!(block.page_text(0).unwrap(), pdf.page_text(1).unwrap());
    assert_eq!(block.page_text(1).unwrap(), pdf.page_text(2).unwrap());
}

#[test]
fn test_stamp_keeps_text_and_adds_image() {
    let pdf = source();
    let compositor = Compositor::new(&OverlayConfig::default());
    let stamped = compositor.composite(&Page::new(0), &overlay(100, 40));

    let bytes = pdf
        .serialize_block(&[Page::new(2), stamped])
        .unwrap_or_else(|e| panic!("Failed to serialize block: {}", e));
    let block = PdfDocument::from_bytes(&bytes).unwrap();

    // Pages keep their source order, not the slice order
    assert_eq!(block.page_text(0).unwrap(), pdf.page_text(0).unwrap());
    assert_eq!(block.page_text(1).unwrap(), pdf.page_text(2).unwrap());

    let names = xobject_names(block.document());
    assert_eq!(names[0], vec!["DsiStamp0".to_string()]);
    assert!(names[1].is_empty());

    // The source document is untouched
    assert!(xobject_names(pdf.document()).iter().all(Vec::is_empty));
}

#[test]
fn test_stamp_with_alpha_gets_soft_mask() {
    let pdf = source();
    let img = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
    let image = Arc::new(OverlayImage::from_image(&DynamicImage::ImageRgba8(img)));
    let stamped = Compositor::new(&OverlayConfig::default()).composite(&Page::new(0), &image);

    let bytes = pdf.serialize_block(&[stamped]).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();

    let page_id = *doc.get_pages().values().next().unwrap();
    let resources = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Resources")
        .and_then(Object::as_dict)
        .unwrap();
    let image_id = resources
        .get(b"XObject")
        .and_then(Object::as_dict)
        .and_then(|x| x.get(b"DsiStamp0"))
        .and_then(Object::as_reference)
        .unwrap();
    let image = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
    assert_eq!(image.dict.get(b"Width").and_then(Object::as_i64).unwrap(), 4);
    assert!(image.dict.get(b"SMask").is_ok());
}

#[test]
fn test_stamp_wrappers_do_not_fuse_with_page_content() {
    let pdf = source();
    let stamped = Compositor::new(&OverlayConfig::default()).composite(&Page::new(0), &overlay(10, 10));

    let bytes = pdf.serialize_block(&[stamped]).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    let page_id = *doc.get_pages().values().next().unwrap();
    let content = doc.get_and_decode_page_content(page_id).unwrap();
    let operators: Vec<&str> = content.operations.iter().map(|op| op.operator.as_str()).collect();

    assert_eq!(operators.first(), Some(&"q"));
    assert_eq!(operators.get(1), Some(&"BT"));
    assert_eq!(&operators[operators.len() - 6..], &["ET", "Q", "q", "cm", "Do", "Q"]);
    assert_eq!(operators.iter().filter(|op| **op == "ET").count(), 3);
}
