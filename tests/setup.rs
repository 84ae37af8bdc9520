#![allow(dead_code)]

use std::io::{Error, ErrorKind};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::dictionary;
use lopdf::{Document, Object, Stream};

pub struct PdfConfig {
    /// One entry per page, each a list of text lines from top to bottom.
    pub pages: Vec<Vec<String>>,
    pub font_name: String,
    pub font_size: f32,
    pub line_spacing: f32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        PdfConfig {
            pages: vec![
                vec![
                    "CUIT - 20 1234 5678 90".to_string(),
                    "AF00012345 Declaracion jurada".to_string(),
                    "Periodo 2024-01".to_string(),
                ],
                vec![
                    "Detalle de operaciones".to_string(),
                    "continuacion".to_string(),
                ],
                vec![
                    "CUIT - 2098 7654 3210".to_string(),
                    "BB00054321 Declaracion jurada".to_string(),
                ],
                vec!["Resumen del lote".to_string(), "3 declaraciones".to_string()],
            ],
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
            line_spacing: 20.0,
        }
    }
}

impl PdfConfig {
    pub fn with_pages(pages: &[&[&str]]) -> Self {
        PdfConfig {
            pages: pages
                .iter()
                .map(|lines| lines.iter().map(|l| l.to_string()).collect())
                .collect(),
            ..PdfConfig::default()
        }
    }
}

pub fn create_test_pdf_with_config(config: &PdfConfig) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => config.font_name.clone(),
    });

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in &config.pages {
        let mut operations = vec![];
        let mut y_position = 720.0;
        for line in lines {
            operations.extend(vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), config.font_size.into()]),
                Operation::new("Td", vec![72.into(), y_position.into()]),
                Operation::new("Tj", vec![Object::string_literal(line.as_str())]),
                Operation::new("ET", vec![]),
            ]);
            y_position -= config.line_spacing;
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc
}

pub fn write_test_pdf(config: &PdfConfig, path: &Path) -> Result<(), Error> {
    let mut doc = create_test_pdf_with_config(config);
    doc.save(path)
        .map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?;
    Ok(())
}

pub fn write_test_overlay(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_pixel(width, height, image::Rgb([20, 40, 160]))
        .save(path)
        .unwrap();
}

#[test]
fn test_create_test_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example.pdf");
    assert!(write_test_pdf(&PdfConfig::default(), &path).is_ok());

    let doc = Document::load(&path).unwrap();
    assert_eq!(doc.get_pages().len(), 4);
}
