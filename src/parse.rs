use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::io::{Error, ErrorKind};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{
    dictionary, Dictionary, Document, Encoding, Object, ObjectId, Result as LopdfResult, Stream,
};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::logging::PDF_PARSING;
use crate::overlay::OverlayImage;
use crate::page::{Page, Stamp};

/// The narrow view of a loaded document that the pipeline works against.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    fn page_text(&self, index: usize) -> Result<String, SourceError>;

    fn page(&self, index: usize) -> Result<Page, SourceError> {
        let count = self.page_count();
        if index >= count {
            return Err(SourceError::PageOutOfRange { index, count });
        }
        Ok(Page::new(index))
    }

    /// A standalone document holding exactly `pages`, in order, with their stamps rendered.
    fn serialize_block(&self, pages: &[Page]) -> Result<Vec<u8>, SourceError>;
}

fn to_io<E: Display>(e: E) -> Error {
    Error::new(ErrorKind::Other, e.to_string())
}

pub fn load_pdf<P: AsRef<Path>>(path: P) -> Result<Document, Error> {
    Document::load(path).map_err(to_io)
}

/// A PDF loaded with lopdf.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let doc = load_pdf(path).map_err(|source| SourceError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_document(doc))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Document::load_mem(bytes)
            .map(Self::from_document)
            .map_err(to_io)
    }

    pub fn from_document(doc: Document) -> Self {
        // get_pages is keyed by 1-based page number, in order
        let page_ids = doc.get_pages().into_values().collect();
        PdfDocument { doc, page_ids }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, index: usize) -> Result<ObjectId, SourceError> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(SourceError::PageOutOfRange {
                index,
                count: self.page_ids.len(),
            })
    }
}

impl DocumentSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_text(&self, index: usize) -> Result<String, SourceError> {
        let page_id = self.page_id(index)?;
        get_page_text(&self.doc, page_id).map_err(|e| SourceError::Page {
            index,
            source: to_io(e),
        })
    }

    fn serialize_block(&self, pages: &[Page]) -> Result<Vec<u8>, SourceError> {
        let mut doc = self.doc.clone();

        for page in pages {
            let page_id = self.page_id(page.index)?;
            for (n, stamp) in page.stamps.iter().enumerate() {
                stamp_page(&mut doc, page_id, stamp, n)
                    .map_err(|e| SourceError::Serialize(to_io(e)))?;
            }
        }

        let keep: BTreeSet<usize> = pages.iter().map(|p| p.index).collect();
        let unwanted: Vec<u32> = (0..self.page_ids.len())
            .filter(|i| !keep.contains(i))
            .map(|i| i as u32 + 1)
            .collect();
        doc.delete_pages(&unwanted);
        doc.prune_objects();
        doc.renumber_objects();
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| SourceError::Serialize(to_io(e)))?;
        debug!(
            target: PDF_PARSING,
            pages = ?keep,
            bytes = buffer.len(),
            "serialized block"
        );
        Ok(buffer)
    }
}

/// Plain text of one page, one line per text object or line move.
pub fn get_page_text(doc: &Document, page_id: ObjectId) -> LopdfResult<String> {
    let content = doc.get_and_decode_page_content(page_id)?;
    let fonts = doc.get_page_fonts(page_id)?;
    let encodings: BTreeMap<Vec<u8>, Encoding> = fonts
        .iter()
        .map(|(name, font)| font.get_font_encoding(doc).map(|it| (name.clone(), it)))
        .collect::<LopdfResult<BTreeMap<Vec<u8>, Encoding>>>()?;

    let mut text = String::new();
    let mut current_encoding: Option<&Encoding> = None;

    for op in &content.operations {
        match op.operator.as_ref() {
            "Tf" => {
                current_encoding = op
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name));
            }
            "Tj" | "TJ" => collect_text(&mut text, current_encoding, &op.operands)?,
            "'" | "\"" => {
                end_line(&mut text);
                let shown = &op.operands[op.operands.len().saturating_sub(1)..];
                collect_text(&mut text, current_encoding, shown)?;
            }
            "Td" | "TD" => {
                let moves_down = op
                    .operands
                    .get(1)
                    .map(|ty| operand_as_float(ty) != 0.0)
                    .unwrap_or(false);
                if moves_down {
                    end_line(&mut text);
                }
            }
            "T*" | "ET" => end_line(&mut text),
            _ => {}
        }
    }

    Ok(text)
}

fn collect_text(
    text: &mut String,
    encoding: Option<&Encoding>,
    operands: &[Object],
) -> LopdfResult<()> {
    let Some(encoding) = encoding else {
        warn!(target: PDF_PARSING, "text shown without a usable font, skipped");
        return Ok(());
    };

    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                let decoded = Document::decode_text(encoding, bytes)?;
                text.push_str(&decoded);
            }
            // Large negative adjustments in TJ arrays stand for word gaps
            Object::Integer(_) | Object::Real(_) => {
                if operand_as_float(operand) <= -250.0 && !text.ends_with([' ', '\n']) {
                    text.push(' ');
                }
            }
            Object::Array(items) => collect_text(text, Some(encoding), items)?,
            _ => {}
        }
    }
    Ok(())
}

fn end_line(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn operand_as_float(obj: &Object) -> f32 {
    match obj {
        Object::Integer(i) => *i as f32,
        Object::Real(f) => *f,
        _ => 0.0,
    }
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// Resources of a page, following the `Parent` chain for inherited ones.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut node = doc.get_dictionary(page_id).ok();
    while let Some(dict) = node {
        if let Ok(resources) = dict.get(b"Resources") {
            return resolve_dict(doc, resources).unwrap_or_else(Dictionary::new);
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    Dictionary::new()
}

fn page_contents(doc: &Document, page: &Dictionary) -> Vec<Object> {
    match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(other) => vec![other.clone()],
        Err(_) => Vec::new(),
    }
}

fn image_xobject(doc: &mut Document, image: &OverlayImage) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if let Some(alpha) = &image.alpha {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.clone(),
        ));
        dict.set("SMask", mask_id);
    }
    doc.add_object(Stream::new(dict, image.rgb.clone()))
}

/// Draw `stamp` over the page: the original content is wrapped in `q`/`Q` and the
/// image is painted afterwards from its own content stream. Resources are copied onto
/// the page so inherited dictionaries shared with other pages stay untouched.
fn stamp_page(doc: &mut Document, page_id: ObjectId, stamp: &Stamp, n: usize) -> LopdfResult<()> {
    let mut resources = effective_resources(doc, page_id);
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new);

    let mut name = format!("DsiStamp{n}");
    while xobjects.has(name.as_bytes()) {
        name.push('_');
    }

    let image_id = image_xobject(doc, &stamp.image);
    xobjects.set(name.clone(), image_id);
    resources.set("XObject", xobjects);

    let before = Content {
        operations: vec![Operation::new("q", vec![])],
    };
    let after = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    stamp.width.into(),
                    0.into(),
                    0.into(),
                    stamp.height.into(),
                    stamp.x.into(),
                    stamp.y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    };
    // Readers concatenate content streams, so the wrappers need their own separators
    let mut before = before.encode()?;
    before.push(b'\n');
    let mut after = [b"\n".to_vec(), after.encode()?].concat();
    after.push(b'\n');
    let before_id = doc.add_object(Stream::new(dictionary! {}, before));
    let after_id = doc.add_object(Stream::new(dictionary! {}, after));

    let mut contents = vec![Object::Reference(before_id)];
    contents.extend(page_contents(doc, doc.get_dictionary(page_id)?));
    contents.push(Object::Reference(after_id));

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    page.set("Resources", resources);
    page.set("Contents", contents);
    Ok(())
}
