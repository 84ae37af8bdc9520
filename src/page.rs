use std::fmt;
use std::sync::Arc;

use crate::overlay::OverlayImage;

/// A page of the source document, referenced by its 0-based position.
///
/// The source content is never touched; compositing produces a new `Page`
/// with an extra [`Stamp`] layer that is rendered on top at serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    pub stamps: Vec<Stamp>,
}

impl Page {
    pub fn new(index: usize) -> Self {
        Page {
            index,
            stamps: Vec::new(),
        }
    }

    /// 1-based page number, as shown to people.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn with_stamp(&self, stamp: Stamp) -> Page {
        let mut stamps = self.stamps.clone();
        stamps.push(stamp);
        Page {
            index: self.index,
            stamps,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.number())?;
        if !self.stamps.is_empty() {
            write!(f, " (+{} stamp)", self.stamps.len())?;
        }
        Ok(())
    }
}

/// An image drawn over a page, in PDF user space (origin bottom-left, points).
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub image: Arc<OverlayImage>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}
