//! Overlay compositing: placing the signature image on a fixed page geometry.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use tracing::trace;

use crate::config::OverlayConfig;
use crate::logging::OVERLAY;
use crate::page::{Page, Stamp};

/// Decoded raster overlay: 8-bit RGB samples plus an optional alpha plane.
#[derive(Clone, PartialEq)]
pub struct OverlayImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl OverlayImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(&image::open(path)?))
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let alpha = img
            .color()
            .has_alpha()
            .then(|| img.to_rgba8().pixels().map(|p| p[3]).collect::<Vec<u8>>());
        OverlayImage {
            width: img.width(),
            height: img.height(),
            rgb: img.to_rgb8().into_raw(),
            alpha,
        }
    }
}

impl fmt::Debug for OverlayImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("alpha", &self.alpha.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Compositor {
    divisor: f32,
    page_width: f32,
    page_height: f32,
}

impl Compositor {
    pub fn new(config: &OverlayConfig) -> Self {
        Compositor {
            divisor: config.divisor,
            page_width: config.page_width,
            page_height: config.page_height,
        }
    }

    /// Bottom-left corner of an image of the given size, in points.
    ///
    /// The image is drawn at one point per pixel. The result can be negative
    /// when the image is larger than the reference page.
    pub fn placement(&self, img_width: f32, img_height: f32) -> (f32, f32) {
        (
            (self.page_width - img_width) / self.divisor,
            (self.page_height - img_height) / self.divisor,
        )
    }

    /// New page value carrying `image` on top of `page`'s content.
    pub fn composite(&self, page: &Page, image: &Arc<OverlayImage>) -> Page {
        let (width, height) = (image.width as f32, image.height as f32);
        let (x, y) = self.placement(width, height);
        trace!(target: OVERLAY, page = page.number(), x, y, width, height, "stamping page");

        page.with_stamp(Stamp {
            image: Arc::clone(image),
            x,
            y,
            width,
            height,
        })
    }
}
