//! Content-box trimming
//!
//! The pixel at the origin is taken as the background colour. A pixel counts as
//! content when any channel differs from it by more than the noise floor. Images
//! with an alpha channel are judged by alpha alone, so faint mask haze over a bright
//! backdrop does not count. The box around all content is grown by a fixed margin and
//! clamped to the image.

use image::{DynamicImage, GenericImageView};

/// Pixels added on every side of the content box
pub const TRIM_BUFFER: u32 = 100;

/// Channel differences at or below this are treated as background noise
const NOISE_FLOOR: u8 = 100;

/// Crop rectangle; `right` and `bottom` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Grow by `buffer` on every side, staying inside `width`×`height`
    #[must_use]
    pub fn expand(self, buffer: u32, width: u32, height: u32) -> Self {
        Self {
            left: self.left.saturating_sub(buffer),
            top: self.top.saturating_sub(buffer),
            right: self.right.saturating_add(buffer).min(width),
            bottom: self.bottom.saturating_add(buffer).min(height),
        }
    }

    /// Crop `image` to this box
    #[must_use]
    pub fn crop(&self, image: &DynamicImage) -> DynamicImage {
        image.crop_imm(self.left, self.top, self.width(), self.height())
    }
}

/// Tight box around every pixel that stands out from the origin pixel
#[must_use]
pub fn content_box(image: &DynamicImage) -> Option<BoundingBox> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let alpha_only = image.color().has_alpha();
    let rgba = image.to_rgba8();
    let reference = rgba.get_pixel(0, 0).0;

    let mut found: Option<BoundingBox> = None;
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let differs = if alpha_only {
            pixel.0[3].abs_diff(reference[3]) > NOISE_FLOOR
        } else {
            pixel
                .0
                .iter()
                .zip(reference.iter())
                .any(|(a, b)| a.abs_diff(*b) > NOISE_FLOOR)
        };
        if !differs {
            continue;
        }
        found = Some(match found {
            None => BoundingBox {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            },
            Some(b) => BoundingBox {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x + 1),
                bottom: b.bottom.max(y + 1),
            },
        });
    }
    found
}

/// Crop `image` to its content plus [`TRIM_BUFFER`]
///
/// With no content the image is returned unchanged and the box is `None`.
#[must_use]
pub fn trim(image: &DynamicImage) -> (DynamicImage, Option<BoundingBox>) {
    match content_box(image) {
        Some(tight) => {
            let (width, height) = image.dimensions();
            let buffered = tight.expand(TRIM_BUFFER, width, height);
            (buffered.crop(image), Some(buffered))
        },
        None => (image.clone(), None),
    }
}
