//! Label extraction and redaction

use crate::error::Result;
use crate::scanner::{CodeScanner, Region};
use image::{DynamicImage, GenericImage, Rgba};

/// Share of the code's own size added on every side when painting it out
const REDACTION_MARGIN: f64 = 0.1;

/// A code found in a source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLabel {
    /// Sanitized identifier; `None` when nothing usable survived sanitizing
    pub identifier: Option<String>,
    /// Where the code sat in the source image
    pub region: Region,
}

/// Keep only `[A-Za-z0-9_-]`
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Scan `image` for a code, returning the first one found and the working image
///
/// When a code is found the returned image has the code (plus a 10% margin) painted
/// white. Otherwise the image comes back untouched.
pub fn extract(
    image: DynamicImage,
    scanner: &dyn CodeScanner,
) -> Result<(Option<ExtractedLabel>, DynamicImage)> {
    let detections = scanner.scan(&image.to_luma8())?;
    let Some(first) = detections.into_iter().next() else {
        return Ok((None, image));
    };

    let text = String::from_utf8_lossy(&first.payload);
    let identifier = Some(sanitize(&text)).filter(|s| !s.is_empty());
    if identifier.is_none() {
        log::warn!("Decoded a label with no usable characters: {text:?}");
    }

    let redacted = redact(image, first.region);
    Ok((
        Some(ExtractedLabel {
            identifier,
            region: first.region,
        }),
        redacted,
    ))
}

/// Paint `region`, grown by the redaction margin, white
///
/// Corners are truncated toward zero and the far edge is inclusive.
#[must_use]
pub fn redact(mut image: DynamicImage, region: Region) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return image;
    }

    let grow_x = f64::from(region.width) * REDACTION_MARGIN;
    let grow_y = f64::from(region.height) * REDACTION_MARGIN;
    let x0 = (f64::from(region.left) - grow_x) as i64;
    let y0 = (f64::from(region.top) - grow_y) as i64;
    let x1 = (f64::from(region.left) + f64::from(region.width) + grow_x) as i64;
    let y1 = (f64::from(region.top) + f64::from(region.height) + grow_y) as i64;

    let clamp = |v: i64, max: u32| v.clamp(0, i64::from(max) - 1) as u32;
    let (x0, x1) = (clamp(x0, width), clamp(x1, width));
    let (y0, y1) = (clamp(y0, height), clamp(y1, height));

    let white = Rgba([255, 255, 255, 255]);
    for y in y0..=y1 {
        for x in x0..=x1 {
            image.put_pixel(x, y, white);
        }
    }
    image
}
