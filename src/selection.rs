//! Automatic model selection
//!
//! `auto` estimates how many sizable objects a shot contains. Several objects favour
//! the model that keeps fine detail, a single object the clean single-subject cutout.

use crate::config::ModelSelector;
use crate::models::ModelKind;
use image::{DynamicImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

/// Components at or below this many pixels are noise
pub const MIN_OBJECT_AREA: usize = 1000;

const BLUR_SIGMA: f32 = 3.0;

/// 7×7 square structuring element
const CLOSING_RADIUS: u8 = 3;

/// Count bright connected regions larger than [`MIN_OBJECT_AREA`]
///
/// Grayscale, Gaussian smoothing, Otsu threshold, morphological closing, then
/// 8-connected labelling.
#[must_use]
pub fn count_objects(image: &DynamicImage) -> usize {
    let gray = image.to_luma8();
    let smoothed = gaussian_blur_f32(&gray, BLUR_SIGMA);

    let level = otsu_level(&smoothed);
    let mut binary = smoothed;
    for pixel in binary.pixels_mut() {
        pixel.0 = if pixel.0[0] > level { [255] } else { [0] };
    }

    let closed = close(&binary, Norm::LInf, CLOSING_RADIUS);
    let labels = connected_components(&closed, Connectivity::Eight, Luma([0u8]));

    let mut areas: HashMap<u32, usize> = HashMap::new();
    for label in labels.pixels().map(|p| p.0[0]).filter(|&l| l != 0) {
        *areas.entry(label).or_default() += 1;
    }

    areas.values().filter(|&&area| area > MIN_OBJECT_AREA).count()
}

/// Resolve a selector to a concrete model for one image
#[must_use]
pub fn resolve_model(image: &DynamicImage, selector: ModelSelector) -> ModelKind {
    match selector {
        ModelSelector::Named(kind) => kind,
        ModelSelector::Auto => {
            let objects = count_objects(image);
            let kind = if objects > 1 {
                ModelKind::DETAIL
            } else {
                ModelKind::SINGLE_SUBJECT
            };
            tracing::debug!(objects, model = %kind, "auto model selection");
            kind
        },
    }
}
