//! Tensor conversion around model inference
//!
//! Input: the whole frame is stretched to the model size (no letterboxing), scaled
//! by its brightest channel value and normalised per channel into NCHW.
//! Output: channel 0 of the prediction is min-max normalised into an 8-bit mask,
//! resized back to the source frame and applied as the alpha channel.

use crate::{
    error::{PhotoPrepError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Convert an image into a normalised `1×3×H×W` tensor for the given model
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [width, height] = preprocessing_config.target_size;
        if width == 0 || height == 0 {
            return Err(PhotoPrepError::processing("Model input size must be non-zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(PhotoPrepError::processing("Cannot segment an empty image"));
        }

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            width,
            height,
            FilterType::Lanczos3,
        );

        let max_value = resized
            .pixels()
            .flat_map(|p| p.0)
            .max()
            .map_or(1e-6, |v| f32::from(v).max(1e-6));

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match the resized image
        for (x, y, pixel) in resized.enumerate_pixels() {
            for (c, value) in pixel.0.iter().enumerate() {
                tensor[[0, c, y as usize, x as usize]] =
                    (f32::from(*value) / max_value - mean[c]) / std[c];
            }
        }

        Ok(tensor)
    }

    /// Turn a raw model output into an 8-bit mask the size of the source image
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tensor_to_mask(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (batch, channels, mask_height, mask_width) = output.dim();
        if batch == 0 || channels == 0 || mask_height == 0 || mask_width == 0 {
            return Err(PhotoPrepError::inference(format!(
                "Model returned an empty mask tensor {:?}",
                output.dim()
            )));
        }

        let prediction = output.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let mut mask = GrayImage::new(mask_width as u32, mask_height as u32);
        for ((y, x), &value) in prediction.indexed_iter() {
            // A flat prediction carries no contrast to stretch; read it as-is
            let scaled = if range > f32::EPSILON {
                (value - min) / range
            } else {
                value.clamp(0.0, 1.0)
            };
            mask.put_pixel(x as u32, y as u32, Luma([(scaled * 255.0) as u8]));
        }

        if mask.dimensions() == (width, height) {
            Ok(mask)
        } else {
            Ok(image::imageops::resize(
                &mask,
                width,
                height,
                FilterType::Lanczos3,
            ))
        }
    }

    /// Use `mask` as the alpha channel of `image`
    ///
    /// Fully transparent pixels are cleared to `(0,0,0,0)`.
    pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
        if image.width() != mask.width() || image.height() != mask.height() {
            return Err(PhotoPrepError::processing(format!(
                "Mask {}x{} does not match image {}x{}",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            )));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
            let [r, g, b, _] = pixel.0;
            *pixel = match alpha.0 {
                [0] => Rgba([0, 0, 0, 0]),
                [a] => Rgba([r, g, b, a]),
            };
        }
        Ok(rgba)
    }
}
