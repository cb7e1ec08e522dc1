//! Flattening transparent images onto a solid colour

use crate::config::RgbColor;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

#[inline]
fn blend(fg: u8, bg: u8, alpha: u8) -> u8 {
    let (fg, bg, alpha) = (u32::from(fg), u32::from(bg), u32::from(alpha));
    ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8
}

/// Paste `image` over a canvas of `color` using its own alpha as the mask
///
/// RGBA becomes RGB and luminance-alpha becomes luminance. Images without an alpha
/// channel are returned unchanged.
#[must_use]
pub fn composite(image: &DynamicImage, color: RgbColor) -> DynamicImage {
    match image {
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            let la = image.to_luma_alpha8();
            let fill = color.luma();
            let mut out = GrayImage::new(la.width(), la.height());
            for (dst, src) in out.pixels_mut().zip(la.pixels()) {
                let [l, a] = src.0;
                *dst = Luma([blend(l, fill, a)]);
            }
            DynamicImage::ImageLuma8(out)
        },
        _ if image.color().has_alpha() => {
            let rgba = image.to_rgba8();
            let mut out = RgbImage::new(rgba.width(), rgba.height());
            for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
                let [r, g, b, a] = src.0;
                *dst = Rgb([
                    blend(r, color.r, a),
                    blend(g, color.g, a),
                    blend(b, color.b, a),
                ]);
            }
            DynamicImage::ImageRgb8(out)
        },
        _ => image.clone(),
    }
}
