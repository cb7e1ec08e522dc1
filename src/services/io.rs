//! Image file input/output

use crate::error::{PhotoPrepError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// JPEG quality used for catalog uploads
pub const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Camera raw extensions the decoders cannot read
const RAW_EXTENSIONS: [&str; 1] = ["cr2"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image, falling back to content sniffing when the extension misleads
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {e}. Attempting content-based detection.",
                    path_ref.display()
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| PhotoPrepError::file_io_error("read image", path_ref, &io_err))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    if is_raw(path_ref) {
                        PhotoPrepError::processing(format!(
                            "Unsupported raw format '{}': camera raw data cannot be decoded ({content_err})",
                            path_ref.display()
                        ))
                    } else {
                        PhotoPrepError::image_load_error(path_ref, &content_err)
                    }
                })
            },
        }
    }

    /// Write `image` as PNG
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PhotoPrepError::file_io_error("create output directory", parent, &e)
            })?;
        }
        image
            .save_with_format(path_ref, ImageFormat::Png)
            .map_err(|e| {
                PhotoPrepError::processing(format!(
                    "Failed to save PNG '{}': {e}",
                    path_ref.display()
                ))
            })
    }

    /// Encode `image` as baseline JPEG bytes, dropping any alpha channel
    pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, UPLOAD_JPEG_QUALITY).encode_image(&rgb)?;
        Ok(buffer)
    }
}

fn is_raw(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RAW_EXTENSIONS.iter().any(|raw| ext.eq_ignore_ascii_case(raw)))
}
