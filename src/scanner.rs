//! 2D code scanning capability

use crate::error::Result;
#[cfg(not(feature = "qr"))]
use crate::error::PhotoPrepError;
use image::GrayImage;

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One decoded code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub region: Region,
    /// Raw decoded payload
    pub payload: Vec<u8>,
}

/// A decoder that finds codes in a single-channel image
pub trait CodeScanner: Send + Sync {
    /// Return every code found, in detection order
    ///
    /// Finding nothing is `Ok(vec![])`, not an error.
    fn scan(&self, image: &GrayImage) -> Result<Vec<Detection>>;
}

/// QR decoder backed by `rqrr`
#[cfg(feature = "qr")]
#[derive(Debug, Default, Clone, Copy)]
pub struct QrScanner;

#[cfg(feature = "qr")]
impl CodeScanner for QrScanner {
    fn scan(&self, image: &GrayImage) -> Result<Vec<Detection>> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32).0[0],
        );

        let mut detections = Vec::new();
        for grid in prepared.detect_grids() {
            let mut payload = Vec::new();
            if let Err(e) = grid.decode_to(&mut payload) {
                log::debug!("Skipping unreadable QR grid: {e}");
                continue;
            }
            detections.push(Detection {
                region: bounds_to_region(&grid.bounds, image.width(), image.height()),
                payload,
            });
        }
        Ok(detections)
    }
}

#[cfg(feature = "qr")]
fn bounds_to_region(bounds: &[rqrr::Point; 4], width: u32, height: u32) -> Region {
    let clamp_x = |v: i32| (v.max(0) as u32).min(width);
    let clamp_y = |v: i32| (v.max(0) as u32).min(height);
    let left = bounds.iter().map(|p| clamp_x(p.x)).min().unwrap_or(0);
    let right = bounds.iter().map(|p| clamp_x(p.x)).max().unwrap_or(0);
    let top = bounds.iter().map(|p| clamp_y(p.y)).min().unwrap_or(0);
    let bottom = bounds.iter().map(|p| clamp_y(p.y)).max().unwrap_or(0);
    Region {
        left,
        top,
        width: right - left,
        height: bottom - top,
    }
}

/// The scanner compiled into this build
///
/// Without the `qr` feature there is no decoder, which is a provisioning error the
/// caller should raise before any file is processed.
pub fn default_scanner() -> Result<Box<dyn CodeScanner>> {
    #[cfg(feature = "qr")]
    {
        Ok(Box::new(QrScanner))
    }
    #[cfg(not(feature = "qr"))]
    {
        Err(PhotoPrepError::provisioning(
            "Code scanning requested but this build has no QR decoder (enable the `qr` feature)",
        ))
    }
}
