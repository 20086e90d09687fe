use std::fs;
use std::io;
use std::path::Path;

use image::{DynamicImage, RgbImage};
use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};
use thiserror::Error;

use crate::config::TargetFormat;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("heic decode failed: {0}")]
    Heif(#[from] libheif_rs::HeifError),
    #[error("decoded image has no interleaved RGB plane")]
    MissingPlane,
    #[error("decoded plane does not form a {width}x{height} RGB image")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("image encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Decodes HEIC container bytes into an RGB image.
pub fn decode_heic(data: &[u8]) -> Result<DynamicImage, ConvertError> {
    let lib_heif = LibHeif::new();
    let context = HeifContext::read_from_bytes(data)?;
    let handle = context.primary_image_handle()?;
    let decoded = lib_heif.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;

    let width = decoded.width();
    let height = decoded.height();
    let planes = decoded.planes();
    let plane = planes.interleaved.ok_or(ConvertError::MissingPlane)?;

    // Decoded rows may carry stride padding; copy row by row to drop it.
    let row_bytes = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * plane.stride;
        pixels.extend_from_slice(&plane.data[start..start + row_bytes]);
    }

    let rgb = RgbImage::from_raw(width, height, pixels)
        .ok_or(ConvertError::InvalidDimensions { width, height })?;
    Ok(DynamicImage::ImageRgb8(rgb))
}

/// Writes `image` at `path` in the target format, overwriting any existing
/// file and creating missing parent directories.
pub fn save_image(
    image: &DynamicImage,
    path: &Path,
    format: TargetFormat,
) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, format.image_format())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_bytes_that_are_not_a_heic_container() {
        assert!(matches!(
            decode_heic(b"definitely not heic"),
            Err(ConvertError::Heif(_))
        ));
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/deep/out.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30])));

        save_image(&image, &target, TargetFormat::Png).unwrap();

        assert!(target.is_file());
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.jpg");
        std::fs::write(&target, b"stale bytes").unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30])));

        save_image(&image, &target, TargetFormat::Jpg).unwrap();

        let written = std::fs::read(&target).unwrap();
        assert_ne!(written, b"stale bytes");
    }
}
