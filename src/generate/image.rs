//! Raster image thumbnails.

use std::path::Path;

use ::image::{ImageReader, RgbaImage};

use super::canvas::fit_to_square;
use super::{FileCategory, GenerationError, Generator};

/// Decodes any format the `image` crate knows and fits it to the square.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageGenerator;

impl Generator for ImageGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Image
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let decoded = ImageReader::open(path)
            .map_err(|e| GenerationError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| GenerationError::io(path, e))?
            .decode()
            .map_err(|source| GenerationError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(fit_to_square(&decoded, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{ImageFormat, Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_jpeg_thumbnail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        RgbImage::from_pixel(300, 150, Rgb([10, 200, 30]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();

        let thumb = ImageGenerator.generate(&path, 64).unwrap();
        assert_eq!(thumb.dimensions(), (64, 64));
        assert_eq!(thumb.get_pixel(0, 0)[3], 0);
        assert_eq!(thumb.get_pixel(32, 32)[3], 255);
    }

    #[test]
    fn test_wrong_extension_still_decodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actually_png.jpg");
        RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        assert!(ImageGenerator.generate(&path, 16).is_ok());
    }

    #[test]
    fn test_corrupt_image_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nthis is not really a png").unwrap();

        let err = ImageGenerator.generate(&path, 64).unwrap_err();
        assert!(matches!(err, GenerationError::Decode { .. }));
    }
}
