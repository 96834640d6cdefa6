/**
 * This module contains all logic for loading shader sources and images from external files.
 */
pub mod ppm;

use std::path::Path;

use crate::error::{Result, SceneError};

pub use ppm::Image;

pub fn load_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    // TODO: resolve relative paths against a configurable asset root instead of the cwd
    std::fs::read_to_string(path).map_err(|e| SceneError::resource(path, e))
}

pub fn load_binary(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| SceneError::resource(path, e))
}

/**
 * Loads an RGB image. `.ppm` files go through the built-in pixmap codec, everything
 * else (png, jpeg) is decoded by the `image` crate.
 *
 * With `flip` the rows are reversed so that the first row is the bottom of the picture.
 */
pub fn load_image(path: impl AsRef<Path>, flip: bool) -> Result<Image> {
    let path = path.as_ref();
    let is_ppm = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ppm"));
    if is_ppm {
        return Image::load(path, flip);
    }
    let bytes = load_binary(path)?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| SceneError::resource(path, e))?;
    let decoded = if flip { decoded.flipv() } else { decoded };
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Image::from_pixels(width, height, rgb.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_goes_through_the_image_crate() {
        let path = std::env::temp_dir().join(format!("scene-ngin-{}.png", std::process::id()));
        let mut png = image::RgbImage::new(1, 2);
        png.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        png.put_pixel(0, 1, image::Rgb([40, 50, 60]));
        png.save(&path).unwrap();

        let upright = load_image(&path, false).unwrap();
        let flipped = load_image(&path, true).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(upright.pixel(0, 0), Some([10, 20, 30]));
        assert_eq!(flipped.pixel(0, 0), Some([40, 50, 60]));
    }

    #[test]
    fn missing_files_are_resource_errors() {
        assert!(matches!(
            load_string("nope/shader.wgsl"),
            Err(SceneError::ResourceLoad { .. })
        ));
        assert!(matches!(
            load_image("nope/texture.png", false),
            Err(SceneError::ResourceLoad { .. })
        ));
    }
}
