//! Portable pixmap (PPM) raster images.
//!
//! The ASCII variant (`P3`) is the format the course height maps and textures
//! are stored in: a magic line, a `width height` line, a max-value line and
//! then one channel value per line. Binary `P6` files are accepted too.

use std::path::Path;

use crate::error::{Result, SceneError};

/// An 8-bit RGB image, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// A black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = channel_count(width, height).unwrap_or(usize::MAX);
        if pixels.len() != expected {
            return Err(SceneError::out_of_range("pixel buffer", pixels.len(), expected));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA expansion for texture upload.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect()
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * 3)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.offset(x, y)
            .map(|i| [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) -> Result<()> {
        let Some(i) = self.offset(x, y) else {
            let (index, len) = if x >= self.width {
                (x as usize, self.width as usize)
            } else {
                (y as usize, self.height as usize)
            };
            return Err(SceneError::out_of_range("pixel", index, len));
        };
        self.pixels[i..i + 3].copy_from_slice(&rgb);
        Ok(())
    }

    /// Reverse the row order in place.
    pub fn flip_vertical(&mut self) {
        let row = self.width as usize * 3;
        let rows = self.height as usize;
        for y in 0..rows / 2 {
            let (top, bottom) = self.pixels.split_at_mut((rows - 1 - y) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }

    /// Decode a `P3` or `P6` file. With `flip` the rows are reversed so the
    /// first row in memory is the bottom of the picture.
    pub fn decode(bytes: &[u8], flip: bool) -> Result<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        let magic = reader.token().ok_or_else(|| parse_error("empty file"))?;
        let binary = match magic {
            b"P3" => false,
            b"P6" => true,
            other => {
                return Err(parse_error(format!(
                    "unsupported magic number `{}`",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        let width = reader.number("width")?;
        let height = reader.number("height")?;
        let max = reader.number("max value")?;
        if width == 0 || height == 0 {
            return Err(parse_error(format!("invalid dimensions {width}x{height}")));
        }
        if max == 0 || max > 255 {
            return Err(parse_error(format!("unsupported max value {max}")));
        }

        let len = channel_count(width, height)
            .ok_or_else(|| parse_error(format!("dimensions {width}x{height} are too large")))?;
        let mut pixels = if binary {
            // exactly one whitespace byte separates the header from the payload
            let start = reader.pos + 1;
            let available = bytes.len().saturating_sub(start);
            if len > available {
                return Err(parse_error(format!(
                    "truncated binary payload: expected {len} bytes, found {available}"
                )));
            }
            bytes[start..start + len]
                .iter()
                .map(|&v| v.min(max as u8))
                .collect()
        } else {
            // every value takes at least one byte
            let available = bytes.len().saturating_sub(reader.pos);
            if len > available {
                return Err(parse_error(format!(
                    "expected {len} values, but only {available} bytes follow the header"
                )));
            }
            let mut pixels = Vec::with_capacity(len);
            for i in 0..len {
                let value = reader
                    .token()
                    .ok_or_else(|| parse_error(format!("expected {len} values, found {i}")))?;
                pixels.push(parse_u32(value, "channel value")?.min(max) as u8);
            }
            if reader.token().is_some() {
                log::warn!("ignoring trailing data after {len} channel values");
            }
            pixels
        };
        if max != 255 {
            pixels
                .iter_mut()
                .for_each(|v| *v = (*v as u32 * 255 / max) as u8);
        }

        let mut image = Self {
            width,
            height,
            pixels,
        };
        if flip {
            image.flip_vertical();
        }
        Ok(image)
    }

    /// ASCII `P3` with one channel value per line.
    pub fn encode(&self) -> String {
        let mut out = format!("P3\n{} {}\n255\n", self.width, self.height);
        for value in &self.pixels {
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }

    pub fn encode_binary(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }

    pub fn load(path: impl AsRef<Path>, flip: bool) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SceneError::resource(path, e))?;
        log::debug!("reading ppm file {}", path.display());
        Self::decode(&bytes, flip).map_err(|e| match e {
            SceneError::ResourceLoad { reason, .. } => SceneError::resource(path, reason),
            other => other,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.encode()).map_err(|e| SceneError::resource(path, e))
    }
}

/// `width * height * 3`, or `None` when it does not fit in memory.
fn channel_count(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(3)
}

fn parse_error(reason: impl ToString) -> SceneError {
    SceneError::resource("<ppm>", reason)
}

fn parse_u32(token: &[u8], what: &str) -> Result<u32> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            parse_error(format!(
                "invalid {what} `{}`",
                String::from_utf8_lossy(token)
            ))
        })
}

/// Whitespace tokenizer that skips `#` comments up to the end of the line.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn token(&mut self) -> Option<&'a [u8]> {
        loop {
            match self.bytes.get(self.pos)? {
                b'#' => {
                    while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'#')
        {
            self.pos += 1;
        }
        Some(&self.bytes[start..self.pos])
    }

    fn number(&mut self, what: &str) -> Result<u32> {
        let token = self
            .token()
            .ok_or_else(|| parse_error(format!("missing {what}")))?;
        parse_u32(token, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Image {
        let mut image = Image::new(2, 3);
        for y in 0..3 {
            for x in 0..2 {
                image.set_pixel(x, y, [x as u8, y as u8, 7]).unwrap();
            }
        }
        image
    }

    #[test]
    fn solid_round_trip_with_and_without_flip() {
        let image = Image::filled(2, 2, [200, 16, 99]);
        let text = image.encode();
        assert_eq!(Image::decode(text.as_bytes(), false).unwrap(), image);
        assert_eq!(Image::decode(text.as_bytes(), true).unwrap(), image);
    }

    #[test]
    fn flip_reverses_rows_only() {
        let image = gradient();
        let flipped = Image::decode(image.encode().as_bytes(), true).unwrap();
        for y in 0..3 {
            for x in 0..2 {
                assert_eq!(flipped.pixel(x, y), image.pixel(x, 2 - y));
            }
        }
    }

    #[test]
    fn parses_comments_and_one_value_per_line() {
        let text = "P3\n# made by hand\n2 1\n255\n255\n0\n0\n# second pixel\n0\n0\n255\n";
        let image = Image::decode(text.as_bytes(), false).unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 1);
        assert_eq!(image.pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(image.pixel(1, 0), Some([0, 0, 255]));
    }

    #[test]
    fn rescales_smaller_max_values() {
        let text = "P3 1 1 15 15 0 5";
        let image = Image::decode(text.as_bytes(), false).unwrap();
        assert_eq!(image.pixel(0, 0), Some([255, 0, 85]));
    }

    #[test]
    fn binary_payload() {
        let image = gradient();
        assert_eq!(Image::decode(&image.encode_binary(), false).unwrap(), image);
    }

    #[test]
    fn malformed_input_is_a_resource_error() {
        for input in [
            &b""[..],
            b"P5\n1 1\n255\n0\n",
            b"P3\n2 2\n255\n1\n2\n3\n",
            b"P3\n0 4\n255\n",
            b"P3\nwide 1\n255\n",
            b"P6\n2 2\n255\n\x01\x02",
        ] {
            let err = Image::decode(input, false).unwrap_err();
            assert!(matches!(err, SceneError::ResourceLoad { .. }), "{err}");
        }
    }

    #[test]
    fn oversized_headers_are_rejected_before_allocating() {
        for input in [
            &b"P3\n4294967295 4294967295\n255\n"[..],
            b"P3\n3000000000 1000000000\n255\n1\n",
            b"P6\n65536 65536\n255\n\x00\x00\x00",
        ] {
            let err = Image::decode(input, false).unwrap_err();
            assert!(matches!(err, SceneError::ResourceLoad { .. }), "{err}");
        }
    }

    #[test]
    fn binary_values_above_max_are_clamped() {
        let image = Image::decode(b"P6\n1 1\n15\n\x0f\xff\x05", false).unwrap();
        assert_eq!(image.pixel(0, 0), Some([255, 255, 85]));
    }

    #[test]
    fn set_pixel_out_of_bounds() {
        let mut image = Image::new(2, 2);
        assert!(matches!(
            image.set_pixel(2, 0, [1, 1, 1]),
            Err(SceneError::IndexOutOfRange { what: "pixel", .. })
        ));
        assert!(image.pixel(0, 2).is_none());
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = Image::load("definitely/not/here.ppm", false).unwrap_err();
        match err {
            SceneError::ResourceLoad { path, .. } => assert!(path.ends_with("here.ppm")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("scene-ngin-{}.ppm", std::process::id()));
        let image = gradient();
        image.save(&path).unwrap();
        let loaded = Image::load(&path, false).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, image);
    }
}
