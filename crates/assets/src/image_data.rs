use crate::AssetError;
use std::path::Path;

/// Decoded RGBA8 image, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Byte length of a `width` x `height` RGBA8 image, `None` on overflow.
fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

fn checked_len(width: u32, height: u32) -> Result<usize, AssetError> {
    rgba_len(width, height).ok_or(AssetError::Dimensions { width, height })
}

impl ImageData {
    /// Single-color image.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Result<Self, AssetError> {
        let len = checked_len(width, height)?;
        let rgba = color.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Square checkerboard of `cells` x `cells` tiles alternating `a` and `b`.
    pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Result<Self, AssetError> {
        let cell = (size / cells.max(1)).max(1);
        let mut rgba = Vec::with_capacity(checked_len(size, size)?);
        for y in 0..size {
            for x in 0..size {
                let color = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                rgba.extend_from_slice(&color);
            }
        }
        Ok(Self {
            width: size,
            height: size,
            rgba,
        })
    }

    /// Expected length of `rgba` for the declared dimensions.
    pub fn byte_len(&self) -> Option<usize> {
        rgba_len(self.width, self.height)
    }

    /// Decode a PNG, JPEG or BMP file.
    ///
    /// Rows are flipped so that texture coordinate v = 0 addresses the bottom
    /// of the picture, matching the mesh generators.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| AssetError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        let rgba = image::imageops::flip_vertical(&decoded.to_rgba8());
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }

    /// RGBA of the pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}
