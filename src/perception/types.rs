use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::errors::MobileClawResult;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// One decoded screen capture. `png` is the exact payload that decoded.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub image: DynamicImage,
    /// Native pixel size.
    pub width: u32,
    pub height: u32,
}

impl Screenshot {
    pub fn from_png(png: Vec<u8>) -> MobileClawResult<Self> {
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            image,
            png,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub fn encode_png(image: &DynamicImage) -> MobileClawResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let png = encode_png(&DynamicImage::new_rgb8(6, 4)).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));
        let shot = Screenshot::from_png(png).unwrap();
        assert_eq!(shot.size(), (6, 4));
    }

    #[test]
    fn garbage_is_an_image_error() {
        let err = Screenshot::from_png(b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, crate::errors::MobileClawError::Image(_)));
    }
}
