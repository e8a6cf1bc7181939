//! Image decoding and PNG encoding

use crate::error::Result;
use image::{DynamicImage, ImageError, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Decode an image, retrying with content sniffing when the file extension
/// does not match the actual format (JPEG bytes in a `.png`, etc.).
pub fn load_dynamic_image(path: &Path) -> Result<DynamicImage> {
    match image::open(path) {
        Ok(img) => Ok(img),
        Err(err) if should_retry(&err) => {
            tracing::warn!(
                "Standard decode failed for {} ({err}). Retrying with format sniffing.",
                path.display()
            );
            decode_with_guessed_format(path)
        }
        Err(err) => Err(err.into()),
    }
}

fn should_retry(err: &ImageError) -> bool {
    matches!(err, ImageError::Decoding(_) | ImageError::Unsupported(_))
}

fn decode_with_guessed_format(path: &Path) -> Result<DynamicImage> {
    let file = File::open(path)?;
    let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )?;
    Ok(png_bytes)
}
