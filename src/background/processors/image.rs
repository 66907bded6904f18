//! Image filter - the single deterministic transform applied to every source
//!
//! Includes:
//! - Decoding the downloaded bytes
//! - Square resize + greyscale
//! - JPEG encoding

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    pub output_size: u32,
    pub jpeg_quality: u8,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            output_size: 256,
            jpeg_quality: 60,
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Decode `source`, filter it and return the encoded JPEG bytes.
pub fn filter_to_jpeg(source: &[u8], options: FilterOptions) -> Result<Vec<u8>> {
    let dynamic_image = decode_source(source).context("failed to decode source image")?;
    let filtered = apply_filter(&dynamic_image, options);
    encode_jpeg(&filtered, options.jpeg_quality).context("failed to encode filtered image")
}

// ────────────────────────────────────────────────────────────────
// Decoding
// ────────────────────────────────────────────────────────────────

pub fn decode_source(source: &[u8]) -> Result<DynamicImage> {
    if source.is_empty() {
        bail!("source body is empty");
    }

    let decoders: Vec<fn(&[u8]) -> Result<DynamicImage>> = vec![image_crate_decoder];

    let mut last_error = None;
    for decoder in decoders {
        match decoder(source) {
            Ok(decoded_image) => return Ok(decoded_image),
            Err(err) => last_error = Some(err),
        }
    }

    let message = format!("all decoders failed for {} byte source", source.len());
    match last_error {
        Some(err) => Err(err.context(message)),
        None => bail!(message),
    }
}

fn image_crate_decoder(source: &[u8]) -> Result<DynamicImage> {
    let dynamic_image = image::load_from_memory(source)
        .context("image crate failed to decode image from memory")?;
    Ok(dynamic_image)
}

// ────────────────────────────────────────────────────────────────
// Filter
// ────────────────────────────────────────────────────────────────

/// Resize to an exact square, then drop colour.
pub fn apply_filter(dynamic_image: &DynamicImage, options: FilterOptions) -> DynamicImage {
    dynamic_image
        .resize_exact(options.output_size, options.output_size, FilterType::Lanczos3)
        .grayscale()
}

// ────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────

fn encode_jpeg(dynamic_image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    dynamic_image
        .write_with_encoder(encoder)
        .context("JPEG encoder rejected image")?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7) as u8, (y * 5) as u8, 200])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GenericImageView, ImageFormat};

    #[test]
    fn filters_to_square_greyscale_jpeg() {
        let jpeg = filter_to_jpeg(&sample_png(64, 48), FilterOptions::default()).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (256, 256));
        assert_eq!(decoded.color(), ColorType::L8);
    }

    #[test]
    fn honours_output_size() {
        let options = FilterOptions {
            output_size: 32,
            jpeg_quality: 90,
        };
        let jpeg = filter_to_jpeg(&sample_png(10, 100), options).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 32));
    }

    #[test]
    fn is_deterministic() {
        let source = sample_png(40, 40);
        let first = filter_to_jpeg(&source, FilterOptions::default()).unwrap();
        let second = filter_to_jpeg(&source, FilterOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_non_image_bytes() {
        assert!(filter_to_jpeg(b"<html>not an image</html>", FilterOptions::default()).is_err());
    }

    #[test]
    fn decode_failure_keeps_decoder_error() {
        let err = decode_source(b"GIF89a truncated").unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("all decoders failed"));
        assert!(chain.contains("image crate failed to decode"));
    }

    #[test]
    fn rejects_empty_body() {
        assert!(decode_source(&[]).is_err());
    }
}
