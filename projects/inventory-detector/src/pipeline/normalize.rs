use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{NormalizedImage, UploadedImage, ACCEPTED_EXTENSIONS};
use image::ImageReader;
use std::io::Cursor;

/// Decode an upload and coerce it to 8-bit RGB.
///
/// Alpha and palette images are flattened; RGB input passes through unchanged.
pub fn normalize(upload: &UploadedImage) -> Result<NormalizedImage, PipelineError> {
    if let Some(ext) = upload.extension() {
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(PipelineError::Decode(format!(
                "unsupported file type `.{}` (expected one of: {})",
                ext,
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }
    }

    if upload.bytes.is_empty() {
        return Err(PipelineError::Decode("the upload is empty".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(upload.bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    if reader.format().is_none() {
        return Err(PipelineError::Decode(
            "the upload is not a recognized image format".to_string(),
        ));
    }

    let decoded = reader
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    Ok(NormalizedImage {
        image: decoded.to_rgb8(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn rgba_png_becomes_rgb() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let upload = UploadedImage::new(bytes).with_file_name("shelf.png");

        let normalized = normalize(&upload).unwrap();
        assert_eq!((normalized.width(), normalized.height()), (4, 3));
        assert_eq!(normalized.image.get_pixel(0, 0).0, [10, 20, 30]);
    }

    fn indexed_png(width: u32, height: u32, palette: &[u8], indices: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, width, height);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(palette.to_vec());
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(indices).unwrap();
        }
        bytes
    }

    #[test]
    fn palette_png_becomes_rgb() {
        let palette = [255, 0, 0, 0, 0, 255];
        let bytes = indexed_png(2, 1, &palette, &[0, 1]);
        let upload = UploadedImage::new(bytes).with_file_name("palette.png");

        let normalized = normalize(&upload).unwrap();
        assert_eq!((normalized.width(), normalized.height()), (2, 1));
        assert_eq!(normalized.image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(normalized.image.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn grayscale_alpha_becomes_rgb() {
        let gray = image::GrayAlphaImage::from_pixel(3, 3, image::LumaA([77, 10]));
        let bytes = encode(DynamicImage::ImageLumaA8(gray), ImageFormat::Png);
        let upload = UploadedImage::new(bytes).with_file_name("gray.png");

        let normalized = normalize(&upload).unwrap();
        assert_eq!(normalized.image.get_pixel(1, 1).0, [77, 77, 77]);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let upload = UploadedImage::new(b"definitely not an image".to_vec());
        assert!(matches!(normalize(&upload), Err(PipelineError::Decode(_))));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let rgba = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        let mut bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        bytes.truncate(bytes.len() / 2);
        let upload = UploadedImage::new(bytes).with_file_name("broken.png");
        assert!(matches!(normalize(&upload), Err(PipelineError::Decode(_))));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let upload = UploadedImage::new(bytes).with_file_name("shelf.gif");
        assert!(matches!(normalize(&upload), Err(PipelineError::Decode(_))));
    }
}
