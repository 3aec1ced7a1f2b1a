use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JPEG decode failed: {0}")]
    Jpeg(String),
    #[error("decoder returned no image info")]
    MissingInfo,
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),
    #[error("decoded {len} bytes do not fill a {width}x{height} RGB frame")]
    SizeMismatch { width: u32, height: u32, len: usize },
}

/// Turns one delimited JPEG into an RGB pixel grid.
pub trait FrameDecoder {
    fn decode(&mut self, jpeg: &[u8]) -> Result<RgbImage, DecodeError>;
}

/// Software JPEG decoder, zune-jpeg with the `fast-jpeg` feature and
/// jpeg-decoder otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegDecoder;

impl JpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for JpegDecoder {
    #[cfg(feature = "fast-jpeg")]
    fn decode(&mut self, jpeg: &[u8]) -> Result<RgbImage, DecodeError> {
        use zune_jpeg::zune_core::{colorspace::ColorSpace, options::DecoderOptions};

        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = zune_jpeg::JpegDecoder::new_with_options(jpeg, options);
        let pixels = decoder
            .decode()
            .map_err(|e| DecodeError::Jpeg(format!("{e:?}")))?;
        let (width, height) = decoder.dimensions().ok_or(DecodeError::MissingInfo)?;

        into_rgb_image(width as u32, height as u32, pixels)
    }

    #[cfg(not(feature = "fast-jpeg"))]
    fn decode(&mut self, jpeg: &[u8]) -> Result<RgbImage, DecodeError> {
        use jpeg_decoder::{Decoder, PixelFormat};

        let mut decoder = Decoder::new(jpeg);
        let pixels = decoder
            .decode()
            .map_err(|e| DecodeError::Jpeg(e.to_string()))?;
        let info = decoder.info().ok_or(DecodeError::MissingInfo)?;

        let rgb = match info.pixel_format {
            PixelFormat::RGB24 => pixels,
            PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
            other => return Err(DecodeError::UnsupportedFormat(format!("{other:?}"))),
        };

        into_rgb_image(u32::from(info.width), u32::from(info.height), rgb)
    }
}

fn into_rgb_image(width: u32, height: u32, pixels: Vec<u8>) -> Result<RgbImage, DecodeError> {
    let len = pixels.len();
    RgbImage::from_raw(width, height, pixels).ok_or(DecodeError::SizeMismatch {
        width,
        height,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::Rgb;

    fn encode(image: &RgbImage) -> Vec<u8> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(image)
            .unwrap();
        jpeg
    }

    #[test]
    fn decodes_encoded_frame() {
        let source = RgbImage::from_pixel(32, 16, Rgb([200, 40, 40]));
        let frame = JpegDecoder::new().decode(&encode(&source)).unwrap();

        assert_eq!(frame.dimensions(), (32, 16));
        let px = frame.get_pixel(8, 8);
        assert!(px[0] > 150 && px[1] < 100 && px[2] < 100, "{px:?}");
    }

    #[test]
    fn rejects_jpeg_cut_inside_headers() {
        let source = RgbImage::from_pixel(32, 32, Rgb([10, 200, 10]));
        let jpeg = encode(&source);
        let truncated = &jpeg[..120];

        assert!(JpegDecoder::new().decode(truncated).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(JpegDecoder::new().decode(b"\xff\xd8<jpgbytes>\xff\xd9").is_err());
    }
}
