use std::time::Instant;

use image::RgbImage;

/// A decoded frame, owned by a single pipeline iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Height x width x RGB samples
    pub image: RgbImage,

    /// Frame metadata
    pub meta: FrameMetadata,
}

/// Frame metadata
#[derive(Debug, Clone, Copy)]
pub struct FrameMetadata {
    /// Position in the stream among successfully decoded frames, starting at 1
    pub sequence: u64,
    /// Size of the encoded JPEG the frame was decoded from
    pub encoded_len: usize,
    /// When the source finished decoding, for latency tracking
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64, encoded_len: usize) -> Self {
        Self {
            image,
            meta: FrameMetadata {
                sequence,
                encoded_len,
                timestamp: Instant::now(),
            },
        }
    }
}
