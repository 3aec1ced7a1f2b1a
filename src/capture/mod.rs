pub mod decoder;
pub mod frame;
pub mod http;
pub mod mjpeg;
pub mod source;
pub mod v4l2;

pub use decoder::{DecodeError, FrameDecoder, JpegDecoder};
pub use frame::{Frame, FrameMetadata};
pub use mjpeg::{extract_frames, FrameDelimiter};
pub use source::{open_source, CaptureError, FrameSource, MjpegSource, SourceKind};
pub use v4l2::V4l2Source;
