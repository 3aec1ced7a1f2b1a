//! Frame sources: anything that yields decoded frames in stream order

use std::io::{self, Read};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capture::decoder::{FrameDecoder, JpegDecoder};
use crate::capture::frame::Frame;
use crate::capture::mjpeg::FrameDelimiter;
use crate::capture::{http, v4l2::V4l2Source};
use crate::session::StopSignal;
use crate::{utils, StreamConfig};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("transport read failed: {0}")]
    Read(#[from] io::Error),
    #[error("stream buffer holds {len} bytes without a complete frame (limit {max_len})")]
    BufferOverflow { len: usize, max_len: usize },
    #[error("capture device error: {0}")]
    Device(String),
}

/// Produces decoded frames one at a time.
///
/// Decode failures are absorbed by the source: the offending frame is skipped
/// and never surfaces, so callers only see frames that decoded. `Ok(None)`
/// means the transport ended cleanly.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Frames dropped because they failed to decode.
    fn decode_failures(&self) -> u64;

    /// Delimiter matches dropped without yielding a frame.
    fn degenerate_matches(&self) -> u64 {
        0
    }

    /// Give up on the current pull, returning `Ok(None)`, once `stop` fires
    /// between reads or after a skipped frame.
    fn watch(&mut self, _stop: &StopSignal) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).next_frame()
    }

    fn decode_failures(&self) -> u64 {
        (**self).decode_failures()
    }

    fn degenerate_matches(&self) -> u64 {
        (**self).degenerate_matches()
    }

    fn watch(&mut self, stop: &StopSignal) {
        (**self).watch(stop)
    }
}

/// MJPEG over any byte transport: read chunks, delimit, decode.
pub struct MjpegSource<R, D> {
    reader: R,
    decoder: D,
    delimiter: FrameDelimiter,
    chunk: Vec<u8>,
    sequence: u64,
    decode_failures: u64,
    stop: Option<StopSignal>,
}

impl<R: Read, D: FrameDecoder> MjpegSource<R, D> {
    pub fn new(reader: R, decoder: D, config: &StreamConfig) -> Self {
        Self {
            reader,
            decoder,
            delimiter: FrameDelimiter::new(config.max_buffer_bytes),
            chunk: vec![0; config.chunk_size],
            sequence: 0,
            decode_failures: 0,
            stop: None,
        }
    }

    /// Bytes currently waiting for the rest of their frame.
    pub fn pending(&self) -> &[u8] {
        self.delimiter.remainder()
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(StopSignal::is_triggered)
    }

    /// Returns false once the transport reports end of stream.
    fn fill(&mut self) -> Result<bool, CaptureError> {
        let n = loop {
            match self.reader.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(false);
        }
        self.delimiter.extend(&self.chunk[..n]);
        Ok(true)
    }
}

impl<R: Read, D: FrameDecoder> FrameSource for MjpegSource<R, D> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            while let Some(jpeg) = self.delimiter.next_frame() {
                match self.decoder.decode(&jpeg) {
                    Ok(image) => {
                        self.sequence += 1;
                        metrics::counter!("frames_decoded").increment(1);
                        return Ok(Some(Frame::new(image, self.sequence, jpeg.len())));
                    }
                    Err(e) => {
                        self.decode_failures += 1;
                        metrics::counter!("decode_failures").increment(1);
                        warn!(bytes = jpeg.len(), "Skipping undecodable frame: {}", e);
                        if self.stop_requested() {
                            return Ok(None);
                        }
                    }
                }
            }

            self.delimiter
                .check_capacity()
                .map_err(|o| CaptureError::BufferOverflow {
                    len: o.len,
                    max_len: o.max_len,
                })?;

            if self.stop_requested() {
                return Ok(None);
            }
            if !self.fill()? {
                debug!(
                    pending = self.delimiter.remainder().len(),
                    "Transport reached end of stream"
                );
                return Ok(None);
            }
        }
    }

    fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    fn degenerate_matches(&self) -> u64 {
        self.delimiter.degenerate_matches()
    }

    fn watch(&mut self, stop: &StopSignal) {
        self.stop = Some(stop.clone());
    }
}

/// Where frames come from, picked from `stream.endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// MJPEG over HTTP
    Http(String),
    /// V4L2 device path
    Device(String),
    /// First V4L2 device offering MJPEG
    AutoDevice,
}

impl SourceKind {
    pub fn from_endpoint(endpoint: &str) -> Self {
        let endpoint = endpoint.trim();
        if endpoint.eq_ignore_ascii_case("auto") {
            SourceKind::AutoDevice
        } else if endpoint.starts_with("/dev/") {
            SourceKind::Device(endpoint.to_string())
        } else {
            SourceKind::Http(endpoint.to_string())
        }
    }
}

/// Connect to the configured endpoint. Failure here is fatal to the session.
#[instrument(skip(config), fields(endpoint = %config.endpoint))]
pub fn open_source(config: &StreamConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    match SourceKind::from_endpoint(&config.endpoint) {
        SourceKind::Http(url) => {
            let reader = http::connect(&url, config)?;
            info!("Connected to MJPEG stream at {}", url);
            Ok(Box::new(MjpegSource::new(reader, JpegDecoder::new(), config)))
        }
        SourceKind::Device(path) => Ok(Box::new(V4l2Source::open(&path, JpegDecoder::new())?)),
        SourceKind::AutoDevice => {
            let path = utils::auto_detect_device()?;
            Ok(Box::new(V4l2Source::open(&path, JpegDecoder::new())?))
        }
    }
}
