//! Direct V4L2 capture: the device hands over one JPEG per buffer, so no
//! delimiting is needed

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder::FrameDecoder;
use crate::capture::frame::Frame;
use crate::capture::source::{CaptureError, FrameSource};
use crate::session::StopSignal;

const BUFFER_COUNT: u32 = 4;

fn device_error(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Device(e.to_string())
}

/// V4L2 MJPEG capture feeding a decoder
pub struct V4l2Source<D> {
    stream: MmapStream<'static>,
    // Keeps the device open for the lifetime of the stream
    _device: Device,
    decoder: D,
    sequence: u64,
    decode_failures: u64,
    stop: Option<StopSignal>,
}

impl<D: FrameDecoder> V4l2Source<D> {
    /// Open `path`, request MJPEG and start streaming.
    pub fn open(path: &str, decoder: D) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {}", path);

        let device = Device::with_path(path).map_err(device_error)?;

        let caps = device.query_caps().map_err(device_error)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(format!(
                "{path} doesn't support video capture"
            )));
        }

        let mut fmt = device.format().map_err(device_error)?;
        fmt.fourcc = FourCC::new(b"MJPG");
        let fmt = device.set_format(&fmt).map_err(device_error)?;
        if fmt.fourcc != FourCC::new(b"MJPG") {
            return Err(CaptureError::Device(format!(
                "{path} refused MJPEG, negotiated {}",
                fmt.fourcc
            )));
        }
        info!("Negotiated {}x{} MJPEG", fmt.width, fmt.height);

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(device_error)?;
        info!("Capture stream started with {} buffers", BUFFER_COUNT);

        Ok(Self {
            stream,
            _device: device,
            decoder,
            sequence: 0,
            decode_failures: 0,
            stop: None,
        })
    }
}

impl<D: FrameDecoder> FrameSource for V4l2Source<D> {
    #[instrument(skip(self))]
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            let (buf, meta) = self.stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            let jpeg = &buf[..used];

            match self.decoder.decode(jpeg) {
                Ok(image) => {
                    self.sequence += 1;
                    metrics::counter!("frames_decoded").increment(1);
                    return Ok(Some(Frame::new(image, self.sequence, used)));
                }
                Err(e) => {
                    self.decode_failures += 1;
                    metrics::counter!("decode_failures").increment(1);
                    warn!(bytes = used, "Skipping undecodable frame: {}", e);
                    if self.stop.as_ref().is_some_and(StopSignal::is_triggered) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    fn watch(&mut self, stop: &StopSignal) {
        self.stop = Some(stop.clone());
    }
}
