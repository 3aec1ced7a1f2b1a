//! HTTP transport for MJPEG endpoints (e.g. an ESP32-CAM `/stream`)

use std::io::Read;
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::source::CaptureError;
use crate::StreamConfig;

/// Issue the GET and hand back the response body as an unbounded byte stream.
///
/// Any non-success status or connection failure is a `CaptureError::Connect`;
/// there is no retry.
pub fn connect(url: &str, config: &StreamConfig) -> Result<Box<dyn Read + Send + Sync>, CaptureError> {
    info!("Connecting to stream at {}...", url);

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.read_timeout_ms))
        .build();

    let connect_error = |reason: String| CaptureError::Connect {
        endpoint: url.to_string(),
        reason,
    };

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => connect_error(format!("HTTP status {code}")),
        ureq::Error::Transport(t) => connect_error(t.to_string()),
    })?;

    debug!(
        status = response.status(),
        content_type = response.content_type(),
        "Stream response received"
    );

    Ok(response.into_reader())
}
