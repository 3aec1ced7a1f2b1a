//! Motion-JPEG frame delimiting over an append-only byte buffer

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

/// JPEG start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Pull every complete frame out of `buffer`, in stream order.
///
/// Consumed bytes (leading garbage, the frames themselves, and degenerate
/// matches where an end marker precedes the first start marker) are dropped
/// from the front of `buffer`. Whatever trails the last end marker stays put.
pub fn extract_frames(buffer: &mut BytesMut) -> Vec<Bytes> {
    let mut frames = Vec::new();
    let mut scan = Scan::default();
    while let Some(frame) = next_frame(buffer, &mut scan) {
        frames.push(frame);
    }
    frames
}

/// Search progress over the current buffer. No start marker begins before
/// `soi`, no end marker before `eoi`. Appending keeps both valid.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Scan {
    soi: usize,
    eoi: usize,
    degenerate: u64,
}

impl Scan {
    fn consumed(&mut self, n: usize) {
        self.soi = self.soi.saturating_sub(n);
        self.eoi = self.eoi.saturating_sub(n);
    }
}

/// First `marker` at or after `*from`. Moves `*from` up to the match, or to
/// the last byte when there is none, since a marker may straddle the tail.
fn find_marker(haystack: &[u8], marker: [u8; 2], from: &mut usize) -> Option<usize> {
    let found = haystack
        .get(*from..)
        .and_then(|tail| tail.windows(2).position(|w| w == marker))
        .map(|pos| pos + *from);
    *from = found.unwrap_or_else(|| haystack.len().saturating_sub(1));
    found
}

/// Yield the next delimited frame, counting any degenerate matches dropped on
/// the way.
fn next_frame(buffer: &mut BytesMut, scan: &mut Scan) -> Option<Bytes> {
    loop {
        let start = find_marker(buffer, SOI, &mut scan.soi)?;
        let end = find_marker(buffer, EOI, &mut scan.eoi)? + EOI.len();

        if end <= start {
            // Stray end marker ahead of the first start marker: nothing to
            // yield between them, so skip past it and look again.
            debug!(start, end, "dropping degenerate MJPEG match");
            scan.degenerate += 1;
            buffer.advance(end);
            scan.consumed(end);
            continue;
        }

        let mut consumed = buffer.split_to(end);
        consumed.advance(start);
        scan.consumed(end);
        return Some(consumed.freeze());
    }
}

/// Stateful wrapper around the stream buffer, with an upper bound on how much
/// may accumulate between markers.
#[derive(Debug)]
pub struct FrameDelimiter {
    buf: BytesMut,
    max_len: usize,
    scan: Scan,
}

/// The buffer still exceeds its limit after every complete frame was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub len: usize,
    pub max_len: usize,
}

impl FrameDelimiter {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
            scan: Scan::default(),
        }
    }

    /// Append transport bytes at the tail.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        next_frame(&mut self.buf, &mut self.scan)
    }

    /// Bytes waiting for the rest of their frame.
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    /// Number of degenerate matches dropped so far.
    pub fn degenerate_matches(&self) -> u64 {
        self.scan.degenerate
    }

    /// Call once `next_frame` has returned `None`.
    pub fn check_capacity(&self) -> Result<(), Overflow> {
        if self.buf.len() > self.max_len {
            return Err(Overflow {
                len: self.buf.len(),
                max_len: self.max_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> BytesMut {
        BytesMut::from(bytes)
    }

    #[test]
    fn extracts_frame_between_garbage() {
        let mut buf = buffer(b"garbage\xff\xd8<jpgbytes>\xff\xd9more");
        let frames = extract_frames(&mut buf);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"\xff\xd8<jpgbytes>\xff\xd9");
        assert_eq!(&buf[..], b"more");
    }

    #[test]
    fn waits_for_end_marker() {
        let mut buf = buffer(b"\xff\xd8partial");
        assert!(extract_frames(&mut buf).is_empty());
        assert!(extract_frames(&mut buf).is_empty());
        assert_eq!(&buf[..], b"\xff\xd8partial");
    }

    #[test]
    fn waits_for_start_marker() {
        let mut buf = buffer(b"no markers here");
        assert!(extract_frames(&mut buf).is_empty());
        assert_eq!(&buf[..], b"no markers here");
    }

    #[test]
    fn yields_back_to_back_frames_in_order() {
        let mut buf = buffer(b"\xff\xd8one\xff\xd9\xff\xd8two\xff\xd9\xff\xd8thr");
        let frames = extract_frames(&mut buf);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"\xff\xd8one\xff\xd9");
        assert_eq!(&frames[1][..], b"\xff\xd8two\xff\xd9");
        assert_eq!(&buf[..], b"\xff\xd8thr");
    }

    #[test]
    fn skips_end_marker_preceding_start() {
        let mut delimiter = FrameDelimiter::new(1024);
        delimiter.extend(b"tail\xff\xd9junk\xff\xd8img\xff\xd9rest");

        let frame = delimiter.next_frame().unwrap();
        assert_eq!(&frame[..], b"\xff\xd8img\xff\xd9");
        assert_eq!(delimiter.remainder(), b"rest");
        assert_eq!(delimiter.degenerate_matches(), 1);
        assert!(delimiter.next_frame().is_none());
    }

    #[test]
    fn degenerate_match_without_following_frame_is_dropped() {
        let mut delimiter = FrameDelimiter::new(1024);
        delimiter.extend(b"\xff\xd9\xff\xd8abc");

        assert!(delimiter.next_frame().is_none());
        assert_eq!(delimiter.remainder(), b"\xff\xd8abc");
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut delimiter = FrameDelimiter::new(1024);
        delimiter.extend(b"xx\xff");
        assert!(delimiter.next_frame().is_none());
        delimiter.extend(b"\xd8body\xff");
        assert!(delimiter.next_frame().is_none());
        delimiter.extend(b"\xd9");

        let frame = delimiter.next_frame().unwrap();
        assert_eq!(&frame[..], b"\xff\xd8body\xff\xd9");
        assert!(delimiter.remainder().is_empty());
    }

    #[test]
    fn appended_bytes_resume_the_search() {
        let mut delimiter = FrameDelimiter::new(4096);
        delimiter.extend(&[0x11; 1000]);
        delimiter.extend(b"\xff\xd8");
        delimiter.extend(&[0x22; 500]);
        assert!(delimiter.next_frame().is_none());
        assert_eq!(delimiter.scan.soi, 1000);
        assert_eq!(delimiter.scan.eoi, 1501);

        delimiter.extend(b"\xff");
        assert!(delimiter.next_frame().is_none());
        assert_eq!(delimiter.scan.eoi, 1502);

        delimiter.extend(b"\xd9\xff\xd8next");
        let frame = delimiter.next_frame().unwrap();
        assert_eq!(frame.len(), 2 + 500 + 2);
        assert_eq!(delimiter.remainder(), b"\xff\xd8next");
        assert!(delimiter.next_frame().is_none());
        assert_eq!(delimiter.scan.soi, 0);
    }

    #[test]
    fn capacity_is_checked_against_remainder() {
        let mut delimiter = FrameDelimiter::new(8);
        delimiter.extend(b"\xff\xd8a\xff\xd9\xff\xd8bb");
        assert!(delimiter.next_frame().is_some());
        assert!(delimiter.check_capacity().is_ok());

        delimiter.extend(b"cccccc");
        assert!(delimiter.next_frame().is_none());
        assert_eq!(
            delimiter.check_capacity(),
            Err(Overflow { len: 10, max_len: 8 })
        );
    }
}
