//! Docker multiplexed stream decoding.
//!
//! Non-TTY log and exec output arrives as a sequence of frames:
//!
//! ```text
//! [stream_type (1 byte)][0, 0, 0][size (4 bytes BE)][data]
//! ```
//!
//! stream_type: 0 = stdin, 1 = stdout, 2 = stderr

use bytes::Bytes;

/// Frame header length.
const HEADER_LEN: usize = 8;

/// Stdin stream type.
pub const STDIN: u8 = 0;
/// Stdout stream type.
pub const STDOUT: u8 = 1;
/// Stderr stream type.
pub const STDERR: u8 = 2;

/// Extracts a single frame from the front of a buffer.
///
/// Returns `(stream_type, content)` if a complete frame is available.
#[must_use]
pub fn extract_frame(buffer: &[u8]) -> Option<(u8, &[u8])> {
    if buffer.len() < HEADER_LEN {
        return None;
    }

    let stream_type = buffer[0];
    let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;

    let frame_end = HEADER_LEN + size;
    if buffer.len() < frame_end {
        return None;
    }

    Some((stream_type, &buffer[HEADER_LEN..frame_end]))
}

/// Returns whether the buffer starts with a multiplexed frame header.
#[must_use]
pub fn is_multiplexed(buffer: &[u8]) -> bool {
    buffer.len() >= HEADER_LEN && buffer[0] <= STDERR && buffer[1..4] == [0, 0, 0]
}

/// Splits a raw stream into `(stream_type, data)` frames.
///
/// TTY streams are not multiplexed; they are returned as a single stdout frame.
/// A trailing partial frame is returned as stdout data.
#[must_use]
pub fn demux(raw: &[u8]) -> Vec<(u8, Bytes)> {
    if raw.is_empty() {
        return Vec::new();
    }
    if !is_multiplexed(raw) {
        return vec![(STDOUT, Bytes::copy_from_slice(raw))];
    }

    let mut frames = Vec::new();
    let mut rest = raw;
    while let Some((stream_type, content)) = extract_frame(rest) {
        if !content.is_empty() {
            frames.push((stream_type, Bytes::copy_from_slice(content)));
        }
        rest = &rest[HEADER_LEN + content.len()..];
    }

    if !rest.is_empty() {
        tracing::debug!(bytes = rest.len(), "incomplete frame at end of stream");
        frames.push((STDOUT, Bytes::copy_from_slice(rest)));
    }

    frames
}

/// Concatenates stdout and stderr data of a raw stream, in arrival order.
#[must_use]
pub fn combined_output(raw: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(raw.len());
    for (stream_type, data) in demux(raw) {
        if stream_type != STDIN {
            output.extend_from_slice(&data);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_frame(stream_type: u8, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }

        let mut output = Vec::with_capacity(HEADER_LEN + data.len());
        output.push(stream_type);
        output.extend_from_slice(&[0, 0, 0]);
        output.extend_from_slice(&(data.len() as u32).to_be_bytes());
        output.extend_from_slice(data);
        output
    }

    #[test]
    fn test_demux_interleaved_frames() {
        let mut raw = encode_frame(STDOUT, b"first\n");
        raw.extend(encode_frame(STDERR, b"oops\n"));
        raw.extend(encode_frame(STDOUT, b"second\n"));

        let frames = demux(&raw);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], (STDERR, Bytes::from_static(b"oops\n")));
        assert_eq!(combined_output(&raw), b"first\noops\nsecond\n");
    }

    #[test]
    fn test_tty_stream_passes_through() {
        let raw = b"Hello world!\n";
        assert!(!is_multiplexed(raw));
        assert_eq!(combined_output(raw), raw);
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let mut raw = encode_frame(STDOUT, b"done\n");
        raw.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 9, b'x']);

        let frames = demux(&raw);
        assert_eq!(frames[0].1, Bytes::from_static(b"done\n"));
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_extract_frame_needs_full_payload() {
        let raw = encode_frame(STDOUT, b"abcdef");
        assert!(extract_frame(&raw[..10]).is_none());
        assert_eq!(extract_frame(&raw), Some((STDOUT, &b"abcdef"[..])));
    }

    #[test]
    fn test_empty_stream() {
        assert!(demux(&[]).is_empty());
        assert!(encode_frame(STDOUT, b"").is_empty());
    }
}
