//! TCP Frame Codec
//!
//! Wire format for individual frames on a TCP connection, with a CRC32
//! checksum for integrity verification.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+-----------+----------------+------------------------+
//! | Length (4)     | Flags (1) | Checksum (4)   | Data (variable)        |
//! | big-endian u32 | bit 0=MORE| CRC32 of data  | raw frame bytes        |
//! +----------------+-----------+----------------+------------------------+
//! ```
//!
//! The Length field counts the data only. This is transport framing: the
//! sender layer above still puts nothing around the metadata and payload.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use super::Frame;

/// Maximum frame size (64 MB)
///
/// Bounds what a decoder will buffer for a single frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Frame header size: 4 bytes length + 1 byte flags + 4 bytes checksum
pub const HEADER_SIZE: usize = 9;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

const FLAG_MORE: u8 = 0x01;

/// Errors produced while encoding or decoding frames
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Frame exceeds `MAX_FRAME_SIZE`
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Size of the frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame checksum mismatch - data corruption detected
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header
        expected: u32,
        /// Checksum computed over the data
        actual: u32,
    },
}

/// Compute CRC32 checksum for frame data
#[inline]
fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Encode a frame for the wire
///
/// # Errors
///
/// Returns `CodecError::FrameTooLarge` if the data exceeds `MAX_FRAME_SIZE`.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    let data = &frame.data;
    if data.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: data.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let len = data.len() as u32;
    let flags = if frame.more { FLAG_MORE } else { 0 };

    let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.push(flags);
    buf.extend_from_slice(&compute_checksum(data).to_be_bytes());
    buf.extend_from_slice(data);
    Ok(buf)
}

/// Streaming decoder
///
/// Buffers incoming bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MIN_BUFFER_CAPACITY),
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(..)` if the frame is oversized or corrupt; the stream cannot be
    ///   resynchronized after that
    pub fn decode(&mut self) -> Result<Option<Frame>, CodecError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[..HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let flags = header[4];
        let expected = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);

        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if self.buffer.len() < HEADER_SIZE + len {
            return Ok(None);
        }

        let actual = compute_checksum(&self.buffer[HEADER_SIZE..HEADER_SIZE + len]);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        self.buffer.advance(HEADER_SIZE);
        let data: Bytes = self.buffer.split_to(len).freeze();

        Ok(Some(Frame {
            data,
            more: flags & FLAG_MORE != 0,
        }))
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let encoded = encode(&Frame::more(&b"topic"[..])).unwrap();

        assert_eq!(encoded.len(), HEADER_SIZE + 5);
        assert_eq!(&encoded[..4], &5u32.to_be_bytes());
        assert_eq!(encoded[4], FLAG_MORE);
        assert_eq!(&encoded[5..9], &crc32fast::hash(b"topic").to_be_bytes());
        assert_eq!(&encoded[9..], b"topic");
    }

    #[test]
    fn test_empty_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode(&Frame::more(Bytes::new())).unwrap());

        let frame = decoder.decode().unwrap().unwrap();
        assert!(frame.data.is_empty());
        assert!(frame.more);
    }

    #[test]
    fn test_decode_partial_header() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0, 0, 0, 5, 0]);

        assert_eq!(decoder.decode(), Ok(None));
    }

    #[test]
    fn test_decode_partial_data() {
        let encoded = encode(&Frame::last(&b"split across reads"[..])).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded[..encoded.len() / 2]);
        assert_eq!(decoder.decode(), Ok(None));

        decoder.push(&encoded[encoded.len() / 2..]);
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(frame, Frame::last(&b"split across reads"[..]));
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_message_frames_in_order() {
        let mut wire = encode(&Frame::more(&b"meta"[..])).unwrap();
        wire.extend(encode(&Frame::last(&b"payload"[..])).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&wire);

        assert_eq!(decoder.decode().unwrap(), Some(Frame::more(&b"meta"[..])));
        assert_eq!(decoder.decode().unwrap(), Some(Frame::last(&b"payload"[..])));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        decoder.push(&[0u8; 5]);

        assert!(matches!(
            decoder.decode(),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut encoded = encode(&Frame::last(&b"payload"[..])).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded);

        assert!(matches!(
            decoder.decode(),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }
}
