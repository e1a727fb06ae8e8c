use bytes::{Buf, BytesMut};

use super::{Frame, FrameHeader, WireError, HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};

/// Incremental frame parser over a byte stream.
///
/// Chunks may split frames anywhere. [`FrameReader::next_frame`] only ever consumes whole
/// frames, so the buffered tail is preserved byte for byte between pushes.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Cuts the next complete frame off the buffer.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. A bad length prefix is
    /// [fatal](WireError::is_fatal) and leaves the buffer untouched; a frame with a bad
    /// header is consumed before the error is returned, so parsing can resume after it.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, WireError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let frame_len = length as usize;
        if frame_len < HEADER_SIZE {
            return Err(WireError::InvalidLength { length });
        }
        if frame_len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge { size: frame_len });
        }
        if self.buf.len() < LENGTH_PREFIX_SIZE + frame_len {
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        let mut frame = self.buf.split_to(frame_len).freeze();
        let header = FrameHeader::parse(&frame)?;
        frame.advance(HEADER_SIZE);
        Ok(Some(Frame {
            header,
            payload: frame,
        }))
    }

    /// Every complete frame currently buffered, stopping at the first fatal error.
    pub fn drain(&mut self) -> Vec<Result<Frame, WireError>> {
        let mut out = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => break,
                Err(e) => {
                    let fatal = e.is_fatal();
                    out.push(Err(e));
                    if fatal {
                        break;
                    }
                }
            }
        }
        out
    }
}

impl WireError {
    /// True when the stream can no longer be resynchronized.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireError::InvalidLength { .. } | WireError::FrameTooLarge { .. }
        )
    }
}
