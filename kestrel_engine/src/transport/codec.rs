use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

/// Longest inbound line accepted, tags included
pub(super) const MAX_LINE_LEN: usize = 8191 + 512;

/// Splits inbound data on `\n`. A line longer than [`MAX_LINE_LEN`] is
/// dropped up to its terminator and reading carries on with the next one;
/// only I/O errors are reported.
pub(super) struct LineCodec {
    inner: AnyDelimiterCodec,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_LEN),
        }
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        loop {
            match self.inner.decode(src) {
                Ok(line) => return Ok(line),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    tracing::warn!(max = MAX_LINE_LEN, "skipping overlong line");
                }
                Err(AnyDelimiterCodecError::Io(e)) => return Err(e),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        loop {
            match self.inner.decode_eof(src) {
                Ok(line) => return Ok(line),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    tracing::warn!(max = MAX_LINE_LEN, "skipping overlong line");
                }
                Err(AnyDelimiterCodecError::Io(e)) => return Err(e),
            }
        }
    }
}
