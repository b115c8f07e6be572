//! Decoding a chunk of fed input in one call.

use super::Decoder;
use crate::engine::Status;
use crate::error::EngineError;

/// Output bytes requested from the engine per step.
pub const DECODE_CHUNK_SIZE: usize = 32 * 1024;

impl Decoder {
    /// Feeds `input` and appends everything that can be decoded so far to `out`.
    ///
    /// Returns the number of bytes appended. Input that ends in the middle of a frame is kept
    /// for the next call. On error the bytes appended before the error stay in `out`. Feed
    /// mode only.
    pub fn decode_into(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize, EngineError> {
        self.feed(input)?;

        let start = out.len();
        loop {
            let filled = out.len();
            out.resize(filled + DECODE_CHUNK_SIZE, 0);
            let result = self.read_status(&mut out[filled..]);
            let n = match &result {
                Ok((n, _)) => *n,
                Err(_) => 0,
            };
            out.truncate(filled + n);

            match result? {
                (_, Status::NeedMore | Status::Done) => return Ok(out.len() - start),
                (_, Status::Ok | Status::NewFormat) => {}
            }
        }
    }

    /// Feeds `input` and returns everything that can be decoded so far.
    ///
    /// Unlike [`Decoder::decode_into`], output decoded before an error is dropped.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        self.decode_into(input, &mut out)?;
        Ok(out)
    }
}
