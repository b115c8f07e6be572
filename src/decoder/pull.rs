//! Pulling PCM out of a file-like source.

use std::io;

use super::Decoder;
use crate::engine::Status;
use crate::error::{EngineError, Error};

/// Result of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// `n` bytes were written and the stream goes on. `n` may be 0 when nothing was
    /// available yet or a new output format was announced.
    More(usize),
    /// The stream ended. The `n` bytes written by this call still have to be consumed.
    End(usize),
}

impl Progress {
    /// Bytes written by the call.
    pub fn bytes(self) -> usize {
        match self {
            Progress::More(n) | Progress::End(n) => n,
        }
    }

    /// Whether the stream ended with this pull.
    pub fn is_end(self) -> bool {
        matches!(self, Progress::End(_))
    }
}

impl Decoder {
    /// Reads decoded PCM into `buf`.
    pub fn read_pcm(&mut self, buf: &mut [u8]) -> Result<Progress, EngineError> {
        let (n, status) = self.read_status(buf)?;
        Ok(match status {
            Status::Done => Progress::End(n),
            Status::Ok | Status::NewFormat | Status::NeedMore => Progress::More(n),
        })
    }

    /// Reads up to `frames` PCM frames of the current output format into `buf`.
    ///
    /// When the output format changes the call returns `Progress::More(0)` before any byte
    /// of the new format; the next call sizes its frames by the new format.
    ///
    /// # Errors
    ///
    /// [`Error::BufferTooSmall`] if `buf` cannot hold `frames` frames; nothing is decoded then.
    pub fn read_frames(&mut self, frames: usize, buf: &mut [u8]) -> Result<Progress, Error> {
        let (needed, _) = self.frame_bytes(frames, buf.len())?;
        Ok(self.read_pcm(&mut buf[..needed])?)
    }

    /// Decodes `frames` PCM frames into `buf`, reading repeatedly until the request is
    /// satisfied or the stream ends.
    ///
    /// Returns the number of whole frames written. A format change met before any frame is
    /// written is taken over silently; met later, it ends the call with the frames of the old
    /// format. 0 means the stream had already ended, or in feed mode that the fed input ran
    /// out.
    pub fn decode_samples(&mut self, frames: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let (mut needed, mut bytes_per_frame) = self.frame_bytes(frames, buf.len())?;

        let mut filled = 0;
        while filled < needed {
            match self.read_status(&mut buf[filled..needed])? {
                (0, Status::NewFormat) if filled == 0 => {
                    (needed, bytes_per_frame) = self.frame_bytes(frames, buf.len())?;
                }
                (_, Status::NewFormat) => break,
                (n, Status::Ok) => filled += n,
                (n, Status::NeedMore | Status::Done) => {
                    filled += n;
                    break;
                }
            }
        }
        Ok(filled / bytes_per_frame)
    }

    /// Bytes needed for `frames` frames of the current format, and the bytes per frame.
    fn frame_bytes(&mut self, frames: usize, available: usize) -> Result<(usize, usize), Error> {
        let bytes_per_frame = self.format()?.bytes_per_frame();
        let needed = frames.saturating_mul(bytes_per_frame);
        if available < needed {
            return Err(Error::BufferTooSmall { needed, available });
        }
        Ok((needed, bytes_per_frame))
    }
}

/// PCM bytes of the current source.
///
/// Returns `Ok(0)` only at the end of the stream. In feed mode an exhausted feed is reported
/// as [`io::ErrorKind::WouldBlock`].
impl io::Read for Decoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.read_status(buf)? {
                (0, Status::Done) => return Ok(0),
                (0, Status::NeedMore) => return Err(io::ErrorKind::WouldBlock.into()),
                (0, Status::Ok | Status::NewFormat) => {}
                (n, _) => return Ok(n),
            }
        }
    }
}
