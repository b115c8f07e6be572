//! Turning a reader of compressed bytes into a reader of PCM bytes.
//!
//! A [`DecoderReader`] puts its decoder in feed mode and alternates between reading
//! compressed input and draining decoded PCM, so any [`Read`] can be decoded without the
//! decoder seeking on it.
//!
//! # Examples
//!
//! ```no_run
//! use std::io::Read;
//! use mpadec::{Decoder, Encoding};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut decoder = Decoder::new(None, None)?;
//!     let source = std::fs::File::open("audio.mp3")?;
//!     let mut reader = decoder.decoder_reader(source, 44100, 2, Encoding::Signed16)?;
//!
//!     let mut pcm = Vec::new();
//!     reader.read_to_end(&mut pcm)?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io::{self, Read};

use tracing::{debug, error, warn};

use super::{Decoder, SourceState};
use crate::common::{ChannelCount, SampleRate};
use crate::encoding::Encodings;
use crate::engine::Status;
use crate::error::EngineError;
use crate::format::FormatTable;

/// Compressed bytes read from the input at once.
pub const FEED_CHUNK_SIZE: usize = 64 * 1024;

/// Consecutive input errors a lenient [`DecoderReader`] tolerates before giving up.
pub const MAX_INPUT_RETRIES: u32 = 64;

impl Decoder {
    /// Decodes the compressed bytes of `source` into PCM of exactly the given format.
    ///
    /// The output format table is restricted to that single format. Opens feed mode if no
    /// source is open.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFeedMode`] if a file-like source is open, [`EngineError::BadRate`] or
    /// [`EngineError::BadChannels`] for a format that cannot be configured.
    pub fn decoder_reader<R: Read>(
        &mut self,
        source: R,
        rate: SampleRate,
        channels: ChannelCount,
        encoding: impl Into<Encodings>,
    ) -> Result<DecoderReader<'_, R>, EngineError> {
        let mut formats = FormatTable::none();
        formats.set(rate, channels, encoding.into())?;

        match self.state {
            SourceState::Unopened | SourceState::Closed => self.open_feed()?,
            SourceState::Feed => {}
            SourceState::File | SourceState::Descriptor | SourceState::Handle => {
                return Err(EngineError::NotFeedMode)
            }
        }
        self.engine.set_formats(formats);
        Ok(DecoderReader::new(self, source))
    }

    /// Like [`Decoder::decoder_reader`] with a single output channel.
    pub fn mono_decoder_reader<R: Read>(
        &mut self,
        source: R,
        rate: SampleRate,
        encoding: impl Into<Encodings>,
    ) -> Result<DecoderReader<'_, R>, EngineError> {
        self.decoder_reader(source, rate, 1, encoding)
    }
}

/// Reads PCM bytes decoded from a reader of compressed bytes.
///
/// Errors of the input are logged and retried, unless the reader was made
/// [`paranoid`](DecoderReader::paranoid). Once the input and the decoder are exhausted, or
/// after any error that ends the session, the reader is terminated: the decoder source is
/// closed and every further read returns `Ok(0)`.
pub struct DecoderReader<'a, R> {
    decoder: &'a mut Decoder,
    source: R,
    scratch: Box<[u8]>,
    paranoid: bool,
    terminated: bool,
    source_done: bool,
    /// The decoder ran out of fed bytes.
    hungry: bool,
    input_errors: u32,
}

impl<'a, R: Read> DecoderReader<'a, R> {
    fn new(decoder: &'a mut Decoder, source: R) -> Self {
        DecoderReader {
            decoder,
            source,
            scratch: vec![0; FEED_CHUNK_SIZE].into_boxed_slice(),
            paranoid: false,
            terminated: false,
            source_done: false,
            hungry: true,
            input_errors: 0,
        }
    }

    /// Fails on the first input error, returning that error unchanged.
    pub fn paranoid(mut self) -> Self {
        self.paranoid = true;
        self
    }

    /// Ends the session and closes the decoder source. Does nothing when already terminated.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Err(err) = self.decoder.close() {
            warn!("closing decoder failed: {err}");
        }
        debug!("stream reader terminated");
    }

    /// Whether the session ended and every read now returns `Ok(0)`.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Gives back the input reader.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Moves one chunk of compressed input into the decoder.
    fn pump(&mut self) -> io::Result<()> {
        match self.source.read(&mut self.scratch) {
            Ok(0) => {
                debug!("compressed input exhausted");
                self.source_done = true;
                self.decoder.end_feed();
            }
            Ok(n) => {
                self.input_errors = 0;
                self.hungry = false;
                if let Err(err) = self.decoder.feed(&self.scratch[..n]) {
                    warn!("feeding {n} bytes failed: {err}");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if self.paranoid => {
                self.terminate();
                return Err(err);
            }
            Err(err) => {
                self.input_errors += 1;
                if self.input_errors >= MAX_INPUT_RETRIES {
                    error!(attempts = self.input_errors, "giving up on input: {err}");
                    self.terminate();
                    return Err(err);
                }
                warn!(attempt = self.input_errors, "reading input failed: {err}");
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DecoderReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.terminated {
            return Ok(0);
        }

        loop {
            if self.hungry && !self.source_done {
                self.pump()?;
            }

            let (n, status) = match self.decoder.read_status(buf) {
                Ok(read) => read,
                Err(err) => {
                    error!("decoding failed: {err}");
                    self.terminate();
                    return Err(io::Error::new(io::ErrorKind::InvalidData, err));
                }
            };

            match (status, n) {
                (Status::NewFormat, _) => match self.decoder.format() {
                    Ok(format) => debug!(%format, "stream format"),
                    Err(err) => warn!("querying the new format failed: {err}"),
                },
                (Status::NeedMore, n) if n > 0 => {
                    self.hungry = true;
                    return Ok(n);
                }
                (_, n) if n > 0 => return Ok(n),
                (_, _) if self.source_done => {
                    self.terminate();
                    return Ok(0);
                }
                (Status::NeedMore, _) => self.hungry = true,
                (Status::Ok | Status::Done, _) => {}
            }
        }
    }
}

impl<R> fmt::Debug for DecoderReader<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderReader")
            .field("decoder", &self.decoder)
            .field("paranoid", &self.paranoid)
            .field("terminated", &self.terminated)
            .field("source_done", &self.source_done)
            .finish_non_exhaustive()
    }
}
