//! The decoder handle.
//!
//! A [`Decoder`] owns one decoding engine. It is opened on a file, a file descriptor, any
//! seekable reader, or in feed mode where the caller pushes compressed bytes with
//! [`Decoder::feed`]. Decoded PCM comes out of [`Decoder::read_status`] and the higher level
//! helpers built on it:
//!
//! - [`Decoder::read_pcm`], [`Decoder::read_frames`] and [`Decoder::decode_samples`] pull
//!   PCM from a file-like source, and `Decoder` implements [`std::io::Read`].
//! - [`Decoder::decoder_reader`] wraps any [`std::io::Read`] of compressed bytes into a
//!   reader of PCM bytes.
//! - [`Decoder::decode`] decodes one chunk of fed input at once.
//!
//! # Examples
//!
//! ```no_run
//! use std::io::Read;
//! use mpadec::Decoder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut decoder = Decoder::new(None, None)?;
//!     decoder.open("audio.mp3")?;
//!     let format = decoder.format()?;
//!     println!("decoding to {format}");
//!
//!     let mut pcm = Vec::new();
//!     decoder.read_to_end(&mut pcm)?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::common::{ChannelCount, SampleRate};
use crate::encoding::Encodings;
use crate::engine::header::FrameInfo;
use crate::engine::input::Input;
use crate::engine::{Engine, Status};
use crate::error::{EngineError, InitError, OpenError};
use crate::format::{Format, FormatTable};
use crate::params::{Flags, Param};

mod builder;
mod oneshot;
mod pull;
mod reader;

pub use builder::DecoderBuilder;
pub use oneshot::DECODE_CHUNK_SIZE;
pub use pull::Progress;
pub use reader::{DecoderReader, FEED_CHUNK_SIZE, MAX_INPUT_RETRIES};

/// What a decoder is currently reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    /// Nothing was opened yet.
    Unopened,
    File,
    Descriptor,
    /// A caller provided seekable reader.
    Handle,
    /// Compressed bytes arrive through [`Decoder::feed`].
    Feed,
    /// The last source was closed.
    Closed,
}

impl SourceState {
    /// Whether a source is attached.
    pub fn is_open(self) -> bool {
        !matches!(self, SourceState::Unopened | SourceState::Closed)
    }
}

/// A streaming MPEG audio decoder.
pub struct Decoder {
    engine: Engine,
    state: SourceState,
}

impl Decoder {
    /// Creates a decoder with the backend called `backend` and the given flags.
    ///
    /// `None` or an empty name selects the default backend. Flags are applied whether or not
    /// a backend is named.
    ///
    /// # Errors
    ///
    /// Fails with [`InitError::UnknownBackend`] if this build has no backend of that name.
    pub fn new(backend: Option<&str>, flags: Option<Flags>) -> Result<Self, InitError> {
        let mut builder = DecoderBuilder::new();
        if let Some(name) = backend {
            builder = builder.with_backend(name);
        }
        if let Some(flags) = flags {
            builder = builder.with_flags(flags);
        }
        builder.build()
    }

    /// Starts configuring a decoder beyond backend and flags.
    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::new()
    }

    pub(crate) fn from_engine(engine: Engine) -> Self {
        Decoder {
            engine,
            state: SourceState::Unopened,
        }
    }

    /// The kind of source currently open.
    pub fn state(&self) -> SourceState {
        self.state
    }

    fn attach(&mut self, input: Input, state: SourceState) {
        if self.state.is_open() {
            debug!(previous = ?self.state, "closing previous source");
        }
        self.engine.open(input);
        self.state = state;
        debug!(source = ?state, "opened source");
    }

    /// Opens the file at `path`.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), OpenError> {
        let path = path.as_ref();
        let error = |source| OpenError::Path {
            path: path.to_owned(),
            source: Arc::new(source),
        };
        let file = File::open(path).map_err(error)?;
        let input = Input::reader(Box::new(file)).map_err(error)?;
        self.attach(input, SourceState::File);
        Ok(())
    }

    /// Opens an already open file descriptor.
    ///
    /// The descriptor is duplicated; the caller keeps ownership of `fd`.
    #[cfg(unix)]
    pub fn open_fd(&mut self, fd: impl std::os::fd::AsFd) -> Result<(), OpenError> {
        let error = |source| OpenError::Descriptor(Arc::new(source));
        let owned = fd.as_fd().try_clone_to_owned().map_err(error)?;
        let input = Input::reader(Box::new(File::from(owned))).map_err(error)?;
        self.attach(input, SourceState::Descriptor);
        Ok(())
    }

    /// Opens a seekable reader, decoding from its current position.
    pub fn open_handle<R>(&mut self, reader: R) -> Result<(), OpenError>
    where
        R: Read + Seek + Send + 'static,
    {
        let input = Input::reader(Box::new(reader))
            .map_err(|source| OpenError::Handle(Arc::new(source)))?;
        self.attach(input, SourceState::Handle);
        Ok(())
    }

    /// Switches to feed mode: compressed bytes arrive through [`Decoder::feed`].
    pub fn open_feed(&mut self) -> Result<(), EngineError> {
        self.attach(Input::feed(), SourceState::Feed);
        Ok(())
    }

    /// Closes the current source. The handle stays usable for the next open.
    ///
    /// Closing a decoder with nothing open succeeds.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.state.is_open() {
            self.engine.close();
            debug!(source = ?self.state, "closed source");
            self.state = SourceState::Closed;
        }
        Ok(())
    }

    /// Appends compressed bytes.
    ///
    /// Fails with [`EngineError::NotFeedMode`] unless [`Decoder::open_feed`] was called first.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.engine.feed(data)
    }

    /// Tells a feed that no more compressed bytes will follow.
    pub(crate) fn end_feed(&mut self) {
        self.engine.end_feed();
    }

    /// Reads decoded PCM into `buf`.
    ///
    /// Returns the number of bytes written together with the engine status. A
    /// [`Status::NewFormat`] comes with 0 bytes before the first bytes of a new output format.
    /// In feed mode the end of the stream cannot be known, so [`Status::Done`] is never
    /// reported; an exhausted feed reports [`Status::NeedMore`].
    pub fn read_status(&mut self, buf: &mut [u8]) -> Result<(usize, Status), EngineError> {
        self.engine.read(buf)
    }

    /// Feeds `input` and reads decoded PCM into `out` in one step.
    pub fn decode_status(
        &mut self,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<(usize, Status), EngineError> {
        self.engine.decode(input, out)
    }

    /// The current output format.
    ///
    /// Reads ahead to the first frame if no frame was decoded yet; in feed mode that fails
    /// with [`EngineError::NeedMore`] until enough input was fed. Acknowledges a pending
    /// [`Status::NewFormat`].
    pub fn format(&mut self) -> Result<Format, EngineError> {
        self.engine.format()
    }

    /// Allows `encodings` for `rate` with `channels`, replacing what was allowed before.
    ///
    /// Only the standard MPEG rates and 1 or 2 channels can be configured. Changes apply from
    /// the next decoded frame on.
    pub fn set_format(
        &mut self,
        rate: SampleRate,
        channels: ChannelCount,
        encodings: impl Into<Encodings>,
    ) -> Result<(), EngineError> {
        self.engine.set_format(rate, channels, encodings.into())
    }

    /// Disallows every output format.
    pub fn format_none(&mut self) {
        self.engine.set_formats(FormatTable::none());
    }

    /// Allows every output format.
    pub fn format_all(&mut self) {
        self.engine.set_formats(FormatTable::all());
    }

    /// Encodings allowed for `rate` with `channels`.
    pub fn format_support(&self, rate: SampleRate, channels: ChannelCount) -> Encodings {
        self.engine.formats().support(rate, channels)
    }

    /// Changes one decoder parameter. Flag changes apply from the next decoded frame on.
    pub fn param(&mut self, param: Param) -> Result<(), EngineError> {
        self.engine.param(param)
    }

    /// Moves to `pos`, counted in output PCM frames. Returns the new position.
    ///
    /// Seeking past the end stops at the end. Feed mode cannot seek.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, EngineError> {
        self.engine.seek(pos)
    }

    /// Current position in output PCM frames.
    pub fn tell(&self) -> Result<u64, EngineError> {
        self.engine.tell()
    }

    /// Stream length in output PCM frames, `None` in feed mode.
    ///
    /// Exact when the stream starts with a Xing, Info or VBRI tag or after [`Decoder::scan`],
    /// otherwise estimated from the size of the first frame.
    pub fn length(&mut self) -> Result<Option<u64>, EngineError> {
        self.engine.length()
    }

    /// Reads every frame header of the stream so that seeking and [`Decoder::length`] are exact.
    pub fn scan(&mut self) -> Result<(), EngineError> {
        self.engine.scan()
    }

    /// Name of the backend this decoder runs on.
    pub fn current_decoder(&self) -> &'static str {
        self.engine.backend_name()
    }

    /// Description of the last error the engine ran into, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.engine.last_error()
    }

    /// Properties of the most recently parsed frame.
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.engine.frame_info()
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("backend", &self.current_decoder())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
