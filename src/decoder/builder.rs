//! Builder for configuring and constructing decoders.
//!
//! [`Decoder::new`] covers the common case of picking a backend and a set of flags. The
//! builder additionally sets engine parameters and restricts the output formats before the
//! first source is opened.
//!
//! # Examples
//!
//! ```no_run
//! use mpadec::{Decoder, Encoding, Flags};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut decoder = Decoder::builder()
//!         .with_flags(Flags::QUIET)
//!         .with_output_format(44100, 2, Encoding::Float32)
//!         .with_resync_limit(-1)
//!         .build()?;
//!     decoder.open("audio.mp3")?;
//!
//!     // Use the decoder...
//!     Ok(())
//! }
//! ```

use super::Decoder;
use crate::common::{ChannelCount, SampleRate};
use crate::encoding::Encodings;
use crate::engine::{Backend, Engine};
use crate::error::{EngineError, InitError};
use crate::format::FormatTable;
use crate::params::{Flags, Param, Params};

/// Decoder configuration settings.
#[derive(Clone, Debug, Default)]
pub(crate) struct Settings {
    /// Name of the decoder backend, the default backend when unset.
    pub(crate) backend: Option<String>,

    /// Engine flags, applied before any other parameter.
    pub(crate) flags: Option<Flags>,

    /// Further parameters, applied in order.
    pub(crate) params: Vec<Param>,

    /// Allowed output formats. Every standard format is allowed when unset.
    pub(crate) formats: Option<FormatTable>,

    /// First output format that was rejected.
    pub(crate) invalid_format: Option<EngineError>,
}

/// Builder for configuring and creating a [`Decoder`].
#[derive(Clone, Debug, Default)]
pub struct DecoderBuilder {
    settings: Settings,
}

impl DecoderBuilder {
    /// Creates a new decoder builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the decoder backend by name, see [`supported_decoders`](crate::supported_decoders).
    ///
    /// An empty name selects the default backend.
    pub fn with_backend(mut self, name: &str) -> Self {
        self.settings.backend = Some(name.to_owned());
        self
    }

    /// Replaces the engine flags.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.settings.flags = Some(flags);
        self
    }

    /// Bytes of garbage searched for the next frame header, `-1` for no limit.
    ///
    /// Defaults to [`DEFAULT_RESYNC_LIMIT`](crate::DEFAULT_RESYNC_LIMIT).
    pub fn with_resync_limit(mut self, bytes: i64) -> Self {
        self.settings.params.push(Param::ResyncLimit(bytes));
        self
    }

    /// Linear gain applied to decoded samples before quantization.
    pub fn with_out_scale(mut self, scale: f64) -> Self {
        self.settings.params.push(Param::OutScale(scale));
        self
    }

    /// Stops decoding after `frames` MPEG frames.
    pub fn with_decode_frames(mut self, frames: u64) -> Self {
        self.settings.params.push(Param::DecodeFrames(Some(frames)));
        self
    }

    /// Adds an allowed output format.
    ///
    /// The first call starts from an empty format table, so only the formats added through
    /// this method are negotiated. Invalid rates or channel counts make [`build`](Self::build)
    /// fail.
    pub fn with_output_format(
        mut self,
        rate: SampleRate,
        channels: ChannelCount,
        encodings: impl Into<Encodings>,
    ) -> Self {
        let formats = self.settings.formats.get_or_insert_with(FormatTable::none);
        let encodings = formats.support(rate, channels) | encodings.into();
        if let Err(err) = formats.set(rate, channels, encodings) {
            self.settings.invalid_format.get_or_insert(err);
        }
        self
    }

    /// Replaces the whole output format table.
    pub fn with_formats(mut self, formats: FormatTable) -> Self {
        self.settings.formats = Some(formats);
        self
    }

    /// Creates the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::UnknownBackend`] for a backend name this build does not provide,
    /// and [`InitError::Param`] for a rejected parameter.
    pub fn build(self) -> Result<Decoder, InitError> {
        let Settings {
            backend,
            flags,
            params: changes,
            formats,
            invalid_format,
        } = self.settings;
        if let Some(err) = invalid_format {
            return Err(InitError::Param(err));
        }

        let backend = Backend::by_name(backend.as_deref())?;
        let mut params = Params::default();
        if let Some(flags) = flags {
            params.apply(Param::Flags(flags)).map_err(InitError::Param)?;
        }
        for change in changes {
            params.apply(change).map_err(InitError::Param)?;
        }

        let engine = Engine::new(backend, params, formats.unwrap_or_default());
        Ok(Decoder::from_engine(engine))
    }
}
