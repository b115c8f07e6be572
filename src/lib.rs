//! Streaming MPEG audio decoding.
//!
//! A [`Decoder`] turns MPEG-1, MPEG-2 and MPEG-2.5 audio (Layer I, II and III) into raw PCM
//! bytes in a negotiated output [`Format`]. Compressed data can come from:
//!
//! - a file, a file descriptor or any seekable reader, pulled with [`Decoder::read_pcm`],
//!   [`Decoder::decode_samples`] or through [`std::io::Read`]. These sources can seek.
//! - any [`std::io::Read`] through a [`DecoderReader`], which feeds the decoder on demand.
//! - chunks the caller pushes with [`Decoder::feed`] or [`Decoder::decode`].
//!
//! The output format is chosen per stream from a [`FormatTable`] of allowed sample rates,
//! channel counts and [`Encodings`]. By default every format is allowed and the stream is
//! decoded at its native rate and channel count to signed 16 bit samples.
//!
//! # Examples
//!
//! ```no_run
//! use mpadec::{Decoder, Progress};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut decoder = Decoder::new(None, None)?;
//!     decoder.open("audio.mp3")?;
//!     println!("{}", decoder.format()?);
//!
//!     let mut buf = vec![0u8; 16 * 1024];
//!     loop {
//!         match decoder.read_pcm(&mut buf)? {
//!             Progress::More(n) => { /* consume buf[..n] */ }
//!             Progress::End(_n) => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `mp1`, `mp2`, `mp3`: decoding of the respective layer; `mpa` enables all of them.
//!   `mp3` is enabled by default.
//! - `dither`: the `generic_dither` backend, which adds triangular dither before integer
//!   quantization. Enabled by default.
//!
//! The crate logs through [`tracing`] and installs no subscriber.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(mpeg_layer))]
compile_error!("at least one of the `mp1`, `mp2` or `mp3` features has to be enabled");

mod common;
mod decoder;
mod encoding;
mod engine;
mod error;
mod format;
mod params;

pub use crate::common::{ChannelCount, SampleRate, STANDARD_RATES};
pub use crate::decoder::{
    Decoder, DecoderBuilder, DecoderReader, Progress, SourceState, DECODE_CHUNK_SIZE,
    FEED_CHUNK_SIZE, MAX_INPUT_RETRIES,
};
pub use crate::encoding::{encoding_sample_bits, Encoding, Encodings};
pub use crate::engine::header::{ChannelMode, Emphasis, FrameInfo, Layer, MpegVersion};
pub use crate::engine::{supported_decoders, Status};
pub use crate::error::{EngineError, Error, InitError, OpenError};
pub use crate::format::{Format, FormatTable};
pub use crate::params::{Flags, Param, DEFAULT_RESYNC_LIMIT};
