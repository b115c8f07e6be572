use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::common::{assert_error_traits, ChannelCount, SampleRate};

/// Error creating a decoder handle.
#[derive(Debug, thiserror::Error, Clone)]
pub enum InitError {
    /// No decoder backend goes by this name, see [`supported_decoders`](crate::supported_decoders).
    #[error("error initializing decoder: unknown decoder backend '{0}'")]
    UnknownBackend(String),
    /// A construction parameter was rejected.
    #[error("error initializing decoder: {0}")]
    Param(#[source] EngineError),
}

/// Error attaching an input source to a decoder.
///
/// Opening is recoverable, the handle can be opened again with another source.
#[derive(Debug, thiserror::Error, Clone)]
pub enum OpenError {
    #[error("error opening {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("error attaching file descriptor: {0}")]
    Descriptor(#[source] Arc<io::Error>),
    #[error("error attaching reader: {0}")]
    Handle(#[source] Arc<io::Error>),
}

/// Any non-ok status reported by the engine.
#[derive(Debug, thiserror::Error, Clone)]
pub enum EngineError {
    #[error("no input source is open")]
    NotOpen,
    #[error("decoder is not in feed mode")]
    NotFeedMode,
    #[error("input source is not seekable")]
    NotSeekable,
    #[error("more input is needed")]
    NeedMore,
    #[error("unsupported sample rate {0} Hz")]
    BadRate(SampleRate),
    #[error("unsupported channel count {0}")]
    BadChannels(ChannelCount),
    #[error("no enabled output format fits a {rate} Hz stream with {channels} channels")]
    NoFormat {
        rate: SampleRate,
        channels: ChannelCount,
    },
    #[error("lost sync after skipping {0} bytes")]
    LostSync(u64),
    #[error("seek position is before the start of the stream")]
    BadSeek,
    #[error("invalid parameter: {0}")]
    BadParam(&'static str),
    #[error("unsupported stream: {0}")]
    Unsupported(String),
    #[error("decoding failed: {0}")]
    Decode(String),
    #[error("i/o failure: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Io(Arc::new(err))
    }
}

impl From<EngineError> for io::Error {
    fn from(err: EngineError) -> Self {
        let kind = match &err {
            EngineError::Io(inner) => inner.kind(),
            EngineError::NotOpen | EngineError::NotFeedMode | EngineError::NotSeekable => {
                io::ErrorKind::Unsupported
            }
            EngineError::NeedMore => io::ErrorKind::WouldBlock,
            EngineError::BadSeek | EngineError::BadParam(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

/// Errors of the caller facing operations that span several engine primitives.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The caller's buffer cannot hold the requested number of frames.
    #[error("output buffer holds {available} bytes but {needed} are required")]
    BufferTooSmall { needed: usize, available: usize },
}

assert_error_traits!(InitError, OpenError, EngineError, Error);
