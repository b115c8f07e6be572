//! Buffered compressed input of an engine.
//!
//! An [`Input`] is either backed by a seekable reader (files, descriptors and caller handles)
//! or by bytes pushed through [`Input::push`] in feed mode. Both present the same window of
//! unconsumed bytes to the frame parser.

use std::io::{self, Read, Seek, SeekFrom};

/// Bytes requested from a reader at once.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A seekable byte source.
pub(crate) trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

enum Source {
    Reader(Box<dyn ReadSeek>),
    Feed,
}

pub(crate) struct Input {
    source: Source,
    buf: Vec<u8>,
    /// Consumed bytes at the front of `buf`.
    start: usize,
    /// Stream offset of `buf[0]`.
    base: u64,
    eof: bool,
    /// Bytes to drop from data that has not arrived yet.
    skip: u64,
    len: Option<u64>,
    origin: u64,
}

impl Input {
    pub fn reader(mut reader: Box<dyn ReadSeek>) -> io::Result<Self> {
        let base = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base))?;
        Ok(Input {
            source: Source::Reader(reader),
            buf: Vec::new(),
            start: 0,
            base,
            eof: false,
            skip: 0,
            len: Some(end),
            origin: base,
        })
    }

    pub fn feed() -> Self {
        Input {
            source: Source::Feed,
            buf: Vec::new(),
            start: 0,
            base: 0,
            eof: false,
            skip: 0,
            len: None,
            origin: 0,
        }
    }

    pub fn is_feed(&self) -> bool {
        matches!(self.source, Source::Feed)
    }

    /// Marks a feed as complete: nothing more will be pushed.
    pub fn end_feed(&mut self) {
        if self.is_feed() {
            self.eof = true;
        }
    }

    /// Whether bytes missing now may still arrive later.
    pub fn awaits_data(&self) -> bool {
        self.is_feed() && !self.eof
    }

    /// Total stream length in bytes, only known for readers.
    pub fn byte_len(&self) -> Option<u64> {
        self.len
    }

    /// Stream offset the input started at.
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Stream offset of the first unconsumed byte.
    pub fn position(&self) -> u64 {
        self.base + self.start as u64
    }

    /// Unconsumed bytes currently buffered.
    pub fn available(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Appends fed bytes.
    pub fn push(&mut self, mut data: &[u8]) {
        self.eof = false;
        self.compact();
        if self.skip > 0 {
            let dropped = usize::try_from(self.skip).map_or(data.len(), |s| s.min(data.len()));
            data = &data[dropped..];
            self.skip -= dropped as u64;
            self.base += dropped as u64;
        }
        self.buf.extend_from_slice(data);
    }

    /// Makes at least `min` bytes available if the source can provide them.
    ///
    /// Returns whether that many bytes are available. Readers block until the data is read
    /// or the end of the stream is reached; in feed mode only buffered data counts.
    pub fn fill(&mut self, min: usize) -> io::Result<bool> {
        while self.available().len() < min && !self.eof {
            if self.is_feed() {
                return Ok(false);
            }
            self.compact();
            let old_len = self.buf.len();
            self.buf.resize(old_len + READ_CHUNK_SIZE, 0);
            let result = match &mut self.source {
                Source::Reader(reader) => read_retrying(reader.as_mut(), &mut self.buf[old_len..]),
                Source::Feed => Ok(0),
            };
            let read = match result {
                Ok(read) => read,
                Err(e) => {
                    self.buf.truncate(old_len);
                    return Err(e);
                }
            };
            self.buf.truncate(old_len + read);
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(self.available().len() >= min)
    }

    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.buf.len());
    }

    /// Drops `n` bytes, including bytes that are not buffered yet.
    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let buffered = self.available().len();
        match usize::try_from(n) {
            Ok(n) if n <= buffered => {
                self.consume(n);
                return Ok(());
            }
            _ => {}
        }
        if self.is_feed() {
            self.consume(buffered);
            self.skip = n - buffered as u64;
            Ok(())
        } else {
            self.seek_to(self.position() + n)
        }
    }

    /// Moves to stream offset `offset`. Readers only.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let Source::Reader(reader) = &mut self.source else {
            return Err(io::Error::from(io::ErrorKind::Unsupported));
        };
        let buffered = self.base..=self.base + self.buf.len() as u64;
        if buffered.contains(&offset) {
            self.start = (offset - self.base) as usize;
            return Ok(());
        }
        reader.seek(SeekFrom::Start(offset))?;
        self.buf.clear();
        self.start = 0;
        self.base = offset;
        self.eof = false;
        Ok(())
    }

    fn compact(&mut self) {
        if self.start == self.buf.len() {
            self.base += self.start as u64;
            self.buf.clear();
            self.start = 0;
            return;
        }
        if self.start > 0 && self.start >= self.buf.len() / 2 {
            self.buf.drain(..self.start);
            self.base += self.start as u64;
            self.start = 0;
        }
    }
}

fn read_retrying(reader: &mut dyn ReadSeek, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
