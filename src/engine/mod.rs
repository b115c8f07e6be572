//! The decoding engine behind a [`Decoder`](crate::Decoder).
//!
//! The engine owns the compressed input, finds MPEG audio frames in it, hands every frame to
//! the symphonia MPEG audio codec and converts the decoded samples into the negotiated
//! output format. Decoded bytes wait in a pending buffer until the caller reads them.

mod backend;
pub(crate) mod conversions;
pub(crate) mod header;
pub(crate) mod input;

use std::io::SeekFrom;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{
        CodecParameters, CodecType, Decoder as Codec, DecoderOptions, CODEC_TYPE_MP1,
        CODEC_TYPE_MP2, CODEC_TYPE_MP3,
    },
    errors::Error as CodecError,
    formats::Packet,
};
use tracing::{debug, warn};

use crate::common::{ChannelCount, SampleRate};
use crate::encoding::Encodings;
use crate::error::EngineError;
use crate::format::{Format, FormatTable};
use crate::params::{Flags, Param, Params};

pub use backend::supported_decoders;
pub(crate) use backend::Backend;
use conversions::Converter;
use header::{
    id3v2_len, vbr_tag, FrameHeader, FrameInfo, Layer, HEADER_LEN, ID3V1_LEN, ID3V2_HEADER_LEN,
};
use input::Input;

/// Outcome of a successful engine read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Bytes were produced and more may follow.
    Ok,
    /// The output format changed; query it before reading on. Always comes with 0 bytes.
    NewFormat,
    /// All buffered input is decoded; feed more.
    NeedMore,
    /// End of the stream. Bytes written by the same call are still valid.
    Done,
}

/// Layer III frames decoded and dropped before a seek target to refill the bit reservoir.
const LAYER3_PREROLL: u64 = 2;

/// What advancing by one frame achieved.
enum Step {
    Frame,
    NeedMore,
    End,
}

/// Result of searching the input for the next frame.
enum Located {
    /// A complete frame is buffered at the front of the input.
    Frame(FrameHeader),
    NeedMore,
    End,
}

#[derive(Debug, Default)]
struct SyncState {
    /// Garbage skipped since the last frame.
    skipped: u64,
    /// A frame was found before.
    locked: bool,
}

/// Where the audio frames of a seekable stream start.
#[derive(Debug, Default)]
struct SeekTable {
    offsets: Vec<u64>,
    /// Every frame of the stream is in `offsets`.
    complete: bool,
    /// Stream offset after the last frame, valid once complete.
    end: u64,
    /// Offset of the first audio frame, after tags and the VBR tag frame.
    audio_start: Option<u64>,
    /// Frame count announced by a Xing, Info or VBRI tag.
    tag_frames: Option<u64>,
    first_frame_len: usize,
    samples_per_frame: u64,
}

impl SeekTable {
    /// Handles the first frame of the stream. Returns whether it is a VBR tag frame.
    fn first_frame(
        &mut self,
        header: &FrameHeader,
        frame: &[u8],
        offset: u64,
        flags: Flags,
    ) -> bool {
        if !flags.contains(Flags::IGNORE_INFOFRAME) {
            if let Some(frames) = vbr_tag(header, frame) {
                debug!(frames, "found VBR tag frame");
                self.tag_frames = frames;
                self.audio_start = Some(offset + frame.len() as u64);
                return true;
            }
        }
        self.audio_start = Some(offset);
        false
    }

    fn record(&mut self, index: u64, offset: u64, header: &FrameHeader) {
        if self.offsets.is_empty() {
            self.first_frame_len = header.frame_len();
            self.samples_per_frame = header.samples_per_frame() as u64;
        }
        if index == self.offsets.len() as u64 {
            self.offsets.push(offset);
        }
    }

    fn finish(&mut self, end: u64) {
        if !self.complete {
            debug!(frames = self.offsets.len(), "frame index complete");
        }
        self.complete = true;
        self.end = end;
    }

    /// Walks frame headers until frame `target` is indexed or the stream ends.
    fn extend(
        &mut self,
        input: &mut Input,
        params: &Params,
        target: u64,
    ) -> Result<(), EngineError> {
        let mut index = self.offsets.len().saturating_sub(1) as u64;
        let start = self
            .offsets
            .last()
            .copied()
            .or(self.audio_start)
            .unwrap_or_else(|| input.origin());
        input.seek_to(start)?;

        let mut state = SyncState {
            skipped: 0,
            locked: self.audio_start.is_some(),
        };
        let mut frame = Vec::new();
        while self.offsets.len() as u64 <= target {
            let header = match locate(input, params, &mut state)? {
                Located::Frame(header) => header,
                Located::End => {
                    self.finish(input.position());
                    break;
                }
                Located::NeedMore => break,
            };
            let offset = input.position();
            let len = header.frame_len();
            if self.audio_start.is_none() {
                frame.clear();
                frame.extend_from_slice(&input.available()[..len]);
                if self.first_frame(&header, &frame, offset, params.flags) {
                    input.consume(len);
                    continue;
                }
            }
            self.record(index, offset, &header);
            index += 1;
            input.consume(len);
        }
        Ok(())
    }
}

/// Finds the next frame, skipping tags and garbage.
fn locate(
    input: &mut Input,
    params: &Params,
    state: &mut SyncState,
) -> Result<Located, EngineError> {
    let out_of_data = if input.is_feed() {
        Located::NeedMore
    } else {
        Located::End
    };

    loop {
        if !input.fill(HEADER_LEN)? {
            return Ok(out_of_data);
        }

        if input.available().starts_with(b"ID3") {
            if !input.fill(ID3V2_HEADER_LEN)? {
                return Ok(out_of_data);
            }
            let mut tag = [0u8; ID3V2_HEADER_LEN];
            tag.copy_from_slice(&input.available()[..ID3V2_HEADER_LEN]);
            if let Some(len) = id3v2_len(&tag) {
                debug!(len, "skipping ID3v2 tag");
                input.skip(len as u64)?;
                continue;
            }
        }

        if input.available().starts_with(b"TAG") {
            if input.fill(ID3V1_LEN)? {
                input.consume(ID3V1_LEN);
                continue;
            }
            if input.is_feed() {
                return Ok(Located::NeedMore);
            }
            let rest = input.available().len();
            input.consume(rest);
            return Ok(Located::End);
        }

        let bytes = input.available();
        let header = FrameHeader::parse([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if let Some(header) = header {
            let len = header.frame_len();
            // after garbage, only trust a header that the next one confirms
            let confirmed = if state.skipped == 0 {
                true
            } else if input.fill(len + HEADER_LEN)? {
                let next = &input.available()[len..len + HEADER_LEN];
                next.starts_with(b"TAG")
                    || FrameHeader::parse([next[0], next[1], next[2], next[3]])
                        .is_some_and(|next| header.continues_with(&next))
            } else if input.awaits_data() {
                return Ok(Located::NeedMore);
            } else {
                true
            };

            if confirmed {
                if !input.fill(len)? {
                    if input.is_feed() {
                        return Ok(Located::NeedMore);
                    }
                    debug!("dropping truncated frame at the end of the stream");
                    let rest = input.available().len();
                    input.consume(rest);
                    return Ok(Located::End);
                }
                if state.skipped > 0 {
                    debug!(skipped = state.skipped, "resynced to frame header");
                }
                state.skipped = 0;
                state.locked = true;
                return Ok(Located::Frame(header));
            }
        }

        let exhausted = params
            .resync_budget()
            .is_some_and(|limit| state.skipped >= limit);
        if (state.locked && params.flags.contains(Flags::NO_RESYNC)) || exhausted {
            let skipped = std::mem::take(&mut state.skipped);
            return Err(EngineError::LostSync(skipped));
        }
        input.consume(1);
        state.skipped += 1;
    }
}

fn codec_type(layer: Layer) -> CodecType {
    match layer {
        Layer::Layer1 => CODEC_TYPE_MP1,
        Layer::Layer2 => CODEC_TYPE_MP2,
        Layer::Layer3 => CODEC_TYPE_MP3,
    }
}

fn make_codec(header: &FrameHeader) -> Result<Box<dyn Codec>, EngineError> {
    let mut params = CodecParameters::new();
    params
        .for_codec(codec_type(header.layer))
        .with_sample_rate(header.rate);
    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|_| {
            EngineError::Unsupported(format!(
                "{:?} support is not enabled in this build",
                header.layer
            ))
        })
}

pub(crate) struct Engine {
    backend: Backend,
    params: Params,
    formats: FormatTable,
    /// The format table or flags changed since the last negotiation.
    renegotiate: bool,
    input: Option<Input>,

    codec: Option<(Layer, Box<dyn Codec>)>,
    sync: SyncState,
    seek_table: SeekTable,
    header: Option<FrameHeader>,
    /// Native rate and channel count of the last decoded frame.
    stream: Option<(SampleRate, ChannelCount)>,
    output: Option<Format>,
    announced: bool,
    converter: Option<Converter>,

    frame: Vec<u8>,
    samples: Vec<f32>,
    converted: Vec<f32>,
    pending: Vec<u8>,
    pending_pos: usize,

    /// Index of the next audio frame.
    frame_index: u64,
    frames_decoded: u64,
    /// Frames to decode without output after a seek.
    skip_frames: u64,
    /// Samples per channel to drop from the next frame that produces output.
    skip_samples: u64,
    finished: bool,
    /// Output frames before the bytes counted in `delivered`.
    position: u64,
    delivered: u64,
    /// Error hit after bytes were already written, reported by the next read.
    deferred: Option<EngineError>,
    last_error: Option<String>,
}

impl Engine {
    pub fn new(backend: Backend, params: Params, formats: FormatTable) -> Self {
        Engine {
            backend,
            params,
            formats,
            renegotiate: false,
            input: None,
            codec: None,
            sync: SyncState::default(),
            seek_table: SeekTable::default(),
            header: None,
            stream: None,
            output: None,
            announced: true,
            converter: None,
            frame: Vec::new(),
            samples: Vec::new(),
            converted: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
            frame_index: 0,
            frames_decoded: 0,
            skip_frames: 0,
            skip_samples: 0,
            finished: false,
            position: 0,
            delivered: 0,
            deferred: None,
            last_error: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.header.as_ref().map(FrameHeader::info)
    }

    /// Attaches a new input, dropping the previous one and all stream state.
    pub fn open(&mut self, input: Input) {
        self.close();
        self.input = Some(input);
    }

    pub fn close(&mut self) {
        self.input = None;
        self.codec = None;
        self.sync = SyncState::default();
        self.seek_table = SeekTable::default();
        self.header = None;
        self.stream = None;
        self.output = None;
        self.announced = true;
        self.converter = None;
        self.pending.clear();
        self.pending_pos = 0;
        self.frame_index = 0;
        self.frames_decoded = 0;
        self.skip_frames = 0;
        self.skip_samples = 0;
        self.finished = false;
        self.position = 0;
        self.delivered = 0;
        self.deferred = None;
    }

    pub fn param(&mut self, param: Param) -> Result<(), EngineError> {
        let flags = self.params.flags;
        self.params.apply(param)?;
        if self.params.flags != flags {
            self.renegotiate = true;
        }
        Ok(())
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    pub fn set_formats(&mut self, formats: FormatTable) {
        self.formats = formats;
        self.renegotiate = true;
    }

    pub fn set_format(
        &mut self,
        rate: SampleRate,
        channels: ChannelCount,
        encodings: Encodings,
    ) -> Result<(), EngineError> {
        self.formats.set(rate, channels, encodings)?;
        self.renegotiate = true;
        Ok(())
    }

    fn input_mut(&mut self) -> Result<&mut Input, EngineError> {
        self.input.as_mut().ok_or(EngineError::NotOpen)
    }

    /// Appends compressed bytes. Fails with [`EngineError::NotFeedMode`] unless a feed is open.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), EngineError> {
        match &mut self.input {
            Some(input) if input.is_feed() => {
                input.push(data);
                Ok(())
            }
            _ => Err(EngineError::NotFeedMode),
        }
    }

    /// Marks the fed input as complete, so a last frame after garbage needs no confirmation.
    pub fn end_feed(&mut self) {
        if let Some(input) = &mut self.input {
            input.end_feed();
        }
    }

    /// Feeds `data`, then reads like [`Engine::read`].
    pub fn decode(
        &mut self,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<(usize, Status), EngineError> {
        self.feed(data)?;
        self.read(out)
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<(usize, Status), EngineError> {
        if self.input.is_none() {
            return Err(EngineError::NotOpen);
        }
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }

        let mut written = 0;
        loop {
            if self.output.is_some() && !self.announced {
                if written > 0 {
                    return Ok((written, Status::Ok));
                }
                self.announced = true;
                return Ok((0, Status::NewFormat));
            }

            written += self.drain_pending(&mut out[written..]);
            if written == out.len() {
                return Ok((written, Status::Ok));
            }

            match self.next_frame() {
                Ok(Step::Frame) => {}
                Ok(Step::NeedMore) => return Ok((written, Status::NeedMore)),
                Ok(Step::End) => return Ok((written, Status::Done)),
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    if written > 0 {
                        self.deferred = Some(err);
                        return Ok((written, Status::Ok));
                    }
                    return Err(err);
                }
            }
        }
    }

    fn drain_pending(&mut self, out: &mut [u8]) -> usize {
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        self.delivered += n as u64;
        if self.pending_pos == self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        n
    }

    /// The output format, decoding the first frame if it is not known yet.
    ///
    /// Clears a pending [`Status::NewFormat`] announcement.
    pub fn format(&mut self) -> Result<Format, EngineError> {
        let format = self.probe()?;
        self.announced = true;
        Ok(format)
    }

    fn probe(&mut self) -> Result<Format, EngineError> {
        if self.input.is_none() {
            return Err(EngineError::NotOpen);
        }
        loop {
            if let Some(format) = self.output {
                return Ok(format);
            }
            let err = match self.next_frame() {
                Ok(Step::Frame) => continue,
                Ok(Step::NeedMore) => return Err(EngineError::NeedMore),
                Ok(Step::End) => EngineError::Decode("no MPEG audio frame in input".into()),
                Err(err) => err,
            };
            self.last_error = Some(err.to_string());
            return Err(err);
        }
    }

    fn end_step(&self) -> Step {
        match &self.input {
            Some(input) if input.is_feed() => Step::NeedMore,
            _ => Step::End,
        }
    }

    /// Decodes the next audio frame into the pending buffer.
    fn next_frame(&mut self) -> Result<Step, EngineError> {
        loop {
            if self.finished {
                return Ok(self.end_step());
            }
            if self
                .params
                .decode_frames
                .is_some_and(|limit| self.frames_decoded >= limit)
            {
                debug!(frames = self.frames_decoded, "frame limit reached");
                self.finished = true;
                continue;
            }

            let input = self.input.as_mut().ok_or(EngineError::NotOpen)?;
            let header = match locate(input, &self.params, &mut self.sync)? {
                Located::Frame(header) => header,
                Located::NeedMore => return Ok(Step::NeedMore),
                Located::End => {
                    self.seek_table.finish(input.position());
                    self.finished = true;
                    continue;
                }
            };
            let offset = input.position();
            let len = header.frame_len();
            self.frame.clear();
            self.frame.extend_from_slice(&input.available()[..len]);
            input.consume(len);

            if self.seek_table.audio_start.is_none()
                && self
                    .seek_table
                    .first_frame(&header, &self.frame, offset, self.params.flags)
            {
                self.header = Some(header);
                continue;
            }
            self.seek_table.record(self.frame_index, offset, &header);
            self.frame_index += 1;
            self.frames_decoded += 1;
            self.header = Some(header);
            self.decode_frame(&header)?;
            return Ok(Step::Frame);
        }
    }

    fn negotiate(&mut self, header: &FrameHeader) -> Result<Format, EngineError> {
        let stream = (header.rate, header.channels());
        let stale = self.renegotiate || self.stream != Some(stream);
        if let (Some(format), false) = (self.output, stale) {
            return Ok(format);
        }

        let (rate, channels) = stream;
        let format = self
            .formats
            .negotiate(rate, channels, self.params.flags)
            .ok_or(EngineError::NoFormat { rate, channels })?;
        if self.output != Some(format) {
            if let Some(old) = self.output {
                self.position += self.delivered / old.bytes_per_frame() as u64;
                self.delivered = 0;
            }
            debug!(%format, "new output format");
            self.output = Some(format);
            self.announced = false;
        }
        self.converter = Some(Converter::new(rate, channels, format.rate, format.channels));
        self.stream = Some(stream);
        self.renegotiate = false;
        Ok(format)
    }

    fn decode_frame(&mut self, header: &FrameHeader) -> Result<(), EngineError> {
        let format = self.negotiate(header)?;

        let codec = match self.codec.take() {
            Some((layer, codec)) if layer == header.layer => codec,
            _ => make_codec(header)?,
        };
        let codec = &mut self.codec.insert((header.layer, codec)).1;

        let channels = usize::from(header.channels());
        let silence = header.samples_per_frame() * channels;
        let packet = Packet::new_from_slice(
            0,
            self.frame_index,
            header.samples_per_frame() as u64,
            &self.frame,
        );
        self.samples.clear();
        let failure = match codec.decode(&packet) {
            Ok(decoded) => {
                let mut buffer =
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                self.samples.extend_from_slice(buffer.samples());
                None
            }
            Err(err) => Some(err),
        };

        // broken frames become silence so the timeline stays intact
        match failure {
            None => {}
            Some(CodecError::DecodeError(msg)) => {
                if !self.params.flags.contains(Flags::QUIET) {
                    warn!(frame = self.frame_index, "frame decode error: {msg}");
                }
                self.last_error = Some(msg.to_owned());
                self.samples.resize(silence, 0.0);
            }
            Some(CodecError::IoError(err)) => {
                if !self.params.flags.contains(Flags::QUIET) {
                    warn!(frame = self.frame_index, "malformed frame: {err}");
                }
                self.last_error = Some(err.to_string());
                self.samples.resize(silence, 0.0);
            }
            Some(CodecError::ResetRequired) => {
                codec.reset();
                self.samples.resize(silence, 0.0);
            }
            Some(CodecError::Unsupported(what)) => {
                return Err(EngineError::Unsupported(what.to_owned()))
            }
            Some(err) => return Err(EngineError::Decode(err.to_string())),
        }

        if self.skip_frames > 0 {
            self.skip_frames -= 1;
            return Ok(());
        }
        let skip = usize::try_from(std::mem::take(&mut self.skip_samples))
            .map_or(self.samples.len(), |s| s.saturating_mul(channels))
            .min(self.samples.len());
        let samples = &mut self.samples[skip..];
        if self.params.out_scale != 1.0 {
            let scale = self.params.out_scale as f32;
            samples.iter_mut().for_each(|s| *s *= scale);
        }

        self.converted.clear();
        if let Some(converter) = &mut self.converter {
            converter.process(samples, &mut self.converted);
        }
        self.backend
            .write(format.encoding, &self.converted, &mut self.pending);
        Ok(())
    }

    /// Current position in output frames.
    pub fn tell(&self) -> Result<u64, EngineError> {
        if self.input.is_none() {
            return Err(EngineError::NotOpen);
        }
        let delivered = match self.output {
            Some(format) => self.delivered / format.bytes_per_frame() as u64,
            None => 0,
        };
        Ok(self.position + delivered)
    }

    fn seekable_input(&mut self) -> Result<&mut Input, EngineError> {
        let input = self.input_mut()?;
        if input.is_feed() {
            return Err(EngineError::NotSeekable);
        }
        Ok(input)
    }

    fn native_to_output(&self, samples: u64) -> u64 {
        match (self.output, self.stream) {
            (Some(format), Some((rate, _))) if format.rate != rate => {
                (u128::from(samples) * u128::from(format.rate) / u128::from(rate)) as u64
            }
            _ => samples,
        }
    }

    fn output_to_native(&self, frames: u64) -> u64 {
        match (self.output, self.stream) {
            (Some(format), Some((rate, _))) if format.rate != rate => {
                (u128::from(frames) * u128::from(rate) / u128::from(format.rate)) as u64
            }
            _ => frames,
        }
    }

    /// Indexes frames up to `target` without disturbing the decoding position.
    fn scan_to(&mut self, target: u64) -> Result<(), EngineError> {
        if self.seek_table.complete || self.seek_table.offsets.len() as u64 > target {
            return Ok(());
        }
        let Some(input) = self.input.as_mut() else {
            return Err(EngineError::NotOpen);
        };
        let resume = input.position();
        let result = self.seek_table.extend(input, &self.params, target);
        input.seek_to(resume)?;
        result
    }

    /// Indexes the whole stream so that [`Engine::length`] is exact.
    pub fn scan(&mut self) -> Result<(), EngineError> {
        self.seekable_input()?;
        self.probe()?;
        debug!("scanning stream");
        self.scan_to(u64::MAX)
    }

    /// Stream length in output frames, `None` in feed mode.
    pub fn length(&mut self) -> Result<Option<u64>, EngineError> {
        if self.input_mut()?.is_feed() {
            return Ok(None);
        }
        self.probe()?;

        let table = &self.seek_table;
        let frames = if table.complete {
            table.offsets.len() as u64
        } else if let Some(frames) = table.tag_frames {
            frames
        } else {
            let byte_len = self.input.as_ref().and_then(Input::byte_len).unwrap_or(0);
            let audio = byte_len.saturating_sub(table.audio_start.unwrap_or(0));
            audio / table.first_frame_len.max(1) as u64
        };
        Ok(Some(self.native_to_output(frames * table.samples_per_frame)))
    }

    /// Moves to `pos`, counted in output frames. Returns the new position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, EngineError> {
        self.seekable_input()?;
        self.probe()?;

        let target = match pos {
            SeekFrom::Start(frames) => i128::from(frames),
            SeekFrom::Current(delta) => i128::from(self.tell()?) + i128::from(delta),
            SeekFrom::End(delta) => {
                self.scan()?;
                let length = self.length()?.unwrap_or(0);
                i128::from(length) + i128::from(delta)
            }
        };
        let Ok(mut target) = u64::try_from(target) else {
            return Err(EngineError::BadSeek);
        };

        let samples_per_frame = self.seek_table.samples_per_frame.max(1);
        let native = self.output_to_native(target);
        let mut frame = native / samples_per_frame;
        let mut within = native % samples_per_frame;
        self.scan_to(frame)?;
        let total = self.seek_table.offsets.len() as u64;
        if frame >= total {
            frame = total;
            within = 0;
            target = self.native_to_output(total * samples_per_frame);
        }

        let preroll = match self.header.map(|h| h.layer) {
            Some(Layer::Layer3) => frame.min(LAYER3_PREROLL),
            _ => 0,
        };
        let start = frame - preroll;
        let offset = match self.seek_table.offsets.get(start as usize) {
            Some(&offset) => offset,
            None => self.seek_table.end,
        };
        self.seekable_input()?.seek_to(offset)?;

        if let Some((_, codec)) = &mut self.codec {
            codec.reset();
        }
        if let Some(converter) = &mut self.converter {
            converter.reset();
        }
        self.pending.clear();
        self.pending_pos = 0;
        self.deferred = None;
        self.sync = SyncState {
            skipped: 0,
            locked: true,
        };
        self.frame_index = start;
        self.frames_decoded = start;
        self.skip_frames = preroll;
        self.skip_samples = within;
        self.finished = false;
        self.position = target;
        self.delivered = 0;
        debug!(target, frame, preroll, "seek");
        Ok(target)
    }
}
