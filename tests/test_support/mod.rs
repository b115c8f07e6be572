#![allow(dead_code)]
/// in separate folder so its not ran as integration test
use std::io::{self, Read};
use std::path::PathBuf;

/// MPEG-1 Layer III, 128 kbit/s, 44100 Hz, stereo, no CRC.
pub const SILENT_HEADER: [u8; 4] = [0xff, 0xfb, 0x90, 0x00];
pub const FRAME_LEN: usize = 417;
pub const SAMPLES_PER_FRAME: usize = 1152;
/// Bytes of one decoded frame as signed 16 bit stereo.
pub const FRAME_PCM_LEN: usize = SAMPLES_PER_FRAME * 2 * 2;

/// A frame with empty side information, decoding to silence.
pub fn silent_frame() -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN];
    frame[..4].copy_from_slice(&SILENT_HEADER);
    frame
}

pub fn silent_stream(frames: usize) -> Vec<u8> {
    (0..frames).flat_map(|_| silent_frame()).collect()
}

/// The 48000 Hz variant of [`SILENT_HEADER`].
pub const SILENT_HEADER_48K: [u8; 4] = [0xff, 0xfb, 0x94, 0x00];
pub const FRAME_LEN_48K: usize = 384;

pub fn silent_frame_48k() -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN_48K];
    frame[..4].copy_from_slice(&SILENT_HEADER_48K);
    frame
}

/// Packs values most significant bit first.
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    fn put(&mut self, value: u32, width: usize) {
        for bit in (0..width).rev() {
            if self.len % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> bit) & 1 == 1 {
                *self.bytes.last_mut().unwrap() |= 0x80 >> (self.len % 8);
            }
            self.len += 1;
        }
    }
}

/// Quadruples of unit lines written into the count1 region of every granule and channel.
const TONE_QUADS: u32 = 8;

/// A frame with the same header as [`silent_frame`] that decodes to audible content.
///
/// Every granule carries 32 spectral lines of magnitude 1 in its count1 region, coded with
/// quadruple table B. The signs and the global gain depend on `index`, the granule and the
/// channel, so frames and channels all decode differently.
pub fn tone_frame(index: usize) -> Vec<u8> {
    let part3_bits = TONE_QUADS * 8;

    let mut bits = BitWriter::default();
    // main_data_begin, private bits, scfsi of both channels
    bits.put(0, 9);
    bits.put(0, 3);
    bits.put(0, 8);
    for granule in 0..2 {
        for channel in 0..2 {
            let gain = 170 + ((index + granule) % 4) as u32 + 2 * channel as u32;
            bits.put(part3_bits, 12);
            bits.put(0, 9); // big_values
            bits.put(gain, 8);
            bits.put(0, 4); // scalefac_compress
            bits.put(0, 1); // window switching
            bits.put(0, 15); // table_select
            bits.put(0, 4); // region0_count
            bits.put(0, 3); // region1_count
            bits.put(0, 1); // preflag
            bits.put(0, 1); // scalefac_scale
            bits.put(1, 1); // count1 table B
        }
    }
    assert_eq!(bits.len, 32 * 8);

    for granule in 0..2 {
        for channel in 0..2 {
            for quad in 0..TONE_QUADS as usize {
                // table B codes all four lines set as 0000
                bits.put(0, 4);
                let signs = (quad * 5 + channel * 3 + granule + index) % 16;
                bits.put(signs as u32, 4);
            }
        }
    }

    let mut frame = SILENT_HEADER.to_vec();
    frame.extend(bits.bytes);
    frame.resize(FRAME_LEN, 0);
    frame
}

pub fn tone_stream(frames: usize) -> Vec<u8> {
    (0..frames).flat_map(tone_frame).collect()
}

/// Signed 16 bit samples of native endian PCM bytes.
pub fn s16_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect()
}

pub fn f32_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// A Xing-style "Info" frame announcing `frames` audio frames.
pub fn info_frame(frames: u32) -> Vec<u8> {
    let mut frame = silent_frame();
    let tag = 4 + 32;
    frame[tag..tag + 4].copy_from_slice(b"Info");
    frame[tag + 4..tag + 8].copy_from_slice(&1u32.to_be_bytes());
    frame[tag + 8..tag + 12].copy_from_slice(&frames.to_be_bytes());
    frame
}

/// An ID3v2.4 tag holding `payload`.
pub fn id3v2_tag(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 128);
    let mut tag = b"ID3\x04\x00\x00\x00\x00\x00".to_vec();
    tag.push(payload.len() as u8);
    tag.extend_from_slice(payload);
    tag
}

pub fn id3v1_tag() -> Vec<u8> {
    let mut tag = b"TAG".to_vec();
    tag.resize(128, b' ');
    tag
}

/// `frames` audio frames wrapped in the tags a tagged file carries.
pub fn tagged_stream(frames: usize) -> Vec<u8> {
    let mut data = id3v2_tag(b"TIT2 silence");
    data.extend(info_frame(frames as u32));
    data.extend(silent_stream(frames));
    data.extend(id3v1_tag());
    data
}

/// Writes `data` to a file in the test scratch directory.
pub fn fixture(name: &str, data: &[u8]) -> PathBuf {
    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Hands out `data` in reads of the given sizes, cycling through them.
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunks: Vec<usize>,
    next: usize,
}

impl ChunkedReader {
    pub fn new(data: Vec<u8>, chunks: Vec<usize>) -> Self {
        let chunks = chunks.into_iter().map(|c| c.max(1)).collect::<Vec<_>>();
        let chunks = if chunks.is_empty() { vec![1] } else { chunks };
        Self {
            data,
            pos: 0,
            chunks,
            next: 0,
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.chunks[self.next % self.chunks.len()];
        self.next += 1;
        let n = chunk.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Fails every read with the same error.
pub struct FailingReader {
    pub reads: usize,
}

impl FailingReader {
    pub const MESSAGE: &'static str = "connection reset by test";

    pub fn new() -> Self {
        Self { reads: 0 }
    }
}

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        Err(io::Error::new(io::ErrorKind::ConnectionReset, Self::MESSAGE))
    }
}

/// Fails every other read, starting with the first, delivering `data` in between.
pub struct FlakyReader {
    inner: ChunkedReader,
    calls: usize,
    pub failures: usize,
}

impl FlakyReader {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            inner: ChunkedReader::new(data, vec![chunk]),
            calls: 0,
            failures: 0,
        }
    }
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            self.failures += 1;
            return Err(io::Error::other("flaky input"));
        }
        self.inner.read(buf)
    }
}
