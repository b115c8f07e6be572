//! MPEG audio frame headers and the tag structures found between frames.

use std::fmt;

use crate::common::{ChannelCount, SampleRate};

/// Length of a frame header in bytes.
pub(crate) const HEADER_LEN: usize = 4;
/// Length of an ID3v2 tag header (and footer).
pub(crate) const ID3V2_HEADER_LEN: usize = 10;
/// Length of an ID3v1 tag.
pub(crate) const ID3V1_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Layer1,
    Layer2,
    Layer3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    pub fn channels(self) -> ChannelCount {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emphasis {
    None,
    /// 50/15 µs
    Ms5015,
    Reserved,
    CcittJ17,
}

/// Properties of the most recent MPEG frame, see [`Decoder::frame_info`](crate::Decoder::frame_info).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameInfo {
    pub version: MpegVersion,
    pub layer: Layer,
    pub rate: SampleRate,
    pub mode: ChannelMode,
    /// Bitrate in kbit/s.
    pub bitrate: u32,
    /// Frame size in bytes, header included.
    pub frame_size: usize,
    pub emphasis: Emphasis,
    pub crc: bool,
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.version {
            MpegVersion::Mpeg1 => "1.0",
            MpegVersion::Mpeg2 => "2.0",
            MpegVersion::Mpeg25 => "2.5",
        };
        let layer = match self.layer {
            Layer::Layer1 => "I",
            Layer::Layer2 => "II",
            Layer::Layer3 => "III",
        };
        write!(
            f,
            "MPEG {version} layer {layer}, {} kbit/s, {} Hz {:?}",
            self.bitrate, self.rate, self.mode
        )
    }
}

const BITRATES_V1: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];
const BITRATES_V2: [[u32; 15]; 2] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub crc: bool,
    pub bitrate: u32,
    pub rate: SampleRate,
    pub padding: bool,
    pub mode: ChannelMode,
    pub emphasis: Emphasis,
}

impl FrameHeader {
    /// Parses the four header bytes. Free format and reserved values are rejected.
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Option<FrameHeader> {
        let word = u32::from_be_bytes(bytes);
        if word >> 21 != 0x7ff {
            return None;
        }
        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };
        let layer = match (word >> 17) & 0b11 {
            0b01 => Layer::Layer3,
            0b10 => Layer::Layer2,
            0b11 => Layer::Layer1,
            _ => return None,
        };
        let crc = (word >> 16) & 1 == 0;

        let bitrate_index = ((word >> 12) & 0xf) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let bitrate = match (version, layer) {
            (MpegVersion::Mpeg1, Layer::Layer1) => BITRATES_V1[0][bitrate_index],
            (MpegVersion::Mpeg1, Layer::Layer2) => BITRATES_V1[1][bitrate_index],
            (MpegVersion::Mpeg1, Layer::Layer3) => BITRATES_V1[2][bitrate_index],
            (_, Layer::Layer1) => BITRATES_V2[0][bitrate_index],
            (_, _) => BITRATES_V2[1][bitrate_index],
        };

        let rate_index = ((word >> 10) & 0b11) as usize;
        let base_rate = match rate_index {
            0 => 44100,
            1 => 48000,
            2 => 32000,
            _ => return None,
        };
        let rate = match version {
            MpegVersion::Mpeg1 => base_rate,
            MpegVersion::Mpeg2 => base_rate / 2,
            MpegVersion::Mpeg25 => base_rate / 4,
        };

        let padding = (word >> 9) & 1 == 1;
        let mode = match (word >> 6) & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };
        let emphasis = match word & 0b11 {
            0b00 => Emphasis::None,
            0b01 => Emphasis::Ms5015,
            0b10 => Emphasis::Reserved,
            _ => Emphasis::CcittJ17,
        };

        Some(FrameHeader {
            version,
            layer,
            crc,
            bitrate,
            rate,
            padding,
            mode,
            emphasis,
        })
    }

    /// Total frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        let bitrate = self.bitrate as usize * 1000;
        let rate = self.rate as usize;
        let padding = usize::from(self.padding);
        match (self.layer, self.version) {
            (Layer::Layer1, _) => (12 * bitrate / rate + padding) * 4,
            (Layer::Layer2, _) | (Layer::Layer3, MpegVersion::Mpeg1) => {
                144 * bitrate / rate + padding
            }
            (Layer::Layer3, _) => 72 * bitrate / rate + padding,
        }
    }

    /// PCM samples per channel in one frame.
    pub fn samples_per_frame(&self) -> usize {
        match (self.layer, self.version) {
            (Layer::Layer1, _) => 384,
            (Layer::Layer2, _) | (Layer::Layer3, MpegVersion::Mpeg1) => 1152,
            (Layer::Layer3, _) => 576,
        }
    }

    pub fn channels(&self) -> ChannelCount {
        self.mode.channels()
    }

    /// Whether `next` can follow this header in the same stream.
    pub fn continues_with(&self, next: &FrameHeader) -> bool {
        self.version == next.version && self.layer == next.layer && self.rate == next.rate
    }

    /// Offset of the first byte after the Layer III side information.
    fn side_info_end(&self) -> usize {
        let side_info = match (self.version, self.mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            (_, _) => 17,
        };
        let crc = if self.crc { 2 } else { 0 };
        HEADER_LEN + crc + side_info
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            version: self.version,
            layer: self.layer,
            rate: self.rate,
            mode: self.mode,
            bitrate: self.bitrate,
            frame_size: self.frame_len(),
            emphasis: self.emphasis,
            crc: self.crc,
        }
    }
}

/// Looks for a Xing, Info or VBRI tag in a complete Layer III frame.
///
/// Returns `None` when `frame` is an audio frame, otherwise the number of audio frames the
/// tag announces, if any.
pub(crate) fn vbr_tag(header: &FrameHeader, frame: &[u8]) -> Option<Option<u64>> {
    if header.layer != Layer::Layer3 {
        return None;
    }

    let xing = header.side_info_end();
    if let Some(tag) = frame.get(xing..xing + 8) {
        if &tag[..4] == b"Xing" || &tag[..4] == b"Info" {
            let flags = u32::from_be_bytes([tag[4], tag[5], tag[6], tag[7]]);
            let frames = if flags & 0x1 != 0 {
                frame
                    .get(xing + 8..xing + 12)
                    .map(|b| u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            } else {
                None
            };
            return Some(frames);
        }
    }

    let vbri = HEADER_LEN + 32;
    if frame.get(vbri..vbri + 4) == Some(b"VBRI") {
        let frames = frame
            .get(vbri + 14..vbri + 18)
            .map(|b| u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])));
        return Some(frames);
    }
    None
}

/// Total size of the ID3v2 tag starting with `bytes`, footer included.
pub(crate) fn id3v2_len(bytes: &[u8; ID3V2_HEADER_LEN]) -> Option<usize> {
    if &bytes[..3] != b"ID3" || bytes[3] == 0xff || bytes[4] == 0xff {
        return None;
    }
    let mut size = 0usize;
    for &b in &bytes[6..10] {
        if b & 0x80 != 0 {
            return None;
        }
        size = (size << 7) | usize::from(b);
    }
    let footer = if bytes[5] & 0x10 != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN + size + footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case([0xff, 0xfb, 0x90, 0x00], 44100, 2, 417, 1152)]
    #[case([0xff, 0xfb, 0x92, 0x00], 44100, 2, 418, 1152)]
    #[case([0xff, 0xfb, 0x94, 0xc0], 48000, 1, 384, 1152)]
    #[case([0xff, 0xf3, 0x84, 0xc4], 24000, 1, 192, 576)]
    #[case([0xff, 0xe3, 0x48, 0x44], 8000, 2, 288, 576)]
    #[case([0xff, 0xfd, 0x84, 0x00], 48000, 2, 384, 1152)]
    #[case([0xff, 0xff, 0x90, 0x00], 44100, 2, 312, 384)]
    fn parses_headers(
        #[case] bytes: [u8; 4],
        #[case] rate: u32,
        #[case] channels: u16,
        #[case] frame_len: usize,
        #[case] samples: usize,
    ) {
        let header = FrameHeader::parse(bytes).unwrap();
        assert_eq!(header.rate, rate);
        assert_eq!(header.channels(), channels);
        assert_eq!(header.frame_len(), frame_len);
        assert_eq!(header.samples_per_frame(), samples);
    }

    #[rstest]
    #[case([0x00, 0xfb, 0x90, 0x00])] // no sync
    #[case([0xff, 0xeb, 0x90, 0x00])] // reserved version
    #[case([0xff, 0xf9, 0x90, 0x00])] // reserved layer
    #[case([0xff, 0xfb, 0x00, 0x00])] // free format
    #[case([0xff, 0xfb, 0xf0, 0x00])] // bad bitrate
    #[case([0xff, 0xfb, 0x9c, 0x00])] // reserved rate
    fn rejects_invalid_headers(#[case] bytes: [u8; 4]) {
        assert_eq!(FrameHeader::parse(bytes), None);
    }

    #[test]
    fn header_fields() {
        let header = FrameHeader::parse([0xff, 0xfa, 0x90, 0x65]).unwrap();
        assert!(header.crc);
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.layer, Layer::Layer3);
        assert_eq!(header.mode, ChannelMode::JointStereo);
        assert_eq!(header.emphasis, Emphasis::Ms5015);
        assert_eq!(header.info().bitrate, 128);
    }

    #[test]
    fn finds_xing_tag() {
        let header = FrameHeader::parse([0xff, 0xfb, 0x90, 0x00]).unwrap();
        let mut frame = vec![0u8; header.frame_len()];
        frame[..4].copy_from_slice(&[0xff, 0xfb, 0x90, 0x00]);
        assert_eq!(vbr_tag(&header, &frame), None);

        frame[36..40].copy_from_slice(b"Info");
        frame[40..44].copy_from_slice(&1u32.to_be_bytes());
        frame[44..48].copy_from_slice(&1234u32.to_be_bytes());
        assert_eq!(vbr_tag(&header, &frame), Some(Some(1234)));

        frame[40..44].copy_from_slice(&0u32.to_be_bytes());
        assert_eq!(vbr_tag(&header, &frame), Some(None));
    }

    #[test]
    fn finds_vbri_tag() {
        let header = FrameHeader::parse([0xff, 0xfb, 0x90, 0x00]).unwrap();
        let mut frame = vec![0u8; header.frame_len()];
        frame[36..40].copy_from_slice(b"VBRI");
        frame[50..54].copy_from_slice(&77u32.to_be_bytes());
        assert_eq!(vbr_tag(&header, &frame), Some(Some(77)));
    }

    #[test]
    fn id3v2_sizes() {
        let tag = *b"ID3\x04\x00\x00\x00\x00\x02\x01";
        assert_eq!(id3v2_len(&tag), Some(10 + 257));
        let with_footer = *b"ID3\x04\x00\x10\x00\x00\x00\x05";
        assert_eq!(id3v2_len(&with_footer), Some(25));
        assert_eq!(id3v2_len(b"ID3\x04\x00\x00\x00\x00\x80\x00"), None);
        assert_eq!(id3v2_len(b"TAG\x04\x00\x00\x00\x00\x00\x00"), None);
    }
}
