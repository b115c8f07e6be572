//! PCM sample encodings the decoder can produce.
//!
//! Every [`Encoding`] keeps the numeric code the classic MPG123 interface uses for it, so
//! values coming from configuration files or other bindings can be mapped with
//! [`Encoding::from_raw`]. A set of encodings is an [`Encodings`] bit mask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use dasp_sample::{Sample as _, I24, U24};

const ENC_16: u32 = 0x040;
const ENC_24: u32 = 0x4000;
const ENC_32: u32 = 0x100;
const ENC_SIGNED: u32 = 0x080;

/// Output sample representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Signed8,
    Unsigned8,
    /// 8 bit G.711 µ-law.
    Ulaw8,
    /// 8 bit G.711 A-law.
    Alaw8,
    Signed16,
    Unsigned16,
    /// 24 bit integer packed in three bytes.
    Signed24,
    Unsigned24,
    Signed32,
    Unsigned32,
    Float32,
    Float64,
}

impl Encoding {
    /// All encodings, in the order the decoder prefers them when several are allowed.
    pub const PREFERENCE: [Encoding; 12] = [
        Encoding::Signed16,
        Encoding::Unsigned16,
        Encoding::Signed32,
        Encoding::Unsigned32,
        Encoding::Signed24,
        Encoding::Unsigned24,
        Encoding::Float32,
        Encoding::Float64,
        Encoding::Signed8,
        Encoding::Unsigned8,
        Encoding::Ulaw8,
        Encoding::Alaw8,
    ];

    /// The MPG123 code of this encoding.
    pub const fn to_raw(self) -> i32 {
        let raw = match self {
            Encoding::Signed8 => ENC_SIGNED | 0x02,
            Encoding::Unsigned8 => 0x01,
            Encoding::Ulaw8 => 0x04,
            Encoding::Alaw8 => 0x08,
            Encoding::Signed16 => ENC_16 | ENC_SIGNED | 0x10,
            Encoding::Unsigned16 => ENC_16 | 0x20,
            Encoding::Signed24 => ENC_24 | ENC_SIGNED | 0x1000,
            Encoding::Unsigned24 => ENC_24 | 0x2000,
            Encoding::Signed32 => ENC_32 | ENC_SIGNED | 0x1000,
            Encoding::Unsigned32 => ENC_32 | 0x2000,
            Encoding::Float32 => 0x200,
            Encoding::Float64 => 0x400,
        };
        raw as i32
    }

    /// Looks up the encoding with the given MPG123 code.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|e| e.to_raw() == raw)
    }

    /// Width of one sample in bits.
    pub const fn sample_bits(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }

    /// Width of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Encoding::Signed8 | Encoding::Unsigned8 | Encoding::Ulaw8 | Encoding::Alaw8 => 1,
            Encoding::Signed16 | Encoding::Unsigned16 => 2,
            Encoding::Signed24 | Encoding::Unsigned24 => 3,
            Encoding::Signed32 | Encoding::Unsigned32 | Encoding::Float32 => 4,
            Encoding::Float64 => 8,
        }
    }

    /// Position in [`Encoding::PREFERENCE`], which is also the bit used in [`Encodings`].
    const fn rank(self) -> u32 {
        match self {
            Encoding::Signed16 => 0,
            Encoding::Unsigned16 => 1,
            Encoding::Signed32 => 2,
            Encoding::Unsigned32 => 3,
            Encoding::Signed24 => 4,
            Encoding::Unsigned24 => 5,
            Encoding::Float32 => 6,
            Encoding::Float64 => 7,
            Encoding::Signed8 => 8,
            Encoding::Unsigned8 => 9,
            Encoding::Ulaw8 => 10,
            Encoding::Alaw8 => 11,
        }
    }

    /// Whether samples are integers (as opposed to floating point).
    pub const fn is_integer(self) -> bool {
        !matches!(self, Encoding::Float32 | Encoding::Float64)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Signed8 => "s8",
            Encoding::Unsigned8 => "u8",
            Encoding::Ulaw8 => "ulaw",
            Encoding::Alaw8 => "alaw",
            Encoding::Signed16 => "s16",
            Encoding::Unsigned16 => "u16",
            Encoding::Signed24 => "s24",
            Encoding::Unsigned24 => "u24",
            Encoding::Signed32 => "s32",
            Encoding::Unsigned32 => "u32",
            Encoding::Float32 => "f32",
            Encoding::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Bits per sample of the encoding with MPG123 code `raw`, 0 for unknown codes.
pub fn encoding_sample_bits(raw: i32) -> u32 {
    Encoding::from_raw(raw).map_or(0, Encoding::sample_bits)
}

/// A set of encodings.
///
/// Unlike the raw MPG123 mask, membership is exact: the codes of some encodings share bits,
/// so a raw mask can claim encodings nobody asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Encodings(u16);

impl Encodings {
    pub const NONE: Encodings = Encodings(0);
    /// Every encoding, the wildcard of format negotiation.
    pub const ANY: Encodings = Encodings((1 << Encoding::PREFERENCE.len()) - 1);

    /// Builds a set from a MPG123 style mask: every encoding whose code bits are all present.
    pub fn from_raw(raw: i32) -> Self {
        Encoding::PREFERENCE
            .into_iter()
            .filter(|e| raw & e.to_raw() == e.to_raw())
            .fold(Encodings::NONE, |set, e| set | e)
    }

    /// The MPG123 style mask of this set.
    pub fn to_raw(self) -> i32 {
        self.iter().fold(0, |raw, e| raw | e.to_raw())
    }

    pub const fn contains(self, encoding: Encoding) -> bool {
        self.0 & (1 << encoding.rank()) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The most preferred encoding of the set.
    pub fn preferred(self) -> Option<Encoding> {
        self.iter().next()
    }

    /// Members of the set in preference order.
    pub fn iter(self) -> impl Iterator<Item = Encoding> {
        Encoding::PREFERENCE
            .into_iter()
            .filter(move |&e| self.contains(e))
    }
}

impl From<Encoding> for Encodings {
    fn from(encoding: Encoding) -> Self {
        Encodings(1 << encoding.rank())
    }
}

impl BitOr for Encodings {
    type Output = Encodings;

    fn bitor(self, rhs: Self) -> Self {
        Encodings(self.0 | rhs.0)
    }
}

impl BitOr<Encoding> for Encodings {
    type Output = Encodings;

    fn bitor(self, rhs: Encoding) -> Self {
        self | Encodings::from(rhs)
    }
}

impl BitOr for Encoding {
    type Output = Encodings;

    fn bitor(self, rhs: Self) -> Encodings {
        Encodings::from(self) | rhs
    }
}

impl BitOrAssign for Encodings {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Appends `samples` to `out` in `encoding`, native byte order.
///
/// Samples are clamped to `[-1.0, 1.0]` first. `noise` supplies a dither offset in
/// least significant bits for integer encodings of 16 bits or less.
pub(crate) fn write_samples(
    encoding: Encoding,
    samples: &[f32],
    mut noise: Option<&mut dyn FnMut() -> f32>,
    out: &mut Vec<u8>,
) {
    out.reserve(samples.len() * encoding.bytes_per_sample());
    let lsb = match encoding.sample_bits() {
        8 if matches!(encoding, Encoding::Signed8 | Encoding::Unsigned8) => 1.0 / 128.0,
        8 | 16 => 1.0 / 32768.0,
        _ => 0.0,
    };
    for &sample in samples {
        let mut sample = sample.clamp(-1.0, 1.0);
        if lsb > 0.0 {
            if let Some(noise) = noise.as_deref_mut() {
                sample = (sample + noise() * lsb).clamp(-1.0, 1.0);
            }
        }
        match encoding {
            Encoding::Signed8 => out.push(sample.to_sample::<i8>() as u8),
            Encoding::Unsigned8 => out.push(sample.to_sample::<u8>()),
            Encoding::Ulaw8 => out.push(linear_to_ulaw(sample.to_sample::<i16>())),
            Encoding::Alaw8 => out.push(linear_to_alaw(sample.to_sample::<i16>())),
            Encoding::Signed16 => out.extend_from_slice(&sample.to_sample::<i16>().to_ne_bytes()),
            Encoding::Unsigned16 => out.extend_from_slice(&sample.to_sample::<u16>().to_ne_bytes()),
            Encoding::Signed24 => push_packed_24(out, sample.to_sample::<I24>().inner()),
            Encoding::Unsigned24 => push_packed_24(out, sample.to_sample::<U24>().inner()),
            Encoding::Signed32 => out.extend_from_slice(&sample.to_sample::<i32>().to_ne_bytes()),
            Encoding::Unsigned32 => out.extend_from_slice(&sample.to_sample::<u32>().to_ne_bytes()),
            Encoding::Float32 => out.extend_from_slice(&sample.to_ne_bytes()),
            Encoding::Float64 => out.extend_from_slice(&f64::from(sample).to_ne_bytes()),
        }
    }
}

fn push_packed_24(out: &mut Vec<u8>, value: i32) {
    let bytes = value.to_ne_bytes();
    if cfg!(target_endian = "little") {
        out.extend_from_slice(&bytes[..3]);
    } else {
        out.extend_from_slice(&bytes[1..]);
    }
}

/// G.711 µ-law compression of a 16 bit sample.
pub(crate) fn linear_to_ulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    let mut magnitude = i32::from(sample);
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0
    };
    let magnitude = magnitude.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0f;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// G.711 A-law compression of a 16 bit sample.
pub(crate) fn linear_to_alaw(sample: i16) -> u8 {
    const SEGMENT_END: [i32; 8] = [0x1f, 0x3f, 0x7f, 0xff, 0x1ff, 0x3ff, 0x7ff, 0xfff];

    let mut value = i32::from(sample) >> 3;
    let mask: i32 = if value >= 0 {
        0xd5
    } else {
        value = -value - 1;
        0x55
    };
    let Some(segment) = SEGMENT_END.iter().position(|&end| value <= end) else {
        return (0x7f ^ mask) as u8;
    };
    let mut alaw = (segment as i32) << 4;
    if segment < 2 {
        alaw |= (value >> 1) & 0x0f;
    } else {
        alaw |= (value >> segment) & 0x0f;
    }
    (alaw ^ mask) as u8
}
