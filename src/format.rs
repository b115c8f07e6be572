//! Output format descriptor and negotiation.
//!
//! A decoder keeps a [`FormatTable`] of the output formats it is allowed to produce. When the
//! stream reveals its native rate and channel count, the table is consulted in this order:
//! native rate with native channels, native rate with the other channel layout, then the
//! remaining rates by distance to the native one. Within the first usable entry the most
//! preferred encoding wins (see [`Encoding::PREFERENCE`]).

use std::fmt;

use crate::common::{rate_index, ChannelCount, SampleRate, STANDARD_RATES};
use crate::encoding::{Encoding, Encodings};
use crate::error::EngineError;
use crate::params::Flags;

/// Rate, channel count and sample encoding of decoded PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub rate: SampleRate,
    pub channels: ChannelCount,
    pub encoding: Encoding,
}

impl Format {
    pub fn new(rate: SampleRate, channels: ChannelCount, encoding: Encoding) -> Self {
        Format {
            rate,
            channels,
            encoding,
        }
    }

    /// Size in bytes of one PCM frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channels as usize
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} channels, {}",
            self.rate, self.channels, self.encoding
        )
    }
}

/// Allowed encodings per standard rate and channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTable {
    // indexed by [rate_index][channels - 1]
    entries: [[Encodings; 2]; STANDARD_RATES.len()],
}

impl Default for FormatTable {
    fn default() -> Self {
        Self::all()
    }
}

impl FormatTable {
    /// Every rate, both channel layouts, any encoding. The default of a new decoder.
    pub fn all() -> Self {
        FormatTable {
            entries: [[Encodings::ANY; 2]; STANDARD_RATES.len()],
        }
    }

    /// Nothing allowed; formats have to be enabled one by one with [`FormatTable::set`].
    pub fn none() -> Self {
        FormatTable {
            entries: [[Encodings::NONE; 2]; STANDARD_RATES.len()],
        }
    }

    /// Replaces the encodings allowed for `rate` with `channels`.
    pub fn set(
        &mut self,
        rate: SampleRate,
        channels: ChannelCount,
        encodings: Encodings,
    ) -> Result<(), EngineError> {
        let (rate, channels) = Self::slot(rate, channels)?;
        self.entries[rate][channels] = encodings;
        Ok(())
    }

    /// Encodings allowed for `rate` with `channels`, empty for unsupported combinations.
    pub fn support(&self, rate: SampleRate, channels: ChannelCount) -> Encodings {
        Self::slot(rate, channels)
            .map(|(rate, channels)| self.entries[rate][channels])
            .unwrap_or(Encodings::NONE)
    }

    fn slot(rate: SampleRate, channels: ChannelCount) -> Result<(usize, usize), EngineError> {
        let rate_slot = rate_index(rate).ok_or(EngineError::BadRate(rate))?;
        match channels {
            1 | 2 => Ok((rate_slot, channels as usize - 1)),
            _ => Err(EngineError::BadChannels(channels)),
        }
    }

    /// Picks the output format for a stream of `rate` Hz with `channels` channels.
    pub(crate) fn negotiate(
        &self,
        rate: SampleRate,
        channels: ChannelCount,
        flags: Flags,
    ) -> Option<Format> {
        let layouts: &[ChannelCount] = if flags.contains(Flags::FORCE_MONO) {
            &[1]
        } else if flags.contains(Flags::FORCE_STEREO) {
            &[2]
        } else if channels == 1 {
            &[1, 2]
        } else {
            &[2, 1]
        };

        let mut rates = STANDARD_RATES;
        // stable sort keeps the table order among equally distant rates, prefer the higher one
        rates.sort_by_key(|&r| (r.abs_diff(rate), std::cmp::Reverse(r)));

        for out_rate in rates {
            for &out_channels in layouts {
                let mut allowed = self.support(out_rate, out_channels);
                if flags.contains(Flags::FORCE_FLOAT) {
                    allowed = if allowed.contains(Encoding::Float32) {
                        Encoding::Float32.into()
                    } else {
                        Encodings::NONE
                    };
                }
                if let Some(encoding) = allowed.preferred() {
                    return Some(Format::new(out_rate, out_channels, encoding));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_keeps_native_format() {
        let format = FormatTable::all().negotiate(44100, 2, Flags::empty());
        assert_eq!(format, Some(Format::new(44100, 2, Encoding::Signed16)));
        assert_eq!(format.unwrap().bytes_per_frame(), 4);
    }

    #[test]
    fn empty_table_negotiates_nothing() {
        assert_eq!(FormatTable::none().negotiate(44100, 2, Flags::empty()), None);
    }

    #[test]
    fn prefers_changing_channels_over_rate() {
        let mut table = FormatTable::none();
        table.set(44100, 1, Encoding::Float32.into()).unwrap();
        table.set(48000, 2, Encodings::ANY).unwrap();
        assert_eq!(
            table.negotiate(44100, 2, Flags::empty()),
            Some(Format::new(44100, 1, Encoding::Float32))
        );
    }

    #[test]
    fn falls_back_to_closest_rate() {
        let mut table = FormatTable::none();
        table.set(8000, 2, Encodings::ANY).unwrap();
        table.set(22050, 2, Encoding::Unsigned8.into()).unwrap();
        assert_eq!(
            table.negotiate(44100, 2, Flags::empty()),
            Some(Format::new(22050, 2, Encoding::Unsigned8))
        );
    }

    #[test]
    fn forced_layouts() {
        let table = FormatTable::all();
        let mono = table.negotiate(44100, 2, Flags::FORCE_MONO).unwrap();
        assert_eq!(mono.channels, 1);
        let stereo = table.negotiate(22050, 1, Flags::FORCE_STEREO).unwrap();
        assert_eq!(stereo.channels, 2);
        let float = table.negotiate(22050, 1, Flags::FORCE_FLOAT).unwrap();
        assert_eq!(float, Format::new(22050, 1, Encoding::Float32));
    }

    #[test]
    fn set_replaces_and_validates() {
        let mut table = FormatTable::all();
        table.set(32000, 1, Encoding::Alaw8.into()).unwrap();
        assert_eq!(table.support(32000, 1), Encoding::Alaw8.into());
        assert!(matches!(
            table.set(44000, 1, Encodings::ANY),
            Err(EngineError::BadRate(44000))
        ));
        assert!(matches!(
            table.set(44100, 3, Encodings::ANY),
            Err(EngineError::BadChannels(3))
        ));
        assert_eq!(table.support(44100, 0), Encodings::NONE);
    }
}
