//! Sample conversions between the decoded stream and the negotiated output format.

use crate::common::{ChannelCount, SampleRate};

/// Converts interleaved `f32` frames of one rate and channel count into another.
#[derive(Debug, Clone)]
pub(crate) struct Converter {
    from_channels: ChannelCount,
    to_channels: ChannelCount,
    resampler: Option<RateConverter>,
    mixed: Vec<f32>,
}

impl Converter {
    pub fn new(
        from_rate: SampleRate,
        from_channels: ChannelCount,
        to_rate: SampleRate,
        to_channels: ChannelCount,
    ) -> Self {
        let resampler =
            (from_rate != to_rate).then(|| RateConverter::new(from_rate, to_rate, to_channels));
        Converter {
            from_channels,
            to_channels,
            resampler,
            mixed: Vec::new(),
        }
    }

    /// Appends the converted form of `input` to `output`.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let Some(resampler) = &mut self.resampler else {
            remix(input, self.from_channels, self.to_channels, output);
            return;
        };
        self.mixed.clear();
        remix(input, self.from_channels, self.to_channels, &mut self.mixed);
        resampler.process(&self.mixed, output);
    }

    /// Forgets the samples kept from earlier calls.
    pub fn reset(&mut self) {
        if let Some(resampler) = &mut self.resampler {
            resampler.reset();
        }
    }
}

fn remix(input: &[f32], from: ChannelCount, to: ChannelCount, output: &mut Vec<f32>) {
    match (from, to) {
        (1, 2) => output.extend(input.iter().flat_map(|&s| [s, s])),
        (2, 1) => output.extend(input.chunks_exact(2).map(|f| (f[0] + f[1]) * 0.5)),
        _ => output.extend_from_slice(input),
    }
}

/// Streaming linear interpolation between two sample rates.
///
/// The last input frame of every call is kept, so consecutive calls behave like one call
/// over the concatenated input.
#[derive(Debug, Clone)]
pub(crate) struct RateConverter {
    /// Input frames advanced per output frame is `from / to`.
    from: u64,
    to: u64,
    channels: usize,
    /// Last frame of the previous call.
    history: Vec<f32>,
    /// Position of the next output frame: frame index `index` plus `frac / to`, where index
    /// 0 is the history frame if there is one.
    index: u64,
    frac: u64,
}

impl RateConverter {
    pub fn new(from: SampleRate, to: SampleRate, channels: ChannelCount) -> Self {
        assert!(from >= 1);
        assert!(to >= 1);
        let gcd = gcd(from, to);
        RateConverter {
            from: u64::from(from / gcd),
            to: u64::from(to / gcd),
            channels: channels.max(1) as usize,
            history: Vec::new(),
            index: 0,
            frac: 0,
        }
    }

    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let channels = self.channels;
        let has_history = !self.history.is_empty();
        let count = input.len() / channels + usize::from(has_history);
        if count == 0 {
            return;
        }
        let last = (count - 1) as u64;
        while self.index < last || (self.index == last && self.frac == 0) {
            let current = frame(&self.history, input, channels, self.index as usize);
            if self.frac == 0 {
                output.extend_from_slice(current);
            } else {
                let next = frame(&self.history, input, channels, self.index as usize + 1);
                let t = self.frac as f32 / self.to as f32;
                output.extend(current.iter().zip(next).map(|(a, b)| a + (b - a) * t));
            }
            self.frac += self.from;
            self.index += self.frac / self.to;
            self.frac %= self.to;
        }

        let history = frame(&self.history, input, channels, count - 1).to_vec();
        self.history = history;
        self.index -= last;
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.index = 0;
        self.frac = 0;
    }
}

/// Frame `i` of the history frame followed by `input`.
fn frame<'a>(history: &'a [f32], input: &'a [f32], channels: usize, i: usize) -> &'a [f32] {
    match (history.is_empty(), i) {
        (false, 0) => history,
        (false, i) => &input[(i - 1) * channels..i * channels],
        (true, i) => &input[i * channels..(i + 1) * channels],
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};

    #[test]
    fn channel_mixing() {
        let mut out = Vec::new();
        Converter::new(44100, 1, 44100, 2).process(&[0.5, -0.25], &mut out);
        assert_eq!(out, vec![0.5, 0.5, -0.25, -0.25]);

        out.clear();
        Converter::new(44100, 2, 44100, 1).process(&[0.5, -0.5, 1.0, 0.0], &mut out);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn halving_picks_every_other_frame() {
        let mut converter = RateConverter::new(44100, 22050, 1);
        let mut out = Vec::new();
        converter.process(&[0.0, 1.0, 2.0, 3.0, 4.0], &mut out);
        converter.process(&[5.0, 6.0, 7.0], &mut out);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn doubling_interpolates() {
        let mut converter = RateConverter::new(22050, 44100, 2);
        let mut out = Vec::new();
        converter.process(&[0.0, 0.0, 1.0, -1.0], &mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.5, -0.5, 1.0, -1.0]);
        converter.process(&[2.0, -2.0], &mut out);
        assert_eq!(&out[6..], &[1.5, -1.5, 2.0, -2.0]);

        converter.reset();
        out.clear();
        converter.process(&[3.0, 3.0], &mut out);
        assert_eq!(out, vec![3.0, 3.0]);
    }

    quickcheck! {
        /// Output length follows the rate ratio regardless of how the input is chunked.
        fn chunked_length_matches_ratio(from: u16, to: u16, chunks: Vec<u8>) -> TestResult {
            let rates = crate::common::STANDARD_RATES;
            let from = rates[from as usize % rates.len()];
            let to = rates[to as usize % rates.len()];
            if chunks.is_empty() {
                return TestResult::discard();
            }

            let mut converter = RateConverter::new(from, to, 1);
            let mut out = Vec::new();
            let mut total = 0u64;
            for chunk in &chunks {
                let input = vec![0.25; *chunk as usize];
                total += input.len() as u64;
                converter.process(&input, &mut out);
            }
            if total == 0 {
                return TestResult::from_bool(out.is_empty());
            }
            // output frame k sits at input position k * from / to, the last one at or
            // before input frame `total - 1`
            let expected = (total - 1) * u64::from(to) / u64::from(from) + 1;
            TestResult::from_bool(
                out.len() as u64 == expected && out.iter().all(|&s| (s - 0.25).abs() < 1e-6),
            )
        }
    }
}
