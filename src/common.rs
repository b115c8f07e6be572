/// Stream sample rate (samples per second per channel).
pub type SampleRate = u32;

/// Number of channels in a stream.
pub type ChannelCount = u16;

/// Sample rates an MPEG audio stream can carry, MPEG-1 first, then MPEG-2 and MPEG-2.5.
///
/// These are also the only output rates the decoder negotiates.
pub const STANDARD_RATES: [SampleRate; 9] = [
    44100, 48000, 32000, 22050, 24000, 16000, 11025, 12000, 8000,
];

/// Position of `rate` in [`STANDARD_RATES`].
pub(crate) fn rate_index(rate: SampleRate) -> Option<usize> {
    STANDARD_RATES.iter().position(|&r| r == rate)
}

/// Compile time check that error types are usable across threads and as trait objects.
macro_rules! assert_error_traits {
    ($($t:ty),+ $(,)?) => {
        const _: () = {
            const fn assert_error<T: std::error::Error + Send + Sync + Clone + 'static>() {}
            $(assert_error::<$t>();)+
        };
    };
}
pub(crate) use assert_error_traits;
