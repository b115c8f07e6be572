//! Decoder backends: the final quantization step from `f32` samples to output bytes.

use crate::encoding::{write_samples, Encoding};
use crate::error::InitError;

const GENERIC: &str = "generic";
#[cfg(feature = "dither")]
const GENERIC_DITHER: &str = "generic_dither";

/// Names of the decoder backends compiled into this build, the default first.
pub fn supported_decoders() -> Vec<&'static str> {
    vec![
        GENERIC,
        #[cfg(feature = "dither")]
        GENERIC_DITHER,
    ]
}

pub(crate) enum Backend {
    Generic,
    /// Adds triangular noise of one least significant bit before integer quantization.
    #[cfg(feature = "dither")]
    Dither(rand::rngs::SmallRng),
}

impl Backend {
    /// Selects a backend by name, `None` or an empty name for the default.
    pub fn by_name(name: Option<&str>) -> Result<Self, InitError> {
        match name.unwrap_or_default() {
            "" | GENERIC => Ok(Backend::Generic),
            #[cfg(feature = "dither")]
            GENERIC_DITHER => Ok(Backend::Dither(rand::make_rng())),
            other => Err(InitError::UnknownBackend(other.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Generic => GENERIC,
            #[cfg(feature = "dither")]
            Backend::Dither(_) => GENERIC_DITHER,
        }
    }

    /// Appends `samples` to `out` in `encoding`.
    pub fn write(&mut self, encoding: Encoding, samples: &[f32], out: &mut Vec<u8>) {
        match self {
            Backend::Generic => write_samples(encoding, samples, None, out),
            #[cfg(feature = "dither")]
            Backend::Dither(rng) => {
                use rand::RngExt;

                let mut tpdf = || rng.random::<f32>() - rng.random::<f32>();
                let noise: &mut dyn FnMut() -> f32 = &mut tpdf;
                write_samples(encoding, samples, Some(noise), out)
            }
        }
    }
}
