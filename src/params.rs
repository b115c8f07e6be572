//! Engine parameters.

use std::ops::{BitOr, BitOrAssign};

use crate::error::EngineError;

/// Engine flags, combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    /// Always produce mono output, averaging stereo streams.
    pub const FORCE_MONO: Flags = Flags(0x1);
    /// Always produce stereo output, duplicating mono streams.
    pub const FORCE_STEREO: Flags = Flags(0x2);
    /// Only negotiate 32 bit float output.
    pub const FORCE_FLOAT: Flags = Flags(0x4);
    /// Do not log recoverable frame errors.
    pub const QUIET: Flags = Flags(0x8);
    /// Treat Xing/Info/VBRI tag frames as ordinary audio frames.
    pub const IGNORE_INFOFRAME: Flags = Flags(0x10);
    /// Fail with [`EngineError::LostSync`] instead of searching for the next frame.
    pub const NO_RESYNC: Flags = Flags(0x20);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    /// Whether every flag of `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn remove(self, other: Flags) -> Self {
        Flags(self.0 & !other.0)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Self) -> Self {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A single parameter change, see [`Decoder::param`](crate::Decoder::param).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    /// Replace all flags.
    Flags(Flags),
    AddFlags(Flags),
    RemoveFlags(Flags),
    /// How many bytes of garbage to skip looking for the next frame, `-1` for no limit.
    ResyncLimit(i64),
    /// Linear gain applied to every decoded sample.
    OutScale(f64),
    /// Stop after this many MPEG frames.
    DecodeFrames(Option<u64>),
}

/// Default number of bytes searched for the next frame header.
pub const DEFAULT_RESYNC_LIMIT: i64 = 1024;

/// Current parameter values of an engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Params {
    pub flags: Flags,
    pub resync_limit: i64,
    pub out_scale: f64,
    pub decode_frames: Option<u64>,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            flags: Flags::empty(),
            resync_limit: DEFAULT_RESYNC_LIMIT,
            out_scale: 1.0,
            decode_frames: None,
        }
    }
}

impl Params {
    pub fn apply(&mut self, param: Param) -> Result<(), EngineError> {
        match param {
            Param::Flags(flags) => self.flags = flags,
            Param::AddFlags(flags) => self.flags |= flags,
            Param::RemoveFlags(flags) => self.flags = self.flags.remove(flags),
            Param::ResyncLimit(limit) if limit < -1 => {
                return Err(EngineError::BadParam("resync limit below -1"))
            }
            Param::ResyncLimit(limit) => self.resync_limit = limit,
            Param::OutScale(scale) if !scale.is_finite() || scale < 0.0 => {
                return Err(EngineError::BadParam("output scale must be finite and not negative"))
            }
            Param::OutScale(scale) => self.out_scale = scale,
            Param::DecodeFrames(frames) => self.decode_frames = frames,
        }
        if self.flags.contains(Flags::FORCE_MONO | Flags::FORCE_STEREO) {
            self.flags = self.flags.remove(Flags::FORCE_STEREO);
            return Err(EngineError::BadParam(
                "mono and stereo output cannot both be forced",
            ));
        }
        Ok(())
    }

    /// Resync budget in bytes, `None` when unlimited.
    pub fn resync_budget(&self) -> Option<u64> {
        u64::try_from(self.resync_limit).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_updates() {
        let mut params = Params::default();
        params.apply(Param::AddFlags(Flags::QUIET)).unwrap();
        params
            .apply(Param::AddFlags(Flags::FORCE_FLOAT | Flags::NO_RESYNC))
            .unwrap();
        assert!(params.flags.contains(Flags::QUIET | Flags::FORCE_FLOAT));
        params.apply(Param::RemoveFlags(Flags::QUIET)).unwrap();
        assert!(!params.flags.contains(Flags::QUIET));
        assert!(params.flags.contains(Flags::NO_RESYNC));
        params.apply(Param::Flags(Flags::FORCE_MONO)).unwrap();
        assert_eq!(params.flags, Flags::FORCE_MONO);
    }

    #[test]
    fn conflicting_layouts_rejected() {
        let mut params = Params::default();
        params.apply(Param::Flags(Flags::FORCE_MONO)).unwrap();
        assert!(params.apply(Param::AddFlags(Flags::FORCE_STEREO)).is_err());
        assert_eq!(params.flags, Flags::FORCE_MONO);
    }

    #[test]
    fn value_params() {
        let mut params = Params::default();
        assert_eq!(params.resync_budget(), Some(1024));
        params.apply(Param::ResyncLimit(-1)).unwrap();
        assert_eq!(params.resync_budget(), None);
        assert!(params.apply(Param::ResyncLimit(-2)).is_err());
        assert!(params.apply(Param::OutScale(f64::NAN)).is_err());
        params.apply(Param::OutScale(0.5)).unwrap();
        assert_eq!(params.out_scale, 0.5);
        params.apply(Param::DecodeFrames(Some(3))).unwrap();
        assert_eq!(params.decode_frames, Some(3));
    }
}
