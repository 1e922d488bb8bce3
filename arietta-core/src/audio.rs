// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides primitives describing decoded PCM signals.

use bitflags::bitflags;

bitflags! {
    /// Channels is a bit mask of all channels contained in a signal.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Channels: u32 {
        /// Front-left (left) or the Mono channel.
        const FRONT_LEFT  = 0x0000_0001;
        /// Front-right (right) channel.
        const FRONT_RIGHT = 0x0000_0002;
    }
}

impl Channels {
    /// Gets the number of channels.
    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

/// The number of bytes occupied by one interleaved sample of signed 16-bit PCM.
pub const PCM_S16_BYTES: usize = 2;

/// Converts a normalized sample to signed 16-bit PCM. The result is rounded to the nearest
/// integer, with halfway cases rounded away from zero, and clamped to the symmetric range
/// `[-32767, 32767]`.
#[inline(always)]
pub fn f32_to_s16(sample: f32) -> i16 {
    let scaled = (sample * 32767.0).round() as i32;
    scaled.clamp(-32767, 32767) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_channel_count() {
        assert_eq!(Channels::FRONT_LEFT.count(), 1);
        assert_eq!((Channels::FRONT_LEFT | Channels::FRONT_RIGHT).count(), 2);
        assert_eq!(Channels::empty().count(), 0);
    }

    #[test]
    fn verify_s16_conversion() {
        assert_eq!(f32_to_s16(0.0), 0);
        assert_eq!(f32_to_s16(1.0), 32767);
        assert_eq!(f32_to_s16(-1.0), -32767);
        assert_eq!(f32_to_s16(4.0), 32767);
        assert_eq!(f32_to_s16(-4.0), -32767);
        // Rounding to nearest, halfway away from zero.
        assert_eq!(f32_to_s16(0.5), 16384);
        assert_eq!(f32_to_s16(-0.5), -16384);
        assert_eq!(f32_to_s16(0.9 / 32767.0), 1);
        assert_eq!(f32_to_s16(-0.9 / 32767.0), -1);
        assert_eq!(f32_to_s16(0.4 / 32767.0), 0);
    }
}
