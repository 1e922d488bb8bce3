// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `util` module provides a repository of commonly used utility functions.

pub mod bits {
    //! Utilities for bit manipulation.

    /// Sign extends an arbitrary, 32-bit or less, signed two's complement integer stored within an
    /// u32 to a full width i32.
    #[inline(always)]
    pub fn sign_extend_leq32_to_i32(value: u32, width: u32) -> i32 {
        // Move the sign bit of the value into the sign bit of the i32, then let the arithmetic
        // shift right copy it back down.
        (value.wrapping_shl(32 - width) as i32).wrapping_shr(32 - width)
    }

    #[cfg(test)]
    mod tests {
        use super::sign_extend_leq32_to_i32;

        #[test]
        fn verify_sign_extend_leq32_to_i32() {
            assert_eq!(sign_extend_leq32_to_i32(0b011, 3), 3);
            assert_eq!(sign_extend_leq32_to_i32(0b100, 3), -4);
            assert_eq!(sign_extend_leq32_to_i32(0b111, 3), -1);
            assert_eq!(sign_extend_leq32_to_i32(0x7fff, 16), 32767);
            assert_eq!(sign_extend_leq32_to_i32(0x8000, 16), -32768);
            assert_eq!(sign_extend_leq32_to_i32(0xffff_ffff, 32), -1);
        }
    }
}
