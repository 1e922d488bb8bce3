// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lazy_static::lazy_static;

lazy_static! {
    /// Layer 1 and 2 shared scale factors, `2^(1 - i/3)`. Derived from ISO/IEC 11172-3 Table
    /// 3-B.1. Index 63 is not used by the standard.
    pub static ref LAYER12_SCALEFACTORS: [f32; 64] = {
        let mut scalefactors = [0f32; 64];

        for (i, sf) in scalefactors.iter_mut().enumerate() {
            *sf = f64::powf(2.0, 1.0 - i as f64 / 3.0) as f32;
        }

        scalefactors
    };
}

#[cfg(test)]
mod tests {
    use super::LAYER12_SCALEFACTORS;

    #[test]
    fn verify_layer12_scalefactors() {
        assert_eq!(LAYER12_SCALEFACTORS[0], 2.0);
        assert_eq!(LAYER12_SCALEFACTORS[3], 1.0);
        assert!((LAYER12_SCALEFACTORS[1] - 1.587_401_05).abs() < 1e-6);
        assert!((LAYER12_SCALEFACTORS[62] - 0.000_001_201_554_35).abs() < 1e-10);
    }
}
