// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `synthesis` module implements the polyphase synthesis filterbank shared by all three layers.

use std::f64;

use lazy_static::lazy_static;

/// Synthesis window D[i], defined in Table B.3 of ISO/IEC 11172-3.
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
const SYNTHESIS_D: [f32; 512] = [
     0.000000000, -0.000015259, -0.000015259, -0.000015259,
    -0.000015259, -0.000015259, -0.000015259, -0.000030518,
    -0.000030518, -0.000030518, -0.000030518, -0.000045776,
    -0.000045776, -0.000061035, -0.000061035, -0.000076294,
    -0.000076294, -0.000091553, -0.000106812, -0.000106812,
    -0.000122070, -0.000137329, -0.000152588, -0.000167847,
    -0.000198364, -0.000213623, -0.000244141, -0.000259399,
    -0.000289917, -0.000320435, -0.000366211, -0.000396729,
    -0.000442505, -0.000473022, -0.000534058, -0.000579834,
    -0.000625610, -0.000686646, -0.000747681, -0.000808716,
    -0.000885010, -0.000961304, -0.001037598, -0.001113892,
    -0.001205444, -0.001296997, -0.001388550, -0.001480103,
    -0.001586914, -0.001693726, -0.001785278, -0.001907349,
    -0.002014160, -0.002120972, -0.002243042, -0.002349854,
    -0.002456665, -0.002578735, -0.002685547, -0.002792358,
    -0.002899170, -0.002990723, -0.003082275, -0.003173828,
     0.003250122,  0.003326416,  0.003387451,  0.003433228,
     0.003463745,  0.003479004,  0.003479004,  0.003463745,
     0.003417969,  0.003372192,  0.003280640,  0.003173828,
     0.003051758,  0.002883911,  0.002700806,  0.002487183,
     0.002227783,  0.001937866,  0.001617432,  0.001266479,
     0.000869751,  0.000442505, -0.000030518, -0.000549316,
    -0.001098633, -0.001693726, -0.002334595, -0.003005981,
    -0.003723145, -0.004486084, -0.005294800, -0.006118774,
    -0.007003784, -0.007919312, -0.008865356, -0.009841919,
    -0.010848999, -0.011886597, -0.012939453, -0.014022827,
    -0.015121460, -0.016235352, -0.017349243, -0.018463135,
    -0.019577026, -0.020690918, -0.021789551, -0.022857666,
    -0.023910522, -0.024932861, -0.025909424, -0.026840210,
    -0.027725220, -0.028533936, -0.029281616, -0.029937744,
    -0.030532837, -0.031005859, -0.031387329, -0.031661987,
    -0.031814575, -0.031845093, -0.031738281, -0.031478882,
     0.031082153,  0.030517578,  0.029785156,  0.028884888,
     0.027801514,  0.026535034,  0.025085449,  0.023422241,
     0.021575928,  0.019531250,  0.017257690,  0.014801025,
     0.012115479,  0.009231567,  0.006134033,  0.002822876,
    -0.000686646, -0.004394531, -0.008316040, -0.012420654,
    -0.016708374, -0.021179199, -0.025817871, -0.030609131,
    -0.035552979, -0.040634155, -0.045837402, -0.051132202,
    -0.056533813, -0.061996460, -0.067520142, -0.073059082,
    -0.078628540, -0.084182739, -0.089706421, -0.095169067,
    -0.100540161, -0.105819702, -0.110946655, -0.115921021,
    -0.120697021, -0.125259399, -0.129562378, -0.133590698,
    -0.137298584, -0.140670776, -0.143676758, -0.146255493,
    -0.148422241, -0.150115967, -0.151306152, -0.151962280,
    -0.152069092, -0.151596069, -0.150497437, -0.148773193,
    -0.146362305, -0.143264771, -0.139450073, -0.134887695,
    -0.129577637, -0.123474121, -0.116577148, -0.108856201,
     0.100311279,  0.090927124,  0.080688477,  0.069595337,
     0.057617187,  0.044784546,  0.031082153,  0.016510010,
     0.001068115, -0.015228271, -0.032379150, -0.050354004,
    -0.069168091, -0.088775635, -0.109161377, -0.130310059,
    -0.152206421, -0.174789429, -0.198059082, -0.221984863,
    -0.246505737, -0.271591187, -0.297210693, -0.323318481,
    -0.349868774, -0.376800537, -0.404083252, -0.431655884,
    -0.459472656, -0.487472534, -0.515609741, -0.543823242,
    -0.572036743, -0.600219727, -0.628295898, -0.656219482,
    -0.683914185, -0.711318970, -0.738372803, -0.765029907,
    -0.791213989, -0.816864014, -0.841949463, -0.866363525,
    -0.890090942, -0.913055420, -0.935195923, -0.956481934,
    -0.976852417, -0.996246338, -1.014617920, -1.031936646,
    -1.048156738, -1.063217163, -1.077117920, -1.089782715,
    -1.101211548, -1.111373901, -1.120223999, -1.127746582,
    -1.133926392, -1.138763428, -1.142211914, -1.144287109,
     1.144989014,  1.144287109,  1.142211914,  1.138763428,
     1.133926392,  1.127746582,  1.120223999,  1.111373901,
     1.101211548,  1.089782715,  1.077117920,  1.063217163,
     1.048156738,  1.031936646,  1.014617920,  0.996246338,
     0.976852417,  0.956481934,  0.935195923,  0.913055420,
     0.890090942,  0.866363525,  0.841949463,  0.816864014,
     0.791213989,  0.765029907,  0.738372803,  0.711318970,
     0.683914185,  0.656219482,  0.628295898,  0.600219727,
     0.572036743,  0.543823242,  0.515609741,  0.487472534,
     0.459472656,  0.431655884,  0.404083252,  0.376800537,
     0.349868774,  0.323318481,  0.297210693,  0.271591187,
     0.246505737,  0.221984863,  0.198059082,  0.174789429,
     0.152206421,  0.130310059,  0.109161377,  0.088775635,
     0.069168091,  0.050354004,  0.032379150,  0.015228271,
    -0.001068115, -0.016510010, -0.031082153, -0.044784546,
    -0.057617187, -0.069595337, -0.080688477, -0.090927124,
     0.100311279,  0.108856201,  0.116577148,  0.123474121,
     0.129577637,  0.134887695,  0.139450073,  0.143264771,
     0.146362305,  0.148773193,  0.150497437,  0.151596069,
     0.152069092,  0.151962280,  0.151306152,  0.150115967,
     0.148422241,  0.146255493,  0.143676758,  0.140670776,
     0.137298584,  0.133590698,  0.129562378,  0.125259399,
     0.120697021,  0.115921021,  0.110946655,  0.105819702,
     0.100540161,  0.095169067,  0.089706421,  0.084182739,
     0.078628540,  0.073059082,  0.067520142,  0.061996460,
     0.056533813,  0.051132202,  0.045837402,  0.040634155,
     0.035552979,  0.030609131,  0.025817871,  0.021179199,
     0.016708374,  0.012420654,  0.008316040,  0.004394531,
     0.000686646, -0.002822876, -0.006134033, -0.009231567,
    -0.012115479, -0.014801025, -0.017257690, -0.019531250,
    -0.021575928, -0.023422241, -0.025085449, -0.026535034,
    -0.027801514, -0.028884888, -0.029785156, -0.030517578,
     0.031082153,  0.031478882,  0.031738281,  0.031845093,
     0.031814575,  0.031661987,  0.031387329,  0.031005859,
     0.030532837,  0.029937744,  0.029281616,  0.028533936,
     0.027725220,  0.026840210,  0.025909424,  0.024932861,
     0.023910522,  0.022857666,  0.021789551,  0.020690918,
     0.019577026,  0.018463135,  0.017349243,  0.016235352,
     0.015121460,  0.014022827,  0.012939453,  0.011886597,
     0.010848999,  0.009841919,  0.008865356,  0.007919312,
     0.007003784,  0.006118774,  0.005294800,  0.004486084,
     0.003723145,  0.003005981,  0.002334595,  0.001693726,
     0.001098633,  0.000549316,  0.000030518, -0.000442505,
    -0.000869751, -0.001266479, -0.001617432, -0.001937866,
    -0.002227783, -0.002487183, -0.002700806, -0.002883911,
    -0.003051758, -0.003173828, -0.003280640, -0.003372192,
    -0.003417969, -0.003463745, -0.003479004, -0.003479004,
    -0.003463745, -0.003433228, -0.003387451, -0.003326416,
     0.003250122,  0.003173828,  0.003082275,  0.002990723,
     0.002899170,  0.002792358,  0.002685547,  0.002578735,
     0.002456665,  0.002349854,  0.002243042,  0.002120972,
     0.002014160,  0.001907349,  0.001785278,  0.001693726,
     0.001586914,  0.001480103,  0.001388550,  0.001296997,
     0.001205444,  0.001113892,  0.001037598,  0.000961304,
     0.000885010,  0.000808716,  0.000747681,  0.000686646,
     0.000625610,  0.000579834,  0.000534058,  0.000473022,
     0.000442505,  0.000396729,  0.000366211,  0.000320435,
     0.000289917,  0.000259399,  0.000244141,  0.000213623,
     0.000198364,  0.000167847,  0.000152588,  0.000137329,
     0.000122070,  0.000106812,  0.000106812,  0.000091553,
     0.000076294,  0.000076294,  0.000061035,  0.000061035,
     0.000045776,  0.000045776,  0.000030518,  0.000030518,
     0.000030518,  0.000030518,  0.000015259,  0.000015259,
     0.000015259,  0.000015259,  0.000015259,  0.000015259,
];

lazy_static! {
    /// The matrixing coefficients, N[i][k] = cos((16 + i)(2k + 1)π / 64).
    static ref SYNTHESIS_N: [[f32; 32]; 64] = {
        const PI_64: f64 = f64::consts::PI / 64.0;

        let mut n = [[0f32; 32]; 64];

        for (i, row) in n.iter_mut().enumerate() {
            for (k, coeff) in row.iter_mut().enumerate() {
                *coeff = (PI_64 * ((16 + i) * (2 * k + 1)) as f64).cos() as f32;
            }
        }

        n
    };
}

/// `SynthesisState` maintains the persistant state of sub-band synthesis for one channel.
///
/// The 1024 sample history vector V is stored as a ring. Rather than shifting every sample by 64
/// each iteration, the ring offset moves backwards by 64 and the newest 64 samples are written at
/// the new offset. Element `n` of V, as written in the standard, is `v[(offset + n) & 0x3ff]`.
pub struct SynthesisState {
    v: [f32; 1024],
    offset: usize,
}

impl Default for SynthesisState {
    fn default() -> Self {
        SynthesisState { v: [0f32; 1024], offset: 0 }
    }
}

/// Sub-band synthesis transforms 32 sub-bands of `n_slots` time-domain samples each into
/// `n_slots` blocks of 32 PCM audio samples.
///
/// The input is sub-band major, `in_samples[n_slots * sb + t]`, and the output is time major,
/// `out[32 * t + j]`. Output samples are not clamped.
pub fn synthesis(state: &mut SynthesisState, n_slots: usize, in_samples: &[f32], out: &mut [f32]) {
    debug_assert!(in_samples.len() >= 32 * n_slots);
    debug_assert!(out.len() >= 32 * n_slots);

    let n = &*SYNTHESIS_N;

    let mut s_vec = [0f32; 32];

    for t in 0..n_slots {
        for (sb, s) in s_vec.iter_mut().enumerate() {
            *s = in_samples[n_slots * sb + t];
        }

        // Shift V by 64 by moving the front of the ring backwards.
        state.offset = (state.offset + 1024 - 64) & 0x3ff;

        // Matrixing. The newest 64 samples of V never wrap since the offset is always a multiple
        // of 64.
        let v_new = &mut state.v[state.offset..state.offset + 64];

        for (v, row) in v_new.iter_mut().zip(n.iter()) {
            *v = row.iter().zip(&s_vec).map(|(c, s)| c * s).sum();
        }

        // Build the vector U from 16 blocks of 32 samples of V, taking the first half of each
        // even 64 sample block and the second half of each odd one, then window U with D and sum
        // every 32nd sample.
        //
        //         15
        // s[j] = SUM { U[32*i + j] * D[32*i + j] }    for j=0..32
        //        i=0
        let block = &mut out[32 * t..32 * (t + 1)];

        for (j, o) in block.iter_mut().enumerate() {
            let mut sum = 0.0;

            for i in 0..16 {
                let u = (state.offset + j + 32 * i + ((i + 1) >> 1) * 64) & 0x3ff;
                sum += state.v[u] * SYNTHESIS_D[j + 32 * i];
            }

            *o = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The synthesis flow chart of ISO/IEC 11172-3 Figure A.2, with an explicitly shifted V.
    struct ReferenceSynthesis {
        v: [f64; 1024],
    }

    impl ReferenceSynthesis {
        fn run(&mut self, s: &[f32; 32]) -> [f32; 32] {
            const PI_64: f64 = f64::consts::PI / 64.0;

            for i in (64..1024).rev() {
                self.v[i] = self.v[i - 64];
            }

            for i in 0..64 {
                self.v[i] = (0..32)
                    .map(|k| f64::from(s[k]) * (PI_64 * ((16 + i) * (2 * k + 1)) as f64).cos())
                    .sum();
            }

            let mut u = [0f64; 512];

            for i in 0..8 {
                for j in 0..32 {
                    u[64 * i + j] = self.v[128 * i + j];
                    u[64 * i + 32 + j] = self.v[128 * i + 96 + j];
                }
            }

            let mut out = [0f32; 32];

            for (j, o) in out.iter_mut().enumerate() {
                *o = (0..16)
                    .map(|i| u[j + 32 * i] * f64::from(SYNTHESIS_D[j + 32 * i]))
                    .sum::<f64>() as f32;
            }

            out
        }
    }

    #[test]
    fn verify_synthesis_matches_reference() {
        let mut state = SynthesisState::default();
        let mut reference = ReferenceSynthesis { v: [0f64; 1024] };

        // Feed enough slots to wrap the ring several times.
        const N_SLOTS: usize = 40;

        let mut input = [0f32; 32 * N_SLOTS];

        for (i, x) in input.iter_mut().enumerate() {
            // A deterministic pseudo-random sequence in [-0.5, 0.5).
            *x = ((i * 7919 + 13) % 1000) as f32 / 1000.0 - 0.5;
        }

        let mut out = [0f32; 32 * N_SLOTS];
        synthesis(&mut state, N_SLOTS, &input, &mut out);

        for t in 0..N_SLOTS {
            let mut s = [0f32; 32];
            for sb in 0..32 {
                s[sb] = input[N_SLOTS * sb + t];
            }

            let expected = reference.run(&s);

            for j in 0..32 {
                assert!((expected[j] - out[32 * t + j]).abs() < 0.0001);
            }
        }
    }

    #[test]
    fn verify_synthesis_of_silence() {
        let mut state = SynthesisState::default();

        let input = [0f32; 32 * 18];
        let mut out = [1f32; 32 * 18];

        synthesis(&mut state, 18, &input, &mut out);

        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_synthesis_history_persists() {
        let mut state = SynthesisState::default();

        // An impulse in sub-band 0 of the first slot.
        let mut input = [0f32; 32 * 12];
        input[0] = 1.0;

        let mut out = [0f32; 32 * 12];
        synthesis(&mut state, 12, &input, &mut out);

        // The filter response spans 512 samples, so silence that follows the impulse still
        // produces output from the history.
        let silence = [0f32; 32 * 12];
        let mut tail = [0f32; 32 * 12];
        synthesis(&mut state, 12, &silence, &mut tail);

        assert!(tail.iter().any(|&s| s != 0.0));

        // A fresh state produces silence.
        let mut fresh = SynthesisState::default();
        synthesis(&mut fresh, 12, &silence, &mut tail);
        assert!(tail.iter().all(|&s| s == 0.0));
    }
}
