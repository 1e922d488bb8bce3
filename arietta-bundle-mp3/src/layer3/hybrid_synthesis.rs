// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64;

use lazy_static::lazy_static;

use crate::common::{FrameHeader, SAMPLES_PER_GRANULE, SFB_SHORT_BANDS, SUB_BANDS};

use super::{BlockType, GranuleChannel};

lazy_static! {
    /// IMDCT window coefficients for Long, Start, Short, and End blocks, in that order.
    ///
    /// ```text
    /// Long:  W[ 0..36] = sin(PI/36 * (i + 0.5))
    ///
    /// Start: W[ 0..18] = sin(PI/36 * (i + 0.5))
    ///        W[18..24] = 1
    ///        W[24..30] = sin(PI/12 * (i - 18 + 0.5))
    ///        W[30..36] = 0
    ///
    /// Short: W[ 0..12] = sin(PI/12 * (i + 0.5)), applied to each 12 sample window
    ///
    /// End:   W[ 0.. 6] = 0
    ///        W[ 6..12] = sin(PI/12 * (i - 6 + 0.5))
    ///        W[12..18] = 1
    ///        W[18..36] = sin(PI/36 * (i + 0.5))
    /// ```
    static ref IMDCT_WINDOWS: [[f32; 36]; 4] = {
        const PI_36: f64 = f64::consts::PI / 36.0;
        const PI_12: f64 = f64::consts::PI / 12.0;

        let long = |i: usize| (PI_36 * (i as f64 + 0.5)).sin() as f32;
        let short = |i: usize| (PI_12 * (i as f64 + 0.5)).sin() as f32;

        let mut windows = [[0f32; 36]; 4];

        for i in 0..36 {
            windows[0][i] = long(i);

            windows[1][i] = match i {
                0..=17 => long(i),
                18..=23 => 1.0,
                24..=29 => short(i - 18),
                _ => 0.0,
            };

            windows[3][i] = match i {
                0..=5 => 0.0,
                6..=11 => short(i - 6),
                12..=17 => 1.0,
                _ => long(i),
            };
        }

        for i in 0..12 {
            windows[2][i] = short(i);
        }

        windows
    };
}

lazy_static! {
    /// Cosine coefficients of the 36-point IMDCT.
    ///
    /// ```text
    /// cos36[p][m] = cos(PI/72 * (2p + 1 + 18) * (2m + 1)), p = 0..36, m = 0..18
    /// ```
    static ref IMDCT_COS_36: [[f32; 18]; 36] = {
        const PI_72: f64 = f64::consts::PI / 72.0;

        let mut cos = [[0f32; 18]; 36];

        for (p, row) in cos.iter_mut().enumerate() {
            for (m, c) in row.iter_mut().enumerate() {
                *c = (PI_72 * ((2 * p + 1 + 18) * (2 * m + 1)) as f64).cos() as f32;
            }
        }

        cos
    };

    /// Cosine coefficients of the 12-point IMDCT.
    ///
    /// ```text
    /// cos12[p][m] = cos(PI/24 * (2p + 1 + 6) * (2m + 1)), p = 0..12, m = 0..6
    /// ```
    static ref IMDCT_COS_12: [[f32; 6]; 12] = {
        const PI_24: f64 = f64::consts::PI / 24.0;

        let mut cos = [[0f32; 6]; 12];

        for (p, row) in cos.iter_mut().enumerate() {
            for (m, c) in row.iter_mut().enumerate() {
                *c = (PI_24 * ((2 * p + 1 + 6) * (2 * m + 1)) as f64).cos() as f32;
            }
        }

        cos
    };
}

lazy_static! {
    /// The alias reduction butterfly coefficients, CS and CA, from table B.9 of ISO/IEC 11172-3.
    ///
    /// ```text
    /// cs[i] =    1 / sqrt(1 + c[i]^2)
    /// ca[i] = c[i] / sqrt(1 + c[i]^2)
    /// ```
    static ref ANTIALIAS_CS_CA: ([f32; 8], [f32; 8]) = {
        const C: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

        let mut cs = [0f32; 8];
        let mut ca = [0f32; 8];

        for i in 0..8 {
            let sqrt = f64::sqrt(1.0 + C[i] * C[i]);
            cs[i] = (1.0 / sqrt) as f32;
            ca[i] = (C[i] / sqrt) as f32;
        }

        (cs, ca)
    };
}

/// Reorder the samples of short bands from band order, where the three windows of a band follow one
/// another, into sub-band order, where the windows are interleaved sample by sample:
///
/// ```text
/// [ 0 | 1 | 2 | 3 ][ 4 | 5 | 6 | 7 ][ 8 | 9 | a | b ]  ->  [ 0 | 4 | 8 | 1 | 5 | 9 | 2 | 6 | a | 3 | 7 | b ]
///    window 0         window 1         window 2
/// ```
///
/// Only the bands up to and including the one holding the last non-zero sample are reordered.
pub(super) fn reorder(
    header: &FrameHeader,
    channel: &GranuleChannel,
    buf: &mut [f32; SAMPLES_PER_GRANULE],
) {
    let first_sfb = match channel.block_type {
        BlockType::Short { is_mixed: false } => 0,
        // The long part of a mixed block spans 36 samples, which is short band 3.
        BlockType::Short { is_mixed: true } => 3,
        _ => return,
    };

    let bands = &SFB_SHORT_BANDS[header.sample_rate_idx];

    let mut reorder_buf = [0f32; 3 * 192];

    for sfb in first_sfb..13 {
        let start = 3 * bands[sfb];

        if start >= channel.count1 {
            break;
        }

        let width = bands[sfb + 1] - bands[sfb];
        let band = &mut buf[start..start + 3 * width];

        for win in 0..3 {
            for j in 0..width {
                reorder_buf[3 * j + win] = band[win * width + j];
            }
        }

        band.copy_from_slice(&reorder_buf[..3 * width]);
    }
}

/// Applies the alias reduction butterflies at the sub-band boundaries of long blocks, and of the
/// long part of mixed blocks.
pub(super) fn antialias(channel: &GranuleChannel, samples: &mut [f32; SAMPLES_PER_GRANULE]) {
    let sb_limit = match channel.block_type {
        BlockType::Short { is_mixed: false } => return,
        BlockType::Short { is_mixed: true } => 2,
        _ => SUB_BANDS,
    };

    let (cs, ca): &([f32; 8], [f32; 8]) = &ANTIALIAS_CS_CA;

    // Eight butterflies per boundary, moving outwards from it:
    //
    //   l1 = l0 * cs[i] - u0 * ca[i]
    //   u1 = u0 * cs[i] + l0 * ca[i]
    for sb in 1..sb_limit {
        for i in 0..8 {
            let li = 18 * sb - 1 - i;
            let ui = 18 * sb + i;
            let lower = samples[li];
            let upper = samples[ui];
            samples[li] = lower * cs[i] - upper * ca[i];
            samples[ui] = upper * cs[i] + lower * ca[i];
        }
    }
}

/// The 36-point IMDCT of one sub-band, windowed.
fn imdct36_win(x: &[f32], window: &[f32; 36], out: &mut [f32; 36]) {
    let cos36: &[[f32; 18]; 36] = &IMDCT_COS_36;

    for p in 0..36 {
        let sum: f32 = x.iter().zip(&cos36[p]).map(|(x, c)| x * c).sum();
        out[p] = sum * window[p];
    }
}

/// The three 12-point IMDCTs of one sub-band of a short block, windowed and overlapped into a
/// 36 sample block. Window `j` occupies `out[6 + 6j..18 + 6j]`.
fn imdct12_win(x: &[f32], window: &[f32; 36], out: &mut [f32; 36]) {
    let cos12: &[[f32; 6]; 12] = &IMDCT_COS_12;

    out.fill(0.0);

    for j in 0..3 {
        for p in 0..12 {
            let mut sum = 0.0;
            for m in 0..6 {
                sum += x[j + 3 * m] * cos12[p][m];
            }
            out[6 * j + p + 6] += sum * window[p];
        }
    }
}

/// Performs hybrid synthesis: the IMDCT, windowing, and overlap-add of every sub-band.
pub(super) fn hybrid_synthesis(
    channel: &GranuleChannel,
    overlap: &mut [[f32; 18]; SUB_BANDS],
    samples: &mut [f32; SAMPLES_PER_GRANULE],
) {
    // The first two sub-bands of a mixed block are long.
    let n_long_bands = match channel.block_type {
        BlockType::Short { is_mixed: false } => 0,
        BlockType::Short { is_mixed: true } => 2,
        _ => SUB_BANDS,
    };

    let long_window: &[f32; 36] = match channel.block_type {
        BlockType::Start => &IMDCT_WINDOWS[1],
        BlockType::End => &IMDCT_WINDOWS[3],
        _ => &IMDCT_WINDOWS[0],
    };

    let short_window: &[f32; 36] = &IMDCT_WINDOWS[2];

    let mut raw = [0f32; 36];

    for sb in 0..SUB_BANDS {
        let sub_band = &mut samples[18 * sb..18 * (sb + 1)];

        if sb < n_long_bands {
            imdct36_win(sub_band, long_window, &mut raw);
        }
        else {
            imdct12_win(sub_band, short_window, &mut raw);
        }

        // The first half is added to the tail of the previous granule, and the second half becomes
        // the new tail.
        for i in 0..18 {
            sub_band[i] = raw[i] + overlap[sb][i];
            overlap[sb][i] = raw[i + 18];
        }
    }
}

/// Inverts odd samples in odd sub-bands to undo the frequency inversion of the polyphase
/// filterbank.
pub(super) fn frequency_inversion(samples: &mut [f32; SAMPLES_PER_GRANULE]) {
    for sb in (1..SUB_BANDS).step_by(2) {
        for i in (1..18).step_by(2) {
            samples[18 * sb + i] = -samples[18 * sb + i];
        }
    }
}
