// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use lazy_static::lazy_static;

use crate::common::{FrameHeader, SAMPLES_PER_GRANULE, SFB_LONG_BANDS, SFB_SHORT_BANDS};

use super::{BlockType, GranuleChannel};

/// The largest magnitude a Huffman decoded sample may have: 15 plus 13 linbits.
const MAX_SAMPLE_MAGNITUDE: usize = 15 + (1 << 13) - 1;

lazy_static! {
    /// Lookup table for computing `x^(4/3)` for every possible decoded sample magnitude.
    static ref POW43: Box<[f32]> = (0..=MAX_SAMPLE_MAGNITUDE)
        .map(|i| f64::powf(i as f64, 4.0 / 3.0) as f32)
        .collect();
}

/// The pre-emphasis amount added to each long block scale factor when preflag is set. From table
/// B.6 in ISO/IEC 11172-3, with a trailing 0 for the band above the last coded scale factor.
const PRE_EMPHASIS: [u8; 22] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0];

/// Replace each integer sample `s` in `samples` by `sign(s) * |s|^(4/3) * scale`.
#[inline(always)]
fn requantize_samples(pow43: &[f32], samples: &mut [f32], scale: f32) {
    for sample in samples.iter_mut() {
        let magnitude = pow43[min(sample.abs() as usize, MAX_SAMPLE_MAGNITUDE)] * scale;

        *sample = if *sample < 0.0 { -magnitude } else { magnitude };
    }
}

/// The scale factor multiplier, 0.5 or 1.
#[inline(always)]
fn scalefac_multiplier(channel: &GranuleChannel) -> f32 {
    if channel.scalefac_scale {
        1.0
    }
    else {
        0.5
    }
}

/// Requantize the long block samples in `buf[..end]`.
///
/// ```text
/// xr(i) = s(i)^(4/3) * 2^(0.25 * (global_gain - 210)) * 2^-(sfm * (scalefac_l[sfb] + preflag * pretab[sfb]))
/// ```
fn requantize_long(channel: &GranuleChannel, bands: &[usize; 23], end: usize, buf: &mut [f32]) {
    let pow43: &[f32] = &POW43;

    let gain = 0.25 * (f32::from(channel.global_gain) - 210.0);
    let sfm = scalefac_multiplier(channel);

    for (sfb, (&start, &stop)) in bands.iter().zip(&bands[1..]).enumerate() {
        if start >= end {
            break;
        }

        let pre_emphasis = if channel.preflag { PRE_EMPHASIS[sfb] } else { 0 };
        let scalefac = f32::from(channel.scalefac_l[sfb] + pre_emphasis);

        let scale = f32::powf(2.0, gain - sfm * scalefac);

        requantize_samples(pow43, &mut buf[start..min(stop, end)], scale);
    }
}

/// Requantize the short block samples in `buf[..end]`, starting with short band `first_sfb` at
/// sample `first_sfb * 3 * 4`. Samples are in band order, with the three windows of each band
/// stored one after another.
///
/// ```text
/// xr(i) = s(i)^(4/3) * 2^(0.25 * (global_gain - 210 - 8 * subblock_gain[win])) * 2^-(sfm * scalefac_s[sfb][win])
/// ```
fn requantize_short(
    channel: &GranuleChannel,
    bands: &[usize; 14],
    first_sfb: usize,
    end: usize,
    buf: &mut [f32],
) {
    let pow43: &[f32] = &POW43;

    let sfm = scalefac_multiplier(channel);

    let mut gain = [0f32; 3];

    for (gain, &subblock_gain) in gain.iter_mut().zip(&channel.subblock_gain) {
        *gain = 0.25 * (f32::from(channel.global_gain) - 210.0 - 8.0 * f32::from(subblock_gain));
    }

    let mut i = 3 * bands[first_sfb];

    for sfb in first_sfb..13 {
        let width = bands[sfb + 1] - bands[sfb];

        for win in 0..3 {
            if i >= end {
                return;
            }

            let scalefac = f32::from(channel.scalefac_s[sfb][win]);
            let scale = f32::powf(2.0, gain[win] - sfm * scalefac);

            requantize_samples(pow43, &mut buf[i..min(i + width, end)], scale);

            i += width;
        }
    }
}

/// Requantize the non-zero samples, `buf[..count1]`, of a channel in a granule.
pub(super) fn requantize(
    header: &FrameHeader,
    channel: &GranuleChannel,
    buf: &mut [f32; SAMPLES_PER_GRANULE],
) {
    let long_bands = &SFB_LONG_BANDS[header.sample_rate_idx];
    let short_bands = &SFB_SHORT_BANDS[header.sample_rate_idx];

    let end = min(channel.count1, SAMPLES_PER_GRANULE);

    match channel.block_type {
        BlockType::Short { is_mixed: false } => {
            requantize_short(channel, short_bands, 0, end, buf);
        }
        BlockType::Short { is_mixed: true } => {
            // The first 36 samples are the 8 long bands, followed by short bands from band 3.
            requantize_long(channel, long_bands, min(36, end), buf);
            requantize_short(channel, short_bands, 3, end, buf);
        }
        _ => {
            requantize_long(channel, long_bands, end, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() <= 1e-5 * expected.abs().max(1.0),
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn verify_requantize_long() {
        let header = parse_frame_header(0xfffb9064).unwrap();

        let mut channel = GranuleChannel::default();
        channel.global_gain = 210;
        channel.count1 = 40;
        channel.scalefac_l[1] = 2;
        channel.scalefac_l[11] = 1;
        channel.preflag = true;

        let mut buf = [0f32; SAMPLES_PER_GRANULE];
        buf[0] = 8.0;
        buf[1] = -1.0;
        buf[4] = 8.0;
        buf[40] = 8.0;

        requantize(&header, &channel, &mut buf);

        // Band 0 is unscaled.
        assert_close(buf[0], 16.0);
        assert_close(buf[1], -1.0);
        // Band 1 has a scale factor of 2 with a 0.5 multiplier.
        assert_close(buf[4], 8.0);
        // Samples from count1 are not touched.
        assert_eq!(buf[40], 8.0);

        // Pre-emphasis applies from band 11 onwards.
        channel.count1 = 576;
        channel.scalefac_scale = true;
        let mut buf = [0f32; SAMPLES_PER_GRANULE];
        buf[SFB_LONG_BANDS[0][11]] = 1.0;
        buf[SFB_LONG_BANDS[0][10]] = 1.0;

        requantize(&header, &channel, &mut buf);

        assert_close(buf[SFB_LONG_BANDS[0][10]], 1.0);
        assert_close(buf[SFB_LONG_BANDS[0][11]], 0.25);
    }

    #[test]
    fn verify_requantize_global_gain() {
        let header = parse_frame_header(0xfffb9064).unwrap();

        let mut channel = GranuleChannel::default();
        channel.global_gain = 214;
        channel.count1 = 4;

        let mut buf = [0f32; SAMPLES_PER_GRANULE];
        buf[3] = -1.0;

        requantize(&header, &channel, &mut buf);

        assert_close(buf[3], -2.0);
    }

    #[test]
    fn verify_requantize_short() {
        let header = parse_frame_header(0xfffb9064).unwrap();

        let mut channel = GranuleChannel::default();
        channel.block_type = BlockType::Short { is_mixed: false };
        channel.global_gain = 210;
        channel.count1 = 576;
        channel.subblock_gain = [0, 1, 0];
        channel.scalefac_s[0][2] = 1;

        let mut buf = [0f32; SAMPLES_PER_GRANULE];
        // One sample in each window of band 0, each window being 4 samples wide.
        buf[0] = 1.0;
        buf[4] = 1.0;
        buf[8] = 1.0;
        // The last band has no scale factor.
        buf[575] = 1.0;

        requantize(&header, &channel, &mut buf);

        assert_close(buf[0], 1.0);
        assert_close(buf[4], 0.25);
        assert_close(buf[8], f32::powf(2.0, -0.5));
        assert_close(buf[575], 1.0);
    }

    #[test]
    fn verify_requantize_mixed() {
        let header = parse_frame_header(0xfffb9064).unwrap();

        let mut channel = GranuleChannel::default();
        channel.block_type = BlockType::Short { is_mixed: true };
        channel.global_gain = 210;
        channel.count1 = 576;
        channel.scalefac_scale = true;
        channel.scalefac_l[7] = 1;
        channel.scalefac_s[3][0] = 2;

        let mut buf = [0f32; SAMPLES_PER_GRANULE];
        buf[35] = 1.0;
        buf[36] = 1.0;
        buf[40] = 1.0;

        requantize(&header, &channel, &mut buf);

        // Long band 7 covers samples 30..36.
        assert_close(buf[35], 0.5);
        // Short band 3, window 0 covers 36..40, window 1 covers 40..44.
        assert_close(buf[36], 0.25);
        assert_close(buf[40], 1.0);
    }
}
