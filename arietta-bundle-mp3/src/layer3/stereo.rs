// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::max;
use std::{f32, f64};

use arietta_core::errors::{decode_error, Result};

use lazy_static::lazy_static;

use crate::common::{
    ChannelMode, FrameHeader, Mode, SAMPLES_PER_GRANULE, SFB_LONG_BANDS, SFB_SHORT_BANDS,
};

use super::{BlockType, Granule};

/// An intensity position of 7 marks a band that is not intensity stereo coded.
const INTENSITY_INV_POS: u8 = 7;

lazy_static! {
    /// (Left, right) channel ratios for intensity stereo, indexed by the intensity position.
    ///
    /// Derived from ISO/IEC 11172-3 section 2.4.3.4.9.3:
    ///
    /// ```text
    /// is_ratio = tan(is_pos * PI/12)
    /// k_l      = is_ratio / (1 + is_ratio)
    /// k_r      =        1 / (1 + is_ratio)
    /// ```
    ///
    /// The ratio is infinite for `is_pos == 6`, so the limit `(1, 0)` is used.
    static ref INTENSITY_STEREO_RATIOS: [(f32, f32); 7] = {
        const PI_12: f64 = f64::consts::PI / 12.0;

        let mut ratios = [(1.0, 0.0); 7];

        for (is_pos, ratio) in ratios[..6].iter_mut().enumerate() {
            let is_ratio = (PI_12 * is_pos as f64).tan();
            *ratio = ((is_ratio / (1.0 + is_ratio)) as f32, (1.0 / (1.0 + is_ratio)) as f32);
        }

        ratios
    };
}

/// Marks samples that are not intensity stereo coded.
const NOT_INTENSITY_CODED: u8 = u8::MAX;

/// Decodes one mid-side stereo coded sample pair.
///
/// ```text
/// l[i] = (m[i] + s[i]) / sqrt(2)
/// r[i] = (m[i] - s[i]) / sqrt(2)
/// ```
#[inline(always)]
fn process_mid_side(mid: &mut f32, side: &mut f32) {
    let left = (*mid + *side) * f32::consts::FRAC_1_SQRT_2;
    let right = (*mid - *side) * f32::consts::FRAC_1_SQRT_2;
    *mid = left;
    *side = right;
}

/// Assigns an intensity position to every sample of the bands that are intensity stereo coded.
///
/// A band is coded if it starts at or above the first zero sample of channel 1. The intensity
/// positions are stored in place of the channel 1 scale factors. The highest band has no scale
/// factor and takes the position of the band below it.
fn intensity_positions(
    header: &FrameHeader,
    granule: &Granule,
    positions: &mut [u8; SAMPLES_PER_GRANULE],
) {
    let right = &granule.channels[1];
    let bound = right.count1;

    let long_bands = &SFB_LONG_BANDS[header.sample_rate_idx];
    let short_bands = &SFB_SHORT_BANDS[header.sample_rate_idx];

    // Mixed blocks use long bands 0..8 followed by short bands 3..13.
    let (n_long, first_short) = match right.block_type {
        BlockType::Short { is_mixed: false } => (0, 0),
        BlockType::Short { is_mixed: true } => (8, 3),
        _ => (22, 13),
    };

    for sfb in 0..n_long {
        let start = long_bands[sfb];

        if start >= bound {
            let is_pos = right.scalefac_l[sfb.min(20)];
            positions[start..long_bands[sfb + 1]].fill(is_pos);
        }
    }

    // Windows are stored one after another within each short band.
    for sfb in first_short..13 {
        let width = short_bands[sfb + 1] - short_bands[sfb];

        for win in 0..3 {
            let start = 3 * short_bands[sfb] + win * width;

            if start >= bound {
                let is_pos = right.scalefac_s[sfb.min(11)][win];
                positions[start..start + width].fill(is_pos);
            }
        }
    }
}

/// Perform joint stereo decoding on the channel pair of a granule. The samples must still be in
/// band order.
pub(super) fn stereo(
    header: &FrameHeader,
    granule: &mut Granule,
    samples: &mut [[f32; SAMPLES_PER_GRANULE]; 2],
) -> Result<()> {
    let (mid_side, intensity) = match header.channel_mode {
        ChannelMode::JointStereo(Mode::Layer3 { mid_side, intensity }) => (mid_side, intensity),
        _ => return Ok(()),
    };

    if !mid_side && !intensity {
        return Ok(());
    }

    // Intensity stereo coded bands are located with the band layout of channel 1.
    if intensity && granule.channels[0].block_type != granule.channels[1].block_type {
        return decode_error("mpa: stereo channel pair block_type mismatch");
    }

    let [ch0, ch1] = samples;

    let mut positions = [NOT_INTENSITY_CODED; SAMPLES_PER_GRANULE];

    if intensity {
        intensity_positions(header, granule, &mut positions);
    }

    // Samples above both count1 values are zero in both channels.
    let end = max(granule.channels[0].count1, granule.channels[1].count1);

    for ((l, r), &is_pos) in ch0[..end].iter_mut().zip(&mut ch1[..end]).zip(&positions[..end]) {
        if is_pos < INTENSITY_INV_POS {
            let (ratio_l, ratio_r) = INTENSITY_STEREO_RATIOS[usize::from(is_pos)];
            let is = *l;
            *l = ratio_l * is;
            *r = ratio_r * is;
        }
        else if mid_side {
            process_mid_side(l, r);
        }
    }

    granule.channels[0].count1 = end;
    granule.channels[1].count1 = end;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    fn joint_stereo_header(mode_extension: u32) -> FrameHeader {
        // MPEG1 Layer 3, 128 kbps, 44.1 kHz, joint stereo.
        parse_frame_header(0xfffb9044 | (mode_extension << 4)).unwrap()
    }

    #[test]
    fn verify_intensity_ratio_at_pi_over_2() {
        assert_eq!(INTENSITY_STEREO_RATIOS[6], (1.0, 0.0));
        assert_eq!(INTENSITY_STEREO_RATIOS[0], (0.0, 1.0));

        // Equal power at PI/4.
        let (l, r) = INTENSITY_STEREO_RATIOS[3];
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn verify_mid_side() {
        let header = joint_stereo_header(0b10);

        let mut granule = Granule::default();
        granule.channels[0].count1 = 2;
        granule.channels[1].count1 = 4;

        let mut samples = [[0f32; SAMPLES_PER_GRANULE]; 2];
        samples[0][0] = 1.0;
        samples[1][0] = 1.0;
        samples[1][3] = 2.0;
        samples[0][4] = 3.0;

        stereo(&header, &mut granule, &mut samples).unwrap();

        let s = f32::consts::SQRT_2;
        assert!((samples[0][0] - s).abs() < 1e-6);
        assert!(samples[1][0].abs() < 1e-6);
        assert!((samples[0][3] - s).abs() < 1e-6);
        assert!((samples[1][3] + s).abs() < 1e-6);
        // Beyond the larger count1.
        assert_eq!(samples[0][4], 3.0);
        assert_eq!(granule.channels[0].count1, 4);
    }

    #[test]
    fn verify_no_joint_stereo() {
        let header = joint_stereo_header(0b00);

        let mut granule = Granule::default();
        granule.channels[0].count1 = 576;

        let mut samples = [[1f32; SAMPLES_PER_GRANULE]; 2];
        stereo(&header, &mut granule, &mut samples).unwrap();

        assert!(samples.iter().all(|ch| ch.iter().all(|&s| s == 1.0)));
    }

    #[test]
    fn verify_intensity_long() {
        let header = joint_stereo_header(0b01);

        let mut granule = Granule::default();
        // Channel 1 is zero from band 20 onwards.
        granule.channels[0].count1 = 576;
        granule.channels[1].count1 = SFB_LONG_BANDS[0][20];
        granule.channels[1].scalefac_l[20] = 6;
        granule.channels[1].scalefac_l[19] = 0;

        let mut samples = [[0f32; SAMPLES_PER_GRANULE]; 2];
        for s in samples[0].iter_mut() {
            *s = 1.0;
        }
        for s in samples[1][..SFB_LONG_BANDS[0][20]].iter_mut() {
            *s = 0.5;
        }

        stereo(&header, &mut granule, &mut samples).unwrap();

        // Bands 20 and 21 are panned hard left.
        for i in SFB_LONG_BANDS[0][20]..576 {
            assert_eq!(samples[0][i], 1.0);
            assert_eq!(samples[1][i], 0.0);
        }

        // Band 19 is below the bound and untouched.
        assert_eq!(samples[0][SFB_LONG_BANDS[0][19]], 1.0);
        assert_eq!(samples[1][SFB_LONG_BANDS[0][19]], 0.5);
    }

    #[test]
    fn verify_intensity_invalid_position() {
        let header = joint_stereo_header(0b01);

        let mut granule = Granule::default();
        granule.channels[0].count1 = 576;
        granule.channels[1].count1 = 0;
        granule.channels[1].scalefac_l = [INTENSITY_INV_POS; 22];

        let mut samples = [[0f32; SAMPLES_PER_GRANULE]; 2];
        samples[0] = [1.0; SAMPLES_PER_GRANULE];

        stereo(&header, &mut granule, &mut samples).unwrap();

        assert!(samples[0].iter().all(|&s| s == 1.0));
        assert!(samples[1].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_intensity_short_windows() {
        let header = joint_stereo_header(0b01);

        let mut granule = Granule::default();
        for channel in granule.channels.iter_mut() {
            channel.block_type = BlockType::Short { is_mixed: false };
        }
        granule.channels[0].count1 = 576;
        // Band 11 of window 1 onwards is zero in channel 1.
        let band11 = 3 * SFB_SHORT_BANDS[0][11];
        let width = SFB_SHORT_BANDS[0][12] - SFB_SHORT_BANDS[0][11];
        granule.channels[1].count1 = band11 + width;
        granule.channels[1].scalefac_s[11] = [0, 6, 0];

        let mut samples = [[1f32; SAMPLES_PER_GRANULE]; 2];
        for s in samples[1][band11 + width..].iter_mut() {
            *s = 0.0;
        }

        stereo(&header, &mut granule, &mut samples).unwrap();

        // Window 0 of band 11 is below the bound.
        assert_eq!(samples[1][band11], 1.0);
        // Window 1 of band 11 is panned left, window 2 right.
        assert_eq!(samples[0][band11 + width], 1.0);
        assert_eq!(samples[1][band11 + width], 0.0);
        assert_eq!(samples[0][band11 + 2 * width], 0.0);
        assert_eq!(samples[1][band11 + 2 * width], 1.0);
    }

    #[test]
    fn verify_block_type_mismatch() {
        let header = joint_stereo_header(0b01);

        let mut granule = Granule::default();
        granule.channels[0].block_type = BlockType::Short { is_mixed: false };

        let mut samples = [[0f32; SAMPLES_PER_GRANULE]; 2];
        assert!(stereo(&header, &mut granule, &mut samples).is_err());
    }
}
