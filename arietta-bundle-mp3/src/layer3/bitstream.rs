// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arietta_core::errors::{decode_error, Result};
use arietta_core::io::ReadBitsLtr;

use crate::common::{ChannelMode, FrameHeader, SAMPLES_PER_GRANULE, SFB_LONG_BANDS};

use super::{BlockType, FrameData, GranuleChannel};

/// Pairs of bit lengths, (slen1, slen2), for scale factors. The first bands of a granule use
/// slen1 bits per scale factor, the remaining bands use slen2. Where the split occurs depends on
/// the block type.
///
/// This table is indexed by scalefac_compress.
const SCALE_FACTOR_SLEN: [(u32, u32); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (3, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
];

/// The four groups of long block scale factor bands that may be shared between granules, as
/// indicated by scfsi.
const SCFSI_BANDS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

/// Reads the side_info for a single channel in a granule.
fn read_granule_channel_side_info<B: ReadBitsLtr>(
    bs: &mut B,
    channel: &mut GranuleChannel,
    header: &FrameHeader,
) -> Result<()> {
    channel.part2_3_length = bs.read_bits_leq32(12)? as u16;
    channel.big_values = bs.read_bits_leq32(9)? as u16;
    channel.global_gain = bs.read_bits_leq32(8)? as u8;
    channel.scalefac_compress = bs.read_bits_leq32(4)? as u8;

    let window_switching = bs.read_bool()?;

    if window_switching {
        let block_type_enc = bs.read_bits_leq32(2)?;

        let is_mixed = bs.read_bool()?;

        channel.block_type = match block_type_enc {
            // A normal long block never signals window switching.
            0b00 => return decode_error("mpa: invalid block_type"),
            0b01 => BlockType::Start,
            0b10 => BlockType::Short { is_mixed },
            _ => BlockType::End,
        };

        // Only two regions when window switching.
        for table_select in channel.table_select[..2].iter_mut() {
            *table_select = bs.read_bits_leq32(5)? as u8;
        }
        channel.table_select[2] = 0;

        for subblock_gain in channel.subblock_gain.iter_mut() {
            *subblock_gain = bs.read_bits_leq32(3)? as u8;
        }

        // Region 0 always spans the first 36 samples. For long windows this is 8 long bands, and
        // for short windows this is 3 short bands of 3 windows, at every sample rate.
        channel.region1_start = 36;
        channel.region2_start = SAMPLES_PER_GRANULE;
    }
    else {
        channel.block_type = BlockType::Long;

        for table_select in channel.table_select.iter_mut() {
            *table_select = bs.read_bits_leq32(5)? as u8;
        }

        channel.subblock_gain = [0; 3];

        // The region counts are stored as 1 less than the number of bands in the region.
        let region0_count = bs.read_bits_leq32(4)? as usize + 1;
        let region0_1_count = bs.read_bits_leq32(3)? as usize + region0_count + 1;

        let bands = &SFB_LONG_BANDS[header.sample_rate_idx];

        channel.region1_start = bands[region0_count];

        // The sum of both counts may run past the last band.
        channel.region2_start = match region0_1_count {
            0..=22 => bands[region0_1_count],
            _ => SAMPLES_PER_GRANULE,
        };
    }

    channel.preflag = bs.read_bool()?;
    channel.scalefac_scale = bs.read_bool()?;
    channel.count1table_select = bs.read_bit()? as u8;

    Ok(())
}

/// Reads the side_info of a Layer 3 frame into `FrameData`.
pub(super) fn read_side_info<B: ReadBitsLtr>(
    bs: &mut B,
    header: &FrameHeader,
    frame_data: &mut FrameData,
) -> Result<()> {
    frame_data.main_data_begin = bs.read_bits_leq32(9)? as u16;

    // Private bits.
    match header.channel_mode {
        ChannelMode::Mono => bs.ignore_bits(5)?,
        _ => bs.ignore_bits(3)?,
    };

    for scfsi in frame_data.scfsi[..header.n_channels()].iter_mut() {
        for band in scfsi.iter_mut() {
            *band = bs.read_bool()?;
        }
    }

    for granule in frame_data.granules.iter_mut() {
        for channel in granule.channels[..header.n_channels()].iter_mut() {
            read_granule_channel_side_info(bs, channel, header)?;
        }
    }

    Ok(())
}

/// Reads the scale factors (part2) for a single channel in a granule. Returns the number of bits
/// read.
pub(super) fn read_scale_factors<B: ReadBitsLtr>(
    bs: &mut B,
    gr: usize,
    ch: usize,
    frame_data: &mut FrameData,
) -> Result<u32> {
    let mut bits_read = 0;

    let scfsi = frame_data.scfsi[ch];

    // The scale factors of the first granule may be shared with the second.
    let (first, rest) = frame_data.granules.split_at_mut(1);

    let (channel, granule0) = if gr == 0 {
        (&mut first[0].channels[ch], None)
    }
    else {
        (&mut rest[0].channels[ch], Some(&first[0].channels[ch]))
    };

    let (slen1, slen2) = SCALE_FACTOR_SLEN[channel.scalefac_compress as usize];

    if let BlockType::Short { is_mixed } = channel.block_type {
        // Mixed blocks code long bands 0..8 with slen1, followed by short bands 3..12. Pure short
        // blocks code short bands 0..12. Short bands below 6 use slen1, the rest use slen2.
        let first_short_sfb = if is_mixed {
            for sfb in 0..8 {
                channel.scalefac_l[sfb] = bs.read_bits_leq32(slen1)? as u8;
            }
            bits_read += 8 * slen1;
            3
        }
        else {
            0
        };

        for sfb in first_short_sfb..12 {
            let slen = if sfb < 6 { slen1 } else { slen2 };

            for win in 0..3 {
                channel.scalefac_s[sfb][win] = bs.read_bits_leq32(slen)? as u8;
            }
            bits_read += 3 * slen;
        }
    }
    else {
        for (i, &(start, end)) in SCFSI_BANDS.iter().enumerate() {
            let slen = if i < 2 { slen1 } else { slen2 };

            match granule0 {
                Some(granule0) if scfsi[i] => {
                    channel.scalefac_l[start..end]
                        .copy_from_slice(&granule0.scalefac_l[start..end]);
                }
                _ => {
                    for sfb in start..end {
                        channel.scalefac_l[sfb] = bs.read_bits_leq32(slen)? as u8;
                    }
                    bits_read += slen * (end - start) as u32;
                }
            }
        }
    }

    Ok(bits_read)
}

#[cfg(test)]
mod tests {
    use arietta_core::io::BitReaderLtr;

    use super::*;
    use crate::bit_writer::BitWriter;
    use crate::header::parse_frame_header;

    #[test]
    fn verify_read_side_info_long_and_short() {
        // MPEG1 Layer 3, 128 kbps, 44.1 kHz, joint stereo.
        let header = parse_frame_header(0xfffb9064).unwrap();

        let mut w = BitWriter::new();

        // main_data_begin, private bits, scfsi for both channels.
        w.put(17, 9).put(0, 3).put(0b1010, 4).put(0b0000, 4);

        for gr in 0..2 {
            // Channel 0: normal long block.
            w.put(300 + gr, 12).put(100, 9).put(150, 8).put(5, 4).put(0, 1);
            w.put(1, 5).put(2, 5).put(3, 5).put(4, 4).put(2, 3);
            w.put(1, 1).put(0, 1).put(1, 1);

            // Channel 1: mixed short block.
            w.put(200, 12).put(50, 9).put(140, 8).put(15, 4).put(1, 1);
            w.put(0b10, 2).put(1, 1);
            w.put(7, 5).put(9, 5).put(1, 3).put(2, 3).put(3, 3);
            w.put(0, 1).put(1, 1).put(0, 1);
        }

        let mut frame_data = FrameData::default();
        let mut bs = BitReaderLtr::new(&w.buf);

        read_side_info(&mut bs, &header, &mut frame_data).unwrap();

        assert_eq!(bs.bit_pos(), 8 * header.side_info_len());
        assert_eq!(frame_data.main_data_begin, 17);
        assert_eq!(frame_data.scfsi[0], [true, false, true, false]);

        let ch0 = &frame_data.granules[1].channels[0];
        assert_eq!(ch0.part2_3_length, 301);
        assert_eq!(ch0.block_type, BlockType::Long);
        assert_eq!(ch0.table_select, [1, 2, 3]);
        // region0 = 5 bands, region1 = 3 bands.
        assert_eq!(ch0.region1_start, SFB_LONG_BANDS[0][5]);
        assert_eq!(ch0.region2_start, SFB_LONG_BANDS[0][8]);
        assert!(ch0.preflag);
        assert_eq!(ch0.count1table_select, 1);

        let ch1 = &frame_data.granules[0].channels[1];
        assert_eq!(ch1.block_type, BlockType::Short { is_mixed: true });
        assert_eq!(ch1.table_select, [7, 9, 0]);
        assert_eq!(ch1.subblock_gain, [1, 2, 3]);
        assert_eq!(ch1.region1_start, 36);
        assert_eq!(ch1.region2_start, 576);
        assert!(ch1.scalefac_scale);
    }

    #[test]
    fn verify_reject_block_type_0_with_window_switching() {
        let header = parse_frame_header(0xfffbb0c4).unwrap();
        assert_eq!(header.channel_mode, ChannelMode::Mono);

        let mut w = BitWriter::new();
        w.put(0, 9).put(0, 5).put(0, 4);
        w.put(0, 12).put(0, 9).put(0, 8).put(0, 4).put(1, 1).put(0b00, 2);
        w.put(0, 32).put(0, 32);

        let mut frame_data = FrameData::default();
        let mut bs = BitReaderLtr::new(&w.buf);

        assert!(read_side_info(&mut bs, &header, &mut frame_data).is_err());
    }

    #[test]
    fn verify_scale_factors_scfsi_copy() {
        let mut frame_data = FrameData::default();

        // scalefac_compress 7 is (slen1, slen2) = (1, 3).
        for granule in frame_data.granules.iter_mut() {
            granule.channels[0].scalefac_compress = 7;
        }
        frame_data.scfsi[0] = [false, true, false, true];

        // Granule 0: 11 bands of 1 bit, 10 bands of 3 bits.
        let mut w = BitWriter::new();
        for sfb in 0..11 {
            w.put(sfb & 1, 1);
        }
        for sfb in 11..21 {
            w.put(sfb % 8, 3);
        }

        let mut bs = BitReaderLtr::new(&w.buf);
        assert_eq!(read_scale_factors(&mut bs, 0, 0, &mut frame_data).unwrap(), 11 + 30);

        // Granule 1 only codes the bands groups 0 and 2.
        let mut w = BitWriter::new();
        for _ in 0..6 {
            w.put(1, 1);
        }
        for _ in 11..16 {
            w.put(6, 3);
        }

        let mut bs = BitReaderLtr::new(&w.buf);
        assert_eq!(read_scale_factors(&mut bs, 1, 0, &mut frame_data).unwrap(), 6 + 15);

        let g0 = frame_data.granules[0].channels[0].scalefac_l;
        let g1 = frame_data.granules[1].channels[0].scalefac_l;

        assert_eq!(g1[..6], [1; 6]);
        assert_eq!(g1[6..11], g0[6..11]);
        assert_eq!(g1[11..16], [6; 5]);
        assert_eq!(g1[16..21], g0[16..21]);
        assert_eq!(g0[16], 0);
        assert_eq!(g0[17], 1);
        assert_eq!(g1[21], 0);
    }

    #[test]
    fn verify_scale_factors_mixed_block() {
        let mut frame_data = FrameData::default();

        // scalefac_compress 10 is (slen1, slen2) = (2, 3).
        let channel = &mut frame_data.granules[0].channels[1];
        channel.scalefac_compress = 10;
        channel.block_type = BlockType::Short { is_mixed: true };

        let mut w = BitWriter::new();
        for sfb in 0..8 {
            w.put(sfb as u32 & 3, 2);
        }
        // Short bands 3..6 with slen1, 6..12 with slen2.
        for sfb in 3..12u32 {
            let slen = if sfb < 6 { 2 } else { 3 };
            for win in 0..3 {
                w.put((sfb + win) % (1 << slen), slen);
            }
        }

        let mut bs = BitReaderLtr::new(&w.buf);
        let bits = read_scale_factors(&mut bs, 0, 1, &mut frame_data).unwrap();
        assert_eq!(bits, 8 * 2 + 3 * 3 * 2 + 6 * 3 * 3);

        let channel = &frame_data.granules[0].channels[1];
        assert_eq!(channel.scalefac_l[..8], [0, 1, 2, 3, 0, 1, 2, 3]);
        assert_eq!(channel.scalefac_s[0], [0, 0, 0]);
        assert_eq!(channel.scalefac_s[3], [3, 0, 1]);
        assert_eq!(channel.scalefac_s[11], [3, 4, 5]);
        assert_eq!(channel.scalefac_s[12], [0, 0, 0]);
    }
}
