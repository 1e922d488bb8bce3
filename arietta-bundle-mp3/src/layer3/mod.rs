// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use arietta_core::errors::{decode_error, Result};
use arietta_core::io::BitReaderLtr;

use log::trace;

mod bitstream;
mod codebooks;
mod huffman;
mod hybrid_synthesis;
mod requantize;
mod stereo;

use crate::common::*;
use crate::synthesis;

/// The block type of a granule channel, which selects the window and transform length.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BlockType {
    /// A long block, one 36-point IMDCT per sub-band.
    Long,
    /// A long block transitioning from long to short blocks.
    Start,
    /// A short block, three 12-point IMDCTs per sub-band. If mixed, the two lowest sub-bands are
    /// long.
    Short { is_mixed: bool },
    /// A long block transitioning from short to long blocks.
    End,
}

/// `FrameData` contains the side_info and main_data portions of a MPEG audio frame.
#[derive(Default, Debug)]
struct FrameData {
    /// The byte offset, backwards from the end of the main data already in the bit resevoir, of
    /// the first bit of main_data. If 0, main_data begins after the side_info of this frame.
    main_data_begin: u16,
    /// Scale factor selector information, per channel. A true marks a group of long bands whose
    /// scale factors granule 1 reuses from granule 0.
    ///
    /// Mapping of array indicies to bands [0..6, 6..11, 11..16, 16..21].
    scfsi: [[bool; 4]; 2],
    /// The granules.
    granules: [Granule; 2],
}

#[derive(Default, Debug)]
struct Granule {
    /// Channels in the granule.
    channels: [GranuleChannel; 2],
}

struct GranuleChannel {
    /// Total number of bits used for scale factors (part2) and Huffman encoded data (part3).
    part2_3_length: u16,
    /// HALF the number of samples in the big_values partition.
    big_values: u16,
    /// Logarithmic quantization step size.
    global_gain: u8,
    /// Index into `SCALE_FACTOR_SLEN` for the number of bits per scale factor.
    scalefac_compress: u8,
    /// Indicates the block type (type of window) for the channel in the granule.
    block_type: BlockType,
    /// Gain offsets of each short block window. Each has a maximum value of 7 (3 bits).
    subblock_gain: [u8; 3],
    /// The Huffman table to use for decoding `region[0..3]` of big_values.
    table_select: [u8; 3],
    /// The index of the first sample in region1 of big_values.
    region1_start: usize,
    /// The index of the first sample in region2 of big_values.
    region2_start: usize,
    /// Indicates if the pre-emphasis amount for each scale factor band should be added on to each
    /// scale factor before requantization.
    preflag: bool,
    /// A 0.5x (false) or 1x (true) multiplier for scale factors.
    scalefac_scale: bool,
    /// Use Huffman Quads table A (0) or B (1), for decoding the count1 partition.
    count1table_select: u8,
    /// Long block scale factors. Band 21 is never coded and is always 0.
    scalefac_l: [u8; 22],
    /// Short block scale factors, per band and window. Band 12 is never coded and is always 0.
    scalefac_s: [[u8; 3]; 13],
    /// The number of samples in the big_values and count1 partitions. Every sample from here on is
    /// 0.
    count1: usize,
}

impl Default for GranuleChannel {
    fn default() -> Self {
        GranuleChannel {
            part2_3_length: 0,
            big_values: 0,
            global_gain: 0,
            scalefac_compress: 0,
            block_type: BlockType::Long,
            subblock_gain: [0; 3],
            table_select: [0; 3],
            region1_start: 0,
            region2_start: 0,
            preflag: false,
            scalefac_scale: false,
            count1table_select: 0,
            scalefac_l: [0; 22],
            scalefac_s: [[0; 3]; 13],
            count1: 0,
        }
    }
}

impl fmt::Debug for GranuleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GranuleChannel {{")?;
        writeln!(f, "\tpart2_3_length={}", self.part2_3_length)?;
        writeln!(f, "\tbig_values={}", self.big_values)?;
        writeln!(f, "\tglobal_gain={}", self.global_gain)?;
        writeln!(f, "\tscalefac_compress={}", self.scalefac_compress)?;
        writeln!(f, "\tblock_type={:?}", self.block_type)?;
        writeln!(f, "\tsubblock_gain={:?}", self.subblock_gain)?;
        writeln!(f, "\ttable_select={:?}", self.table_select)?;
        writeln!(f, "\tregion1_start={}", self.region1_start)?;
        writeln!(f, "\tregion2_start={}", self.region2_start)?;
        writeln!(f, "\tpreflag={}", self.preflag)?;
        writeln!(f, "\tscalefac_scale={}", self.scalefac_scale)?;
        writeln!(f, "\tcount1table_select={}", self.count1table_select)?;
        writeln!(f, "\tscalefac_l={:?}", self.scalefac_l)?;
        writeln!(f, "\tscalefac_s={:?}", self.scalefac_s)?;
        writeln!(f, "\tcount1={}", self.count1)?;
        writeln!(f, "}}")
    }
}

/// Layer 3 decoder state that persists between frames.
pub struct Layer3 {
    resevoir: BitResevoir,
    /// Spectral samples, and later time-domain sub-band samples, per granule and channel.
    samples: [[[f32; SAMPLES_PER_GRANULE]; 2]; 2],
    /// The second half of the last IMDCT block of every sub-band, per channel.
    overlap: [[[f32; 18]; SUB_BANDS]; 2],
    synthesis: [synthesis::SynthesisState; 2],
}

impl Layer3 {
    pub fn new() -> Self {
        Layer3 {
            resevoir: BitResevoir::new(),
            samples: [[[0f32; SAMPLES_PER_GRANULE]; 2]; 2],
            overlap: [[[0f32; 18]; SUB_BANDS]; 2],
            synthesis: Default::default(),
        }
    }

    /// Discard the contents of the bit resevoir. The synthesis history is kept.
    pub fn reset_resevoir(&mut self) {
        self.resevoir.clear();
    }

    /// Reads the main_data (scale factors and Huffman coded samples) of every granule and channel
    /// from the bit resevoir.
    fn read_main_data(&mut self, header: &FrameHeader, frame_data: &mut FrameData) -> Result<()> {
        let mut bs = BitReaderLtr::new(self.resevoir.bytes_ref());

        for gr in 0..header.n_granules() {
            for ch in 0..header.n_channels() {
                let part2_start = bs.bit_pos();

                // Read the scale factors (part2) and get the number of bits read.
                let part2_len = bitstream::read_scale_factors(&mut bs, gr, ch, frame_data)?;

                let channel = &mut frame_data.granules[gr].channels[ch];
                let samples = &mut self.samples[gr][ch];

                let part2_3_length = usize::from(channel.part2_3_length);

                if part2_len as usize > part2_3_length {
                    return decode_error("mp3: part2_3_length is not valid");
                }

                let count1 = if part2_3_length > 0 {
                    let bit_pos_end = part2_start + part2_3_length - 1;
                    huffman::read_huffman_samples(&mut bs, channel, bit_pos_end, samples)?
                }
                else {
                    samples.fill(0.0);
                    0
                };

                channel.count1 = count1;

                // The Huffman decoder may stop short of, or run past, the end of part3.
                bs.seek_bits(part2_start + part2_3_length);
            }
        }

        Ok(())
    }
}

impl Layer for Layer3 {
    fn decode(
        &mut self,
        payload: &[u8],
        header: &FrameHeader,
        out: &mut FrameSamples,
    ) -> Result<()> {
        // Initialize an empty FrameData to store the side_info and main_data portions of the
        // frame.
        let mut frame_data: FrameData = Default::default();

        let side_info_len = header.side_info_len();

        if payload.len() < side_info_len {
            self.resevoir.clear();
            return decode_error("mp3: frame is too short for side_info");
        }

        let mut bs = BitReaderLtr::new(&payload[..side_info_len]);

        if let Err(err) = bitstream::read_side_info(&mut bs, header, &mut frame_data) {
            // The frames that follow may reference the main data of this frame, but it cannot be
            // located without valid side_info.
            self.resevoir.clear();
            return Err(err);
        }

        trace!("mp3: main_data_begin={}", frame_data.main_data_begin);

        // Buffer main data into the bit resevoir.
        self.resevoir.fill(&payload[side_info_len..], usize::from(frame_data.main_data_begin))?;

        self.read_main_data(header, &mut frame_data)?;

        for gr in 0..header.n_granules() {
            let granule = &mut frame_data.granules[gr];

            // Requantize all non-zero (big_values and count1 partition) spectral samples.
            for ch in 0..header.n_channels() {
                requantize::requantize(header, &granule.channels[ch], &mut self.samples[gr][ch]);
            }

            // Apply joint stereo processing if it is used.
            if header.n_channels() == 2 {
                stereo::stereo(header, granule, &mut self.samples[gr])?;
            }

            for ch in 0..header.n_channels() {
                let channel = &granule.channels[ch];
                let samples = &mut self.samples[gr][ch];

                // Reorder the spectral samples in short blocks into sub-band order.
                hybrid_synthesis::reorder(header, channel, samples);

                // Apply the anti-aliasing filter to all block types other than short.
                hybrid_synthesis::antialias(channel, samples);

                // Perform hybrid-synthesis (IMDCT and windowing).
                hybrid_synthesis::hybrid_synthesis(channel, &mut self.overlap[ch], samples);

                hybrid_synthesis::frequency_inversion(samples);

                // Each sub-band now holds 18 time-domain samples. Perform polyphase synthesis and
                // generate PCM samples.
                let out_range = gr * SAMPLES_PER_GRANULE..(gr + 1) * SAMPLES_PER_GRANULE;

                synthesis::synthesis(
                    &mut self.synthesis[ch],
                    18,
                    &samples[..],
                    &mut out[ch][out_range],
                );
            }
        }

        Ok(())
    }
}
