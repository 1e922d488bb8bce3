// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arietta_core::errors::{decode_error, no_sync_error, Result};
use arietta_core::io::ReadBytes;

use crate::common::*;

/// The length in bytes of a MPEG frame header word.
pub const MPEG_HEADER_LEN: usize = 4;

/// Frames larger than this are not produced by any conforming MPEG-1 encoder.
pub const MAX_SANE_FRAME_SIZE: usize = 2000;

/// Bit-rate lookup table for MPEG version 1 layer 1.
const BIT_RATES_MPEG1_L1: [u32; 15] = [
    0, 32_000, 64_000, 96_000, 128_000, 160_000, 192_000, 224_000, 256_000, 288_000, 320_000,
    352_000, 384_000, 416_000, 448_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 2.
const BIT_RATES_MPEG1_L2: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000, 224_000,
    256_000, 320_000, 384_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 3.
const BIT_RATES_MPEG1_L3: [u32; 15] = [
    0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000,
    224_000, 256_000, 320_000,
];

/// Bit-rate lookup table for MPEG version 2 audio layer 1.
const BIT_RATES_MPEG2_L1: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 144_000, 160_000, 176_000,
    192_000, 224_000, 256_000,
];

/// Bit-rate lookup table for MPEG version 2 audio layers 2 & 3.
const BIT_RATES_MPEG2_L23: [u32; 15] = [
    0, 8_000, 16_000, 24_000, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000,
    128_000, 144_000, 160_000,
];

/// Returns true if the provided header word begins with the 12-bit sync pattern.
#[inline(always)]
pub fn is_frame_header_word_synced(sync: u32) -> bool {
    (sync & 0xfff0_0000) == 0xfff0_0000
}

/// Quickly check if the fields of a synced header word hold permitted values.
#[inline]
pub fn check_header(header: u32) -> bool {
    // Layer (0x0 is reserved).
    if (header >> 17) & 0x3 == 0x0 {
        return false;
    }
    // Bitrate (0xf is not allowed).
    if (header >> 12) & 0xf == 0xf {
        return false;
    }
    // Sample rate (0x3 is reserved).
    if (header >> 10) & 0x3 == 0x3 {
        return false;
    }
    true
}

/// Returns true if the header word is synced and structurally valid.
#[inline]
pub fn is_valid_header(header: u32) -> bool {
    is_frame_header_word_synced(header) && check_header(header)
}

/// Synchronize the provided reader to the end of the next valid frame header, and return the frame
/// header as a `u32`.
///
/// If `max_skip` is provided, at most that many bytes may be skipped before the header must begin.
/// Exhausting the reader or exceeding the bound returns a `NoSync` error.
pub fn sync_frame<B: ReadBytes>(reader: &mut B, max_skip: Option<usize>) -> Result<u32> {
    let mut sync = match reader.read_be_u32() {
        Ok(word) => word,
        Err(_) => return no_sync_error(),
    };

    let mut skipped = 0;

    // The MPEG audio frame header always starts at a byte boundary, so shift the candidate word
    // along one byte at a time until it parses as a valid header.
    while !is_valid_header(sync) {
        if max_skip.map_or(false, |max| skipped >= max) {
            return no_sync_error();
        }

        sync = match reader.read_u8() {
            Ok(byte) => (sync << 8) | u32::from(byte),
            Err(_) => return no_sync_error(),
        };

        skipped += 1;
    }

    Ok(sync)
}

/// Parses a header word that has already passed `is_valid_header`.
pub fn parse_frame_header(header: u32) -> Result<FrameHeader> {
    // The MPEG audio header is structured as follows:
    //
    // 0b1111_1111 0b1111_vlly 0brrrr_hhpx 0bmmmm_coee
    // where:
    //     v    = version, ll = layer      , y = crc
    //     rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
    //     mmmm = mode   , c  = copyright  , o = original, ee = emphasis

    if !is_valid_header(header) {
        return decode_error("mpa: invalid frame header");
    }

    let version = match (header & 0x8_0000) >> 19 {
        0b1 => MpegVersion::Mpeg1,
        _ => MpegVersion::Mpeg2,
    };

    let layer = match (header & 0x6_0000) >> 17 {
        0b01 => MpegLayer::Layer3,
        0b10 => MpegLayer::Layer2,
        _ => MpegLayer::Layer1,
    };

    let bitrate_idx = ((header & 0xf000) >> 12) as usize;

    let bitrate = match (version, layer) {
        (MpegVersion::Mpeg1, MpegLayer::Layer1) => BIT_RATES_MPEG1_L1[bitrate_idx],
        (MpegVersion::Mpeg1, MpegLayer::Layer2) => BIT_RATES_MPEG1_L2[bitrate_idx],
        (MpegVersion::Mpeg1, MpegLayer::Layer3) => BIT_RATES_MPEG1_L3[bitrate_idx],
        (_, MpegLayer::Layer1) => BIT_RATES_MPEG2_L1[bitrate_idx],
        (_, _) => BIT_RATES_MPEG2_L23[bitrate_idx],
    };

    let sample_rate_idx = ((header & 0xc00) >> 10) as usize;

    let sample_rate = match (sample_rate_idx, version) {
        (0, MpegVersion::Mpeg1) => 44_100,
        (1, MpegVersion::Mpeg1) => 48_000,
        (_, MpegVersion::Mpeg1) => 32_000,
        (0, MpegVersion::Mpeg2) => 22_050,
        (1, MpegVersion::Mpeg2) => 24_000,
        (_, MpegVersion::Mpeg2) => 16_000,
    };

    let mode_extension = ((header & 0x30) >> 4) as u8;

    let channel_mode = match ((header & 0xc0) >> 6, layer) {
        // Stereo, for layers 1, 2, and 3.
        (0b00, _) => ChannelMode::Stereo,
        // Dual mono, for layers 1, 2, and 3.
        (0b10, _) => ChannelMode::DualMono,
        // Mono, for layers 1, 2, and 3.
        (0b11, _) => ChannelMode::Mono,
        // Joint stereo mode for layer 3 supports a combination of Mid-Side and Intensity Stereo
        // depending on the mode extension bits.
        (_, MpegLayer::Layer3) => ChannelMode::JointStereo(Mode::Layer3 {
            mid_side: mode_extension & 0x2 != 0x0,
            intensity: mode_extension & 0x1 != 0x0,
        }),
        // Joint stereo mode for layers 1 and 2 only supports Intensity Stereo. The mode extension
        // bits indicate for which sub-bands intensity stereo coding is applied.
        (_, _) => ChannelMode::JointStereo(Mode::Intensity {
            bound: (1 + u32::from(mode_extension)) << 2,
        }),
    };

    let emphasis = match header & 0x3 {
        0b01 => Emphasis::Fifty15,
        0b11 => Emphasis::CcitJ17,
        _ => Emphasis::None,
    };

    let is_copyrighted = header & 0x8 != 0x0;
    let is_original = header & 0x4 != 0x0;
    let has_padding = header & 0x200 != 0;

    let has_crc = header & 0x1_0000 == 0;

    // Constants provided for size calculation in section ISO-11172 section 2.4.3.1.
    let factor = match layer {
        MpegLayer::Layer1 => 12,
        MpegLayer::Layer2 => 144,
        MpegLayer::Layer3 if version == MpegVersion::Mpeg1 => 144,
        MpegLayer::Layer3 => 72,
    };

    // The header specifies the total frame size in "slots". For layers 2 & 3 a slot is 1 byte,
    // however for layer 1 a slot is 4 bytes.
    let slot_size = match layer {
        MpegLayer::Layer1 => 4,
        _ => 1,
    };

    // Calculate the total frame size in number of slots.
    let frame_size_slots = (factor * bitrate / sample_rate) as usize + usize::from(has_padding);

    // Calculate the frame size in bytes, excluding the header. For the "free" bit-rate the size
    // is unknown and evaluates to 0.
    let frame_size = (frame_size_slots * slot_size).saturating_sub(MPEG_HEADER_LEN);

    Ok(FrameHeader {
        version,
        layer,
        bitrate,
        bitrate_idx,
        sample_rate,
        sample_rate_idx,
        channel_mode,
        mode_extension,
        emphasis,
        is_copyrighted,
        is_original,
        has_padding,
        has_crc,
        frame_size,
    })
}

/// Checks the bit-rate and channel mode combinations that layer 2 forbids.
pub fn check_layer2_bitrate(header: &FrameHeader) -> Result<()> {
    if header.layer != MpegLayer::Layer2 || !header.is_mpeg1() {
        return Ok(());
    }

    let bitrate = header.bitrate;

    if header.channel_mode == ChannelMode::Mono {
        if bitrate == 224_000 || bitrate == 256_000 || bitrate == 320_000 || bitrate == 384_000 {
            return decode_error("mpa: invalid Layer 2 bitrate for mono channel mode");
        }
    }
    else if bitrate == 32_000 || bitrate == 48_000 || bitrate == 56_000 || bitrate == 80_000 {
        return decode_error("mpa: invalid Layer 2 bitrate for non-mono channel mode");
    }

    Ok(())
}
