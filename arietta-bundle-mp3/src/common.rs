// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arietta_core::audio::Channels;
use arietta_core::errors::{decode_error, Result};

use log::warn;

/// The number of audio samples per granule.
pub const SAMPLES_PER_GRANULE: usize = 576;

/// The number of sub-bands produced by the analysis filterbank.
pub const SUB_BANDS: usize = 32;

/// Starting indicies of each scale factor band at the MPEG version 1 sampling rates for long
/// blocks. Derived from ISO/IEC 11172-3 Table B.8.
pub const SFB_LONG_BANDS: [[usize; 23]; 3] = [
    // 44.1 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 52, 62, 74, 90, 110, 134, 162, 196, 238, 288, 342,
        418, 576,
    ],
    // 48 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 42, 50, 60, 72, 88, 106, 128, 156, 190, 230, 276, 330,
        384, 576,
    ],
    // 32 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 54, 66, 82, 102, 126, 156, 194, 240, 296, 364, 448,
        550, 576,
    ],
];

/// Starting indicies of each scale factor band within a single window of a short block. Each
/// short block has three windows, so the index of a band in the granule is the value multiplied
/// by 3. Derived from ISO/IEC 11172-3 Table B.8.
pub const SFB_SHORT_BANDS: [[usize; 14]; 3] = [
    // 44.1 kHz
    [0, 4, 8, 12, 16, 22, 30, 40, 52, 66, 84, 106, 136, 192],
    // 48 kHz
    [0, 4, 8, 12, 16, 22, 28, 38, 50, 64, 80, 100, 126, 192],
    // 32 kHz
    [0, 4, 8, 12, 16, 22, 30, 42, 58, 78, 104, 138, 180, 192],
];

/// The MPEG audio version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    /// Version 2 (low sampling frequencies, ISO/IEC 13818-3)
    Mpeg2,
    /// Version 1
    Mpeg1,
}

/// The MPEG audio layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegLayer {
    /// Layer 1
    Layer1,
    /// Layer 2
    Layer2,
    /// Layer 3
    Layer3,
}

/// For Joint Stereo channel mode, the mode extension describes the features and parameters of the
/// stereo encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Joint Stereo in layer 3 may use both Mid-Side and Intensity encoding.
    Layer3 { mid_side: bool, intensity: bool },
    /// Joint Stereo in layers 1 and 2 may only use Intensity encoding on a set of bands. The range
    /// of bands using intensity encoding is bound..32.
    Intensity { bound: u32 },
}

/// The channel mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Single mono audio channel.
    Mono,
    /// Dual mono audio channels.
    DualMono,
    /// Stereo channels.
    Stereo,
    /// Joint Stereo encoded channels (decodes to Stereo).
    JointStereo(Mode),
}

impl ChannelMode {
    /// Gets the number of channels.
    #[inline(always)]
    pub fn count(&self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// Gets the the channel map.
    #[inline(always)]
    pub fn channels(&self) -> Channels {
        match self {
            ChannelMode::Mono => Channels::FRONT_LEFT,
            _ => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        }
    }
}

/// The emphasis applied during encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Emphasis {
    /// No emphasis
    None,
    /// 50/15us
    Fifty15,
    /// CCIT J.17
    CcitJ17,
}

/// A MPEG audio frame header.
#[derive(Clone, Debug)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    /// Bit-rate in bits per second, or 0 for the "free" bit-rate.
    pub bitrate: u32,
    pub bitrate_idx: usize,
    pub sample_rate: u32,
    pub sample_rate_idx: usize,
    pub channel_mode: ChannelMode,
    /// The raw 2-bit mode extension.
    pub mode_extension: u8,
    pub emphasis: Emphasis,
    pub is_copyrighted: bool,
    pub is_original: bool,
    pub has_padding: bool,
    pub has_crc: bool,
    /// The length of the frame in bytes, excluding the 4 byte header.
    pub frame_size: usize,
}

impl FrameHeader {
    /// Returns true if this a MPEG1 frame, false otherwise.
    #[inline(always)]
    pub fn is_mpeg1(&self) -> bool {
        self.version == MpegVersion::Mpeg1
    }

    /// Returns true if the frame uses the "free" bit-rate.
    #[inline(always)]
    pub fn is_free_format(&self) -> bool {
        self.bitrate_idx == 0
    }

    /// Returns the number of granules in a Layer 3 frame. Only MPEG-1 frames are decoded and they
    /// always carry two.
    #[inline(always)]
    pub fn n_granules(&self) -> usize {
        2
    }

    /// Returns the number of channels per granule.
    #[inline(always)]
    pub fn n_channels(&self) -> usize {
        self.channel_mode.count()
    }

    /// Returns the number of audio samples per channel produced by the frame.
    #[inline(always)]
    pub fn n_samples(&self) -> usize {
        match self.layer {
            MpegLayer::Layer1 => 384,
            MpegLayer::Layer2 => 1152,
            MpegLayer::Layer3 => self.n_granules() * SAMPLES_PER_GRANULE,
        }
    }

    /// For layers 1 and 2, gets the first sub-band coded with intensity stereo. Sub-bands at or
    /// above the bound share one set of samples between both channels.
    #[inline(always)]
    pub fn intensity_bound(&self) -> usize {
        match self.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { bound }) => bound as usize,
            _ => SUB_BANDS,
        }
    }

    /// Get the MPEG-1 Layer 3 side information length.
    #[inline(always)]
    pub fn side_info_len(&self) -> usize {
        match self.channel_mode {
            ChannelMode::Mono => 17,
            _ => 32,
        }
    }
}

/// The largest number of samples per channel a frame decodes to.
pub const MAX_FRAME_SAMPLES: usize = 1152;

/// Planar output of one decoded frame. Only the first `FrameHeader::n_samples` samples of the
/// first `FrameHeader::n_channels` channels are written.
pub type FrameSamples = [[f32; MAX_FRAME_SAMPLES]; 2];

/// A decoder for a single MPEG audio layer.
pub trait Layer {
    /// Decode the payload of a frame into planar samples. The payload follows the header, and the
    /// CRC word if the frame has one.
    fn decode(
        &mut self,
        payload: &[u8],
        header: &FrameHeader,
        out: &mut FrameSamples,
    ) -> Result<()>;
}

/// `BitResevoir` implements the bit resevoir mechanism for main_data. Since frames have a
/// deterministic length based on the bit-rate, low-complexity portions of the audio may not need
/// every byte allocated to the frame. The bit resevoir mechanism allows these unused portions of
/// frames to be used by future frames.
///
/// After a fill, the main data of the current frame begins at the first byte of the resevoir.
pub struct BitResevoir {
    buf: Box<[u8]>,
    len: usize,
}

impl BitResevoir {
    pub fn new() -> Self {
        BitResevoir { buf: vec![0u8; 2048].into_boxed_slice(), len: 0 }
    }

    /// Keep the last `main_data_begin` bytes of the previous fill, then append the main data of
    /// the current frame after them.
    pub fn fill(&mut self, pkt_main_data: &[u8], main_data_begin: usize) -> Result<()> {
        let main_data_len = pkt_main_data.len();

        // The value `main_data_begin` indicates the number of bytes from the previous frame(s) to
        // reuse. The re-used bytes and the new main data must fit in the resevoir together.
        let main_data_end = main_data_begin + main_data_len;

        if main_data_end > self.buf.len() {
            self.clear();
            return decode_error("mp3: invalid main_data length, will exceed resevoir buffer");
        }

        if main_data_begin > self.len {
            // The frame references bytes that were never written. This happens at the start of a
            // stream that was cut, or after a seek. Retain the new main data so that the following
            // frames may still reference it.
            warn!(
                "mp3: invalid main_data_begin, underflow by {} bytes",
                main_data_begin - self.len
            );

            self.buf[..main_data_len].copy_from_slice(pkt_main_data);
            self.len = main_data_len;

            return decode_error("mp3: invalid main_data_begin");
        }

        // Shift all the re-used bytes as indicated by main_data_begin to the front of the
        // resevoir, then copy the new main data after them.
        self.buf.copy_within(self.len - main_data_begin..self.len, 0);
        self.buf[main_data_begin..main_data_end].copy_from_slice(pkt_main_data);
        self.len = main_data_end;

        Ok(())
    }

    pub fn bytes_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::BitResevoir;

    #[test]
    fn verify_resevoir_first_frame() {
        let mut resevoir = BitResevoir::new();

        resevoir.fill(&[1, 2, 3, 4], 0).unwrap();
        assert_eq!(resevoir.bytes_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn verify_resevoir_reuses_tail() {
        let mut resevoir = BitResevoir::new();

        resevoir.fill(&[1, 2, 3, 4, 5], 0).unwrap();
        resevoir.fill(&[6, 7], 2).unwrap();
        assert_eq!(resevoir.bytes_ref(), &[4, 5, 6, 7]);

        resevoir.fill(&[8], 4).unwrap();
        assert_eq!(resevoir.bytes_ref(), &[4, 5, 6, 7, 8]);
    }

    #[test]
    fn verify_resevoir_underflow() {
        let mut resevoir = BitResevoir::new();

        // Nothing has been written, so no bytes may be borrowed.
        assert!(resevoir.fill(&[1, 2, 3], 1).is_err());

        // The new main data was kept regardless.
        assert_eq!(resevoir.bytes_ref(), &[1, 2, 3]);
        resevoir.fill(&[9], 3).unwrap();
        assert_eq!(resevoir.bytes_ref(), &[1, 2, 3, 9]);
    }

    #[test]
    fn verify_resevoir_overflow() {
        let mut resevoir = BitResevoir::new();

        resevoir.fill(&[0; 1000], 0).unwrap();
        assert!(resevoir.fill(&[0; 1600], 511).is_err());
        assert!(resevoir.bytes_ref().is_empty());
    }
}
