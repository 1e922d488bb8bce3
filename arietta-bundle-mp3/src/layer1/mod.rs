// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arietta_core::errors::{decode_error, Result};
use arietta_core::io::{BitReaderLtr, ReadBitsLtr};
use arietta_core::util::bits::sign_extend_leq32_to_i32;

use lazy_static::lazy_static;

use crate::common::*;
use crate::layer12::LAYER12_SCALEFACTORS;
use crate::synthesis;

/// The number of samples per sub-band in a Layer 1 frame.
const SLOTS: usize = 12;

lazy_static! {
    static ref FACTOR: [f32; 16] = {
        let mut factor = [0f32; 16];

        for (i, factor) in factor.iter_mut().enumerate().skip(2) {
            // ISO/IEC 11172-3 dequantizes a nb-bit sample, with its most significant bit inverted
            // and read as a two's complement fraction s, as:
            //
            //   s' = 2^nb / (2^nb - 1) * (s + 2^(-nb + 1))
            //
            // With s = val / 2^(nb - 1) for the signed integer val, this becomes:
            //
            //   s' = [2^nb / (2^nb - 1) * 2^(-nb + 1)] * (val + 1)
            //
            // This table holds the bracketed factor for nb = 2..16.
            let a = 1u32 << i;
            let b = 1u32 << (i - 1);

            *factor = (a as f32 / (a - 1) as f32) / b as f32;
        }

        factor
    };
}

/// Dequantize a sample, `raw`, of length `bits` bits.
#[inline(always)]
fn dequantize(bits: u32, factor: f32, raw: u32) -> f32 {
    // Invert the most significant bit.
    let inv = raw ^ (1 << (bits - 1));

    factor * (sign_extend_leq32_to_i32(inv, bits) + 1) as f32
}

/// Read a 4-bit allocation and return the sample width in bits, or 0 if the sub-band is silent.
#[inline(always)]
fn read_allocation(bs: &mut BitReaderLtr<'_>) -> Result<u8> {
    match bs.read_bits_leq32(4)? as u8 {
        0 => Ok(0),
        0xf => decode_error("mp1: invalid bit allocation"),
        bits => Ok(bits + 1),
    }
}

/// Read the allocations, scale factors, and samples of a Layer 1 frame into sub-band major
/// arrays, `samples[ch][12 * sb + s]`.
fn read_samples(
    bs: &mut BitReaderLtr<'_>,
    header: &FrameHeader,
    samples: &mut [[f32; SLOTS * SUB_BANDS]; 2],
) -> Result<()> {
    let mut alloc = [[0u8; SUB_BANDS]; 2];
    let mut scalefacs = [[0f32; SUB_BANDS]; 2];

    let n_channels = header.n_channels();

    // Sub-bands from the bound upwards are intensity coded. They share one allocation and one set
    // of samples, but keep a scale factor per channel.
    let bound = header.intensity_bound().min(SUB_BANDS);

    for sb in 0..bound {
        for chan in &mut alloc[..n_channels] {
            chan[sb] = read_allocation(bs)?;
        }
    }

    for sb in bound..SUB_BANDS {
        let bits = read_allocation(bs)?;

        alloc[0][sb] = bits;
        alloc[1][sb] = bits;
    }

    for sb in 0..SUB_BANDS {
        for ch in 0..n_channels {
            if alloc[ch][sb] != 0 {
                let index = bs.read_bits_leq32(6)? as usize;

                scalefacs[ch][sb] = LAYER12_SCALEFACTORS[index];
            }
        }
    }

    let factor: &[f32; 16] = &FACTOR;

    for chan in samples.iter_mut() {
        chan.fill(0.0);
    }

    for s in 0..SLOTS {
        for sb in 0..bound {
            for ch in 0..n_channels {
                let bits = u32::from(alloc[ch][sb]);

                if bits != 0 {
                    let raw = bs.read_bits_leq32(bits)?;

                    let sample = dequantize(bits, factor[bits as usize], raw);

                    samples[ch][SLOTS * sb + s] = scalefacs[ch][sb] * sample;
                }
            }
        }

        for sb in bound..SUB_BANDS {
            let bits = u32::from(alloc[0][sb]);

            if bits != 0 {
                let raw = bs.read_bits_leq32(bits)?;

                let sample = dequantize(bits, factor[bits as usize], raw);

                for ch in 0..n_channels {
                    samples[ch][SLOTS * sb + s] = scalefacs[ch][sb] * sample;
                }
            }
        }
    }

    Ok(())
}

pub struct Layer1 {
    synthesis: [synthesis::SynthesisState; 2],
}

impl Layer1 {
    pub fn new() -> Self {
        Self { synthesis: Default::default() }
    }
}

impl Layer for Layer1 {
    fn decode(
        &mut self,
        payload: &[u8],
        header: &FrameHeader,
        out: &mut FrameSamples,
    ) -> Result<()> {
        let mut bs = BitReaderLtr::new(payload);

        let mut samples = [[0f32; SLOTS * SUB_BANDS]; 2];

        read_samples(&mut bs, header, &mut samples)?;

        // Each frame yields 384 samples per channel. All steps from here on are infallible.
        for (ch, samples) in samples.iter().enumerate().take(header.n_channels()) {
            // Perform polyphase synthesis and generate PCM samples.
            synthesis::synthesis(&mut self.synthesis[ch], SLOTS, samples, &mut out[ch]);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_writer::BitWriter;
    use crate::header::parse_frame_header;

    /// MPEG1 Layer 1, 256 kbps, 44.1 kHz, mono.
    const MONO_HEADER: u32 = 0xffff80c0;

    /// MPEG1 Layer 1, 256 kbps, 44.1 kHz, joint stereo with intensity coding from sub-band 4.
    const JOINT_STEREO_HEADER: u32 = 0xffff8040;

    #[test]
    fn verify_dequantize() {
        let factor: &[f32; 16] = &FACTOR;

        // With 2 bits: 00 -> -2/3, 01 -> 0, 10 -> 2/3.
        assert!((dequantize(2, factor[2], 0b00) + 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(dequantize(2, factor[2], 0b01), 0.0);
        assert!((dequantize(2, factor[2], 0b10) - 2.0 / 3.0).abs() < 1e-6);

        // With 4 bits the largest magnitude is 14/15.
        assert!((dequantize(4, factor[4], 0b1110) - 14.0 / 15.0).abs() < 1e-6);
        assert!((dequantize(4, factor[4], 0b0000) + 14.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn verify_mono_sub_band() {
        let header = parse_frame_header(MONO_HEADER).unwrap();

        let mut bw = BitWriter::new();

        // Sub-band 0 has 2-bit samples, every other sub-band is silent.
        bw.put(1, 4);
        for _ in 1..SUB_BANDS {
            bw.put(0, 4);
        }

        // Scale factor 1.0.
        bw.put(3, 6);

        for _ in 0..SLOTS {
            bw.put(0b10, 2);
        }

        bw.pad_to(header.frame_size);

        let mut bs = BitReaderLtr::new(&bw.buf);
        let mut samples = [[1f32; SLOTS * SUB_BANDS]; 2];

        read_samples(&mut bs, &header, &mut samples).unwrap();

        for s in 0..SLOTS {
            assert!((samples[0][s] - 2.0 / 3.0).abs() < 1e-6);
        }
        assert!(samples[0][SLOTS..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_intensity_coded_sub_band() {
        let header = parse_frame_header(JOINT_STEREO_HEADER).unwrap();
        assert_eq!(header.intensity_bound(), 4);

        let mut bw = BitWriter::new();

        // Sub-bands 0..4 have an allocation per channel.
        for _ in 0..2 * 4 {
            bw.put(0, 4);
        }

        // Sub-band 5 shares 2-bit samples.
        for sb in 4..SUB_BANDS {
            bw.put(if sb == 5 { 1 } else { 0 }, 4);
        }

        // Scale factors 2.0 and 1.0.
        bw.put(0, 6).put(3, 6);

        for _ in 0..SLOTS {
            bw.put(0b11, 2);
        }

        bw.pad_to(header.frame_size);

        let mut bs = BitReaderLtr::new(&bw.buf);
        let mut samples = [[0f32; SLOTS * SUB_BANDS]; 2];

        read_samples(&mut bs, &header, &mut samples).unwrap();

        for s in 0..SLOTS {
            assert!((samples[0][SLOTS * 5 + s] - 8.0 / 3.0).abs() < 1e-5);
            assert!((samples[1][SLOTS * 5 + s] - 4.0 / 3.0).abs() < 1e-5);
        }
    }

    #[test]
    fn verify_invalid_allocation() {
        let header = parse_frame_header(MONO_HEADER).unwrap();

        let mut bw = BitWriter::new();
        bw.put(0, 4).put(0xf, 4);
        bw.pad_to(header.frame_size);

        let mut layer1 = Layer1::new();
        let mut out = [[0f32; MAX_FRAME_SAMPLES]; 2];

        assert!(layer1.decode(&bw.buf, &header, &mut out).is_err());
    }

    #[test]
    fn verify_silent_frame() {
        let header = parse_frame_header(MONO_HEADER).unwrap();

        let payload = vec![0u8; header.frame_size];

        let mut layer1 = Layer1::new();
        let mut out = [[1f32; MAX_FRAME_SAMPLES]; 2];

        layer1.decode(&payload, &header, &mut out).unwrap();

        assert!(out[0][..384].iter().all(|&s| s == 0.0));
        assert!(out[0][384..].iter().all(|&s| s == 1.0));
    }
}
