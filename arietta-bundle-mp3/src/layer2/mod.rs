// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arietta_core::errors::Result;
use arietta_core::io::{BitReaderLtr, ReadBitsLtr};
use arietta_core::util::bits::sign_extend_leq32_to_i32;

use crate::common::*;
use crate::header::check_layer2_bitrate;
use crate::layer12::LAYER12_SCALEFACTORS;
use crate::synthesis;

/// The number of samples per sub-band in a Layer 2 frame.
const SLOTS: usize = 36;

/// A Layer 2 quantizer.
struct Quantizer {
    /// The number of quantization levels.
    levels: u16,
    /// If true, three consecutive samples are packed into a single code word.
    grouped: bool,
    /// Bits per sample, or per code word if grouped.
    code_bits: u8,
    /// Dequantization constant C.
    c: f32,
    /// Dequantization constant D.
    d: f32,
}

/// The quantizers. Derived from ISO/IEC 11172-3 Table 3-B.4.
#[rustfmt::skip]
const QUANTIZERS: [Quantizer; 17] = [
    Quantizer { levels:     3, grouped: true,  code_bits:  5, c: 1.33333333333, d: 0.50000000000 },
    Quantizer { levels:     5, grouped: true,  code_bits:  7, c: 1.60000000000, d: 0.50000000000 },
    Quantizer { levels:     7, grouped: false, code_bits:  3, c: 1.14285714286, d: 0.25000000000 },
    Quantizer { levels:     9, grouped: true,  code_bits: 10, c: 1.77777777777, d: 0.50000000000 },
    Quantizer { levels:    15, grouped: false, code_bits:  4, c: 1.06666666666, d: 0.12500000000 },
    Quantizer { levels:    31, grouped: false, code_bits:  5, c: 1.03225806452, d: 0.06250000000 },
    Quantizer { levels:    63, grouped: false, code_bits:  6, c: 1.01587301587, d: 0.03125000000 },
    Quantizer { levels:   127, grouped: false, code_bits:  7, c: 1.00787401575, d: 0.01562500000 },
    Quantizer { levels:   255, grouped: false, code_bits:  8, c: 1.00392156863, d: 0.00781250000 },
    Quantizer { levels:   511, grouped: false, code_bits:  9, c: 1.00195694716, d: 0.00390625000 },
    Quantizer { levels:  1023, grouped: false, code_bits: 10, c: 1.00097751711, d: 0.00195312500 },
    Quantizer { levels:  2047, grouped: false, code_bits: 11, c: 1.00048851979, d: 0.00097656250 },
    Quantizer { levels:  4095, grouped: false, code_bits: 12, c: 1.00024420024, d: 0.00048828125 },
    Quantizer { levels:  8191, grouped: false, code_bits: 13, c: 1.00012208522, d: 0.00024414063 },
    Quantizer { levels: 16383, grouped: false, code_bits: 14, c: 1.00006103888, d: 0.00012207031 },
    Quantizer { levels: 32767, grouped: false, code_bits: 15, c: 1.00003051851, d: 0.00006103516 },
    Quantizer { levels: 65535, grouped: false, code_bits: 16, c: 1.00001525902, d: 0.00003051758 },
];

/// The quantizers a sub-band may select from with its allocation.
struct AllocClass {
    /// The width of the allocation field.
    nbal: u8,
    /// Index into `QUANTIZERS` for each allocation. Allocation 0 is silence and has no quantizer.
    quantizers: [u8; 16],
}

/// Derived from the columns of ISO/IEC 11172-3 Tables 3-B.2a-d.
#[rustfmt::skip]
const ALLOC_CLASSES: [AllocClass; 6] = [
    AllocClass { nbal: 2, quantizers: [0, 0, 1, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] },
    AllocClass { nbal: 3, quantizers: [0, 0, 1, 3, 4, 5, 6, 7, 0, 0, 0, 0, 0, 0, 0, 0] },
    AllocClass { nbal: 3, quantizers: [0, 0, 1, 2, 3, 4, 5, 16, 0, 0, 0, 0, 0, 0, 0, 0] },
    AllocClass { nbal: 4, quantizers: [0, 0, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15] },
    AllocClass { nbal: 4, quantizers: [0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16] },
    AllocClass { nbal: 4, quantizers: [0, 0, 2, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16] },
];

/// A bit allocation table.
struct AllocTable {
    /// The number of coded sub-bands. Sub-bands from here on are silent.
    sblimit: usize,
    /// Index into `ALLOC_CLASSES` for each coded sub-band.
    classes: [u8; 30],
}

#[rustfmt::skip]
const ALLOC_TABLES: [AllocTable; 4] = [
    // Table 3-B.2a.
    AllocTable {
        sblimit: 27,
        classes: [
            5, 5, 5, 4, 4, 4, 4, 4, 4, 4, 4, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0,
        ],
    },
    // Table 3-B.2b.
    AllocTable {
        sblimit: 30,
        classes: [
            5, 5, 5, 4, 4, 4, 4, 4, 4, 4, 4, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0,
        ],
    },
    // Table 3-B.2c.
    AllocTable {
        sblimit: 8,
        classes: [
            3, 3, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ],
    },
    // Table 3-B.2d.
    AllocTable {
        sblimit: 12,
        classes: [
            3, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ],
    },
];

impl AllocTable {
    #[inline(always)]
    fn class(&self, sb: usize) -> &'static AllocClass {
        &ALLOC_CLASSES[usize::from(self.classes[sb])]
    }
}

impl AllocClass {
    #[inline(always)]
    fn quantizer(&self, alloc: u8) -> &'static Quantizer {
        &QUANTIZERS[usize::from(self.quantizers[usize::from(alloc)])]
    }
}

/// Select the bit allocation table for a frame. The table depends on the bit-rate per channel and
/// the sample rate.
fn find_alloc_table(header: &FrameHeader) -> &'static AllocTable {
    let bitrate_per_channel = header.bitrate / header.n_channels() as u32;

    let idx = if bitrate_per_channel <= 48_000 {
        // Tables 3-B.2c and 3-B.2d are only used at 48 kbit/s or less.
        if header.sample_rate == 32_000 {
            3
        }
        else {
            2
        }
    }
    else if bitrate_per_channel <= 80_000 {
        0
    }
    else {
        // Above 80 kbit/s, 48 kHz keeps to Table 3-B.2a.
        usize::from(header.sample_rate != 48_000)
    };

    &ALLOC_TABLES[idx]
}

/// Read and dequantize the next three samples of a sub-band.
fn dequantize(bs: &mut BitReaderLtr<'_>, quantizer: &Quantizer) -> Result<[f32; 3]> {
    let mut raw = [0u32; 3];

    let bits = if quantizer.grouped {
        // Unpack the code word into 3 samples, least significant first.
        let mut code = bs.read_bits_leq32(u32::from(quantizer.code_bits))?;

        let levels = u32::from(quantizer.levels);

        for r in raw.iter_mut() {
            *r = code % levels;
            code /= levels;
        }

        // The width of a sample is the number of bits needed to represent `levels`.
        levels.next_power_of_two().trailing_zeros()
    }
    else {
        let bits = u32::from(quantizer.code_bits);

        for r in raw.iter_mut() {
            *r = bs.read_bits_leq32(bits)?;
        }

        bits
    };

    let divisor = (1u32 << (bits - 1)) as f32;

    let mut samples = [0f32; 3];

    for (sample, &raw) in samples.iter_mut().zip(&raw) {
        // Invert the most significant bit, and read the result as a two's complement fraction.
        let fraction = sign_extend_leq32_to_i32(raw ^ (1 << (bits - 1)), bits) as f32 / divisor;

        *sample = quantizer.c * (fraction + quantizer.d);
    }

    Ok(samples)
}

/// Read the allocations, scale factors, and samples of a Layer 2 frame into sub-band major
/// arrays, `samples[ch][36 * sb + 3 * gr + i]`.
fn read_samples(
    bs: &mut BitReaderLtr<'_>,
    header: &FrameHeader,
    samples: &mut [[f32; SLOTS * SUB_BANDS]; 2],
) -> Result<()> {
    let mut alloc = [[0u8; SUB_BANDS]; 2];
    let mut scfsi = [[0u8; SUB_BANDS]; 2];
    let mut scalefacs = [[[0u8; 3]; SUB_BANDS]; 2];

    let n_channels = header.n_channels();

    let table = find_alloc_table(header);

    let bound = header.intensity_bound().min(table.sblimit);

    for sb in 0..bound {
        let nbal = u32::from(table.class(sb).nbal);

        for chan in &mut alloc[..n_channels] {
            chan[sb] = bs.read_bits_leq32(nbal)? as u8;
        }
    }

    // Intensity coded sub-bands share an allocation.
    for sb in bound..table.sblimit {
        let value = bs.read_bits_leq32(u32::from(table.class(sb).nbal))? as u8;

        alloc[0][sb] = value;
        alloc[1][sb] = value;
    }

    for sb in 0..table.sblimit {
        for ch in 0..n_channels {
            if alloc[ch][sb] != 0 {
                scfsi[ch][sb] = bs.read_bits_leq32(2)? as u8;
            }
        }
    }

    // Each sub-band is split into 3 parts of 12 samples. The scale factor selection information
    // picks which parts share a scale factor:
    //
    //   0: [a, b, c], 1: [a, a, b], 2: [a, a, a], 3: [a, b, b]
    for sb in 0..table.sblimit {
        for ch in 0..n_channels {
            if alloc[ch][sb] == 0 {
                continue;
            }

            let mut indicies = [bs.read_bits_leq32(6)? as u8; 3];

            match scfsi[ch][sb] {
                0 => {
                    indicies[1] = bs.read_bits_leq32(6)? as u8;
                    indicies[2] = bs.read_bits_leq32(6)? as u8;
                }
                1 => {
                    indicies[2] = bs.read_bits_leq32(6)? as u8;
                }
                3 => {
                    indicies[1] = bs.read_bits_leq32(6)? as u8;
                    indicies[2] = indicies[1];
                }
                _ => (),
            }

            scalefacs[ch][sb] = indicies;
        }
    }

    for chan in samples.iter_mut() {
        chan.fill(0.0);
    }

    for gr in 0..12 {
        // The part of the sub-band the granule falls in.
        let part = gr / 4;

        for sb in 0..table.sblimit {
            let class = table.class(sb);

            if sb < bound {
                for ch in 0..n_channels {
                    if alloc[ch][sb] != 0 {
                        let triplet = dequantize(bs, class.quantizer(alloc[ch][sb]))?;

                        let scalefac = LAYER12_SCALEFACTORS[usize::from(scalefacs[ch][sb][part])];

                        for (i, &s) in triplet.iter().enumerate() {
                            samples[ch][SLOTS * sb + 3 * gr + i] = scalefac * s;
                        }
                    }
                }
            }
            else if alloc[0][sb] != 0 {
                // One triplet for both channels, scaled per channel.
                let triplet = dequantize(bs, class.quantizer(alloc[0][sb]))?;

                for ch in 0..n_channels {
                    let scalefac = LAYER12_SCALEFACTORS[usize::from(scalefacs[ch][sb][part])];

                    for (i, &s) in triplet.iter().enumerate() {
                        samples[ch][SLOTS * sb + 3 * gr + i] = scalefac * s;
                    }
                }
            }
        }
    }

    Ok(())
}

pub struct Layer2 {
    synthesis: [synthesis::SynthesisState; 2],
}

impl Layer2 {
    pub fn new() -> Self {
        Self { synthesis: Default::default() }
    }
}

impl Layer for Layer2 {
    fn decode(
        &mut self,
        payload: &[u8],
        header: &FrameHeader,
        out: &mut FrameSamples,
    ) -> Result<()> {
        check_layer2_bitrate(header)?;

        let mut bs = BitReaderLtr::new(payload);

        let mut samples = [[0f32; SLOTS * SUB_BANDS]; 2];

        read_samples(&mut bs, header, &mut samples)?;

        for (ch, samples) in samples.iter().enumerate().take(header.n_channels()) {
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

    fn sblimit(header: u32) -> usize {
        find_alloc_table(&parse_frame_header(header).unwrap()).sblimit
    }

    #[test]
    fn verify_alloc_table_selection() {
        // 128 kbps stereo at 44.1 kHz is 64 kbps per channel. Table 3-B.2a.
        assert_eq!(sblimit(0xfffd8000), 27);
        // 192 kbps mono at 44.1 kHz uses Table 3-B.2b, but at 48 kHz uses Table 3-B.2a.
        assert_eq!(sblimit(0xfffda0c0), 30);
        assert_eq!(sblimit(0xfffda4c0), 27);
        // 32 kbps mono at 44.1 kHz. Table 3-B.2c.
        assert_eq!(sblimit(0xfffd10c0), 8);
        // 64 kbps stereo at 32 kHz is 32 kbps per channel. Table 3-B.2d.
        assert_eq!(sblimit(0xfffd4800), 12);
    }

    #[test]
    fn verify_alloc_classes_all_referenced() {
        let mut used = [false; ALLOC_CLASSES.len()];

        for table in ALLOC_TABLES.iter() {
            for &class in &table.classes[..table.sblimit] {
                used[usize::from(class)] = true;
            }
        }

        assert!(used.iter().all(|&used| used));

        // The first sub-band of Table 3-B.2c codes allocations with 4 bits, the last with 3.
        let table = &ALLOC_TABLES[2];
        assert_eq!(table.class(0).nbal, 4);
        assert_eq!(table.class(table.sblimit - 1).nbal, 3);
    }

    #[test]
    fn verify_grouped_dequantize() {
        // Code word 11 unpacks to the 3-level samples [2, 0, 1].
        let mut bw = BitWriter::new();
        bw.put(11, 5);

        let mut bs = BitReaderLtr::new(&bw.buf);
        let triplet = dequantize(&mut bs, &QUANTIZERS[0]).unwrap();

        assert!((triplet[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((triplet[1] + 2.0 / 3.0).abs() < 1e-6);
        assert!(triplet[2].abs() < 1e-6);
    }

    #[test]
    fn verify_ungrouped_dequantize() {
        // 7 levels in 3 bits: 000 -> -6/7, 011 -> 0, 110 -> 6/7.
        let mut bw = BitWriter::new();
        bw.put(0b000, 3).put(0b011, 3).put(0b110, 3);

        let mut bs = BitReaderLtr::new(&bw.buf);
        let triplet = dequantize(&mut bs, &QUANTIZERS[2]).unwrap();

        assert!((triplet[0] + 6.0 / 7.0).abs() < 1e-6);
        assert!(triplet[1].abs() < 1e-6);
        assert!((triplet[2] - 6.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn verify_scfsi_parts() {
        // MPEG1 Layer 2, 192 kbps, 44.1 kHz, mono. Allocation table 3-B.2b.
        let header = parse_frame_header(0xfffda0c0).unwrap();
        let table = find_alloc_table(&header);

        let mut bw = BitWriter::new();

        // Sub-band 0 uses the 3 level quantizer. Every other sub-band is silent.
        bw.put(1, 4);
        for sb in 1..table.sblimit {
            bw.put(0, u32::from(table.class(sb).nbal));
        }

        // Parts 0 and 1 share scale factor 1.0, part 2 uses 2.0.
        bw.put(1, 2);
        bw.put(3, 6).put(0, 6);

        for _ in 0..12 {
            bw.put(11, 5);
        }

        bw.pad_to(header.frame_size);

        let mut bs = BitReaderLtr::new(&bw.buf);
        let mut samples = [[0f32; SLOTS * SUB_BANDS]; 2];

        read_samples(&mut bs, &header, &mut samples).unwrap();

        for gr in 0..12 {
            let scale = if gr < 8 { 1.0 } else { 2.0 };

            assert!((samples[0][3 * gr] - scale * 2.0 / 3.0).abs() < 1e-5);
            assert!((samples[0][3 * gr + 1] + scale * 2.0 / 3.0).abs() < 1e-5);
            assert!(samples[0][3 * gr + 2].abs() < 1e-5);
        }

        assert!(samples[0][SLOTS..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_forbidden_bitrate_mode() {
        // MPEG1 Layer 2, 384 kbps, 44.1 kHz, mono.
        let header = parse_frame_header(0xfffde0c0).unwrap();

        let payload = vec![0u8; header.frame_size];

        let mut layer2 = Layer2::new();
        let mut out = [[0f32; MAX_FRAME_SAMPLES]; 2];

        assert!(layer2.decode(&payload, &header, &mut out).is_err());
    }

    #[test]
    fn verify_silent_frame() {
        let header = parse_frame_header(0xfffd8000).unwrap();

        let payload = vec![0u8; header.frame_size];

        let mut layer2 = Layer2::new();
        let mut out = [[1f32; MAX_FRAME_SAMPLES]; 2];

        layer2.decode(&payload, &header, &mut out).unwrap();

        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }
}
