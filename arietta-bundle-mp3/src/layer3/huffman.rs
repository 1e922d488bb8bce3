// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use arietta_core::errors::{decode_error, Error, Result};
use arietta_core::io::{BitReaderLtr, ReadBitsLtr};

use log::{debug, warn};

use super::codebooks::HUFFMAN_TABLES;
use super::GranuleChannel;
use crate::common::SAMPLES_PER_GRANULE;

/// The maximum number of bits a single code word may span.
const MAX_CODE_LEN: u32 = 32;

/// Branch offsets at or above this value do not point at a child, but at a further branch node.
const CHAIN_OFFSET: u16 = 250;

/// A Layer 3 Huffman code tree and the number of extra bits read for saturated values.
pub struct HuffmanTable {
    /// The code tree in flat node form. See the `codebooks` module for the node layout.
    pub tree: &'static [u16],
    /// Number of extra bits to read if a decoded value is saturated (15).
    pub linbits: u32,
}

impl HuffmanTable {
    /// Returns true if the table encodes nothing. Values read with an empty table are all 0.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Walk the code tree of `table` one bit at a time until a leaf is reached, and return the leaf
/// value. An empty table yields 0 without reading any bits.
fn decode_code_word(bs: &mut BitReaderLtr<'_>, table: &HuffmanTable) -> Result<u8> {
    if table.is_empty() {
        return Ok(0);
    }

    let tree = table.tree;

    let mut point = 0;
    let mut bits_read = 0;

    while bits_read < MAX_CODE_LEN {
        let node = match tree.get(point) {
            Some(&node) => node,
            None => break,
        };

        // A node with no branch offsets is a leaf.
        if node & 0xff00 == 0 {
            return Ok(node as u8);
        }

        let bit = bs.read_bool()?;
        bits_read += 1;

        // Follow chained branch nodes until an offset to a real child is found.
        let mut node = node;

        loop {
            let offset = if bit { node & 0xff } else { node >> 8 };

            point += usize::from(offset);

            if offset < CHAIN_OFFSET {
                break;
            }

            node = match tree.get(point) {
                Some(&node) => node,
                None => break,
            };
        }
    }

    warn!("mp3: illegal huffman code after {} bits at node {}", bits_read, point);
    decode_error("mp3: illegal huffman code")
}

/// Read the sign bit of a non-zero magnitude and apply it.
#[inline(always)]
fn read_signed(bs: &mut BitReaderLtr<'_>, magnitude: u32) -> Result<i32> {
    let value = magnitude as i32;

    if value > 0 && bs.read_bool()? {
        Ok(-value)
    }
    else {
        Ok(value)
    }
}

/// Decode one big_values code word into the signed pair `(x, y)`.
pub(super) fn read_pair(bs: &mut BitReaderLtr<'_>, table: &HuffmanTable) -> Result<(i32, i32)> {
    let value = decode_code_word(bs, table)?;

    let mut x = u32::from(value >> 4);
    let mut y = u32::from(value & 0xf);

    // Linbits and the sign of x precede those of y.
    if table.linbits > 0 && x == 15 {
        x += bs.read_bits_leq32(table.linbits)?;
    }

    let x = read_signed(bs, x)?;

    if table.linbits > 0 && y == 15 {
        y += bs.read_bits_leq32(table.linbits)?;
    }

    let y = read_signed(bs, y)?;

    Ok((x, y))
}

/// Decode one count1 code word into the four signed values `[v, w, x, y]`, each of which is 0 or
/// +/-1.
pub(super) fn read_quad(bs: &mut BitReaderLtr<'_>, table: &HuffmanTable) -> Result<[i32; 4]> {
    let value = u32::from(decode_code_word(bs, table)?);

    let mut quad = [(value >> 3) & 1, (value >> 2) & 1, (value >> 1) & 1, value & 1]
        .map(|v| v as i32);

    for v in quad.iter_mut() {
        if *v > 0 && bs.read_bool()? {
            *v = -*v;
        }
    }

    Ok(quad)
}

/// Reads the Huffman coded spectral samples (part3) for a channel in a granule into `buf`. The
/// last bit of part3 is at `bit_pos_end`. Returns the number of samples in the big_values and
/// count1 partitions, i.e. the starting index of the rzero partition.
///
/// The samples are stored as their integer values. Requantization happens later.
pub(super) fn read_huffman_samples(
    bs: &mut BitReaderLtr<'_>,
    channel: &GranuleChannel,
    bit_pos_end: usize,
    buf: &mut [f32; SAMPLES_PER_GRANULE],
) -> Result<usize> {
    let mut i = 0;

    // The big_values field is 9 bits wide, so it may describe more than 576 samples in a broken
    // stream. Stop decoding pairs at the end of the granule rather than rejecting the frame.
    let big_values_len = min(2 * channel.big_values as usize, SAMPLES_PER_GRANULE);

    if big_values_len < 2 * channel.big_values as usize {
        warn!("mp3: big_values of {} clamped to the granule length", channel.big_values);
    }

    while i < big_values_len {
        let region = if i < channel.region1_start {
            0
        }
        else if i < channel.region2_start {
            1
        }
        else {
            2
        };

        let table = &HUFFMAN_TABLES[channel.table_select[region] as usize];

        let (x, y) = read_pair(bs, table)?;

        buf[i] = x as f32;
        buf[i + 1] = y as f32;

        i += 2;
    }

    let count1_table = &HUFFMAN_TABLES[32 + channel.count1table_select as usize];

    let mut read_quads = false;

    while i <= SAMPLES_PER_GRANULE - 4 && bs.bit_pos() <= bit_pos_end {
        let quad = match read_quad(bs, count1_table) {
            Ok(quad) => quad,
            // The main data ran out in the middle of a code word. The partial quadruple would be
            // discarded as an overrun anyway.
            Err(Error::IoError(_)) => {
                debug!("mp3: count1 code word truncated by end of main data");
                break;
            }
            Err(err) => return Err(err),
        };

        for (s, &v) in buf[i..i + 4].iter_mut().zip(quad.iter()) {
            *s = v as f32;
        }

        i += 4;
        read_quads = true;
    }

    // Reading the last quadruple crossed into the next part. Those samples are not real.
    if read_quads && bs.bit_pos() > bit_pos_end + 1 {
        debug!("mp3: count1 overrun by {} bits", bs.bit_pos() - bit_pos_end - 1);
        i -= 4;
    }

    for s in buf[i..].iter_mut() {
        *s = 0.0;
    }

    Ok(i)
}

#[cfg(test)]
mod tests {
    use arietta_core::io::{BitReaderLtr, ReadBitsLtr};

    use super::super::codebooks::HUFFMAN_TABLES;
    use super::super::GranuleChannel;
    use super::{read_huffman_samples, read_pair, read_quad, HuffmanTable};
    use crate::common::SAMPLES_PER_GRANULE;

    #[test]
    fn verify_table_1_code_words() {
        // Table 1 code words: (0,0) = 1, (1,0) = 01, (0,1) = 001, (1,1) = 000. Every non-zero
        // value is followed by a sign bit.
        //
        // 1 | 01 0 | 001 1 | 000 0 1 | 0000...
        let buf = [0b1010_0011, 0b0000_1000, 0x00];
        let mut bs = BitReaderLtr::new(&buf);

        let table = &HUFFMAN_TABLES[1];

        assert_eq!(read_pair(&mut bs, table).unwrap(), (0, 0));
        assert_eq!(read_pair(&mut bs, table).unwrap(), (1, 0));
        assert_eq!(read_pair(&mut bs, table).unwrap(), (0, -1));
        assert_eq!(read_pair(&mut bs, table).unwrap(), (1, -1));
        assert_eq!(bs.bit_pos(), 13);
    }

    #[test]
    fn verify_empty_table_reads_nothing() {
        let buf = [0xff];
        let mut bs = BitReaderLtr::new(&buf);

        assert_eq!(read_pair(&mut bs, &HUFFMAN_TABLES[0]).unwrap(), (0, 0));
        assert_eq!(read_pair(&mut bs, &HUFFMAN_TABLES[4]).unwrap(), (0, 0));
        assert_eq!(bs.bit_pos(), 0);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0xff);
    }

    #[test]
    fn verify_linbits() {
        // A single leaf tree that always decodes (15, 15) without reading any bits.
        static SATURATED: [u16; 1] = [0x00ff];

        let table = HuffmanTable { tree: &SATURATED, linbits: 2 };

        // x: linbits 10, sign 1 | y: linbits 01, sign 0
        let buf = [0b1010_1000];
        let mut bs = BitReaderLtr::new(&buf);

        assert_eq!(read_pair(&mut bs, &table).unwrap(), (-17, 16));
        assert_eq!(bs.bit_pos(), 6);
    }

    #[test]
    fn verify_quad_table_b() {
        // Table B is a fixed 4-bit code with each bit inverted. The code 1111 decodes to 0000,
        // and 0000 decodes to 1111 followed by four sign bits.
        let buf = [0b1111_0000, 0b1010_0000];
        let mut bs = BitReaderLtr::new(&buf);

        let table = &HUFFMAN_TABLES[33];

        assert_eq!(read_quad(&mut bs, table).unwrap(), [0, 0, 0, 0]);
        assert_eq!(read_quad(&mut bs, table).unwrap(), [-1, 1, -1, 1]);
        assert_eq!(bs.bit_pos(), 12);
    }

    #[test]
    fn verify_illegal_code_is_decode_error() {
        // A branch whose children fall outside the tree.
        static BROKEN: [u16; 2] = [0x0101, 0x0101];

        let table = HuffmanTable { tree: &BROKEN, linbits: 0 };

        let buf = [0u8; 8];
        let mut bs = BitReaderLtr::new(&buf);

        assert!(read_pair(&mut bs, &table).is_err());

        // A branch that loops back on itself on a 1 bit is cut off after 32 bits.
        static ENDLESS: [u16; 1] = [0x0100];

        let table = HuffmanTable { tree: &ENDLESS, linbits: 0 };

        let buf = [0xffu8; 8];
        let mut bs = BitReaderLtr::new(&buf);

        assert!(read_pair(&mut bs, &table).is_err());
    }

    #[test]
    fn verify_count1_overrun_is_discarded() {
        // Only a count1 partition, coded with table B. The code word 0111 is the quadruple
        // (1, 0, 0, 0) and is followed by a single sign bit.
        //
        // 0111 0 | 0111 0 | 000000
        let buf = [0b0111_0011, 0b1000_0000, 0x00];

        let channel = GranuleChannel { count1table_select: 1, ..Default::default() };

        // Part3 ends after the seventh bit, in the middle of the second quadruple.
        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [9.0; SAMPLES_PER_GRANULE];

        assert_eq!(read_huffman_samples(&mut bs, &channel, 6, &mut samples).unwrap(), 4);
        assert_eq!(samples[..4], [1.0, 0.0, 0.0, 0.0]);
        assert!(samples[4..].iter().all(|&s| s == 0.0));

        // Part3 ends exactly after the second quadruple, so it is kept.
        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [9.0; SAMPLES_PER_GRANULE];

        assert_eq!(read_huffman_samples(&mut bs, &channel, 9, &mut samples).unwrap(), 8);
        assert_eq!(samples[..8], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        assert!(samples[8..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_big_values_clamped_to_granule() {
        // 300 pairs would be 600 samples. Every 1 bit is the pair (0, 0) in table 1.
        let buf = [0xff; 80];

        let channel =
            GranuleChannel { big_values: 300, table_select: [1, 1, 1], ..Default::default() };

        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [9.0; SAMPLES_PER_GRANULE];

        let end = 8 * buf.len() - 1;

        assert_eq!(read_huffman_samples(&mut bs, &channel, end, &mut samples).unwrap(), 576);
        assert!(samples.iter().all(|&s| s == 0.0));

        // Decoding stopped after 288 pairs, leaving no room for count1.
        assert_eq!(bs.bit_pos(), 288);
    }
}
