// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;
use std::io;

fn end_of_bitstream_error<T>() -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of bitstream"))
}

mod private {
    use std::io;

    pub trait FetchBitsLtr {
        /// Discard any remaining bits in the source and fetch new bits.
        fn fetch_bits(&mut self) -> io::Result<()>;

        /// Get all the bits in the source.
        fn get_bits(&self) -> u64;

        /// Get the number of bits left in the source.
        fn num_bits_left(&self) -> u32;

        /// Consume `num` bits from the source.
        fn consume_bits(&mut self, num: u32);
    }
}

/// `ReadBitsLtr` reads bits from most-significant to least-significant.
pub trait ReadBitsLtr: private::FetchBitsLtr {
    /// Discards any saved bits and resets the reader to prepare it for a byte-aligned read.
    #[inline(always)]
    fn realign(&mut self) {
        let skip = self.num_bits_left() & 0x7;
        self.consume_bits(skip);
    }

    /// Ignores the specified number of bits from the stream or returns an error.
    #[inline(always)]
    fn ignore_bits(&mut self, mut num_bits: u32) -> io::Result<()> {
        if num_bits <= self.num_bits_left() {
            self.consume_bits(num_bits);
        }
        else {
            // Consume whole bit caches directly.
            while num_bits > self.num_bits_left() {
                num_bits -= self.num_bits_left();
                self.fetch_bits()?;
            }

            if num_bits > 0 {
                // Shift out in two parts to prevent panicing when num_bits == 64.
                self.consume_bits(num_bits - 1);
                self.consume_bits(1);
            }
        }

        Ok(())
    }

    /// Read a single bit as a boolean value or returns an error.
    #[inline(always)]
    fn read_bool(&mut self) -> io::Result<bool> {
        if self.num_bits_left() < 1 {
            self.fetch_bits()?;
        }

        let bit = self.get_bits() & (1 << 63) != 0;

        self.consume_bits(1);
        Ok(bit)
    }

    /// Reads and returns a single bit or returns an error.
    #[inline(always)]
    fn read_bit(&mut self) -> io::Result<u32> {
        Ok(u32::from(self.read_bool()?))
    }

    /// Reads up to 32-bits and interprets them as an unsigned integer or returns an error.
    #[inline(always)]
    fn read_bits_leq32(&mut self, mut bit_width: u32) -> io::Result<u32> {
        debug_assert!(bit_width <= u32::BITS);

        // Shift in two 32-bit operations instead of a single 64-bit operation to avoid panicing
        // when bit_width == 0 (and thus shifting right 64-bits).
        let mut bits = (self.get_bits() >> u32::BITS) >> (u32::BITS - bit_width);

        while bit_width > self.num_bits_left() {
            bit_width -= self.num_bits_left();

            self.fetch_bits()?;

            // Unlike the first shift, bit_width is always > 0 here so this operation will never
            // shift by > 63 bits.
            bits |= self.get_bits() >> (u64::BITS - bit_width);
        }

        self.consume_bits(bit_width);

        Ok(bits as u32)
    }
}

/// `BitReaderLtr` reads bits from most-significant to least-significant from any `&[u8]`.
///
/// In addition to sequential reads, the reader can report and restore its absolute bit position
/// within the original buffer.
pub struct BitReaderLtr<'a> {
    origin: &'a [u8],
    buf: &'a [u8],
    bits: u64,
    n_bits_left: u32,
}

impl<'a> BitReaderLtr<'a> {
    /// Instantiate a new `BitReaderLtr` with the given buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        BitReaderLtr { origin: buf, buf, bits: 0, n_bits_left: 0 }
    }

    /// Gets the absolute position, in bits, of the next bit to be read.
    #[inline(always)]
    pub fn bit_pos(&self) -> usize {
        8 * (self.origin.len() - self.buf.len()) - self.n_bits_left as usize
    }

    /// Repositions the reader to the absolute bit position `pos`. Positioning past the end of the
    /// buffer is permitted, in which case the next read will fail.
    pub fn seek_bits(&mut self, pos: usize) {
        let byte_pos = min(pos >> 3, self.origin.len());

        self.buf = &self.origin[byte_pos..];
        self.bits = 0;
        self.n_bits_left = 0;

        let rem = if byte_pos == pos >> 3 { (pos & 0x7) as u32 } else { 0 };

        if rem > 0 && self.ignore_bits(rem).is_err() {
            // The buffer was exhausted. Leave the reader at the end.
            self.buf = &self.origin[self.origin.len()..];
        }
    }
}

impl private::FetchBitsLtr for BitReaderLtr<'_> {
    fn fetch_bits(&mut self) -> io::Result<()> {
        let mut buf = [0u8; std::mem::size_of::<u64>()];

        let read_len = min(self.buf.len(), std::mem::size_of::<u64>());

        if read_len == 0 {
            return end_of_bitstream_error();
        }

        buf[..read_len].copy_from_slice(&self.buf[..read_len]);

        self.buf = &self.buf[read_len..];

        self.bits = u64::from_be_bytes(buf);
        self.n_bits_left = (read_len as u32) << 3;

        Ok(())
    }

    #[inline(always)]
    fn get_bits(&self) -> u64 {
        self.bits
    }

    #[inline(always)]
    fn num_bits_left(&self) -> u32 {
        self.n_bits_left
    }

    #[inline(always)]
    fn consume_bits(&mut self, num: u32) {
        self.n_bits_left -= num;
        self.bits <<= num;
    }
}

impl ReadBitsLtr for BitReaderLtr<'_> {}

#[cfg(test)]
mod tests {
    use super::{BitReaderLtr, ReadBitsLtr};

    #[test]
    fn verify_bitreaderltr_read_bool() {
        // General tests.
        let mut bs = BitReaderLtr::new(&[0b1010_1010]);

        assert!(bs.read_bool().unwrap());
        assert!(!bs.read_bool().unwrap());
        assert!(bs.read_bool().unwrap());
        assert!(!bs.read_bool().unwrap());
        assert!(bs.read_bool().unwrap());
        assert!(!bs.read_bool().unwrap());
        assert!(bs.read_bool().unwrap());
        assert!(!bs.read_bool().unwrap());

        // Error test.
        let mut bs = BitReaderLtr::new(&[]);

        assert!(bs.read_bool().is_err());
    }

    #[test]
    fn verify_bitreaderltr_read_bits_leq32() {
        // General tests.
        let mut bs = BitReaderLtr::new(&[0b1010_0101, 0b0111_1110, 0b1101_0011]);

        assert_eq!(bs.read_bits_leq32(4).unwrap(), 0b0000_0000_0000_1010);
        assert_eq!(bs.read_bits_leq32(4).unwrap(), 0b0000_0000_0000_0101);
        assert_eq!(bs.read_bits_leq32(13).unwrap(), 0b0000_1111_1101_1010);
        assert_eq!(bs.read_bits_leq32(3).unwrap(), 0b0000_0000_0000_0011);

        // Lower limit test.
        let mut bs = BitReaderLtr::new(&[0xff, 0xff, 0xff, 0xff]);

        assert_eq!(bs.read_bits_leq32(0).unwrap(), 0);

        // Upper limit test.
        let mut bs = BitReaderLtr::new(&[0xff, 0xff, 0xff, 0xff, 0x01]);

        assert_eq!(bs.read_bits_leq32(32).unwrap(), u32::MAX);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0x01);

        // Cache fetch test.
        let mut bs = BitReaderLtr::new(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01]);

        assert_eq!(bs.read_bits_leq32(28).unwrap(), 0x0012_3456);
        assert_eq!(bs.read_bits_leq32(28).unwrap(), 0x0789_abcd);
        assert_eq!(bs.read_bits_leq32(16).unwrap(), 0xef01);

        // Error test.
        let mut bs = BitReaderLtr::new(&[0xff]);

        assert!(bs.read_bits_leq32(9).is_err());
    }

    #[test]
    fn verify_bitreaderltr_ignore_bits_and_realign() {
        let mut bs = BitReaderLtr::new(&[0b1111_0000, 0b0000_1111, 0b1010_0101]);

        bs.ignore_bits(4).unwrap();
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0);
        assert_eq!(bs.bit_pos(), 12);

        bs.realign();
        assert_eq!(bs.bit_pos(), 16);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0b1010_0101);
        assert_eq!(bs.bit_pos(), 24);

        assert!(bs.ignore_bits(1).is_err());
    }

    #[test]
    fn verify_bitreaderltr_bit_pos_and_seek() {
        let data = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x55, 0xaa];
        let mut bs = BitReaderLtr::new(&data);

        assert_eq!(bs.bit_pos(), 0);
        bs.read_bits_leq32(3).unwrap();
        assert_eq!(bs.bit_pos(), 3);
        bs.read_bits_leq32(30).unwrap();
        assert_eq!(bs.bit_pos(), 33);

        // Rewind into the middle of a byte.
        bs.seek_bits(12);
        assert_eq!(bs.bit_pos(), 12);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0x34);

        // Forward into the second cache block.
        bs.seek_bits(64);
        assert_eq!(bs.read_bits_leq32(16).unwrap(), 0x55aa);
        assert!(bs.read_bool().is_err());

        // Seeking past the end leaves the reader exhausted.
        bs.seek_bits(1000);
        assert_eq!(bs.bit_pos(), 80);
        assert!(bs.read_bool().is_err());
    }
}
