// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A bit packer for building synthetic frames in tests.

/// Packs bit fields most-significant bit first.
pub struct BitWriter {
    pub buf: Vec<u8>,
    n_bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter { buf: Vec::new(), n_bits: 0 }
    }

    /// Append the `width` least-significant bits of `value`.
    pub fn put(&mut self, value: u32, width: u32) -> &mut Self {
        for i in (0..width).rev() {
            if self.n_bits % 8 == 0 {
                self.buf.push(0);
            }
            if (value >> i) & 1 != 0 {
                let last = self.buf.len() - 1;
                self.buf[last] |= 0x80 >> (self.n_bits % 8);
            }
            self.n_bits += 1;
        }
        self
    }

    /// The number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.n_bits
    }

    /// Zero-pad the buffer to `len` bytes.
    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        assert!(self.buf.len() <= len);
        self.buf.resize(len, 0);
        self.n_bits = 8 * len;
        self
    }
}
