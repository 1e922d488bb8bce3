// Arietta Check Tool
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, Seek, SeekFrom, Write};

/// The length of a canonical RIFF/WAVE header with a 16 byte fmt chunk.
const WAVE_HEADER_LEN: u32 = 44;

const WAVE_FORMAT_PCM: u16 = 1;

/// Writes interleaved signed 16-bit little-endian PCM as a WAVE file. The chunk sizes are patched
/// in by `finalize`.
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    data_len: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut inner: W, sample_rate: u32, n_channels: u16) -> io::Result<Self> {
        let block_align = 2 * n_channels;
        let byte_rate = sample_rate * u32::from(block_align);

        inner.write_all(b"RIFF")?;
        inner.write_all(&(WAVE_HEADER_LEN - 8).to_le_bytes())?;
        inner.write_all(b"WAVE")?;

        inner.write_all(b"fmt ")?;
        inner.write_all(&16u32.to_le_bytes())?;
        inner.write_all(&WAVE_FORMAT_PCM.to_le_bytes())?;
        inner.write_all(&n_channels.to_le_bytes())?;
        inner.write_all(&sample_rate.to_le_bytes())?;
        inner.write_all(&byte_rate.to_le_bytes())?;
        inner.write_all(&block_align.to_le_bytes())?;
        inner.write_all(&16u16.to_le_bytes())?;

        inner.write_all(b"data")?;
        inner.write_all(&0u32.to_le_bytes())?;

        Ok(WavWriter { inner, data_len: 0 })
    }

    /// Append interleaved little-endian samples.
    pub fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        self.inner.write_all(pcm)?;
        self.data_len = self.data_len.saturating_add(pcm.len() as u32);
        Ok(())
    }

    /// Patch the RIFF and data chunk sizes and return the inner writer.
    pub fn finalize(mut self) -> io::Result<W> {
        self.inner.seek(SeekFrom::Start(4))?;
        self.inner.write_all(&(WAVE_HEADER_LEN - 8).saturating_add(self.data_len).to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(u64::from(WAVE_HEADER_LEN) - 4))?;
        self.inner.write_all(&self.data_len.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn le_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn verify_wave_header() {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 44_100, 2).unwrap();
        writer.write(&[1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
        writer.write(&[5, 0, 6, 0]).unwrap();

        let buf = writer.finalize().unwrap().into_inner();

        assert_eq!(buf.len(), 44 + 12);
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(le_u32(&buf, 4), 36 + 12);
        assert_eq!(&buf[8..16], b"WAVEfmt ");
        assert_eq!(le_u32(&buf, 24), 44_100);
        // Byte rate.
        assert_eq!(le_u32(&buf, 28), 44_100 * 4);
        assert_eq!(&buf[36..40], b"data");
        assert_eq!(le_u32(&buf, 40), 12);
        assert_eq!(&buf[44..], &[1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0]);
    }
}
