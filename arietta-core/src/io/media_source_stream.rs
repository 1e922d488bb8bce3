// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek, SeekFrom};

use log::debug;

use super::{MediaSource, ReadBytes};
use crate::errors::{seek_error, Result, SeekErrorKind};

const END_OF_STREAM_ERROR_STR: &str = "end of stream";

/// `MediaSourceStreamOptions` specifies the buffering behaviour of a `MediaSourceStream`.
pub struct MediaSourceStreamOptions {
    /// The length of the ring buffer in bytes. Rounded up to a power of two of at least 2 bytes.
    /// Data is fetched from the source in blocks of half this length, and at least one block of
    /// already-read data is kept for rewinding.
    pub buffer_len: usize,
}

impl Default for MediaSourceStreamOptions {
    fn default() -> Self {
        MediaSourceStreamOptions { buffer_len: 64 * 1024 }
    }
}

/// A `MediaSourceStream` wraps any [`MediaSource`] in a ring buffer and tracks the absolute byte
/// position of the stream.
///
/// The ring retains recently read data so that seeks within it, backwards or forwards, are
/// serviced without touching the inner source. This allows short rewinds even when the inner
/// source is not seekable. All other seeks are forwarded to the inner source and discard the
/// buffer.
pub struct MediaSourceStream {
    /// The source reader.
    inner: Box<dyn MediaSource>,
    /// The ring buffer.
    ring: Box<[u8]>,
    /// The ring buffer's wrap-around mask.
    ring_mask: usize,
    /// The read position.
    read_pos: usize,
    /// The write position.
    write_pos: usize,
    /// The maximum number of bytes to fetch from the source at once.
    read_block_len: usize,
    /// Absolute position of the inner source, which corresponds to `ring[write_pos]`.
    abs_pos: u64,
    /// Number of bytes fetched since the buffer was last reset.
    rel_pos: u64,
}

impl MediaSourceStream {
    pub fn new(source: Box<dyn MediaSource>, options: MediaSourceStreamOptions) -> Self {
        let ring_len = cmp::max(2, options.buffer_len).next_power_of_two();

        MediaSourceStream {
            inner: source,
            ring: vec![0; ring_len].into_boxed_slice(),
            ring_mask: ring_len - 1,
            read_pos: 0,
            write_pos: 0,
            read_block_len: ring_len / 2,
            abs_pos: 0,
            rel_pos: 0,
        }
    }

    /// Returns if the inner source is seekable.
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// Returns the length in bytes of the inner source, if available.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Seek to an absolute byte position in the stream.
    ///
    /// If the position lies within the buffered data the seek always succeeds. Otherwise, a seek
    /// error is returned if the inner source is not seekable or the position is past its end.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        let cur = self.pos();

        if pos <= cur {
            let delta = cur - pos;

            if delta <= self.read_buffer_len() as u64 {
                self.read_pos = (self.read_pos + self.ring.len() - delta as usize) & self.ring_mask;
                return Ok(pos);
            }
        }
        else {
            let delta = pos - cur;

            if delta <= self.unread_buffer_len() as u64 {
                self.consume(delta as usize);
                return Ok(pos);
            }
        }

        if !self.inner.is_seekable() {
            return seek_error(SeekErrorKind::Unseekable);
        }

        if let Some(len) = self.inner.byte_len() {
            if pos > len {
                return seek_error(SeekErrorKind::OutOfRange);
            }
        }

        debug!("seeking source to byte {}", pos);

        let abs_pos = self.inner.seek(SeekFrom::Start(pos))?;
        self.reset(abs_pos);

        Ok(abs_pos)
    }

    /// Discard all buffered data and set the absolute position of the inner source.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.abs_pos = pos;
        self.rel_pos = 0;
    }

    /// Returns the number of buffered bytes that have not been read yet.
    #[inline(always)]
    fn unread_buffer_len(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        }
        else {
            self.write_pos + (self.ring.len() - self.read_pos)
        }
    }

    /// Returns the number of buffered bytes that have already been read and may be rewound to.
    #[inline(always)]
    fn read_buffer_len(&self) -> usize {
        let buffered = cmp::min(self.ring.len() as u64, self.rel_pos) as usize;
        buffered - self.unread_buffer_len()
    }

    /// If the buffer has been exhausted, fetch a new block of data to replenish it. If no more data
    /// could be fetched, return an end-of-stream error.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        if self.read_pos == self.write_pos {
            // Never fetch across the end of the ring, the next fetch continues from index 0.
            let end = cmp::min(self.write_pos + self.read_block_len, self.ring.len());

            let len = loop {
                match self.inner.read(&mut self.ring[self.write_pos..end]) {
                    Ok(len) => break len,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };

            if len == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
            }

            self.write_pos = (self.write_pos + len) & self.ring_mask;
            self.abs_pos += len as u64;
            self.rel_pos += len as u64;
        }

        Ok(())
    }

    /// Returns the contiguous run of unread bytes starting at the read position.
    #[inline(always)]
    fn contiguous_buf(&self) -> &[u8] {
        if self.write_pos >= self.read_pos {
            &self.ring[self.read_pos..self.write_pos]
        }
        else {
            &self.ring[self.read_pos..]
        }
    }

    /// Advance the read position by `len` unread bytes.
    #[inline(always)]
    fn consume(&mut self, len: usize) {
        self.read_pos = (self.read_pos + len) & self.ring_mask;
    }
}

impl ReadBytes for MediaSourceStream {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        self.fetch_or_eof()?;

        let value = self.ring[self.read_pos];
        self.consume(1);

        Ok(value)
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.fetch_or_eof()?;

            let src = self.contiguous_buf();
            let count = cmp::min(buf.len(), src.len());

            buf[..count].copy_from_slice(&src[..count]);
            self.consume(count);

            buf = &mut buf[count..];
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, mut count: u64) -> io::Result<()> {
        while count > 0 {
            self.fetch_or_eof()?;

            let skip = cmp::min(count, self.contiguous_buf().len() as u64);

            self.consume(skip as usize);
            count -= skip;
        }

        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.abs_pos - self.unread_buffer_len() as u64
    }
}
