// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection and skipping of a leading ID3v2 tag. The tag contents are not parsed.

use arietta_core::errors::{decode_error, unsupported_error, Result};
use arietta_core::io::{MediaSourceStream, ReadBytes};

use log::debug;

/// The length of the fixed ID3v2 header, and of the optional ID3v2.4 footer.
const ID3V2_HEADER_LEN: u64 = 10;

/// The fixed header of an ID3v2 tag.
#[derive(Debug)]
pub struct Header {
    pub major_version: u8,
    pub minor_version: u8,
    /// The size of the tag in bytes, excluding the header and footer.
    pub size: u32,
    pub has_footer: bool,
}

impl Header {
    /// The number of bytes that follow the fixed header and belong to the tag.
    pub fn body_len(&self) -> u64 {
        u64::from(self.size) + if self.has_footer { ID3V2_HEADER_LEN } else { 0 }
    }
}

/// Reads a syncsafe integer of up to 32 bits. Syncsafe integers carry 7 bits per byte, with the
/// most-significant bit of every byte always clear.
fn read_syncsafe_leq32<B: ReadBytes>(reader: &mut B, bit_width: u8) -> Result<u32> {
    debug_assert!(bit_width <= 32);

    let mut result = 0u32;
    let mut bits_read = 0;

    while bits_read < bit_width {
        let next_read = (bit_width - bits_read).min(7);
        bits_read += next_read;

        let byte = reader.read_u8()?;

        if byte & 0x80 != 0 {
            return decode_error("id3v2: invalid syncsafe integer");
        }

        result |= u32::from(byte & ((1 << next_read) - 1)) << (bit_width - bits_read);
    }

    Ok(result)
}

/// Reads the fixed header of an ID3v2 tag.
pub fn read_id3v2_header<B: ReadBytes>(reader: &mut B) -> Result<Header> {
    let mut marker = [0u8; 3];
    reader.read_buf_exact(&mut marker)?;

    if marker != *b"ID3" {
        return unsupported_error("id3v2: not an ID3v2 tag");
    }

    let major_version = reader.read_u8()?;
    let minor_version = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let size = read_syncsafe_leq32(reader, 28)?;

    // Major and minor version numbers are never 0xff in a valid tag.
    if major_version == 0xff || minor_version == 0xff {
        return decode_error("id3v2: invalid version number(s)");
    }

    // The footer flag was introduced in ID3v2.4.
    let has_footer = major_version >= 4 && flags & 0x10 != 0;

    Ok(Header { major_version, minor_version, size, has_footer })
}

/// If the stream begins with an ID3v2 tag at its current position, skip the entire tag and return
/// its header. Otherwise, rewind the stream to where it was and return `None`.
pub fn skip_id3v2(reader: &mut MediaSourceStream) -> Result<Option<Header>> {
    let start = reader.pos();

    let header = match read_id3v2_header(reader) {
        Ok(header) => header,
        Err(_) => {
            reader.seek(start)?;
            return Ok(None);
        }
    };

    debug!(
        "skipping ID3v2.{}.{} tag of {} bytes",
        header.major_version,
        header.minor_version,
        header.body_len()
    );

    reader.ignore_bytes(header.body_len())?;

    Ok(Some(header))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use arietta_core::io::{MediaSourceStream, MediaSourceStreamOptions, ReadBytes};

    use super::*;

    fn stream(data: Vec<u8>) -> MediaSourceStream {
        MediaSourceStream::new(Box::new(Cursor::new(data)), MediaSourceStreamOptions::default())
    }

    #[test]
    fn verify_syncsafe() {
        let mut reader = stream(vec![0x00, 0x00, 0x02, 0x01]);
        assert_eq!(read_syncsafe_leq32(&mut reader, 28).unwrap(), 257);

        let mut reader = stream(vec![0x7f, 0x7f, 0x7f, 0x7f]);
        assert_eq!(read_syncsafe_leq32(&mut reader, 28).unwrap(), 0x0fff_ffff);

        let mut reader = stream(vec![0x00, 0x80, 0x00, 0x00]);
        assert!(read_syncsafe_leq32(&mut reader, 28).is_err());
    }

    #[test]
    fn verify_skip_tag() {
        let mut data = b"ID3\x03\x00\x00\x00\x00\x02\x01".to_vec();
        data.extend(std::iter::repeat(0xaa).take(257));
        data.push(0xff);

        let mut reader = stream(data);
        let header = skip_id3v2(&mut reader).unwrap().unwrap();

        assert_eq!(header.size, 257);
        assert_eq!(reader.pos(), 10 + 257);
        assert_eq!(reader.read_u8().unwrap(), 0xff);
    }

    #[test]
    fn verify_skip_tag_with_footer() {
        let mut data = b"ID3\x04\x00\x10\x00\x00\x00\x05".to_vec();
        data.extend(std::iter::repeat(0).take(5 + 10));
        data.push(0xff);

        let mut reader = stream(data);
        assert!(skip_id3v2(&mut reader).unwrap().is_some());
        assert_eq!(reader.pos(), 25);
    }

    #[test]
    fn verify_no_tag_rewinds() {
        let mut reader = stream(vec![0xff, 0xfb, 0x90, 0x64, 0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(skip_id3v2(&mut reader).unwrap().is_none());
        assert_eq!(reader.pos(), 0);

        // Too short to hold a tag.
        let mut reader = stream(b"ID".to_vec());
        assert!(skip_id3v2(&mut reader).unwrap().is_none());
        assert_eq!(reader.pos(), 0);
    }
}
