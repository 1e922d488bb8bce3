// Arietta
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use arietta_core::audio::{f32_to_s16, Channels, PCM_S16_BYTES};
use arietta_core::errors::{decode_error, unsupported_error, Error, Result};
use arietta_core::io::{MediaSourceStream, ReadBytes};

use log::{debug, trace, warn};

use crate::common::*;
use crate::header::{self, MAX_SANE_FRAME_SIZE, MPEG_HEADER_LEN};
use crate::id3v2;

#[cfg(feature = "mp1")]
use crate::layer1;
#[cfg(feature = "mp2")]
use crate::layer2;
#[cfg(feature = "mp3")]
use crate::layer3;

/// `DecoderOptions` is a common set of options that all MPEG audio streams use.
#[derive(Copy, Clone, Debug)]
pub struct DecoderOptions {
    /// The maximum number of bytes that may separate the end of the first frame from the header
    /// of the frame that confirms it during initialization.
    pub max_init_skip: usize,
    /// Detect and skip an ID3v2 tag at the start of the stream.
    pub skip_id3v2: bool,
    /// Fail, instead of warn on, frames larger than the sane maximum frame size.
    pub strict_frame_size: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { max_init_skip: 2, skip_id3v2: true, strict_frame_size: false }
    }
}

/// The outcome of decoding one frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A frame was decoded and its samples are available from [`StreamHandle::pcm_bytes`].
    Ok,
    /// The frame could not be decoded. Decoding may continue with the next frame.
    Error,
    /// There are no further frames in the stream.
    Completed,
}

/// The per-layer decoder state.
enum State {
    #[cfg(feature = "mp1")]
    Layer1(layer1::Layer1),
    #[cfg(feature = "mp2")]
    Layer2(layer2::Layer2),
    #[cfg(feature = "mp3")]
    Layer3(Box<layer3::Layer3>),
}

impl State {
    fn new(layer: MpegLayer) -> Result<Self> {
        match layer {
            #[cfg(feature = "mp1")]
            MpegLayer::Layer1 => Ok(State::Layer1(layer1::Layer1::new())),
            #[cfg(feature = "mp2")]
            MpegLayer::Layer2 => Ok(State::Layer2(layer2::Layer2::new())),
            #[cfg(feature = "mp3")]
            MpegLayer::Layer3 => Ok(State::Layer3(Box::new(layer3::Layer3::new()))),
            #[allow(unreachable_patterns)]
            _ => unsupported_error("mpa: support for this layer is not enabled"),
        }
    }

    fn layer(&mut self) -> &mut dyn Layer {
        match self {
            #[cfg(feature = "mp1")]
            State::Layer1(layer) => layer,
            #[cfg(feature = "mp2")]
            State::Layer2(layer) => layer,
            #[cfg(feature = "mp3")]
            State::Layer3(layer) => layer.as_mut(),
        }
    }

    /// Discard state that may not carry over a discontinuity. Synthesis history is kept.
    fn reset(&mut self) {
        match self {
            #[cfg(feature = "mp3")]
            State::Layer3(layer) => layer.reset_resevoir(),
            #[allow(unreachable_patterns)]
            _ => (),
        }
    }
}

/// A decoding session over one MPEG audio elementary stream.
///
/// The layer, sample rate, and channel count are fixed by the first frame. Frames that disagree
/// with them are reported as errors.
pub struct StreamHandle {
    reader: MediaSourceStream,
    options: DecoderOptions,
    state: State,
    layer: MpegLayer,
    sample_rate: u32,
    channels: Channels,
    last_header: Option<FrameHeader>,
    frame_buf: Vec<u8>,
    samples: Box<FrameSamples>,
    pcm: Vec<u8>,
}

impl StreamHandle {
    /// Locate the first frame of the stream and prepare to decode it.
    ///
    /// A frame is only accepted once a second frame header is found directly after it. Returns
    /// `None` if the stream contains no such pair of frames.
    pub fn init(
        mut reader: MediaSourceStream,
        options: DecoderOptions,
    ) -> Result<Option<StreamHandle>> {
        if options.skip_id3v2 {
            id3v2::skip_id3v2(&mut reader)?;
        }

        loop {
            let word = match header::sync_frame(&mut reader, None) {
                Ok(word) => word,
                Err(Error::NoSync) => return Ok(None),
                Err(err) => return Err(err),
            };

            let frame_pos = reader.pos() - MPEG_HEADER_LEN as u64;

            if let Ok(header) = header::parse_frame_header(word) {
                if header.is_mpeg1()
                    && !header.is_free_format()
                    && confirm_frame(&mut reader, &header, options.max_init_skip)?
                {
                    reader.seek(frame_pos)?;

                    debug!(
                        "mpa: found {:?} stream at byte {}: {} Hz, {} channel(s), {} kbps",
                        header.layer,
                        frame_pos,
                        header.sample_rate,
                        header.n_channels(),
                        header.bitrate / 1000,
                    );

                    let handle = StreamHandle {
                        reader,
                        options,
                        state: State::new(header.layer)?,
                        layer: header.layer,
                        sample_rate: header.sample_rate,
                        channels: header.channel_mode.channels(),
                        last_header: None,
                        frame_buf: Vec::with_capacity(MAX_SANE_FRAME_SIZE),
                        samples: Box::new([[0.0; MAX_FRAME_SAMPLES]; 2]),
                        pcm: Vec::with_capacity(2 * MAX_FRAME_SAMPLES * PCM_S16_BYTES),
                    };

                    return Ok(Some(handle));
                }
            }

            // Not a frame. Resume the search one byte past the false sync word.
            reader.seek(frame_pos + 1)?;
        }
    }

    /// Decode the next frame and return its samples as interleaved little-endian signed 16-bit
    /// PCM. Returns `None` once no further frame can be found.
    pub fn decode_next(&mut self) -> Result<Option<&[u8]>> {
        self.pcm.clear();

        let expected_pos = self.reader.pos();

        let word = match header::sync_frame(&mut self.reader, None) {
            Ok(word) => word,
            Err(Error::NoSync) => return Ok(None),
            Err(err) => return Err(err),
        };

        let frame_pos = self.reader.pos() - MPEG_HEADER_LEN as u64;

        if frame_pos > expected_pos {
            warn!("mpa: lost sync, skipped {} bytes", frame_pos - expected_pos);
        }

        let header = header::parse_frame_header(word)?;

        trace!(
            "mpa: frame at byte {}: {:?}, {} bytes, crc={}",
            frame_pos,
            header.layer,
            header.frame_size,
            header.has_crc
        );

        self.last_header = Some(header.clone());

        if header.is_free_format() {
            return unsupported_error("mpa: free format bit-rate is not supported");
        }

        self.frame_buf.resize(header.frame_size, 0);
        self.reader.read_buf_exact(&mut self.frame_buf)?;

        if !header.is_mpeg1() {
            return unsupported_error("mpa: mpeg 2 and 2.5 are not supported");
        }

        if header.frame_size + MPEG_HEADER_LEN > MAX_SANE_FRAME_SIZE {
            if self.options.strict_frame_size {
                return decode_error("mpa: frame size exceeds the sane maximum");
            }

            warn!("mpa: frame of {} bytes exceeds the sane maximum", header.frame_size);
        }

        if header.layer != self.layer
            || header.sample_rate != self.sample_rate
            || header.channel_mode.channels() != self.channels
        {
            return decode_error("mpa: stream parameters changed");
        }

        // The CRC is not verified.
        let payload = match self.frame_buf.get(if header.has_crc { 2 } else { 0 }..) {
            Some(payload) => payload,
            None => return decode_error("mpa: frame too short for crc"),
        };

        self.state.layer().decode(payload, &header, &mut self.samples)?;

        let n_channels = header.n_channels();

        for i in 0..header.n_samples() {
            for ch in 0..n_channels {
                self.pcm.extend_from_slice(&f32_to_s16(self.samples[ch][i]).to_le_bytes());
            }
        }

        Ok(Some(self.pcm.as_slice()))
    }

    /// Decode the next frame. On `DecodeStatus::Ok` the samples are available from
    /// [`StreamHandle::pcm_bytes`] until the next call.
    pub fn decode_frame(&mut self) -> DecodeStatus {
        match self.decode_next() {
            Ok(Some(_)) => DecodeStatus::Ok,
            Ok(None) => DecodeStatus::Completed,
            Err(err) => {
                warn!("mpa: failed to decode frame: {}", err);
                DecodeStatus::Error
            }
        }
    }

    /// Reposition the stream to an absolute byte offset. Decoding resumes at the first frame
    /// found at or after the offset.
    pub fn seek(&mut self, byte_offset: u64) -> Result<()> {
        self.reader.seek(byte_offset)?;
        self.state.reset();
        self.pcm.clear();
        Ok(())
    }

    /// The samples of the last decoded frame, or an empty slice if the last frame failed.
    pub fn pcm_bytes(&self) -> &[u8] {
        &self.pcm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn n_channels(&self) -> usize {
        self.channels.count()
    }

    /// The header of the last frame read, whether or not it decoded.
    pub fn last_header(&self) -> Option<&FrameHeader> {
        self.last_header.as_ref()
    }
}

/// Skip the body of the frame described by `header` and check that a compatible frame header
/// follows within `max_skip` bytes.
fn confirm_frame(
    reader: &mut MediaSourceStream,
    header: &FrameHeader,
    max_skip: usize,
) -> Result<bool> {
    match reader.ignore_bytes(header.frame_size as u64) {
        Ok(()) => (),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(err) => return Err(err.into()),
    }

    let word = match header::sync_frame(reader, Some(max_skip)) {
        Ok(word) => word,
        Err(Error::NoSync) => return Ok(false),
        Err(err) => return Err(err),
    };

    match header::parse_frame_header(word) {
        Ok(next) => Ok(next.layer == header.layer && next.sample_rate == header.sample_rate),
        Err(_) => Ok(false),
    }
}
