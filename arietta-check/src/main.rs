// Arietta Check Tool
// Copyright (c) 2024 The Project Arietta Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use arietta_bundle_mp3::{DecodeStatus, DecoderOptions, StreamHandle};
use arietta_core::errors::Result;
use arietta_core::io::{MediaSource, MediaSourceStream, ReadOnlySource};

use clap::Parser;
use log::info;

mod wav;

use wav::WavWriter;

/// Decode an MPEG audio stream and optionally check it against a reference decoding.
#[derive(Parser, Debug)]
#[command(name = "arietta-check", version, about)]
struct Args {
    /// Write the decoded audio to this file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write raw interleaved signed 16-bit little-endian samples instead of WAVE
    #[arg(long)]
    raw: bool,

    /// A raw interleaved signed 16-bit little-endian reference decoding to compare against
    #[arg(long, short)]
    reference: Option<PathBuf>,

    /// The maximum allowable absolute difference between a decoded and a reference sample
    #[arg(long, short, default_value_t = 1)]
    tolerance: u16,

    /// Only print the results
    #[arg(long, short)]
    quiet: bool,

    /// The input file path, or - to read from standard input
    input: PathBuf,
}

enum Sink {
    Wav(WavWriter<BufWriter<File>>),
    Raw(BufWriter<File>),
}

impl Sink {
    fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        match self {
            Sink::Wav(writer) => writer.write(pcm),
            Sink::Raw(writer) => writer.write_all(pcm),
        }
    }

    fn finalize(self) -> io::Result<()> {
        match self {
            Sink::Wav(writer) => writer.finalize().map(|_| ()),
            Sink::Raw(mut writer) => writer.flush(),
        }
    }
}

#[derive(Default)]
struct CheckResult {
    n_frames: u64,
    n_error_frames: u64,
    n_samples: u64,
    n_failed_samples: u64,
    n_failed_frames: u64,
    abs_max_delta: u32,
    tgt_unchecked_samples: u64,
    ref_unchecked_samples: u64,
}

impl CheckResult {
    fn is_mismatch(&self) -> bool {
        self.n_failed_samples > 0
            || self.tgt_unchecked_samples > 0
            || self.ref_unchecked_samples > 0
    }
}

/// Compare the decoded samples of one frame with the reference samples. Returns the number of
/// samples that differ by more than the tolerance.
fn compare(tgt: &[u8], reference: &[u8], tolerance: u16, res: &mut CheckResult) -> u64 {
    let mut n_failed = 0;

    for (t, r) in tgt.chunks_exact(2).zip(reference.chunks_exact(2)) {
        let t = i16::from_le_bytes([t[0], t[1]]);
        let r = i16::from_le_bytes([r[0], r[1]]);

        let delta = (i32::from(t) - i32::from(r)).unsigned_abs();

        if delta > u32::from(tolerance) {
            n_failed += 1;
        }

        res.abs_max_delta = res.abs_max_delta.max(delta);
        res.n_samples += 1;
    }

    res.n_failed_samples += n_failed;
    n_failed
}

/// Read as many bytes as are available, up to the length of `buf`.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut len = 0;

    while len < buf.len() {
        match reader.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(len)
}

fn run_check(handle: &mut StreamHandle, args: &Args, res: &mut CheckResult) -> Result<()> {
    let mut sink = match &args.output {
        Some(path) if args.raw => Some(Sink::Raw(BufWriter::new(File::create(path)?))),
        Some(path) => Some(Sink::Wav(WavWriter::new(
            BufWriter::new(File::create(path)?),
            handle.sample_rate(),
            handle.n_channels() as u16,
        )?)),
        None => None,
    };

    let mut reference = match &args.reference {
        Some(path) => Some(BufReader::new(File::open(path)?)),
        None => None,
    };

    let mut ref_buf = Vec::new();

    loop {
        match handle.decode_frame() {
            DecodeStatus::Ok => (),
            DecodeStatus::Error => {
                res.n_frames += 1;
                res.n_error_frames += 1;
                continue;
            }
            DecodeStatus::Completed => break,
        }

        let pcm = handle.pcm_bytes();

        if let Some(sink) = sink.as_mut() {
            sink.write(pcm)?;
        }

        if let Some(reference) = reference.as_mut() {
            ref_buf.resize(pcm.len(), 0);
            let len = read_up_to(reference, &mut ref_buf)?;

            let n_failed = compare(pcm, &ref_buf[..len], args.tolerance, res);

            if n_failed > 0 {
                res.n_failed_frames += 1;

                if !args.quiet {
                    println!("[FAIL] frame={:>8}, failed samples={:>6}", res.n_frames, n_failed);
                }
            }

            res.tgt_unchecked_samples += ((pcm.len() - len) / 2) as u64;
        }

        res.n_frames += 1;
    }

    if let Some(mut reference) = reference {
        let n_bytes = io::copy(&mut reference, &mut io::sink())?;
        res.ref_unchecked_samples = n_bytes / 2;
    }

    if let Some(sink) = sink {
        sink.finalize()?;
    }

    Ok(())
}

fn main() {
    pretty_env_logger::init();

    let args = Args::parse();

    if !args.quiet {
        println!("Input Path: {}", args.input.display());
        println!();
    }

    let source: Box<dyn MediaSource> = if args.input.as_os_str() == "-" {
        Box::new(ReadOnlySource::new(io::stdin()))
    }
    else {
        match File::open(&args.input) {
            Ok(file) => Box::new(file),
            Err(err) => {
                eprintln!("Failed to open input: {}", err);
                std::process::exit(2);
            }
        }
    };

    let mss = MediaSourceStream::new(source, Default::default());

    let mut handle = match StreamHandle::init(mss, DecoderOptions::default()) {
        Ok(Some(handle)) => handle,
        Ok(None) => {
            eprintln!("No MPEG audio stream found");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("Failed to open stream: {}", err);
            std::process::exit(2);
        }
    };

    info!("stream has sample_rate={}, channels={}", handle.sample_rate(), handle.n_channels());

    let mut res: CheckResult = Default::default();

    if let Err(err) = run_check(&mut handle, &args, &mut res) {
        eprintln!("Check interrupted by error: {}", err);
        std::process::exit(2);
    }

    if !args.quiet {
        println!();
    }

    println!("Results");
    println!("=================================================");
    println!();
    println!("  Failed/Total Frames:  {:>12}/{:>12}", res.n_error_frames, res.n_frames);

    if args.reference.is_none() {
        println!();
        std::process::exit(0);
    }

    println!("  Mismatched Frames:    {:>12}", res.n_failed_frames);
    println!("  Failed/Total Samples: {:>12}/{:>12}", res.n_failed_samples, res.n_samples);
    println!("  Unchecked Samples:    {:>12} (decoded)", res.tgt_unchecked_samples);
    println!("                        {:>12} (reference)", res.ref_unchecked_samples);
    println!();
    println!("  Absolute Maximum Sample Delta: {}", res.abs_max_delta);
    println!();

    let ret = if res.is_mismatch() {
        println!("FAIL");
        1
    }
    else {
        println!("PASS");
        0
    };
    println!();

    std::process::exit(ret);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn verify_compare_within_tolerance() {
        let mut res = CheckResult::default();

        let n_failed = compare(&s16(&[0, 100, -100]), &s16(&[1, 99, -100]), 1, &mut res);

        assert_eq!(n_failed, 0);
        assert_eq!(res.n_samples, 3);
        assert_eq!(res.abs_max_delta, 1);
        assert!(!res.is_mismatch());
    }

    #[test]
    fn verify_compare_extremes() {
        let mut res = CheckResult::default();

        let n_failed = compare(&s16(&[i16::MAX, 5]), &s16(&[i16::MIN, 5]), 1, &mut res);

        assert_eq!(n_failed, 1);
        assert_eq!(res.abs_max_delta, 65535);
        assert!(res.is_mismatch());
    }

    #[test]
    fn verify_compare_short_reference() {
        let mut res = CheckResult::default();

        compare(&s16(&[1, 2, 3]), &s16(&[1]), 0, &mut res);

        assert_eq!(res.n_samples, 1);
        assert_eq!(res.n_failed_samples, 0);
    }

    #[test]
    fn verify_read_up_to() {
        let mut reader: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];

        assert_eq!(read_up_to(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(read_up_to(&mut reader, &mut buf).unwrap(), 0);
    }
}
