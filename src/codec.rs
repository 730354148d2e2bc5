// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The interface to an external FLAC frame codec
//!
//! This crate never compresses or decompresses audio itself.
//! Operations which need to, such as recalculating a stream's MD5 sum
//! or converting a RIFF WAVE file to FLAC, are handed an
//! [`AudioCodec`] which does that work on their behalf.
//!
//! PCM samples passed to and from the codec are always signed,
//! little-endian and byte-aligned, interleaved by channel.
//! That is the same layout a FLAC stream's MD5 sum is calculated over.

use crate::Error;
use crate::metadata::Streaminfo;
use std::num::NonZero;

/// The size of a single encoded FLAC frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameSize {
    /// The frame's size in bytes, including its header and footer
    pub bytes: u32,
    /// The number of channel-independent samples in the frame
    pub samples: u16,
}

/// The layout of a PCM stream
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PcmFormat {
    /// Sample rate, in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: NonZero<u8>,
    /// Bits per sample
    pub bits_per_sample: NonZero<u8>,
}

impl PcmFormat {
    /// The size of a single PCM frame across all channels, in bytes
    pub fn bytes_per_frame(&self) -> u64 {
        u64::from(self.channels.get()) * u64::from(self.bits_per_sample.get().div_ceil(8))
    }
}

impl From<&Streaminfo> for PcmFormat {
    fn from(streaminfo: &Streaminfo) -> Self {
        Self {
            sample_rate: streaminfo.sample_rate,
            channels: streaminfo.channels,
            bits_per_sample: streaminfo.bits_per_sample,
        }
    }
}

/// The result of encoding a PCM stream
#[derive(Clone, Debug)]
pub struct Encoded {
    /// The encoded stream's STREAMINFO block
    pub streaminfo: Streaminfo,
    /// The sizes of all the frames written, in order
    pub frames: Vec<FrameSize>,
}

/// A FLAC frame encoder and decoder
///
/// Implementations are expected to report their own failures
/// as [`Error::Codec`].
pub trait AudioCodec {
    /// Decodes FLAC frames to PCM samples
    ///
    /// `frames` is positioned at the first frame,
    /// just past the final metadata block,
    /// and `streaminfo` describes the stream being decoded.
    ///
    /// Returns the sizes of all the frames decoded.
    fn decode(
        &self,
        frames: &mut dyn std::io::Read,
        streaminfo: &Streaminfo,
        pcm: &mut dyn std::io::Write,
    ) -> Result<Vec<FrameSize>, Error>;

    /// Encodes PCM samples to FLAC frames
    ///
    /// Only the frames themselves are written,
    /// not the "fLaC" tag nor any metadata blocks.
    fn encode(
        &self,
        pcm: &mut dyn std::io::Read,
        format: &PcmFormat,
        frames: &mut dyn std::io::Write,
    ) -> Result<Encoded, Error>;
}
