// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for handling the metadata layer of FLAC files
//!
//! This covers everything that precedes a FLAC file's
//! compressed audio frames: the ordered sequence of
//! metadata blocks, the rules governing their order
//! and uniqueness, and the machinery for rewriting
//! them in-place or by rebuilding the whole file.
//!
//! It also handles foreign RIFF WAVE and AIFF chunks
//! which may be stored in APPLICATION blocks,
//! so that such files can be converted to FLAC
//! and back again losslessly.
//!
//! Compressing and decompressing audio frames themselves
//! is delegated to an [`codec::AudioCodec`] implementation.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use metadata::BlockType;

pub mod codec;
pub mod file;
pub mod foreign;
pub mod metadata;
pub mod ogg;
mod options;
pub mod update;

pub use options::Options;

/// A unified error type for all operations
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A general I/O error from the underlying stream
    Io(std::io::Error),
    /// A UTF-8 formatting error
    Utf8(std::string::FromUtf8Error),
    /// A FLAC file missing its initial "fLaC" file tag
    MissingFlacTag,
    /// A FLAC file missing its initial STREAMINFO block
    MissingStreaminfo,
    /// A FLAC file containing multiple STREAMINFO blocks
    MultipleStreaminfo,
    /// A FLAC file containing multiple SEEKTABLE blocks
    MultipleSeekTable,
    /// A FLAC file containing multiple VORBIS_COMMENT blocks
    MultipleVorbisComment,
    /// A FLAC file containing multiple CUESHEET blocks
    MultipleCuesheet,
    /// A metadata block with a reserved type code
    ReservedMetadataBlock(u8),
    /// A metadata block with the invalid type code 127
    InvalidMetadataBlock,
    /// A metadata block ended before all of its fields could be read
    TruncatedBlock {
        /// The block being read
        block_type: BlockType,
        /// The block's declared size, in bytes
        size: u32,
    },
    /// A metadata block's contents didn't match its declared size
    InvalidMetadataBlockSize {
        /// The block being read
        block_type: BlockType,
        /// The block's declared size, in bytes
        size: u32,
        /// The number of bytes actually consumed by its fields
        consumed: u32,
    },
    /// A SEEKTABLE block whose size isn't evenly divisible by 18
    InvalidSeekTableSize,
    /// An APPLICATION block too small to hold its ID
    InsufficientApplicationBlock,
    /// A CUESHEET block with no lead-out track
    CuesheetMissingLeadOut,
    /// A CUESHEET with too many tracks or index points
    ExcessiveCuesheetEntries,
    /// A PICTURE block with an undefined type
    InvalidPictureType,
    /// A metadata block too large to fit in a 24-bit size field
    ExcessiveBlockSize,
    /// A string too large to fit in a 32-bit length field
    ExcessiveStringLength,
    /// Too many Vorbis comment entries
    ExcessiveVorbisEntries,
    /// Picture data too large to fit in a 32-bit length field
    ExcessivePictureSize,
    /// An Ogg FLAC header packet that isn't valid
    InvalidOggHeader,
    /// A foreign RIFF WAVE or AIFF container with an invalid chunk layout
    InvalidChunkLayout(foreign::ChunkError),
    /// The FLAC file has no foreign chunks of the requested format
    NoForeignChunks,
    /// A foreign container's recorded size disagrees with its actual size
    ForeignContainerMismatch {
        /// Size recorded in the container
        expected: u64,
        /// Size actually assembled
        actual: u64,
    },
    /// An error from the external audio codec
    Codec(Box<dyn std::error::Error + Send + Sync>),
}

/// Broad categories of errors
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Bad file signature, invalid block type, short reads
    MalformedInput,
    /// Missing, duplicate or misordered blocks
    StructuralDefect,
    /// Disk full, missing file, insufficient permissions
    IoFailure,
    /// Foreign container sizes that don't add up
    ForeignContainerMismatch,
    /// Failure reported by the audio codec
    Codec,
}

impl Error {
    /// Returns the broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::MissingStreaminfo
            | Self::MultipleStreaminfo
            | Self::MultipleSeekTable
            | Self::MultipleVorbisComment
            | Self::MultipleCuesheet
            | Self::ExcessiveBlockSize
            | Self::ExcessiveStringLength
            | Self::ExcessiveVorbisEntries
            | Self::ExcessivePictureSize
            | Self::ExcessiveCuesheetEntries
            | Self::NoForeignChunks => ErrorKind::StructuralDefect,
            Self::ForeignContainerMismatch { .. } => ErrorKind::ForeignContainerMismatch,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Utf8(_)
            | Self::MissingFlacTag
            | Self::ReservedMetadataBlock(_)
            | Self::InvalidMetadataBlock
            | Self::TruncatedBlock { .. }
            | Self::InvalidMetadataBlockSize { .. }
            | Self::InvalidSeekTableSize
            | Self::InsufficientApplicationBlock
            | Self::CuesheetMissingLeadOut
            | Self::InvalidPictureType
            | Self::InvalidOggHeader
            | Self::InvalidChunkLayout(_) => ErrorKind::MalformedInput,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl From<foreign::ChunkError> for Error {
    fn from(error: foreign::ChunkError) -> Self {
        Self::InvalidChunkLayout(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Utf8(e) => Some(e),
            Self::InvalidChunkLayout(e) => Some(e),
            Self::Codec(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::MissingFlacTag => "missing FLAC tag".fmt(f),
            Self::MissingStreaminfo => "STREAMINFO block not first in file".fmt(f),
            Self::MultipleStreaminfo => "multiple STREAMINFO blocks found in file".fmt(f),
            Self::MultipleSeekTable => "multiple SEEKTABLE blocks found in file".fmt(f),
            Self::MultipleVorbisComment => {
                "multiple VORBIS_COMMENT blocks found in file".fmt(f)
            }
            Self::MultipleCuesheet => "multiple CUESHEET blocks found in file".fmt(f),
            Self::ReservedMetadataBlock(t) => write!(f, "reserved metadata block type {t}"),
            Self::InvalidMetadataBlock => "invalid metadata block".fmt(f),
            Self::TruncatedBlock { block_type, size } => {
                write!(f, "{block_type} block truncated (declared size {size} bytes)")
            }
            Self::InvalidMetadataBlockSize {
                block_type,
                size,
                consumed,
            } => write!(
                f,
                "{block_type} block declared {size} bytes but contents used {consumed}"
            ),
            Self::InvalidSeekTableSize => "invalid SEEKTABLE block size".fmt(f),
            Self::InsufficientApplicationBlock => "APPLICATION block too small for data".fmt(f),
            Self::CuesheetMissingLeadOut => "CUESHEET block has no lead-out track".fmt(f),
            Self::ExcessiveCuesheetEntries => "too many CUESHEET tracks or index points".fmt(f),
            Self::InvalidPictureType => "reserved PICTURE type".fmt(f),
            Self::ExcessiveBlockSize => "metadata block too large".fmt(f),
            Self::ExcessiveStringLength => "string too large".fmt(f),
            Self::ExcessiveVorbisEntries => "too many Vorbis comment entries".fmt(f),
            Self::ExcessivePictureSize => "picture data too large".fmt(f),
            Self::InvalidOggHeader => "invalid Ogg FLAC header packet".fmt(f),
            Self::InvalidChunkLayout(e) => e.fmt(f),
            Self::NoForeignChunks => "no foreign chunks found".fmt(f),
            Self::ForeignContainerMismatch { expected, actual } => write!(
                f,
                "foreign container size mismatch (expected {expected} bytes, got {actual})"
            ),
            Self::Codec(e) => write!(f, "codec error : {e}"),
        }
    }
}

/// A wrapper around a stream which counts the bytes passing through it
#[derive(Debug)]
pub(crate) struct Counter<S> {
    pub stream: S,
    pub count: u64,
}

impl<S> Counter<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, count: 0 }
    }
}

impl<R: std::io::Read> std::io::Read for Counter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).inspect(|amt_read| {
            self.count += *amt_read as u64;
        })
    }
}

impl<W: std::io::Write> std::io::Write for Counter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf).inspect(|amt_written| {
            self.count += *amt_written as u64;
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
