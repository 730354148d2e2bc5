// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For storing RIFF WAVE and AIFF chunks in FLAC files
//!
//! A RIFF WAVE or AIFF file is a sequence of chunks,
//! one of which holds the file's PCM samples.
//! Everything before those samples is the file's "header"
//! and everything after is its "footer".
//!
//! When converting such a file to FLAC, the header and footer
//! are split into their individual chunks and each is stored
//! in its own APPLICATION block, tagged `riff` or `aiff`.
//! The original file can then be restored byte-for-byte
//! by concatenating those blocks around the decoded samples.
//!
//! ```text
//! ┌──────┬──────┬───────────┬──────┬┄┄┄┄┄┄┄┄┄┄┄┄┄┬──────┐
//! │ RIFF │ fmt  │ data size │ LIST ┆ PCM samples ┆ cue  │ RIFF WAVE
//! └──────┴──────┴───────────┴──────┴┄┄┄┄┄┄┄┄┄┄┄┄┄┴──────┘
//!  ╰────────── header ──────────╯                ╰footer╯
//! ```

use crate::Error;
use crate::codec::PcmFormat;
use crate::metadata::{Application, BlockList};
use bitstream_io::{BigEndian, ByteRead, ByteReader, LittleEndian};
use std::num::NonZero;

/// A foreign container format
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ForeignFormat {
    /// RIFF WAVE, with little-endian chunk sizes
    Riff,
    /// AIFF, with big-endian chunk sizes
    Aiff,
}

impl ForeignFormat {
    /// Identifies format from a file's first four bytes
    ///
    /// ```
    /// use flac_meta::foreign::ForeignFormat;
    ///
    /// assert_eq!(ForeignFormat::identify(*b"RIFF"), Some(ForeignFormat::Riff));
    /// assert_eq!(ForeignFormat::identify(*b"FORM"), Some(ForeignFormat::Aiff));
    /// assert_eq!(ForeignFormat::identify(*b"fLaC"), None);
    /// ```
    pub fn identify(tag: [u8; 4]) -> Option<Self> {
        [Self::Riff, Self::Aiff]
            .into_iter()
            .find(|format| format.container_ids().0 == &tag)
    }

    /// The APPLICATION block ID chunks of this format are stored under
    pub fn application_id(self) -> u32 {
        match self {
            Self::Riff => Application::RIFF,
            Self::Aiff => Application::AIFF,
        }
    }

    // outermost chunk ID and form type
    fn container_ids(self) -> (&'static [u8; 4], &'static [u8; 4]) {
        match self {
            Self::Riff => (b"RIFF", b"WAVE"),
            Self::Aiff => (b"FORM", b"AIFF"),
        }
    }

    // the chunk holding PCM samples
    fn payload_id(self) -> &'static [u8; 4] {
        match self {
            Self::Riff => b"data",
            Self::Aiff => b"SSND",
        }
    }

    // the chunk describing the PCM samples, which may occur only once
    fn descriptor_id(self) -> &'static [u8; 4] {
        match self {
            Self::Riff => b"fmt ",
            Self::Aiff => b"COMM",
        }
    }

    // bytes between the payload chunk's header and its samples
    fn payload_offset(self) -> usize {
        match self {
            Self::Riff => 0,
            // SSND offset and block size fields
            Self::Aiff => 8,
        }
    }

    fn chunk_size(self, size: [u8; 4]) -> u32 {
        match self {
            Self::Riff => u32::from_le_bytes(size),
            Self::Aiff => u32::from_be_bytes(size),
        }
    }

    /// Converts samples between our native layout
    /// and signed little-endian, in either direction
    ///
    /// RIFF WAVE stores 8-bit samples unsigned
    /// while AIFF stores all samples big-endian.
    pub(crate) fn convert_samples(self, samples: &mut [u8], bytes_per_sample: usize) {
        match (self, bytes_per_sample) {
            (Self::Riff, 1) => samples.iter_mut().for_each(|s| *s ^= 0x80),
            (Self::Riff, _) | (Self::Aiff, 0 | 1) => {}
            (Self::Aiff, bytes) => samples.chunks_exact_mut(bytes).for_each(|s| s.reverse()),
        }
    }
}

impl std::fmt::Display for ForeignFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Riff => "RIFF WAVE".fmt(f),
            Self::Aiff => "AIFF".fmt(f),
        }
    }
}

/// A problem with a foreign container's chunk layout
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ChunkError {
    /// The file doesn't start with the given format's header
    NotContainer(ForeignFormat),
    /// The file starts with a tag that's neither RIFF nor FORM
    UnknownContainer([u8; 4]),
    /// A chunk ID contains non-printable characters
    InvalidChunkId([u8; 4]),
    /// A chunk extends past the end of its data
    TruncatedChunk([u8; 4]),
    /// No `fmt ` or `COMM` chunk before the samples
    MissingDescriptor,
    /// More than one `fmt ` or `COMM` chunk
    MultipleDescriptors,
    /// No `data` or `SSND` chunk
    MissingPayload,
    /// More than one `data` or `SSND` chunk
    MultiplePayloads,
    /// Bytes following the payload chunk's header in the header
    ExtraHeaderData,
    /// A `fmt ` or `COMM` chunk we can't interpret
    UnsupportedDescriptor,
    /// Reassembled chunks differ from the outermost chunk's size
    SizeMismatch {
        /// Size recorded in the outermost chunk, in bytes
        expected: u64,
        /// Size of the reassembled chunks, in bytes
        actual: u64,
    },
}

impl std::error::Error for ChunkError {}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotContainer(format) => write!(f, "not a {format} file"),
            Self::UnknownContainer(tag) => {
                write!(f, "unknown container \"{}\"", tag.escape_ascii())
            }
            Self::InvalidChunkId(id) => write!(f, "invalid chunk ID \"{}\"", id.escape_ascii()),
            Self::TruncatedChunk(id) => write!(f, "\"{}\" chunk truncated", id.escape_ascii()),
            Self::MissingDescriptor => "no format chunk found before samples".fmt(f),
            Self::MultipleDescriptors => "multiple format chunks found".fmt(f),
            Self::MissingPayload => "no sample data chunk found".fmt(f),
            Self::MultiplePayloads => "multiple sample data chunks found".fmt(f),
            Self::ExtraHeaderData => "extra data after sample data chunk header".fmt(f),
            Self::UnsupportedDescriptor => "unsupported format chunk".fmt(f),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "chunks total {actual} bytes but container records {expected}"
            ),
        }
    }
}

/// A foreign file's header and footer, split into chunks
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForeignChunks {
    /// The container's format
    pub format: ForeignFormat,
    /// One APPLICATION block per chunk, in file order
    pub blocks: Vec<Application>,
    /// Size of the PCM samples between header and footer, in bytes
    pub payload_size: u64,
    /// Size of the whole file, as recorded in its outermost chunk
    pub total_size: u64,
}

impl ForeignChunks {
    /// Parses the format chunk to determine our PCM layout
    ///
    /// Also returns the channel mask of
    /// `WAVE_FORMAT_EXTENSIBLE` files, if present.
    pub fn pcm_format(&self) -> Result<(PcmFormat, Option<u32>), ChunkError> {
        let descriptor_id = self.format.descriptor_id();
        let body = self
            .blocks
            .iter()
            .find_map(|b| {
                b.data
                    .strip_prefix(descriptor_id.as_slice())
                    .and_then(|d| d.get(4..))
            })
            .ok_or(ChunkError::MissingDescriptor)?;

        match self.format {
            ForeignFormat::Riff => parse_fmt(body),
            ForeignFormat::Aiff => parse_comm(body).map(|format| (format, None)),
        }
        .map_err(|_| ChunkError::UnsupportedDescriptor)
    }
}

fn pcm_format(
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<PcmFormat, ChunkError> {
    Ok(PcmFormat {
        sample_rate,
        channels: u8::try_from(channels)
            .ok()
            .and_then(NonZero::new)
            .ok_or(ChunkError::UnsupportedDescriptor)?,
        bits_per_sample: u8::try_from(bits_per_sample)
            .ok()
            .and_then(NonZero::new)
            .ok_or(ChunkError::UnsupportedDescriptor)?,
    })
}

// parses body of RIFF WAVE "fmt " chunk
fn parse_fmt(body: &[u8]) -> Result<(PcmFormat, Option<u32>), Box<dyn std::error::Error>> {
    const WAVE_FORMAT_PCM: u16 = 1;
    const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

    let mut r = ByteReader::endian(body, LittleEndian);
    let format_tag = r.read::<u16>()?;
    let channels = r.read::<u16>()?;
    let sample_rate = r.read::<u32>()?;
    // byte rate, block align
    r.skip(4 + 2)?;
    let bits_per_sample = r.read::<u16>()?;

    let channel_mask = match format_tag {
        WAVE_FORMAT_PCM => None,
        WAVE_FORMAT_EXTENSIBLE => {
            // extension size, valid bits per sample
            r.skip(2 + 2)?;
            Some(r.read::<u32>()?)
        }
        _ => return Err(ChunkError::UnsupportedDescriptor.into()),
    };

    Ok((
        pcm_format(sample_rate, channels, bits_per_sample)?,
        channel_mask,
    ))
}

// parses body of AIFF "COMM" chunk
fn parse_comm(body: &[u8]) -> Result<PcmFormat, Box<dyn std::error::Error>> {
    let mut r = ByteReader::endian(body, BigEndian);
    let channels = r.read::<u16>()?;
    let _sample_frames = r.read::<u32>()?;
    let bits_per_sample = r.read::<u16>()?;
    let sample_rate = extended_to_u32(r.read()?).ok_or(ChunkError::UnsupportedDescriptor)?;

    Ok(pcm_format(sample_rate, channels, bits_per_sample)?)
}

// converts 80-bit IEEE 754 extended float to an integer
fn extended_to_u32(extended: [u8; 10]) -> Option<u32> {
    let [e0, e1, significand @ ..] = extended;
    if e0 & 0x80 != 0 {
        // negative sample rates make no sense
        return None;
    }
    let exponent = i32::from(u16::from_be_bytes([e0, e1]));
    let significand = u64::from_be_bytes(significand);

    match exponent {
        0 => Some(0),
        0x7FFF => None,
        exponent => match 16383 + 63 - exponent {
            shift @ 0..=63 => u32::try_from(significand >> shift).ok(),
            64.. => Some(0),
            _ => None,
        },
    }
}

// chunk IDs must be printable ASCII
fn chunk_id(header: &[u8]) -> Result<[u8; 4], ChunkError> {
    let mut id = [0; 4];
    id.copy_from_slice(&header[0..4]);
    match id.iter().all(|b| (0x20..=0x7E).contains(b)) {
        true => Ok(id),
        false => Err(ChunkError::InvalidChunkId(id)),
    }
}

/// Splits a foreign file's header and footer into chunks
///
/// The header runs from the start of the file through the header
/// of the chunk holding PCM samples, while the footer runs from
/// the end of those samples to the end of the file.
///
/// If the sample chunk has an odd size,
/// the footer starts with a single pad byte
/// which isn't stored in any chunk.
///
/// # Example
///
/// ```
/// use flac_meta::foreign::{ForeignFormat, split};
///
/// let mut header = vec![];
/// header.extend(b"RIFF\x2a\x00\x00\x00WAVE");
/// header.extend(b"fmt \x10\x00\x00\x00");
/// header.extend([1, 0, 1, 0, 0x44, 0xac, 0, 0, 0x88, 0x58, 1, 0, 2, 0, 16, 0]);
/// header.extend(b"data\x02\x00\x00\x00");
///
/// let chunks = split(ForeignFormat::Riff, &header, &[]).unwrap();
/// assert_eq!(chunks.blocks.len(), 3);
/// assert_eq!(chunks.payload_size, 2);
/// assert_eq!(chunks.total_size, 50);
/// ```
///
/// # Errors
///
/// Returns an error if the header doesn't start with
/// the proper container, if any chunk ID isn't
/// printable ASCII, if a chunk is truncated,
/// if the header has no sample chunk or no format chunk
/// before it, or if the footer contains another
/// sample chunk or format chunk.
pub fn split(
    format: ForeignFormat,
    header: &[u8],
    footer: &[u8],
) -> Result<ForeignChunks, ChunkError> {
    let (outer_id, form_id) = format.container_ids();
    let application = |data: &[u8]| Application {
        id: format.application_id(),
        data: data.to_vec(),
    };
    let chunk_len = |id: [u8; 4], size: u32| {
        // chunks are padded to an even number of bytes
        usize::try_from(size)
            .ok()
            .and_then(|size| size.checked_add(8 + (size % 2)))
            .ok_or(ChunkError::TruncatedChunk(id))
    };

    let mut blocks = Vec::new();

    let (container, mut rest) = header
        .split_at_checked(12)
        .filter(|(container, _)| &container[0..4] == outer_id && &container[8..12] == form_id)
        .ok_or(ChunkError::NotContainer(format))?;
    let total_size = u64::from(format.chunk_size([
        container[4],
        container[5],
        container[6],
        container[7],
    ])) + 8;
    blocks.push(application(container));

    let mut descriptor_found = false;

    let payload_size = loop {
        let Some((chunk_header, tail)) = rest.split_at_checked(8) else {
            return Err(ChunkError::MissingPayload);
        };
        let id = chunk_id(chunk_header)?;
        let size = format.chunk_size([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);

        if &id == format.payload_id() {
            match tail.len().cmp(&format.payload_offset()) {
                std::cmp::Ordering::Greater => return Err(ChunkError::ExtraHeaderData),
                std::cmp::Ordering::Less => return Err(ChunkError::TruncatedChunk(id)),
                std::cmp::Ordering::Equal if !descriptor_found => {
                    return Err(ChunkError::MissingDescriptor);
                }
                std::cmp::Ordering::Equal => {
                    blocks.push(application(rest));
                    break u64::from(size)
                        .checked_sub(format.payload_offset() as u64)
                        .ok_or(ChunkError::TruncatedChunk(id))?;
                }
            }
        }

        if &id == format.descriptor_id() {
            if descriptor_found {
                return Err(ChunkError::MultipleDescriptors);
            }
            descriptor_found = true;
        }

        let (chunk, tail) = rest
            .split_at_checked(chunk_len(id, size)?)
            .ok_or(ChunkError::TruncatedChunk(id))?;
        blocks.push(application(chunk));
        rest = tail;
    };

    let mut rest = footer;

    if payload_size % 2 == 1 {
        rest = rest
            .get(1..)
            .ok_or(ChunkError::TruncatedChunk(*format.payload_id()))?;
    }

    while !rest.is_empty() {
        let chunk_header = rest
            .get(0..8)
            .ok_or(ChunkError::TruncatedChunk([0; 4]))?;
        let id = chunk_id(chunk_header)?;
        if &id == format.payload_id() {
            return Err(ChunkError::MultiplePayloads);
        } else if &id == format.descriptor_id() {
            return Err(ChunkError::MultipleDescriptors);
        }
        let size = format.chunk_size([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);
        let (chunk, tail) = rest
            .split_at_checked(chunk_len(id, size)?)
            .ok_or(ChunkError::TruncatedChunk(id))?;
        blocks.push(application(chunk));
        rest = tail;
    }

    Ok(ForeignChunks {
        format,
        blocks,
        payload_size,
        total_size,
    })
}

/// Reads a foreign file's header from the given reader
///
/// Reading stops at the start of the file's PCM samples.
///
/// # Errors
///
/// Returns an error if the file doesn't start with
/// the proper container, if a chunk is truncated
/// or if the file has no sample chunk.
pub fn read_header<R: std::io::Read>(
    format: ForeignFormat,
    mut reader: R,
) -> Result<Vec<u8>, Error> {
    fn read_more<R: std::io::Read>(
        reader: &mut R,
        header: &mut Vec<u8>,
        bytes: usize,
        error: ChunkError,
    ) -> Result<(), Error> {
        let start = header.len();
        header.resize(start + bytes, 0);
        reader
            .read_exact(&mut header[start..])
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => error.into(),
                _ => Error::Io(err),
            })
    }

    let mut header = Vec::new();
    read_more(
        &mut reader,
        &mut header,
        12,
        ChunkError::NotContainer(format),
    )?;

    loop {
        let start = header.len();
        read_more(&mut reader, &mut header, 8, ChunkError::MissingPayload)?;
        let id = chunk_id(&header[start..])?;
        let size = format.chunk_size([
            header[start + 4],
            header[start + 5],
            header[start + 6],
            header[start + 7],
        ]);

        if &id == format.payload_id() {
            read_more(
                &mut reader,
                &mut header,
                format.payload_offset(),
                ChunkError::TruncatedChunk(id),
            )?;
            break Ok(header);
        }

        let body = usize::try_from(size)
            .ok()
            .and_then(|size| size.checked_add(size % 2))
            .ok_or(ChunkError::TruncatedChunk(id))?;
        read_more(&mut reader, &mut header, body, ChunkError::TruncatedChunk(id))?;
    }
}

/// Returns `true` if the blocks contain chunks of the given format
pub fn has_foreign_chunks(blocks: &BlockList, format: ForeignFormat) -> bool {
    blocks
        .get_all::<Application>()
        .any(|a| a.id == format.application_id())
}

/// Rebuilds a foreign file's header and footer from the given blocks
///
/// Chunks are concatenated in block order.
/// Those through the sample chunk's header form the header
/// and the remainder form the footer, with a pad byte
/// restored after samples of odd length.
///
/// # Errors
///
/// Returns [`Error::NoForeignChunks`] if there are no chunks
/// of the given format.
/// Returns [`Error::InvalidChunkLayout`] if the reassembled
/// chunks aren't laid out properly or if their sizes
/// don't add up to the size recorded in the header.
pub fn header_footer(
    blocks: &BlockList,
    format: ForeignFormat,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let mut header = Vec::new();
    let mut footer = Vec::new();
    let mut in_footer = false;

    for application in blocks
        .get_all::<Application>()
        .filter(|a| a.id == format.application_id())
    {
        if in_footer {
            footer.extend_from_slice(&application.data);
        } else {
            header.extend_from_slice(&application.data);
            if application.data.starts_with(format.payload_id()) {
                in_footer = true;
                let size = application
                    .data
                    .get(4..8)
                    .map(|s| format.chunk_size([s[0], s[1], s[2], s[3]]))
                    .ok_or(ChunkError::TruncatedChunk(*format.payload_id()))?;
                if u64::from(size).saturating_sub(format.payload_offset() as u64) % 2 == 1 {
                    footer.push(0);
                }
            }
        }
    }

    if header.is_empty() {
        return Err(Error::NoForeignChunks);
    }

    let chunks = split(format, &header, &footer)?;
    match verify(&chunks, header.len(), chunks.payload_size, footer.len()) {
        Ok(()) => Ok((header, footer)),
        Err(Error::ForeignContainerMismatch { expected, actual }) => {
            Err(ChunkError::SizeMismatch { expected, actual }.into())
        }
        Err(err) => Err(err),
    }
}

/// Verifies that a foreign file's parts add up to its recorded size
///
/// # Errors
///
/// Returns [`Error::ForeignContainerMismatch`] if the sample data
/// differs from the sample chunk's size, or if the file's
/// total size differs from the size in its outermost chunk.
pub fn verify(
    chunks: &ForeignChunks,
    header_len: usize,
    payload_len: u64,
    footer_len: usize,
) -> Result<(), Error> {
    if payload_len != chunks.payload_size {
        return Err(Error::ForeignContainerMismatch {
            expected: chunks.payload_size,
            actual: payload_len,
        });
    }

    let total = header_len as u64 + payload_len + footer_len as u64;
    match total == chunks.total_size {
        true => Ok(()),
        false => Err(Error::ForeignContainerMismatch {
            expected: chunks.total_size,
            actual: total,
        }),
    }
}

/// Converts foreign samples to signed little-endian as they're read
pub(crate) struct PcmReader<R> {
    reader: R,
    format: ForeignFormat,
    bytes_per_sample: usize,
    buf: Vec<u8>,
    pos: usize,
}

impl<R> PcmReader<R> {
    const SAMPLES: usize = 4096;

    pub fn new(reader: R, format: ForeignFormat, pcm: &PcmFormat) -> Self {
        Self {
            reader,
            format,
            bytes_per_sample: usize::from(pcm.bits_per_sample.get().div_ceil(8)),
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Returns the inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: std::io::Read> std::io::Read for PcmReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos == self.buf.len() {
            // refill with whole samples, if possible
            self.buf.resize(self.bytes_per_sample * Self::SAMPLES, 0);
            self.pos = 0;
            let mut filled = 0;
            while filled < self.buf.len() {
                match self.reader.read(&mut self.buf[filled..]) {
                    Ok(0) => break,
                    Ok(amt) => filled += amt,
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        self.buf.clear();
                        return Err(err);
                    }
                }
            }
            self.buf.truncate(filled);
            let whole = filled - (filled % self.bytes_per_sample);
            self.format
                .convert_samples(&mut self.buf[..whole], self.bytes_per_sample);
        }

        let amt = buf.len().min(self.buf.len() - self.pos);
        buf[..amt].copy_from_slice(&self.buf[self.pos..self.pos + amt]);
        self.pos += amt;
        Ok(amt)
    }
}

/// Converts signed little-endian samples to foreign ones as they're written
pub(crate) struct PcmWriter<W: std::io::Write> {
    writer: W,
    format: ForeignFormat,
    bytes_per_sample: usize,
    pending: Vec<u8>,
}

impl<W: std::io::Write> PcmWriter<W> {
    pub fn new(writer: W, format: ForeignFormat, pcm: &PcmFormat) -> Self {
        Self {
            writer,
            format,
            bytes_per_sample: usize::from(pcm.bits_per_sample.get().div_ceil(8)),
            pending: Vec::new(),
        }
    }

    /// Writes any partial sample left over and returns inner writer
    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.write_all(&self.pending)?;
        Ok(self.writer)
    }
}

impl<W: std::io::Write> std::io::Write for PcmWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() - (self.pending.len() % self.bytes_per_sample);
        self.format
            .convert_samples(&mut self.pending[..whole], self.bytes_per_sample);
        self.writer.write_all(&self.pending[..whole])?;
        self.pending.drain(..whole);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
