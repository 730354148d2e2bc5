// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling a FLAC file's metadata blocks
//!
//! Many items are capitalized simply because they were capitalized
//! in the original FLAC format documentation.
//!
//! # Metadata Blocks
//!
//! FLAC supports seven different metadata block types
//!
//! | Block Type | Purpose |
//! |-----------:|---------|
//! | [STREAMINFO](`Streaminfo`) | stream information such as sample rate, channel count, etc. |
//! | [PADDING](`Padding`) | empty data which can easily be resized as needed |
//! | [APPLICATION](`Application`) | application-specific data such as foreign RIFF WAVE chunks |
//! | [SEEKTABLE](`SeekTable`) | to allow for more efficient seeking within a FLAC file |
//! | [VORBIS_COMMENT](`VorbisComment`) | textual metadata such as track title, artist name, album name, etc. |
//! | [CUESHEET](`Cuesheet`) | the original disc's layout, for CD images |
//! | [PICTURE](`Picture`) | embedded image files such as cover art |
//!
//! Block types 7 through 126 are reserved and type 127 is invalid;
//! neither can be represented by a [`Block`].

use crate::Error;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, BitWriter, FromBitStream, FromBitStreamUsing,
    FromBitStreamWith, LittleEndian, ToBitStream, ToBitStreamUsing,
};
use std::fs::File;
use std::io::BufReader;
use std::num::NonZero;
use std::path::Path;

/// Types related to the CUESHEET metadata block
pub mod cuesheet;
mod list;
mod picture;
mod seektable;

pub use cuesheet::Cuesheet;
pub use list::{BlockList, ReplayGain};
pub use picture::{ImageRole, InvalidPicture, Picture, PictureType};
pub use seektable::{SeekPoint, SeekTable};

pub(crate) const FLAC_TAG: &[u8; 4] = b"fLaC";

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in file |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::{BlockHeader, BlockType};
///
/// let data: &[u8] = &[0b1_0000000, 0x00, 0x00, 0x22];
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<BlockHeader>().unwrap(),
///     BlockHeader {
///         last: true,                         // 0b1
///         block_type: BlockType::Streaminfo,  // 0b0000000
///         size: 0x00_00_22u16.into(),         // 0x00, 0x00, 0x22
///     },
/// );
/// ```
#[derive(Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether we are the final block
    pub last: bool,
    /// Our block type
    pub block_type: BlockType,
    /// Our block size, in bytes
    pub size: BlockSize,
}

impl BlockHeader {
    /// Size of the header itself, in bytes
    pub const SIZE: BlockSize = BlockSize((1 + 7 + 24) / 8);

    fn new<M: MetadataBlock>(last: bool, block: &M) -> Result<Self, Error> {
        Ok(Self {
            last,
            block_type: M::TYPE,
            size: block.block_size().ok_or(Error::ExcessiveBlockSize)?,
        })
    }
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            last: r.read::<1, _>()?,
            block_type: r.parse()?,
            size: r.parse()?,
        })
    }
}

impl ToBitStream for BlockHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<1, _>(self.last)?;
        w.build(&self.block_type)?;
        w.build(&self.size)?;
        Ok(())
    }
}

/// A type of FLAC metadata block
///
/// Each block knows its own encoded size
/// without having to be serialized first.
pub trait MetadataBlock:
    ToBitStream<Error: Into<Error>> + Into<Block> + TryFrom<Block> + Clone + private::BlockVariant
{
    /// The metadata block's type
    const TYPE: BlockType;

    /// Size of block, in bytes, not including header
    ///
    /// This may exceed what a block header can hold.
    fn bytes(&self) -> u64;

    /// Size of block, in bytes, not including header
    ///
    /// Returns `None` if the block is too large to be written.
    fn block_size(&self) -> Option<BlockSize> {
        self.bytes().try_into().ok()
    }
}

/// A defined FLAC metadata block type
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo = 0,
    /// The PADDING block
    Padding = 1,
    /// The APPLICATION block
    Application = 2,
    /// The SEEKTABLE block
    SeekTable = 3,
    /// The VORBIS_COMMENT block
    VorbisComment = 4,
    /// The CUESHEET block
    Cuesheet = 5,
    /// The PICTURE block
    Picture = 6,
}

impl BlockType {
    /// Where blocks of this type prefer to sit in a metadata sequence
    ///
    /// Lower values come first.
    /// New blocks are inserted before the first existing
    /// block whose preferred position is later than their own.
    pub fn preferred_position(self) -> u8 {
        match self {
            Self::Streaminfo => 0,
            Self::SeekTable => 1,
            Self::Cuesheet => 2,
            Self::VorbisComment => 3,
            Self::Picture => 4,
            Self::Application => 5,
            Self::Padding => 6,
        }
    }
}

impl From<BlockType> for u8 {
    fn from(block_type: BlockType) -> u8 {
        block_type as u8
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Streaminfo => "STREAMINFO".fmt(f),
            Self::Padding => "PADDING".fmt(f),
            Self::Application => "APPLICATION".fmt(f),
            Self::SeekTable => "SEEKTABLE".fmt(f),
            Self::VorbisComment => "VORBIS_COMMENT".fmt(f),
            Self::Cuesheet => "CUESHEET".fmt(f),
            Self::Picture => "PICTURE".fmt(f),
        }
    }
}

impl TryFrom<u8> for BlockType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(Self::Streaminfo),
            1 => Ok(Self::Padding),
            2 => Ok(Self::Application),
            3 => Ok(Self::SeekTable),
            4 => Ok(Self::VorbisComment),
            5 => Ok(Self::Cuesheet),
            6 => Ok(Self::Picture),
            7..=126 => Err(Error::ReservedMetadataBlock(code)),
            _ => Err(Error::InvalidMetadataBlock),
        }
    }
}

impl FromBitStream for BlockType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read::<7, u8>()?.try_into()
    }
}

impl ToBitStream for BlockType {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<7, u8>((*self).into()).map_err(Error::Io)
    }
}

/// A 24-bit block size value, with safeguards against overflow
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockSize(u32);

impl BlockSize {
    /// A value of 0
    pub const ZERO: BlockSize = BlockSize(0);

    /// The largest possible block size (2²⁴ - 1)
    pub const MAX: BlockSize = BlockSize((1 << 24) - 1);

    /// Our current value as a u32
    pub(crate) fn get(&self) -> u32 {
        self.0
    }

    /// Conditionally add `BlockSize` to ourself
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .filter(|s| *s <= Self::MAX.0)
            .map(Self)
    }

    /// Conditionally subtract `BlockSize` from ourself
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl std::fmt::Display for BlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromBitStream for BlockSize {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read::<24, _>().map(Self)
    }
}

impl ToBitStream for BlockSize {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<24, _>(self.0)
    }
}

impl From<u8> for BlockSize {
    fn from(u: u8) -> Self {
        Self(u.into())
    }
}

impl From<u16> for BlockSize {
    fn from(u: u16) -> Self {
        Self(u.into())
    }
}

impl TryFrom<usize> for BlockSize {
    type Error = BlockSizeOverflow;

    fn try_from(u: usize) -> Result<Self, Self::Error> {
        u32::try_from(u)
            .map_err(|_| BlockSizeOverflow)
            .and_then(Self::try_from)
    }
}

impl TryFrom<u32> for BlockSize {
    type Error = BlockSizeOverflow;

    fn try_from(u: u32) -> Result<Self, Self::Error> {
        (u <= Self::MAX.0).then_some(Self(u)).ok_or(BlockSizeOverflow)
    }
}

impl TryFrom<u64> for BlockSize {
    type Error = BlockSizeOverflow;

    fn try_from(u: u64) -> Result<Self, Self::Error> {
        u32::try_from(u)
            .map_err(|_| BlockSizeOverflow)
            .and_then(Self::try_from)
    }
}

impl From<BlockSize> for u32 {
    #[inline]
    fn from(size: BlockSize) -> u32 {
        size.0
    }
}

impl From<BlockSize> for u64 {
    #[inline]
    fn from(size: BlockSize) -> u64 {
        size.0.into()
    }
}

/// An error that occurs when trying to build an overly large `BlockSize`
#[derive(Copy, Clone, Debug)]
pub struct BlockSizeOverflow;

impl std::error::Error for BlockSizeOverflow {}

impl std::fmt::Display for BlockSizeOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        "value too large for BlockSize".fmt(f)
    }
}

/// An iterator over FLAC metadata blocks
///
/// This checks the file's "fLaC" tag and each block's
/// physical layout, but not the order or uniqueness of blocks.
/// Those structural defects are left for [`BlockList::clean`].
pub struct BlockIterator<R: std::io::Read> {
    reader: R,
    failed: bool,
    tag_read: bool,
    finished: bool,
}

impl<R: std::io::Read> BlockIterator<R> {
    /// Creates an iterator over something that implements `Read`.
    /// Because this may perform many small reads,
    /// performance is greatly improved by buffering reads
    /// when reading from a raw `File`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
            tag_read: false,
            finished: false,
        }
    }

    fn read_block(&mut self) -> Result<Block, Error> {
        // like a slighly easier variant of "Take"
        struct LimitedReader<R> {
            reader: R,
            size: u64,
        }

        impl<R: std::io::Read> std::io::Read for LimitedReader<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let size = usize::try_from(self.size)
                    .unwrap_or(usize::MAX)
                    .min(buf.len());
                self.reader.read(&mut buf[0..size]).inspect(|amt_read| {
                    self.size -= *amt_read as u64;
                })
            }
        }

        let header: BlockHeader = BitReader::endian(&mut self.reader, BigEndian).parse()?;
        let size = header.size.get();

        let mut reader = BitReader::endian(
            LimitedReader {
                reader: self.reader.by_ref(),
                size: size.into(),
            },
            BigEndian,
        );

        let block = reader.parse_with(&header).map_err(|err| match err {
            Error::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::TruncatedBlock {
                    block_type: header.block_type,
                    size,
                }
            }
            err => err,
        })?;

        match reader.into_reader().size {
            0 => {
                self.finished = header.last;
                Ok(block)
            }
            remaining => Err(Error::InvalidMetadataBlockSize {
                block_type: header.block_type,
                size,
                consumed: size - u32::try_from(remaining).unwrap_or(size),
            }),
        }
    }
}

impl<R: std::io::Read> Iterator for BlockIterator<R> {
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.finished {
            // once we hit an error, stop any further reads
            None
        } else if !self.tag_read {
            // "fLaC" tag must come before anything else
            let mut tag = [0; 4];
            match self.reader.read_exact(&mut tag) {
                Ok(()) if &tag == FLAC_TAG => {
                    self.tag_read = true;
                    self.next()
                }
                Ok(()) => {
                    self.failed = true;
                    Some(Err(Error::MissingFlacTag))
                }
                Err(err) => {
                    self.failed = true;
                    Some(Err(Error::Io(err)))
                }
            }
        } else {
            let block = self.read_block();
            self.failed = block.is_err();
            Some(block)
        }
    }
}

/// Returns iterator of blocks from the given reader
///
/// The reader should be positioned at the start of the FLAC
/// file's "fLaC" tag.
///
/// Because this may perform many small reads,
/// using a buffered reader may greatly improve performance
/// when reading from a raw `File`.
///
/// # Example
///
/// ```
/// use flac_meta::metadata::{read_blocks, write_blocks, Application, Block, Streaminfo};
///
/// let blocks: Vec<Block> = vec![
///     Streaminfo::new(44100, 2, 16).into(),
///     Application {id: 0x1234, data: vec![1, 2, 3, 4]}.into(),
/// ];
///
/// let mut flac = vec![];
/// write_blocks(&mut flac, &blocks).unwrap();
///
/// assert_eq!(
///     read_blocks(flac.as_slice()).collect::<Result<Vec<_>, _>>().unwrap(),
///     blocks,
/// );
/// ```
pub fn read_blocks<R: std::io::Read>(r: R) -> BlockIterator<R> {
    BlockIterator::new(r)
}

/// Returns FLAC's STREAMINFO metadata block from the given file
///
/// # Errors
///
/// Returns an error if the STREAMINFO block is not first
/// or if any I/O error occurs when reading the file.
pub fn info<P: AsRef<Path>>(p: P) -> Result<Streaminfo, Error> {
    let mut r = BufReader::new(File::open(p)?);
    stream_offset(&mut r)?;
    read_info(r)
}

/// Returns FLAC's STREAMINFO metadata block from the given reader
///
/// The reader is assumed to be positioned at the "fLaC" tag.
///
/// # Errors
///
/// Returns an error if the STREAMINFO block is not first
/// or if any I/O error occurs when reading the file.
pub fn read_info<R: std::io::Read>(r: R) -> Result<Streaminfo, Error> {
    let mut r = BitReader::endian(r, BigEndian);

    // FLAC tag must be first thing in stream
    if &r.read_to::<[u8; 4]>()? != FLAC_TAG {
        return Err(Error::MissingFlacTag);
    }

    // STREAMINFO block must be present, and must be first
    if !matches!(
        r.parse()?,
        BlockHeader {
            block_type: BlockType::Streaminfo,
            size: Streaminfo::SIZE,
            last: _,
        }
    ) {
        return Err(Error::MissingStreaminfo);
    }

    r.parse().map_err(Error::Io)
}

/// Given a reader positioned at the start of a file,
/// skips any leading ID3v2 tags and returns the
/// offset of the FLAC stream's "fLaC" tag
///
/// The reader is left positioned at that offset.
///
/// ID3v2 tags aren't part of the FLAC format,
/// but are commonly prepended by tagging tools.
///
/// # Example
/// ```
/// use flac_meta::metadata::stream_offset;
/// use std::io::Cursor;
///
/// let mut file = Cursor::new(vec![]);
/// file.get_mut().extend(b"ID3\x04\x00\x00\x00\x00\x00\x02");  // 2 byte tag
/// file.get_mut().extend([0, 0]);
/// file.get_mut().extend(b"fLaC");
///
/// assert_eq!(stream_offset(&mut file).unwrap(), 12);
/// ```
pub fn stream_offset<R>(mut r: R) -> Result<u64, Error>
where
    R: std::io::Read + std::io::Seek,
{
    use std::io::SeekFrom;

    loop {
        let start = r.stream_position()?;
        let mut header = [0; 10];

        match r.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                r.seek(SeekFrom::Start(start))?;
                break Ok(start);
            }
            Err(err) => break Err(err.into()),
        }

        match header {
            [b'I', b'D', b'3', _, _, flags, size @ ..] => {
                // tag size is 4 bytes of 7 bits each
                let size = size
                    .iter()
                    .fold(0u64, |acc, byte| (acc << 7) | u64::from(byte & 0x7F));
                let footer = if flags & 0x10 != 0 { 10 } else { 0 };
                log::debug!("skipping {} byte ID3v2 tag at {start}", size + footer + 10);
                r.seek(SeekFrom::Start(start + 10 + size + footer))?;
            }
            _ => {
                r.seek(SeekFrom::Start(start))?;
                break Ok(start);
            }
        }
    }
}

/// Verifies that a sequence of blocks is valid to be written
///
/// STREAMINFO must be present and first,
/// and STREAMINFO, SEEKTABLE, VORBIS_COMMENT and CUESHEET
/// may each occur at most once.
pub fn check_blocks<B: AsBlockRef>(blocks: impl IntoIterator<Item = B>) -> Result<(), Error> {
    let mut blocks = blocks.into_iter();

    match blocks.next().as_ref().map(|b| b.as_block_ref()) {
        Some(BlockRef::Streaminfo(_)) => {}
        _ => return Err(Error::MissingStreaminfo),
    }

    let mut seektable_read = false;
    let mut vorbiscomment_read = false;
    let mut cuesheet_read = false;

    fn once(read: &mut bool, error: Error) -> Result<(), Error> {
        match std::mem::replace(read, true) {
            false => Ok(()),
            true => Err(error),
        }
    }

    blocks.try_for_each(|block| match block.as_block_ref() {
        BlockRef::Streaminfo(_) => Err(Error::MultipleStreaminfo),
        BlockRef::SeekTable(_) => once(&mut seektable_read, Error::MultipleSeekTable),
        BlockRef::VorbisComment(_) => {
            once(&mut vorbiscomment_read, Error::MultipleVorbisComment)
        }
        BlockRef::Cuesheet(_) => once(&mut cuesheet_read, Error::MultipleCuesheet),
        _ => Ok(()),
    })
}

/// Writes "fLaC" tag and iterator of blocks to the given writer.
///
/// Because this may perform many small writes,
/// buffering writes may greatly improve performance
/// when writing to a raw `File`.
///
/// Blocks too large for their 24-bit size field
/// are skipped with a warning.
/// The final block written has its `last` flag set.
///
/// # Errors
///
/// Returns an error before writing anything if the blocks are invalid
/// (e.g. STREAMINFO not being the first block, multiple SEEKTABLEs, etc.)
/// Passes along any I/O errors from the underlying stream.
pub fn write_blocks<B: AsBlockRef>(
    mut w: impl std::io::Write,
    blocks: impl IntoIterator<Item = B>,
) -> Result<(), Error> {
    let blocks = blocks.into_iter().collect::<Vec<B>>();

    check_blocks(&blocks)?;

    // "FlaC" tag must come before anything else
    w.write_all(FLAC_TAG)?;

    write_block_sequence(&mut w, blocks.iter().map(|b| b.as_block_ref()))
}

// writes blocks with headers, without the "fLaC" tag
pub(crate) fn write_block_sequence<'b>(
    w: impl std::io::Write,
    blocks: impl Iterator<Item = BlockRef<'b>>,
) -> Result<(), Error> {
    let mut w = BitWriter::endian(w, BigEndian);

    iter_last(writable(blocks)).try_for_each(|(last, block)| w.build_using(&block, last))
}

// filters out blocks which are too large to be written
pub(crate) fn writable<'b>(
    blocks: impl Iterator<Item = BlockRef<'b>>,
) -> impl Iterator<Item = BlockRef<'b>> {
    blocks.filter(|block| match block.block_size() {
        Some(_) => true,
        None => {
            log::warn!(
                "skipping {} block of {} bytes, too large to write",
                block.block_type(),
                block.bytes()
            );
            false
        }
    })
}

pub(crate) fn iter_last<T>(i: impl Iterator<Item = T>) -> impl Iterator<Item = (bool, T)> {
    struct LastIterator<I: std::iter::Iterator> {
        iter: std::iter::Peekable<I>,
    }

    impl<T, I: std::iter::Iterator<Item = T>> Iterator for LastIterator<I> {
        type Item = (bool, T);

        fn next(&mut self) -> Option<Self::Item> {
            let item = self.iter.next()?;
            Some((self.iter.peek().is_none(), item))
        }
    }

    LastIterator { iter: i.peekable() }
}

/// Any possible FLAC metadata block
///
/// Each block consists of a [`BlockHeader`] followed by the block's contents.
///
/// ```text
/// ┌──────────┬────────┬┄┄┄┄┄┄┄┄┬┄┄┄┬────────┬┄┄┄┄┄┄┄┄┬┄┄┄╮
/// │ FLAC Tag │ Block₀ │ Block₁ ┆ … ┆ Frame₀ │ Frame₁ ┆ … ┆ FLAC File
/// └──────────┼────────┼┄┄┄┄┄┄┄┄┴┄┄┄┴────────┴┄┄┄┄┄┄┄┄┴┄┄┄╯
/// ╭──────────╯        ╰────────────────────────╮
/// ├──────────────┬─────────────────────────────┤
/// │ Block Header │     Metadata Block Data     │           Metadata Block
/// └──────────────┴─────────────────────────────┘
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Block {
    /// The STREAMINFO block
    Streaminfo(Streaminfo),
    /// The PADDING block
    Padding(Padding),
    /// The APPLICATION block
    Application(Application),
    /// The SEEKTABLE block
    SeekTable(SeekTable),
    /// The VORBIS_COMMENT block
    VorbisComment(VorbisComment),
    /// The CUESHEET block
    Cuesheet(Cuesheet),
    /// The PICTURE block
    Picture(Picture),
}

impl Block {
    /// Our block type
    pub fn block_type(&self) -> BlockType {
        self.as_block_ref().block_type()
    }

    /// Size of block, in bytes, not including header
    pub fn bytes(&self) -> u64 {
        self.as_block_ref().bytes()
    }

    /// Size of block, in bytes, not including header
    ///
    /// Returns `None` if the block is too large to be written.
    pub fn block_size(&self) -> Option<BlockSize> {
        self.as_block_ref().block_size()
    }
}

impl AsBlockRef for Block {
    fn as_block_ref(&self) -> BlockRef<'_> {
        match self {
            Self::Streaminfo(s) => BlockRef::Streaminfo(s),
            Self::Padding(p) => BlockRef::Padding(p),
            Self::Application(a) => BlockRef::Application(a),
            Self::SeekTable(s) => BlockRef::SeekTable(s),
            Self::VorbisComment(v) => BlockRef::VorbisComment(v),
            Self::Cuesheet(v) => BlockRef::Cuesheet(v),
            Self::Picture(p) => BlockRef::Picture(p),
        }
    }
}

impl FromBitStreamWith<'_> for Block {
    type Context = BlockHeader;
    type Error = Error;

    // parses from reader without header
    fn from_reader<R: BitRead + ?Sized>(
        r: &mut R,
        header: &BlockHeader,
    ) -> Result<Self, Self::Error> {
        match header.block_type {
            BlockType::Streaminfo => Ok(Block::Streaminfo(r.parse()?)),
            BlockType::Padding => Ok(Block::Padding(r.parse_using(header.size)?)),
            BlockType::Application => Ok(Block::Application(r.parse_using(header.size)?)),
            BlockType::SeekTable => Ok(Block::SeekTable(r.parse_using(header.size)?)),
            BlockType::VorbisComment => Ok(Block::VorbisComment(r.parse()?)),
            BlockType::Cuesheet => Ok(Block::Cuesheet(r.parse()?)),
            BlockType::Picture => Ok(Block::Picture(r.parse()?)),
        }
    }
}

impl ToBitStreamUsing for Block {
    type Context = bool;
    type Error = Error;

    // builds to writer with header
    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W, is_last: bool) -> Result<(), Error> {
        w.build_using(&self.as_block_ref(), is_last)
    }
}

/// A shared reference to a metadata block
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockRef<'b> {
    /// The STREAMINFO block
    Streaminfo(&'b Streaminfo),
    /// The PADDING block
    Padding(&'b Padding),
    /// The APPLICATION block
    Application(&'b Application),
    /// The SEEKTABLE block
    SeekTable(&'b SeekTable),
    /// The VORBIS_COMMENT block
    VorbisComment(&'b VorbisComment),
    /// The CUESHEET block
    Cuesheet(&'b Cuesheet),
    /// The PICTURE block
    Picture(&'b Picture),
}

impl BlockRef<'_> {
    /// Our block type
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Streaminfo(_) => BlockType::Streaminfo,
            Self::Padding(_) => BlockType::Padding,
            Self::Application(_) => BlockType::Application,
            Self::SeekTable(_) => BlockType::SeekTable,
            Self::VorbisComment(_) => BlockType::VorbisComment,
            Self::Cuesheet(_) => BlockType::Cuesheet,
            Self::Picture(_) => BlockType::Picture,
        }
    }

    /// Size of block, in bytes, not including header
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Streaminfo(s) => s.bytes(),
            Self::Padding(p) => p.bytes(),
            Self::Application(a) => a.bytes(),
            Self::SeekTable(s) => s.bytes(),
            Self::VorbisComment(v) => v.bytes(),
            Self::Cuesheet(c) => c.bytes(),
            Self::Picture(p) => p.bytes(),
        }
    }

    /// Size of block, in bytes, not including header
    ///
    /// Returns `None` if the block is too large to be written.
    pub fn block_size(&self) -> Option<BlockSize> {
        self.bytes().try_into().ok()
    }
}

impl AsBlockRef for BlockRef<'_> {
    fn as_block_ref(&self) -> BlockRef<'_> {
        *self
    }
}

/// A trait for items which can make cheap [`BlockRef`] values.
pub trait AsBlockRef {
    /// Returns fresh reference to ourself.
    fn as_block_ref(&self) -> BlockRef<'_>;
}

impl<T: AsBlockRef> AsBlockRef for &T {
    fn as_block_ref(&self) -> BlockRef<'_> {
        <T as AsBlockRef>::as_block_ref(*self)
    }
}

impl ToBitStreamUsing for BlockRef<'_> {
    type Context = bool;
    type Error = Error;

    // builds to writer with header
    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W, is_last: bool) -> Result<(), Error> {
        fn build<M: MetadataBlock, W: BitWrite + ?Sized>(
            w: &mut W,
            is_last: bool,
            block: &M,
        ) -> Result<(), Error> {
            w.build(&BlockHeader::new(is_last, block)?)?;
            w.build(block).map_err(|e| e.into())
        }

        match self {
            Self::Streaminfo(streaminfo) => build(w, is_last, *streaminfo),
            Self::Padding(padding) => build(w, is_last, *padding),
            Self::Application(application) => build(w, is_last, *application),
            Self::SeekTable(seektable) => build(w, is_last, *seektable),
            Self::VorbisComment(vorbis_comment) => build(w, is_last, *vorbis_comment),
            Self::Cuesheet(cuesheet) => build(w, is_last, *cuesheet),
            Self::Picture(picture) => build(w, is_last, *picture),
        }
    }
}

macro_rules! block {
    ($t:ty, $v:ident) => {
        impl $crate::metadata::private::BlockVariant for $t {
            fn from_block(block: &$crate::metadata::Block) -> Option<&Self> {
                match block {
                    $crate::metadata::Block::$v(block) => Some(block),
                    _ => None,
                }
            }

            fn from_block_mut(block: &mut $crate::metadata::Block) -> Option<&mut Self> {
                match block {
                    $crate::metadata::Block::$v(block) => Some(block),
                    _ => None,
                }
            }
        }

        impl From<$t> for $crate::metadata::Block {
            fn from(b: $t) -> Self {
                Self::$v(b)
            }
        }

        impl TryFrom<$crate::metadata::Block> for $t {
            type Error = ();

            fn try_from(block: $crate::metadata::Block) -> Result<Self, ()> {
                match block {
                    $crate::metadata::Block::$v(block) => Ok(block),
                    _ => Err(()),
                }
            }
        }

        impl $crate::metadata::AsBlockRef for $t {
            fn as_block_ref(&self) -> $crate::metadata::BlockRef<'_> {
                $crate::metadata::BlockRef::$v(self)
            }
        }
    };
}

pub(crate) use block;

pub(crate) mod private {
    use super::Block;

    pub trait BlockVariant: Sized {
        fn from_block(block: &Block) -> Option<&Self>;

        fn from_block_mut(block: &mut Block) -> Option<&mut Self>;
    }
}

/// A STREAMINFO metadata block
///
/// This block contains metadata about the stream's contents.
///
/// It must *always* be present in a FLAC file,
/// must *always* be the first metadata block in the stream,
/// and must *not* be present more than once.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 16   | `minimum_block_size` | minimum block size (in samples) in the stream
/// | 16   | `maximum_block_size` | maximum block size (in samples) in the stream
/// | 24   | `minimum_frame_size` | minimum frame size (in bytes) in the stream
/// | 24   | `maximum_frame_size` | maximum frame size (in bytes) in the stream
/// | 20   | `sample_rate` | stream's sample rate, in Hz
/// | 3    | `channels` | stream's channel count (+1)
/// | 5    | `bits_per_sample` | stream's bits-per-sample (+1)
/// | 36   | `total_samples` | stream's total channel-independent samples
/// | 16×8 | `md5` | decoded stream's MD5 sum hash
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::Streaminfo;
/// use std::num::NonZero;
///
/// let data: &[u8] = &[
///     0x10, 0x00,
///     0x10, 0x00,
///     0x00, 0x00, 0x0c,
///     0x00, 0x00, 0x0c,
///     0b00001010, 0b11000100, 0b0100_000_0, 0b1111_0000,
///     0b00000000, 0b00000000, 0b00000000, 0b01010000,
///     0xf5, 0x3f, 0x86, 0x87, 0x6d, 0xcd, 0x77, 0x83,
///     0x22, 0x5c, 0x93, 0xba, 0x8a, 0x93, 0x8c, 0x7d,
/// ];
///
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<Streaminfo>().unwrap(),
///     Streaminfo {
///         minimum_block_size: 0x10_00,                    // 4096 samples
///         maximum_block_size: 0x10_00,                    // 4096 samples
///         minimum_frame_size: NonZero::new(0x00_00_0c),   // 12 bytes
///         maximum_frame_size: NonZero::new(0x00_00_0c),   // 12 bytes
///         sample_rate: 0b00001010_11000100_0100,          // 44100 Hz
///         channels: NonZero::new(0b000 + 1).unwrap(),     // 1 channel
///         bits_per_sample: NonZero::new(0b0_1111 + 1).unwrap(), // 16 bps
///         total_samples: NonZero::new(
///             0b0000_00000000_00000000_00000000_01010000  // 80 samples
///         ),
///         md5: Some([
///             0xf5, 0x3f, 0x86, 0x87, 0x6d, 0xcd, 0x77, 0x83,
///             0x22, 0x5c, 0x93, 0xba, 0x8a, 0x93, 0x8c, 0x7d,
///         ]),
///     },
/// );
/// ```
///
/// # Important
///
/// Changing any of these values to something that differs
/// from the values of the file's frame headers will render it
/// unplayable, as will moving it anywhere but the first
/// metadata block in the file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// The minimum block size (in samples) used in the stream,
    /// excluding the last block.
    pub minimum_block_size: u16,
    /// The maximum block size (in samples) used in the stream,
    /// excluding the last block.
    pub maximum_block_size: u16,
    /// The minimum framesize (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub minimum_frame_size: Option<NonZero<u32>>,
    /// The maximum framesize (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub maximum_frame_size: Option<NonZero<u32>>,
    /// Sample rate in Hz
    ///
    /// 0 indicates a non-audio stream.
    pub sample_rate: u32,
    /// Number of channels, from 1 to 8
    pub channels: NonZero<u8>,
    /// Number of bits-per-sample, from 1 to 32
    pub bits_per_sample: NonZero<u8>,
    /// Total number of interchannel samples in stream.
    ///
    /// `None` indicates the value is unknown.
    pub total_samples: Option<NonZero<u64>>,
    /// MD5 hash of unencoded audio data.
    ///
    /// `None` indicates the value is unknown.
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// Defined size of STREAMINFO block
    pub(crate) const SIZE: BlockSize = BlockSize(0x22);

    /// Builds STREAMINFO with the given stream parameters
    /// and everything else unknown
    ///
    /// Channel count and bits-per-sample of 0 are treated as 1.
    pub fn new(sample_rate: u32, channels: u8, bits_per_sample: u8) -> Self {
        Self {
            minimum_block_size: 0,
            maximum_block_size: 0,
            minimum_frame_size: None,
            maximum_frame_size: None,
            sample_rate,
            channels: NonZero::new(channels).unwrap_or(NonZero::<u8>::MIN),
            bits_per_sample: NonZero::new(bits_per_sample).unwrap_or(NonZero::<u8>::MIN),
            total_samples: None,
            md5: None,
        }
    }
}

block!(Streaminfo, Streaminfo);

impl MetadataBlock for Streaminfo {
    const TYPE: BlockType = BlockType::Streaminfo;

    fn bytes(&self) -> u64 {
        Self::SIZE.into()
    }
}

impl FromBitStream for Streaminfo {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            minimum_block_size: r.read_to()?,
            maximum_block_size: r.read_to()?,
            minimum_frame_size: r.read::<24, _>()?,
            maximum_frame_size: r.read::<24, _>()?,
            sample_rate: r.read::<20, _>()?,
            channels: r.read::<3, _>()?,
            bits_per_sample: r.read::<5, _>()?,
            total_samples: r.read::<36, _>()?,
            md5: r
                .read_to()
                .map(|md5: [u8; 16]| md5.iter().any(|b| *b != 0).then_some(md5))?,
        })
    }
}

impl ToBitStream for Streaminfo {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.minimum_block_size)?;
        w.write_from(self.maximum_block_size)?;
        w.write::<24, _>(self.minimum_frame_size)?;
        w.write::<24, _>(self.maximum_frame_size)?;
        w.write::<20, _>(self.sample_rate)?;
        w.write::<3, _>(self.channels)?;
        w.write::<5, _>(self.bits_per_sample)?;
        w.write::<36, _>(self.total_samples)?;
        w.write_from(self.md5.unwrap_or([0; 16]))?;
        Ok(())
    }
}

/// A PADDING metadata block
///
/// Padding blocks are empty blocks consisting of all 0 bytes.
/// If one wishes to edit the metadata in other blocks,
/// adjusting the size of the padding block allows
/// us to do so without have to rewrite the entire FLAC file.
/// For example, when adding 10 bytes to a comment,
/// we can subtract 10 bytes from the padding
/// and the total size of all blocks remains unchanged.
///
/// Padding contents are ignored when read
/// and written as all 0 bytes.
///
/// This block may occur multiple times in a FLAC file.
///
/// # Example
///
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::{BlockHeader, BlockType, Padding};
///
/// let data: &[u8] = &[
///     0x81, 0x00, 0x00, 0x0a,  // block header
///     // padding bytes
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
/// ];
///
/// let mut r = BitReader::endian(data, BigEndian);
/// let header = r.parse::<BlockHeader>().unwrap();
/// assert_eq!(header.block_type, BlockType::Padding);
///
/// assert_eq!(
///     r.parse_using::<Padding>(header.size).unwrap(),
///     Padding {
///         size: 0x0au8.into(),
///     },
/// );
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Padding {
    /// The size of the padding, in bytes
    pub size: BlockSize,
}

block!(Padding, Padding);

impl MetadataBlock for Padding {
    const TYPE: BlockType = BlockType::Padding;

    fn bytes(&self) -> u64 {
        self.size.into()
    }
}

impl FromBitStreamUsing for Padding {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        r.skip(size.get() * 8)?;
        Ok(Self { size })
    }
}

impl ToBitStream for Padding {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.pad(self.size.get() * 8)
    }
}

/// An APPLICATION metadata block
///
/// This block is for handling application-specific binary metadata,
/// such as foreign RIFF WAVE chunks.
///
/// This block may occur multiple times in a FLAC file.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | `id` | registered application ID
/// | rest of block | `data` | application-specific data
///
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Application {
    /// A registered application ID
    pub id: u32,
    /// Application-specific data
    pub data: Vec<u8>,
}

impl Application {
    /// Application ID for RIFF chunk storage
    pub const RIFF: u32 = 0x72696666;

    /// Application ID for AIFF chunk storage
    pub const AIFF: u32 = 0x61696666;
}

block!(Application, Application);

impl MetadataBlock for Application {
    const TYPE: BlockType = BlockType::Application;

    fn bytes(&self) -> u64 {
        4 + self.data.len() as u64
    }
}

impl FromBitStreamUsing for Application {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        let data_len = size
            .get()
            .checked_sub(4)
            .ok_or(Error::InsufficientApplicationBlock)?;

        Ok(Self {
            id: r.read_to()?,
            data: r.read_to_vec(data_len as usize)?,
        })
    }
}

impl ToBitStream for Application {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.id)?;
        w.write_bytes(&self.data)
    }
}

/// A VORBIS_COMMENT metadata block
///
/// This block contains metadata such as track name,
/// artist name, album name, etc.  Its contents are
/// UTF-8 encoded, `=`-delimited text fields
/// with a field name followed by value,
/// such as:
///
/// ```text
/// TITLE=Track Title
/// ```
///
/// Field names are case-insensitive and
/// may occur multiple times within the same comment
/// (a track may have multiple artists and choose to
/// store an "ARTIST" field for each one).
///
/// Commonly-used fields are available in the [`fields`] module.
///
/// This block may occur only once in a FLAC file.
///
/// # Byte Order
///
/// Unlike the rest of a FLAC file, the Vorbis comment's
/// length fields are stored in little-endian byte order.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | vendor string len | length of vendor string, in bytes
/// | `vendor string len`×8 | `vendor_string` | vendor string, in UTF-8
/// | 32   | field count | number of vendor string fields
/// | 32   | field₀ len | length of field₀, in bytes
/// | `field₀ len`×8 | `fields₀` | first field value, in UTF-8
/// | | | ⋮
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::VorbisComment;
/// use flac_meta::metadata::fields::{TITLE, ARTIST};
///
/// let data: &[u8] = &[
///     0x04, 0x00, 0x00, 0x00,  // 4 byte vendor string
///     0x74, 0x65, 0x73, 0x74,
///     0x01, 0x00, 0x00, 0x00,  // 1 field
///     0x0d, 0x00, 0x00, 0x00,  // 13 byte field
///     0x54, 0x49, 0x54, 0x4c, 0x45, 0x3d, 0x54, 0x65,
///     0x73, 0x74, 0x69, 0x6e, 0x67,
/// ];
///
/// let mut r = BitReader::endian(data, BigEndian);
/// let comment = r.parse::<VorbisComment>().unwrap();
///
/// assert_eq!(comment.vendor_string, "test");
/// assert_eq!(comment.get(TITLE), Some("Testing"));
/// assert_eq!(comment.get(ARTIST), None);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor_string: String,
    /// The individual metadata comment strings
    pub fields: Vec<String>,
}

impl Default for VorbisComment {
    fn default() -> Self {
        Self::new(crate::Options::default().vendor_string())
    }
}

impl VorbisComment {
    /// Builds empty comment with the given vendor string
    pub fn new<S: Into<String>>(vendor_string: S) -> Self {
        Self {
            vendor_string: vendor_string.into(),
            fields: vec![],
        }
    }

    /// Given a field name, returns first matching value, if any
    ///
    /// Fields are matched case-insensitively
    pub fn get(&self, field: &str) -> Option<&str> {
        self.all(field).next()
    }

    /// Replaces any instances of the given field with value
    ///
    /// # Panics
    ///
    /// Panics if field contains the `=` character.
    pub fn set<S>(&mut self, field: &str, value: S)
    where
        S: std::fmt::Display,
    {
        self.remove(field);
        self.insert(field, value);
    }

    /// Returns iterator over all matching values
    ///
    /// Fields are matched case-insensitively
    ///
    /// # Panics
    ///
    /// Panics if field contains the `=` character.
    pub fn all(&self, field: &str) -> impl Iterator<Item = &str> {
        assert!(!field.contains('='), "field must not contain '='");

        self.fields.iter().filter_map(|f| {
            f.split_once('=')
                .and_then(|(key, value)| key.eq_ignore_ascii_case(field).then_some(value))
        })
    }

    /// Adds new instance of field with the given value
    ///
    /// # Panics
    ///
    /// Panics if field contains the `=` character.
    pub fn insert<S>(&mut self, field: &str, value: S)
    where
        S: std::fmt::Display,
    {
        assert!(!field.contains('='), "field must not contain '='");

        self.fields.push(format!("{field}={value}"));
    }

    /// Removes any matching instances of the given field
    ///
    /// # Panics
    ///
    /// Panics if field contains the `=` character.
    pub fn remove(&mut self, field: &str) {
        assert!(!field.contains('='), "field must not contain '='");

        self.fields.retain(|f| match f.split_once('=') {
            Some((key, _)) => !key.eq_ignore_ascii_case(field),
            None => true,
        });
    }

    /// Replaces any instances of the given field with the given values
    ///
    /// An empty set of replacements removes the field entirely.
    ///
    /// # Panics
    ///
    /// Panics if field contains the `=` character.
    pub fn replace<S: std::fmt::Display>(
        &mut self,
        field: &str,
        replacements: impl IntoIterator<Item = S>,
    ) {
        self.remove(field);
        self.fields.extend(
            replacements
                .into_iter()
                .map(|value| format!("{field}={value}")),
        );
    }

    /// Returns the distinct field names, uppercased,
    /// in the order they first appear
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for (key, _) in self.fields.iter().filter_map(|f| f.split_once('=')) {
            let key = key.to_ascii_uppercase();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Returns a fixed copy of ourself along with the fixes performed
    ///
    /// Entries with no `=` separator are dropped,
    /// leading and trailing whitespace is trimmed from values
    /// and fields left with empty values are removed.
    pub fn clean(&self) -> (Self, Vec<Fix>) {
        let mut fixes = Vec::new();
        let mut fields = Vec::with_capacity(self.fields.len());

        for field in self.fields.iter() {
            match field.split_once('=') {
                None => fixes.push(Fix::RemovedInvalidComment(field.clone())),
                Some((key, value)) => {
                    let trimmed = value.trim();
                    if trimmed.len() != value.len() {
                        fixes.push(Fix::TrimmedWhitespace(key.to_owned()));
                    }
                    if trimmed.is_empty() {
                        fixes.push(Fix::RemovedEmptyField(key.to_owned()));
                    } else {
                        fields.push(format!("{key}={trimmed}"));
                    }
                }
            }
        }

        (
            Self {
                vendor_string: self.vendor_string.clone(),
                fields,
            },
            fixes,
        )
    }

    /// Returns comment containing only the fields
    /// whose values match in both comments
    ///
    /// The vendor string is taken from ourself.
    ///
    /// # Example
    /// ```
    /// use flac_meta::metadata::VorbisComment;
    ///
    /// let mut a = VorbisComment::new("a");
    /// a.insert("TITLE", "Title");
    /// a.insert("ARTIST", "Artist 1");
    ///
    /// let mut b = VorbisComment::new("b");
    /// b.insert("title", "Title");
    /// b.insert("ARTIST", "Artist 2");
    ///
    /// let c = a.intersection(&b);
    /// assert_eq!(c.vendor_string, "a");
    /// assert_eq!(c.fields, vec!["TITLE=Title".to_owned()]);
    /// ```
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            vendor_string: self.vendor_string.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| match f.split_once('=') {
                    Some((key, _)) => self.all(key).eq(other.all(key)),
                    None => false,
                })
                .cloned()
                .collect(),
        }
    }
}

block!(VorbisComment, VorbisComment);

impl MetadataBlock for VorbisComment {
    const TYPE: BlockType = BlockType::VorbisComment;

    fn bytes(&self) -> u64 {
        4 + self.vendor_string.len() as u64
            + 4
            + self
                .fields
                .iter()
                .map(|f| 4 + f.len() as u64)
                .sum::<u64>()
    }
}

impl FromBitStream for VorbisComment {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        fn read_string<R: BitRead + ?Sized>(r: &mut R) -> Result<String, Error> {
            let size = r.read_as_to::<LittleEndian, u32>()?;
            Ok(String::from_utf8(r.read_to_vec(size as usize)?)?)
        }

        Ok(Self {
            vendor_string: read_string(r)?,
            fields: (0..(r.read_as_to::<LittleEndian, u32>()?))
                .map(|_| read_string(r))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl ToBitStream for VorbisComment {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        fn write_string<W: BitWrite + ?Sized>(w: &mut W, s: &str) -> Result<(), Error> {
            w.write_as_from::<LittleEndian, u32>(
                s.len()
                    .try_into()
                    .map_err(|_| Error::ExcessiveStringLength)?,
            )?;
            w.write_bytes(s.as_bytes())?;
            Ok(())
        }

        write_string(w, &self.vendor_string)?;
        w.write_as_from::<LittleEndian, u32>(
            self.fields
                .len()
                .try_into()
                .map_err(|_| Error::ExcessiveVorbisEntries)?,
        )?;
        self.fields.iter().try_for_each(|s| write_string(w, s))
    }
}

/// Vorbis comment metadata tag fields
///
/// Not all of these fields are officially defined in the specification,
/// but they are in common use.
pub mod fields {
    /// Name of current work
    pub const TITLE: &str = "TITLE";

    /// Artist generally responsible for the current work
    pub const ARTIST: &str = "ARTIST";

    /// Album name of work
    pub const ALBUM: &str = "ALBUM";

    /// Date work was recorded
    pub const DATE: &str = "DATE";

    /// Track number
    pub const TRACK_NUMBER: &str = "TRACKNUMBER";

    /// Total tracks
    pub const TRACK_TOTAL: &str = "TRACKTOTAL";

    /// Channel mask of file
    pub const CHANNEL_MASK: &str = "WAVEFORMATEXTENSIBLE_CHANNEL_MASK";

    /// ReplayGain track gain
    pub const RG_TRACK_GAIN: &str = "REPLAYGAIN_TRACK_GAIN";

    /// ReplayGain album gain
    pub const RG_ALBUM_GAIN: &str = "REPLAYGAIN_ALBUM_GAIN";

    /// ReplayGain track peak
    pub const RG_TRACK_PEAK: &str = "REPLAYGAIN_TRACK_PEAK";

    /// ReplayGain album peak
    pub const RG_ALBUM_PEAK: &str = "REPLAYGAIN_ALBUM_PEAK";

    /// ReplayGain reference loudness
    pub const RG_REFERENCE_LOUDNESS: &str = "REPLAYGAIN_REFERENCE_LOUDNESS";

    /// Disc table of contents
    pub const CDTOC: &str = "CDTOC";

    /// All ReplayGain fields
    pub const REPLAYGAIN: [&str; 5] = [
        RG_TRACK_GAIN,
        RG_TRACK_PEAK,
        RG_ALBUM_GAIN,
        RG_ALBUM_PEAK,
        RG_REFERENCE_LOUDNESS,
    ];
}

/// A fix applied while cleaning a file or its metadata
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fix {
    /// STREAMINFO moved to the start of the metadata
    ReorderedStreaminfo,
    /// Redundant STREAMINFO blocks removed
    MultipleStreaminfo,
    /// Redundant VORBIS_COMMENT blocks removed
    MultipleVorbisComment,
    /// Redundant SEEKTABLE blocks removed
    MultipleSeekTable,
    /// Redundant CUESHEET blocks removed
    MultipleCuesheet,
    /// Seek points with no samples removed
    RemovedEmptySeekPoints,
    /// Seek points sorted into ascending order
    ReorderedSeekPoints,
    /// PICTURE fields updated to match its image data
    FixedPictureFields,
    /// Comment entry with no `=` separator removed
    RemovedInvalidComment(String),
    /// Whitespace trimmed from the given field's value
    TrimmedWhitespace(String),
    /// Field with empty value removed
    RemovedEmptyField(String),
    /// Leading ID3v2 tag removed
    RemovedId3v2,
    /// Trailing ID3v1 tag removed
    RemovedId3v1,
    /// Empty MD5 sum calculated from decoded audio
    PopulatedMd5,
    /// Channel mask field added to comment
    AddedChannelMask,
    /// Invalid SEEKTABLE rebuilt
    FixedSeekTable,
    /// Missing SEEKTABLE added
    AddedSeekTable,
}

impl std::fmt::Display for Fix {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ReorderedStreaminfo => "moved STREAMINFO to first block".fmt(f),
            Self::MultipleStreaminfo => "removed multiple STREAMINFO blocks".fmt(f),
            Self::MultipleVorbisComment => "removed multiple VORBIS_COMMENT blocks".fmt(f),
            Self::MultipleSeekTable => "removed multiple SEEKTABLE blocks".fmt(f),
            Self::MultipleCuesheet => "removed multiple CUESHEET blocks".fmt(f),
            Self::RemovedEmptySeekPoints => "removed empty seekpoints from seektable".fmt(f),
            Self::ReorderedSeekPoints => "reordered seektable to be in ascending order".fmt(f),
            Self::FixedPictureFields => "fixed embedded image metadata fields".fmt(f),
            Self::RemovedInvalidComment(s) => write!(f, "removed invalid comment \"{s}\""),
            Self::TrimmedWhitespace(k) => write!(f, "removed whitespace from {k}"),
            Self::RemovedEmptyField(k) => write!(f, "removed empty field {k}"),
            Self::RemovedId3v2 => "removed ID3v2 tag".fmt(f),
            Self::RemovedId3v1 => "removed ID3v1 tag".fmt(f),
            Self::PopulatedMd5 => "populated empty MD5SUM".fmt(f),
            Self::AddedChannelMask => "added WAVEFORMATEXTENSIBLE_CHANNEL_MASK".fmt(f),
            Self::FixedSeekTable => "fixed invalid SEEKTABLE".fmt(f),
            Self::AddedSeekTable => "added SEEKTABLE".fmt(f),
        }
    }
}
