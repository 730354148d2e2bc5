// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::{BlockSize, BlockType, Fix, MetadataBlock};
use crate::Error;
use crate::codec::FrameSize;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, FromBitStream, FromBitStreamUsing, ToBitStream,
};

/// A SEEKTABLE metadata block
///
/// Because FLAC frames do not store their compressed length,
/// a seek table is used for random access within a FLAC file.
/// By mapping a sample number to a byte offset,
/// one can quickly reach different parts of the file
/// without decoding the whole thing.
///
/// Also note that seek point byte offsets are
/// relative to the start of the first FLAC frame,
/// and *not* relative to the start of the entire file.
/// This allows us to change the size of the set
/// of metadata blocks without having to recalculate
/// the contents of the seek table.
///
/// This block may occur only once in a FLAC file.
///
/// Its seekpoints occupy the entire block.
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::{BlockHeader, BlockType, SeekTable, SeekPoint};
///
/// let data: &[u8] = &[
///     0x83, 0x00, 0x00, 0x24,  // block header
///     // seekpoint 0
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x14,
///     // seekpoint 1
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x14,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0c,
///     0x00, 0x14,
/// ];
///
/// let mut r = BitReader::endian(data, BigEndian);
/// let header = r.parse::<BlockHeader>().unwrap();
/// assert_eq!(header.block_type, BlockType::SeekTable);
///
/// let seektable = r.parse_using::<SeekTable>(header.size).unwrap();
///
/// assert_eq!(
///     seektable.points,
///     vec![
///         SeekPoint {
///             sample_offset: 0x00,
///             byte_offset: 0x00,
///             frame_samples: 0x14,
///         },
///         SeekPoint {
///             sample_offset: 0x14,
///             byte_offset: 0x0c,
///             frame_samples: 0x14,
///         },
///     ],
/// );
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SeekTable {
    /// The seek table's individual seek points
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    /// The maximum number of seek points that fit into a seek table
    pub const MAX_POINTS: usize = (1 << 24) / SeekPoint::SIZE;

    /// Builds seek table from the sizes of a stream's frames
    ///
    /// One seek point is generated for every `interval` samples
    /// up to `total_samples`, each pointing at the start of
    /// the frame containing that sample.
    /// Seek points always land on frame boundaries,
    /// so frames larger than the interval yield fewer points.
    ///
    /// # Example
    /// ```
    /// use flac_meta::metadata::SeekTable;
    /// use flac_meta::codec::FrameSize;
    ///
    /// let frames = [FrameSize { bytes: 10, samples: 4 }; 3];
    /// let seektable = SeekTable::from_frames(&frames, 2, 12);
    ///
    /// assert_eq!(
    ///     seektable.points.iter().map(|p| p.sample_offset).collect::<Vec<_>>(),
    ///     vec![0, 4, 8],
    /// );
    /// ```
    pub fn from_frames(frames: &[FrameSize], interval: u64, total_samples: u64) -> Self {
        // (sample offset, byte offset, frame samples) of each frame
        let mut sample_offset = 0;
        let mut byte_offset = 0;
        let all_frames = frames
            .iter()
            .map(|frame| {
                let point = SeekPoint {
                    sample_offset,
                    byte_offset,
                    frame_samples: frame.samples,
                };
                sample_offset += u64::from(frame.samples);
                byte_offset += u64::from(frame.bytes);
                point
            })
            .collect::<Vec<_>>();

        let mut points: Vec<SeekPoint> = Vec::new();

        if all_frames.is_empty() {
            return Self { points };
        }

        let step = usize::try_from(interval.max(1)).unwrap_or(usize::MAX);

        for target in (0..total_samples).step_by(step) {
            let frame = &all_frames[all_frames
                .partition_point(|f| f.sample_offset <= target)
                .saturating_sub(1)];

            if points.last() != Some(frame) {
                points.push(frame.clone());
            }
        }

        Self { points }
    }

    /// Returns `true` if every seek point lands on a valid frame header
    ///
    /// `frames_start` is the absolute position of the first
    /// frame in the stream, just past the final metadata block.
    /// Placeholder points are not checked.
    ///
    /// # Errors
    ///
    /// Passes along any I/O errors other than hitting
    /// the end of the stream.
    pub fn is_valid<R>(&self, mut reader: R, frames_start: u64) -> Result<bool, Error>
    where
        R: std::io::Read + std::io::Seek,
    {
        fn frame_sync<R: std::io::Read>(reader: R) -> std::io::Result<bool> {
            let mut r = BitReader::endian(reader, BigEndian);
            let sync = r.read::<14, u16>()?;
            let reserved_1 = r.read_bit()?;
            r.skip(1 + 4 + 4 + 4 + 3)?;
            let reserved_2 = r.read_bit()?;
            Ok(sync == 0b11111111111110 && !reserved_1 && !reserved_2)
        }

        for point in self.points.iter().filter(|p| !p.is_placeholder()) {
            reader.seek(std::io::SeekFrom::Start(frames_start + point.byte_offset))?;
            match frame_sync(reader.by_ref()) {
                Ok(true) => continue,
                Ok(false) => {
                    log::debug!("no frame header at seek point {point:?}");
                    return Ok(false);
                }
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(true)
    }

    /// Returns a fixed copy of ourself along with the fixes performed
    ///
    /// Points with no samples (including placeholders) are removed,
    /// and the remaining points are deduplicated and sorted
    /// by sample offset and byte offset.
    pub fn clean(&self) -> (Self, Vec<Fix>) {
        let mut fixes = Vec::new();

        let nonempty = self
            .points
            .iter()
            .filter(|p| p.frame_samples != 0)
            .cloned()
            .collect::<Vec<_>>();

        if nonempty.len() != self.points.len() {
            fixes.push(Fix::RemovedEmptySeekPoints);
        }

        let mut ascending = nonempty.clone();
        ascending.sort();
        ascending.dedup();

        if ascending != nonempty {
            fixes.push(Fix::ReorderedSeekPoints);
        }

        (Self { points: ascending }, fixes)
    }
}

super::block!(SeekTable, SeekTable);

impl MetadataBlock for SeekTable {
    const TYPE: BlockType = BlockType::SeekTable;

    fn bytes(&self) -> u64 {
        (self.points.len() * SeekPoint::SIZE) as u64
    }
}

impl FromBitStreamUsing for SeekTable {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        match (size.get() / 18, size.get() % 18) {
            (p, 0) => Ok(Self {
                points: (0..p)
                    .map(|_| r.parse())
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            _ => Err(Error::InvalidSeekTableSize),
        }
    }
}

impl ToBitStream for SeekTable {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        self.points
            .iter()
            .try_for_each(|point| w.build(point))
            .map_err(Error::Io)
    }
}

/// An individual SEEKTABLE seek point
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 64   | `sample_offset` | sample number of first sample in target frame
/// | 64   | `byte_offset` | offset, in bytes, from first frame to target frame's header
/// | 16   | `frame_samples` | number of samples in target frame
///
/// A sample offset of 2⁶⁴ - 1 marks a placeholder point,
/// whose other fields are preserved as-is.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SeekPoint {
    /// The sample number of the first sample in the target frame
    pub sample_offset: u64,
    /// Offset, in bytes, from the first byte of the first frame header
    /// to the first byte in the target frame's header
    pub byte_offset: u64,
    /// Number of samples in the target frame
    pub frame_samples: u16,
}

impl SeekPoint {
    const SIZE: usize = (64 + 64 + 16) / 8;

    /// A placeholder seek point
    pub const PLACEHOLDER: SeekPoint = SeekPoint {
        sample_offset: u64::MAX,
        byte_offset: 0,
        frame_samples: 0,
    };

    /// Whether this is a placeholder point
    pub fn is_placeholder(&self) -> bool {
        self.sample_offset == u64::MAX
    }
}

impl FromBitStream for SeekPoint {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            sample_offset: r.read_to()?,
            byte_offset: r.read_to()?,
            frame_samples: r.read_to()?,
        })
    }
}

impl ToBitStream for SeekPoint {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.sample_offset)?;
        w.write_from(self.byte_offset)?;
        w.write_from(self.frame_samples)
    }
}
