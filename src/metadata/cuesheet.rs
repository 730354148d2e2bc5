// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::{BlockType, MetadataBlock};
use crate::Error;
use bitstream_io::{BitRead, BitWrite, FromBitStream, ToBitStream};
use num_rational::Ratio;

/// A CUESHEET metadata block
///
/// A cue sheet stores a disc's original layout
/// with all its tracks, index points, catalog number, etc.
///
/// This block may occur only once in a FLAC file.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 128×8 | `catalog_number` | media catalog number, NUL-padded ASCII
/// | 64   | `lead_in_samples` | number of lead-in samples
/// | 1    | `is_cdda` | whether cuesheet corresponds to CD-DA
/// | 7+258×8 | padding | all 0 bits
/// | 8    | track count | number of tracks, including lead-out
/// |      | `tracks` | cuesheet tracks
/// |      | `lead_out` | final lead-out track
///
/// Track offsets are in samples from the start of the stream
/// while index point offsets are in samples from the start
/// of their track.
/// Converting either to seconds requires the stream's sample rate,
/// which isn't stored in the block itself and must be supplied
/// with [`Cuesheet::set_sample_rate`].
#[derive(Debug, Clone)]
pub struct Cuesheet {
    /// Media catalog number, NUL-padded
    pub catalog_number: [u8; Self::CATALOG_LEN],
    /// Number of lead-in samples
    pub lead_in_samples: u64,
    /// Whether the cuesheet corresponds to a CD-DA disc
    pub is_cdda: bool,
    /// The ordinary tracks, not including the lead-out
    pub tracks: Vec<Track>,
    /// The lead-out track
    pub lead_out: Track,
    sample_rate: Option<u32>,
}

// the sample rate is transient and not part of the block's contents
impl PartialEq for Cuesheet {
    fn eq(&self, other: &Self) -> bool {
        self.catalog_number == other.catalog_number
            && self.lead_in_samples == other.lead_in_samples
            && self.is_cdda == other.is_cdda
            && self.tracks == other.tracks
            && self.lead_out == other.lead_out
    }
}

impl Eq for Cuesheet {}

impl Cuesheet {
    /// Size of catalog number in bytes
    pub const CATALOG_LEN: usize = 128;

    /// Lead-out track number of CD-DA cuesheets
    pub const LEAD_OUT_CDDA: u8 = 170;

    /// Lead-out track number of non-CD-DA cuesheets
    pub const LEAD_OUT_NON_CDDA: u8 = 255;

    /// Returns catalog number with NUL padding removed
    pub fn catalog(&self) -> &[u8] {
        trim_nulls(&self.catalog_number)
    }

    /// Sets the sample rate used to convert offsets to seconds
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = (sample_rate > 0).then_some(sample_rate);
    }

    /// Returns our sample rate, if set
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns track with the given number, if any
    pub fn track(&self, number: u8) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number == number)
    }

    /// Returns length of the given track in seconds
    ///
    /// This is the distance between the track's `INDEX 01`
    /// and the next track's `INDEX 01`, or the lead-out for
    /// the final track.
    ///
    /// Returns `None` if the track isn't found, if either track
    /// lacks an `INDEX 01`, or if no sample rate is set.
    ///
    /// # Example
    /// ```
    /// use flac_meta::metadata::cuesheet::{Cuesheet, Index, Track};
    /// use num_rational::Ratio;
    ///
    /// let track = |number, offset| Track {
    ///     offset,
    ///     number,
    ///     isrc: [0; 12],
    ///     non_audio: false,
    ///     pre_emphasis: false,
    ///     index_points: vec![Index { offset: 0, number: 1 }],
    /// };
    ///
    /// let mut cuesheet = Cuesheet::new(
    ///     true,
    ///     vec![track(1, 0), track(2, 44100)],
    ///     88200,
    /// );
    /// assert_eq!(cuesheet.track_length(1), None);
    ///
    /// cuesheet.set_sample_rate(44100);
    /// assert_eq!(cuesheet.track_length(1), Some(Ratio::from_integer(1)));
    /// ```
    pub fn track_length(&self, number: u8) -> Option<Ratio<u64>> {
        let sample_rate = u64::from(self.sample_rate?);
        let position = self.tracks.iter().position(|t| t.number == number)?;
        let start = self.tracks[position].index1_offset()?;
        let end = match self.tracks.get(position + 1) {
            Some(next) => next.index1_offset()?,
            None => self.lead_out.offset,
        };

        Some(Ratio::new(end.checked_sub(start)?, sample_rate))
    }

    /// Returns offset of track's index point in seconds
    /// from the start of the stream
    ///
    /// Returns `None` if the point isn't found or if no sample rate is set.
    pub fn index_offset(&self, track: u8, index: u8) -> Option<Ratio<u64>> {
        let sample_rate = u64::from(self.sample_rate?);
        let track = self.track(track)?;
        let index = track.index(index)?;
        Some(Ratio::new(track.offset.checked_add(index.offset)?, sample_rate))
    }

    /// Builds cuesheet from tracks, appending the lead-out
    /// at the given total samples
    pub fn new(is_cdda: bool, tracks: Vec<Track>, total_samples: u64) -> Self {
        Self {
            catalog_number: [0; Self::CATALOG_LEN],
            lead_in_samples: 0,
            is_cdda,
            tracks,
            lead_out: Track {
                offset: total_samples,
                number: if is_cdda {
                    Self::LEAD_OUT_CDDA
                } else {
                    Self::LEAD_OUT_NON_CDDA
                },
                isrc: [0; 12],
                non_audio: false,
                pre_emphasis: false,
                index_points: vec![],
            },
            sample_rate: None,
        }
    }

    /// Builds cuesheet from a generic [`Sheet`]
    ///
    /// Sheet offsets are converted to samples at the given rate,
    /// rounding down.  CD-DA cuesheets get 2 seconds of lead-in.
    pub fn converted(sheet: &Sheet, total_samples: u64, sample_rate: u32, is_cdda: bool) -> Self {
        let rate = Ratio::from_integer(u64::from(sample_rate));
        let samples = |seconds: Ratio<u64>| (seconds * rate).to_integer();

        let tracks = sheet
            .tracks
            .iter()
            .map(|track| {
                let offset = track
                    .indexes
                    .first()
                    .map(|index| samples(index.offset))
                    .unwrap_or_default();

                Track {
                    offset,
                    number: track.number,
                    isrc: pad_nulls(track.isrc.as_deref().unwrap_or_default()),
                    non_audio: !track.audio,
                    pre_emphasis: track.pre_emphasis,
                    index_points: track
                        .indexes
                        .iter()
                        .map(|index| Index {
                            offset: samples(index.offset).saturating_sub(offset),
                            number: index.number,
                        })
                        .collect(),
                }
            })
            .collect();

        let mut cuesheet = Self::new(is_cdda, tracks, total_samples);
        cuesheet.catalog_number =
            pad_nulls(sheet.catalog.as_deref().unwrap_or_default());
        if is_cdda {
            cuesheet.lead_in_samples = u64::from(sample_rate) * 2;
        }
        cuesheet.set_sample_rate(sample_rate);
        cuesheet
    }

    /// Converts cuesheet to a generic [`Sheet`]
    ///
    /// Returns `None` if no sample rate is set
    /// or if any index point lies beyond the range of sample offsets.
    pub fn to_sheet(&self) -> Option<Sheet> {
        let sample_rate = u64::from(self.sample_rate?);

        Some(Sheet {
            catalog: match self.catalog() {
                [] => None,
                catalog => Some(String::from_utf8_lossy(catalog).into_owned()),
            },
            tracks: self
                .tracks
                .iter()
                .map(|track| {
                    Some(SheetTrack {
                        number: track.number,
                        isrc: track.isrc().map(|s| s.to_owned()),
                        audio: !track.non_audio,
                        pre_emphasis: track.pre_emphasis,
                        indexes: track
                            .index_points
                            .iter()
                            .map(|index| {
                                Some(SheetIndex {
                                    number: index.number,
                                    offset: Ratio::new(
                                        track.offset.checked_add(index.offset)?,
                                        sample_rate,
                                    ),
                                })
                            })
                            .collect::<Option<_>>()?,
                    })
                })
                .collect::<Option<_>>()?,
        })
    }
}

super::block!(Cuesheet, Cuesheet);

impl MetadataBlock for Cuesheet {
    const TYPE: BlockType = BlockType::Cuesheet;

    fn bytes(&self) -> u64 {
        (Self::CATALOG_LEN as u64 + 8 + 259 + 1)
            + self
                .tracks
                .iter()
                .chain(std::iter::once(&self.lead_out))
                .map(|t| t.bytes())
                .sum::<u64>()
    }
}

impl FromBitStream for Cuesheet {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let catalog_number = r.read_to()?;
        let lead_in_samples = r.read_to()?;
        let is_cdda = r.read_bit()?;
        r.skip(7 + 258 * 8)?;
        let track_count = r.read_to::<u8>()?;

        let mut tracks = (0..track_count)
            .map(|_| r.parse())
            .collect::<Result<Vec<Track>, _>>()?;

        let lead_out = tracks.pop().ok_or(Error::CuesheetMissingLeadOut)?;

        Ok(Self {
            catalog_number,
            lead_in_samples,
            is_cdda,
            tracks,
            lead_out,
            sample_rate: None,
        })
    }
}

impl ToBitStream for Cuesheet {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.catalog_number)?;
        w.write_from(self.lead_in_samples)?;
        w.write_bit(self.is_cdda)?;
        w.pad(7 + 258 * 8)?;
        w.write_from::<u8>(
            (self.tracks.len() + 1)
                .try_into()
                .map_err(|_| Error::ExcessiveCuesheetEntries)?,
        )?;
        for track in self.tracks.iter() {
            w.build(track)?;
        }
        w.build(&self.lead_out)
    }
}

/// An individual CUESHEET track
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 64   | `offset` | offset of first index point, in samples
/// | 8    | `number` | track number
/// | 12×8 | `isrc`   | track's ISRC, NUL-padded
/// | 1    | `non_audio` | whether track is non-audio
/// | 1    | `pre_emphasis` | whether track has pre-emphasis
/// | 6+13×8 | padding | all 0 bits
/// | 8    | point count | number of index points
/// |      | `index_points` | index points
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Track {
    /// Offset of track, in samples from the start of the stream
    pub offset: u64,
    /// Track number
    pub number: u8,
    /// Track's ISRC, NUL-padded
    pub isrc: [u8; 12],
    /// Whether the track is non-audio
    pub non_audio: bool,
    /// Whether the track has pre-emphasis
    pub pre_emphasis: bool,
    /// The track's index points
    pub index_points: Vec<Index>,
}

impl Track {
    /// Returns ISRC with NUL padding removed, if any
    pub fn isrc(&self) -> Option<&str> {
        match trim_nulls(&self.isrc) {
            [] => None,
            isrc => std::str::from_utf8(isrc).ok(),
        }
    }

    /// Returns index point with the given number, if any
    pub fn index(&self, number: u8) -> Option<&Index> {
        self.index_points.iter().find(|i| i.number == number)
    }

    /// Returns offset of `INDEX 01` from the start of the stream, in samples
    pub fn index1_offset(&self) -> Option<u64> {
        self.index(1).and_then(|i| self.offset.checked_add(i.offset))
    }

    fn bytes(&self) -> u64 {
        36 + 12 * self.index_points.len() as u64
    }
}

impl FromBitStream for Track {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let offset = r.read_to()?;
        let number = r.read_to()?;
        let isrc = r.read_to()?;
        let non_audio = r.read_bit()?;
        let pre_emphasis = r.read_bit()?;
        r.skip(6 + 13 * 8)?;
        let index_point_count = r.read_to::<u8>()?;

        Ok(Self {
            offset,
            number,
            isrc,
            non_audio,
            pre_emphasis,
            index_points: (0..index_point_count)
                .map(|_| r.parse())
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl ToBitStream for Track {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.offset)?;
        w.write_from(self.number)?;
        w.write_from(self.isrc)?;
        w.write_bit(self.non_audio)?;
        w.write_bit(self.pre_emphasis)?;
        w.pad(6 + 13 * 8)?;
        w.write_from::<u8>(
            self.index_points
                .len()
                .try_into()
                .map_err(|_| Error::ExcessiveCuesheetEntries)?,
        )?;
        for point in self.index_points.iter() {
            w.build(point)?;
        }
        Ok(())
    }
}

/// An individual CUESHEET track index point
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 64   | `offset` | index point offset, in samples
/// | 8    | `number` | index point number
/// | 3×8  | padding  | all 0 bits
///
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Index {
    /// Offset in samples from beginning of track
    pub offset: u64,

    /// Track index point number
    pub number: u8,
}

impl FromBitStream for Index {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let offset = r.read_to()?;
        let number = r.read_to()?;
        r.skip(3 * 8)?;
        Ok(Self { offset, number })
    }
}

impl ToBitStream for Index {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.offset)?;
        w.write_from(self.number)?;
        w.pad(3 * 8)
    }
}

/// A format-independent cue sheet
///
/// Offsets are exact numbers of seconds from the start of the disc.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Sheet {
    /// Media catalog number, if any
    pub catalog: Option<String>,
    /// The sheet's tracks
    pub tracks: Vec<SheetTrack>,
}

/// A track in a format-independent cue sheet
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SheetTrack {
    /// Track number
    pub number: u8,
    /// Track's ISRC, if any
    pub isrc: Option<String>,
    /// Whether the track is audio
    pub audio: bool,
    /// Whether the track has pre-emphasis
    pub pre_emphasis: bool,
    /// The track's index points, in order
    pub indexes: Vec<SheetIndex>,
}

/// An index point in a format-independent cue sheet
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SheetIndex {
    /// Index point number
    pub number: u8,
    /// Offset in seconds from the start of the disc
    pub offset: Ratio<u64>,
}

// trims any trailing null bytes
fn trim_nulls(mut s: &[u8]) -> &[u8] {
    while let [rest @ .., 0] = s {
        s = rest;
    }
    s
}

// copies as much ASCII as fits, NUL-padding the remainder
// and replacing any non-ASCII character with '?'
fn pad_nulls<const N: usize>(s: &str) -> [u8; N] {
    let mut padded = [0; N];
    padded
        .iter_mut()
        .zip(s.chars().map(|c| u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'?')))
        .for_each(|(o, i)| *o = i);
    padded
}
