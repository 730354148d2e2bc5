// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::{BlockType, Fix, MetadataBlock};
use crate::Error;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, ByteRead, ByteReader, FromBitStream, LittleEndian,
    ToBitStream,
};
use std::num::NonZero;
use std::path::Path;

/// A PICTURE metadata block
///
/// Picture blocks are for embedding artwork
/// such as album covers, liner notes, etc.
///
/// This block may occur multiple times in a FLAC file.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | `picture_type` | picture type
/// | 32   | media type len | media type length, in bytes
/// | `media_type` len × 8 | `media_type` | picture's MIME type
/// | 32   | description len | description length, in bytes
/// | `description` len × 8 | `description` | description of picture, in UTF-8
/// | 32   | `width` | width of picture, in pixels
/// | 32   | `height`| height of picture, in pixels
/// | 32   | `color_depth` | color depth of picture in bits-per-pixel
/// | 32   | `colors_used` | for indexed-color pictures, number of colors used
/// | 32   | data len | length of picture data, in bytes
/// | `data` len × 8 | `data` | raw picture data
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_meta::metadata::{ImageRole, Picture, PictureType};
///
/// let data: &[u8] = &[
///     0x00, 0x00, 0x00, 0x04,  // picture type (back cover)
///     0x00, 0x00, 0x00, 0x09,  // media type len (9 bytes)
///     0x69, 0x6d, 0x61, 0x67, 0x65, 0x2f, 0x67, 0x69, 0x66,
///     0x00, 0x00, 0x00, 0x00,  // description len (0 bytes)
///     0x00, 0x00, 0x00, 0x02,  // width
///     0x00, 0x00, 0x00, 0x03,  // height
///     0x00, 0x00, 0x00, 0x00,  // color depth
///     0x00, 0x00, 0x00, 0x04,  // color count
///     0x00, 0x00, 0x00, 0x0d,  // data len (13 bytes)
///     0x47, 0x49, 0x46, 0x38, 0x39, 0x61,
///     0x02, 0x00, 0x03, 0x00, 0x81, 0x00, 0x00,
/// ];
///
/// let mut r = BitReader::endian(data, BigEndian);
/// let picture = r.parse::<Picture>().unwrap();
///
/// assert_eq!(picture.picture_type, PictureType::BackCover);
/// assert_eq!(picture.role(), ImageRole::BackCover);
/// assert_eq!(picture.media_type, "image/gif");
///
/// // the fields match what's in the GIF header
/// assert!(picture.clean().1.is_empty());
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Picture {
    /// The picture type
    pub picture_type: PictureType,
    /// The media type string as specified by RFC2046
    pub media_type: String,
    /// The description of the picture
    pub description: String,
    /// The width of the picture in pixels
    pub width: u32,
    /// The height of the picture in pixels
    pub height: u32,
    /// The color depth of the picture in bits per pixel
    pub color_depth: u32,
    /// For indexed-color pictures, the number of colors used
    pub colors_used: Option<NonZero<u32>>,
    /// The binary picture data
    pub data: Vec<u8>,
}

impl Picture {
    /// Attempt to create a new PICTURE block from raw image data
    ///
    /// Currently supported image types for this method are:
    ///
    /// - JPEG
    /// - PNG
    /// - GIF
    /// - BMP
    ///
    /// # Errors
    ///
    /// Returns an error if some problem occurs reading
    /// or identifying the image.
    pub fn new<S, V>(
        picture_type: PictureType,
        description: S,
        data: V,
    ) -> Result<Self, InvalidPicture>
    where
        S: Into<String>,
        V: Into<Vec<u8>> + AsRef<[u8]>,
    {
        let metrics = PictureMetrics::try_new(data.as_ref())?;
        Ok(Self {
            picture_type,
            description: description.into(),
            data: data.into(),
            media_type: metrics.media_type.to_owned(),
            width: metrics.width,
            height: metrics.height,
            color_depth: metrics.color_depth,
            colors_used: metrics.colors_used,
        })
    }

    /// Attempt to create new PICTURE block from file on disk
    pub fn open<S, P>(
        picture_type: PictureType,
        description: S,
        path: P,
    ) -> Result<Self, InvalidPicture>
    where
        S: Into<String>,
        P: AsRef<Path>,
    {
        std::fs::read(path)
            .map_err(InvalidPicture::Io)
            .and_then(|data| Self::new(picture_type, description, data))
    }

    /// Returns the generic role of our picture type
    pub fn role(&self) -> ImageRole {
        self.picture_type.into()
    }

    /// Returns a fixed copy of ourself along with the fixes performed
    ///
    /// If the media type or image metrics don't match
    /// what's in the image data itself, they are replaced.
    /// Pictures whose data can't be identified are left as-is.
    pub fn clean(&self) -> (Self, Vec<Fix>) {
        let metrics = match PictureMetrics::try_new(&self.data) {
            Ok(metrics) => metrics,
            Err(err) => {
                log::debug!("unable to inspect {} picture : {err}", self.picture_type);
                return (self.clone(), vec![]);
            }
        };

        if self.media_type == metrics.media_type
            && self.width == metrics.width
            && self.height == metrics.height
            && self.color_depth == metrics.color_depth
            && self.colors_used == metrics.colors_used
        {
            (self.clone(), vec![])
        } else {
            (
                Self {
                    media_type: metrics.media_type.to_owned(),
                    width: metrics.width,
                    height: metrics.height,
                    color_depth: metrics.color_depth,
                    colors_used: metrics.colors_used,
                    ..self.clone()
                },
                vec![Fix::FixedPictureFields],
            )
        }
    }
}

super::block!(Picture, Picture);

impl MetadataBlock for Picture {
    const TYPE: BlockType = BlockType::Picture;

    fn bytes(&self) -> u64 {
        4 + (4 + self.media_type.len() as u64)
            + (4 + self.description.len() as u64)
            + 4 * 4
            + (4 + self.data.len() as u64)
    }
}

impl FromBitStream for Picture {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        fn prefixed_field<R: BitRead + ?Sized>(r: &mut R) -> Result<Vec<u8>, Error> {
            let size = r.read_to::<u32>()?;
            r.read_to_vec(
                size.try_into()
                    .map_err(|_| Error::ExcessivePictureSize)?,
            )
            .map_err(Error::Io)
        }

        Ok(Self {
            picture_type: r.parse()?,
            media_type: String::from_utf8(prefixed_field(r)?)?,
            description: String::from_utf8(prefixed_field(r)?)?,
            width: r.read_to()?,
            height: r.read_to()?,
            color_depth: r.read_to()?,
            colors_used: r.read::<32, _>()?,
            data: prefixed_field(r)?,
        })
    }
}

impl ToBitStream for Picture {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        fn prefixed_field<W: BitWrite + ?Sized>(
            w: &mut W,
            field: &[u8],
            error: Error,
        ) -> Result<(), Error> {
            w.write_from::<u32>(field.len().try_into().map_err(|_| error)?)?;
            w.write_bytes(field).map_err(Error::Io)
        }

        w.build(&self.picture_type)?;
        prefixed_field(w, self.media_type.as_bytes(), Error::ExcessiveStringLength)?;
        prefixed_field(w, self.description.as_bytes(), Error::ExcessiveStringLength)?;
        w.write_from(self.width)?;
        w.write_from(self.height)?;
        w.write_from(self.color_depth)?;
        w.write::<32, _>(self.colors_used)?;
        prefixed_field(w, &self.data, Error::ExcessivePictureSize)
    }
}

/// Defined variants of PICTURE type
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PictureType {
    /// Other
    Other = 0,
    /// PNG file icon of 32x32 pixels
    Png32x32 = 1,
    /// General file icon
    GeneralFileIcon = 2,
    /// Front cover
    FrontCover = 3,
    /// Back cover
    BackCover = 4,
    /// Liner notes page
    LinerNotes = 5,
    /// Media label (e.g., CD, Vinyl or Cassette label)
    MediaLabel = 6,
    /// Lead artist, lead performer, or soloist
    LeadArtist = 7,
    /// Artist or performer
    Artist = 8,
    /// Conductor
    Conductor = 9,
    /// Band or orchestra
    Band = 10,
    /// Composer
    Composer = 11,
    /// Lyricist or text writer
    Lyricist = 12,
    /// Recording location
    RecordingLocation = 13,
    /// During recording
    DuringRecording = 14,
    /// During performance
    DuringPerformance = 15,
    /// Movie or video screen capture
    ScreenCapture = 16,
    /// A bright colored fish
    Fish = 17,
    /// Illustration
    Illustration = 18,
    /// Band or artist logotype
    BandLogo = 19,
    /// Publisher or studio logotype
    PublisherLogo = 20,
}

impl PictureType {
    const ALL: [Self; 21] = [
        Self::Other,
        Self::Png32x32,
        Self::GeneralFileIcon,
        Self::FrontCover,
        Self::BackCover,
        Self::LinerNotes,
        Self::MediaLabel,
        Self::LeadArtist,
        Self::Artist,
        Self::Conductor,
        Self::Band,
        Self::Composer,
        Self::Lyricist,
        Self::RecordingLocation,
        Self::DuringRecording,
        Self::DuringPerformance,
        Self::ScreenCapture,
        Self::Fish,
        Self::Illustration,
        Self::BandLogo,
        Self::PublisherLogo,
    ];
}

impl std::fmt::Display for PictureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Other => "Other".fmt(f),
            Self::Png32x32 => "32×32 PNG Icon".fmt(f),
            Self::GeneralFileIcon => "General File Icon".fmt(f),
            Self::FrontCover => "Cover (front)".fmt(f),
            Self::BackCover => "Cover (back)".fmt(f),
            Self::LinerNotes => "Liner Notes".fmt(f),
            Self::MediaLabel => "Media Label".fmt(f),
            Self::LeadArtist => "Lead Artist".fmt(f),
            Self::Artist => "Artist".fmt(f),
            Self::Conductor => "Conductor".fmt(f),
            Self::Band => "Band or Orchestra".fmt(f),
            Self::Composer => "Composer".fmt(f),
            Self::Lyricist => "Lyricist or Text Writer".fmt(f),
            Self::RecordingLocation => "Recording Location".fmt(f),
            Self::DuringRecording => "During Recording".fmt(f),
            Self::DuringPerformance => "During Performance".fmt(f),
            Self::ScreenCapture => "Movie or Video Screen Capture".fmt(f),
            Self::Fish => "A Bright Colored Fish".fmt(f),
            Self::Illustration => "Illustration".fmt(f),
            Self::BandLogo => "Band or Artist Logotype".fmt(f),
            Self::PublisherLogo => "Publisher or Studio Logotype".fmt(f),
        }
    }
}

impl TryFrom<u32> for PictureType {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self, Error> {
        usize::try_from(code)
            .ok()
            .and_then(|code| Self::ALL.get(code).copied())
            .ok_or(Error::InvalidPictureType)
    }
}

impl From<PictureType> for u32 {
    fn from(picture_type: PictureType) -> u32 {
        picture_type as u32
    }
}

impl FromBitStream for PictureType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        r.read_to::<u32>()?.try_into()
    }
}

impl ToBitStream for PictureType {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from::<u32>((*self).into())
    }
}

/// A format-independent role for an embedded image
///
/// Each of the 21 picture types maps onto one of these,
/// with anything not covered mapping to [`ImageRole::Other`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageRole {
    /// Front cover
    FrontCover,
    /// Back cover
    BackCover,
    /// Leaflet or liner notes page
    Leaflet,
    /// Media, such as a CD label
    Media,
    /// Anything else
    Other,
}

impl From<PictureType> for ImageRole {
    fn from(picture_type: PictureType) -> Self {
        match picture_type {
            PictureType::FrontCover => Self::FrontCover,
            PictureType::BackCover => Self::BackCover,
            PictureType::LinerNotes => Self::Leaflet,
            PictureType::MediaLabel => Self::Media,
            _ => Self::Other,
        }
    }
}

impl From<ImageRole> for PictureType {
    fn from(role: ImageRole) -> Self {
        match role {
            ImageRole::FrontCover => Self::FrontCover,
            ImageRole::BackCover => Self::BackCover,
            ImageRole::Leaflet => Self::LinerNotes,
            ImageRole::Media => Self::MediaLabel,
            ImageRole::Other => Self::Other,
        }
    }
}

/// An error when trying to identify a picture's metrics
#[derive(Debug)]
#[non_exhaustive]
pub enum InvalidPicture {
    /// An I/O Error
    Io(std::io::Error),
    /// Unsupported Image Format
    Unsupported,
    /// Invalid PNG File
    Png(&'static str),
    /// Invalid JPEG File
    Jpeg(&'static str),
    /// Invalid GIF File
    Gif(&'static str),
    /// Invalid BMP File
    Bmp(&'static str),
}

impl From<std::io::Error> for InvalidPicture {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl std::error::Error for InvalidPicture {}

impl std::fmt::Display for InvalidPicture {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::Unsupported => "unsupported image format".fmt(f),
            Self::Png(s) => write!(f, "PNG parsing error : {s}"),
            Self::Jpeg(s) => write!(f, "JPEG parsing error : {s}"),
            Self::Gif(s) => write!(f, "GIF parsing error : {s}"),
            Self::Bmp(s) => write!(f, "BMP parsing error : {s}"),
        }
    }
}

struct PictureMetrics {
    media_type: &'static str,
    width: u32,
    height: u32,
    color_depth: u32,
    colors_used: Option<NonZero<u32>>,
}

impl PictureMetrics {
    fn try_new(data: &[u8]) -> Result<Self, InvalidPicture> {
        if data.starts_with(b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A") {
            Self::try_png(data)
        } else if data.starts_with(b"\xFF\xD8\xFF") {
            Self::try_jpeg(data)
        } else if data.starts_with(b"GIF") {
            Self::try_gif(data)
        } else if data.starts_with(b"BM") {
            Self::try_bmp(data)
        } else {
            Err(InvalidPicture::Unsupported)
        }
    }

    fn try_png(data: &[u8]) -> Result<Self, InvalidPicture> {
        // only enough of PNG to get at the image metrics,
        // chunk CRC32s are not checked

        fn plte_colors<R: ByteRead>(mut r: R) -> Result<u32, InvalidPicture> {
            loop {
                let chunk_len = r.read::<u32>()?;
                match &r.read::<[u8; 4]>()? {
                    b"PLTE" if chunk_len % 3 == 0 => break Ok(chunk_len / 3),
                    b"PLTE" => break Err(InvalidPicture::Png("invalid PLTE length")),
                    _ => {
                        r.skip(chunk_len)?;
                        let _crc = r.read::<u32>()?;
                    }
                }
            }
        }

        let mut r = ByteReader::endian(data, BigEndian);
        r.skip(8)?;

        // IHDR chunk must be first
        if r.read::<u32>()? != 0x0d {
            return Err(InvalidPicture::Png("invalid IHDR length"));
        }
        if &r.read::<[u8; 4]>()? != b"IHDR" {
            return Err(InvalidPicture::Png("IHDR chunk not first"));
        }
        let width = r.read()?;
        let height = r.read()?;
        let bit_depth = u32::from(r.read::<u8>()?);
        let color_type = r.read::<u8>()?;
        // compression, filter, interlace, CRC
        r.skip(3 + 4)?;

        let (color_depth, colors_used) = match color_type {
            0 => (bit_depth, None),                  // grayscale
            2 => (bit_depth * 3, None),              // RGB
            3 => (0, NonZero::new(plte_colors(r)?)), // palette
            4 => (bit_depth * 2, None),              // grayscale + alpha
            6 => (bit_depth * 4, None),              // RGB + alpha
            _ => return Err(InvalidPicture::Png("invalid color type")),
        };

        Ok(Self {
            media_type: "image/png",
            width,
            height,
            color_depth,
            colors_used,
        })
    }

    fn try_jpeg(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = ByteReader::endian(data, BigEndian);
        r.skip(2)?;

        loop {
            if r.read::<u8>()? != 0xFF {
                break Err(InvalidPicture::Jpeg("invalid JPEG marker"));
            }
            match r.read::<u8>()? {
                // start-of-frame markers, minus DHT, JPG and DAC
                marker @ 0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                    let _len = r.read::<u16>()?;
                    let data_precision = u32::from(r.read::<u8>()?);
                    let height = r.read::<u16>()?;
                    let width = r.read::<u16>()?;
                    let components = u32::from(r.read::<u8>()?);
                    break Ok(Self {
                        media_type: "image/jpeg",
                        width: width.into(),
                        height: height.into(),
                        color_depth: data_precision * components,
                        colors_used: None,
                    });
                }
                _ => {
                    let segment_length = r
                        .read::<u16>()?
                        .checked_sub(2)
                        .ok_or(InvalidPicture::Jpeg("invalid segment length"))?;
                    r.skip(segment_length.into())?;
                }
            }
        }
    }

    fn try_gif(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = BitReader::endian(data, LittleEndian);

        // signature and version
        r.skip(6 * 8)?;

        let width = r.read::<16, u32>()?;
        let height = r.read::<16, u32>()?;
        let color_table_size = r.read::<3, u32>()?;
        let _sort = r.read_bit()?;
        let _color_resolution = r.read::<3, u8>()?;
        let _global_color_table = r.read_bit()?;

        Ok(Self {
            media_type: "image/gif",
            width,
            height,
            colors_used: NonZero::new(1 << (color_table_size + 1)),
            color_depth: 0,
        })
    }

    fn try_bmp(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = ByteReader::endian(data, LittleEndian);

        // signature, file size, reserved, pixel data offset
        r.skip(2 + 4 + 4 + 4)?;

        let (width, height, bits_per_pixel, colors_used) = match r.read::<u32>()? {
            12 => {
                // OS/2 BITMAPCOREHEADER
                let width = u32::from(r.read::<u16>()?);
                let height = u32::from(r.read::<u16>()?);
                let _planes = r.read::<u16>()?;
                (width, height, u32::from(r.read::<u16>()?), 0)
            }
            40.. => {
                let width = r.read::<i32>()?.unsigned_abs();
                // negative heights indicate top-down bitmaps
                let height = r.read::<i32>()?.unsigned_abs();
                let _planes = r.read::<u16>()?;
                let bits_per_pixel = u32::from(r.read::<u16>()?);
                // compression, image size, horizontal/vertical resolution
                r.skip(4 + 4 + 4 + 4)?;
                (width, height, bits_per_pixel, r.read::<u32>()?)
            }
            _ => return Err(InvalidPicture::Bmp("unsupported header size")),
        };

        Ok(match bits_per_pixel {
            1 | 4 | 8 => Self {
                media_type: "image/bmp",
                width,
                height,
                color_depth: 0,
                colors_used: NonZero::new(colors_used).or(NonZero::new(1 << bits_per_pixel)),
            },
            16 | 24 | 32 => Self {
                media_type: "image/bmp",
                width,
                height,
                color_depth: bits_per_pixel,
                colors_used: None,
            },
            _ => return Err(InvalidPicture::Bmp("invalid bits per pixel")),
        })
    }
}
