// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::cuesheet::Sheet;
use super::private::BlockVariant;
use super::{
    AsBlockRef, Block, BlockRef, BlockType, Cuesheet, Fix, MetadataBlock, Padding, Picture,
    Streaminfo, VorbisComment, check_blocks, fields, read_blocks, stream_offset,
};
use crate::{Error, Options};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// An ordered collection of metadata blocks
///
/// Unlike [`write_blocks`](super::write_blocks), this collection
/// tolerates structural defects such as a misplaced STREAMINFO
/// or duplicate SEEKTABLEs so that they can be repaired
/// with [`BlockList::clean`].
/// Those defects are checked for only when the blocks are written.
///
/// # Example
///
/// ```
/// use flac_meta::metadata::{BlockList, BlockType, Padding, Streaminfo, VorbisComment};
///
/// let mut blocklist = BlockList::new();
/// blocklist.add(Padding::default());
/// blocklist.add(VorbisComment::new("vendor"));
/// blocklist.add(Streaminfo::new(44100, 2, 16));
///
/// // blocks are inserted in their preferred position
/// assert_eq!(
///     blocklist.blocks().map(|b| b.block_type()).collect::<Vec<_>>(),
///     vec![BlockType::Streaminfo, BlockType::VorbisComment, BlockType::Padding],
/// );
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockList {
    blocks: Vec<Block>,
}

impl BlockList {
    /// Creates empty `BlockList`
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `BlockList` from the given reader
    ///
    /// This assumes the reader is positioned at
    /// the start of the "fLaC" tag.
    ///
    /// Because this may perform many small reads,
    /// using a buffered reader is preferred when
    /// reading from a raw file.
    ///
    /// # Errors
    ///
    /// Returns any error reading or parsing metadata blocks
    pub fn read<R: std::io::Read>(r: R) -> Result<Self, Error> {
        read_blocks(r).collect()
    }

    /// Reads `BlockList` from the given file path
    ///
    /// Any leading ID3v2 tag is skipped.
    ///
    /// # Errors
    ///
    /// Returns any error reading or parsing metadata blocks
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let mut r = BufReader::new(File::open(p.as_ref())?);
        stream_offset(&mut r)?;
        Self::read(r)
    }

    /// Iterates over all the metadata blocks
    pub fn blocks(&self) -> impl Iterator<Item = BlockRef<'_>> {
        self.blocks.iter().map(|b| b.as_block_ref())
    }

    /// Returns number of blocks in the list
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the list contains no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns reference to our first STREAMINFO block, if any
    pub fn streaminfo(&self) -> Option<&Streaminfo> {
        self.get()
    }

    /// Inserts block at its preferred position
    ///
    /// Blocks are ordered STREAMINFO, SEEKTABLE, CUESHEET,
    /// VORBIS_COMMENT, PICTURE, APPLICATION and PADDING.
    /// The new block goes immediately before the first
    /// existing block whose type belongs later,
    /// or at the end if there is none.
    pub fn add<B: Into<Block>>(&mut self, block: B) {
        self.insert(block.into());
    }

    fn insert(&mut self, block: Block) -> usize {
        let position = block.block_type().preferred_position();
        let index = self
            .blocks
            .iter()
            .position(|b| b.block_type().preferred_position() > position)
            .unwrap_or(self.blocks.len());
        self.blocks.insert(index, block);
        index
    }

    /// Gets reference to metadata block, if present
    ///
    /// If the block type occurs multiple times,
    /// this returns the first instance.
    pub fn get<B: MetadataBlock>(&self) -> Option<&B> {
        self.blocks.iter().find_map(B::from_block)
    }

    /// Gets mutable reference to metadata block, if present
    ///
    /// If the block type occurs multiple times,
    /// this returns the first instance.
    pub fn get_mut<B: MetadataBlock>(&mut self) -> Option<&mut B> {
        self.blocks.iter_mut().find_map(B::from_block_mut)
    }

    /// Gets references to all metadata blocks of the given type
    pub fn get_all<'b, B: MetadataBlock + 'b>(&'b self) -> impl Iterator<Item = &'b B> {
        self.blocks.iter().filter_map(B::from_block)
    }

    /// Gets exclusive references to all metadata blocks of the given type
    pub fn get_all_mut<'b, B: MetadataBlock + 'b>(
        &'b mut self,
    ) -> impl Iterator<Item = &'b mut B> {
        self.blocks.iter_mut().filter_map(B::from_block_mut)
    }

    /// Returns `true` if block exists in list
    pub fn has<B: MetadataBlock>(&self) -> bool {
        self.get::<B>().is_some()
    }

    /// Removes all instances of the given metadata block type
    pub fn remove<B: MetadataBlock>(&mut self) {
        self.blocks.retain(|b| b.block_type() != B::TYPE)
    }

    /// Replaces all instances of the given block type
    ///
    /// Existing blocks are replaced in order, one for one.
    /// Any existing blocks left over are removed
    /// while any replacements left over are
    /// inserted with [`BlockList::add`].
    ///
    /// # Example
    ///
    /// ```
    /// use flac_meta::metadata::{Application, BlockList, Padding, Streaminfo};
    ///
    /// let app = |id| Application { id, data: vec![] };
    ///
    /// let mut blocklist = BlockList::from_iter([
    ///     Streaminfo::new(44100, 2, 16).into(),
    ///     app(1).into(),
    ///     Padding::default().into(),
    ///     app(2).into(),
    /// ]);
    ///
    /// blocklist.replace_all([app(3)]);
    /// assert_eq!(blocklist.get_all::<Application>().collect::<Vec<_>>(), vec![&app(3)]);
    /// assert_eq!(blocklist.len(), 3);
    ///
    /// blocklist.replace_all([app(4), app(5)]);
    /// assert_eq!(blocklist.get_all::<Application>().collect::<Vec<_>>(), vec![&app(4), &app(5)]);
    /// ```
    pub fn replace_all<B: MetadataBlock>(&mut self, replacements: impl IntoIterator<Item = B>) {
        let mut replacements = replacements.into_iter();

        self.blocks = std::mem::take(&mut self.blocks)
            .into_iter()
            .filter_map(|block| match block.block_type() == B::TYPE {
                true => replacements.next().map(|b| b.into()),
                false => Some(block),
            })
            .collect();

        replacements.for_each(|b| self.add(b));
    }

    /// Total size of all blocks, in bytes, including their headers
    ///
    /// The "fLaC" tag is not included,
    /// nor are any blocks too large to be written.
    pub fn size(&self) -> u64 {
        self.blocks()
            .filter(|b| b.block_size().is_some())
            .map(|b| 4 + b.bytes())
            .sum()
    }

    /// Verifies that our blocks are valid to be written
    ///
    /// # Errors
    ///
    /// Returns an error if the STREAMINFO block is missing
    /// or not first, or if any block which may occur only once
    /// occurs multiple times.
    pub fn check(&self) -> Result<(), Error> {
        check_blocks(&self.blocks)
    }

    /// Returns a fixed copy of ourself along with the fixes performed
    ///
    /// The first STREAMINFO block is moved to the front
    /// and any later ones are removed.
    /// Only the first SEEKTABLE, VORBIS_COMMENT and CUESHEET
    /// blocks are kept.
    /// VORBIS_COMMENT, SEEKTABLE and PICTURE blocks are
    /// cleaned themselves, and their fixes are included.
    ///
    /// # Example
    ///
    /// ```
    /// use flac_meta::metadata::{BlockList, Fix, Padding, SeekTable, Streaminfo};
    ///
    /// let blocklist = BlockList::from_iter([
    ///     Padding::default().into(),
    ///     Streaminfo::new(44100, 2, 16).into(),
    ///     SeekTable::default().into(),
    ///     SeekTable::default().into(),
    /// ]);
    /// assert!(blocklist.check().is_err());
    ///
    /// let (cleaned, fixes) = blocklist.clean();
    /// assert!(cleaned.check().is_ok());
    /// assert_eq!(fixes, vec![Fix::ReorderedStreaminfo, Fix::MultipleSeekTable]);
    /// ```
    pub fn clean(&self) -> (Self, Vec<Fix>) {
        fn has(blocks: &[Block], block_type: BlockType) -> bool {
            blocks.iter().any(|b| b.block_type() == block_type)
        }

        let mut fixes = Vec::new();
        let mut cleaned: Vec<Block> = Vec::with_capacity(self.blocks.len());

        for block in self.blocks.iter() {
            match block {
                Block::Streaminfo(_) => match cleaned.first() {
                    None => cleaned.push(block.clone()),
                    Some(Block::Streaminfo(_)) => fixes.push(Fix::MultipleStreaminfo),
                    Some(_) => {
                        fixes.push(Fix::ReorderedStreaminfo);
                        cleaned.insert(0, block.clone());
                    }
                },
                Block::VorbisComment(_) if has(&cleaned, BlockType::VorbisComment) => {
                    fixes.push(Fix::MultipleVorbisComment)
                }
                Block::VorbisComment(comment) => {
                    let (comment, comment_fixes) = comment.clean();
                    cleaned.push(comment.into());
                    fixes.extend(comment_fixes);
                }
                Block::SeekTable(_) if has(&cleaned, BlockType::SeekTable) => {
                    fixes.push(Fix::MultipleSeekTable)
                }
                Block::SeekTable(seektable) => {
                    let (seektable, seektable_fixes) = seektable.clean();
                    cleaned.push(seektable.into());
                    fixes.extend(seektable_fixes);
                }
                Block::Cuesheet(_) if has(&cleaned, BlockType::Cuesheet) => {
                    fixes.push(Fix::MultipleCuesheet)
                }
                Block::Picture(picture) => {
                    let (picture, picture_fixes) = picture.clean();
                    cleaned.push(picture.into());
                    fixes.extend(picture_fixes);
                }
                Block::Cuesheet(_) | Block::Application(_) | Block::Padding(_) => {
                    cleaned.push(block.clone())
                }
            }
        }

        for fix in fixes.iter() {
            log::info!("{fix}");
        }

        (Self { blocks: cleaned }, fixes)
    }

    /// Returns the blocks we have in common with another list
    ///
    /// Blocks are kept if an equal block is present in both lists,
    /// except for VORBIS_COMMENT blocks which are
    /// merged field-by-field with
    /// [`VorbisComment::intersection`].
    pub fn intersection(&self, other: &Self) -> Self {
        self.blocks
            .iter()
            .filter_map(|block| match (block, other.comment()) {
                (Block::VorbisComment(comment), Some(other_comment)) => {
                    Some(comment.intersection(other_comment).into())
                }
                (block, _) => other.blocks.contains(block).then(|| block.clone()),
            })
            .collect()
    }

    /// Returns our VORBIS_COMMENT block, if any
    pub fn comment(&self) -> Option<&VorbisComment> {
        self.get()
    }

    /// Returns our VORBIS_COMMENT block, creating it if necessary
    ///
    /// A new block is given the vendor string
    /// and inserted at its preferred position.
    ///
    /// # Example
    ///
    /// ```
    /// use flac_meta::metadata::{BlockList, Streaminfo};
    /// use flac_meta::metadata::fields::TITLE;
    ///
    /// let mut blocklist = BlockList::from_iter([Streaminfo::new(44100, 2, 16).into()]);
    /// assert!(blocklist.comment().is_none());
    ///
    /// blocklist.comment_mut("vendor").set(TITLE, "Track Title");
    /// blocklist.comment_mut("other vendor").set(TITLE, "New Title");
    ///
    /// let comment = blocklist.comment().unwrap();
    /// assert_eq!(comment.vendor_string, "vendor");
    /// assert_eq!(comment.get(TITLE), Some("New Title"));
    /// ```
    pub fn comment_mut(&mut self, vendor_string: &str) -> &mut VorbisComment {
        let index = match self
            .blocks
            .iter()
            .position(|b| b.block_type() == BlockType::VorbisComment)
        {
            Some(index) => index,
            None => self.insert(VorbisComment::new(vendor_string).into()),
        };

        match &mut self.blocks[index] {
            Block::VorbisComment(comment) => comment,
            _ => unreachable!("VORBIS_COMMENT block not at its own index"),
        }
    }

    /// Returns ReplayGain values from our VORBIS_COMMENT block
    ///
    /// Returns `None` unless all four gain and peak
    /// fields are present and parseable.
    ///
    /// # Example
    ///
    /// ```
    /// use flac_meta::metadata::{BlockList, ReplayGain, Streaminfo};
    ///
    /// let mut blocklist = BlockList::from_iter([Streaminfo::new(44100, 2, 16).into()]);
    /// assert_eq!(blocklist.replay_gain(), None);
    ///
    /// let gain = ReplayGain {
    ///     track_gain: -6.5,
    ///     track_peak: 0.75,
    ///     album_gain: -7.25,
    ///     album_peak: 0.875,
    /// };
    /// blocklist.set_replay_gain(&gain, "vendor");
    /// assert_eq!(blocklist.replay_gain(), Some(gain));
    /// ```
    pub fn replay_gain(&self) -> Option<ReplayGain> {
        let comment = self.comment()?;

        let gain = |field: &str| {
            let value: &str = comment.get(field)?.trim();
            value
                .strip_suffix("dB")
                .unwrap_or(value)
                .trim_end()
                .parse::<f64>()
                .ok()
        };
        let peak = |field: &str| comment.get(field)?.trim().parse::<f64>().ok();

        Some(ReplayGain {
            track_gain: gain(fields::RG_TRACK_GAIN)?,
            track_peak: peak(fields::RG_TRACK_PEAK)?,
            album_gain: gain(fields::RG_ALBUM_GAIN)?,
            album_peak: peak(fields::RG_ALBUM_PEAK)?,
        })
    }

    /// Stores ReplayGain values in our VORBIS_COMMENT block
    ///
    /// The block is created with the given vendor string
    /// if necessary.  Any existing ReplayGain fields are replaced
    /// and the reference loudness is set to 89 dB.
    pub fn set_replay_gain(&mut self, replay_gain: &ReplayGain, vendor_string: &str) {
        let comment = self.comment_mut(vendor_string);
        comment.set(
            fields::RG_TRACK_GAIN,
            format!("{:.2} dB", replay_gain.track_gain),
        );
        comment.set(
            fields::RG_TRACK_PEAK,
            format!("{:.8}", replay_gain.track_peak),
        );
        comment.set(
            fields::RG_ALBUM_GAIN,
            format!("{:.2} dB", replay_gain.album_gain),
        );
        comment.set(
            fields::RG_ALBUM_PEAK,
            format!("{:.8}", replay_gain.album_peak),
        );
        comment.set(fields::RG_REFERENCE_LOUDNESS, "89.0 dB");
    }

    /// Removes all ReplayGain fields from our VORBIS_COMMENT block, if any
    pub fn delete_replay_gain(&mut self) {
        if let Some(comment) = self.get_mut::<VorbisComment>() {
            for field in fields::REPLAYGAIN {
                comment.remove(field);
            }
        }
    }

    /// Iterates over our PICTURE blocks
    pub fn images(&self) -> impl Iterator<Item = &Picture> {
        self.get_all()
    }

    /// Adds PICTURE block at its preferred position
    pub fn add_image(&mut self, picture: Picture) {
        self.add(picture)
    }

    /// Removes all PICTURE blocks equal to the given picture
    pub fn delete_image(&mut self, picture: &Picture) {
        self.blocks
            .retain(|b| !matches!(b, Block::Picture(p) if p == picture))
    }

    /// Returns the stream's speaker layout as a
    /// `WAVEFORMATEXTENSIBLE` channel mask
    ///
    /// Streams with more than two channels may carry
    /// their mask as a Vorbis comment.
    /// If that's absent or unparseable, the FLAC format's
    /// default layout for the channel count is returned.
    /// A mask whose channel count disagrees with the stream's
    /// indicates an undefined layout of 0.
    ///
    /// Returns `None` if there's no STREAMINFO block
    /// or if the channel count has no defined layout.
    pub fn channel_mask(&self) -> Option<u32> {
        let channels = self.streaminfo()?.channels.get();

        if channels <= 2 {
            return default_channel_mask(channels);
        }

        match self
            .comment()
            .and_then(|c| c.get(fields::CHANNEL_MASK))
            .and_then(parse_channel_mask)
        {
            Some(mask) if mask.count_ones() == u32::from(channels) => Some(mask),
            Some(_) => Some(0),
            None => default_channel_mask(channels),
        }
    }

    /// Applies a new set of tags to our blocks
    ///
    /// Our VORBIS_COMMENT block is replaced with the one from `new`,
    /// but keeps our existing vendor string, ReplayGain fields and
    /// `CDTOC` field.
    /// Our channel mask field is also kept for streams
    /// with more than 2 channels or more than 16 bits-per-sample.
    /// A new VORBIS_COMMENT with no predecessor has those
    /// fields removed, and gets a channel mask if the stream needs one.
    ///
    /// Our PICTURE blocks are replaced with those from `new`.
    /// Everything else is left as-is.
    pub fn apply_tags(&mut self, new: &BlockList) {
        let needs_mask = self
            .streaminfo()
            .map(|s| s.channels.get() > 2 || s.bits_per_sample.get() > 16)
            .unwrap_or(false);

        if let Some(new_comment) = new.comment() {
            let mut new_comment = new_comment.clone();

            match self.comment() {
                Some(old_comment) => {
                    new_comment
                        .vendor_string
                        .clone_from(&old_comment.vendor_string);

                    for field in fields::REPLAYGAIN {
                        new_comment.replace(field, old_comment.all(field));
                    }

                    if needs_mask && old_comment.get(fields::CHANNEL_MASK).is_some() {
                        new_comment.replace(
                            fields::CHANNEL_MASK,
                            old_comment.all(fields::CHANNEL_MASK),
                        );
                    } else {
                        new_comment.remove(fields::CHANNEL_MASK);
                    }

                    new_comment.replace(fields::CDTOC, old_comment.all(fields::CDTOC));

                    self.replace_all([new_comment]);
                }
                None => {
                    for field in fields::REPLAYGAIN {
                        new_comment.remove(field);
                    }

                    if needs_mask {
                        if let Some(mask) = self.channel_mask() {
                            new_comment.set(fields::CHANNEL_MASK, format!("0x{mask:04X}"));
                        }
                    }

                    new_comment.remove(fields::CDTOC);

                    self.add(new_comment);
                }
            }
        }

        self.replace_all(new.images().cloned());
    }

    /// Builds portable set of blocks from a comment and pictures
    ///
    /// The result has no STREAMINFO block,
    /// and is intended to be applied to an existing
    /// file with [`BlockList::apply_tags`].
    pub fn converted(
        comment: VorbisComment,
        images: impl IntoIterator<Item = Picture>,
        options: &Options,
    ) -> Self {
        std::iter::once(comment.into())
            .chain(images.into_iter().map(Block::from))
            .chain(std::iter::once(
                Padding {
                    size: options.padding,
                }
                .into(),
            ))
            .collect()
    }

    /// Returns copy of our CUESHEET block, if any,
    /// with its sample rate taken from our STREAMINFO
    pub fn cuesheet(&self) -> Option<Cuesheet> {
        let mut cuesheet = self.get::<Cuesheet>()?.clone();
        if let Some(streaminfo) = self.streaminfo() {
            cuesheet.set_sample_rate(streaminfo.sample_rate);
        }
        Some(cuesheet)
    }

    /// Replaces our CUESHEET block with one built from the given sheet
    ///
    /// The cuesheet is marked as CD-DA if the stream is
    /// 44100Hz, 2 channel, 16 bits-per-sample and has
    /// no more than 99 tracks.
    /// Any `CDTOC` field is removed from our VORBIS_COMMENT.
    ///
    /// Does nothing if we have no STREAMINFO block.
    pub fn set_cuesheet(&mut self, sheet: &Sheet) {
        let Some(streaminfo) = self.streaminfo() else {
            log::warn!("unable to add CUESHEET without STREAMINFO");
            return;
        };

        let is_cdda = streaminfo.sample_rate == 44100
            && streaminfo.channels.get() == 2
            && streaminfo.bits_per_sample.get() == 16
            && sheet.tracks.len() <= 99;

        let cuesheet = Cuesheet::converted(
            sheet,
            streaminfo.total_samples.map(|s| s.get()).unwrap_or_default(),
            streaminfo.sample_rate,
            is_cdda,
        );

        self.replace_all([cuesheet]);

        if let Some(comment) = self.get_mut::<VorbisComment>() {
            comment.remove(fields::CDTOC);
        }
    }

    /// Removes any CUESHEET blocks and `CDTOC` field
    pub fn delete_cuesheet(&mut self) {
        self.remove::<Cuesheet>();

        if let Some(comment) = self.get_mut::<VorbisComment>() {
            comment.remove(fields::CDTOC);
        }
    }
}

impl FromIterator<Block> for BlockList {
    fn from_iter<T: IntoIterator<Item = Block>>(iter: T) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for BlockList {
    type Item = Block;
    type IntoIter = std::vec::IntoIter<Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

impl<'b> IntoIterator for &'b BlockList {
    type Item = &'b Block;
    type IntoIter = std::slice::Iter<'b, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// A track's ReplayGain values
///
/// Gains are in dB and peaks are relative to full scale.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReplayGain {
    /// Track gain, in dB
    pub track_gain: f64,
    /// Track peak
    pub track_peak: f64,
    /// Album gain, in dB
    pub album_gain: f64,
    /// Album peak
    pub album_peak: f64,
}

// FLAC's default speaker layouts, by channel count
fn default_channel_mask(channels: u8) -> Option<u32> {
    match channels {
        1 => Some(0x4),
        2 => Some(0x3),
        3 => Some(0x7),
        4 => Some(0x33),
        5 => Some(0x37),
        6 => Some(0x3F),
        7 => Some(0x70F),
        8 => Some(0x63F),
        _ => None,
    }
}

fn parse_channel_mask(mask: &str) -> Option<u32> {
    let mask = mask.trim();
    let digits = mask
        .strip_prefix("0x")
        .or_else(|| mask.strip_prefix("0X"))
        .unwrap_or(mask);
    u32::from_str_radix(digits, 16).ok()
}
