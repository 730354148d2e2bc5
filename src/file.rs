// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! File-level operations which need an audio codec
//!
//! Repairing a file's MD5 sum or seek table, and converting
//! RIFF WAVE or AIFF files to and from FLAC, all require
//! decoding or encoding the file's audio frames.
//! These operations handle the file and its metadata
//! while an [`AudioCodec`] handles the audio.

use crate::codec::{AudioCodec, FrameSize};
use crate::foreign::{
    ChunkError, ForeignFormat, PcmReader, PcmWriter, header_footer, read_header, split, verify,
};
use crate::metadata::{
    BlockList, BlockSize, Fix, MetadataBlock, Padding, SeekPoint, SeekTable, Streaminfo,
    VorbisComment, fields, read_blocks, stream_offset, write_blocks,
};
use crate::{Counter, Error, Options};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

// size of an ID3v1 tag at the end of a file
const ID3V1_SIZE: u64 = 128;

/// A FLAC file opened for reading, with its metadata parsed
struct FlacFile {
    reader: BufReader<File>,
    blocks: BlockList,
    /// absolute position of the "fLaC" tag
    stream_start: u64,
    /// absolute position of the first frame
    frames_start: u64,
    /// absolute position just past the final frame
    frames_end: u64,
}

impl FlacFile {
    fn open(path: &Path) -> Result<Self, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        let len = reader.seek(SeekFrom::End(0))?;

        let frames_end = if len >= ID3V1_SIZE {
            let mut tag = [0; 3];
            reader.seek(SeekFrom::End(-(ID3V1_SIZE as i64)))?;
            reader.read_exact(&mut tag)?;
            match &tag {
                b"TAG" => len - ID3V1_SIZE,
                _ => len,
            }
        } else {
            len
        };

        reader.rewind()?;
        let stream_start = stream_offset(&mut reader)?;

        let mut counter = Counter::new(reader.by_ref());
        let blocks = read_blocks(counter.by_ref()).collect::<Result<BlockList, _>>()?;
        let frames_start = stream_start + counter.count;

        Ok(Self {
            reader,
            blocks,
            stream_start,
            frames_start,
            frames_end,
        })
    }

    fn streaminfo(&self) -> Result<&Streaminfo, Error> {
        self.blocks.streaminfo().ok_or(Error::MissingStreaminfo)
    }

    fn has_id3v1(&self, len: u64) -> bool {
        self.frames_end < len
    }

    // positions reader at first frame and returns reader over all frames
    fn frames(&mut self) -> Result<impl Read + '_, Error> {
        self.reader.seek(SeekFrom::Start(self.frames_start))?;
        Ok(self
            .reader
            .by_ref()
            .take(self.frames_end.saturating_sub(self.frames_start)))
    }

    // decodes all frames to the given sink, returning their sizes
    fn decode(
        &mut self,
        codec: &dyn AudioCodec,
        pcm: &mut dyn Write,
    ) -> Result<Vec<FrameSize>, Error> {
        let streaminfo = self.streaminfo()?.clone();
        let mut frames = self.frames()?;
        codec.decode(&mut frames, &streaminfo, pcm)
    }
}

/// Repairs common problems with a FLAC file
///
/// The following problems are fixed, in order:
///
/// - a leading ID3v2 tag is removed
/// - a trailing ID3v1 tag is removed
/// - an empty MD5 sum is calculated by decoding the stream
/// - a channel mask field is added to streams with more than
///   2 channels or more than 16 bits-per-sample
/// - an invalid SEEKTABLE is rebuilt, and a missing one
///   is added unless [`Options::no_seektable`] is set
/// - the metadata blocks are cleaned with [`BlockList::clean`]
///
/// If `output` is `None`, nothing is written
/// and the fixes are only reported.
/// Otherwise, the repaired file is written to `output`,
/// which may be the same as `path`.
///
/// # Errors
///
/// Returns an error if the file can't be read,
/// if the codec fails, or if the output can't be written.
pub fn clean_file(
    path: impl AsRef<Path>,
    output: Option<&Path>,
    codec: &dyn AudioCodec,
    options: &Options,
) -> Result<Vec<Fix>, Error> {
    let path = path.as_ref();
    let len = std::fs::metadata(path)?.len();
    let mut flac = FlacFile::open(path)?;
    let mut fixes = Vec::new();
    let mut frames: Option<Vec<FrameSize>> = None;

    if flac.stream_start > 0 {
        fixes.push(Fix::RemovedId3v2);
    }

    if flac.has_id3v1(len) {
        fixes.push(Fix::RemovedId3v1);
    }

    if flac.streaminfo()?.md5.is_none() {
        let mut md5 = md5::Context::new();
        frames = Some(flac.decode(codec, &mut md5)?);
        if let Some(streaminfo) = flac.blocks.get_mut::<Streaminfo>() {
            streaminfo.md5 = Some(md5.compute().0);
        }
        fixes.push(Fix::PopulatedMd5);
    }

    let streaminfo = flac.streaminfo()?.clone();

    if (streaminfo.channels.get() > 2 || streaminfo.bits_per_sample.get() > 16)
        && flac
            .blocks
            .comment()
            .and_then(|c| c.get(fields::CHANNEL_MASK))
            .is_none()
    {
        if let Some(mask) = flac.blocks.channel_mask() {
            flac.blocks
                .comment_mut(options.vendor_string())
                .set(fields::CHANNEL_MASK, format!("0x{mask:04X}"));
            fixes.push(Fix::AddedChannelMask);
        }
    }

    let interval = options.seekpoint_samples(streaminfo.sample_rate);
    let existing = flac.blocks.get::<SeekTable>().cloned();

    match existing {
        Some(seektable) => {
            if !seektable.is_valid(&mut flac.reader, flac.frames_start)? {
                let frames = match frames.take() {
                    Some(frames) => frames,
                    None => flac.decode(codec, &mut std::io::sink())?,
                };
                flac.blocks.replace_all([SeekTable::from_frames(
                    &frames,
                    interval.unwrap_or(u64::from(streaminfo.sample_rate) * 10),
                    total_samples(&streaminfo, &frames),
                )]);
                fixes.push(Fix::FixedSeekTable);
            }
        }
        None => {
            if let Some(interval) = interval {
                let frames = match frames.take() {
                    Some(frames) => frames,
                    None => flac.decode(codec, &mut std::io::sink())?,
                };
                flac.blocks.add(SeekTable::from_frames(
                    &frames,
                    interval,
                    total_samples(&streaminfo, &frames),
                ));
                fixes.push(Fix::AddedSeekTable);
            }
        }
    }

    for fix in fixes.iter() {
        log::info!("{fix}");
    }

    let (cleaned, block_fixes) = flac.blocks.clean();
    fixes.extend(block_fixes);

    if let Some(output) = output {
        use atomic_write_file::AtomicWriteFile;

        cleaned.check()?;

        let rewritten = AtomicWriteFile::open(output)?;
        {
            let mut w = BufWriter::new(rewritten.as_file());
            write_blocks(&mut w, &cleaned)?;
            std::io::copy(&mut flac.frames()?, &mut w)?;
            w.flush()?;
        }
        rewritten.commit()?;
    }

    Ok(fixes)
}

fn total_samples(streaminfo: &Streaminfo, frames: &[FrameSize]) -> u64 {
    streaminfo
        .total_samples
        .map(|s| s.get())
        .unwrap_or_else(|| frames.iter().map(|f| u64::from(f.samples)).sum())
}

/// Builds a fresh SEEKTABLE for the given FLAC file
///
/// Seek points are spaced according to
/// [`Options::seekpoint_interval`].
/// Returns `None` if [`Options::no_seektable`] is set.
///
/// # Errors
///
/// Returns an error if the file can't be read or the codec fails.
pub fn seektable(
    path: impl AsRef<Path>,
    codec: &dyn AudioCodec,
    options: &Options,
) -> Result<Option<SeekTable>, Error> {
    let mut flac = FlacFile::open(path.as_ref())?;
    let streaminfo = flac.streaminfo()?.clone();

    let Some(interval) = options.seekpoint_samples(streaminfo.sample_rate) else {
        return Ok(None);
    };

    let frames = flac.decode(codec, &mut std::io::sink())?;

    Ok(Some(SeekTable::from_frames(
        &frames,
        interval,
        total_samples(&streaminfo, &frames),
    )))
}

/// Converts a RIFF WAVE or AIFF file to FLAC
///
/// The source file's format is determined by its first four bytes.
/// All of its chunks other than its PCM samples are stored in
/// APPLICATION blocks, such that [`decode_foreign`] can
/// restore the original file exactly.
///
/// The new FLAC file at `path` is written atomically.
/// If the source file's chunks don't add up to the size
/// recorded in its header, nothing is written.
///
/// # Errors
///
/// Returns [`Error::InvalidChunkLayout`] if the source's chunks
/// are invalid, [`Error::ForeignContainerMismatch`] if their sizes
/// don't add up, or any error from the codec or I/O.
pub fn encode_foreign(
    path: impl AsRef<Path>,
    source: impl AsRef<Path>,
    codec: &dyn AudioCodec,
    options: &Options,
) -> Result<(), Error> {
    use atomic_write_file::AtomicWriteFile;

    let mut r = BufReader::new(File::open(source.as_ref())?);

    let mut tag = [0; 4];
    r.read_exact(&mut tag)?;
    let format = ForeignFormat::identify(tag).ok_or(ChunkError::UnknownContainer(tag))?;
    r.rewind()?;

    let header = read_header(format, r.by_ref())?;
    let payload_size = split(format, &header, &[])?.payload_size;

    // the footer follows the payload
    let payload_start = header.len() as u64;
    r.seek(SeekFrom::Start(payload_start + payload_size))?;
    let mut footer = Vec::new();
    r.read_to_end(&mut footer)?;

    let chunks = split(format, &header, &footer)?;
    verify(&chunks, header.len(), payload_size, footer.len())?;
    let (pcm, channel_mask) = chunks.pcm_format()?;

    log::info!(
        "storing {} {format} chunks as APPLICATION blocks",
        chunks.blocks.len()
    );

    let predicted_samples = payload_size / pcm.bytes_per_frame();

    // everything but STREAMINFO and SEEKTABLE is known before encoding
    let mut blocks = BlockList::new();
    blocks.add(VorbisComment::new(options.vendor_string()));
    if pcm.channels.get() > 2 || pcm.bits_per_sample.get() > 16 {
        if let Some(mask) = channel_mask {
            blocks
                .comment_mut(options.vendor_string())
                .set(fields::CHANNEL_MASK, format!("0x{mask:04X}"));
        }
    }
    chunks.blocks.iter().cloned().for_each(|b| blocks.add(b));

    // reserve room for a seek table at its largest
    let seektable = options
        .seekpoint_samples(pcm.sample_rate)
        .filter(|_| predicted_samples > 0)
        .and_then(|interval| {
            let placeholder = SeekTable {
                points: vec![
                    SeekPoint::PLACEHOLDER;
                    usize::try_from(predicted_samples.div_ceil(interval)).ok()?
                ],
            };
            placeholder
                .block_size()
                .is_some()
                .then_some((interval, placeholder))
        });

    if let Some((_, placeholder)) = &seektable {
        blocks.add(placeholder.clone());
    }
    blocks.add(Padding {
        size: options.padding,
    });
    blocks.add(Streaminfo::new(
        pcm.sample_rate,
        pcm.channels.get(),
        pcm.bits_per_sample.get(),
    ));

    let reserved = blocks.size();

    let rewritten = AtomicWriteFile::open(path.as_ref())?;

    r.seek(SeekFrom::Start(payload_start))?;
    let mut pcm_in = PcmReader::new(Counter::new(r.by_ref().take(payload_size)), format, &pcm);

    let encoded = {
        let mut w = BufWriter::new(rewritten.as_file());
        w.seek(SeekFrom::Start(4 + reserved))?;
        let encoded = codec.encode(&mut pcm_in, &pcm, &mut w)?;
        w.flush()?;
        encoded
    };

    // dropping the unfinished file discards it
    verify(
        &chunks,
        header.len(),
        pcm_in.into_inner().count,
        footer.len(),
    )?;

    blocks.replace_all([encoded.streaminfo]);

    if let Some((interval, placeholder)) = seektable {
        let seektable = SeekTable::from_frames(&encoded.frames, interval, predicted_samples);
        let padding = BlockSize::try_from(placeholder.bytes().saturating_sub(seektable.bytes()))
            .ok()
            .and_then(|unused| options.padding.checked_add(unused))
            .ok_or(Error::ExcessiveBlockSize)?;
        blocks.replace_all([seektable]);
        blocks.replace_all([Padding { size: padding }]);
    }

    {
        let mut w = BufWriter::new(rewritten.as_file());
        w.rewind()?;
        write_blocks(&mut w, &blocks)?;
        w.flush()?;
    }

    rewritten.commit()?;
    Ok(())
}

/// Converts a FLAC file back to RIFF WAVE or AIFF
///
/// The file's stored chunks are written around
/// its decoded PCM samples to `output`.
///
/// # Errors
///
/// Returns [`Error::NoForeignChunks`] if the file has no
/// chunks of the given format, [`Error::InvalidChunkLayout`]
/// if the stored chunks are inconsistent,
/// [`Error::ForeignContainerMismatch`]
/// if the decoded samples don't match the stored chunks,
/// or any error from the codec or I/O.
pub fn decode_foreign<W: Write>(
    path: impl AsRef<Path>,
    format: ForeignFormat,
    codec: &dyn AudioCodec,
    mut output: W,
) -> Result<(), Error> {
    let mut flac = FlacFile::open(path.as_ref())?;
    let (header, footer) = header_footer(&flac.blocks, format)?;
    let chunks = split(format, &header, &footer)?;
    let (pcm, _) = chunks.pcm_format()?;

    log::info!(
        "restoring {} {format} chunks from APPLICATION blocks",
        chunks.blocks.len()
    );

    output.write_all(&header)?;

    let mut pcm_out = PcmWriter::new(Counter::new(output.by_ref()), format, &pcm);
    flac.decode(codec, &mut pcm_out)?;
    let written = pcm_out.finish()?.count;

    verify(&chunks, header.len(), written, footer.len())?;

    output.write_all(&footer)?;
    output.flush()?;
    Ok(())
}
