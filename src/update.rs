// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For writing updated metadata back to FLAC files
//!
//! If a file's metadata changes size, the file's existing
//! PADDING blocks may be able to absorb the difference.
//! In that case only the metadata at the start of the file
//! needs to be overwritten, leaving its audio frames alone.
//!
//! Otherwise, the entire file must be rewritten
//! with the new metadata followed by the original audio frames.
//! That happens in a scratch file which replaces the original
//! only once it has been completely written.

use crate::metadata::{
    BlockList, BlockSize, FLAC_TAG, Padding, read_blocks, stream_offset, write_block_sequence,
};
use crate::{Counter, Error, Options};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// How updated metadata is written to disk
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Plan {
    /// Only the metadata blocks are overwritten
    Patch,
    /// The entire file is rewritten
    Rewrite,
}

/// Decides how to write the `new` blocks over the `old` ones
///
/// Patching in place is possible only if the old blocks
/// have at least one PADDING block, the new blocks have
/// the same PADDING blocks as the old ones, the total padding
/// is enough to absorb any growth, and the padding left over
/// afterward is no more than [`Options::max_padding`].
///
/// When patching, the PADDING blocks in `new` are resized so that
/// the new blocks take exactly as much space as the old ones.
/// Growth is taken from each PADDING block in turn
/// until it is exhausted, while shrinkage is added
/// entirely to the first PADDING block.
///
/// # Example
///
/// ```
/// use flac_meta::Options;
/// use flac_meta::metadata::{Application, BlockList, Padding, Streaminfo};
/// use flac_meta::update::{Plan, plan};
///
/// let old = BlockList::from_iter([
///     Streaminfo::new(44100, 2, 16).into(),
///     Padding { size: 100u8.into() }.into(),
/// ]);
///
/// let mut new = old.clone();
/// new.add(Application { id: 1, data: vec![0; 10] });
///
/// assert_eq!(plan(&old, &mut new, &Options::default()), Plan::Patch);
/// assert_eq!(new.get::<Padding>(), Some(&Padding { size: 82u8.into() }));
/// assert_eq!(new.size(), old.size());
/// ```
pub fn plan(old: &BlockList, new: &mut BlockList, options: &Options) -> Plan {
    let old_padding = old
        .get_all::<Padding>()
        .map(|p| p.size)
        .collect::<Vec<_>>();

    if old_padding.is_empty() {
        log::debug!("no PADDING blocks, rewriting file");
        return Plan::Rewrite;
    }

    if !new.get_all::<Padding>().map(|p| p.size).eq(old_padding.iter().copied()) {
        log::debug!("PADDING blocks changed, rewriting file");
        return Plan::Rewrite;
    }

    let available = old_padding.iter().copied().map(u64::from).sum::<u64>();
    let delta = i128::from(new.size()) - i128::from(old.size());
    let remaining = i128::from(available) - delta;

    if remaining < 0 {
        log::debug!("metadata grew by {delta} bytes, only {available} bytes of padding available");
        return Plan::Rewrite;
    }

    if remaining > i128::from(options.max_padding) {
        log::debug!(
            "{remaining} bytes of padding would exceed maximum of {}",
            options.max_padding
        );
        return Plan::Rewrite;
    }

    match adjust_padding(&old_padding, delta) {
        Some(adjusted) => {
            new.get_all_mut::<Padding>()
                .zip(adjusted)
                .for_each(|(padding, size)| padding.size = size);
            log::debug!("patching metadata in place, padding adjusted by {}", -delta);
            Plan::Patch
        }
        None => {
            log::debug!("unable to adjust padding by {}, rewriting file", -delta);
            Plan::Rewrite
        }
    }
}

// drains growth from each padding block in turn,
// or dumps shrinkage into the first padding block
fn adjust_padding(padding: &[BlockSize], delta: i128) -> Option<Vec<BlockSize>> {
    let mut adjusted = padding.to_vec();

    if delta >= 0 {
        let mut growth = u64::try_from(delta).ok()?;
        for size in adjusted.iter_mut() {
            let drained = growth.min(u64::from(*size));
            *size = size.checked_sub(BlockSize::try_from(drained).ok()?)?;
            growth -= drained;
        }
        (growth == 0).then_some(adjusted)
    } else {
        let shrinkage = BlockSize::try_from(u64::try_from(-delta).ok()?).ok()?;
        let first = adjusted.first_mut()?;
        *first = first.checked_add(shrinkage)?;
        Some(adjusted)
    }
}

/// Given a path, updates its FLAC metadata blocks
///
/// The closure `f` is applied to the file's current blocks.
/// If it returns an error, the file is left unmodified.
///
/// Returns the way the file was updated.
///
/// # Example
///
/// ```no_run
/// use flac_meta::{Error, Options};
/// use flac_meta::metadata::fields;
/// use flac_meta::update::update;
///
/// let options = Options::default();
/// update("track.flac", &options, |blocks| {
///     blocks
///         .comment_mut(options.vendor_string())
///         .set(fields::TITLE, "Track Title");
///     Ok::<(), Error>(())
/// }).unwrap();
/// ```
///
/// # Errors
///
/// Returns an error if the file can't be read or written,
/// if its metadata is invalid, or if the updated blocks
/// are invalid (e.g. STREAMINFO not being the first block,
/// multiple SEEKTABLEs, etc.).
/// In all those cases the file is left unmodified.
pub fn update<P, E>(
    path: P,
    options: &Options,
    f: impl FnOnce(&mut BlockList) -> Result<(), E>,
) -> Result<Plan, E>
where
    P: AsRef<Path>,
    E: From<Error>,
{
    use atomic_write_file::AtomicWriteFile;

    let path = path.as_ref();

    let (offset, old_size, old) = {
        let mut r = BufReader::new(File::open(path).map_err(Error::Io)?);
        let offset = stream_offset(&mut r)?;
        let (size, blocks) = read_counted(r)?;
        (offset, size, blocks)
    };

    let mut blocks = old.clone();
    f(&mut blocks)?;
    blocks.check()?;

    match plan(&old, &mut blocks, options) {
        Plan::Patch => {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .truncate(false)
                .create(false)
                .open(path)
                .map_err(Error::Io)?;
            file.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
            write_metadata_to(BufWriter::new(file), &blocks)?;
            Ok(Plan::Patch)
        }
        Plan::Rewrite => {
            let mut original = BufReader::new(File::open(path).map_err(Error::Io)?);
            let rewritten = AtomicWriteFile::open(path).map_err(Error::Io)?;
            {
                let mut w = BufWriter::new(rewritten.as_file());
                rewrite(&mut original, &mut w, offset, old_size, &blocks)?;
                w.flush().map_err(Error::Io)?;
            }
            rewritten.commit().map_err(Error::Io)?;
            Ok(Plan::Rewrite)
        }
    }
}

/// Given an open stream, updates its FLAC metadata blocks
///
/// Works like [`update`], but on any seekable stream.
///
/// If the file must be rewritten, its new contents are
/// first assembled in memory and the original stream is dropped.
/// The `rebuilt` closure is then called to build
/// a new stream which receives the new contents.
///
/// # Example
///
/// ```
/// use flac_meta::{Error, Options};
/// use flac_meta::metadata::{Block, BlockList, Padding, Streaminfo, VorbisComment, write_blocks};
/// use flac_meta::update::{Plan, update_file};
/// use std::io::Cursor;
///
/// let blocks: [Block; 2] = [
///     Streaminfo::new(44100, 2, 16).into(),
///     Padding { size: 100u8.into() }.into(),
/// ];
///
/// let mut flac = Cursor::new(vec![]);
/// write_blocks(flac.get_mut(), &blocks).unwrap();
///
/// let mut rebuilt = vec![];
/// let plan = update_file(
///     &mut flac,
///     || Ok(&mut rebuilt),
///     &Options::default(),
///     |blocks| {
///         blocks.add(VorbisComment::new("vendor"));
///         Ok::<(), Error>(())
///     },
/// ).unwrap();
///
/// assert_eq!(plan, Plan::Patch);
/// assert!(rebuilt.is_empty());
///
/// let blocks = BlockList::read(Cursor::new(flac.into_inner())).unwrap();
/// assert!(blocks.has::<VorbisComment>());
/// ```
///
/// # Errors
///
/// Returns an error if the stream can't be read or written,
/// if its metadata is invalid, or if the updated blocks are invalid.
pub fn update_file<F, N, E>(
    mut original: F,
    rebuilt: impl FnOnce() -> std::io::Result<N>,
    options: &Options,
    f: impl FnOnce(&mut BlockList) -> Result<(), E>,
) -> Result<Plan, E>
where
    F: Read + Seek + Write,
    N: Write,
    E: From<Error>,
{
    original.rewind().map_err(Error::Io)?;
    let offset = stream_offset(&mut original)?;
    let (old_size, old) = read_counted(BufReader::new(&mut original))?;

    let mut blocks = old.clone();
    f(&mut blocks)?;
    blocks.check()?;

    match plan(&old, &mut blocks, options) {
        Plan::Patch => {
            original.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
            write_metadata_to(BufWriter::new(&mut original), &blocks)?;
            Ok(Plan::Patch)
        }
        Plan::Rewrite => {
            original.rewind().map_err(Error::Io)?;
            let mut tmp = Vec::new();
            rewrite(
                BufReader::new(&mut original),
                &mut tmp,
                offset,
                old_size,
                &blocks,
            )?;
            drop(original);

            rebuilt()
                .and_then(|mut f| f.write_all(tmp.as_slice()).and_then(|()| f.flush()))
                .map_err(Error::Io)?;
            Ok(Plan::Rewrite)
        }
    }
}

/// Replaces a file's metadata blocks wholesale
///
/// The file's existing PADDING blocks are kept,
/// so that the new blocks may be patched in place if possible.
///
/// # Errors
///
/// Returns an error if the new blocks are invalid
/// or if any I/O error occurs.
pub fn write_metadata<P: AsRef<Path>>(
    path: P,
    blocks: &BlockList,
    options: &Options,
) -> Result<Plan, Error> {
    update(path, options, |old| {
        let mut new = blocks.clone();
        if !new.has::<Padding>() {
            new.replace_all(old.get_all::<Padding>().cloned().collect::<Vec<_>>());
        }
        *old = new;
        Ok::<(), Error>(())
    })
}

// reads blocks and returns the number of bytes they occupy,
// including the "fLaC" tag
fn read_counted<R: Read>(r: R) -> Result<(u64, BlockList), Error> {
    let mut r = Counter::new(r);
    let blocks = read_blocks(r.by_ref()).collect::<Result<BlockList, _>>()?;
    Ok((r.count, blocks))
}

// writes "fLaC" tag and blocks, which are assumed to be checked
fn write_metadata_to<W: Write>(mut w: W, blocks: &BlockList) -> Result<(), Error> {
    w.write_all(FLAC_TAG)?;
    write_block_sequence(&mut w, blocks.blocks())?;
    w.flush().map_err(Error::Io)
}

// copies any bytes before the FLAC stream,
// writes the new metadata, skips the old metadata
// and copies everything after
fn rewrite<R: Read, W: Write>(
    mut r: R,
    mut w: W,
    offset: u64,
    old_size: u64,
    blocks: &BlockList,
) -> Result<(), Error> {
    std::io::copy(&mut r.by_ref().take(offset), &mut w)?;
    write_metadata_to(&mut w, blocks)?;
    std::io::copy(&mut r.by_ref().take(old_size), &mut std::io::sink())?;
    std::io::copy(&mut r, &mut w)?;
    Ok(())
}
