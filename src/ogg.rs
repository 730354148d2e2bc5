// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For packing metadata blocks into Ogg FLAC header packets
//!
//! An Ogg FLAC stream's first packet holds a small mapping header,
//! the "fLaC" tag and the STREAMINFO block.
//! Each remaining metadata block gets a packet of its own,
//! header included, with the final one marked as last.
//!
//! | Bytes | Field | Value |
//! |------:|------:|-------|
//! | 1 | packet type | `0x7F`
//! | 4 | signature | `FLAC`
//! | 1 | major version | 1
//! | 1 | minor version | 0
//! | 2 | header packets | remaining block count
//! | 4 | FLAC tag | `fLaC`
//! | 4 | block header | STREAMINFO header
//! | 34 | STREAMINFO | STREAMINFO block
//!
//! Splitting packets into Ogg pages is left to the caller.

use crate::Error;
use crate::metadata::{
    Block, BlockHeader, BlockList, BlockRef, BlockType, FLAC_TAG, Streaminfo, iter_last,
    writable,
};
use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

const PACKET_TYPE: u8 = 0x7F;
const SIGNATURE: &[u8; 4] = b"FLAC";
const VERSION: (u8, u8) = (1, 0);

/// Builds Ogg FLAC header packets from metadata blocks
///
/// The STREAMINFO block goes in the first packet,
/// and every other block in a packet of its own.
/// Blocks too large to be written are skipped.
///
/// # Example
///
/// ```
/// use flac_meta::metadata::{BlockList, Padding, Streaminfo};
/// use flac_meta::ogg::{metadata_packets, read_metadata};
///
/// let blocks = BlockList::from_iter([
///     Streaminfo::new(44100, 2, 16).into(),
///     Padding { size: 10u8.into() }.into(),
/// ]);
///
/// let packets = metadata_packets(&blocks).unwrap();
/// assert_eq!(packets.len(), 2);
/// assert_eq!(packets[0].len(), 51);
/// assert_eq!(packets[1].len(), 14);
///
/// assert_eq!(read_metadata(&packets).unwrap(), blocks);
/// ```
///
/// # Errors
///
/// Returns an error if there's no STREAMINFO block
/// or if the blocks are otherwise invalid.
pub fn metadata_packets(blocks: &BlockList) -> Result<Vec<Vec<u8>>, Error> {
    blocks.check()?;

    let streaminfo = blocks.streaminfo().ok_or(Error::MissingStreaminfo)?;

    let others = writable(
        blocks
            .blocks()
            .filter(|b| !matches!(b, BlockRef::Streaminfo(_))),
    )
    .collect::<Vec<_>>();

    let mut packets = Vec::with_capacity(others.len() + 1);

    let mut w = BitWriter::endian(Vec::new(), BigEndian);
    w.write_from(PACKET_TYPE)?;
    w.write_from(*SIGNATURE)?;
    w.write_from(VERSION.0)?;
    w.write_from(VERSION.1)?;
    w.write_from(u16::try_from(others.len()).map_err(|_| Error::ExcessiveBlockSize)?)?;
    w.write_from(*FLAC_TAG)?;
    w.build_using(&BlockRef::Streaminfo(streaminfo), false)?;
    packets.push(w.into_writer());

    for (last, block) in iter_last(others.into_iter()) {
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        w.build_using(&block, last)?;
        packets.push(w.into_writer());
    }

    Ok(packets)
}

/// Reads metadata blocks from Ogg FLAC header packets
///
/// Only as many packets as the first packet announces are read.
///
/// # Errors
///
/// Returns [`Error::InvalidOggHeader`] if the first packet
/// isn't a valid Ogg FLAC header or there are fewer packets
/// than it announces.
/// Returns an error if any block is reserved, invalid or truncated.
pub fn read_metadata<P>(packets: impl IntoIterator<Item = P>) -> Result<BlockList, Error>
where
    P: AsRef<[u8]>,
{
    let mut packets = packets.into_iter();

    let first = packets.next().ok_or(Error::InvalidOggHeader)?;
    let mut r = BitReader::endian(first.as_ref(), BigEndian);

    if r.read_to::<u8>()? != PACKET_TYPE || &r.read_to::<[u8; 4]>()? != SIGNATURE {
        return Err(Error::InvalidOggHeader);
    }

    let version = (r.read_to::<u8>()?, r.read_to::<u8>()?);
    if version.0 != VERSION.0 {
        log::warn!("unsupported Ogg FLAC version {}.{}", version.0, version.1);
        return Err(Error::InvalidOggHeader);
    }

    let header_packets = r.read_to::<u16>()?;

    if &r.read_to::<[u8; 4]>()? != FLAC_TAG {
        return Err(Error::MissingFlacTag);
    }

    let header = r.parse::<BlockHeader>()?;
    if header.block_type != BlockType::Streaminfo {
        return Err(Error::MissingStreaminfo);
    }
    if header.size != Streaminfo::SIZE {
        return Err(Error::InvalidMetadataBlockSize {
            block_type: BlockType::Streaminfo,
            size: header.size.into(),
            consumed: Streaminfo::SIZE.into(),
        });
    }

    let mut blocks = vec![Block::Streaminfo(r.parse::<Streaminfo>()?)];

    for _ in 0..header_packets {
        let packet = packets.next().ok_or(Error::InvalidOggHeader)?;
        blocks.push(read_packet(packet.as_ref())?);
    }

    Ok(blocks.into_iter().collect())
}

fn read_packet(packet: &[u8]) -> Result<Block, Error> {
    let mut r = BitReader::endian(packet, BigEndian);
    let header = r.parse::<BlockHeader>()?;
    let size = u32::from(header.size);

    let body = packet
        .get(4..)
        .and_then(|body| body.get(..usize::try_from(size).ok()?))
        .ok_or(Error::TruncatedBlock {
            block_type: header.block_type,
            size,
        })?;

    BitReader::endian(body, BigEndian)
        .parse_with(&header)
        .map_err(|err| match err {
            Error::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::TruncatedBlock {
                    block_type: header.block_type,
                    size,
                }
            }
            err => err,
        })
}
