// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_meta::Error;
use flac_meta::codec::FrameSize;
use flac_meta::metadata::{Block, Fix, SeekPoint, SeekTable, Streaminfo, read_blocks, write_blocks};
use std::io::Cursor;

fn point(sample_offset: u64, byte_offset: u64, frame_samples: u16) -> SeekPoint {
    SeekPoint {
        sample_offset,
        byte_offset,
        frame_samples,
    }
}

#[test]
fn test_from_frames() {
    let frames = [FrameSize {
        bytes: 10,
        samples: 4,
    }; 3];

    assert_eq!(
        SeekTable::from_frames(&frames, 2, 12).points,
        vec![point(0, 0, 4), point(4, 10, 4), point(8, 20, 4)]
    );

    // frames smaller than the interval are skipped over
    let frames = [FrameSize {
        bytes: 100,
        samples: 4096,
    }; 10];

    assert_eq!(
        SeekTable::from_frames(&frames, 10000, 40960)
            .points
            .iter()
            .map(|p| (p.sample_offset, p.byte_offset))
            .collect::<Vec<_>>(),
        vec![(0, 0), (8192, 200), (16384, 400), (28672, 700), (36864, 900)]
    );

    // one point per frame at most
    let dense = SeekTable::from_frames(&frames, 1, 40960);
    assert_eq!(dense.points.len(), 10);
    // which is a table needing no cleaning
    assert!(dense.clean().1.is_empty());

    // nothing to seek to
    assert!(SeekTable::from_frames(&[], 10, 0).points.is_empty());
}

#[test]
fn test_is_valid() {
    const FRAME: [u8; 6] = [0xFF, 0xF8, 0x00, 0x00, 0x00, 0x01];

    let mut stream = b"xxxx".to_vec();
    stream.extend(FRAME);
    stream.extend(FRAME);

    let valid = SeekTable {
        points: vec![point(0, 0, 1), point(1, 6, 1), SeekPoint::PLACEHOLDER],
    };
    assert!(valid.is_valid(Cursor::new(&stream), 4).unwrap());

    // points into the middle of a frame
    let misaligned = SeekTable {
        points: vec![point(0, 0, 1), point(1, 3, 1)],
    };
    assert!(!misaligned.is_valid(Cursor::new(&stream), 4).unwrap());

    // points past the end of the stream
    let overlong = SeekTable {
        points: vec![point(0, 0, 1), point(1, 100, 1)],
    };
    assert!(!overlong.is_valid(Cursor::new(&stream), 4).unwrap());

    // wrong start of frames
    assert!(!valid.is_valid(Cursor::new(&stream), 0).unwrap());

    // reserved bit set
    let mut reserved = stream.clone();
    reserved[4 + 1] |= 0b10;
    assert!(!valid.is_valid(Cursor::new(&reserved), 4).unwrap());
}

#[test]
fn test_clean() {
    let seektable = SeekTable {
        points: vec![
            point(8192, 200, 4096),
            point(0, 0, 4096),
            SeekPoint::PLACEHOLDER,
            point(8192, 200, 4096),
            point(4096, 100, 0),
        ],
    };

    let (cleaned, fixes) = seektable.clean();
    assert_eq!(
        cleaned.points,
        vec![point(0, 0, 4096), point(8192, 200, 4096)]
    );
    assert_eq!(
        fixes,
        vec![Fix::RemovedEmptySeekPoints, Fix::ReorderedSeekPoints]
    );

    // clean tables stay as they are
    let (recleaned, fixes) = cleaned.clean();
    assert_eq!(recleaned, cleaned);
    assert!(fixes.is_empty());
}

#[test]
fn test_invalid_size() {
    let mut flac = Vec::new();
    write_blocks(&mut flac, [Block::from(Streaminfo::new(44100, 2, 16))]).unwrap();
    // STREAMINFO no longer last
    flac[4] = 0x00;
    flac.extend([0x83, 0x00, 0x00, 17]);
    flac.extend([0; 17]);

    assert!(matches!(
        read_blocks(flac.as_slice()).collect::<Result<Vec<_>, _>>(),
        Err(Error::InvalidSeekTableSize)
    ));
}

#[test]
fn test_placeholder_roundtrip() {
    let seektable = SeekTable {
        points: vec![point(0, 0, 4096), SeekPoint::PLACEHOLDER, SeekPoint::PLACEHOLDER],
    };
    assert!(seektable.points[1].is_placeholder());

    let mut flac = Vec::new();
    write_blocks(
        &mut flac,
        [
            Block::from(Streaminfo::new(44100, 2, 16)),
            Block::from(seektable.clone()),
        ],
    )
    .unwrap();
    // tag, two block headers, STREAMINFO and three points
    assert_eq!(flac.len(), 4 + 4 + 34 + 4 + 3 * 18);

    let blocks = read_blocks(flac.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(blocks[1], Block::from(seektable));
}
