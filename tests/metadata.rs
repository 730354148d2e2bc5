// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_meta::metadata::fields::{
    ARTIST, CDTOC, CHANNEL_MASK, RG_ALBUM_PEAK, RG_REFERENCE_LOUDNESS, RG_TRACK_GAIN, TITLE,
};
use flac_meta::metadata::{
    Application, Block, BlockList, BlockType, Cuesheet, Fix, Padding, Picture, ReplayGain,
    SeekPoint, SeekTable, Streaminfo, VorbisComment, info, read_blocks, read_info, stream_offset,
    write_blocks,
};
use flac_meta::{Error, ErrorKind};

fn sample_blocks() -> Vec<Block> {
    let mut comment = VorbisComment::new("vendor");
    comment.insert(TITLE, "Test Title");
    comment.insert(ARTIST, "Test Artist");

    vec![
        Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: std::num::NonZero::new(14),
            maximum_frame_size: std::num::NonZero::new(5000),
            sample_rate: 44100,
            channels: std::num::NonZero::new(2).unwrap(),
            bits_per_sample: std::num::NonZero::new(16).unwrap(),
            total_samples: std::num::NonZero::new(441000),
            md5: Some([1; 16]),
        }
        .into(),
        SeekTable {
            points: vec![
                SeekPoint {
                    sample_offset: 0,
                    byte_offset: 0,
                    frame_samples: 4096,
                },
                SeekPoint::PLACEHOLDER,
            ],
        }
        .into(),
        Cuesheet::new(false, vec![], 441000).into(),
        comment.into(),
        Application {
            id: 0x74657374,
            data: vec![1, 2, 3, 4, 5],
        }
        .into(),
        Padding {
            size: 100u8.into(),
        }
        .into(),
    ]
}

fn sample_flac() -> Vec<u8> {
    let mut flac = Vec::new();
    write_blocks(&mut flac, sample_blocks()).unwrap();
    // some frame data following the metadata
    flac.extend([0xFF, 0xF8, 0x00, 0x00, 0x01, 0x02, 0x03]);
    flac
}

#[test]
fn test_block_roundtrips() {
    use std::io::Read;

    let flac = sample_flac();
    let mut data = std::io::Cursor::new(flac.as_slice());
    let blocks = read_blocks(data.by_ref())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(blocks, sample_blocks());

    let mut output = Vec::new();
    write_blocks(&mut output, blocks).unwrap();
    std::io::copy(&mut data, &mut output).unwrap();
    assert_eq!(flac, output);
}

#[test]
fn test_block_sizes() {
    // sizes computed arithmetically match sizes when written
    for block in sample_blocks() {
        let list = match block.block_type() {
            BlockType::Streaminfo => BlockList::from_iter([block]),
            _ => BlockList::from_iter([Streaminfo::new(44100, 2, 16).into(), block]),
        };
        let mut written = Vec::new();
        write_blocks(&mut written, &list).unwrap();
        assert_eq!(written.len() as u64, 4 + list.size());
    }
}

fn perform_test(f: impl FnOnce(&mut Vec<Block>)) -> Result<(), Error> {
    let mut blocks = read_blocks(sample_flac().as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    f(&mut blocks);

    write_blocks(std::io::sink(), blocks)
}

#[test]
fn test_write_metadata() {
    assert!(matches!(perform_test(|_| { /* do nothing */ }), Ok(())));

    // STREAMINFO must be present
    assert!(matches!(
        perform_test(|blocks| {
            blocks.remove(0);
        }),
        Err(Error::MissingStreaminfo)
    ));

    // only one STREAMINFO allowed
    assert!(matches!(
        perform_test(|blocks| {
            let streaminfo = blocks[0].clone();
            blocks.push(streaminfo);
        }),
        Err(Error::MultipleStreaminfo)
    ));

    // STREAMINFO must always be first
    assert!(matches!(
        perform_test(|blocks| {
            blocks.swap(0, 1);
        }),
        Err(Error::MissingStreaminfo)
    ));

    // only one VORBIS_COMMENT allowed
    assert!(matches!(
        perform_test(|blocks| {
            blocks.push(VorbisComment::default().into());
        }),
        Err(Error::MultipleVorbisComment)
    ));

    // only one SEEKTABLE allowed
    assert!(matches!(
        perform_test(|blocks| {
            let seektable = blocks[1].clone();
            blocks.push(seektable);
        }),
        Err(Error::MultipleSeekTable)
    ));

    // only one CUESHEET allowed
    assert!(matches!(
        perform_test(|blocks| {
            let cuesheet = blocks[2].clone();
            blocks.push(cuesheet);
        }),
        Err(Error::MultipleCuesheet)
    ));

    // any number of APPLICATION and PADDING blocks allowed
    assert!(matches!(
        perform_test(|blocks| {
            let application = blocks[4].clone();
            let padding = blocks[5].clone();
            blocks.extend([application, padding]);
        }),
        Ok(())
    ));
}

#[test]
fn test_invalid_streams() {
    fn read(flac: &[u8]) -> Result<Vec<Block>, Error> {
        read_blocks(flac).collect()
    }

    // missing "fLaC" tag
    assert!(matches!(read(b"RIFF"), Err(Error::MissingFlacTag)));

    let mut flac = sample_flac();

    // reserved block type
    flac[4] = 0x07;
    assert!(matches!(read(&flac), Err(Error::ReservedMetadataBlock(7))));
    assert_eq!(read(&flac).unwrap_err().kind(), ErrorKind::MalformedInput);

    // invalid block type
    flac[4] = 0x7F;
    assert!(matches!(read(&flac), Err(Error::InvalidMetadataBlock)));

    // truncated block
    let flac = sample_flac();
    assert!(matches!(
        read(&flac[0..20]),
        Err(Error::TruncatedBlock {
            block_type: BlockType::Streaminfo,
            ..
        })
    ));

    // APPLICATION block too small for its ID
    let mut flac = Vec::new();
    write_blocks(&mut flac, [Block::from(Streaminfo::new(44100, 2, 16))]).unwrap();
    // STREAMINFO no longer last
    flac[4] = 0x00;
    flac.extend([0x82, 0x00, 0x00, 0x02, 0x00, 0x00]);
    assert!(matches!(read(&flac), Err(Error::InsufficientApplicationBlock)));
}

#[test]
fn test_clean() {
    let mut blocks = sample_blocks();

    // two SEEKTABLEs
    let seektable = blocks[1].clone();
    blocks.push(seektable);

    let (cleaned, fixes) = BlockList::from_iter(blocks).clean();
    assert_eq!(cleaned.get_all::<SeekTable>().count(), 1);
    assert!(fixes.contains(&Fix::MultipleSeekTable));
    assert!(cleaned.check().is_ok());

    // misplaced STREAMINFO and duplicates of everything
    let mut blocks = sample_blocks();
    blocks.rotate_left(3);
    blocks.extend(sample_blocks());

    let (cleaned, fixes) = BlockList::from_iter(blocks).clean();
    assert!(matches!(
        cleaned.blocks().next().map(|b| b.block_type()),
        Some(BlockType::Streaminfo)
    ));
    assert_eq!(cleaned.get_all::<Streaminfo>().count(), 1);
    assert_eq!(cleaned.get_all::<SeekTable>().count(), 1);
    assert_eq!(cleaned.get_all::<VorbisComment>().count(), 1);
    assert_eq!(cleaned.get_all::<Cuesheet>().count(), 1);
    assert!(cleaned.check().is_ok());
    assert!(fixes.contains(&Fix::ReorderedStreaminfo));
    assert!(fixes.contains(&Fix::MultipleStreaminfo));
    assert!(fixes.contains(&Fix::MultipleVorbisComment));
    assert!(fixes.contains(&Fix::MultipleCuesheet));

    // cleaning a clean list changes nothing
    let (cleaned_again, fixes) = cleaned.clean();
    assert_eq!(cleaned_again, cleaned);
    assert!(fixes.is_empty());
}

#[test]
fn test_clean_comment() {
    let mut comment = VorbisComment::new("vendor");
    comment.fields = vec![
        "TITLE= Padded Title ".to_owned(),
        "no separator".to_owned(),
        "ARTIST=".to_owned(),
        "ALBUM=Album".to_owned(),
    ];

    let (cleaned, fixes) = comment.clean();
    assert_eq!(
        cleaned.fields,
        vec!["TITLE=Padded Title".to_owned(), "ALBUM=Album".to_owned()]
    );
    assert_eq!(
        fixes,
        vec![
            Fix::TrimmedWhitespace("TITLE".to_owned()),
            Fix::RemovedInvalidComment("no separator".to_owned()),
            Fix::RemovedEmptyField("ARTIST".to_owned()),
        ]
    );
}

#[test]
fn test_comment_fields() {
    let mut comment = VorbisComment::new("vendor");
    comment.insert(TITLE, "Title 1");
    comment.insert("title", "Title 2");
    comment.insert(ARTIST, "Artist");

    // fields are case-insensitive
    assert_eq!(comment.get("Title"), Some("Title 1"));
    assert_eq!(
        comment.all(TITLE).collect::<Vec<_>>(),
        vec!["Title 1", "Title 2"]
    );

    comment.set(TITLE, "New Title");
    assert_eq!(comment.all(TITLE).collect::<Vec<_>>(), vec!["New Title"]);

    comment.replace(ARTIST, ["Artist 1", "Artist 2"]);
    assert_eq!(
        comment.all(ARTIST).collect::<Vec<_>>(),
        vec!["Artist 1", "Artist 2"]
    );

    comment.remove(ARTIST);
    assert_eq!(comment.get(ARTIST), None);
    assert_eq!(comment.keys(), vec!["TITLE".to_owned()]);
}

#[test]
fn test_intersection() {
    let mut comment_1 = VorbisComment::new("vendor 1");
    comment_1.insert(TITLE, "Same Title");
    comment_1.insert(ARTIST, "Artist 1");

    let mut comment_2 = VorbisComment::new("vendor 2");
    comment_2.insert(TITLE, "Same Title");
    comment_2.insert(ARTIST, "Artist 2");

    let app = |id| Application { id, data: vec![] };

    let list_1 = BlockList::from_iter([
        Streaminfo::new(44100, 2, 16).into(),
        comment_1.into(),
        app(1).into(),
        app(2).into(),
    ]);

    let list_2 = BlockList::from_iter([
        Streaminfo::new(44100, 2, 16).into(),
        comment_2.into(),
        app(2).into(),
        app(3).into(),
    ]);

    let common = list_1.intersection(&list_2);
    assert!(common.streaminfo().is_some());
    assert_eq!(
        common.get_all::<Application>().collect::<Vec<_>>(),
        vec![&app(2)]
    );

    let comment = common.comment().unwrap();
    assert_eq!(comment.vendor_string, "vendor 1");
    assert_eq!(comment.get(TITLE), Some("Same Title"));
    assert_eq!(comment.get(ARTIST), None);
}

#[test]
fn test_apply_tags() {
    let mut old_comment = VorbisComment::new("old vendor");
    old_comment.insert(TITLE, "Old Title");
    old_comment.insert(RG_TRACK_GAIN, "-6.0 dB");
    old_comment.insert(CDTOC, "1+96+3D8F");
    old_comment.insert(CHANNEL_MASK, "0x0003");

    let mut blocks = BlockList::from_iter([
        Streaminfo::new(44100, 2, 16).into(),
        old_comment.into(),
        Padding::default().into(),
    ]);

    let mut new_comment = VorbisComment::new("new vendor");
    new_comment.insert(TITLE, "New Title");
    new_comment.insert(RG_TRACK_GAIN, "+1.0 dB");

    blocks.apply_tags(&BlockList::converted(
        new_comment,
        Vec::<Picture>::new(),
        &flac_meta::Options::default(),
    ));

    let comment = blocks.comment().unwrap();
    assert_eq!(comment.vendor_string, "old vendor");
    assert_eq!(comment.get(TITLE), Some("New Title"));
    assert_eq!(comment.get(RG_TRACK_GAIN), Some("-6.0 dB"));
    assert_eq!(comment.get(CDTOC), Some("1+96+3D8F"));
    // stereo 16-bit streams don't need a channel mask
    assert_eq!(comment.get(CHANNEL_MASK), None);

    // padding from the converted blocks isn't applied
    assert_eq!(blocks.get_all::<Padding>().count(), 1);
}

#[test]
fn test_preferred_order() {
    let mut blocks = BlockList::new();
    blocks.add(Padding::default());
    blocks.add(Application {
        id: 1,
        data: vec![],
    });
    blocks.add(VorbisComment::default());
    blocks.add(Cuesheet::new(false, vec![], 0));
    blocks.add(SeekTable::default());
    blocks.add(Streaminfo::new(44100, 2, 16));

    assert_eq!(
        blocks.blocks().map(|b| b.block_type()).collect::<Vec<_>>(),
        vec![
            BlockType::Streaminfo,
            BlockType::SeekTable,
            BlockType::Cuesheet,
            BlockType::VorbisComment,
            BlockType::Application,
            BlockType::Padding,
        ]
    );

    // same-typed blocks go after existing ones
    blocks.add(Application {
        id: 2,
        data: vec![],
    });
    assert_eq!(
        blocks
            .get_all::<Application>()
            .map(|a| a.id)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn test_channel_mask() {
    let mask = |channels, field: Option<&str>| {
        let mut blocks = BlockList::from_iter([Streaminfo::new(44100, channels, 16).into()]);
        if let Some(field) = field {
            blocks.comment_mut("vendor").set(CHANNEL_MASK, field);
        }
        blocks.channel_mask()
    };

    assert_eq!(mask(1, None), Some(0x4));
    assert_eq!(mask(2, Some("0x0033")), Some(0x3));
    assert_eq!(mask(6, None), Some(0x3F));
    assert_eq!(mask(4, Some("0x0033")), Some(0x33));
    // mask disagrees with channel count
    assert_eq!(mask(4, Some("0x0003")), Some(0));
    // unparseable mask falls back to the default
    assert_eq!(mask(8, Some("front")), Some(0x63F));
}

#[test]
fn test_id3v2_offset() {
    let mut file = Vec::new();
    file.extend(b"ID3\x04\x00\x00\x00\x00\x01\x00"); // 128 byte tag
    file.extend([0; 128]);
    file.extend(sample_flac());

    let mut r = std::io::Cursor::new(file);
    assert_eq!(stream_offset(&mut r).unwrap(), 138);
    assert_eq!(BlockList::read(r).unwrap().len(), sample_blocks().len());
}

#[test]
fn test_oversized_blocks_skipped() {
    let blocks = BlockList::from_iter([
        Streaminfo::new(44100, 2, 16).into(),
        Application {
            id: 1,
            data: vec![0; 1 << 24],
        }
        .into(),
        Padding::default().into(),
    ]);

    // oversized blocks don't count toward total size
    assert_eq!(blocks.size(), 4 + 34 + 4);

    let mut flac = Vec::new();
    write_blocks(&mut flac, &blocks).unwrap();
    assert_eq!(flac.len(), 4 + 4 + 34 + 4);

    let read = BlockList::read(flac.as_slice()).unwrap();
    assert!(!read.has::<Application>());
    assert!(read.has::<Padding>());
}

#[test]
fn test_info() {
    let expected = match &sample_blocks()[0] {
        Block::Streaminfo(streaminfo) => streaminfo.clone(),
        _ => panic!("STREAMINFO not first"),
    };

    assert_eq!(read_info(sample_flac().as_slice()).unwrap(), expected);

    // leading ID3v2 tag skipped when reading from a path
    let mut file = b"ID3\x04\x00\x00\x00\x00\x00\x04".to_vec();
    file.extend([0; 4]);
    file.extend(sample_flac());

    let path = std::env::temp_dir().join(format!(
        "flac-meta-info-{}-{}.flac",
        std::process::id(),
        fastrand::u64(..)
    ));
    std::fs::write(&path, &file).unwrap();
    let read = info(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(read.unwrap(), expected);

    assert!(matches!(
        read_info(&b"RIFF"[..]),
        Err(Error::MissingFlacTag)
    ));

    // some other block first
    let mut flac = b"fLaC".to_vec();
    flac.extend([0x81, 0x00, 0x00, 0x00]);
    assert!(matches!(
        read_info(flac.as_slice()),
        Err(Error::MissingStreaminfo)
    ));

    assert!(matches!(
        info("/nonexistent/file.flac"),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_replay_gain() {
    let gain = ReplayGain {
        track_gain: -6.5,
        track_peak: 0.75,
        album_gain: 1.25,
        album_peak: 1.0,
    };

    let mut blocks = BlockList::from_iter([Streaminfo::new(44100, 2, 16).into()]);
    assert_eq!(blocks.replay_gain(), None);
    // nothing to delete
    blocks.delete_replay_gain();
    assert!(blocks.comment().is_none());

    blocks.set_replay_gain(&gain, "vendor");
    let comment = blocks.comment().unwrap();
    assert_eq!(comment.vendor_string, "vendor");
    assert_eq!(comment.get(RG_TRACK_GAIN), Some("-6.50 dB"));
    assert_eq!(comment.get(RG_ALBUM_PEAK), Some("1.00000000"));
    assert_eq!(comment.get(RG_REFERENCE_LOUDNESS), Some("89.0 dB"));
    assert_eq!(blocks.replay_gain(), Some(gain));

    // survives a round trip through the file format
    let mut flac = Vec::new();
    write_blocks(&mut flac, &blocks).unwrap();
    let mut read = BlockList::read(flac.as_slice()).unwrap();
    assert_eq!(read.replay_gain(), Some(gain));

    // replaces rather than adds
    let louder = ReplayGain {
        track_gain: 3.0,
        ..gain
    };
    read.set_replay_gain(&louder, "other vendor");
    assert_eq!(read.replay_gain(), Some(louder));
    assert_eq!(read.comment().unwrap().all(RG_TRACK_GAIN).count(), 1);
    assert_eq!(read.comment().unwrap().vendor_string, "vendor");

    // incomplete or unparseable values
    let mut partial = read.clone();
    partial.comment_mut("vendor").remove(RG_ALBUM_PEAK);
    assert_eq!(partial.replay_gain(), None);
    let mut garbled = read.clone();
    garbled.comment_mut("vendor").set(RG_TRACK_GAIN, "loud");
    assert_eq!(garbled.replay_gain(), None);

    read.comment_mut("vendor").set(TITLE, "Title");
    read.delete_replay_gain();
    assert_eq!(read.replay_gain(), None);
    let comment = read.comment().unwrap();
    assert_eq!(comment.get(RG_REFERENCE_LOUDNESS), None);
    assert_eq!(comment.get(TITLE), Some("Title"));
}
