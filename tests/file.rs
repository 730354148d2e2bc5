// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_meta::codec::{AudioCodec, Encoded, FrameSize, PcmFormat};
use flac_meta::file::{clean_file, decode_foreign, encode_foreign, seektable};
use flac_meta::foreign::{ChunkError, ForeignFormat, has_foreign_chunks};
use flac_meta::metadata::{
    Application, Block, BlockList, Fix, Padding, SeekPoint, SeekTable, Streaminfo, write_blocks,
};
use flac_meta::{Error, Options};
use std::io::{Read, Write};
use std::num::NonZero;
use std::path::{Path, PathBuf};

const FRAME_SAMPLES: usize = 4;
const SYNC: [u8; 4] = [0xFF, 0xF8, 0x00, 0x00];

/// Stores PCM frames uncompressed behind a minimal frame header
///
/// Each frame is a sync code, a 16-bit sample count
/// and that many PCM frames as-is.
struct RawCodec;

impl AudioCodec for RawCodec {
    fn decode(
        &self,
        frames: &mut dyn Read,
        streaminfo: &Streaminfo,
        pcm: &mut dyn Write,
    ) -> Result<Vec<FrameSize>, Error> {
        let bytes_per_frame = PcmFormat::from(streaminfo).bytes_per_frame() as usize;
        let mut data = Vec::new();
        frames.read_to_end(&mut data)?;

        let mut sizes = Vec::new();
        let mut rest = data.as_slice();
        while !rest.is_empty() {
            let (header, tail) = rest
                .split_at_checked(6)
                .ok_or_else(|| Error::Codec("truncated frame header".into()))?;
            if header[0..4] != SYNC {
                return Err(Error::Codec("invalid frame sync".into()));
            }
            let samples = u16::from_be_bytes([header[4], header[5]]);
            let (frame, tail) = tail
                .split_at_checked(usize::from(samples) * bytes_per_frame)
                .ok_or_else(|| Error::Codec("truncated frame".into()))?;
            pcm.write_all(frame)?;
            sizes.push(FrameSize {
                bytes: 6 + frame.len() as u32,
                samples,
            });
            rest = tail;
        }

        Ok(sizes)
    }

    fn encode(
        &self,
        pcm: &mut dyn Read,
        format: &PcmFormat,
        frames: &mut dyn Write,
    ) -> Result<Encoded, Error> {
        let bytes_per_frame = format.bytes_per_frame() as usize;
        let mut data = Vec::new();
        pcm.read_to_end(&mut data)?;

        let mut sizes = Vec::new();
        for chunk in data.chunks(FRAME_SAMPLES * bytes_per_frame) {
            let samples = (chunk.len() / bytes_per_frame) as u16;
            frames.write_all(&SYNC)?;
            frames.write_all(&samples.to_be_bytes())?;
            frames.write_all(chunk)?;
            sizes.push(FrameSize {
                bytes: 6 + chunk.len() as u32,
                samples,
            });
        }

        Ok(Encoded {
            streaminfo: Streaminfo {
                minimum_block_size: FRAME_SAMPLES as u16,
                maximum_block_size: FRAME_SAMPLES as u16,
                minimum_frame_size: sizes.iter().map(|f| f.bytes).min().and_then(NonZero::new),
                maximum_frame_size: sizes.iter().map(|f| f.bytes).max().and_then(NonZero::new),
                total_samples: NonZero::new((data.len() / bytes_per_frame) as u64),
                md5: Some(md5::compute(&data).0),
                ..Streaminfo::new(
                    format.sample_rate,
                    format.channels.get(),
                    format.bits_per_sample.get(),
                )
            },
            frames: sizes,
        })
    }
}

// a unique path which is removed when dropped
struct TempPath(PathBuf);

impl TempPath {
    fn new(name: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "flac-meta-{}-{}-{name}",
            std::process::id(),
            fastrand::u64(..)
        )))
    }
}

impl AsRef<Path> for TempPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn riff_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut chunk = id.to_vec();
    chunk.extend((body.len() as u32).to_le_bytes());
    chunk.extend(body);
    if body.len() % 2 == 1 {
        chunk.push(0);
    }
    chunk
}

fn fmt_chunk(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample.div_ceil(8);
    let mut body: Vec<u8> = vec![];
    body.extend(1u16.to_le_bytes());
    body.extend(channels.to_le_bytes());
    body.extend(sample_rate.to_le_bytes());
    body.extend((sample_rate * u32::from(block_align)).to_le_bytes());
    body.extend(block_align.to_le_bytes());
    body.extend(bits_per_sample.to_le_bytes());
    riff_chunk(b"fmt ", &body)
}

fn riff_file(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body = chunks.concat();
    let mut file = b"RIFF".to_vec();
    file.extend((body.len() as u32 + 4).to_le_bytes());
    file.extend(b"WAVE");
    file.extend(body);
    file
}

// a FLAC file of 16-bit mono samples
fn flac_file(streaminfo: impl FnOnce(Streaminfo) -> Streaminfo, blocks: &[Block]) -> Vec<u8> {
    let pcm: Vec<u8> = (0..8i16).flat_map(|s| (s * 100).to_le_bytes()).collect();
    let format = PcmFormat {
        sample_rate: 44100,
        channels: NonZero::new(1).unwrap(),
        bits_per_sample: NonZero::new(16).unwrap(),
    };

    let mut frames = Vec::new();
    let encoded = RawCodec
        .encode(&mut pcm.as_slice(), &format, &mut frames)
        .unwrap();

    let mut flac = Vec::new();
    write_blocks(
        &mut flac,
        std::iter::once(Block::from(streaminfo(encoded.streaminfo))).chain(blocks.iter().cloned()),
    )
    .unwrap();
    flac.extend(frames);
    flac
}

fn frames_of(flac: &[u8]) -> Vec<u8> {
    let mut r = flac;
    BlockList::read(&mut r).unwrap();
    r.to_vec()
}

#[test]
fn test_riff_roundtrip() {
    let samples = [0x80, 0x81, 0x7F];
    let wave = riff_file(&[
        fmt_chunk(1, 8000, 8),
        riff_chunk(b"LIST", b"odd"),
        riff_chunk(b"data", &samples),
        riff_chunk(b"cue ", &[1, 2, 3, 4]),
    ]);

    let source = TempPath::new("source.wav");
    let flac = TempPath::new("encoded.flac");
    std::fs::write(&source, &wave).unwrap();

    encode_foreign(&flac, &source, &RawCodec, &Options::default()).unwrap();

    let blocks = BlockList::open(&flac).unwrap();
    let streaminfo = blocks.streaminfo().unwrap();
    assert_eq!(streaminfo.sample_rate, 8000);
    assert_eq!(streaminfo.total_samples, NonZero::new(3));
    // MD5 of signed samples
    assert_eq!(streaminfo.md5, Some(md5::compute([0x00u8, 0x01, 0xFF]).0));

    assert!(has_foreign_chunks(&blocks, ForeignFormat::Riff));
    // container, fmt, LIST, data and cue
    assert_eq!(blocks.get_all::<Application>().count(), 5);

    assert_eq!(
        blocks.get::<SeekTable>().map(|s| s.points.as_slice()),
        Some(
            [SeekPoint {
                sample_offset: 0,
                byte_offset: 0,
                frame_samples: 3,
            }]
            .as_slice()
        )
    );
    assert_eq!(blocks.get::<Padding>(), Some(&Padding { size: 4096u16.into() }));
    assert!(blocks.check().is_ok());

    // metadata fills the space reserved for it
    let encoded = std::fs::read(&flac).unwrap();
    assert_eq!(encoded.len() as u64, 4 + blocks.size() + 6 + 3);
    assert_eq!(frames_of(&encoded), [0xFF, 0xF8, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0xFF]);

    let mut restored = Vec::new();
    decode_foreign(&flac, ForeignFormat::Riff, &RawCodec, &mut restored).unwrap();
    assert_eq!(restored, wave);

    // no AIFF chunks to restore
    assert!(matches!(
        decode_foreign(&flac, ForeignFormat::Aiff, &RawCodec, std::io::sink()),
        Err(Error::NoForeignChunks)
    ));
}

#[test]
fn test_aiff_roundtrip() {
    let mut comm: Vec<u8> = vec![];
    comm.extend(2u16.to_be_bytes());
    comm.extend(2u32.to_be_bytes());
    comm.extend(16u16.to_be_bytes());
    comm.extend([0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]);

    let samples = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    let mut chunks: Vec<u8> = vec![];
    chunks.extend(b"COMM");
    chunks.extend((comm.len() as u32).to_be_bytes());
    chunks.extend(&comm);
    chunks.extend(b"SSND");
    chunks.extend((8 + samples.len() as u32).to_be_bytes());
    chunks.extend([0; 8]);
    chunks.extend(samples);

    let mut aiff = b"FORM".to_vec();
    aiff.extend((chunks.len() as u32 + 4).to_be_bytes());
    aiff.extend(b"AIFF");
    aiff.extend(chunks);

    let source = TempPath::new("source.aiff");
    let flac = TempPath::new("encoded.flac");
    std::fs::write(&source, &aiff).unwrap();

    encode_foreign(&flac, &source, &RawCodec, &Options::default().no_seektable()).unwrap();

    let blocks = BlockList::open(&flac).unwrap();
    assert!(!blocks.has::<SeekTable>());
    let streaminfo = blocks.streaminfo().unwrap();
    assert_eq!(streaminfo.channels.get(), 2);
    assert_eq!(streaminfo.total_samples, NonZero::new(2));
    // samples stored little-endian
    assert_eq!(
        streaminfo.md5,
        Some(md5::compute([0x02u8, 0x01, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07]).0)
    );

    let mut restored = Vec::new();
    decode_foreign(&flac, ForeignFormat::Aiff, &RawCodec, &mut restored).unwrap();
    assert_eq!(restored, aiff);
}

#[test]
fn test_encode_mismatch() {
    // data chunk announces more samples than the file has
    let mut data = b"data".to_vec();
    data.extend(10u32.to_le_bytes());
    data.extend([1, 0, 2, 0]);

    let mut wave = b"RIFF".to_vec();
    wave.extend((4 + 24 + 8 + 10u32).to_le_bytes());
    wave.extend(b"WAVE");
    wave.extend(fmt_chunk(1, 44100, 16));
    wave.extend(data);

    let source = TempPath::new("short.wav");
    let flac = TempPath::new("short.flac");
    std::fs::write(&source, &wave).unwrap();

    let err = encode_foreign(&flac, &source, &RawCodec, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::ForeignContainerMismatch {
            expected: 10,
            actual: 4
        }
    ));
    assert!(!flac.as_ref().exists());

    // not a foreign file at all
    std::fs::write(&source, b"fLaC not really").unwrap();
    assert!(matches!(
        encode_foreign(&flac, &source, &RawCodec, &Options::default()),
        Err(Error::InvalidChunkLayout(ChunkError::UnknownContainer(tag))) if &tag == b"fLaC"
    ));
    assert!(!flac.as_ref().exists());
}

#[test]
fn test_clean_file() {
    let mut file = vec![b'I', b'D', b'3', 4, 0, 0, 0, 0, 0, 4, 1, 2, 3, 4];
    let flac = flac_file(
        |s| Streaminfo { md5: None, ..s },
        &[Block::from(Padding { size: 10u8.into() })],
    );
    file.extend(&flac);

    let path = TempPath::new("dirty.flac");
    std::fs::write(&path, &file).unwrap();

    // dry run reports fixes but changes nothing
    assert_eq!(
        clean_file(&path, None, &RawCodec, &Options::default()).unwrap(),
        vec![Fix::RemovedId3v2, Fix::PopulatedMd5, Fix::AddedSeekTable]
    );
    assert_eq!(std::fs::read(&path).unwrap(), file);

    assert_eq!(
        clean_file(&path, None, &RawCodec, &Options::default().no_seektable()).unwrap(),
        vec![Fix::RemovedId3v2, Fix::PopulatedMd5]
    );

    let output = TempPath::new("clean.flac");
    clean_file(&path, Some(output.as_ref()), &RawCodec, &Options::default()).unwrap();

    let cleaned = std::fs::read(&output).unwrap();
    assert!(cleaned.starts_with(b"fLaC"));
    assert_eq!(frames_of(&cleaned), frames_of(&flac));

    let blocks = BlockList::open(&output).unwrap();
    let pcm: Vec<u8> = (0..8i16).flat_map(|s| (s * 100).to_le_bytes()).collect();
    assert_eq!(
        blocks.streaminfo().and_then(|s| s.md5),
        Some(md5::compute(&pcm).0)
    );
    assert_eq!(
        blocks.get::<SeekTable>().map(|s| s.points.clone()),
        Some(vec![SeekPoint {
            sample_offset: 0,
            byte_offset: 0,
            frame_samples: 4,
        }])
    );

    // nothing left to fix
    assert!(
        clean_file(&output, None, &RawCodec, &Options::default())
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_clean_id3v1() {
    let flac = flac_file(|s| s, &[]);
    let mut file = flac.clone();
    file.extend(b"TAG");
    file.extend([0; 125]);

    let path = TempPath::new("id3v1.flac");
    std::fs::write(&path, &file).unwrap();

    let options = Options::default().no_seektable();
    assert_eq!(
        clean_file(&path, Some(path.as_ref()), &RawCodec, &options).unwrap(),
        vec![Fix::RemovedId3v1]
    );
    assert_eq!(std::fs::read(&path).unwrap(), flac);
}

#[test]
fn test_fix_seektable() {
    let misplaced = SeekTable {
        points: vec![
            SeekPoint {
                sample_offset: 0,
                byte_offset: 0,
                frame_samples: 4,
            },
            SeekPoint {
                sample_offset: 4,
                byte_offset: 3,
                frame_samples: 4,
            },
        ],
    };
    let flac = flac_file(|s| s, &[Block::from(misplaced)]);

    let path = TempPath::new("seektable.flac");
    std::fs::write(&path, &flac).unwrap();

    assert_eq!(
        clean_file(&path, Some(path.as_ref()), &RawCodec, &Options::default()).unwrap(),
        vec![Fix::FixedSeekTable]
    );

    let fixed = BlockList::open(&path).unwrap();
    assert_eq!(
        fixed.get::<SeekTable>().map(|s| s.points.len()),
        Some(1)
    );
    assert_eq!(frames_of(&std::fs::read(&path).unwrap()), frames_of(&flac));
}

#[test]
fn test_seektable() {
    let flac = flac_file(|s| Streaminfo { sample_rate: 4, ..s }, &[]);
    let path = TempPath::new("seek.flac");
    std::fs::write(&path, &flac).unwrap();

    // one point per second of 4 samples
    let table = seektable(&path, &RawCodec, &Options::default().seekpoint_interval(1))
        .unwrap()
        .unwrap();
    assert_eq!(
        table.points,
        vec![
            SeekPoint {
                sample_offset: 0,
                byte_offset: 0,
                frame_samples: 4,
            },
            SeekPoint {
                sample_offset: 4,
                byte_offset: 14,
                frame_samples: 4,
            },
        ]
    );
    assert!(table.is_valid(std::io::Cursor::new(&flac), flac.len() as u64 - 28).unwrap());

    assert!(
        seektable(&path, &RawCodec, &Options::default().no_seektable())
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_codec_failure() {
    let mut flac = flac_file(|s| Streaminfo { md5: None, ..s }, &[]);
    // corrupt first frame's sync code
    let frames_start = flac.len() - 28;
    flac[frames_start] = 0x00;

    let path = TempPath::new("corrupt.flac");
    std::fs::write(&path, &flac).unwrap();

    assert!(matches!(
        clean_file(&path, Some(path.as_ref()), &RawCodec, &Options::default()),
        Err(Error::Codec(_))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), flac);
}
