// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_meta::foreign::{
    ChunkError, ForeignFormat, has_foreign_chunks, header_footer, read_header, split, verify,
};
use flac_meta::metadata::{Application, Block, BlockList, Streaminfo};
use flac_meta::{Error, ErrorKind};

// a RIFF chunk, padded to an even length
fn riff_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut chunk = id.to_vec();
    chunk.extend((body.len() as u32).to_le_bytes());
    chunk.extend(body);
    if body.len() % 2 == 1 {
        chunk.push(0);
    }
    chunk
}

fn riff_file(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body = chunks.concat();
    let mut file = b"RIFF".to_vec();
    file.extend((body.len() as u32 + 4).to_le_bytes());
    file.extend(b"WAVE");
    file.extend(body);
    file
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

// splits a whole file into header, payload and footer
fn parts(format: ForeignFormat, file: &[u8], payload_len: usize) -> (Vec<u8>, &[u8], &[u8]) {
    let header = read_header(format, file).unwrap();
    let (payload, footer) = file[header.len()..].split_at(payload_len);
    (header, payload, footer)
}

fn block_list(chunks: &[Application]) -> BlockList {
    std::iter::once(Block::from(Streaminfo::new(44100, 1, 16)))
        .chain(chunks.iter().cloned().map(Block::from))
        .collect()
}

#[test]
fn test_identify() {
    assert_eq!(ForeignFormat::identify(*b"RIFF"), Some(ForeignFormat::Riff));
    assert_eq!(ForeignFormat::identify(*b"FORM"), Some(ForeignFormat::Aiff));
    assert_eq!(ForeignFormat::identify(*b"RIFX"), None);
    assert_eq!(ForeignFormat::Riff.application_id(), Application::RIFF);
    assert_eq!(ForeignFormat::Aiff.application_id(), Application::AIFF);
}

#[test]
fn test_riff_chunks() {
    let samples = [1, 0, 2, 0, 3, 0];
    let file = riff_file(&[
        fmt_chunk(1, 44100, 16),
        riff_chunk(b"LIST", b"odd"),
        riff_chunk(b"data", &samples),
        riff_chunk(b"cue ", &[0, 0, 0, 0]),
    ]);

    let (header, payload, footer) = parts(ForeignFormat::Riff, &file, samples.len());
    assert_eq!(payload, samples);

    let chunks = split(ForeignFormat::Riff, &header, footer).unwrap();
    assert_eq!(chunks.format, ForeignFormat::Riff);
    // container, fmt, LIST, data, cue
    assert_eq!(chunks.blocks.len(), 5);
    assert!(
        chunks
            .blocks
            .iter()
            .all(|b| b.id == ForeignFormat::Riff.application_id())
    );
    assert_eq!(chunks.blocks[2].data, riff_chunk(b"LIST", b"odd"));
    assert_eq!(chunks.payload_size, 6);
    assert_eq!(chunks.total_size, file.len() as u64);
    assert!(verify(&chunks, header.len(), 6, footer.len()).is_ok());

    let (pcm, mask) = chunks.pcm_format().unwrap();
    assert_eq!(pcm.sample_rate, 44100);
    assert_eq!(pcm.channels.get(), 1);
    assert_eq!(pcm.bits_per_sample.get(), 16);
    assert_eq!(mask, None);

    // blocks restore original header and footer
    let blocks = block_list(&chunks.blocks);
    assert!(has_foreign_chunks(&blocks, ForeignFormat::Riff));
    assert!(!has_foreign_chunks(&blocks, ForeignFormat::Aiff));
    let (restored_header, restored_footer) = header_footer(&blocks, ForeignFormat::Riff).unwrap();
    assert_eq!(restored_header, header);
    assert_eq!(restored_footer, footer);
}

#[test]
fn test_odd_payload() {
    let samples = [0x80, 0x81, 0x7F];
    let file = riff_file(&[
        fmt_chunk(1, 8000, 8),
        riff_chunk(b"data", &samples),
        riff_chunk(b"cue ", &[1, 2, 3, 4]),
    ]);

    let (header, payload, footer) = parts(ForeignFormat::Riff, &file, samples.len());
    assert_eq!(payload, samples);
    // pad byte follows odd-sized samples
    assert_eq!(footer[0], 0);

    let chunks = split(ForeignFormat::Riff, &header, footer).unwrap();
    assert_eq!(chunks.payload_size, 3);
    // container, fmt, data, cue
    assert_eq!(chunks.blocks.len(), 4);

    let (restored_header, restored_footer) =
        header_footer(&block_list(&chunks.blocks), ForeignFormat::Riff).unwrap();
    assert_eq!(restored_header, header);
    assert_eq!(restored_footer, footer);

    // a footer missing its pad byte is truncated
    assert_eq!(
        split(ForeignFormat::Riff, &header, &[]),
        Err(ChunkError::TruncatedChunk(*b"data"))
    );

    // with no footer chunks, pad byte alone is the footer
    let file = riff_file(&[fmt_chunk(1, 8000, 8), riff_chunk(b"data", &samples)]);
    let (header, _, footer) = parts(ForeignFormat::Riff, &file, samples.len());
    assert_eq!(footer, [0]);
    let chunks = split(ForeignFormat::Riff, &header, footer).unwrap();
    let (_, restored_footer) =
        header_footer(&block_list(&chunks.blocks), ForeignFormat::Riff).unwrap();
    assert_eq!(restored_footer, [0]);
}

#[test]
fn test_extensible_format() {
    let mut body: Vec<u8> = vec![];
    body.extend(0xFFFEu16.to_le_bytes());
    body.extend(6u16.to_le_bytes());
    body.extend(48000u32.to_le_bytes());
    body.extend((48000u32 * 12).to_le_bytes());
    body.extend(12u16.to_le_bytes());
    body.extend(16u16.to_le_bytes());
    body.extend(22u16.to_le_bytes());
    body.extend(16u16.to_le_bytes());
    body.extend(0x3Fu32.to_le_bytes());
    body.extend([0; 16]);

    let file = riff_file(&[riff_chunk(b"fmt ", &body), riff_chunk(b"data", &[])]);
    let (header, _, footer) = parts(ForeignFormat::Riff, &file, 0);
    let (pcm, mask) = split(ForeignFormat::Riff, &header, footer)
        .unwrap()
        .pcm_format()
        .unwrap();
    assert_eq!(pcm.sample_rate, 48000);
    assert_eq!(pcm.channels.get(), 6);
    assert_eq!(mask, Some(0x3F));

    // compressed formats aren't supported
    body[0] = 2;
    body[1] = 0;
    let file = riff_file(&[riff_chunk(b"fmt ", &body), riff_chunk(b"data", &[])]);
    let (header, _, footer) = parts(ForeignFormat::Riff, &file, 0);
    assert_eq!(
        split(ForeignFormat::Riff, &header, footer)
            .unwrap()
            .pcm_format(),
        Err(ChunkError::UnsupportedDescriptor)
    );
}

#[test]
fn test_aiff_chunks() {
    let mut comm: Vec<u8> = vec![];
    comm.extend(2u16.to_be_bytes());
    comm.extend(1u32.to_be_bytes());
    comm.extend(16u16.to_be_bytes());
    // 44100 as an 80-bit extended float
    comm.extend([0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]);

    let samples = [0x01, 0x02, 0x03, 0x04];

    let mut chunks: Vec<u8> = vec![];
    chunks.extend(b"COMM");
    chunks.extend((comm.len() as u32).to_be_bytes());
    chunks.extend(&comm);
    chunks.extend(b"SSND");
    chunks.extend((8 + samples.len() as u32).to_be_bytes());
    chunks.extend([0; 8]);
    let samples_start = chunks.len() + 12;
    chunks.extend(samples);

    let mut file = b"FORM".to_vec();
    file.extend((chunks.len() as u32 + 4).to_be_bytes());
    file.extend(b"AIFF");
    file.extend(chunks);

    let (header, payload, footer) = parts(ForeignFormat::Aiff, &file, samples.len());
    assert_eq!(header.len(), samples_start);
    assert_eq!(payload, samples);
    assert!(footer.is_empty());

    let chunks = split(ForeignFormat::Aiff, &header, footer).unwrap();
    // container, COMM, SSND
    assert_eq!(chunks.blocks.len(), 3);
    assert_eq!(chunks.payload_size, 4);
    assert_eq!(chunks.total_size, file.len() as u64);

    let (pcm, mask) = chunks.pcm_format().unwrap();
    assert_eq!(pcm.sample_rate, 44100);
    assert_eq!(pcm.channels.get(), 2);
    assert_eq!(pcm.bits_per_sample.get(), 16);
    assert_eq!(mask, None);

    let (restored_header, restored_footer) =
        header_footer(&block_list(&chunks.blocks), ForeignFormat::Aiff).unwrap();
    assert_eq!(restored_header, header);
    assert!(restored_footer.is_empty());

    // RIFF chunks aren't AIFF chunks
    assert!(matches!(
        header_footer(&block_list(&chunks.blocks), ForeignFormat::Riff),
        Err(Error::NoForeignChunks)
    ));
}

#[test]
fn test_invalid_layouts() {
    // headers only, with no samples following
    let header = |chunks: &[Vec<u8>]| riff_file(chunks);

    // wrong container
    assert_eq!(
        split(ForeignFormat::Aiff, &header(&[fmt_chunk(1, 44100, 16)]), &[]),
        Err(ChunkError::NotContainer(ForeignFormat::Aiff))
    );

    // no sample chunk
    assert_eq!(
        split(ForeignFormat::Riff, &header(&[fmt_chunk(1, 44100, 16)]), &[]),
        Err(ChunkError::MissingPayload)
    );

    // sample chunk before format chunk
    assert_eq!(
        split(
            ForeignFormat::Riff,
            &header(&[riff_chunk(b"data", &[])]),
            &[]
        ),
        Err(ChunkError::MissingDescriptor)
    );

    // two format chunks
    assert_eq!(
        split(
            ForeignFormat::Riff,
            &header(&[
                fmt_chunk(1, 44100, 16),
                fmt_chunk(1, 44100, 16),
                riff_chunk(b"data", &[]),
            ]),
            &[]
        ),
        Err(ChunkError::MultipleDescriptors)
    );

    let valid = header(&[fmt_chunk(1, 44100, 16), riff_chunk(b"data", &[])]);

    // format or sample chunks in footer
    assert_eq!(
        split(ForeignFormat::Riff, &valid, &fmt_chunk(1, 44100, 16)),
        Err(ChunkError::MultipleDescriptors)
    );
    assert_eq!(
        split(ForeignFormat::Riff, &valid, &riff_chunk(b"data", &[])),
        Err(ChunkError::MultiplePayloads)
    );

    // bytes after the sample chunk's header
    let mut extra = valid.clone();
    extra.extend([1, 2]);
    assert_eq!(
        split(ForeignFormat::Riff, &extra, &[]),
        Err(ChunkError::ExtraHeaderData)
    );

    // chunk larger than its data
    let mut truncated = header(&[fmt_chunk(1, 44100, 16)]);
    truncated.extend(b"LIST");
    truncated.extend(100u32.to_le_bytes());
    truncated.extend([0; 10]);
    assert_eq!(
        split(ForeignFormat::Riff, &truncated, &[]),
        Err(ChunkError::TruncatedChunk(*b"LIST"))
    );

    // reading a header stops at truncated chunks too
    assert!(matches!(
        read_header(ForeignFormat::Riff, truncated.as_slice()),
        Err(Error::InvalidChunkLayout(ChunkError::TruncatedChunk(_)))
    ));
    assert!(matches!(
        read_header(ForeignFormat::Riff, &b"RIFF"[..]),
        Err(Error::InvalidChunkLayout(ChunkError::NotContainer(
            ForeignFormat::Riff
        )))
    ));
}

#[test]
fn test_corrupted_chunk_id() {
    let file = riff_file(&[
        fmt_chunk(1, 44100, 16),
        riff_chunk(b"LIST", b"info"),
        riff_chunk(b"data", &[0, 0]),
    ]);
    let (header, _, footer) = parts(ForeignFormat::Riff, &file, 2);
    let mut chunks = split(ForeignFormat::Riff, &header, footer).unwrap();

    // non-printable byte somewhere in LIST chunk's ID
    chunks.blocks[2].data[fastrand::usize(0..4)] = fastrand::u8(0..0x20);

    assert!(matches!(
        header_footer(&block_list(&chunks.blocks), ForeignFormat::Riff),
        Err(Error::InvalidChunkLayout(ChunkError::InvalidChunkId(_)))
    ));
}

#[test]
fn test_size_mismatch() {
    let samples = [1, 0, 2, 0];
    let file = riff_file(&[fmt_chunk(1, 44100, 16), riff_chunk(b"data", &samples)]);
    let (header, _, footer) = parts(ForeignFormat::Riff, &file, samples.len());
    let chunks = split(ForeignFormat::Riff, &header, footer).unwrap();

    // fewer samples than the data chunk announces
    let err = verify(&chunks, header.len(), 2, footer.len()).unwrap_err();
    assert!(matches!(
        err,
        Error::ForeignContainerMismatch {
            expected: 4,
            actual: 2
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ForeignContainerMismatch);

    // extra bytes after the container's end
    assert!(matches!(
        verify(&chunks, header.len(), 4, footer.len() + 8),
        Err(Error::ForeignContainerMismatch { .. })
    ));

    // container size field that disagrees with its contents
    let mut blocks = chunks.blocks.clone();
    blocks[0].data[4] += 2;
    let err = header_footer(&block_list(&blocks), ForeignFormat::Riff).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidChunkLayout(ChunkError::SizeMismatch { expected, actual })
            if expected == actual + 2
    ));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);

    // no chunks at all
    assert!(matches!(
        header_footer(&block_list(&[]), ForeignFormat::Riff),
        Err(Error::NoForeignChunks)
    ));
}
