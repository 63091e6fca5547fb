//! Multistream bzip2 archive reading.
//!
//! Wikipedia `*-multistream.xml.bz2` dumps are a concatenation of independent bzip2 streams,
//! each holding about a hundred pages. [MultistreamReader] cuts the compressed byte stream
//! at stream boundaries without decompressing anything, so that [BlockDecoder] can
//! decompress batches of streams on a rayon pool and hand them back in archive order.
//!
//! A stream starts with a byte-aligned `BZh[1-9]` header immediately followed by either the
//! block magic (`0x314159265359`) or the end-of-stream magic (`0x177245385090`).
//! Inside a stream, blocks are bit-aligned, so a false positive would need ten specific
//! bytes to appear at a byte boundary in compressed data.
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{CorruptArchive, Error};

const BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
const EOS_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
const SIGNATURE_LEN: usize = 10;
const READ_SIZE: usize = 1 << 20;

/// Compressed bytes of one bzip2 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub index: usize,
    /// position of the stream in the archive (bytes)
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Decompressed content of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Returns true if a bzip2 stream header starts at `pos`.
fn is_stream_start(buf: &[u8], pos: usize) -> bool {
    buf.len() >= pos + SIGNATURE_LEN
        && &buf[pos..pos + 3] == b"BZh"
        && (b'1'..=b'9').contains(&buf[pos + 3])
        && (buf[pos + 4..pos + SIGNATURE_LEN] == BLOCK_MAGIC
            || buf[pos + 4..pos + SIGNATURE_LEN] == EOS_MAGIC)
}

/// Splits a multistream archive into [RawBlock]s.
///
/// Memory use is bounded by the size of the largest stream plus one read buffer.
pub struct MultistreamReader<R> {
    reader: R,
    pending: Vec<u8>,
    /// position in `pending` from which the next signature search starts
    search_from: usize,
    offset: u64,
    index: usize,
    eof: bool,
}

impl MultistreamReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(READ_SIZE, file)))
    }
}

impl<R: Read> MultistreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            search_from: 1,
            offset: 0,
            index: 0,
            eof: false,
        }
    }

    fn find_next_start(&self) -> Option<usize> {
        let start = self.search_from.max(1);
        if self.pending.len() < SIGNATURE_LEN {
            return None;
        }
        (start..=self.pending.len() - SIGNATURE_LEN).find(|&i| is_stream_start(&self.pending, i))
    }

    fn cut(&mut self, at: usize) -> RawBlock {
        let rest = self.pending.split_off(at);
        let bytes = std::mem::replace(&mut self.pending, rest);
        let block = RawBlock {
            index: self.index,
            offset: self.offset,
            bytes,
        };
        self.index += 1;
        self.offset += at as u64;
        self.search_from = 1;
        block
    }

    fn fill(&mut self) -> std::io::Result<usize> {
        let len = self.pending.len();
        self.pending.resize(len + READ_SIZE, 0);
        let read = loop {
            match self.reader.read(&mut self.pending[len..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.pending.truncate(len);
                    return Err(e);
                }
            }
        };
        self.pending.truncate(len + read);
        Ok(read)
    }
}

impl<R: Read> Iterator for MultistreamReader<R> {
    type Item = Result<RawBlock, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(at) = self.find_next_start() {
                return Some(Ok(self.cut(at)));
            }

            if self.eof {
                if self.pending.is_empty() {
                    return None;
                }
                let at = self.pending.len();
                return Some(Ok(self.cut(at)));
            }

            // a signature may straddle the previous read boundary
            self.search_from = self.pending.len().saturating_sub(SIGNATURE_LEN - 1);
            match self.fill() {
                Ok(0) => self.eof = true,
                Ok(_) => (),
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}

/// Decompress one stream.
pub fn decompress_block(block: RawBlock) -> Result<Block, CorruptArchive> {
    let mut decoder = MultiBzDecoder::new(block.bytes.as_slice());
    let mut data = Vec::with_capacity(block.bytes.len() * 5);
    match decoder.read_to_end(&mut data) {
        Ok(_) => Ok(Block {
            index: block.index,
            offset: block.offset,
            data,
        }),
        Err(e) => Err(CorruptArchive {
            index: block.index,
            offset: block.offset,
            reason: e.to_string(),
        }),
    }
}

/// Decompresses [RawBlock]s in parallel batches while preserving archive order.
///
/// Corrupt streams come out as [Error::CorruptArchive] items; the iterator keeps going
/// after them. Source I/O errors come out as [Error::Io].
pub struct BlockDecoder<I> {
    raw: I,
    pool: rayon::ThreadPool,
    batch_size: usize,
    ready: VecDeque<Result<Block, Error>>,
    exhausted: bool,
}

impl<I> BlockDecoder<I>
where
    I: Iterator<Item = Result<RawBlock, Error>>,
{
    /// `workers` decompression threads, each batch holding `2 * workers` streams.
    pub fn new(raw: I, workers: usize) -> Result<Self, Error> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bz2-decoder-{i}"))
            .build()
            .map_err(|e| Error::Custom(format!("could not build decoder pool: {e}")))?;
        Ok(Self {
            raw,
            pool,
            batch_size: workers * 2,
            ready: VecDeque::new(),
            exhausted: false,
        })
    }

    fn decode_batch(&mut self) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut failure = None;
        while batch.len() < self.batch_size {
            match self.raw.next() {
                Some(Ok(raw)) => batch.push(raw),
                Some(Err(e)) => {
                    failure = Some(e);
                    self.exhausted = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        debug!("decompressing a batch of {} streams", batch.len());
        let decoded: Vec<Result<Block, CorruptArchive>> = self
            .pool
            .install(|| batch.into_par_iter().map(decompress_block).collect());

        self.ready
            .extend(decoded.into_iter().map(|r| r.map_err(Error::CorruptArchive)));
        if let Some(e) = failure {
            self.ready.push_back(Err(e));
        }
    }
}

impl<I> Iterator for BlockDecoder<I>
where
    I: Iterator<Item = Result<RawBlock, Error>>,
{
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ready.is_empty() && !self.exhausted {
            self.decode_batch();
        }
        self.ready.pop_front()
    }
}

/// Uncompressed `.xml` dumps, cut in fixed-size chunks.
pub struct PlainChunks<R> {
    reader: R,
    index: usize,
    offset: u64,
}

impl<R: Read> PlainChunks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            index: 0,
            offset: 0,
        }
    }
}

impl<R: Read> Iterator for PlainChunks<R> {
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut data = Vec::with_capacity(READ_SIZE);
        match (&mut self.reader)
            .take(READ_SIZE as u64)
            .read_to_end(&mut data)
        {
            Ok(0) => None,
            Ok(n) => {
                let block = Block {
                    index: self.index,
                    offset: self.offset,
                    data,
                };
                self.index += 1;
                self.offset += n as u64;
                Some(Ok(block))
            }
            Err(e) => Some(Err(Error::Io(e))),
        }
    }
}

/// Block source for a dump file: multistream bzip2 if the file starts with a bzip2 header,
/// plain XML otherwise.
pub fn open_dump(
    path: &Path,
    workers: usize,
) -> Result<Box<dyn Iterator<Item = Result<Block, Error>> + Send>, Error> {
    let mut head = [0u8; 3];
    let mut f = File::open(path)?;
    let n = f.read(&mut head)?;
    drop(f);

    if n == 3 && &head == b"BZh" {
        debug!("{:?} is a bzip2 archive", path);
        let raw = MultistreamReader::from_path(path)?;
        Ok(Box::new(BlockDecoder::new(raw, workers)?))
    } else {
        warn!("{:?} is not bzip2 compressed, reading it as plain XML", path);
        let file = File::open(path)?;
        Ok(Box::new(PlainChunks::new(BufReader::new(file))))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use bzip2::write::BzEncoder;
    use bzip2::Compression;

    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn archive(parts: &[&str]) -> (Vec<u8>, Vec<usize>) {
        let mut out = Vec::new();
        let mut offsets = Vec::new();
        for part in parts {
            offsets.push(out.len());
            out.extend(compress(part.as_bytes()));
        }
        (out, offsets)
    }

    #[test]
    fn splits_on_stream_boundaries() {
        let parts = ["<mediawiki>", "<page>one</page>", "<page>two</page>", "</mediawiki>"];
        let (bytes, offsets) = archive(&parts);

        let raw: Vec<RawBlock> = MultistreamReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(raw.len(), 4);
        for (i, block) in raw.iter().enumerate() {
            assert_eq!(block.index, i);
            assert_eq!(block.offset, offsets[i] as u64);
        }

        let decoded: Vec<String> = raw
            .into_iter()
            .map(|r| String::from_utf8(decompress_block(r).unwrap().data).unwrap())
            .collect();
        assert_eq!(decoded, parts);
    }

    #[test]
    fn empty_stream_is_a_block() {
        let mut bytes = compress(b"first");
        bytes.extend(compress(b""));
        bytes.extend(compress(b"third"));
        let raw: Vec<RawBlock> = MultistreamReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(decompress_block(raw[1].clone()).unwrap().data.is_empty());
    }

    #[test]
    fn corrupt_block_is_reported_and_skipped() {
        let parts = ["<page>alpha</page>", "<page>beta</page>", "<page>gamma</page>"];
        let (mut bytes, offsets) = archive(&parts);

        // damage the middle of the second stream
        let middle = (offsets[1] + offsets[2]) / 2;
        bytes[middle] ^= 0xFF;

        let raw = MultistreamReader::new(Cursor::new(bytes));
        let decoder = BlockDecoder::new(raw, 2).unwrap();
        let results: Vec<Result<Block, Error>> = decoder.collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(Error::CorruptArchive(c)) => assert_eq!(c.index, 1),
            other => panic!("expected a corrupt block, got {other:?}"),
        }
        assert_eq!(results[2].as_ref().unwrap().data, b"<page>gamma</page>");
    }

    #[test]
    fn decoder_preserves_order() {
        let parts: Vec<String> = (0..50).map(|i| format!("<page>{i}</page>")).collect();
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let (bytes, _) = archive(&refs);

        let decoder = BlockDecoder::new(MultistreamReader::new(Cursor::new(bytes)), 4).unwrap();
        let decoded: Vec<String> = decoder
            .map(|b| String::from_utf8(b.unwrap().data).unwrap())
            .collect();
        assert_eq!(decoded, parts);
    }

    #[test]
    fn plain_chunks() {
        let data = vec![b'x'; READ_SIZE + 10];
        let chunks: Vec<Block> = PlainChunks::new(Cursor::new(data))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].data.len(), 10);
        assert_eq!(chunks[1].offset, READ_SIZE as u64);
    }
}
