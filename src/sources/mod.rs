//! Dump reading: bzip2 multistream splitting and decoding, then page extraction.
pub mod multistream;
pub mod wikipedia;

pub use multistream::{decompress_block, open_dump, Block, BlockDecoder, MultistreamReader, RawBlock};
pub use wikipedia::{BlockStream, PageFilter, Pages, RawPage};
