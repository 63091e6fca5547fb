/*!
# IO utilities

Corpus shard writing: gzip-compressed, one document per line, written to a partial file and
moved into the corpus directory once complete.
!*/
pub mod shard;

pub use shard::{existing_shards, shard_name, ShardJob, ShardWriter, WriterPool};
