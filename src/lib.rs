/*!
# wikicorpus

Builds natural-language training corpora from Wikipedia multistream dumps.

The dump is split into its bzip2 streams, decompressed in parallel, parsed page by page,
stripped of its markup and segmented into sentences, paragraphs or whole articles.
Documents are then shuffled into gzip-compressed shards of bounded size, while a reservoir
keeps a held-out sample of whole articles.

This crate can be used both as a tool (see `wikicorpus --help`) or as a lib to reuse
the individual stages:

```no_run
use wikicorpus::config::Config;
use wikicorpus::pipelines::{CancellationToken, CorpusPipeline, Pipeline};

let config = Config::from_path("wikicorpus.toml").unwrap();
let pipeline = CorpusPipeline::new(config, None, CancellationToken::new());
let report = pipeline.run().unwrap();
report.log();
```
!*/
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod filtering;
pub mod io;
pub mod markers;
pub mod pipelines;
pub mod processing;
pub mod sources;
pub mod stats;
