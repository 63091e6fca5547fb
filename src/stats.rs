//! Run-level counters and the final report.
//!
//! Every stage owns its own [RunStats] and hands it back when it stops.
//! The pipeline reduces them with [RunStats::merge] at shutdown.
use std::ops::AddAssign;
use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub blocks_read: u64,
    pub blocks_corrupted: u64,
    pub pages_seen: u64,
    pub pages_kept: u64,
    pub pages_dropped_namespace: u64,
    pub pages_dropped_redirect: u64,
    pub pages_dropped_empty: u64,
    pub pages_dropped_disambiguation: u64,
    pub pages_malformed: u64,
    pub marker_collisions: u64,
    pub garbage_spans: u64,
    pub documents_clean: u64,
    pub documents_garbage: u64,
    pub paragraphs_filtered: u64,
    pub documents_filtered: u64,
    pub documents_written: u64,
    pub shards_written: u64,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.blocks_read += other.blocks_read;
        self.blocks_corrupted += other.blocks_corrupted;
        self.pages_seen += other.pages_seen;
        self.pages_kept += other.pages_kept;
        self.pages_dropped_namespace += other.pages_dropped_namespace;
        self.pages_dropped_redirect += other.pages_dropped_redirect;
        self.pages_dropped_empty += other.pages_dropped_empty;
        self.pages_dropped_disambiguation += other.pages_dropped_disambiguation;
        self.pages_malformed += other.pages_malformed;
        self.marker_collisions += other.marker_collisions;
        self.garbage_spans += other.garbage_spans;
        self.documents_clean += other.documents_clean;
        self.documents_garbage += other.documents_garbage;
        self.paragraphs_filtered += other.paragraphs_filtered;
        self.documents_filtered += other.documents_filtered;
        self.documents_written += other.documents_written;
        self.shards_written += other.shards_written;
    }

    pub fn pages_dropped(&self) -> u64 {
        self.pages_dropped_namespace
            + self.pages_dropped_redirect
            + self.pages_dropped_empty
            + self.pages_dropped_disambiguation
    }
}

impl AddAssign<&RunStats> for RunStats {
    fn add_assign(&mut self, rhs: &RunStats) {
        self.merge(rhs);
    }
}

/// A shard that has been flushed and moved into the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardReport {
    pub sequence: usize,
    pub path: PathBuf,
    pub documents: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleReport {
    pub path: PathBuf,
    pub target: usize,
    pub sampled: usize,
    pub population: u64,
    pub excluded_from_corpus: bool,
}

impl SampleReport {
    pub fn is_short(&self) -> bool {
        self.sampled < self.target
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub document_type: String,
    pub stats: RunStats,
    pub shards: Vec<ShardReport>,
    pub sample: Option<SampleReport>,
    /// Test mode only, see [crate::processing::trace].
    pub artifacts: Vec<PathBuf>,
}

impl RunReport {
    /// Log a human-readable summary.
    pub fn log(&self) {
        for shard in &self.shards {
            info!(
                "[{}] shard {:?}: {} documents",
                self.document_type, shard.path, shard.documents
            );
        }
        info!(
            "[{}] {} documents in {} shards",
            self.document_type,
            self.stats.documents_written,
            self.shards.len()
        );
        info!(
            "pages: {} seen, {} kept, {} dropped, {} malformed",
            self.stats.pages_seen,
            self.stats.pages_kept,
            self.stats.pages_dropped(),
            self.stats.pages_malformed
        );
        info!(
            "blocks: {} read, {} corrupted",
            self.stats.blocks_read, self.stats.blocks_corrupted
        );
        if self.stats.paragraphs_filtered + self.stats.documents_filtered > 0 {
            info!(
                "filtered out: {} short paragraphs, {} noisy documents",
                self.stats.paragraphs_filtered, self.stats.documents_filtered
            );
        }
        if self.stats.marker_collisions > 0 {
            warn!(
                "{} reserved marker occurrences were escaped in source text",
                self.stats.marker_collisions
            );
        }
        if let Some(sample) = &self.sample {
            if sample.is_short() {
                warn!(
                    "test sample is short: {}/{} articles ({} available)",
                    sample.sampled, sample.target, sample.population
                );
            } else {
                info!(
                    "test sample: {} articles written to {:?}",
                    sample.sampled, sample.path
                );
            }
        }
    }
}
