//! Bounded-memory shuffling of documents into shards.
//!
//! Documents are scattered into `shuffle_buckets` buckets at random. A bucket that reaches
//! the shard capacity is shuffled and emitted as a full shard. At the end of the run the
//! remaining documents of every bucket are pooled, shuffled and cut into shards, so that
//! only the very last shard can be short.
//!
//! Memory holds at most `buckets * (capacity - 1)` documents. This is an approximation of a
//! uniform shuffle: more buckets means a better mix and more memory.
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Error;

/// Receives full shards, in emission order.
pub trait ShardSink {
    fn submit(&mut self, documents: Vec<String>) -> Result<(), Error>;
}

/// Collects shards in memory.
impl ShardSink for Vec<Vec<String>> {
    fn submit(&mut self, documents: Vec<String>) -> Result<(), Error> {
        self.push(documents);
        Ok(())
    }
}

pub struct Sharder<S> {
    buckets: Vec<Vec<String>>,
    capacity: Option<usize>,
    rng: StdRng,
    sink: S,
    received: u64,
}

impl<S: ShardSink> Sharder<S> {
    /// `capacity` of `None` keeps every document in memory and writes a single shard.
    pub fn new(capacity: Option<usize>, buckets: usize, rng: StdRng, sink: S) -> Self {
        let buckets = match capacity {
            Some(_) => buckets.max(1),
            None => {
                warn!("no shard capacity: the whole corpus is held in memory before writing");
                1
            }
        };
        Self {
            buckets: vec![Vec::new(); buckets],
            capacity,
            rng,
            sink,
            received: 0,
        }
    }

    pub fn push(&mut self, document: String) -> Result<(), Error> {
        self.received += 1;
        let idx = self.rng.gen_range(0..self.buckets.len());
        let bucket = &mut self.buckets[idx];
        bucket.push(document);

        if let Some(capacity) = self.capacity {
            if bucket.len() >= capacity {
                let mut shard = std::mem::take(bucket);
                shard.shuffle(&mut self.rng);
                debug!("bucket {} full, emitting a shard", idx);
                self.sink.submit(shard)?;
            }
        }
        Ok(())
    }

    /// Number of documents pushed so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Flush the remaining documents and hand the sink back.
    pub fn finish(mut self) -> Result<S, Error> {
        let mut rest: Vec<String> = self.buckets.drain(..).flatten().collect();
        rest.shuffle(&mut self.rng);

        match self.capacity {
            Some(capacity) => {
                let mut rest = rest.into_iter().peekable();
                while rest.peek().is_some() {
                    let shard: Vec<String> = rest.by_ref().take(capacity).collect();
                    self.sink.submit(shard)?;
                }
            }
            None if !rest.is_empty() => self.sink.submit(rest)?,
            None => (),
        }
        Ok(self.sink)
    }
}
