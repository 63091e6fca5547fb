//! Shard files.
//!
//! A shard is written gzip-compressed under the intermediate directory with a `.partial`
//! suffix, then moved into the corpus directory once it is complete. A file that is visible
//! in the corpus directory is therefore always a whole shard.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, error, info, warn};

use crate::config::DocumentType;
use crate::error::Error;
use crate::pipelines::CancellationToken;
use crate::processing::shuffle::ShardSink;
use crate::stats::ShardReport;

pub fn shard_name(document_type: DocumentType, sequence: usize) -> String {
    format!("{}_corpus_{:05}.txt.gz", document_type, sequence)
}

/// Sequence numbers of the shards of `document_type` already present in `corpus_dir`.
pub fn existing_shards(corpus_dir: &Path, document_type: DocumentType) -> Result<Vec<usize>, Error> {
    let prefix = format!("{}_corpus_", document_type);
    let pattern = corpus_dir.join(format!("{prefix}*.txt.gz"));
    let pattern = pattern.to_string_lossy();

    let mut sequences: Vec<usize> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(prefix.as_str()))
                .and_then(|rest| rest.strip_suffix(".txt.gz"))
                .and_then(|seq| seq.parse().ok())
        })
        .collect();
    sequences.sort_unstable();
    Ok(sequences)
}

/// Documents of one shard along with its sequence number.
#[derive(Debug)]
pub struct ShardJob {
    pub sequence: usize,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ShardWriter {
    document_type: DocumentType,
    intermediate_dir: PathBuf,
    corpus_dir: PathBuf,
    compression: Compression,
}

impl ShardWriter {
    pub fn new(
        document_type: DocumentType,
        intermediate_dir: PathBuf,
        corpus_dir: PathBuf,
        compression_level: u32,
    ) -> Self {
        Self {
            document_type,
            intermediate_dir,
            corpus_dir,
            compression: Compression::new(compression_level),
        }
    }

    fn write_partial(
        &self,
        path: &Path,
        job: &ShardJob,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), self.compression);
        for document in &job.documents {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            encoder.write_all(document.as_bytes())?;
            encoder.write_all(b"\n")?;
        }
        let file = encoder
            .finish()?
            .into_inner()
            .map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Write a shard and move it into the corpus directory.
    ///
    /// On failure or cancellation the partial file is removed.
    pub fn write(&self, job: &ShardJob, cancel: &CancellationToken) -> Result<ShardReport, Error> {
        let name = shard_name(self.document_type, job.sequence);
        let partial = self.intermediate_dir.join(format!("{name}.partial"));
        let target = self.corpus_dir.join(&name);

        debug!("writing {} documents to {:?}", job.documents.len(), partial);
        if let Err(e) = self.write_partial(&partial, job, cancel) {
            if let Err(rm) = std::fs::remove_file(&partial) {
                debug!("could not remove {:?}: {}", partial, rm);
            }
            return Err(match e {
                Error::Io(source) => Error::ShardWrite {
                    path: partial,
                    source,
                },
                other => other,
            });
        }

        finalize(&partial, &target).map_err(|source| Error::ShardWrite {
            path: target.clone(),
            source,
        })?;

        info!("[{}] wrote {:?}", self.document_type, target);
        Ok(ShardReport {
            sequence: job.sequence,
            path: target,
            documents: job.documents.len(),
        })
    }
}

/// Move `from` to `to`, copying when both are not on the same filesystem.
fn finalize(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("rename {:?} -> {:?} failed ({}), copying", from, to, e);
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Pool of writer threads fed through a bounded channel.
pub struct WriterPool {
    sender: Option<Sender<ShardJob>>,
    handles: Vec<JoinHandle<Result<Vec<ShardReport>, Error>>>,
    failed: Arc<AtomicBool>,
    next_sequence: usize,
}

impl WriterPool {
    /// Spawn `workers` writer threads. Shards are numbered from `first_sequence`.
    pub fn new(
        writer: ShardWriter,
        workers: usize,
        queue_depth: usize,
        first_sequence: usize,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let (sender, receiver) = bounded::<ShardJob>(queue_depth.max(1));
        let failed = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let receiver: Receiver<ShardJob> = receiver.clone();
            let writer = writer.clone();
            let cancel = cancel.clone();
            let failed = failed.clone();
            let handle = std::thread::Builder::new()
                .name(format!("shard-writer-{i}"))
                .spawn(move || {
                    let mut reports = Vec::new();
                    for job in receiver.iter() {
                        if cancel.is_cancelled() {
                            // drain without writing
                            continue;
                        }
                        match writer.write(&job, &cancel) {
                            Ok(report) => reports.push(report),
                            Err(Error::Cancelled) => (),
                            Err(e) => {
                                error!("shard {} failed: {}", job.sequence, e);
                                failed.store(true, Ordering::SeqCst);
                                cancel.cancel();
                                return Err(e);
                            }
                        }
                    }
                    Ok(reports)
                })?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            handles,
            failed,
            next_sequence: first_sequence,
        })
    }

    /// Stop accepting shards, wait for the writers and return the written shards by sequence.
    pub fn finish(mut self) -> Result<Vec<ShardReport>, Error> {
        self.join()
    }

    fn join(&mut self) -> Result<Vec<ShardReport>, Error> {
        drop(self.sender.take());
        let mut reports = Vec::new();
        let mut first_error = None;
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(Ok(mut r)) => reports.append(&mut r),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(Error::Custom("a shard writer panicked".to_string()));
                }
            }
        }
        reports.sort_by_key(|r| r.sequence);
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

impl ShardSink for WriterPool {
    fn submit(&mut self, documents: Vec<String>) -> Result<(), Error> {
        if self.failed.load(Ordering::SeqCst) {
            return self.join().map(|_| ());
        }
        let sender = match &self.sender {
            Some(s) => s,
            None => return Err(Error::Custom("writer pool is closed".to_string())),
        };
        let job = ShardJob {
            sequence: self.next_sequence,
            documents,
        };
        self.next_sequence += 1;
        if sender.send(job).is_err() {
            warn!("every shard writer has stopped");
            return self.join().map(|_| ());
        }
        Ok(())
    }
}

impl Drop for WriterPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.join();
        }
    }
}
