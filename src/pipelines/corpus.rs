//! Dump-to-corpus pipeline
//!
//! Stages run on their own threads and are connected by bounded channels, so that a full
//! queue blocks its producer:
//!
//! 1. the reader splits the archive into streams and decompresses them in order,
//! 1. the extractor parses pages out of the decompressed blocks,
//! 1. cleaner threads strip the markup, filter and segment each article into documents,
//! 1. the calling thread feeds the test sample and the sharder, and in test mode writes the
//!    first articles out at each step,
//! 1. writer threads compress full shards and move them into the corpus directory.
//!
//! Every stage hands its [RunStats] back when it stops, and they are merged once all
//! stages have been joined.
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};
use itertools::Itertools;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::download::{Directories, DumpLocator};
use crate::error::Error;
use crate::filtering::NoiseFilter;
use crate::io::{existing_shards, ShardWriter, WriterPool};
use crate::pipelines::{CancellationToken, Pipeline};
use crate::processing::package;
use crate::processing::sample::sample_path;
use crate::processing::{
    ArticleTrace, Cleaner, Document, ReservoirSampler, SampledArticle, Segmenter, Sharder,
    TraceWriter,
};
use crate::sources::multistream::open_dump;
use crate::sources::wikipedia::{BlockStream, PageFilter, Pages, RawPage};
use crate::stats::{RunReport, RunStats};

const PROGRESS_EVERY: u64 = 100_000;

/// Documents of one article, in article order.
struct SegmentedArticle {
    title: String,
    documents: Vec<Document>,
    trace: Option<ArticleTrace>,
}

pub struct CorpusPipeline {
    config: Config,
    dump: Option<PathBuf>,
    cancel: CancellationToken,
}

impl CorpusPipeline {
    /// `dump` bypasses the download and points at a local dump file.
    pub fn new(config: Config, dump: Option<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            config,
            dump,
            cancel,
        }
    }

    fn dump_path(&self) -> Result<PathBuf, Error> {
        match &self.dump {
            Some(path) => Ok(path.clone()),
            None => DumpLocator::from_config(&self.config)?
                .with_cancel(self.cancel.clone())
                .locate(),
        }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Sequence number of the first shard of this run.
    fn first_sequence(&self) -> Result<usize, Error> {
        let document_type = self.config.document_type;
        let existing = existing_shards(&self.config.corpus_dir, document_type)?;
        match existing.last() {
            Some(last) => {
                warn!(
                    "[{}] {:?} already holds shards {}, numbering continues at {}",
                    document_type,
                    self.config.corpus_dir,
                    existing.iter().map(|seq| format!("{seq:05}")).join(", "),
                    last + 1
                );
                Ok(last + 1)
            }
            None => Ok(1),
        }
    }

    fn spawn_reader(
        &self,
        dump: PathBuf,
    ) -> Result<(Receiver<Vec<u8>>, JoinHandle<Result<RunStats, Error>>), Error> {
        let (sender, receiver) = bounded(self.config.queue_depth);
        let workers = self.config.decompression_workers;
        let cancel = self.cancel.clone();

        let handle = std::thread::Builder::new()
            .name("block-reader".to_string())
            .spawn(move || -> Result<RunStats, Error> {
                let mut stats = RunStats::default();
                let blocks = open_dump(&dump, workers).map_err(|e| fail(&cancel, e))?;
                for block in blocks {
                    if cancel.is_cancelled() {
                        break;
                    }
                    stats.blocks_read += 1;
                    match block {
                        Ok(block) => {
                            if sender.send(block.data).is_err() {
                                break;
                            }
                        }
                        Err(Error::CorruptArchive(c)) => {
                            warn!(
                                "skipping corrupt block {} at byte {}: {}",
                                c.index, c.offset, c.reason
                            );
                            stats.blocks_corrupted += 1;
                        }
                        Err(e) => return Err(fail(&cancel, e)),
                    }
                }
                debug!("reader done after {} blocks", stats.blocks_read);
                Ok(stats)
            })?;
        Ok((receiver, handle))
    }

    fn spawn_extractor(
        &self,
        blocks: Receiver<Vec<u8>>,
    ) -> Result<(Receiver<RawPage>, JoinHandle<Result<RunStats, Error>>), Error> {
        let (sender, receiver) = bounded(self.config.queue_depth);
        let filter = PageFilter::from_config(&self.config);
        let cancel = self.cancel.clone();

        let handle = std::thread::Builder::new()
            .name("page-extractor".to_string())
            .spawn(move || -> Result<RunStats, Error> {
                let mut pages = Pages::new(BlockStream::new(blocks.into_iter()), filter);
                let mut next_progress = PROGRESS_EVERY;
                while let Some(page) = pages.next() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match page {
                        Ok(page) => {
                            if sender.send(page).is_err() {
                                break;
                            }
                        }
                        Err(Error::MalformedRecord(m)) => warn!(
                            "skipping malformed page #{} ({:?}): {}",
                            m.page_index, m.title, m.reason
                        ),
                        Err(e) => return Err(fail(&cancel, e)),
                    }

                    let stats = pages.stats();
                    if stats.pages_seen >= next_progress {
                        info!(
                            "{} pages seen, {} kept, {} dropped",
                            stats.pages_seen,
                            stats.pages_kept,
                            stats.pages_dropped()
                        );
                        next_progress += PROGRESS_EVERY;
                    }
                }
                Ok(pages.into_stats())
            })?;
        Ok((receiver, handle))
    }

    fn spawn_cleaners(
        &self,
        pages: Receiver<RawPage>,
    ) -> Result<
        (
            Receiver<SegmentedArticle>,
            Vec<JoinHandle<Result<RunStats, Error>>>,
        ),
        Error,
    > {
        let (sender, receiver) = bounded(self.config.queue_depth);
        let cleaner = Cleaner::new(self.config.markers());
        let segmenter = Segmenter::new(self.config.document_type, self.config.markers())
            .with_garbage(self.config.emit_garbage_documents);
        let filter = NoiseFilter::from_config(&self.config);
        // articles still to be traced, shared by all cleaners
        let trace_budget = if self.config.writes_test_artifacts() {
            self.config.num_test_articles
        } else {
            0
        };
        let traced = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(self.config.cleaning_workers);
        for i in 0..self.config.cleaning_workers {
            let pages = pages.clone();
            let sender = sender.clone();
            let cleaner = cleaner.clone();
            let segmenter = segmenter.clone();
            let filter = filter.clone();
            let traced = traced.clone();
            let cancel = self.cancel.clone();

            let handle = std::thread::Builder::new()
                .name(format!("cleaner-{i}"))
                .spawn(move || -> Result<RunStats, Error> {
                    let mut stats = RunStats::default();
                    for page in pages.iter() {
                        if cancel.is_cancelled() {
                            continue;
                        }
                        let mut cleaned = cleaner.clean(&page.title, &page.wikitext);
                        if let Some(collision) = cleaned.collision() {
                            warn!("{}", collision);
                        }
                        stats.marker_collisions += cleaned.marker_collisions as u64;
                        stats.garbage_spans += cleaned.garbage_spans as u64;
                        stats.paragraphs_filtered +=
                            filter.paragraphs(&mut cleaned.paragraphs) as u64;

                        let mut documents = segmenter.segment(&cleaned);
                        stats.documents_filtered += filter.documents(&mut documents) as u64;
                        if documents.is_empty() {
                            debug!("{:?} has no text left after cleaning", page.title);
                            continue;
                        }
                        for document in &documents {
                            if document.is_garbage() {
                                stats.documents_garbage += 1;
                            } else {
                                stats.documents_clean += 1;
                            }
                        }

                        let trace = traced
                            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                                (n < trace_budget).then_some(n + 1)
                            })
                            .is_ok()
                            .then(|| ArticleTrace {
                                wikitext: page.wikitext,
                                paragraphs: cleaned.paragraphs,
                            });
                        let article = SegmentedArticle {
                            title: page.title,
                            documents,
                            trace,
                        };
                        if sender.send(article).is_err() {
                            break;
                        }
                    }
                    Ok(stats)
                })?;
            handles.push(handle);
        }
        Ok((receiver, handles))
    }

    /// Offer each article to the test sample and shard whatever is released to the corpus.
    fn consume(
        &self,
        articles: &Receiver<SegmentedArticle>,
        sampler: &mut ReservoirSampler,
        sharder: &mut Sharder<WriterPool>,
        mut tracer: Option<&mut TraceWriter>,
    ) -> Result<(), Error> {
        for article in articles.iter() {
            if self.cancel.is_cancelled() {
                continue;
            }
            let article_trace = article.trace;
            let article = SampledArticle {
                title: article.title,
                documents: article.documents.into_iter().map(|d| d.text).collect(),
            };
            if let (Some(tracer), Some(trace)) = (tracer.as_deref_mut(), &article_trace) {
                tracer.write(&article.title, trace, &article.documents)?;
            }
            if let Some(released) = sampler.offer(article) {
                for document in released.documents {
                    sharder.push(document)?;
                }
            }
        }
        Ok(())
    }
}

/// Cancel the other stages before handing a fatal error back.
fn fail(cancel: &CancellationToken, e: Error) -> Error {
    error!("{}", e);
    cancel.cancel();
    e
}

fn join(name: &str, handle: JoinHandle<Result<RunStats, Error>>) -> Result<RunStats, Error> {
    handle
        .join()
        .map_err(|_| Error::Custom(format!("{name} thread panicked")))?
}

impl Pipeline<RunReport> for CorpusPipeline {
    fn run(&self) -> Result<RunReport, Error> {
        let config = &self.config;
        let document_type = config.document_type;

        Directories::from_config(config).prepare()?;
        let dump = self.dump_path()?;
        info!("[{}] building corpus from {:?}", document_type, dump);

        let first_sequence = self.first_sequence()?;
        let mut rng = self.rng();
        let mut sampler = ReservoirSampler::new(
            config.num_test_articles,
            config.excludes_test_articles(),
            StdRng::seed_from_u64(rng.gen()),
        );
        let writer = ShardWriter::new(
            document_type,
            config.intermediate_data_dir.clone(),
            config.corpus_dir.clone(),
            config.compression_level,
        );
        let pool = WriterPool::new(
            writer,
            config.writer_workers,
            config.queue_depth,
            first_sequence,
            self.cancel.clone(),
        )?;
        let mut sharder = Sharder::new(
            config.documents_per_file(),
            config.shuffle_buckets,
            StdRng::seed_from_u64(rng.gen()),
            pool,
        );

        let mut tracer = if config.writes_test_artifacts() {
            Some(TraceWriter::create(
                &config.test_data_dir,
                document_type,
                config.num_test_articles,
            )?)
        } else {
            None
        };

        let (blocks, reader) = self.spawn_reader(dump)?;
        let (pages, extractor) = self.spawn_extractor(blocks)?;
        let (articles, cleaners) = self.spawn_cleaners(pages)?;

        let consumed = self.consume(&articles, &mut sampler, &mut sharder, tracer.as_mut());
        if let Err(e) = &consumed {
            error!("{}", e);
            self.cancel.cancel();
        }
        // unblocks the cleaners if we stopped early
        drop(articles);
        let shards = consumed
            .and_then(|()| sharder.finish())
            .and_then(|pool| pool.finish());

        let mut stats = RunStats::default();
        let mut stage_error = None;
        let stages = std::iter::once(("reader".to_string(), reader))
            .chain(std::iter::once(("extractor".to_string(), extractor)))
            .chain(
                cleaners
                    .into_iter()
                    .enumerate()
                    .map(|(i, h)| (format!("cleaner-{i}"), h)),
            );
        for (name, handle) in stages {
            match join(&name, handle) {
                Ok(s) => stats += &s,
                Err(e) => {
                    stage_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = stage_error {
            return Err(e);
        }
        let shards = shards?;
        if self.cancel.is_cancelled() {
            warn!(
                "[{}] cancelled, {} complete shards kept in {:?}",
                document_type,
                shards.len(),
                config.corpus_dir
            );
            return Err(Error::Cancelled);
        }

        stats.shards_written = shards.len() as u64;
        stats.documents_written = shards.iter().map(|s| s.documents as u64).sum();

        let sample = sampler.finish(&sample_path(&config.test_data_dir, document_type))?;
        let artifacts = match tracer {
            Some(tracer) => tracer.finish()?,
            None => Vec::new(),
        };

        let report = RunReport {
            document_type: document_type.to_string(),
            stats,
            shards,
            sample: Some(sample),
            artifacts,
        };
        let checksums =
            package::gen_checksum_file(&config.corpus_dir, document_type, &report.shards)?;
        debug!("checksums written to {:?}", checksums);
        let report_path = package::write_report(&config.corpus_dir, &report)?;
        info!("[{}] report written to {:?}", document_type, report_path);

        Ok(report)
    }
}
