//! Held-out test sample of whole articles.
//!
//! A reservoir (algorithm R) keeps a uniform sample of `num_test_articles` articles from a
//! stream of unknown length. When test articles are excluded from the corpus, an article is
//! withheld as long as it sits in the reservoir and released to the corpus if it gets evicted,
//! so that at the end every article is in exactly one of the two.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::DocumentType;
use crate::error::Error;
use crate::stats::SampleReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledArticle {
    pub title: String,
    pub documents: Vec<String>,
}

pub fn sample_path(test_data_dir: &Path, document_type: DocumentType) -> PathBuf {
    test_data_dir.join(format!("test_{}.jsonl", document_type))
}

pub struct ReservoirSampler {
    target: usize,
    exclude: bool,
    reservoir: Vec<SampledArticle>,
    seen: u64,
    rng: StdRng,
}

impl ReservoirSampler {
    pub fn new(target: usize, exclude: bool, rng: StdRng) -> Self {
        Self {
            target,
            exclude,
            reservoir: Vec::with_capacity(target),
            seen: 0,
            rng,
        }
    }

    /// Offer an article to the sample.
    /// Returns the article that should go to the corpus now, if any.
    pub fn offer(&mut self, article: SampledArticle) -> Option<SampledArticle> {
        self.seen += 1;

        if self.reservoir.len() < self.target {
            if self.exclude {
                self.reservoir.push(article);
                return None;
            }
            self.reservoir.push(article.clone());
            return Some(article);
        }

        let j = self.rng.gen_range(0..self.seen);
        match self.reservoir.get_mut(j as usize) {
            Some(slot) if self.exclude => Some(std::mem::replace(slot, article)),
            Some(slot) => {
                *slot = article.clone();
                Some(article)
            }
            None => Some(article),
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn sample(&self) -> &[SampledArticle] {
        &self.reservoir
    }

    /// Write the sample as JSON lines.
    pub fn finish(self, path: &Path) -> Result<SampleReport, Error> {
        if self.target > 0 && self.seen == 0 {
            return Err(Error::EmptyTestSample);
        }

        let mut writer = BufWriter::new(File::create(path)?);
        for article in &self.reservoir {
            serde_json::to_writer(&mut writer, article)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let report = SampleReport {
            path: path.to_path_buf(),
            target: self.target,
            sampled: self.reservoir.len(),
            population: self.seen,
            excluded_from_corpus: self.exclude,
        };
        if report.is_short() {
            warn!(
                "only {} articles were available for a test sample of {}",
                report.sampled, report.target
            );
        } else {
            info!("wrote {} test articles to {:?}", report.sampled, path);
        }
        Ok(report)
    }
}
