//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

use crate::config::{Config, DocumentType, Mode};
use crate::error::Error;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "wikicorpus",
    about = "Builds training corpora from Wikipedia dumps."
)]
/// Holds every command that is callable by the `wikicorpus` command.
pub enum Wikicorpus {
    #[structopt(about = "Download the configured dump")]
    Download(Download),
    #[structopt(about = "Run pipeline")]
    Pipeline(Pipeline),
}

#[derive(Debug, StructOpt)]
/// Download command and parameters.
/// ```sh
/// wikicorpus download [OPTIONS]
///
/// OPTIONS:
///     -c, --config <config>    configuration file (TOML or JSON)
/// ```
pub struct Download {
    #[structopt(
        short = "c",
        long = "config",
        parse(from_os_str),
        help = "configuration file (TOML or JSON)"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
/// Pipeline command and parameters.
///
/// Every option overrides the matching key of the configuration file.
///
/// ```sh
/// wikicorpus pipeline [OPTIONS]
///
/// OPTIONS:
///     -c, --config <config>                  configuration file (TOML or JSON)
///     -t, --document-type <document-type>    sentence, paragraph or article
///     -d, --dump <dump>                      local dump, skips the download
/// ```
pub struct Pipeline {
    #[structopt(
        short = "c",
        long = "config",
        parse(from_os_str),
        help = "configuration file (TOML or JSON)"
    )]
    pub config: Option<PathBuf>,
    #[structopt(
        short = "t",
        long = "document-type",
        help = "sentence, paragraph or article (alias page)"
    )]
    pub document_type: Option<DocumentType>,
    #[structopt(short = "m", long = "mode", help = "test or production")]
    pub mode: Option<Mode>,
    #[structopt(
        short = "d",
        long = "dump",
        parse(from_os_str),
        help = "local dump (multistream .xml.bz2 or plain .xml), skips the download"
    )]
    pub dump: Option<PathBuf>,
    #[structopt(long = "num-test-articles", help = "size of the held-out test sample")]
    pub num_test_articles: Option<usize>,
    #[structopt(
        long = "exclude-test-articles",
        help = "withhold test articles from the corpus (true/false)"
    )]
    pub exclude_test_articles: Option<bool>,
    #[structopt(
        long = "documents-per-file",
        help = "shard capacity for the selected document type"
    )]
    pub documents_per_file: Option<usize>,
    #[structopt(long = "corpus-dir", parse(from_os_str))]
    pub corpus_dir: Option<PathBuf>,
    #[structopt(long = "seed", help = "seed for shuffling and sampling")]
    pub seed: Option<u64>,
    #[structopt(long = "cleaning-workers")]
    pub cleaning_workers: Option<usize>,
    #[structopt(long = "drop-garbage", help = "do not write garbage documents")]
    pub drop_garbage: bool,
}

impl Pipeline {
    /// Apply command line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(document_type) = self.document_type {
            config.document_type = document_type;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(n) = self.num_test_articles {
            config.num_test_articles = n;
        }
        if self.exclude_test_articles.is_some() {
            config.exclude_test_articles = self.exclude_test_articles;
        }
        if let Some(capacity) = self.documents_per_file {
            let capacity = Some(capacity);
            match config.document_type {
                DocumentType::Sentence => config.documents_per_corpus_file_sentence = capacity,
                DocumentType::Paragraph => config.documents_per_corpus_file_paragraph = capacity,
                DocumentType::Article => config.documents_per_corpus_file_article = capacity,
            }
        }
        if let Some(dir) = &self.corpus_dir {
            config.corpus_dir = dir.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(workers) = self.cleaning_workers {
            config.cleaning_workers = workers;
        }
        if self.drop_garbage {
            config.emit_garbage_documents = false;
        }
    }
}

/// Load the configuration file if any, or the defaults.
///
/// Not validated: overrides are applied by the caller first.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config, Error> {
    match path {
        Some(path) => Config::from_path_unchecked(path),
        None => {
            log::info!("no configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}
