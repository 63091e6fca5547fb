//! Run configuration.
//!
//! Loaded from a TOML (or JSON, by extension) file, every missing key taking its default.
//! [Config::validate] collects every problem before failing so that a broken file
//! can be fixed in one go.
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::markers::Markers;

/// Granularity of the documents written to the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Sentence,
    Paragraph,
    #[serde(alias = "page")]
    Article,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Sentence => "sentence",
            DocumentType::Paragraph => "paragraph",
            DocumentType::Article => "article",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence" => Ok(DocumentType::Sentence),
            "paragraph" => Ok(DocumentType::Paragraph),
            "article" | "page" => Ok(DocumentType::Article),
            other => Err(format!(
                "unknown document_type {other:?} (expected sentence, paragraph, article or page)"
            )),
        }
    }
}

/// `test` holds the sampled articles out of the corpus, `production` only exports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Test,
    Production,
}

impl FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Mode::Test),
            "production" => Ok(Mode::Production),
            other => Err(format!(
                "unknown mode {other:?} (expected test or production)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub document_type: DocumentType,
    pub mode: Mode,
    pub num_test_articles: usize,
    /// Overrides the exclusion policy implied by [Config::mode].
    pub exclude_test_articles: Option<bool>,

    pub xml_file_url: Option<String>,
    pub check_url: bool,
    /// Wiki database name used to resolve the latest dump when no url is given.
    pub wiki: String,

    pub raw_data_dir: PathBuf,
    pub intermediate_data_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub test_data_dir: PathBuf,

    #[serde(deserialize_with = "capacity")]
    pub documents_per_corpus_file_sentence: Option<usize>,
    #[serde(deserialize_with = "capacity")]
    pub documents_per_corpus_file_paragraph: Option<usize>,
    #[serde(deserialize_with = "capacity", alias = "documents_per_corpus_file_page")]
    pub documents_per_corpus_file_article: Option<usize>,

    pub marker_garbage_processing: String,
    pub marker_paragraph_break: String,

    pub emit_garbage_documents: bool,
    pub skip_disambiguation: bool,
    pub namespaces: Vec<i32>,
    /// Cleaned paragraphs shorter than this many characters are dropped. 0 keeps them all.
    pub min_paragraph_chars: usize,
    /// Drop documents of four tokens or fewer that contain non-alphabetic tokens.
    pub drop_short_noisy_documents: bool,

    pub shuffle_buckets: usize,
    pub queue_depth: usize,
    pub decompression_workers: usize,
    pub cleaning_workers: usize,
    pub writer_workers: usize,
    pub compression_level: u32,
    pub seed: Option<u64>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

impl Default for Config {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            document_type: DocumentType::Paragraph,
            mode: Mode::Production,
            num_test_articles: 100,
            exclude_test_articles: None,
            xml_file_url: None,
            check_url: true,
            wiki: "enwiki".to_string(),
            raw_data_dir: PathBuf::from("data/raw"),
            intermediate_data_dir: PathBuf::from("data/intermediate"),
            corpus_dir: PathBuf::from("data/corpus"),
            test_data_dir: PathBuf::from("data/test"),
            documents_per_corpus_file_sentence: Some(1_000_000),
            documents_per_corpus_file_paragraph: Some(250_000),
            documents_per_corpus_file_article: Some(10_000),
            marker_garbage_processing: "evmprocessgarbagemarker".to_string(),
            marker_paragraph_break: "evmparagraphbreakmarker".to_string(),
            emit_garbage_documents: true,
            skip_disambiguation: false,
            namespaces: vec![0],
            min_paragraph_chars: 0,
            drop_short_noisy_documents: false,
            shuffle_buckets: 16,
            queue_depth: 64,
            decompression_workers: workers,
            cleaning_workers: workers,
            writer_workers: (workers / 2).max(1),
            compression_level: 6,
            seed: None,
        }
    }
}

/// Accepts a positive integer, or `"null"`/`"none"`/`"unbounded"` (TOML has no null).
fn capacity<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Count(usize),
        Word(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Count(n)) => Ok(Some(n)),
        Some(Repr::Word(w)) => match w.to_lowercase().as_str() {
            "null" | "none" | "unbounded" => Ok(None),
            other => Err(serde::de::Error::custom(format!(
                "invalid shard capacity {other:?}"
            ))),
        },
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = Self::from_path_unchecked(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validating, so that command line overrides can be applied first.
    pub fn from_path_unchecked(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("loading configuration from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|e| e.to_string()),
            Some("toml") | None => toml::from_str(&contents).map_err(|e| e.to_string()),
            Some(other) => Err(format!("unsupported configuration extension {other:?}")),
        };

        parsed.map_err(|e| Error::Configuration(vec![format!("{}: {e}", path.display())]))
    }

    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = Vec::new();

        if self.num_test_articles == 0 {
            errors.push("num_test_articles must be a positive integer".to_string());
        }

        for (key, value) in [
            (
                "documents_per_corpus_file_sentence",
                self.documents_per_corpus_file_sentence,
            ),
            (
                "documents_per_corpus_file_paragraph",
                self.documents_per_corpus_file_paragraph,
            ),
            (
                "documents_per_corpus_file_article",
                self.documents_per_corpus_file_article,
            ),
        ] {
            if value == Some(0) {
                errors.push(format!("{key} must be a positive integer or null"));
            }
        }

        if let Err(mut e) = Markers::validate(
            &self.marker_garbage_processing,
            &self.marker_paragraph_break,
        ) {
            errors.append(&mut e);
        }

        if let Some(url) = &self.xml_file_url {
            match url::Url::parse(url) {
                Ok(u) => {
                    let has_file_name = u
                        .path_segments()
                        .and_then(|mut s| s.next_back())
                        .map_or(false, |s| !s.is_empty());
                    if !has_file_name {
                        errors.push(format!("xml_file_url {url:?} does not name a file"));
                    }
                }
                Err(e) => errors.push(format!("xml_file_url {url:?} is not a valid url: {e}")),
            }
        }
        if self.wiki.trim().is_empty() {
            errors.push("wiki must not be empty".to_string());
        }

        if self.namespaces.is_empty() {
            errors.push("namespaces must list at least one namespace".to_string());
        }

        for (key, value) in [
            ("shuffle_buckets", self.shuffle_buckets),
            ("queue_depth", self.queue_depth),
            ("decompression_workers", self.decompression_workers),
            ("cleaning_workers", self.cleaning_workers),
            ("writer_workers", self.writer_workers),
        ] {
            if value == 0 {
                errors.push(format!("{key} must be a positive integer"));
            }
        }

        if self.compression_level > 9 {
            errors.push(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(errors))
        }
    }

    /// Shard capacity for the configured granularity. `None` means a single shard.
    pub fn documents_per_file(&self) -> Option<usize> {
        match self.document_type {
            DocumentType::Sentence => self.documents_per_corpus_file_sentence,
            DocumentType::Paragraph => self.documents_per_corpus_file_paragraph,
            DocumentType::Article => self.documents_per_corpus_file_article,
        }
    }

    /// Whether sampled test articles are withheld from the corpus.
    pub fn excludes_test_articles(&self) -> bool {
        self.exclude_test_articles
            .unwrap_or(self.mode == Mode::Test)
    }

    /// Whether the first test articles are also written out at each processing step.
    pub fn writes_test_artifacts(&self) -> bool {
        self.mode == Mode::Test
    }

    pub fn markers(&self) -> Markers {
        Markers::new(
            self.marker_garbage_processing.clone(),
            self.marker_paragraph_break.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(ext: &str, contents: &str) -> tempfile::TempPath {
        let mut f = tempfile::Builder::new()
            .suffix(ext)
            .tempfile()
            .unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.into_temp_path()
    }

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn toml_with_defaults() {
        let path = write_config(
            ".toml",
            r#"
document_type = "sentence"
mode = "test"
num_test_articles = 5
documents_per_corpus_file_sentence = 3
"#,
        );
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.document_type, DocumentType::Sentence);
        assert_eq!(config.documents_per_file(), Some(3));
        assert!(config.excludes_test_articles());
        assert!(config.writes_test_artifacts());
        assert_eq!(config.namespaces, vec![0]);
        assert_eq!(config.min_paragraph_chars, 0);
        assert!(!config.drop_short_noisy_documents);
    }

    #[test]
    fn page_alias_and_unbounded_capacity() {
        let path = write_config(
            ".toml",
            r#"
document_type = "page"
documents_per_corpus_file_article = "null"
"#,
        );
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.document_type, DocumentType::Article);
        assert_eq!(config.documents_per_file(), None);
    }

    #[test]
    fn json_null_capacity() {
        let path = write_config(
            ".json",
            r#"{"document_type": "paragraph", "documents_per_corpus_file_paragraph": null}"#,
        );
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.documents_per_file(), None);
    }

    #[test]
    fn unknown_document_type_is_configuration_error() {
        let path = write_config(".toml", r#"document_type = "chapter""#);
        match Config::from_path(&path) {
            Err(Error::Configuration(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn collects_every_error() {
        let config = Config {
            num_test_articles: 0,
            documents_per_corpus_file_sentence: Some(0),
            marker_paragraph_break: "evmprocessgarbagemarker".to_string(),
            writer_workers: 0,
            xml_file_url: Some("not a url".to_string()),
            ..Default::default()
        };
        match config.validate() {
            Err(Error::Configuration(errors)) => assert_eq!(errors.len(), 5, "{errors:#?}"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn mode_exclusion_policy() {
        let mut config = Config::default();
        assert!(!config.excludes_test_articles());
        config.mode = Mode::Test;
        assert!(config.excludes_test_articles());
        config.exclude_test_articles = Some(false);
        assert!(!config.excludes_test_articles());
    }
}
