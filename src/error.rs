//! Error enum
//!
//! Per-record failures ([CorruptArchive], [MalformedRecord], [Error::MarkerCollision]) are
//! recovered where they happen, logged and counted in [crate::stats::RunStats]. Everything else propagates up to `main`.
use std::fmt;
use std::path::PathBuf;

/// One multistream block could not be decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptArchive {
    pub index: usize,
    pub offset: u64,
    pub reason: String,
}

/// One `<page>` could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub page_index: u64,
    pub title: Option<String>,
    pub reason: String,
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Xml(quick_xml::Error),
    Serde(serde_json::Error),
    Glob(glob::PatternError),
    Download(reqwest::Error),
    CorruptArchive(CorruptArchive),
    MalformedRecord(MalformedRecord),
    /// Reserved markers found in the text of one article. They are escaped, never fatal.
    MarkerCollision { title: String, occurrences: usize },
    ShardWrite { path: PathBuf, source: std::io::Error },
    Configuration(Vec<String>),
    EmptyTestSample,
    Cancelled,
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Xml(e) => write!(f, "xml error: {e}"),
            Error::Serde(e) => write!(f, "json error: {e}"),
            Error::Glob(e) => write!(f, "glob error: {e}"),
            Error::Download(e) => write!(f, "download error: {e}"),
            Error::CorruptArchive(c) => write!(
                f,
                "corrupt archive block {} at byte {}: {}",
                c.index, c.offset, c.reason
            ),
            Error::MalformedRecord(m) => write!(
                f,
                "malformed page #{} ({:?}): {}",
                m.page_index, m.title, m.reason
            ),
            Error::MarkerCollision { title, occurrences } => write!(
                f,
                "{occurrences} reserved marker occurrence(s) escaped in {title:?}"
            ),
            Error::ShardWrite { path, source } => {
                write!(f, "could not write shard {path:?}: {source}")
            }
            Error::Configuration(errors) => {
                write!(f, "invalid configuration: {}", errors.join("; "))
            }
            Error::EmptyTestSample => {
                write!(f, "no article was available for the test sample")
            }
            Error::Cancelled => write!(f, "run cancelled"),
            Error::Custom(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Error {
        Error::Xml(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Error {
        Error::Glob(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Download(e)
    }
}

impl From<CorruptArchive> for Error {
    fn from(e: CorruptArchive) -> Error {
        Error::CorruptArchive(e)
    }
}

impl From<MalformedRecord> for Error {
    fn from(e: MalformedRecord) -> Error {
        Error::MalformedRecord(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
