//! Text processing: cleaning, segmentation, shuffling, sampling, test artifacts and packaging.
pub mod clean;
pub mod package;
pub mod sample;
pub mod segment;
pub mod shuffle;
pub mod trace;

pub use clean::{CleanedText, Cleaner};
pub use sample::{ReservoirSampler, SampledArticle};
pub use segment::{Document, DocumentKind, Segmenter};
pub use shuffle::{ShardSink, Sharder};
pub use trace::{ArticleTrace, TraceWriter};
