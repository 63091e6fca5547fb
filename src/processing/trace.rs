//! Test mode artifacts.
//!
//! The first articles of a run are written out at each processing step, so that the cleaning
//! can be reviewed by hand:
//!
//! - `test_data_dir/{granularity}_raw.txt`: wikitext,
//! - `test_data_dir/{granularity}_filtered.txt`: cleaned paragraphs, one per line,
//! - `test_data_dir/{granularity}_processed.txt`: documents, one per line.
//!
//! Every article starts with a `# title` line and ends with a blank line.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::DocumentType;
use crate::error::Error;

/// An article as it was before and after cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleTrace {
    pub wikitext: String,
    pub paragraphs: Vec<String>,
}

pub fn trace_paths(test_data_dir: &Path, document_type: DocumentType) -> [PathBuf; 3] {
    ["raw", "filtered", "processed"]
        .map(|step| test_data_dir.join(format!("{document_type}_{step}.txt")))
}

struct Step {
    path: PathBuf,
    out: BufWriter<File>,
}

impl Step {
    fn create(path: PathBuf) -> Result<Self, Error> {
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self { path, out })
    }

    fn write<'a>(
        &mut self,
        title: &str,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), Error> {
        writeln!(self.out, "# {title}")?;
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}

/// Writes the first `articles` articles it is handed, ignores the others.
pub struct TraceWriter {
    raw: Step,
    filtered: Step,
    processed: Step,
    remaining: usize,
}

impl TraceWriter {
    /// Create (or truncate) the three artifact files.
    pub fn create(
        test_data_dir: &Path,
        document_type: DocumentType,
        articles: usize,
    ) -> Result<Self, Error> {
        let [raw, filtered, processed] = trace_paths(test_data_dir, document_type);
        Ok(Self {
            raw: Step::create(raw)?,
            filtered: Step::create(filtered)?,
            processed: Step::create(processed)?,
            remaining: articles,
        })
    }

    pub fn write(
        &mut self,
        title: &str,
        trace: &ArticleTrace,
        documents: &[String],
    ) -> Result<(), Error> {
        if self.remaining == 0 {
            return Ok(());
        }
        self.remaining -= 1;
        self.raw.write(title, trace.wikitext.lines())?;
        self.filtered
            .write(title, trace.paragraphs.iter().map(String::as_str))?;
        self.processed
            .write(title, documents.iter().map(String::as_str))?;
        Ok(())
    }

    /// Flush the files and return their paths.
    pub fn finish(self) -> Result<Vec<PathBuf>, Error> {
        let mut paths = Vec::with_capacity(3);
        for mut step in [self.raw, self.filtered, self.processed] {
            step.out.flush()?;
            debug!("test artifact written to {:?}", step.path);
            paths.push(step.path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_the_first_articles_only() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = TraceWriter::create(tmp.path(), DocumentType::Sentence, 1).unwrap();
        let trace = ArticleTrace {
            wikitext: "'''Paris''' is big.\n\nIt is old.".to_string(),
            paragraphs: vec!["Paris is big.".to_string(), "It is old.".to_string()],
        };
        let documents = vec!["Paris is big.".to_string(), "It is old.".to_string()];
        writer.write("Paris", &trace, &documents).unwrap();
        writer.write("Rome", &trace, &documents).unwrap();

        let paths = writer.finish().unwrap();
        assert_eq!(paths.to_vec(), trace_paths(tmp.path(), DocumentType::Sentence));
        assert_eq!(
            std::fs::read_to_string(&paths[0]).unwrap(),
            "# Paris\n'''Paris''' is big.\n\nIt is old.\n\n"
        );
        assert_eq!(
            std::fs::read_to_string(&paths[2]).unwrap(),
            "# Paris\nParis is big.\nIt is old.\n\n"
        );
        assert!(paths[1].ends_with("sentence_filtered.txt"));
    }
}
