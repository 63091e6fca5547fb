//! Paragraph and document filters.
use super::Filter;
use crate::config::Config;
use crate::processing::Document;

/// Simple length filter.
/// Returns `false` if the paragraph is less than [Length::min_size] unicode codepoints long.
///
/// A minimum of 0 keeps everything, and is the default.
#[derive(Debug, Clone, Default)]
pub struct Length {
    min_size: usize,
}

impl Length {
    pub fn with_min_size(min_size: usize) -> Self {
        Self { min_size }
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }
}

impl Filter<&str> for Length {
    fn detect(&self, paragraph: &str) -> bool {
        self.min_size == 0 || paragraph.chars().count() >= self.min_size
    }
}

/// Short documents are mostly list debris (`"1. 2 3"`, `"See: below"`).
///
/// A document of at most [ShortNoise::MAX_TOKENS] whitespace separated tokens is dropped when
/// any token but the last one is not purely alphabetic. Short phrases such as `"Yes I do."`
/// pass.
#[derive(Debug, Clone, Default)]
pub struct ShortNoise;

impl ShortNoise {
    pub const MAX_TOKENS: usize = 4;
}

impl Filter<&str> for ShortNoise {
    fn detect(&self, document: &str) -> bool {
        let tokens: Vec<&str> = document.split_whitespace().collect();
        if tokens.len() > Self::MAX_TOKENS {
            return true;
        }
        let leading = &tokens[..tokens.len().saturating_sub(1)];
        leading
            .iter()
            .all(|token| token.chars().all(char::is_alphabetic))
    }
}

/// Filters configured for a run.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    paragraphs: Length,
    documents: Option<ShortNoise>,
}

impl NoiseFilter {
    pub fn new(paragraphs: Length, documents: Option<ShortNoise>) -> Self {
        Self {
            paragraphs,
            documents,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Length::with_min_size(config.min_paragraph_chars),
            config.drop_short_noisy_documents.then_some(ShortNoise),
        )
    }

    /// Drop paragraphs that are too short, returns how many were dropped.
    pub fn paragraphs(&self, paragraphs: &mut Vec<String>) -> usize {
        let before = paragraphs.len();
        paragraphs.retain(|p| self.paragraphs.detect(p.as_str()));
        before - paragraphs.len()
    }

    /// Drop noisy documents, returns how many were dropped. Garbage documents are kept.
    pub fn documents(&self, documents: &mut Vec<Document>) -> usize {
        let filter = match &self.documents {
            Some(filter) => filter,
            None => return 0,
        };
        let before = documents.len();
        documents.retain(|d| d.is_garbage() || filter.detect(d.text.as_str()));
        before - documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length() {
        let f = Length::with_min_size(10);
        assert!(f.detect("exactly 10"));
        assert!(!f.detect("too short"));
        assert!(f.detect("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}"));
        assert!(Length::default().detect(""));
    }

    #[test]
    fn short_noise() {
        let f = ShortNoise;
        assert!(f.detect("Yes I do."));
        assert!(f.detect("That way."));
        assert!(!f.detect("1. 2 3"));
        assert!(!f.detect("See: below."));
        assert!(f.detect("In 1999 the band released an album."));
    }

    #[test]
    fn noise_filter_keeps_garbage() {
        let filter = NoiseFilter::new(Length::with_min_size(12), Some(ShortNoise));

        let mut paragraphs = vec!["Short one.".to_string(), "A longer paragraph.".to_string()];
        assert_eq!(filter.paragraphs(&mut paragraphs), 1);
        assert_eq!(paragraphs, ["A longer paragraph."]);

        let mut documents = vec![
            Document::clean("p. 12".to_string()),
            Document::clean("It works.".to_string()),
            Document::garbage("G {{x}} G".to_string()),
        ];
        assert_eq!(filter.documents(&mut documents), 1);
        assert_eq!(documents.len(), 2);
        assert!(documents[1].is_garbage());
    }

    #[test]
    fn disabled_by_default() {
        let filter = NoiseFilter::from_config(&Config::default());
        let mut paragraphs = vec!["x".to_string()];
        let mut documents = vec![Document::clean("1 2".to_string())];
        assert_eq!(filter.paragraphs(&mut paragraphs), 0);
        assert_eq!(filter.documents(&mut documents), 0);
    }
}
