//! Cleaned text to corpus documents.
//!
//! Garbage spans never end up inside a clean document: each one becomes its own
//! [DocumentKind::Garbage] document, whatever the granularity.
use std::collections::HashSet;

use lazy_static::lazy_static;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::DocumentType;
use crate::markers::Markers;
use crate::processing::clean::CleanedText;

lazy_static! {
    /// Tokens that end with a period without ending a sentence (lowercased, final period removed).
    static ref ABBREVIATIONS: HashSet<&'static str> = [
        "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "ft", "vs", "inc", "ltd", "co",
        "corp", "gen", "col", "lt", "sgt", "capt", "cmdr", "adm", "gov", "sen", "rep", "rev",
        "hon", "no", "vol", "pp", "p", "fig", "ca", "approx", "est", "e.g", "i.e", "cf", "al",
        "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
        "u.s", "u.k",
    ]
    .into_iter()
    .collect();
}

const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{bb}', '\u{2019}', '\u{201d}'];
const OPENERS: &[char] = &['"', '\'', '(', '[', '\u{ab}', '\u{2018}', '\u{201c}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Clean,
    Garbage,
}

/// One line of a corpus shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Document {
    pub text: String,
    pub kind: DocumentKind,
}

impl Document {
    pub fn clean(text: String) -> Self {
        Self {
            text,
            kind: DocumentKind::Clean,
        }
    }

    pub fn garbage(text: String) -> Self {
        Self {
            text,
            kind: DocumentKind::Garbage,
        }
    }

    pub fn is_garbage(&self) -> bool {
        self.kind == DocumentKind::Garbage
    }
}

/// A piece of a paragraph, either clean text or an excised span.
enum Run<'a> {
    Clean(&'a str),
    Garbage(&'a str),
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    document_type: DocumentType,
    markers: Markers,
    emit_garbage: bool,
}

impl Segmenter {
    pub fn new(document_type: DocumentType, markers: Markers) -> Self {
        Self {
            document_type,
            markers,
            emit_garbage: true,
        }
    }

    /// Whether garbage documents are produced at all.
    pub fn with_garbage(mut self, emit_garbage: bool) -> Self {
        self.emit_garbage = emit_garbage;
        self
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Split a paragraph on garbage markers.
    fn runs<'a>(&self, paragraph: &'a str) -> Vec<Run<'a>> {
        paragraph
            .split(self.markers.garbage())
            .enumerate()
            .map(|(i, part)| {
                if i % 2 == 0 {
                    Run::Clean(part.trim())
                } else {
                    Run::Garbage(part.trim())
                }
            })
            .filter(|run| match run {
                Run::Clean(t) => !t.is_empty(),
                Run::Garbage(_) => true,
            })
            .collect()
    }

    fn garbage_document(&self, raw: &str) -> Document {
        let marker = self.markers.garbage();
        if raw.is_empty() {
            Document::garbage(format!("{marker} {marker}"))
        } else {
            Document::garbage(format!("{marker} {raw} {marker}"))
        }
    }

    pub fn segment(&self, cleaned: &CleanedText) -> Vec<Document> {
        let mut documents = Vec::new();
        let mut garbage = Vec::new();

        match self.document_type {
            DocumentType::Article => {
                let mut paragraphs = Vec::new();
                for paragraph in &cleaned.paragraphs {
                    let mut clean = Vec::new();
                    for run in self.runs(paragraph) {
                        match run {
                            Run::Clean(text) => clean.push(text),
                            Run::Garbage(raw) => garbage.push(self.garbage_document(raw)),
                        }
                    }
                    if !clean.is_empty() {
                        paragraphs.push(clean.join(" "));
                    }
                }
                if !paragraphs.is_empty() {
                    let separator = format!(" {} ", self.markers.paragraph_break());
                    documents.push(Document::clean(paragraphs.join(&separator)));
                }
            }
            DocumentType::Paragraph => {
                for paragraph in &cleaned.paragraphs {
                    let mut clean = Vec::new();
                    for run in self.runs(paragraph) {
                        match run {
                            Run::Clean(text) => clean.push(text),
                            Run::Garbage(raw) => garbage.push(self.garbage_document(raw)),
                        }
                    }
                    if !clean.is_empty() {
                        documents.push(Document::clean(clean.join(" ")));
                    }
                    documents.append(&mut garbage);
                }
            }
            DocumentType::Sentence => {
                for paragraph in &cleaned.paragraphs {
                    for run in self.runs(paragraph) {
                        match run {
                            Run::Clean(text) => documents
                                .extend(split_sentences(text).into_iter().map(Document::clean)),
                            Run::Garbage(raw) => documents.push(self.garbage_document(raw)),
                        }
                    }
                }
            }
        }
        documents.append(&mut garbage);

        if !self.emit_garbage {
            documents.retain(|d| !d.is_garbage());
        }
        documents
    }
}

/// Terminal punctuation of `prev` once closing quotes and brackets are skipped.
fn terminal(prev: &str) -> Option<char> {
    prev.trim_end().trim_end_matches(CLOSERS).chars().last()
}

fn is_abbreviation(prev: &str) -> bool {
    let token = prev
        .trim_end()
        .trim_end_matches(CLOSERS)
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("");
    let token = token.strip_suffix('.').unwrap_or(token);
    let token = token.trim_start_matches(OPENERS);

    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        // single initial, as in "J. R. R. Tolkien"
        (Some(c), None) if c.is_uppercase() => true,
        (Some(_), _) => ABBREVIATIONS.contains(token.to_lowercase().as_str()),
        (None, _) => false,
    }
}

/// Whether a sentence really ends between `prev` and `next`.
fn is_boundary(prev: &str, next: &str) -> bool {
    if !prev.ends_with(char::is_whitespace) {
        return false;
    }
    let starts_sentence = next
        .trim_start()
        .chars()
        .next()
        .map_or(false, |c| c.is_uppercase() || c.is_numeric() || OPENERS.contains(&c));
    if !starts_sentence {
        return false;
    }
    match terminal(prev) {
        Some('!') | Some('?') => true,
        Some('.') => !is_abbreviation(prev),
        _ => false,
    }
}

/// Split clean text into sentences.
///
/// Unicode sentence boundaries are only candidates: they are kept where terminal punctuation
/// is followed by whitespace and something that can start a sentence, and the word before
/// the period is not a known abbreviation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let candidates: Vec<&str> = text.split_sentence_bounds().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();

    for (i, candidate) in candidates.iter().enumerate() {
        current.push_str(candidate);
        let flush = match candidates.get(i + 1) {
            Some(next) => is_boundary(&current, next),
            None => true,
        };
        if flush {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    sentences
}
