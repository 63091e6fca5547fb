//! Reserved marker literals.
//!
//! The garbage marker brackets spans excised during cleaning, the paragraph-break marker
//! separates paragraphs inside an article document. Both are written verbatim in the corpus,
//! so source text that already contains one of them is escaped first.
//!
//! Escaping inserts a word joiner (U+2060) after the first character of every occurrence.
//! Pre-existing word joiners are doubled beforehand, which keeps the substitution reversible
//! (see [Markers::unescape]).

pub(crate) const ESCAPE: char = '\u{2060}';

/// Private use characters the cleaner reserves for its own bookkeeping.
pub(crate) const SENTINEL_OPEN: char = '\u{E000}';
pub(crate) const SENTINEL_CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    garbage: String,
    paragraph_break: String,
}

impl Markers {
    /// Build markers. They are expected to have gone through [Markers::validate].
    pub fn new(garbage: String, paragraph_break: String) -> Self {
        Self {
            garbage,
            paragraph_break,
        }
    }

    pub fn garbage(&self) -> &str {
        &self.garbage
    }

    pub fn paragraph_break(&self) -> &str {
        &self.paragraph_break
    }

    /// Check that a marker pair can be embedded in documents and escaped unambiguously.
    pub fn validate(garbage: &str, paragraph_break: &str) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for (key, marker) in [
            ("marker_garbage_processing", garbage),
            ("marker_paragraph_break", paragraph_break),
        ] {
            if marker.chars().count() < 2 {
                errors.push(format!("{key} must be at least two characters long"));
            }
            if marker.chars().any(char::is_whitespace) {
                errors.push(format!("{key} must not contain whitespace"));
            }
            if marker
                .chars()
                .any(|c| c == ESCAPE || c == SENTINEL_OPEN || c == SENTINEL_CLOSE)
            {
                errors.push(format!("{key} contains a reserved character"));
            }
        }

        if garbage == paragraph_break {
            errors.push("marker_garbage_processing and marker_paragraph_break must differ".into());
        } else if !garbage.is_empty()
            && !paragraph_break.is_empty()
            && (garbage.contains(paragraph_break) || paragraph_break.contains(garbage))
        {
            errors.push("one marker must not contain the other".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Escape every marker occurrence in `text`.
    /// Returns the escaped text and the number of collisions that were escaped.
    pub fn escape(&self, text: &str) -> (String, usize) {
        if !text.contains(self.garbage.as_str())
            && !text.contains(self.paragraph_break.as_str())
            && !text.contains(ESCAPE)
        {
            return (text.to_string(), 0);
        }
        self.break_markers(&text.replace(ESCAPE, "\u{2060}\u{2060}"))
    }

    /// Second half of [Markers::escape], for text whose own escape characters are already doubled.
    ///
    /// Used on text that was rebuilt after escaping, e.g. by decoding character references.
    pub fn break_markers(&self, text: &str) -> (String, usize) {
        let mut out = text.to_string();
        let mut collisions = 0;
        for marker in [&self.garbage, &self.paragraph_break] {
            let mut chars = marker.chars();
            let first = match chars.next() {
                Some(c) => c,
                None => continue,
            };
            let broken = format!("{first}{ESCAPE}{}", chars.as_str());

            // overlapping occurrences (e.g. "aa" in "aaa") need more than one pass.
            // Each pass strictly reduces the number of occurrences.
            loop {
                let found = out.matches(marker.as_str()).count();
                if found == 0 {
                    break;
                }
                collisions += found;
                out = out.replace(marker.as_str(), &broken);
            }
        }
        (out, collisions)
    }

    /// Inverse of [Markers::escape].
    pub fn unescape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == ESCAPE {
                if chars.peek() == Some(&ESCAPE) {
                    chars.next();
                    out.push(ESCAPE);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Count garbage marker occurrences and check that they pair up.
    pub fn garbage_is_paired(&self, text: &str) -> bool {
        text.matches(self.garbage.as_str()).count() % 2 == 0
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::new(
            "evmprocessgarbagemarker".to_string(),
            "evmparagraphbreakmarker".to_string(),
        )
    }
}
