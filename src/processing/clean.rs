//! Wikitext to plain text.
//!
//! Cleaning runs as a sequence of passes over the page, then over each paragraph:
//!
//! 1. reserved markers in the source are escaped, sentinel characters are removed,
//! 2. HTML comments,
//! 3. templates (`{{ }}`) and tables (`{| |}`), using an explicit stack. A few inline
//!    templates (`lang`, `transl`, `convert`) are rendered as the text they stand for,
//! 4. references and tags whose content is not prose (`<ref>`, `<math>`, …), other tags are unwrapped,
//! 5. split on blank lines, dropping headings, lists, indents, table rows and magic words,
//! 6. per paragraph: links, then quotes, entities, leftover markup and whitespace until the
//!    text no longer changes. Markers rebuilt by entity decoding are escaped again.
//!
//! Spans that cannot be parsed (an opener with no closer, a stray closer) are cut out of the
//! text up to the end of their paragraph. Until the very end they are represented by a
//! private-use sentinel so that later passes do not touch them, then they are written back
//! bracketed by the garbage marker.
use std::borrow::Cow;
use std::fmt::Write;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::error::Error;
use crate::markers::{Markers, ESCAPE, SENTINEL_CLOSE, SENTINEL_OPEN};

lazy_static! {
    /// `[url label]`, the label group is absent for a bare `[url]`.
    static ref EXTERNAL_LINK: Regex = Regex::new(
        r"(?i)\[(?:https?://|ftp://|//|mailto:|news:|irc://)[^\s\]]*(?:\s+([^\]]*))?\]"
    )
    .unwrap();
    static ref BOLD_ITALIC: Regex = Regex::new(r"'{2,}").unwrap();
    static ref MAGIC_WORD: Regex = Regex::new(r"__[A-Z]+__").unwrap();
    /// Headings, lists, indents, table rows, rules and lines made of magic words only.
    static ref STRUCTURAL_LINE: Regex =
        Regex::new(r"^(?:[=*#:;|!]|\{\||-{4}|(?:__[A-Z]+__\s*)+$)").unwrap();
    static ref ENTITY: Regex =
        Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").unwrap();
    static ref MARKUP: Regex = Regex::new(r"[\[\]{}|<>=]").unwrap();
    /// Parentheses left with nothing but separators inside, e.g. `( ; )`.
    static ref EMPTY_PARENS: Regex = Regex::new(r"\([\s,;:]*\)").unwrap();
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r" ([,.;:!?])").unwrap();
    /// What would make a cleaned paragraph read as a structural line.
    static ref LEADING_STRUCTURE: Regex = Regex::new(r"^(?:[*#:;!\s]|-{4,})+").unwrap();
}

/// Tags whose content is dropped along with the tag.
const DROPPED_TAGS: [&str; 14] = [
    "ref",
    "math",
    "gallery",
    "timeline",
    "score",
    "syntaxhighlight",
    "source",
    "pre",
    "chem",
    "ce",
    "imagemap",
    "graph",
    "mapframe",
    "hiero",
];

/// Link namespaces that do not render as text.
const DROPPED_NAMESPACES: [&str; 4] = ["file:", "image:", "category:", "media:"];

/// Second positional argument of `{{convert}}` when the conversion is a range.
const RANGE_WORDS: [&str; 19] = [
    "-", "\u{2013}", "and", "and(-)", "or", "to", "to(-)", "to about", "+/-", "\u{b1}", "+", ",",
    ", and", ", or", "by", "x", "\u{d7}", "xx", "*",
];

/// Article text once markup has been removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedText {
    pub title: String,
    /// Non-empty paragraphs, in source order.
    pub paragraphs: Vec<String>,
    pub garbage_spans: usize,
    pub marker_collisions: usize,
}

impl CleanedText {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Reserved markers that had to be escaped in this article, if any.
    pub fn collision(&self) -> Option<Error> {
        (self.marker_collisions > 0).then(|| Error::MarkerCollision {
            title: self.title.clone(),
            occurrences: self.marker_collisions,
        })
    }
}

/// Spans excised during cleaning, referenced from the text by index.
#[derive(Debug, Default)]
struct Spans(Vec<String>);

impl Spans {
    /// Replace `raw` by a sentinel in `out`.
    fn excise(&mut self, out: &mut String, raw: &str) {
        out.push(SENTINEL_OPEN);
        let _ = write!(out, "{}", self.0.len());
        out.push(SENTINEL_CLOSE);
        self.0.push(raw.to_string());
    }

    /// Split `text` into literal pieces and sentinel references.
    fn pieces(text: &str) -> Vec<Piece<'_>> {
        let mut pieces = Vec::new();
        let mut pos = 0;
        while let Some(rel) = text[pos..].find(SENTINEL_OPEN) {
            let start = pos + rel;
            let digits_start = start + SENTINEL_OPEN.len_utf8();
            let close = match text[digits_start..].find(SENTINEL_CLOSE) {
                Some(c) => digits_start + c,
                None => break,
            };
            pieces.push(Piece::Text(&text[pos..start]));
            if let Ok(idx) = text[digits_start..close].parse::<usize>() {
                pieces.push(Piece::Span(idx));
            }
            pos = close + SENTINEL_CLOSE.len_utf8();
        }
        pieces.push(Piece::Text(&text[pos..]));
        pieces
    }

    /// Raw text of a span, with the spans nested in it restored as well.
    fn restore(&self, idx: usize) -> String {
        let mut out = String::new();
        if let Some(raw) = self.0.get(idx) {
            for piece in Self::pieces(raw) {
                match piece {
                    Piece::Text(lit) => out.push_str(lit),
                    // a span only ever contains spans excised before it
                    Piece::Span(i) if i < idx => out.push_str(&self.restore(i)),
                    Piece::Span(_) => (),
                }
            }
        }
        out
    }

    /// Write the spans referenced by `text` back, bracketed by `marker`.
    fn materialize(&self, text: &str, marker: &str, count: &mut usize) -> String {
        let mut out = String::with_capacity(text.len());
        for piece in Self::pieces(text) {
            match piece {
                Piece::Text(lit) => out.push_str(lit),
                Piece::Span(i) => {
                    let raw = collapse_whitespace(&self.restore(i));
                    if !raw.is_empty() {
                        *count += 1;
                        let _ = write!(out, " {marker} {raw} {marker} ");
                    }
                }
            }
        }
        collapse_whitespace(&out)
    }
}

enum Piece<'t> {
    Text(&'t str),
    Span(usize),
}

/// Stateless wikitext cleaner.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    markers: Markers,
}

impl Cleaner {
    pub fn new(markers: Markers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn clean(&self, title: &str, wikitext: &str) -> CleanedText {
        let (escaped, mut marker_collisions) = self.markers.escape(wikitext);
        let text: String = escaped
            .chars()
            .filter(|&c| c != SENTINEL_OPEN && c != SENTINEL_CLOSE)
            .collect();

        let mut spans = Spans::default();
        let text = strip_comments(&text, &mut spans);
        let text = strip_blocks(&text, &mut spans);
        let text = strip_tags(&text, &mut spans);

        let mut garbage_spans = 0;
        let mut paragraphs = Vec::new();
        for paragraph in split_paragraphs(&text) {
            let (cleaned, rebuilt) = self.clean_paragraph(&paragraph, &mut spans);
            marker_collisions += rebuilt;
            let cleaned = spans.materialize(&cleaned, self.markers.garbage(), &mut garbage_spans);
            if !cleaned.is_empty() {
                paragraphs.push(cleaned);
            }
        }

        CleanedText {
            title: title.to_string(),
            paragraphs,
            garbage_spans,
            marker_collisions,
        }
    }

    /// Returns the paragraph and the number of markers that entity decoding put back together.
    fn clean_paragraph(&self, paragraph: &str, spans: &mut Spans) -> (String, usize) {
        let text = resolve_links(paragraph, spans);
        let text = resolve_external_links(&text);
        let text = flatten(&text);
        self.markers.break_markers(&text)
    }
}

/// Byte offset of the line break that ends the paragraph containing `from`.
fn paragraph_end(text: &str, from: usize) -> usize {
    let mut pos = from;
    while let Some(nl) = text[pos..].find('\n') {
        let line_start = pos + nl + 1;
        let line_end = text[line_start..]
            .find('\n')
            .map_or(text.len(), |p| line_start + p);
        if text[line_start..line_end].trim().is_empty() {
            return pos + nl;
        }
        pos = line_start;
    }
    text.len()
}

fn at_line_start(b: &[u8], i: usize) -> bool {
    let mut j = i;
    while j > 0 && (b[j - 1] == b' ' || b[j - 1] == b'\t') {
        j -= 1;
    }
    j == 0 || b[j - 1] == b'\n'
}

/// Case-insensitive search for an ASCII pattern.
fn find_ci(text: &str, from: usize, pat: &str) -> Option<usize> {
    let b = text.as_bytes();
    let pat = pat.as_bytes();
    if from >= b.len() || pat.len() > b.len() - from {
        return None;
    }
    b[from..]
        .windows(pat.len())
        .position(|w| w.eq_ignore_ascii_case(pat))
        .map(|p| from + p)
}

fn strip_comments(text: &str, spans: &mut Spans) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("<!--") {
        let start = pos + rel;
        out.push_str(&text[pos..start]);
        match text[start + 4..].find("-->") {
            Some(end) => pos = start + 4 + end + 3,
            None => {
                let end = paragraph_end(text, start);
                spans.excise(&mut out, &text[start..end]);
                pos = end;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Template,
    Table,
}

/// Remove templates and tables, nested to any depth.
fn strip_blocks(text: &str, spans: &mut Spans) -> String {
    let b = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<(BlockKind, usize)> = Vec::new();
    let mut copy_from = 0;
    let mut i = 0;

    loop {
        if i + 1 >= b.len() {
            match stack.first() {
                None => {
                    out.push_str(&text[copy_from..]);
                    break;
                }
                Some(&(_, start)) => {
                    // outermost opener never closed: cut its paragraph and rescan after it
                    let end = paragraph_end(text, start);
                    spans.excise(&mut out, &text[start..end]);
                    stack.clear();
                    copy_from = end;
                    i = end;
                    continue;
                }
            }
        }

        let opener = match (b[i], b[i + 1]) {
            (b'{', b'{') => Some(BlockKind::Template),
            (b'{', b'|') if at_line_start(b, i) => Some(BlockKind::Table),
            _ => None,
        };
        if let Some(kind) = opener {
            if stack.is_empty() {
                out.push_str(&text[copy_from..i]);
            }
            stack.push((kind, i));
            i += 2;
            continue;
        }

        let closer = match (b[i], b[i + 1]) {
            (b'}', b'}') => Some(BlockKind::Template),
            (b'|', b'}') if at_line_start(b, i) => Some(BlockKind::Table),
            _ => None,
        };
        match (closer, stack.last()) {
            (Some(kind), Some(&(open, start))) if kind == open => {
                stack.pop();
                i += 2;
                if stack.is_empty() {
                    if kind == BlockKind::Template {
                        match render_template(&text[start + 2..i - 2]) {
                            Rendered::Text(rendered) => out.push_str(&rendered),
                            Rendered::Dropped => (),
                            Rendered::Unparsable => spans.excise(&mut out, &text[start..i]),
                        }
                    }
                    copy_from = i;
                }
            }
            (Some(BlockKind::Template), None) => {
                out.push_str(&text[copy_from..i]);
                let end = paragraph_end(text, i);
                spans.excise(&mut out, &text[i..end]);
                copy_from = end;
                i = end;
            }
            // a closer of the wrong kind inside a block is part of that block
            (Some(_), Some(_)) => i += 2,
            _ => i += 1,
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Rendered {
    Text(String),
    Dropped,
    /// A template we render, with arguments we cannot make sense of.
    Unparsable,
}

/// Split template arguments on `|`, except inside links.
fn template_fields(inner: &str) -> Vec<&str> {
    let b = inner.as_bytes();
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < b.len() {
        if b[i..].starts_with(b"[[") {
            depth += 1;
            i += 2;
        } else if b[i..].starts_with(b"]]") {
            depth = depth.saturating_sub(1);
            i += 2;
        } else {
            if b[i] == b'|' && depth == 0 {
                fields.push(&inner[start..i]);
                start = i + 1;
            }
            i += 1;
        }
    }
    fields.push(&inner[start..]);
    fields
}

fn is_named_arg(field: &str) -> bool {
    field.split_once('=').map_or(false, |(key, _)| {
        let key = key.trim();
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
    })
}

/// Text of `{{inner}}` once rendered. Only templates carrying sentence content are kept.
fn render_template(inner: &str) -> Rendered {
    if inner.contains("{{") {
        return Rendered::Dropped;
    }
    let fields = template_fields(inner);
    let name = fields[0].trim().to_lowercase().replace('_', " ");
    let args: Vec<&str> = fields[1..]
        .iter()
        .map(|f| f.trim())
        .filter(|f| !is_named_arg(f))
        .collect();

    match name.as_str() {
        // {{lang|code|text}}
        "lang" => match args.get(1) {
            Some(text) if !text.is_empty() => Rendered::Text(text.to_string()),
            _ => Rendered::Unparsable,
        },
        // {{transl|code|[scheme|]text}}
        "transl" | "transliteration" => match args.last() {
            Some(text) if args.len() >= 2 && !text.is_empty() => Rendered::Text(text.to_string()),
            _ => Rendered::Unparsable,
        },
        "convert" | "cvt" => render_conversion(&args),
        _ => Rendered::Dropped,
    }
}

/// `{{convert|330|m|ft}}` reads `330 m`, `{{convert|2|to|5|km}}` reads `2 to 5 km`.
fn render_conversion(args: &[&str]) -> Rendered {
    match args {
        [value, word, high, unit, ..] if RANGE_WORDS.contains(word) && !value.is_empty() => {
            let range = if matches!(*word, "-" | "\u{2013}") {
                format!("{value}\u{2013}{high}")
            } else {
                format!("{value} {word} {high}")
            };
            Rendered::Text(format!("{range} {unit}"))
        }
        [value, unit, ..] if !RANGE_WORDS.contains(unit) && !value.is_empty() => {
            Rendered::Text(format!("{value} {unit}"))
        }
        _ => Rendered::Unparsable,
    }
}

/// `<name` or `</name` at `i`, with the lowercased name.
fn tag_name_at(b: &[u8], i: usize) -> Option<(String, bool)> {
    let mut j = i + 1;
    let closing = b.get(j) == Some(&b'/');
    if closing {
        j += 1;
    }
    let name_start = j;
    while j < b.len() && b[j].is_ascii_alphanumeric() {
        j += 1;
    }
    if j == name_start || !b[name_start].is_ascii_alphabetic() {
        return None;
    }
    match b.get(j) {
        Some(c) if c.is_ascii_whitespace() || *c == b'>' || *c == b'/' => Some((
            String::from_utf8_lossy(&b[name_start..j]).to_ascii_lowercase(),
            closing,
        )),
        _ => None,
    }
}

fn strip_tags(text: &str, spans: &mut Spans) -> String {
    let b = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find('<') {
        let start = pos + rel;
        out.push_str(&text[pos..start]);

        let para_end = paragraph_end(text, start);
        let tag = tag_name_at(b, start)
            .and_then(|(name, closing)| {
                text[start..para_end]
                    .find('>')
                    .map(|gt| (name, closing, start + gt + 1))
            });

        let (name, closing, tag_end) = match tag {
            Some(t) => t,
            None => {
                if let Some((name, false)) = tag_name_at(b, start) {
                    if DROPPED_TAGS.contains(&name.as_str()) {
                        spans.excise(&mut out, &text[start..para_end]);
                        pos = para_end;
                        continue;
                    }
                }
                out.push('<');
                pos = start + 1;
                continue;
            }
        };

        let self_closing = b[tag_end - 2] == b'/';
        if !closing && !self_closing && DROPPED_TAGS.contains(&name.as_str()) {
            let end = find_ci(text, tag_end, &format!("</{name}"))
                .and_then(|c| text[c..].find('>').map(|gt| c + gt + 1));
            match end {
                Some(end) => pos = end,
                None => {
                    spans.excise(&mut out, &text[start..para_end]);
                    pos = para_end;
                }
            }
            continue;
        }

        if name == "br" || name == "hr" {
            out.push(' ');
        }
        pos = tag_end;
    }
    out.push_str(&text[pos..]);
    out
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || STRUCTURAL_LINE.is_match(line) {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

/// Byte offset right after the `]]` matching the `[[` at `start`.
fn matching_link_end(text: &str, start: usize) -> Option<usize> {
    let b = text.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < b.len() {
        if b[i] == b'[' && b[i + 1] == b'[' {
            depth += 1;
            i += 2;
        } else if b[i] == b']' && b[i + 1] == b']' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

fn is_interlanguage(target: &str) -> bool {
    match target.split_once(':') {
        Some((prefix, rest)) => {
            (2..=12).contains(&prefix.len())
                && prefix.bytes().all(|c| c.is_ascii_lowercase() || c == b'-')
                && !rest.is_empty()
        }
        None => false,
    }
}

fn resolve_links(text: &str, spans: &mut Spans) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("[[") {
        let start = pos + rel;
        out.push_str(&text[pos..start]);
        match matching_link_end(text, start) {
            Some(end) => {
                let rendered = link_text(&text[start + 2..end - 2], spans);
                out.push_str(&rendered);
                pos = end;
            }
            None => {
                spans.excise(&mut out, &text[start..]);
                pos = text.len();
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

/// Text a link renders as.
fn link_text(inner: &str, spans: &mut Spans) -> String {
    let (target, display) = match inner.split_once('|') {
        Some((t, d)) => (t.trim(), Some(d)),
        None => (inner.trim(), None),
    };

    let visible = target.starts_with(':');
    let target = target.trim_start_matches(':');
    let lowered = target.to_lowercase();
    if !visible && DROPPED_NAMESPACES.iter().any(|ns| lowered.starts_with(ns)) {
        return String::new();
    }
    if !visible && display.is_none() && is_interlanguage(target) {
        return String::new();
    }

    match display {
        Some(d) if d.contains("[[") => resolve_links(d, spans),
        Some(d) => {
            let last = d.rsplit('|').next().unwrap_or(d).trim();
            if last.is_empty() {
                target.to_string()
            } else {
                last.to_string()
            }
        }
        None => target.to_string(),
    }
}

fn resolve_external_links(text: &str) -> String {
    EXTERNAL_LINK
        .replace_all(text, |caps: &Captures| {
            caps.get(1).map_or("", |label| label.as_str().trim()).to_string()
        })
        .into_owned()
}

/// Passes whose output can expose more work for the same passes (`&amp;lt;` decodes to
/// `&lt;`, `&#39;&#39;` to a quote run), repeated until the text no longer changes.
fn flatten(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = flatten_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn flatten_once(text: &str) -> String {
    let text = BOLD_ITALIC.replace_all(text, "");
    let text = MAGIC_WORD.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = MARKUP.replace_all(&text, " ");
    let text = collapse_whitespace(&text);
    let text = remove_empty_parens(&text);
    let text = collapse_whitespace(&text);
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    LEADING_STRUCTURE.replace(&text, "").into_owned()
}

fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" | "thinsp" | "ensp" | "emsp" => " ",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "minus" => "\u{2212}",
        "times" => "\u{d7}",
        "deg" => "\u{b0}",
        "shy" | "zwj" | "zwnj" => "",
        _ => return None,
    };
    Some(decoded)
}

/// Decoded value of the entity `&name;`.
///
/// Characters the cleaner reserves are never produced: sentinels decode to nothing and the
/// marker escape character comes out doubled, as [Markers::escape] would have left it.
fn decode_entity(name: &str) -> Option<String> {
    let code = match name.strip_prefix('#') {
        Some(num) => match num.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        },
        None => return named_entity(name).map(String::from),
    };
    let decoded = match char::from_u32(code)? {
        SENTINEL_OPEN | SENTINEL_CLOSE => String::new(),
        ESCAPE => format!("{ESCAPE}{ESCAPE}"),
        c if c.is_control() && !c.is_whitespace() => String::new(),
        c => c.to_string(),
    };
    Some(decoded)
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn remove_empty_parens(text: &str) -> String {
    let mut current = text.to_string();
    while EMPTY_PARENS.is_match(&current) {
        current = EMPTY_PARENS.replace_all(&current, "").into_owned();
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(wikitext: &str) -> Vec<String> {
        Cleaner::default().clean("Test", wikitext).paragraphs
    }

    #[test]
    fn heading_and_template() {
        let paragraphs = clean("== A ==\n{{cite|x}}Hello. World lives here.\n\n[[Paris]] is nice.");
        assert_eq!(paragraphs, ["Hello. World lives here.", "Paris is nice."]);
    }

    #[test]
    fn unterminated_template_is_garbage() {
        let cleaned = Cleaner::default().clean("Broken", "{{broken");
        assert_eq!(
            cleaned.paragraphs,
            ["evmprocessgarbagemarker {{broken evmprocessgarbagemarker"]
        );
        assert_eq!(cleaned.garbage_spans, 1);
    }

    #[test]
    fn garbage_stays_in_its_paragraph() {
        let paragraphs = clean("Before.\n\nText }} tail\nsame paragraph\n\nAfter {{ok}}.");
        assert_eq!(
            paragraphs,
            [
                "Before.",
                "Text evmprocessgarbagemarker }} tail same paragraph evmprocessgarbagemarker",
                "After."
            ]
        );
    }

    #[test]
    fn unclosed_template_does_not_swallow_the_article() {
        let paragraphs = clean("Lead {{Infobox\n| name = x\n\nBody {{a|{{b}}}} text.");
        assert_eq!(
            paragraphs,
            [
                "Lead evmprocessgarbagemarker {{Infobox | name = x evmprocessgarbagemarker",
                "Body text."
            ]
        );
    }

    #[test]
    fn nested_templates_and_tables() {
        let paragraphs = clean("A {{outer|{{inner}}}} B\n{|\n| cell {{x}}\n|-\n| other\n|}\nC");
        assert_eq!(paragraphs, ["A B", "C"]);
    }

    #[test]
    fn links() {
        let paragraphs = clean(
            "[[Paris|the capital]] of [[France]]. \
             [[File:x.jpg|thumb|A [[b]] c]] [[Category:Cities]] [[fr:Paris]] [[:Category:Lists|lists]]",
        );
        assert_eq!(paragraphs, ["the capital of France. lists"]);
    }

    #[test]
    fn unterminated_link_is_garbage() {
        let paragraphs = clean("See [[Paris for more");
        assert_eq!(
            paragraphs,
            ["See evmprocessgarbagemarker [[Paris for more evmprocessgarbagemarker"]
        );
    }

    #[test]
    fn external_links() {
        let paragraphs = clean("Visit [https://example.org the site] or [http://bare.example].");
        assert_eq!(paragraphs, ["Visit the site or."]);
    }

    #[test]
    fn refs_and_tags() {
        let paragraphs = clean(
            "Paris<ref name=\"a\">cite</ref> is big<ref name=\"b\"/>. \
             <math>x^2</math>Done <b>bold</b><br/>now <nowiki>[[kept]]</nowiki>.",
        );
        assert_eq!(paragraphs, ["Paris is big. Done bold now kept."]);
    }

    #[test]
    fn unterminated_ref_is_garbage() {
        let paragraphs = clean("Text<ref>never closed\n\nNext.");
        assert_eq!(
            paragraphs,
            [
                "Text evmprocessgarbagemarker <ref>never closed evmprocessgarbagemarker",
                "Next."
            ]
        );
    }

    #[test]
    fn formatting_entities_and_punctuation() {
        let paragraphs =
            clean("'''Bold''' &amp; ''it'' <!-- hidden -->x&nbsp;y (  ) end . It's &#65;&#x42;");
        assert_eq!(paragraphs, ["Bold & it x y end. It's AB"]);
    }

    #[test]
    fn structural_lines_are_dropped() {
        let paragraphs = clean(
            "Intro text.\n== History ==\nMore.\n* item\n# numbered\n: indent\n__TOC__\n----\nEnd.",
        );
        assert_eq!(paragraphs, ["Intro text.", "More.", "End."]);
    }

    #[test]
    fn marker_in_source_is_escaped() {
        let cleaned = Cleaner::default().clean("M", "The evmprocessgarbagemarker word.");
        assert_eq!(cleaned.marker_collisions, 1);
        assert_eq!(cleaned.paragraphs.len(), 1);
        assert!(!cleaned.paragraphs[0].contains("evmprocessgarbagemarker"));
        assert_eq!(
            Markers::unescape(&cleaned.paragraphs[0]),
            "The evmprocessgarbagemarker word."
        );
    }

    #[test]
    fn sentinels_in_source_are_removed() {
        let paragraphs = clean("a\u{E000}0\u{E001}b");
        assert_eq!(paragraphs, ["a0b"]);
    }

    #[test]
    fn idempotent_on_clean_output() {
        let source = "'''Lyon''' is a [[city]] in [[France]].{{citation needed}} \
                      It has 500,000 people (2020).\n\n== Name ==\n\
                      The name comes from [[Lugdunum|''Lugdunum'']]<ref>A.</ref>.\n\n\
                      {| class=\"wikitable\"\n| a || b\n|}\n[[Category:Cities]]";
        let cleaner = Cleaner::default();
        let first = cleaner.clean("Lyon", source);
        assert_eq!(first.garbage_spans, 0);
        assert_eq!(
            first.paragraphs,
            [
                "Lyon is a city in France. It has 500,000 people (2020).",
                "The name comes from Lugdunum."
            ]
        );
        let second = cleaner.clean("Lyon", &first.paragraphs.join("\n\n"));
        assert_eq!(second.paragraphs, first.paragraphs);
    }

    #[test]
    fn marker_rebuilt_from_entities_is_escaped() {
        let cleaned =
            Cleaner::default().clean("M", "Alpha evmprocess&#103;arbagemarker beta. Gamma delta.");
        assert_eq!(cleaned.marker_collisions, 1);
        assert_eq!(cleaned.garbage_spans, 0);
        assert_eq!(cleaned.paragraphs.len(), 1);
        assert!(!cleaned.paragraphs[0].contains("evmprocessgarbagemarker"));
        assert_eq!(
            Markers::unescape(&cleaned.paragraphs[0]),
            "Alpha evmprocessgarbagemarker beta. Gamma delta."
        );
        assert!(matches!(
            cleaned.collision(),
            Some(Error::MarkerCollision { occurrences: 1, .. })
        ));

        let cleaned = Cleaner::default().clean("P", "One evmparagraph&#98;reakmarker two. Three.");
        assert_eq!(cleaned.marker_collisions, 1);
        assert!(!cleaned.paragraphs[0].contains("evmparagraphbreakmarker"));
    }

    #[test]
    fn sentinels_from_entities_are_removed() {
        let cleaned = Cleaner::default().clean("S", "a&#xE000;0&#xE001;b and &#57344;c");
        assert_eq!(cleaned.paragraphs, ["a0b and c"]);
        assert_eq!(cleaned.garbage_spans, 0);
    }

    #[test]
    fn escape_character_from_entity_survives_unescape() {
        let m = Markers::default();
        let cleaned = Cleaner::default().clean("W", "word&#x2060;joiner");
        assert_eq!(Markers::unescape(&cleaned.paragraphs[0]), "word\u{2060}joiner");
        assert!(m.garbage_is_paired(&cleaned.paragraphs[0]));
        assert!(cleaned.collision().is_none());
    }

    #[test]
    fn inline_templates_are_rendered() {
        let paragraphs = clean(
            "The tower is {{convert|330|m|ft}} tall. It is in {{lang|fr|Paris}}.\n\n\
             Its name is {{Lang|ru|''Moskva''|italic=no}}, or {{transl|ru|ALA|Moskva}}. \
             It spans {{cvt|2|to|5|km|abbr=on}} and {{convert|10|-|12|ft}}. \
             See {{lang|fr|[[Paris|la ville]]}}{{cite web|title=x}}.",
        );
        assert_eq!(
            paragraphs,
            [
                "The tower is 330 m tall. It is in Paris.",
                "Its name is Moskva, or Moskva. It spans 2 to 5 km and 10\u{2013}12 ft. See la ville."
            ]
        );
    }

    #[test]
    fn unreadable_conversion_is_garbage() {
        let cleaned = Cleaner::default().clean("C", "It is {{convert|abc}} high.");
        assert_eq!(cleaned.garbage_spans, 1);
        assert_eq!(
            cleaned.paragraphs,
            ["It is evmprocessgarbagemarker {{convert|abc}} evmprocessgarbagemarker high."]
        );
    }

    #[test]
    fn nested_inline_template_is_dropped() {
        assert_eq!(clean("A {{lang|fr|{{small|b}}}} c."), ["A c."]);
    }

    #[test]
    fn external_links_with_other_schemes() {
        let paragraphs = clean("Write [mailto:a@b.org us] or [//example.org/x see] [not a link].");
        assert_eq!(paragraphs, ["Write us or see not a link."]);
    }

    #[test]
    fn nested_entities_are_decoded_completely() {
        assert_eq!(clean("AT&amp;amp;T wins."), ["AT&T wins."]);
        assert_eq!(clean("Use &amp;lt;b&amp;gt; tags."), ["Use b tags."]);
        assert_eq!(clean("&#39;&#39;Lugdunum&#39;&#39; was its name."), ["Lugdunum was its name."]);
        assert_eq!(clean("&#35;1 hit single."), ["1 hit single."]);
        assert_eq!(clean("Keep &unknown; and & alone."), ["Keep &unknown; and & alone."]);
    }

    #[test]
    fn idempotent_on_varied_inputs() {
        let sources = [
            "AT&amp;amp;T wins.",
            "Use &amp;lt;b&amp;gt; tags.",
            "&amp;#95;&amp;#95;NOTOC&amp;#95;&amp;#95; Text here.",
            "Price is 5&amp;nbsp;\u{20ac} (&#40;&#41;) total.",
            "&#35;1 hit single. &#42; starred.",
            "&#45;&#45;&#45;&#45;dashes then text.",
            "&#39;&#39;&#39;Bold&#39;&#39;&#39; and &amp;quot;quoted&amp;quot;.",
            "Tower of {{convert|330|m|ft}} in {{lang|fr|''Paris''}} ([[France]]).",
            "Links [[a|b]] and [https://x.org label] &#91;&#91;fake&#93;&#93; link.",
            "Mixed &#x26;amp; and &#38;#38; references.",
        ];
        let cleaner = Cleaner::default();
        for source in sources {
            let first = cleaner.clean("T", source);
            assert_eq!(first.garbage_spans, 0, "{source:?}");
            assert_eq!(first.marker_collisions, 0, "{source:?}");
            assert!(!first.is_empty(), "{source:?}");
            let second = cleaner.clean("T", &first.paragraphs.join("\n\n"));
            assert_eq!(second.paragraphs, first.paragraphs, "{source:?}");
        }
    }
}
