//! MediaWiki XML export parsing.
//!
//! [Pages] pulls `quick_xml` events and yields one [RawPage] per completed `<page>`.
//! Pages that are filtered out (namespace, redirect, empty body, disambiguation) are counted
//! and never surface. A page that cannot be parsed surfaces as [Error::MalformedRecord]
//! and iteration continues with the next `<page>`.
use std::collections::HashSet;
use std::io::{BufRead, Read};

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::config::Config;
use crate::error::{Error, MalformedRecord};
use crate::stats::RunStats;

/// Giving up after this many XML errors in a row, without a single good event in between.
const MAX_CONSECUTIVE_ERRORS: usize = 64;

/// Templates marking a disambiguation page (lowercased, without the braces).
const DISAMBIGUATION_TEMPLATES: [&str; 6] = [
    "disambiguation",
    "disambig",
    "dab",
    "hndis",
    "geodis",
    "set index",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub title: String,
    pub namespace_id: i32,
    pub wikitext: String,
}

/// Which pages are worth cleaning.
#[derive(Debug, Clone)]
pub struct PageFilter {
    namespaces: HashSet<i32>,
    skip_disambiguation: bool,
}

impl PageFilter {
    pub fn new(namespaces: impl IntoIterator<Item = i32>, skip_disambiguation: bool) -> Self {
        Self {
            namespaces: namespaces.into_iter().collect(),
            skip_disambiguation,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.namespaces.iter().copied(), config.skip_disambiguation)
    }
}

impl Default for PageFilter {
    fn default() -> Self {
        Self::new([0], false)
    }
}

fn is_redirect_text(wikitext: &str) -> bool {
    wikitext
        .trim_start()
        .get(..9)
        .map_or(false, |head| head.eq_ignore_ascii_case("#redirect"))
}

fn is_disambiguation(wikitext: &str) -> bool {
    let lower = wikitext.to_lowercase();
    lower.match_indices("{{").any(|(pos, _)| {
        let name = lower[pos + 2..]
            .split(|c| c == '|' || c == '}')
            .next()
            .unwrap_or("")
            .trim();
        DISAMBIGUATION_TEMPLATES.contains(&name)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Page,
    Title,
    Ns,
    Text,
    Redirect,
    Other,
}

impl Tag {
    fn of(local_name: &[u8]) -> Tag {
        match local_name {
            b"page" => Tag::Page,
            b"title" => Tag::Title,
            b"ns" => Tag::Ns,
            b"text" => Tag::Text,
            b"redirect" => Tag::Redirect,
            _ => Tag::Other,
        }
    }
}

/// Owned view of an xml event, so that the read buffer can be released before handling it.
enum Item {
    Start(Tag),
    End(Tag),
    Empty(Tag),
    Text(Result<String, quick_xml::Error>),
    Eof,
    Other,
}

#[derive(Debug, Default)]
struct PartialPage {
    index: u64,
    title: Option<String>,
    ns: Option<String>,
    text: Option<String>,
    redirect: bool,
}

impl PartialPage {
    fn malformed(&self, reason: impl Into<String>) -> MalformedRecord {
        MalformedRecord {
            page_index: self.index,
            title: self.title.clone(),
            reason: reason.into(),
        }
    }
}

/// Pull iterator over the kept pages of a dump.
pub struct Pages<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    filter: PageFilter,
    stats: RunStats,

    current: Option<PartialPage>,
    field: Option<Tag>,
    field_text: String,
    /// set after an error inside a page, until the next `<page>`
    skipping: bool,
    pages_started: u64,
    consecutive_errors: usize,
    done: bool,
}

impl<R: BufRead> Pages<R> {
    pub fn new(reader: R, filter: PageFilter) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.trim_text(false).check_end_names(true);
        Self {
            reader,
            buf: Vec::with_capacity(8192),
            filter,
            stats: RunStats::default(),
            current: None,
            field: None,
            field_text: String::new(),
            skipping: false,
            pages_started: 0,
            consecutive_errors: 0,
            done: false,
        }
    }

    /// Counters for the pages seen so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn into_stats(self) -> RunStats {
        self.stats
    }

    fn read_item(&mut self) -> Result<Item, quick_xml::Error> {
        self.buf.clear();
        let capturing = self.field.is_some() && !self.skipping;
        let item = match self.reader.read_event_into(&mut self.buf)? {
            Event::Start(e) => Item::Start(Tag::of(e.local_name().as_ref())),
            Event::End(e) => Item::End(Tag::of(e.local_name().as_ref())),
            Event::Empty(e) => Item::Empty(Tag::of(e.local_name().as_ref())),
            Event::Text(e) if capturing => Item::Text(e.unescape().map(|s| s.into_owned())),
            Event::CData(e) if capturing => {
                Item::Text(Ok(String::from_utf8_lossy(&e.into_inner()).into_owned()))
            }
            Event::Eof => Item::Eof,
            _ => Item::Other,
        };
        Ok(item)
    }

    /// Abandon the current page, if any.
    fn abandon(&mut self, reason: String) -> Option<MalformedRecord> {
        self.field = None;
        self.skipping = true;
        self.current.take().map(|page| {
            self.stats.pages_malformed += 1;
            page.malformed(reason)
        })
    }

    /// Apply filters to a completed page.
    fn finish(&mut self, page: PartialPage) -> Result<Option<RawPage>, MalformedRecord> {
        let title = match &page.title {
            Some(t) if !t.trim().is_empty() => t.clone(),
            _ => {
                self.stats.pages_malformed += 1;
                return Err(page.malformed("missing title"));
            }
        };
        let namespace_id = match page.ns.as_deref().map(|ns| ns.trim().parse::<i32>()) {
            Some(Ok(ns)) => ns,
            Some(Err(_)) => {
                self.stats.pages_malformed += 1;
                let reason = format!(
                    "non-numeric namespace {:?}",
                    page.ns.as_deref().unwrap_or_default()
                );
                return Err(page.malformed(reason));
            }
            None => {
                self.stats.pages_malformed += 1;
                return Err(page.malformed("missing namespace"));
            }
        };

        if !self.filter.namespaces.contains(&namespace_id) {
            self.stats.pages_dropped_namespace += 1;
            return Ok(None);
        }

        let wikitext = page.text.unwrap_or_default();
        if page.redirect || is_redirect_text(&wikitext) {
            self.stats.pages_dropped_redirect += 1;
            return Ok(None);
        }
        if wikitext.trim().is_empty() {
            self.stats.pages_dropped_empty += 1;
            return Ok(None);
        }
        if self.filter.skip_disambiguation && is_disambiguation(&wikitext) {
            self.stats.pages_dropped_disambiguation += 1;
            return Ok(None);
        }

        self.stats.pages_kept += 1;
        Ok(Some(RawPage {
            title,
            namespace_id,
            wikitext,
        }))
    }
}

impl<R: BufRead> Iterator for Pages<R> {
    type Item = Result<RawPage, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let item = match self.read_item() {
                Ok(item) => {
                    self.consecutive_errors = 0;
                    item
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        self.done = true;
                        return Some(Err(Error::Xml(e)));
                    }
                    match self.abandon(e.to_string()) {
                        Some(m) => return Some(Err(Error::MalformedRecord(m))),
                        None => {
                            warn!(
                                "xml error outside of a page at byte {}: {}",
                                self.reader.buffer_position(),
                                e
                            );
                            continue;
                        }
                    }
                }
            };

            match item {
                Item::Start(Tag::Page) => {
                    let unterminated = self.abandon("page is not terminated".to_string());
                    self.skipping = false;
                    self.pages_started += 1;
                    self.stats.pages_seen += 1;
                    self.current = Some(PartialPage {
                        index: self.pages_started,
                        ..Default::default()
                    });
                    if let Some(m) = unterminated {
                        return Some(Err(Error::MalformedRecord(m)));
                    }
                }
                Item::Eof => {
                    self.done = true;
                    if let Some(m) = self.abandon("page is not terminated".to_string()) {
                        return Some(Err(Error::MalformedRecord(m)));
                    }
                    debug!("end of dump after {} pages", self.pages_started);
                }
                _ if self.skipping || self.current.is_none() => (),

                Item::Start(tag @ (Tag::Title | Tag::Ns | Tag::Text)) => {
                    self.field = Some(tag);
                    self.field_text.clear();
                }
                Item::Start(Tag::Redirect) | Item::Empty(Tag::Redirect) => {
                    if let Some(page) = self.current.as_mut() {
                        page.redirect = true;
                    }
                }
                Item::Empty(Tag::Text) => {
                    if let Some(page) = self.current.as_mut() {
                        page.text = Some(String::new());
                    }
                }
                Item::Text(Ok(text)) => self.field_text.push_str(&text),
                Item::Text(Err(e)) => {
                    if let Some(m) = self.abandon(format!("bad text content: {e}")) {
                        return Some(Err(Error::MalformedRecord(m)));
                    }
                }
                Item::End(Tag::Page) => {
                    self.field = None;
                    if let Some(page) = self.current.take() {
                        match self.finish(page) {
                            Ok(Some(raw)) => return Some(Ok(raw)),
                            Ok(None) => (),
                            Err(m) => return Some(Err(Error::MalformedRecord(m))),
                        }
                    }
                }
                Item::End(tag) if self.field == Some(tag) => {
                    self.field = None;
                    let value = std::mem::take(&mut self.field_text);
                    if let Some(page) = self.current.as_mut() {
                        match tag {
                            Tag::Title => page.title = Some(value),
                            Tag::Ns => page.ns = Some(value),
                            // only the first revision of a page is kept
                            Tag::Text if page.text.is_none() => page.text = Some(value),
                            _ => (),
                        }
                    }
                }
                _ => (),
            }
        }
        None
    }
}

/// Contiguous reader over a sequence of decompressed blocks.
///
/// Page boundaries do not line up with block boundaries, so the extractor reads the blocks
/// as one logical stream.
pub struct BlockStream<I> {
    blocks: I,
    current: Vec<u8>,
    pos: usize,
}

impl<I> BlockStream<I>
where
    I: Iterator<Item = Vec<u8>>,
{
    pub fn new(blocks: I) -> Self {
        Self {
            blocks,
            current: Vec::new(),
            pos: 0,
        }
    }
}

impl<I> BufRead for BlockStream<I>
where
    I: Iterator<Item = Vec<u8>>,
{
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        while self.pos >= self.current.len() {
            match self.blocks.next() {
                Some(block) => {
                    self.current = block;
                    self.pos = 0;
                }
                None => return Ok(&[]),
            }
        }
        Ok(&self.current[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.current.len());
    }
}

impl<I> Read for BlockStream<I>
where
    I: Iterator<Item = Vec<u8>>,
{
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, ns: &str, body: &str) -> String {
        format!(
            "<page><title>{title}</title><ns>{ns}</ns><id>1</id><revision><id>2</id>\
             <text bytes=\"{}\" xml:space=\"preserve\">{body}</text></revision></page>\n",
            body.len()
        )
    }

    fn dump(pages: &[String]) -> String {
        format!(
            "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\">\n\
             <siteinfo><sitename>Wikipedia</sitename></siteinfo>\n{}</mediawiki>\n",
            pages.concat()
        )
    }

    fn parse(xml: &str, filter: PageFilter) -> (Vec<Result<RawPage, Error>>, RunStats) {
        let mut pages = Pages::new(xml.as_bytes(), filter);
        let out: Vec<_> = pages.by_ref().collect();
        (out, pages.into_stats())
    }

    #[test]
    fn yields_article() {
        let xml = dump(&[page("Paris", "0", "'''Paris''' is the capital &amp; largest city.")]);
        let (out, stats) = parse(&xml, PageFilter::default());
        assert_eq!(out.len(), 1);
        let p = out[0].as_ref().unwrap();
        assert_eq!(p.title, "Paris");
        assert_eq!(p.namespace_id, 0);
        assert_eq!(p.wikitext, "'''Paris''' is the capital & largest city.");
        assert_eq!(stats.pages_seen, 1);
        assert_eq!(stats.pages_kept, 1);
    }

    #[test]
    fn filters_are_counted() {
        let redirect_elem = "<page><title>Old</title><ns>0</ns><redirect title=\"New\" />\
             <revision><text>whatever</text></revision></page>"
            .to_string();
        let xml = dump(&[
            page("Talk:Paris", "1", "chatter"),
            redirect_elem,
            page("Lyon", "0", "#REDIRECT [[Lyons]]"),
            page("Empty", "0", "   "),
            "<page><title>Blank</title><ns>0</ns><revision><text bytes=\"0\" /></revision></page>"
                .to_string(),
            page("Mercury", "0", "'''Mercury''' may refer to:\n{{Disambiguation}}"),
            page("Kept", "0", "Some text."),
        ]);

        let (out, stats) = parse(&xml, PageFilter::new([0], true));
        let titles: Vec<String> = out.into_iter().map(|p| p.unwrap().title).collect();
        assert_eq!(titles, ["Kept"]);
        assert_eq!(stats.pages_seen, 7);
        assert_eq!(stats.pages_dropped_namespace, 1);
        assert_eq!(stats.pages_dropped_redirect, 2);
        assert_eq!(stats.pages_dropped_empty, 2);
        assert_eq!(stats.pages_dropped_disambiguation, 1);
        assert_eq!(stats.pages_kept, 1);
    }

    #[test]
    fn disambiguation_kept_by_default() {
        let xml = dump(&[page("Mercury", "0", "Mercury may refer to\n{{dab}}")]);
        let (out, _) = parse(&xml, PageFilter::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn malformed_page_is_skipped() {
        let broken = "<page><title>Broken</title><ns>zero</ns><revision><text>x</text></revision></page>"
            .to_string();
        let bad_entity = page("Entity", "0", "a &nosuchentity; b");
        let xml = dump(&[broken, bad_entity, page("Fine", "0", "Fine text.")]);

        let (out, stats) = parse(&xml, PageFilter::default());
        assert_eq!(out.len(), 3);
        match &out[0] {
            Err(Error::MalformedRecord(m)) => {
                assert_eq!(m.title.as_deref(), Some("Broken"));
                assert!(m.reason.contains("\"zero\""), "{}", m.reason);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(out[1], Err(Error::MalformedRecord(_))));
        assert_eq!(out[2].as_ref().unwrap().title, "Fine");
        assert_eq!(stats.pages_malformed, 2);
        assert_eq!(stats.pages_kept, 1);
    }

    #[test]
    fn truncated_dump() {
        let xml = format!(
            "<mediawiki>{}<page><title>Cut</title><ns>0</ns><revision><text>abc",
            page("Whole", "0", "Whole text.")
        );
        let (out, stats) = parse(&xml, PageFilter::default());
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(Error::MalformedRecord(_))));
        assert_eq!(stats.pages_malformed, 1);
    }

    #[test]
    fn block_stream_joins_blocks() {
        let xml = dump(&[page("A", "0", "First."), page("B", "0", "Second.")]);
        let chunks: Vec<Vec<u8>> = xml.as_bytes().chunks(7).map(<[u8]>::to_vec).collect();
        let stream = BlockStream::new(chunks.into_iter());

        let titles: Vec<String> = Pages::new(stream, PageFilter::default())
            .map(|p| p.unwrap().title)
            .collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[test]
    fn block_stream_read() {
        let mut stream = BlockStream::new(vec![b"ab".to_vec(), vec![], b"cde".to_vec()].into_iter());
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcde");
    }
}
