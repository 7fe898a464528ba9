use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Display;

use super::report::FilingCategory;
use crate::error::FeedError;

/// One `<entry>` of an Atom feed. Any part may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Updated,
}

impl RawEntry {
    fn push_text(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Updated => &mut self.updated_at,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    fn finish(mut self) -> Self {
        for slot in [&mut self.title, &mut self.updated_at] {
            if let Some(text) = slot.take() {
                let text = text.trim();
                if !text.is_empty() {
                    *slot = Some(text.to_string());
                }
            }
        }
        self
    }
}

fn parse_err(e: impl Display) -> FeedError {
    FeedError::Parse(e.to_string())
}

/// Streams entries out of an Atom document as the reader reaches them.
///
/// A document without entries yields nothing. Malformed XML yields one
/// `Err` and then the iterator is exhausted.
pub struct FeedEntries<'a> {
    reader: Reader<&'a [u8]>,
    category: FilingCategory,
    depth: usize,
    seen_root: bool,
    finished: bool,
}

impl<'a> FeedEntries<'a> {
    pub fn new(document: &'a str, category: FilingCategory) -> Self {
        Self::from_bytes(document.as_bytes(), category)
    }

    pub fn from_bytes(document: &'a [u8], category: FilingCategory) -> Self {
        let mut reader = Reader::from_reader(document);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            category,
            depth: 0,
            seen_root: false,
            finished: false,
        }
    }

    fn enter_root(&mut self, e: &BytesStart) -> Result<(), FeedError> {
        if e.local_name().as_ref() != b"feed" {
            return Err(FeedError::Parse(format!(
                "document root <{}> is not an Atom <feed>",
                String::from_utf8_lossy(e.name().as_ref())
            )));
        }
        self.seen_root = true;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry>, FeedError> {
        let mut entry: Option<RawEntry> = None;
        let mut field: Option<Field> = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    self.depth += 1;
                    if !self.seen_root {
                        self.enter_root(&e)?;
                        continue;
                    }
                    match (e.local_name().as_ref(), entry.as_mut()) {
                        (b"entry", None) => entry = Some(RawEntry::default()),
                        (b"title", Some(_)) => field = Some(Field::Title),
                        (b"updated", Some(_)) => field = Some(Field::Updated),
                        (b"link", Some(current)) => take_link(&e, current)?,
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if !self.seen_root {
                        self.enter_root(&e)?;
                        continue;
                    }
                    if let Some(current) = entry.as_mut() {
                        if e.local_name().as_ref() == b"link" {
                            take_link(&e, current)?;
                        }
                    }
                }
                Event::Text(t) => {
                    if let (Some(f), Some(current)) = (field, entry.as_mut()) {
                        let text = t.unescape().map_err(parse_err)?;
                        current.push_text(f, &text);
                    }
                }
                Event::CData(c) => {
                    if let (Some(f), Some(current)) = (field, entry.as_mut()) {
                        let raw = c.into_inner();
                        current.push_text(f, &String::from_utf8_lossy(&raw));
                    }
                }
                Event::End(e) => {
                    self.depth = self.depth.saturating_sub(1);
                    match e.local_name().as_ref() {
                        b"title" | b"updated" => field = None,
                        b"entry" => {
                            if let Some(done) = entry.take() {
                                return Ok(Some(done.finish()));
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => {
                    if !self.seen_root {
                        return Err(FeedError::Parse("document has no root element".into()));
                    }
                    if self.depth != 0 {
                        return Err(FeedError::Parse(
                            "document ended before its elements were closed".into(),
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

fn take_link(e: &BytesStart, entry: &mut RawEntry) -> Result<(), FeedError> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes() {
        let attr = attr.map_err(parse_err)?;
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(attr.unescape_value().map_err(parse_err)?.into_owned()),
            b"rel" => rel = Some(attr.unescape_value().map_err(parse_err)?.into_owned()),
            _ => {}
        }
    }
    if let Some(href) = href {
        let alternate = rel.as_deref().map_or(true, |r| r == "alternate");
        if alternate || entry.link.is_none() {
            entry.link = Some(href);
        }
    }
    Ok(())
}

impl Iterator for FeedEntries<'_> {
    type Item = Result<RawEntry, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => {
                log::trace!("{} feed entry: {:?}", self.category, entry.title);
                Some(Ok(entry))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Parses the whole document up front, failing if any part of it is malformed.
pub fn parse_feed(document: &str, category: FilingCategory) -> Result<Vec<RawEntry>, FeedError> {
    FeedEntries::new(document, category).collect()
}
