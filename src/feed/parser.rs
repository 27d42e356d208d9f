use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Feed XML could not be parsed as RSS or Atom.
#[derive(Debug, Error)]
#[error("Malformed feed: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// A parsed RSS/Atom document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Channel title, empty when the feed has none.
    pub title: String,
    entries: Vec<Entry>,
}

/// One item of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    /// `None` when the item carries no summary at all. A present but empty
    /// element stays `Some("")`.
    pub summary: Option<String>,
}

impl Feed {
    pub fn new(title: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            title: title.into(),
            entries,
        }
    }

    /// Iterates entries in the order the feed lists them.
    ///
    /// Every call starts over from the first entry.
    pub fn entries(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses RSS or Atom bytes into a [`Feed`].
///
/// RSS `<description>` and Atom `<summary>` both become [`Entry::summary`].
/// RSS items that carry a non-standard `<summary>` element instead (some
/// air-quality providers emit these) are picked up by a second pass over the
/// raw XML, since `feed-rs` ignores unknown RSS item children. A bare
/// `<rss>` root without a `version` attribute is read as RSS 2.0.
///
/// # Errors
///
/// Returns [`ParseError`] for anything `feed-rs` cannot read as a feed.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let feed = match parser::parse(bytes) {
        Err(err @ parser::ParseFeedError::ParseError(parser::ParseErrorKind::NoFeedRoot)) => {
            match with_rss_version(bytes) {
                Some(patched) => parser::parse(patched.as_slice())?,
                None => return Err(err.into()),
            }
        }
        result => result?,
    };

    let title = feed.title.map(|t| t.content).unwrap_or_default();

    let mut entries: Vec<Entry> = feed
        .entries
        .into_iter()
        .map(|entry| Entry {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: entry
                .links
                .into_iter()
                .next()
                .map(|l| l.href)
                .unwrap_or_default(),
            summary: entry.summary.map(|s| s.content),
        })
        .collect();

    if entries.iter().any(|e| e.summary.is_none()) {
        backfill_item_summaries(bytes, &mut entries);
    }

    Ok(Feed { title, entries })
}

/// Returns `bytes` with `version="2.0"` added to an `<rss>` root that lacks
/// one, or `None` when the root is anything else.
fn with_rss_version(bytes: &[u8]) -> Option<Vec<u8>> {
    const VERSION_ATTR: &[u8] = br#" version="2.0""#;

    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).ok()? {
            Event::Start(e) if e.local_name().as_ref() == b"rss" => {
                if e.try_get_attribute("version").ok()?.is_some() {
                    return None;
                }
                // Position is just past the '>' closing the root tag
                let close = usize::try_from(reader.buffer_position()).ok()?.checked_sub(1)?;
                if bytes.get(close) != Some(&b'>') {
                    return None;
                }

                let mut patched = Vec::with_capacity(bytes.len() + VERSION_ATTR.len());
                patched.extend_from_slice(&bytes[..close]);
                patched.extend_from_slice(VERSION_ATTR);
                patched.extend_from_slice(&bytes[close..]);
                return Some(patched);
            }
            Event::Start(_) | Event::Empty(_) | Event::Eof => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn backfill_item_summaries(bytes: &[u8], entries: &mut [Entry]) {
    let Some(summaries) = item_summaries(bytes) else {
        return;
    };

    // Positional matching is only sound when both passes saw the same items
    if summaries.len() != entries.len() {
        tracing::debug!(
            items = summaries.len(),
            entries = entries.len(),
            "Item count mismatch, skipping <summary> backfill"
        );
        return;
    }

    for (entry, summary) in entries.iter_mut().zip(summaries) {
        if entry.summary.is_none() {
            entry.summary = summary;
        }
    }
}

/// Collects the content of each RSS `<item>`'s direct `<summary>` child, one
/// slot per item in document order.
///
/// Markup nested inside the summary is kept as written; text is unescaped and
/// CDATA is taken verbatim. Whitespace is preserved.
fn item_summaries(bytes: &[u8]) -> Option<Vec<Option<String>>> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut summaries: Vec<Option<String>> = Vec::new();
    // Depth relative to the current <item>; 0 means outside any item
    let mut depth: usize = 0;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    if e.local_name().as_ref() == b"item" {
                        depth = 1;
                        summaries.push(None);
                    }
                } else {
                    depth += 1;
                    if let Some(text) = current.as_mut() {
                        text.push('<');
                        text.push_str(&String::from_utf8_lossy(&e));
                        text.push('>');
                    } else if depth == 2 && e.local_name().as_ref() == b"summary" {
                        current = Some(String::new());
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(text) = current.as_mut() {
                    text.push('<');
                    text.push_str(&String::from_utf8_lossy(&e));
                    text.push_str("/>");
                } else if depth == 0 && e.local_name().as_ref() == b"item" {
                    summaries.push(None);
                } else if depth == 1 && e.local_name().as_ref() == b"summary" {
                    if let Some(slot) = summaries.last_mut() {
                        *slot = Some(String::new());
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&t.unescape().ok()?);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                if depth > 0 {
                    if depth == 2 && e.local_name().as_ref() == b"summary" {
                        if let (Some(text), Some(slot)) = (current.take(), summaries.last_mut()) {
                            *slot = Some(text);
                        }
                    } else if let Some(text) = current.as_mut() {
                        text.push_str("</");
                        text.push_str(&String::from_utf8_lossy(&e));
                        text.push('>');
                    }
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "XML error during <summary> backfill");
                return None;
            }
            _ => {}
        }
        buf.clear();
    }

    Some(summaries)
}
