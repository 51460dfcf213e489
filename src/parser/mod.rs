//! C3: Feed Parser. Streams RSS 2.0 / Atom 1.0 through `quick-xml`'s
//! pull-event reader exactly once, tracking capture depth the way the
//! pack's event-loop parsers do, and interns every captured string into a
//! caller-owned `bumpalo::Bump` arena (§4.3, §9).

pub mod date;
pub mod html;

use bumpalo::Bump;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Error, Result};
use crate::model::{arena_str, ParsedFeed, ParsedItem};

const PROBE_WINDOW: usize = 1024;

/// Cheap pre-parse probe (§4.3): skip BOM/whitespace, require `<` as the
/// first real byte, and require one of the known root markers within the
/// first kilobyte. Lets the fetcher reject non-feed bodies before paying
/// for a full XML parse.
pub fn looks_like_feed(bytes: &[u8]) -> bool {
    let mut rest = bytes;
    if let Some(stripped) = rest.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        rest = stripped;
    }
    let Some(pos) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    if rest[pos] != b'<' {
        return false;
    }
    let window = &rest[..rest.len().min(PROBE_WINDOW)];
    let markers: [&[u8]; 5] = [b"<rss", b"<feed", b"<rdf:", b"<?xml", b"<RDF"];
    markers.iter().any(|m| {
        window
            .windows(m.len())
            .any(|w| w.eq_ignore_ascii_case(m))
    })
}

/// Parse one feed body into the arena, invoking `early_abort` after each
/// completed item. Returning `true` from the callback drops that item and
/// stops the parser (§4.3) — this operates directly on the arena-borrowed
/// [`ParsedItem`] rather than an owned `Item`, so the dedup check never pays
/// for an allocation it might throw away (documented deviation, see
/// DESIGN.md).
pub fn parse<'a>(
    bump: &'a Bump,
    bytes: &[u8],
    url: &str,
    mut early_abort: Option<&mut dyn FnMut(&ParsedItem<'a>) -> bool>,
) -> Result<ParsedFeed<'a>> {
    if !looks_like_feed(bytes) {
        return Err(Error::Parse {
            url: url.to_string(),
            reason: "response does not look like a feed".to_string(),
        });
    }

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut state: ParseState<'a> = ParseState::default();
    let mut feed = ParsedFeed {
        title: None,
        description: None,
        link: None,
        language: None,
        generator: None,
        last_build_date: None,
        author_name: None,
        author_uri: None,
        items: Vec::new(),
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                state.depth += 1;
                handle_open(bump, &mut state, &mut feed, e, false);
            }
            Ok(Event::Empty(ref e)) => {
                state.depth += 1;
                handle_open(bump, &mut state, &mut feed, e, true);
                let local = local_name(e.name().as_ref());
                handle_close(bump, &mut state, &mut feed, &local);
                state.depth -= 1;
            }
            Ok(Event::Text(ref e)) => {
                if state.capturing.is_some() {
                    state.text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if state.capturing.is_some() {
                    state.text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(ref e)) => {
                let local = local_name(e.name().as_ref());
                handle_close(bump, &mut state, &mut feed, &local);
                state.depth -= 1;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();

        if let Some(item) = state.pending_item.take() {
            let abort = early_abort.as_mut().is_some_and(|cb| cb(&item));
            if !abort {
                feed.items.push(item);
            } else {
                break;
            }
        }
    }

    if feed.items.is_empty() && feed_is_effectively_empty(&feed) {
        return Err(Error::Parse {
            url: url.to_string(),
            reason: "no items found".to_string(),
        });
    }

    Ok(feed)
}

fn feed_is_effectively_empty(feed: &ParsedFeed<'_>) -> bool {
    feed.title.is_none() && feed.description.is_none() && feed.link.is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    FeedTitle,
    FeedDescription,
    FeedLink,
    FeedLanguage,
    FeedGenerator,
    FeedLastBuildDate,
    AuthorName,
    AuthorUri,
    ItemTitle,
    ItemDescPrimary,
    ItemDescSummary,
    ItemDescContent,
    ItemDate,
    ItemGuid,
    ItemLink,
}

struct Capture {
    target: Target,
    depth: u32,
}

struct ItemAccum<'a> {
    title: Option<&'a str>,
    desc_primary: Option<&'a str>,
    desc_summary: Option<&'a str>,
    desc_content: Option<&'a str>,
    pub_date: Option<&'a str>,
    guid: Option<&'a str>,
    link: Option<&'a str>,
    enclosure_url: Option<&'a str>,
}

impl<'a> Default for ItemAccum<'a> {
    fn default() -> Self {
        Self {
            title: None,
            desc_primary: None,
            desc_summary: None,
            desc_content: None,
            pub_date: None,
            guid: None,
            link: None,
            enclosure_url: None,
        }
    }
}

struct ParseState<'a> {
    depth: u32,
    in_item: bool,
    item_depth: u32,
    in_author: bool,
    author_depth: u32,
    capturing: Option<Capture>,
    text_buf: String,
    item: ItemAccum<'a>,
    pending_item: Option<ParsedItem<'a>>,
}

impl<'a> Default for ParseState<'a> {
    fn default() -> Self {
        Self {
            depth: 0,
            in_item: false,
            item_depth: 0,
            in_author: false,
            author_depth: 0,
            capturing: None,
            text_buf: String::new(),
            item: ItemAccum::default(),
            pending_item: None,
        }
    }
}

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    match s.find(':') {
        Some(pos) => s[pos + 1..].to_ascii_lowercase(),
        None => s.to_ascii_lowercase(),
    }
}

fn qname_lower(qname: &[u8]) -> String {
    String::from_utf8_lossy(qname).to_ascii_lowercase()
}

fn attr_value(e: &BytesStart, attr_name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref().eq_ignore_ascii_case(attr_name) {
            Some(String::from_utf8_lossy(&a.value).to_string())
        } else {
            None
        }
    })
}

fn target_for(local: &str, raw_qname: &str, in_item: bool, in_author: bool) -> Option<Target> {
    if in_author {
        return match local {
            "name" => Some(Target::AuthorName),
            "uri" => Some(Target::AuthorUri),
            _ => None,
        };
    }
    if raw_qname.starts_with("content:") && local == "encoded" {
        return Some(if in_item {
            Target::ItemDescPrimary
        } else {
            Target::FeedDescription
        });
    }
    match local {
        "title" => Some(if in_item { Target::ItemTitle } else { Target::FeedTitle }),
        "link" => Some(if in_item { Target::ItemLink } else { Target::FeedLink }),
        "description" | "subtitle" => {
            Some(if in_item { Target::ItemDescPrimary } else { Target::FeedDescription })
        }
        "summary" => Some(if in_item { Target::ItemDescSummary } else { Target::FeedDescription }),
        "content" => Some(if in_item { Target::ItemDescContent } else { Target::FeedDescription }),
        "pubdate" | "published" | "date" => in_item.then_some(Target::ItemDate),
        "updated" => Some(if in_item { Target::ItemDate } else { Target::FeedLastBuildDate }),
        "lastbuilddate" => (!in_item).then_some(Target::FeedLastBuildDate),
        "guid" | "id" => in_item.then_some(Target::ItemGuid),
        "language" => (!in_item).then_some(Target::FeedLanguage),
        "generator" => (!in_item).then_some(Target::FeedGenerator),
        _ => None,
    }
}

fn slot_already_filled(feed: &ParsedFeed<'_>, state: &ParseState<'_>, target: Target) -> bool {
    match target {
        Target::FeedTitle => feed.title.is_some(),
        Target::FeedDescription => feed.description.is_some(),
        Target::FeedLink => feed.link.is_some(),
        Target::FeedLanguage => feed.language.is_some(),
        Target::FeedGenerator => feed.generator.is_some(),
        Target::FeedLastBuildDate => feed.last_build_date.is_some(),
        Target::AuthorName => feed.author_name.is_some(),
        Target::AuthorUri => feed.author_uri.is_some(),
        Target::ItemTitle => state.item.title.is_some(),
        Target::ItemDescPrimary => state.item.desc_primary.is_some(),
        Target::ItemDescSummary => state.item.desc_summary.is_some(),
        Target::ItemDescContent => state.item.desc_content.is_some(),
        Target::ItemDate => state.item.pub_date.is_some(),
        Target::ItemGuid => state.item.guid.is_some(),
        Target::ItemLink => state.item.link.is_some(),
    }
}

fn handle_open<'a>(
    bump: &'a Bump,
    state: &mut ParseState<'a>,
    feed: &mut ParsedFeed<'a>,
    e: &BytesStart,
    is_empty: bool,
) {
    let local = local_name(e.name().as_ref());
    let raw = qname_lower(e.name().as_ref());

    if !state.in_item && (local == "item" || local == "entry") {
        state.in_item = true;
        state.item_depth = state.depth;
        state.item = ItemAccum::default();
        return;
    }

    if !state.in_author && local == "author" {
        state.in_author = true;
        state.author_depth = state.depth;
        return;
    }

    if local == "link" {
        if let Some(href) = attr_value(e, b"href") {
            let href = arena_str(bump, &href);
            if state.in_item {
                if state.item.link.is_none() {
                    state.item.link = Some(href);
                }
            } else if feed.link.is_none() {
                feed.link = Some(href);
            }
            return; // href wins; do not also capture body text.
        }
    }

    if local == "enclosure" && state.in_item {
        if let Some(url) = attr_value(e, b"url") {
            if state.item.enclosure_url.is_none() {
                state.item.enclosure_url = Some(arena_str(bump, &url));
            }
        }
        return;
    }

    if is_empty {
        return; // other self-closing tags carry no text to capture.
    }

    if state.capturing.is_some() {
        return; // already capturing an outer tag; nested tags are ignored.
    }

    if let Some(target) = target_for(&local, &raw, state.in_item, state.in_author) {
        if !slot_already_filled(feed, state, target) {
            state.capturing = Some(Capture { target, depth: state.depth });
            state.text_buf.clear();
        }
    }
}

fn handle_close<'a>(bump: &'a Bump, state: &mut ParseState<'a>, feed: &mut ParsedFeed<'a>, local: &str) {
    if let Some(cap) = &state.capturing {
        if cap.depth == state.depth {
            let target = cap.target;
            let cleaned = html::clean(&state.text_buf);
            let interned = arena_str(bump, &cleaned);
            assign(feed, state, target, interned);
            state.capturing = None;
            state.text_buf.clear();
        }
    }

    if state.in_author && local == "author" && state.author_depth == state.depth {
        state.in_author = false;
    }

    if state.in_item && (local == "item" || local == "entry") && state.item_depth == state.depth {
        state.in_item = false;
        let link = state.item.link.or(state.item.enclosure_url);
        let description = state
            .item
            .desc_primary
            .or(state.item.desc_summary)
            .or(state.item.desc_content);
        state.pending_item = Some(ParsedItem {
            title: state.item.title,
            description,
            link,
            pub_date: state.item.pub_date,
            guid: state.item.guid,
        });
    }
}

fn assign<'a>(feed: &mut ParsedFeed<'a>, state: &mut ParseState<'a>, target: Target, value: &'a str) {
    match target {
        Target::FeedTitle => feed.title = Some(value),
        Target::FeedDescription => feed.description = Some(value),
        Target::FeedLink => feed.link = Some(value),
        Target::FeedLanguage => feed.language = Some(value),
        Target::FeedGenerator => feed.generator = Some(value),
        Target::FeedLastBuildDate => feed.last_build_date = Some(value),
        Target::AuthorName => feed.author_name = Some(value),
        Target::AuthorUri => feed.author_uri = Some(value),
        Target::ItemTitle => state.item.title = Some(value),
        Target::ItemDescPrimary => state.item.desc_primary = Some(value),
        Target::ItemDescSummary => state.item.desc_summary = Some(value),
        Target::ItemDescContent => state.item.desc_content = Some(value),
        Target::ItemDate => state.item.pub_date = Some(value),
        Target::ItemGuid => state.item.guid = Some(value),
        Target::ItemLink => state.item.link = Some(value),
    }
}
