//! On-disk and in-memory shapes (§3, §6). `Feed` and `Group` mirror the
//! `FeedConfig`/group JSON shapes exactly (including the legacy bare-array
//! group format); `Item` is the stable shape handed across the C6/formatter
//! boundary and persisted in daily snapshots.

use bumpalo::Bump;
use serde::{Deserialize, Serialize};

/// A single fetch-target, serialized under `feeds/<group>.json`.
///
/// Optional fields use `skip_serializing_if` so a freshly-read feed with no
/// cache headers round-trips without emitting `"etag": null` (§6 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(rename = "xmlUrl")]
    pub url: String,

    #[serde(rename = "text", skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "htmlUrl", skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub feed_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_text: None,
            enabled: true,
            title: None,
            html_url: None,
            description: None,
            feed_type: None,
            language: None,
            version: None,
            etag: None,
            last_modified: None,
        }
    }

    /// Display name used in sort/tag contexts: `text`, falling back to `title`,
    /// falling back to the bare URL.
    pub fn display_name(&self) -> &str {
        self.display_text
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(&self.url)
    }
}

/// A named collection of feeds sharing one interval gate and history stream.
///
/// Deserializes either the current object shape (`{ "text": ..., "feeds": [...] }`)
/// or the legacy bare-array shape, per the §6 external-interface contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub display_name: Option<String>,
    pub feeds: Vec<Feed>,
}

#[derive(Serialize, Deserialize)]
struct GroupDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    feeds: Vec<Feed>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupShape {
    Current(GroupDocument),
    Legacy(Vec<Feed>),
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            feeds: Vec::new(),
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains(['/', '\\', '\0'])
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }

    pub fn parse_document(name: &str, json: &str) -> serde_json::Result<Self> {
        let shape: GroupShape = serde_json::from_str(json)?;
        Ok(match shape {
            GroupShape::Current(doc) => Group {
                name: name.to_string(),
                display_name: doc.text,
                feeds: doc.feeds,
            },
            GroupShape::Legacy(feeds) => Group {
                name: name.to_string(),
                display_name: None,
                feeds,
            },
        })
    }

    pub fn to_document_json(&self) -> serde_json::Result<String> {
        let doc = GroupDocument {
            text: self.display_name.clone(),
            feeds: self.feeds.clone(),
        };
        serde_json::to_string_pretty(&doc)
    }

    pub fn enabled_feeds(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter().filter(|f| f.enabled)
    }
}

/// A parsed article, stable across the C6/formatter boundary (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_display_name: Option<String>,
}

impl Default for Item {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            link: None,
            pub_date: None,
            timestamp: 0,
            guid: None,
            feed_name: None,
            group_name: None,
            group_display_name: None,
        }
    }
}

impl Item {
    /// Identity key per §3: `guid` if non-empty, else `link`, else `None`
    /// (meaning the item has no stable identity and is always treated as
    /// fresh by the dedup layer).
    pub fn identity(&self) -> Option<&str> {
        match &self.guid {
            Some(g) if !g.is_empty() => Some(g.as_str()),
            _ => match &self.link {
                Some(l) if !l.is_empty() => Some(l.as_str()),
                _ => None,
            },
        }
    }
}

/// One daily snapshot file's contents (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: i64,
    pub items: Vec<Item>,
}

/// An arena-owned parse tree (§3, §9). Strings borrow from a caller-supplied
/// `Bump` so the whole tree is released in one deallocation when the arena is
/// dropped; the parser itself (`crate::parser`) is the only consumer.
#[derive(Debug)]
pub struct ParsedFeed<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub link: Option<&'a str>,
    pub language: Option<&'a str>,
    pub generator: Option<&'a str>,
    pub last_build_date: Option<&'a str>,
    pub author_name: Option<&'a str>,
    pub author_uri: Option<&'a str>,
    pub items: Vec<ParsedItem<'a>>,
}

#[derive(Debug, Default)]
pub struct ParsedItem<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub link: Option<&'a str>,
    pub pub_date: Option<&'a str>,
    pub guid: Option<&'a str>,
}

impl<'a> ParsedItem<'a> {
    /// Lift an arena-borrowed item into an owned [`Item`], tagging it with
    /// the feed/group context and the already-normalized timestamp. This is
    /// the point where the arena's lifetime ends for the caller: everything
    /// kept past this call is a deep, owned clone (§9 ownership note).
    pub fn into_owned(
        self,
        timestamp: i64,
        feed_name: Option<String>,
        group_name: Option<String>,
        group_display_name: Option<String>,
    ) -> Item {
        Item {
            title: self.title.map(str::to_string),
            description: self.description.map(str::to_string),
            link: self.link.map(str::to_string),
            pub_date: self.pub_date.map(str::to_string),
            timestamp,
            guid: self.guid.map(str::to_string),
            feed_name,
            group_name,
            group_display_name,
        }
    }
}

/// Allocate a string into `bump` and return a reference tied to its lifetime.
pub fn arena_str<'a>(bump: &'a Bump, s: &str) -> &'a str {
    bump.alloc_str(s)
}
