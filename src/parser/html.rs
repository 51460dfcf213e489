//! HTML-to-plain-text cleaning for captured feed text (§4.3): a
//! strip-tags-then-decode-entities pipeline extended with OSC-8 hyperlink
//! preservation, the extended entity set, numeric entities, whitespace
//! collapsing, and control-character stripping.

use crate::text::{self, BASIC_ENTITIES, EXTENDED_ENTITIES};

/// Clean one captured text run: strip tags (preserving `<a href>` anchors as
/// OSC-8 terminal hyperlinks around their text), decode entities, collapse
/// whitespace, drop control characters other than TAB/LF, and trim.
pub fn clean(input: &str) -> String {
    let tagless = strip_tags_preserving_links(input);
    let decoded = decode_all_entities(&tagless);
    collapse_and_trim(&decoded)
}

fn decode_all_entities(s: &str) -> String {
    let basic_and_extended: Vec<(&str, &str)> = BASIC_ENTITIES
        .iter()
        .chain(EXTENDED_ENTITIES.iter())
        .copied()
        .collect();
    text::decode_entities(s, &basic_and_extended, true)
}

/// OSC 8 hyperlink escape: `ESC ] 8 ; ; <url> ESC \ <text> ESC ] 8 ; ; ESC \`.
fn osc8_open(url: &str) -> String {
    format!("\x1b]8;;{url}\x1b\\")
}

fn osc8_close() -> &'static str {
    "\x1b]8;;\x1b\\"
}

fn strip_tags_preserving_links(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let Some(rel_end) = s[i..].find('>') else {
                // Unterminated tag: drop the rest, matching "drop content
                // between `<` and `>`" with no lookahead beyond the buffer.
                break;
            };
            let tag = &s[i + 1..i + rel_end];
            let is_closing = tag.starts_with('/');
            let name_source = tag.trim_start_matches('/');
            let name_end = name_source
                .find(|c: char| c.is_whitespace() || c == '/')
                .unwrap_or(name_source.len());
            let tag_name = name_source[..name_end].to_ascii_lowercase();

            if tag_name == "a" && is_closing {
                out.push_str(osc8_close());
            } else if tag_name == "a" {
                if let Some(href) = extract_href(tag) {
                    out.push_str(&osc8_open(&href));
                }
            }
            i += rel_end + 1;
        } else {
            let ch = s[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

fn extract_href(tag_body: &str) -> Option<String> {
    if tag_body.starts_with('/') {
        return None; // closing tag
    }
    let lower = tag_body.to_ascii_lowercase();
    let pos = lower.find("href")?;
    let rest = &tag_body[pos + 4..];
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let (quote, body) = match rest.chars().next()? {
        q @ ('"' | '\'') => (q, &rest[1..]),
        _ => return None,
    };
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

const OSC8_PREFIX: &str = "\x1b]8;;";
const OSC8_TERMINATOR: &str = "\x1b\\";

/// Collapse whitespace and strip control characters, but pass an OSC-8
/// hyperlink escape (`osc8_open`/`osc8_close`, emitted by
/// `strip_tags_preserving_links`) through verbatim: its ESC bytes are
/// control characters too and must not be caught by the same filter that
/// drops stray control bytes from the source text.
fn collapse_and_trim(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if s[i..].starts_with(OSC8_PREFIX) {
            let rest = &s[i + OSC8_PREFIX.len()..];
            if let Some(term_rel) = rest.find(OSC8_TERMINATOR) {
                let end = i + OSC8_PREFIX.len() + term_rel + OSC8_TERMINATOR.len();
                out.push_str(&s[i..end]);
                last_was_space = false;
                i = end;
                continue;
            }
        }

        let ch = s[i..].chars().next().unwrap();
        if ch == '\t' || ch == '\n' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else if ch.is_control() {
            // dropped
        } else if ch == ' ' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
        i += ch.len_utf8();
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_tags() {
        assert_eq!(clean("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn preserves_anchor_as_osc8() {
        let out = clean(r#"Click <a href="https://example.com">here</a> now"#);
        assert_eq!(
            out,
            format!(
                "Click {}here{} now",
                "\x1b]8;;https://example.com\x1b\\",
                "\x1b]8;;\x1b\\"
            )
        );
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(clean("Tom &amp; Jerry &mdash; &#65;"), "Tom & Jerry \u{2014} A");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(clean("a    b\n\n\tc"), "a b c");
    }

    #[test]
    fn drops_control_characters_except_tab_and_lf() {
        let input = "a\u{0007}b\tc\nd";
        assert_eq!(clean(input), "ab c d");
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        assert_eq!(clean("   padded   "), "padded");
    }

    #[test]
    fn unterminated_tag_drops_rest_of_input() {
        assert_eq!(clean("before <div never closes"), "before");
    }
}
