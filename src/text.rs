//! Shared entity-decoding scanner used by both the identity normalizer (C1,
//! five named entities) and the HTML cleaner (C3, the extended named set
//! plus numeric entities). A single left-to-right pass avoids the
//! cascading-replace pitfall of chaining `str::replace` calls per entity.

/// The five entities C1 always decodes.
pub const BASIC_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
];

/// The extended set the HTML cleaner (C3) decodes, in addition to the basic
/// five.
pub const EXTENDED_ENTITIES: &[(&str, &str)] = &[
    ("nbsp", "\u{00A0}"),
    ("rsquo", "\u{2019}"),
    ("lsquo", "\u{2018}"),
    ("rdquo", "\u{201D}"),
    ("ldquo", "\u{201C}"),
    ("hellip", "\u{2026}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00B7}"),
];

const MAX_ENTITY_NAME_LEN: usize = 8;

/// Decode named entities from `table` (and, if `numeric` is true, `&#d+;`
/// and `&#x[0-9a-f]+;`) throughout `s` in a single pass.
pub fn decode_entities(s: &str, table: &[(&str, &str)], numeric: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            if numeric {
                if let Some((ch, consumed)) = try_numeric_entity(&s[i..]) {
                    out.push(ch);
                    i += consumed;
                    continue;
                }
            }
            if let Some((rep, consumed)) = try_named_entity(&s[i..], table) {
                out.push_str(rep);
                i += consumed;
                continue;
            }
            out.push('&');
            i += 1;
        } else {
            // Advance by one full UTF-8 scalar, not one byte.
            let ch = s[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

fn try_named_entity<'a>(rest: &'a str, table: &[(&str, &str)]) -> Option<(&'a str, usize)> {
    debug_assert!(rest.starts_with('&'));
    let search_window = &rest[1..rest.len().min(1 + MAX_ENTITY_NAME_LEN + 1)];
    let semi = search_window.find(';')?;
    let name = &search_window[..semi];
    for (candidate, replacement) in table {
        if *candidate == name {
            return Some((replacement, 1 + semi + 1));
        }
    }
    None
}

fn try_numeric_entity(rest: &str) -> Option<(char, usize)> {
    debug_assert!(rest.starts_with('&'));
    if !rest.as_bytes().get(1).is_some_and(|&b| b == b'#') {
        return None;
    }
    let body = &rest[2..];
    let (digits, hex) = if body.as_bytes().first().is_some_and(|&b| b == b'x' || b == b'X') {
        (&body[1..], true)
    } else {
        (body, false)
    };
    let semi = digits.find(';')?;
    let num_str = &digits[..semi];
    if num_str.is_empty() {
        return None;
    }
    let codepoint = if hex {
        u32::from_str_radix(num_str, 16).ok()?
    } else {
        num_str.parse::<u32>().ok()?
    };
    if codepoint > 0x10FFFF {
        return None;
    }
    let ch = char::from_u32(codepoint)?;
    let prefix_len = 2 + usize::from(hex); // "&#" + optional "x"
    Some((ch, prefix_len + semi + 1))
}
