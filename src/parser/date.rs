//! Hand-rolled RFC 3339 and RFC 822/1123 date parsing (§4.3). No date crate
//! is reached for here: the tag is a loose, vendor-inconsistent string and a
//! small tokenizer tolerates the variety better than a strict parser would.
//! All failure returns `None`; the caller maps that to timestamp 0.

pub fn parse_timestamp(s: &str) -> i64 {
    let s = s.trim();
    parse_rfc3339(s).or_else(|| parse_rfc822(s)).unwrap_or(0)
}

fn parse_rfc3339(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if s.len() < 19 || bytes.get(4) != Some(&b'-') || !matches!(bytes.get(10), Some(b'T' | b't' | b' ')) {
        return None;
    }
    let year: i64 = s.get(0..4)?.parse().ok()?;
    let month: i64 = s.get(5..7)?.parse().ok()?;
    let day: i64 = s.get(8..10)?.parse().ok()?;
    let hour: i64 = s.get(11..13)?.parse().ok()?;
    let min: i64 = s.get(14..16)?.parse().ok()?;
    let sec: i64 = s.get(17..19)?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || min > 59 || sec > 60 {
        return None;
    }

    let base = days_since_epoch(year, month, day) * 86_400 + hour * 3_600 + min * 60 + sec;

    let rest = s.get(19..).unwrap_or("");
    let rest = rest.strip_prefix(|c: char| c == '.').map_or(rest, |r| {
        let digits_end = r.find(|c: char| !c.is_ascii_digit()).unwrap_or(r.len());
        &r[digits_end..]
    });

    let offset = parse_offset_suffix(rest)?;
    Some(base - offset)
}

fn parse_offset_suffix(rest: &str) -> Option<i64> {
    if rest.is_empty() || rest.eq_ignore_ascii_case("z") {
        return Some(0);
    }
    let bytes = rest.as_bytes();
    let sign: i64 = match bytes.first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = rest[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    let oh: i64 = digits[0..2].parse().ok()?;
    let om: i64 = digits[2..4].parse().ok()?;
    Some(sign * (oh * 3_600 + om * 60))
}

fn parse_rfc822(s: &str) -> Option<i64> {
    let s = match s.find(',') {
        Some(pos) => s[pos + 1..].trim(),
        None => s.trim(),
    };
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let day: i64 = parts[0].parse().ok()?;
    let month = month_number(parts[1])?;
    let year: i64 = parse_year(parts[2])?;

    let time_parts: Vec<&str> = parts[3].split(':').collect();
    if time_parts.len() < 2 {
        return None;
    }
    let hour: i64 = time_parts[0].parse().ok()?;
    let min: i64 = time_parts[1].parse().ok()?;
    let sec: i64 = time_parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || min > 59 || sec > 60 {
        return None;
    }

    let base = days_since_epoch(year, month, day) * 86_400 + hour * 3_600 + min * 60 + sec;
    let offset = parts.get(4).map(|tz| parse_tz_token(tz)).unwrap_or(0);
    Some(base - offset)
}

fn parse_year(raw: &str) -> Option<i64> {
    let y: i64 = raw.parse().ok()?;
    // RFC 822 allows two-digit years; RFC 1123 mandates four. Split the
    // difference the way lenient feed readers do: 0-49 -> 2000s, 50-99 -> 1900s.
    Some(match raw.len() {
        2 if y < 50 => 2000 + y,
        2 => 1900 + y,
        _ => y,
    })
}

fn month_number(token: &str) -> Option<i64> {
    Some(match token.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}

fn parse_tz_token(token: &str) -> i64 {
    match token.to_ascii_uppercase().as_str() {
        "GMT" | "UTC" | "UT" | "Z" => 0,
        "EST" => -5 * 3_600,
        "EDT" => -4 * 3_600,
        "CST" => -6 * 3_600,
        "CDT" => -5 * 3_600,
        "MST" => -7 * 3_600,
        "MDT" => -6 * 3_600,
        "PST" => -8 * 3_600,
        "PDT" => -7 * 3_600,
        _ => parse_offset_suffix(token).unwrap_or(0),
    }
}

/// Days between `1970-01-01` and `(year, month, day)` via the proleptic
/// Gregorian Rata Die formula (Howard Hinnant's `days_from_civil`). Avoids
/// any dependency on variable month lengths or leap-year branching.
pub fn days_since_epoch(year: i64, month: i64, day: i64) -> i64 {
    let mut y = year;
    let m = month;
    let shifted_month = if m <= 2 {
        y -= 1;
        m + 9
    } else {
        m - 3
    };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let doy = (153 * shifted_month + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_z() {
        assert_eq!(parse_timestamp("2024-01-15T10:30:00Z"), 1_705_314_600);
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let with_offset = parse_timestamp("2024-01-15T10:30:00+05:00");
        let utc = parse_timestamp("2024-01-15T05:30:00Z");
        assert_eq!(with_offset, utc);
    }

    #[test]
    fn parses_rfc3339_with_fractional_seconds() {
        assert_eq!(
            parse_timestamp("2024-01-15T10:30:00.123Z"),
            parse_timestamp("2024-01-15T10:30:00Z")
        );
    }

    #[test]
    fn parses_rfc822_with_named_zone() {
        let ts = parse_timestamp("Wed, 02 Oct 2024 15:30:00 GMT");
        assert_eq!(ts, parse_timestamp("2024-10-02T15:30:00Z"));
    }

    #[test]
    fn parses_rfc822_with_numeric_offset() {
        let ts = parse_timestamp("Wed, 02 Oct 2024 15:30:00 -0700");
        let utc = parse_timestamp("2024-10-02T22:30:00Z");
        assert_eq!(ts, utc);
    }

    #[test]
    fn parses_rfc822_without_weekday() {
        let ts = parse_timestamp("02 Oct 2024 15:30:00 EST");
        let utc = parse_timestamp("2024-10-02T20:30:00Z");
        assert_eq!(ts, utc);
    }

    #[test]
    fn unparsable_date_yields_zero() {
        assert_eq!(parse_timestamp("not a date"), 0);
        assert_eq!(parse_timestamp(""), 0);
    }

    #[test]
    fn days_since_epoch_matches_known_points() {
        assert_eq!(days_since_epoch(1970, 1, 1), 0);
        assert_eq!(days_since_epoch(1969, 12, 31), -1);
        assert_eq!(days_since_epoch(2024, 1, 15), 19737);
    }
}
