use crate::models::NoteRecord;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

static ID_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[id:(.+?)\]\s*").expect("valid id tag regex"));
static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\w+\s*").expect("valid hashtag regex"));

pub const PINNED_TAG: &str = "[PINNED]";
pub const MULTILINE_TOKEN: &str = "⟨NL⟩";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `[YYYY-MM-DD HH:MM:SS] ` including the trailing space.
pub const TIMESTAMP_TOKEN_LEN: usize = 22;

/// Decodes one physical line. Never fails: anything unrecognised ends up in `body`.
pub fn decode(line: &str) -> NoteRecord {
    let mut remaining = line.trim();
    let mut record = NoteRecord::new(String::new(), String::new());

    if let Some(captures) = ID_TAG_RE.captures(remaining) {
        if let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) {
            record.id = id.as_str().to_string();
            remaining = &remaining[whole.end()..];
        }
    }

    if let Some(rest) = strip_pinned_tag(remaining) {
        record.is_pinned = true;
        remaining = rest;
    }

    if let Some(token) = timestamp_token(remaining) {
        record.created_at = parse_timestamp(token);
    }
    record.body = remaining.to_string();
    record
}

pub fn encode(record: &NoteRecord) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    if !record.id.is_empty() {
        parts.push(id_tag(&record.id));
    }
    if record.is_pinned {
        parts.push(PINNED_TAG.to_string());
    }
    parts.push(record.body.clone());
    parts.join(" ")
}

pub fn id_tag(id: &str) -> String {
    format!("[id:{}]", id)
}

pub fn encode_multiline(text: &str) -> String {
    text.replace("\r\n", MULTILINE_TOKEN)
        .replace('\n', MULTILINE_TOKEN)
        .replace('\r', MULTILINE_TOKEN)
}

pub fn decode_multiline(text: &str) -> String {
    text.replace(MULTILINE_TOKEN, "\n")
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// Returns the 19 characters inside a leading `[....] ` token, parseable or not.
pub fn timestamp_token(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() >= TIMESTAMP_TOKEN_LEN
        && bytes[0] == b'['
        && bytes[20] == b']'
        && bytes[21] == b' '
    {
        text.get(1..20)
    } else {
        None
    }
}

/// Case-insensitive `[PINNED]` prefix followed by whitespace or end of text.
pub fn strip_pinned_tag(text: &str) -> Option<&str> {
    let head = text.get(..PINNED_TAG.len())?;
    if !head.eq_ignore_ascii_case(PINNED_TAG) {
        return None;
    }
    let rest = &text[PINNED_TAG.len()..];
    if rest.is_empty() {
        return Some(rest);
    }
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Body text as shown to the user: timestamp token dropped, line breaks restored.
pub fn strip_timestamp(body: &str) -> String {
    let text = match timestamp_token(body) {
        Some(_) => &body[TIMESTAMP_TOKEN_LEN..],
        None => body,
    };
    decode_multiline(text.trim())
}

pub fn strip_timestamp_and_tags(body: &str) -> String {
    let without_timestamp = strip_timestamp(body);
    HASHTAG_RE
        .replace_all(&without_timestamp, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|date| date.and_hms_opt(8, 30, 0))
            .expect("valid date")
    }

    #[test]
    fn decodes_full_line() {
        let record = decode("[id:Qabc] [PINNED] [2024-01-05 08:30:00] buy milk");
        assert_eq!(record.id, "Qabc");
        assert!(record.is_pinned);
        assert_eq!(record.created_at, Some(ts(5)));
        assert_eq!(record.body, "[2024-01-05 08:30:00] buy milk");
    }

    #[test]
    fn legacy_line_keeps_text_as_body() {
        let record = decode("just an old note");
        assert!(record.is_legacy());
        assert!(!record.is_pinned);
        assert_eq!(record.created_at, None);
        assert_eq!(record.body, "just an old note");
    }

    #[test]
    fn unparseable_timestamp_stays_in_body() {
        let record = decode("[id:X] [2024-13-45 99:99:99] broken clock");
        assert_eq!(record.id, "X");
        assert_eq!(record.created_at, None);
        assert_eq!(record.body, "[2024-13-45 99:99:99] broken clock");
    }

    #[test]
    fn pinned_tag_is_case_insensitive_and_needs_separator() {
        assert!(decode("[pinned] hello").is_pinned);
        let glued = decode("[PINNED]hello");
        assert!(!glued.is_pinned);
        assert_eq!(glued.body, "[PINNED]hello");
    }

    #[test]
    fn garbage_never_panics() {
        for line in ["[id:", "[id:]", "[", "[2024-01-01 00:00:00]", "⟨NL⟩⟨NL⟩"] {
            let record = decode(line);
            assert!(record.is_legacy());
            assert_eq!(record.body, line);
            assert_eq!(record.created_at, None);
        }

        let odd = decode("[id:é] [ü");
        assert_eq!(odd.id, "é");
        assert_eq!(odd.body, "[ü");
    }

    #[test]
    fn encode_then_decode_preserves_records() {
        let mut pinned = NoteRecord::new("Q1", "[2024-01-03 08:30:00] pinned note");
        pinned.is_pinned = true;
        pinned.created_at = Some(ts(3));

        let mut plain = NoteRecord::new("Q2", "[2024-01-04 08:30:00] multi⟨NL⟩line");
        plain.created_at = Some(ts(4));

        let legacy = NoteRecord::new("", "legacy text");

        let mut pinned_legacy = NoteRecord::new("", "legacy pinned");
        pinned_legacy.is_pinned = true;

        for record in [pinned, plain, legacy, pinned_legacy] {
            assert_eq!(decode(&encode(&record)), record);
        }
    }

    #[test]
    fn multiline_round_trip() {
        let text = "first\r\nsecond\nthird\rfourth";
        let encoded = encode_multiline(text);
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('\r'));
        assert_eq!(decode_multiline(&encoded), "first\nsecond\nthird\nfourth");

        let unix = "a\nb\n\nc";
        assert_eq!(decode_multiline(&encode_multiline(unix)), unix);
    }

    #[test]
    fn strips_timestamp_and_hashtags_for_matching() {
        let body = "[2024-01-05 08:30:00] Call Bob #work #urgent";
        assert_eq!(strip_timestamp(body), "Call Bob #work #urgent");
        assert_eq!(strip_timestamp_and_tags(body), "Call Bob");
        assert_eq!(strip_timestamp("line one⟨NL⟩line two"), "line one\nline two");
    }
}
