use crate::codec;
use chrono::NaiveDateTime;
use std::collections::HashMap;

const ID_PREFIX: &str = "[id:";

/// Merges two line lists by note identity.
///
/// Output starts as `baseline`. An `incoming` line replaces the baseline line
/// with the same key when its timestamp is missing or not older; unknown keys
/// are appended in incoming order. Blank incoming lines are skipped.
pub fn merge(baseline: &[String], incoming: &[String]) -> Vec<String> {
    let mut result = baseline.to_vec();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    for (position, line) in result.iter().enumerate() {
        if let Some((key, _)) = note_key(line) {
            index_by_key.insert(key, position);
        }
    }

    for line in incoming {
        let Some((key, incoming_at)) = note_key(line) else {
            continue;
        };

        match index_by_key.get(&key) {
            Some(&position) => {
                let existing_at = note_key(&result[position]).and_then(|(_, at)| at);
                // an incoming line without a readable timestamp always wins
                let replace = match (incoming_at, existing_at) {
                    (None, _) => true,
                    (Some(_), None) => true,
                    (Some(incoming_at), Some(existing_at)) => incoming_at >= existing_at,
                };
                if replace {
                    result[position] = line.clone();
                }
            }
            None => {
                result.push(line.clone());
                index_by_key.insert(key, result.len() - 1);
            }
        }
    }

    result
}

/// Key and optional timestamp of one line; `None` for blank lines.
///
/// Lines starting with an `[id:...]` tag (any case) key on the tag, every
/// other line on its trimmed content. Keys compare case-insensitively.
pub fn note_key(line: &str) -> Option<(String, Option<NaiveDateTime>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let legacy = || Some((trimmed.to_lowercase(), None));
    let has_id_prefix = trimmed
        .get(..ID_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ID_PREFIX));
    if !has_id_prefix {
        return legacy();
    }
    let tag_end = match trimmed.find(']') {
        Some(end) if end > ID_PREFIX.len() => end,
        _ => return legacy(),
    };

    let key = trimmed[..=tag_end].to_lowercase();
    let mut rest = trimmed[tag_end + 1..].trim_start();
    if rest
        .get(..codec::PINNED_TAG.len())
        .is_some_and(|tag| tag.eq_ignore_ascii_case(codec::PINNED_TAG))
    {
        rest = rest[codec::PINNED_TAG.len()..].trim_start();
    }
    let created_at = codec::timestamp_token(rest).and_then(codec::parse_timestamp);
    Some((key, created_at))
}
