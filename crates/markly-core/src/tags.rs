//! Tag-name reconciliation between analyzer suggestions and a user's tags.
//!
//! Names are compared in a normalized form (NFKC, surrounding quotes
//! stripped, all whitespace removed, lowercased). A suggestion resolves to a tag by exact
//! normalized match first; failing that, by a loose match that must be
//! *unique* among the user's tags:
//!
//! - the shorter of the two names has at least 3 characters,
//! - the length ratio (shorter / longer) is at least 0.6,
//! - one name contains the other, or is a subsequence of it.
//!
//! Ambiguous loose matches resolve to nothing.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::{TagId, UserTag};

const LOOSE_MIN_LEN: usize = 3;
const LOOSE_MIN_RATIO: f64 = 0.6;
const CREATE_MIN_LEN: usize = 2;

fn is_edge_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’')
}

/// Strip surrounding quotes/whitespace and collapse internal whitespace runs.
fn clean_tag_name(input: &str) -> String {
    let folded: String = input.nfkc().collect();
    folded
        .trim_matches(is_edge_char)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comparison key for a tag name.
pub fn normalize_tag_name(input: &str) -> String {
    let folded: String = input.nfkc().collect();
    folded
        .trim_matches(is_edge_char)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_subsequence(short: &str, long: &str) -> bool {
    if short.is_empty() || long.is_empty() {
        return false;
    }
    let mut wanted = short.chars().peekable();
    for c in long.chars() {
        if wanted.peek() == Some(&c) {
            wanted.next();
            if wanted.peek().is_none() {
                return true;
            }
        }
    }
    false
}

fn allows_loose_match(left: &str, right: &str) -> bool {
    let (a, b) = (char_len(left), char_len(right));
    let (short, long) = (a.min(b), a.max(b));
    if short < LOOSE_MIN_LEN {
        return false;
    }
    short as f64 / long as f64 >= LOOSE_MIN_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagMatch {
    Exact(TagId),
    Loose(TagId),
    None,
}

struct NormalizedTag {
    id: TagId,
    key: String,
}

fn normalized_tags(tags: &[UserTag]) -> Vec<NormalizedTag> {
    tags.iter()
        .map(|tag| NormalizedTag {
            id: tag.id,
            key: normalize_tag_name(&tag.name),
        })
        .filter(|tag| !tag.key.is_empty())
        .collect()
}

fn resolve(key: &str, tags: &[NormalizedTag]) -> TagMatch {
    if let Some(exact) = tags.iter().find(|tag| tag.key == key) {
        return TagMatch::Exact(exact.id);
    }
    let mut loose = tags.iter().filter(|tag| {
        allows_loose_match(key, &tag.key)
            && (tag.key.contains(key)
                || key.contains(tag.key.as_str())
                || is_subsequence(key, &tag.key)
                || is_subsequence(&tag.key, key))
    });
    match (loose.next(), loose.next()) {
        (Some(only), None) => TagMatch::Loose(only.id),
        _ => TagMatch::None,
    }
}

/// Clean and deduplicate analyzer tag suggestions, keeping first occurrences.
pub fn sanitize_tag_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for name in names {
        let cleaned = clean_tag_name(name.as_ref());
        let key = normalize_tag_name(&cleaned);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        result.push(cleaned);
    }
    result
}

/// Suggestions with no exact counterpart among `tags`, suitable for creation.
///
/// Only exact normalized matches count as known; names shorter than two
/// characters are never proposed.
pub fn unmatched_tag_names<S: AsRef<str>>(names: &[S], tags: &[UserTag]) -> Vec<String> {
    let sanitized = sanitize_tag_names(names);
    let known = normalized_tags(tags);
    if known.is_empty() {
        return sanitized;
    }
    sanitized
        .into_iter()
        .filter(|name| {
            let key = normalize_tag_name(name);
            char_len(&key) >= CREATE_MIN_LEN && !matches!(resolve(&key, &known), TagMatch::Exact(_))
        })
        .collect()
}

/// Map suggestions to tag ids, deduplicated, in order of first appearance.
pub fn map_tag_names_to_ids<S: AsRef<str>>(names: &[S], tags: &[UserTag]) -> Vec<TagId> {
    let known = normalized_tags(tags);
    if known.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for name in sanitize_tag_names(names) {
        let key = normalize_tag_name(&name);
        let id = match resolve(&key, &known) {
            TagMatch::Exact(id) | TagMatch::Loose(id) => id,
            TagMatch::None => continue,
        };
        if seen.insert(id) {
            ids.push(id);
        }
    }
    ids
}
