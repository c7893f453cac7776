//! Highlighted fragment extraction for search hits.
//!
//! Works on whitespace-separated words of an item's full text:
//!
//! 1. A word matches when its lower-cased alphanumeric form shares a
//!    [`light_stem`] with one of the query terms.
//! 2. Consecutive matches are grouped into covers spanning at most
//!    `max_words` words.
//! 3. The `max_fragments` covers with the most matches are padded with
//!    context up to `min_words`, short words are trimmed from their edges,
//!    and they are rendered in document order with matches wrapped in
//!    `<b>`/`</b>`.
//!
//! [`snippets`] returns the fragments as a list; [`headline`] joins them
//! with [`FRAGMENT_DELIMITER`].

use crate::config::SearchConfig;

pub const FRAGMENT_DELIMITER: &str = "||||";

const START_SEL: &str = "<b>";
const STOP_SEL: &str = "</b>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetOptions {
    pub max_words: usize,
    pub min_words: usize,
    pub short_word: usize,
    pub max_fragments: usize,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SnippetOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_words: config.max_words,
            min_words: config.min_words,
            short_word: config.short_word,
            max_fragments: config.max_fragments,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cover {
    start: usize,
    end: usize,
    matches: usize,
}

/// Snippet fragments for `text`, one string per fragment.
///
/// Words containing [`FRAGMENT_DELIMITER`] (OCR column rules, mostly) are
/// skipped, so no fragment ever contains it.
pub fn snippets(text: &str, terms: &[String], opts: &SnippetOptions) -> Vec<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| !w.contains(FRAGMENT_DELIMITER))
        .collect();
    if words.is_empty() {
        return Vec::new();
    }

    let stems: Vec<String> = terms
        .iter()
        .map(|t| light_stem(&fold(t)))
        .filter(|s| !s.is_empty())
        .collect();

    let matched: Vec<bool> = words
        .iter()
        .map(|w| {
            let folded = fold(w);
            !folded.is_empty() && stems.contains(&light_stem(&folded))
        })
        .collect();

    let positions: Vec<usize> = (0..words.len()).filter(|&i| matched[i]).collect();
    if positions.is_empty() {
        let end = opts.min_words.max(1).min(words.len());
        return vec![words[..end].join(" ")];
    }

    let mut chosen = select_covers(&positions, opts);
    chosen.sort_by_key(|c| c.start);

    let mut fragments = Vec::with_capacity(chosen.len());
    let mut prev_end: Option<usize> = None;
    for (i, cover) in chosen.iter().enumerate() {
        let lower = prev_end.map(|e| e + 1).unwrap_or(0);
        let upper = chosen
            .get(i + 1)
            .map(|next| next.start - 1)
            .unwrap_or(words.len() - 1);

        let (start, end) = pad(cover, lower, upper, opts.min_words);
        prev_end = Some(end);
        let (start, end) = trim_short_edges(&words, &matched, start, end, opts.short_word);
        fragments.push(render(&words[start..=end], &matched[start..=end]));
    }

    fragments
}

/// All fragments of `text` joined by [`FRAGMENT_DELIMITER`].
pub fn headline(text: &str, terms: &[String], opts: &SnippetOptions) -> String {
    snippets(text, terms, opts).join(FRAGMENT_DELIMITER)
}

/// Group match positions into covers, then keep the best `max_fragments`.
fn select_covers(positions: &[usize], opts: &SnippetOptions) -> Vec<Cover> {
    let span = opts.max_words.max(1);
    let mut covers: Vec<Cover> = Vec::new();

    for &pos in positions {
        match covers.last_mut() {
            Some(cover) if pos - cover.start < span => {
                cover.end = pos;
                cover.matches += 1;
            }
            _ => covers.push(Cover {
                start: pos,
                end: pos,
                matches: 1,
            }),
        }
    }

    covers.sort_by(|a, b| b.matches.cmp(&a.matches).then(a.start.cmp(&b.start)));
    covers.truncate(opts.max_fragments.max(1));
    covers
}

/// Widen a cover to `min_words`, split evenly around it within `[lower, upper]`.
fn pad(cover: &Cover, lower: usize, upper: usize, min_words: usize) -> (usize, usize) {
    let len = cover.end - cover.start + 1;
    if len >= min_words {
        return (cover.start, cover.end);
    }

    let missing = min_words - len;
    let room_before = cover.start - lower;
    let room_after = upper - cover.end;

    let mut before = (missing / 2).min(room_before);
    let after = (missing - before).min(room_after);
    // Give anything the right side could not take back to the left.
    before = (before + (missing - before - after)).min(room_before);

    (cover.start - before, cover.end + after)
}

fn trim_short_edges(
    words: &[&str],
    matched: &[bool],
    mut start: usize,
    mut end: usize,
    short_word: usize,
) -> (usize, usize) {
    let is_short = |i: usize| !matched[i] && words[i].chars().count() <= short_word;
    while start < end && is_short(start) {
        start += 1;
    }
    while end > start && is_short(end) {
        end -= 1;
    }
    (start, end)
}

fn render(words: &[&str], matched: &[bool]) -> String {
    let mut out = String::new();
    for (i, (word, hit)) in words.iter().zip(matched).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if *hit {
            out.push_str(START_SEL);
            out.push_str(word);
            out.push_str(STOP_SEL);
        } else {
            out.push_str(word);
        }
    }
    out
}

/// Lower-cased alphanumeric characters of `word`.
fn fold(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip one common English suffix, keeping at least three characters.
pub fn light_stem(word: &str) -> String {
    const SUFFIXES: [&str; 5] = ["ing", "ed", "ly", "es", "s"];

    let mut stem = word;
    for suffix in SUFFIXES {
        if let Some(rest) = word.strip_suffix(suffix) {
            if rest.chars().count() >= 3 && !(suffix == "s" && rest.ends_with('s')) {
                stem = rest;
                break;
            }
        }
    }

    match stem.strip_suffix('e') {
        Some(rest) if rest.chars().count() >= 3 => rest.to_string(),
        _ => stem.to_string(),
    }
}
