//! Frequency-based keyword extraction
//!
//! Lowercased alphabetic words within the configured length bounds, minus a
//! fixed English stop-word list, ranked by frequency. Ties keep the order in
//! which the words first appear.

use crate::settings::Settings;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Common English function words, including contracted forms
pub static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    "a about above after again against all am an and any are aren't as at be because \
     been before being below between both but by can't cannot could couldn't did didn't \
     do does doesn't doing don't down during each few for from further had hadn't has \
     hasn't have haven't having he he'd he'll he's her here here's hers herself him \
     himself his how how's i i'd i'll i'm i've if in into is isn't it it's its itself \
     let's me more most mustn't my myself no nor not of off on once only or other \
     ought our ours ourselves out over own same shan't she she'd she'll she's should \
     shouldn't so some such than that that's the their theirs them themselves then there \
     there's these they they'd they'll they're they've this those through to too under \
     until up very was wasn't we we'd we'll we're we've were weren't what what's when \
     when's where where's which while who who's whom why why's with won't would \
     wouldn't you you'd you'll you're you've your yours yourself yourselves"
        .split_whitespace()
        .collect()
});

/// Top keywords of `text` using the configured bounds and count
pub fn extract_keywords(text: &str, settings: &Settings) -> Vec<String> {
    extract_keywords_with(
        text,
        settings.keyword_count,
        settings.keyword_min_len,
        settings.keyword_max_len,
        &STOP_WORDS,
    )
}

pub fn extract_keywords_with(
    text: &str,
    count: usize,
    min_len: usize,
    max_len: usize,
    stop_words: &HashSet<&str>,
) -> Vec<String> {
    let lower = text.to_lowercase();

    // (first-seen order, frequency)
    let mut order: Vec<&str> = Vec::new();
    let mut freq: HashMap<&str, usize> = HashMap::new();

    for m in WORD_RE.find_iter(&lower) {
        let word = m.as_str();
        let len = word.chars().count();
        if len < min_len || len > max_len {
            continue;
        }
        if !word.chars().all(char::is_alphabetic) || stop_words.contains(word) {
            continue;
        }
        let n = freq.entry(word).or_insert(0);
        if *n == 0 {
            order.push(word);
        }
        *n += 1;
    }

    // sort_by is stable, so equal counts stay in first-seen order
    order.sort_by(|a, b| freq[b].cmp(&freq[a]));
    order.into_iter().take(count).map(str::to_string).collect()
}
