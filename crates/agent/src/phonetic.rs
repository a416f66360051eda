//! Spoken-address normalization.
//!
//! Speech recognition hands us phrases like "onet kropka pe el" or
//! "github dot kom"; this module turns them into "onet.pl" / "github.com".
//! Matching works on whole words so ordinary words that merely contain a
//! spoken token ("what" contains "at") are left alone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spoken phrase → replacement. Longer phrases win over their prefixes.
const PHONETIC_RULES: &[(&str, &str)] = &[
    // Protocol prefixes
    ("ha te te pe es dwa kropki slash slash", "https://"),
    ("ha te te pe dwa kropki slash slash", "http://"),
    ("https dwa kropki slash slash", "https://"),
    ("http dwa kropki slash slash", "http://"),
    ("ha te te pe es", "https"),
    ("ha te te pe", "http"),
    // Separators
    ("kropka", "."),
    ("dot", "."),
    ("dott", "."),
    ("ukośnik", "/"),
    ("slash", "/"),
    ("slasz", "/"),
    ("małpa", "@"),
    ("at", "@"),
    ("myślnik", "-"),
    ("dash", "-"),
    ("tire", "-"),
    ("podkreślnik", "_"),
    ("underscore", "_"),
    ("dwukropek", ":"),
    ("colon", ":"),
    // www
    ("trzy w", "www"),
    ("wuwuwu", "www"),
    ("wu wu wu", "www"),
    // TLDs; the dot comes from "kropka"/"dot"
    ("pe el", "pl"),
    ("pe-el", "pl"),
    ("peel", "pl"),
    ("kom", "com"),
    ("de i", "dev"),
    ("dei", "dev"),
    ("o er ge", "org"),
    ("oerge", "org"),
    ("ju es", "us"),
    ("ju kej", "uk"),
    ("de e", "de"),
    ("i u", "eu"),
    ("ie u", "eu"),
];

/// Tokens that mark the input as spelled-out address rather than prose.
const SEPARATORS: &[&str] = &[".", "/", "@", "-", "_", ":", "https://", "http://"];

static URL_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?[\w.-]+\.\w{2,}").expect("url-like regex is valid")
});

/// Rules split into word sequences, longest phrase first.
static SORTED_RULES: Lazy<Vec<(Vec<&'static str>, &'static str)>> = Lazy::new(|| {
    let mut rules: Vec<(Vec<&'static str>, &'static str)> = PHONETIC_RULES
        .iter()
        .map(|(spoken, replacement)| (spoken.split(' ').collect(), *replacement))
        .collect();
    rules.sort_by(|a, b| {
        b.0.len()
            .cmp(&a.0.len())
            .then_with(|| b.0.join(" ").len().cmp(&a.0.join(" ").len()))
    });
    rules
});

/// Result of normalizing a spoken phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// At least one separator (dot, slash, ...) was spoken out
    pub had_separator: bool,
}

pub fn normalize(text: &str) -> Normalized {
    let lowered = text.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(words.len());
    let mut had_separator = false;

    let mut i = 0;
    while i < words.len() {
        let hit = SORTED_RULES.iter().find(|(phrase, _)| {
            i + phrase.len() <= words.len() && words[i..i + phrase.len()] == phrase[..]
        });
        match hit {
            Some((phrase, replacement)) => {
                if SEPARATORS.contains(replacement) {
                    had_separator = true;
                }
                out.push(replacement.to_string());
                i += phrase.len();
            }
            None => {
                out.push(words[i].to_string());
                i += 1;
            }
        }
    }

    let mut joined = out.concat();
    while joined.contains("..") {
        joined = joined.replace("..", ".");
    }
    let text = joined.trim_end_matches('.').to_string();

    Normalized { text, had_separator }
}

/// Whether `text` looks like a URL or bare domain.
pub fn looks_like_url(text: &str) -> bool {
    URL_LIKE.is_match(text)
}

/// Spoken-out address that normalizes into something URL-like.
pub fn is_spoken_url(text: &str) -> bool {
    let normalized = normalize(text);
    normalized.had_separator && looks_like_url(&normalized.text)
}
