use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::phonetic;

static EXPLICIT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("explicit url regex is valid"));
static BARE_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+\.\w{2,}").expect("bare domain regex is valid"));
static SCHEME_OR_WWW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://|www\.)").expect("scheme regex is valid"));

const AUTO_ACCEPT_SCORE: f64 = 0.80;
const MAX_SUGGESTIONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Exact,
    Fuzzy,
    Search,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub url: Option<String>,
    pub suggestions: Vec<String>,
    pub kind: ResolutionKind,
    pub normalized: String,
}

impl Resolution {
    pub fn needs_clarification(&self) -> bool {
        self.kind == ResolutionKind::Ambiguous
    }
}

/// Turns typed or spoken input into a browseable URL.
///
/// Order: explicit URL, bare domain, spoken-address normalization, fuzzy match
/// against known domains, and finally a search URL.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    known_domains: Vec<String>,
    threshold: f64,
}

impl TargetResolver {
    pub fn new(known_domains: Vec<String>, threshold: f64) -> Self {
        Self { known_domains, threshold }
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        let text = raw.trim();
        if text.is_empty() {
            return Resolution {
                url: None,
                suggestions: vec![],
                kind: ResolutionKind::Ambiguous,
                normalized: String::new(),
            };
        }

        if EXPLICIT_URL.is_match(text) {
            return exact(text.to_string(), text);
        }

        if BARE_DOMAIN.is_match(text) && !text.contains(char::is_whitespace) {
            return exact(format!("https://{}", text), text);
        }

        let normalized = phonetic::normalize(text);
        if normalized.had_separator && phonetic::looks_like_url(&normalized.text) {
            let url = if EXPLICIT_URL.is_match(&normalized.text) {
                normalized.text.clone()
            } else {
                format!("https://{}", normalized.text)
            };
            let suggestions = self
                .fuzzy_match(&normalized.text)
                .into_iter()
                .filter(|(d, _)| *d != normalized.text)
                .map(|(d, _)| format!("https://{}", d))
                .take(3)
                .collect();
            return Resolution {
                url: Some(url),
                suggestions,
                kind: ResolutionKind::Fuzzy,
                normalized: normalized.text,
            };
        }

        let fuzzy = self.fuzzy_match(text);
        if let Some((_, best_score)) = fuzzy.first() {
            let all: Vec<String> = fuzzy.iter().map(|(d, _)| format!("https://{}", d)).collect();
            if *best_score > AUTO_ACCEPT_SCORE {
                return Resolution {
                    url: Some(all[0].clone()),
                    suggestions: all.iter().skip(1).take(3).cloned().collect(),
                    kind: ResolutionKind::Fuzzy,
                    normalized: text.to_string(),
                };
            }
            return Resolution {
                url: None,
                suggestions: all.into_iter().take(5).collect(),
                kind: ResolutionKind::Ambiguous,
                normalized: text.to_string(),
            };
        }

        Resolution {
            url: Some(format!("https://duckduckgo.com/?q={}", urlencoding::encode(text))),
            suggestions: vec![],
            kind: ResolutionKind::Search,
            normalized: text.to_string(),
        }
    }

    /// Known domains scoring at least the threshold, best first.
    pub fn fuzzy_match(&self, input: &str) -> Vec<(String, f64)> {
        let lowered = input.trim().to_lowercase();
        let stripped = SCHEME_OR_WWW.replace(&lowered, "");
        let cleaned = stripped.split('/').next().unwrap_or("");

        let mut matches: Vec<(String, f64)> = self
            .known_domains
            .iter()
            .map(|d| (d.clone(), similarity(cleaned, d)))
            .filter(|(_, score)| *score >= self.threshold)
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(MAX_SUGGESTIONS);
        matches
    }
}

fn exact(url: String, input: &str) -> Resolution {
    Resolution {
        url: Some(url),
        suggestions: vec![],
        kind: ResolutionKind::Exact,
        normalized: input.to_string(),
    }
}

/// `2·LCS / (|a| + |b|)` over chars; 1.0 for identical strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];
    (2 * lcs) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TargetResolver {
        TargetResolver::new(
            vec!["onet.pl".to_string(), "github.com".to_string(), "wikipedia.org".to_string()],
            0.55,
        )
    }

    #[test]
    fn test_exact_url_and_domain() {
        let r = resolver();
        let res = r.resolve("https://example.com/a");
        assert_eq!(res.kind, ResolutionKind::Exact);
        assert_eq!(res.url.as_deref(), Some("https://example.com/a"));

        let res = r.resolve("example.com");
        assert_eq!(res.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_spoken_domain() {
        let res = resolver().resolve("onet kropka pe el");
        assert_eq!(res.kind, ResolutionKind::Fuzzy);
        assert_eq!(res.url.as_deref(), Some("https://onet.pl"));
        assert!(!res.suggestions.contains(&"https://onet.pl".to_string()));
    }

    #[test]
    fn test_fuzzy_typo() {
        let res = resolver().resolve("githab.com ");
        // A bare domain is taken literally even when it is a typo
        assert_eq!(res.kind, ResolutionKind::Exact);

        let res = resolver().resolve("githubcom");
        assert_eq!(res.kind, ResolutionKind::Fuzzy);
        assert_eq!(res.url.as_deref(), Some("https://github.com"));
    }

    #[test]
    fn test_search_fallback() {
        let res = resolver().resolve("best pierogi recipe");
        assert_eq!(res.kind, ResolutionKind::Search);
        assert_eq!(
            res.url.as_deref(),
            Some("https://duckduckgo.com/?q=best%20pierogi%20recipe")
        );
    }

    #[test]
    fn test_empty_is_ambiguous() {
        let res = resolver().resolve("   ");
        assert!(res.needs_clarification());
        assert!(res.url.is_none());
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert!((similarity("githubcom", "github.com") - 18.0 / 19.0).abs() < 1e-9);
    }
}
