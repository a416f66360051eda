use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::phonetic;

pub const BROWSE_INTENT: &str = "browse";
pub const CAMERA_INTENT: &str = "camera:describe";
pub const IOT_INTENT: &str = "iot:read";
pub const NETWORK_INTENT: &str = "network:scan";

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://\S+|\bwww\.\S+|^[\w-]+(\.[\w-]+)*\.[a-z]{2,}(/\S*)?$)")
        .expect("url regex is valid")
});

pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A labelled text predicate. Rules are evaluated highest priority first and
/// the first match wins.
#[derive(Clone)]
pub struct IntentRule {
    pub intent: String,
    pub priority: i32,
    predicate: Predicate,
}

impl std::fmt::Debug for IntentRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRule")
            .field("intent", &self.intent)
            .field("priority", &self.priority)
            .finish()
    }
}

impl IntentRule {
    pub fn new<F>(intent: &str, priority: i32, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            intent: intent.to_string(),
            priority,
            predicate: Arc::new(predicate),
        }
    }

    /// Matches when any regex matches the raw text or any keyword occurs in
    /// the lower-cased text.
    pub fn keywords(intent: &str, priority: i32, keywords: &[&str], patterns: Vec<Regex>) -> Self {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        Self::new(intent, priority, move |text| {
            if patterns.iter().any(|p| p.is_match(text)) {
                return true;
            }
            let lower = text.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        (self.predicate)(text)
    }
}

/// Rules kept sorted by descending priority; ties keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct IntentRuleSet {
    rules: Vec<(u64, IntentRule)>,
    next_seq: u64,
}

impl IntentRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL detect, spoken-URL detect, per-domain keyword rules and the catch-all.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        for rule in builtin_rules() {
            set.push(rule);
        }
        set
    }

    pub fn push(&mut self, rule: IntentRule) {
        self.rules.push((self.next_seq, rule));
        self.next_seq += 1;
        self.rules
            .sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then(a.0.cmp(&b.0)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntentRule> {
        self.rules.iter().map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule with positive priority whose predicate accepts `text`,
    /// without checking whether anything can serve it.
    pub fn first_match(&self, text: &str) -> Option<&IntentRule> {
        self.iter().find(|r| r.priority > 0 && r.matches(text))
    }
}

fn builtin_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(BROWSE_INTENT, 100, |text| URL_PATTERN.is_match(text.trim())),
        IntentRule::new(BROWSE_INTENT, 90, phonetic::is_spoken_url),
        IntentRule::keywords(
            CAMERA_INTENT,
            70,
            &[
                "kamera", "kamerę", "kamery", "kamerze", "camera", "podgląd", "monitoring",
                "preview", "co widać", "what do you see", "nagranie",
            ],
            vec![Regex::new(r"(?i)\brtsp://").expect("rtsp regex is valid")],
        ),
        IntentRule::keywords(
            IOT_INTENT,
            60,
            &[
                "czujnik", "sensor", "temperatura", "temperature", "wilgotność", "humidity",
                "mqtt", "termometr", "thermostat",
            ],
            vec![],
        ),
        IntentRule::keywords(
            NETWORK_INTENT,
            60,
            &[
                "skanuj", "przeskanuj", "scan", "sieć", "sieci", "network", "urządzenia",
                "devices", "porty", "open ports", "discover",
            ],
            vec![Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(/\d{1,2})?\b")
                .expect("ip regex is valid")],
        ),
        // Catch-all: priority 0 never counts as a match, so detection falls
        // through to the classifier / default.
        IntentRule::new(vigil_core::SEARCH_INTENT, 0, |_| true),
    ]
}

/// Camera-like intents produce "scene changed" records rather than "content changed".
pub fn is_camera_intent(intent: &str) -> bool {
    intent.starts_with("camera") || intent.contains(":camera") || intent.contains("vision")
}
