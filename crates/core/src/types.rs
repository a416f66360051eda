use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fallback intent when nothing more specific applies.
pub const SEARCH_INTENT: &str = "search";

/// Where a query came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    Text,
    Voice,
    /// Re-issued by the change reconciler
    Watch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub timestamp_ms: i64,
    pub origin: QueryOrigin,
    pub locale: String,
}

/// A structured request handed to an integration.
///
/// Built once through the consuming `with_*` methods and then only ever
/// passed around by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub intent: String,
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    pub metadata: QueryMetadata,
}

impl Query {
    pub fn new(intent: &str, raw_text: &str) -> Self {
        Self {
            intent: intent.to_string(),
            raw_text: raw_text.to_string(),
            target: None,
            params: HashMap::new(),
            metadata: QueryMetadata {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                origin: QueryOrigin::Text,
                locale: "en-US".to_string(),
            },
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_origin(mut self, origin: QueryOrigin) -> Self {
        self.metadata.origin = origin;
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.metadata.locale = locale.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Partial,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Html,
    Image,
    Stream,
    Structured,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    pub kind: ContentKind,
    /// Text/markup for text-like kinds, a URL or base64 payload for images and
    /// streams, serialized JSON for structured content.
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ContentBlock {
    pub fn new(kind: ContentKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            title: None,
            summary: None,
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::new(ContentKind::Text, data)
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub latency_ms: u64,
    pub cached: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub integration_id: String,
    pub status: ResultStatus,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub metadata: ResultMetadata,
}

impl QueryResult {
    pub fn success(integration_id: &str, content: Vec<ContentBlock>) -> Self {
        Self {
            integration_id: integration_id.to_string(),
            status: ResultStatus::Success,
            content,
            metadata: ResultMetadata::default(),
        }
    }

    /// A terminal error result carrying a single text block with `message`.
    pub fn error(integration_id: &str, message: &str) -> Self {
        Self {
            integration_id: integration_id.to_string(),
            status: ResultStatus::Error,
            content: vec![ContentBlock::text(message)],
            metadata: ResultMetadata::default(),
        }
    }

    pub fn with_status(mut self, status: ResultStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }

    /// All text blocks joined by newlines, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == ContentKind::Text)
            .map(|b| b.data.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
