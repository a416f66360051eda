use serde::{Deserialize, Serialize};

/// A time-bounded subscription binding an endpoint to a query and a polling cadence.
///
/// Rules are never deleted. Stopping, evicting, re-arming and expiring all
/// flip `active` to false so the history stays queryable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchRule {
    pub id: String,
    pub endpoint_id: String,
    pub intent: String,
    pub query_text: String,
    pub integration_id: String,
    pub interval_ms: u64,
    pub expires_at_ms: i64,
    pub active: bool,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_polled_at_ms: Option<i64>,
}

impl WatchRule {
    pub fn new(
        endpoint_id: &str,
        intent: &str,
        query_text: &str,
        integration_id: &str,
        interval_ms: u64,
        expires_at_ms: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: endpoint_id.to_string(),
            intent: intent.to_string(),
            query_text: query_text.to_string(),
            integration_id: integration_id.to_string(),
            interval_ms,
            expires_at_ms,
            active: true,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            last_polled_at_ms: None,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }

    /// Active and still inside its time window.
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.active && !self.is_expired(now_ms)
    }
}

/// Point-in-time capture of an endpoint's content, used as the diff baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub endpoint_id: String,
    pub fingerprint: String,
    /// Comparison text, truncated before storage
    pub text: String,
    /// Byte length of the untruncated text
    pub size: usize,
    pub captured_at_ms: i64,
}

impl Snapshot {
    pub fn new(endpoint_id: &str, fingerprint: &str, text: &str, size: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: endpoint_id.to_string(),
            fingerprint: fingerprint.to_string(),
            text: text.to_string(),
            size,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ContentChanged,
    StatusChanged,
    NewCapability,
    WentOffline,
    CameOnline,
    SceneChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::ContentChanged => "content_changed",
            ChangeKind::StatusChanged => "status_changed",
            ChangeKind::NewCapability => "new_capability",
            ChangeKind::WentOffline => "went_offline",
            ChangeKind::CameOnline => "came_online",
            ChangeKind::SceneChanged => "scene_changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content_changed" => Some(ChangeKind::ContentChanged),
            "status_changed" => Some(ChangeKind::StatusChanged),
            "new_capability" => Some(ChangeKind::NewCapability),
            "went_offline" => Some(ChangeKind::WentOffline),
            "came_online" => Some(ChangeKind::CameOnline),
            "scene_changed" => Some(ChangeKind::SceneChanged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Alert,
}

impl Severity {
    /// >0.5 alert, >0.3 warning, everything else info.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.5 {
            Severity::Alert
        } else if ratio > 0.3 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Alert => "alert",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "alert" => Some(Severity::Alert),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: String,
    pub endpoint_id: String,
    pub kind: ChangeKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: String,
    pub severity: Severity,
    pub detected_at_ms: i64,
    #[serde(default)]
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop request for the endpoint
    Manual,
    /// Dropped to make room under the active-watch ceiling
    Evicted,
}

/// Everything the watch subsystem tells the outside world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    RuleCreated {
        rule: WatchRule,
    },
    /// The rule ran out of time.
    RuleExpired {
        rule: WatchRule,
    },
    RuleStopped {
        rule: WatchRule,
        reason: StopReason,
        at_ms: i64,
    },
    ChangeDetected {
        record: ChangeRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview: Option<String>,
    },
    PollError {
        endpoint_id: String,
        message: String,
        at_ms: i64,
    },
}

impl WatchEvent {
    pub fn endpoint_id(&self) -> &str {
        match self {
            WatchEvent::RuleCreated { rule }
            | WatchEvent::RuleExpired { rule }
            | WatchEvent::RuleStopped { rule, .. } => &rule.endpoint_id,
            WatchEvent::ChangeDetected { record, .. } => &record.endpoint_id,
            WatchEvent::PollError { endpoint_id, .. } => endpoint_id,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            WatchEvent::RuleCreated { rule } => rule.created_at_ms,
            WatchEvent::RuleExpired { rule } => rule.expires_at_ms,
            WatchEvent::RuleStopped { at_ms, .. } => *at_ms,
            WatchEvent::ChangeDetected { record, .. } => record.detected_at_ms,
            WatchEvent::PollError { at_ms, .. } => *at_ms,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::RuleCreated { .. } => "rule_created",
            WatchEvent::RuleExpired { .. } => "rule_expired",
            WatchEvent::RuleStopped { .. } => "rule_stopped",
            WatchEvent::ChangeDetected { .. } => "change_detected",
            WatchEvent::PollError { .. } => "poll_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_ratio(0.9), Severity::Alert);
        assert_eq!(Severity::from_ratio(0.5), Severity::Warning);
        assert_eq!(Severity::from_ratio(1.0 / 3.0), Severity::Warning);
        assert_eq!(Severity::from_ratio(0.3), Severity::Info);
        assert_eq!(Severity::from_ratio(0.15), Severity::Info);
    }

    #[test]
    fn test_rule_liveness() {
        let rule = WatchRule::new("cam-1", "camera:describe", "kamera", "rtsp", 3000, 1_000);
        assert!(rule.active);
        assert!(rule.is_live(999));
        assert!(!rule.is_live(1_000));
    }

    #[test]
    fn test_event_tagging() {
        let event = WatchEvent::PollError {
            endpoint_id: "https://example.com".to_string(),
            message: "timeout".to_string(),
            at_ms: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "poll_error");
        assert_eq!(event.endpoint_id(), "https://example.com");
        assert_eq!(event.timestamp_ms(), 42);
        assert_eq!(event.kind(), "poll_error");
    }

    #[test]
    fn test_kind_string_roundtrip() {
        assert_eq!(ChangeKind::from_str(ChangeKind::SceneChanged.as_str()), Some(ChangeKind::SceneChanged));
        assert_eq!(Severity::from_str("alert"), Some(Severity::Alert));
        assert_eq!(Severity::from_str("bogus"), None);
    }
}
