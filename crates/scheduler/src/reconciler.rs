use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_agent::{is_camera_intent, IntentRouter};
use vigil_core::{
    safe_truncate, ChangeKind, ChangeRecord, EventBus, Query, QueryOrigin, ReconcilerConfig,
    Result, Severity, Snapshot, SnapshotStore, WatchEvent, WatchRule,
};

use crate::coordinator::WatchCoordinator;
use crate::diff::{change_ratio, fingerprint};
use crate::timer::FireSchedule;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Keeps every active watch rule polled on its own cadence and turns content
/// drift into change records.
///
/// One loop task owns the fire schedule. Polls run as spawned tasks and report
/// back over a channel; a rule whose previous poll has not finished skips its
/// slot.
///
/// A reconciler runs once: after its loop exits (shutdown or `stop`) it stays
/// stopped, and a later `run_loop` returns immediately. Build a new one to
/// restart polling.
pub struct ChangeReconciler {
    router: Arc<IntentRouter>,
    coordinator: Arc<WatchCoordinator>,
    snapshots: Arc<dyn SnapshotStore>,
    config: ReconcilerConfig,
    cancel: CancellationToken,
}

/// State owned by the dispatch loop.
struct LoopState {
    schedule: FireSchedule,
    rules: HashMap<String, WatchRule>,
    done_tx: mpsc::UnboundedSender<String>,
}

impl ChangeReconciler {
    pub fn new(
        router: Arc<IntentRouter>,
        coordinator: Arc<WatchCoordinator>,
        snapshots: Arc<dyn SnapshotStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            router,
            coordinator,
            snapshots,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn events(&self) -> &Arc<EventBus<WatchEvent>> {
        self.coordinator.events()
    }

    /// Stops the loop. Polls already running finish but drop their results.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.cancel.is_cancelled() {
            debug!("ChangeReconciler already stopped, not starting");
            return;
        }
        info!(tick_ms = self.config.tick_interval_ms, "ChangeReconciler started");

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();
        let mut state = LoopState {
            schedule: FireSchedule::new(),
            rules: HashMap::new(),
            done_tx,
        };
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));

        loop {
            let next_fire = state.schedule.next_due();
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.reconcile(&mut state).await {
                        error!(error = %e, "Reconciliation tick failed");
                    }
                }
                _ = sleep_until(next_fire) => {
                    self.fire_due(&mut state);
                }
                Some(rule_id) = done_rx.recv() => {
                    state.schedule.finish(&rule_id);
                }
                _ = shutdown.recv() => {
                    info!("ChangeReconciler shutting down");
                    break;
                }
                _ = self.cancel.cancelled() => {
                    info!("ChangeReconciler stopped");
                    break;
                }
            }
        }

        self.cancel.cancel();
        if state.schedule.in_flight_count() > 0 {
            debug!(
                in_flight = state.schedule.in_flight_count(),
                "Discarding results of polls still in flight"
            );
        }
        state.schedule.clear();
        state.rules.clear();
    }

    /// Aligns the schedule with the active rule set: new rules are due
    /// immediately, rules that left the set are cancelled.
    async fn reconcile(&self, state: &mut LoopState) -> Result<()> {
        let active = self.coordinator.get_active_watches().await?;
        let now = Instant::now();

        let ids: HashSet<String> = active.iter().map(|r| r.id.clone()).collect();
        for rule_id in state.schedule.retain(|id| ids.contains(id)) {
            debug!(rule = %rule_id, "Unscheduling inactive watch");
        }

        for rule in &active {
            if !state.schedule.contains(&rule.id) {
                debug!(rule = %rule.id, endpoint = %rule.endpoint_id, "Scheduling watch");
                state
                    .schedule
                    .schedule(&rule.id, Duration::from_millis(rule.interval_ms), now);
            }
        }

        state.rules = active.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(())
    }

    fn fire_due(self: &Arc<Self>, state: &mut LoopState) {
        let now = Instant::now();
        let now_ms = Utc::now().timestamp_millis();

        while let Some(due) = state.schedule.pop_due(now) {
            let Some(rule) = state.rules.get(&due.rule_id) else {
                state.schedule.cancel(&due.rule_id);
                continue;
            };

            // Rows from older stores may carry a zero interval
            let interval = due.interval.max(MIN_INTERVAL);
            // Late slots are not replayed
            let mut next = due.fire_at + interval;
            if next <= now {
                next = now + interval;
            }
            state.schedule.schedule(&due.rule_id, interval, next);

            if rule.is_expired(now_ms) {
                // The next tick sweeps it
                continue;
            }
            if state.schedule.is_in_flight(&due.rule_id) {
                debug!(endpoint = %rule.endpoint_id, "Previous poll still running, skipping slot");
                continue;
            }

            state.schedule.mark_in_flight(&due.rule_id);
            let this = Arc::clone(self);
            let rule = rule.clone();
            let done_tx = state.done_tx.clone();
            tokio::spawn(async move {
                this.poll_once(&rule).await;
                let _ = done_tx.send(rule.id);
            });
        }
    }

    /// Polls one rule, converting any failure into a `PollError` event.
    pub async fn poll_once(&self, rule: &WatchRule) -> Option<ChangeRecord> {
        match self.poll_rule(rule).await {
            Ok(record) => record,
            Err(e) => {
                if self.cancel.is_cancelled() {
                    return None;
                }
                warn!(endpoint = %rule.endpoint_id, error = %e, "Watch poll failed");
                self.events().publish(&WatchEvent::PollError {
                    endpoint_id: rule.endpoint_id.clone(),
                    message: e.to_string(),
                    at_ms: Utc::now().timestamp_millis(),
                });
                None
            }
        }
    }

    async fn poll_rule(&self, rule: &WatchRule) -> Result<Option<ChangeRecord>> {
        let query = Query::new(&rule.intent, &rule.query_text)
            .with_origin(QueryOrigin::Watch)
            .with_target(&rule.endpoint_id);
        let result = self.router.route(&query).await;

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        if result.is_error() {
            debug!(endpoint = %rule.endpoint_id, "Poll returned an error result, skipping");
            return Ok(None);
        }

        let text = result.text();
        let new_fp = fingerprint(&text, self.config.fingerprint);
        let stored = safe_truncate(&text, self.config.max_snapshot_chars);

        let previous = self.snapshots.latest_snapshot(&rule.endpoint_id).await?;
        self.snapshots
            .save_snapshot(Snapshot::new(&rule.endpoint_id, &new_fp, stored, text.len()))
            .await?;
        let now_ms = Utc::now().timestamp_millis();
        self.coordinator.record_poll(&rule.id, now_ms).await?;

        let Some(previous) = previous else {
            debug!(endpoint = %rule.endpoint_id, "First snapshot captured");
            return Ok(None);
        };
        if previous.fingerprint == new_fp {
            return Ok(None);
        }

        let ratio = change_ratio(&previous.text, stored);
        if ratio < self.config.change_threshold {
            debug!(endpoint = %rule.endpoint_id, ratio, "Change below threshold");
            return Ok(None);
        }

        let severity = Severity::from_ratio(ratio);
        let kind = if is_camera_intent(&rule.intent) {
            ChangeKind::SceneChanged
        } else {
            ChangeKind::ContentChanged
        };
        let record = ChangeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: rule.endpoint_id.clone(),
            kind,
            description: format!(
                "{} on {}: {:.0}% of words differ",
                kind.as_str().replace('_', " "),
                rule.endpoint_id,
                ratio * 100.0
            ),
            old_fingerprint: Some(previous.fingerprint),
            new_fingerprint: new_fp,
            severity,
            detected_at_ms: now_ms,
            acknowledged: false,
        };
        self.snapshots.save_change(record.clone()).await?;

        let preview = self.preview(rule, &text).await;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        info!(
            endpoint = %rule.endpoint_id,
            severity = %severity,
            ratio,
            "Change detected"
        );
        self.events().publish(&WatchEvent::ChangeDetected {
            record: record.clone(),
            preview,
        });
        Ok(Some(record))
    }

    /// Scene description for camera-like rules when the integration offers
    /// one, otherwise the head of the new text.
    async fn preview(&self, rule: &WatchRule, text: &str) -> Option<String> {
        if is_camera_intent(&rule.intent) {
            if let Some(integration) = self.router.registry().get(&rule.integration_id).await {
                if let Some(describer) = integration.as_scene_describer() {
                    match describer.describe_scene(&rule.endpoint_id).await {
                        Ok(description) => return Some(description),
                        Err(e) => debug!(error = %e, "Scene description failed"),
                    }
                }
            }
        }

        let head = safe_truncate(text, self.config.preview_chars);
        (!head.is_empty()).then(|| head.to_string())
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
