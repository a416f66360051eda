use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use vigil_core::{
    Integration, IntentClassifier, Query, QueryOrigin, QueryResult, RouterConfig, SEARCH_INTENT,
};

use crate::intent::{IntentRule, IntentRuleSet, BROWSE_INTENT};
use crate::registry::CapabilityRegistry;
use crate::resolver::TargetResolver;

/// Integration id stamped on results the router produces itself.
pub const ROUTER_ID: &str = "router";

/// Resolves free text to an intent and dispatches queries with ordered
/// fallback across every integration that claims the intent.
pub struct IntentRouter {
    registry: Arc<CapabilityRegistry>,
    rules: IntentRuleSet,
    classifier: Option<Arc<dyn IntentClassifier>>,
    resolver: TargetResolver,
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(registry: Arc<CapabilityRegistry>, config: RouterConfig) -> Self {
        let resolver = TargetResolver::new(config.known_domains.clone(), config.fuzzy_threshold);
        Self {
            registry,
            rules: IntentRuleSet::builtin(),
            classifier: None,
            resolver,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Appends an integration-supplied rule; the set is re-sorted.
    pub fn add_rule(&mut self, rule: IntentRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &IntentRuleSet {
        &self.rules
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn is_sandboxed(&self) -> bool {
        self.config.sandboxed
    }

    /// Text → intent.
    ///
    /// A rule match only counts when some available integration claims the
    /// intent; otherwise scanning continues with lower-priority rules, then
    /// the classifier, then `search`.
    pub async fn detect_intent(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return SEARCH_INTENT.to_string();
        }

        for rule in self.rules.iter() {
            if rule.priority <= 0 || !rule.matches(text) {
                continue;
            }
            if self.registry.has_available(&rule.intent, self.config.sandboxed).await {
                debug!(intent = %rule.intent, priority = rule.priority, "Intent matched by rule");
                return rule.intent.clone();
            }
            debug!(intent = %rule.intent, "Rule matched but no integration serves it, falling through");
        }

        if let Some(classifier) = &self.classifier {
            match classifier.detect(text).await {
                Ok(intent) => {
                    if self.registry.has_available(&intent, self.config.sandboxed).await {
                        debug!(intent = %intent, "Intent suggested by classifier");
                        return intent;
                    }
                    debug!(intent = %intent, "Classifier suggestion has no integration");
                }
                Err(e) => {
                    debug!(error = %e, "Classifier failed, ignoring");
                }
            }
        }

        SEARCH_INTENT.to_string()
    }

    /// Detects the intent and builds the query, resolving a target for it.
    pub async fn build_query(&self, text: &str, origin: QueryOrigin) -> Query {
        let intent = self.detect_intent(text).await;
        let trimmed = text.trim();

        let mut query = Query::new(&intent, text)
            .with_origin(origin)
            .with_locale(&self.config.locale);

        if intent == BROWSE_INTENT {
            let resolution = self.resolver.resolve(trimmed);
            if let Some(url) = resolution.url {
                query = query.with_target(url);
            }
            if !resolution.suggestions.is_empty() {
                query = query.with_param("suggestions", serde_json::json!(resolution.suggestions));
            }
        } else if !trimmed.is_empty() {
            query = query.with_target(trimmed);
        }
        query
    }

    /// Tries every available candidate for `query.intent` in priority order.
    ///
    /// Never fails: unroutable intents and exhausted fallback chains come back
    /// as results with [`ResultStatus::Error`](vigil_core::ResultStatus::Error).
    pub async fn route(&self, query: &Query) -> QueryResult {
        let candidates = self
            .registry
            .lookup_available(&query.intent, self.config.sandboxed)
            .await;

        if candidates.is_empty() {
            warn!(intent = %query.intent, "No integration for intent");
            return QueryResult::error(
                ROUTER_ID,
                &format!("No integration handles intent '{}'", query.intent),
            );
        }

        let mut last_error: Option<String> = None;
        for integration in candidates {
            if !self.ensure_available(integration.as_ref()).await {
                debug!(id = %integration.id(), "Integration unavailable, skipping");
                continue;
            }

            let started = Instant::now();
            match integration.execute(query).await {
                Ok(mut result) => {
                    if result.metadata.latency_ms == 0 {
                        result.metadata.latency_ms = started.elapsed().as_millis() as u64;
                    }
                    info!(
                        intent = %query.intent,
                        id = %integration.id(),
                        latency_ms = result.metadata.latency_ms,
                        "Query routed"
                    );
                    return result;
                }
                Err(e) => {
                    warn!(id = %integration.id(), error = %e, "Integration failed, trying next");
                    last_error = Some(format!("{}: {}", integration.id(), e));
                }
            }
        }

        let message = last_error.unwrap_or_else(|| {
            format!("No available integration for intent '{}'", query.intent)
        });
        QueryResult::error(ROUTER_ID, &message)
    }

    /// Availability check; integrations with a reconnect contract get one
    /// reconnect attempt before being written off.
    async fn ensure_available(&self, integration: &dyn Integration) -> bool {
        if integration.is_available().await {
            return true;
        }
        let Some(reconnecting) = integration.as_reconnecting() else {
            return false;
        };
        match reconnecting.reconnect().await {
            Ok(()) => integration.is_available().await,
            Err(e) => {
                debug!(id = %integration.id(), error = %e, "Reconnect failed");
                false
            }
        }
    }
}
