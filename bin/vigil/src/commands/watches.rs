use std::sync::Arc;
use vigil_core::{Config, EventBus, Paths, WatchRule};
use vigil_scheduler::WatchCoordinator;

use super::{format_ms, open_stores, truncate};

fn coordinator() -> anyhow::Result<WatchCoordinator> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let stores = open_stores(&paths, &config)?;
    Ok(WatchCoordinator::new(
        stores.rules,
        Arc::new(EventBus::new()),
        config.watch,
    ))
}

pub async fn list(show_all: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let stores = open_stores(&paths, &config)?;

    let rules: Vec<WatchRule> = if show_all {
        stores.rules.list_all().await?
    } else {
        stores.rules.list_active().await?
    };

    if rules.is_empty() {
        println!("No watch rules.");
        return Ok(());
    }

    println!(
        "{:<8} {:<32} {:<16} {:<10} {:<8} {:<20} Last poll",
        "ID", "Endpoint", "Intent", "Interval", "Active", "Expires"
    );
    println!("{}", "-".repeat(120));
    for rule in rules {
        println!(
            "{:<8} {:<32} {:<16} {:<10} {:<8} {:<20} {}",
            rule.id.chars().take(8).collect::<String>(),
            truncate(&rule.endpoint_id, 32),
            truncate(&rule.intent, 16),
            format!("{}s", rule.interval_ms / 1000),
            if rule.active { "yes" } else { "no" },
            format_ms(rule.expires_at_ms),
            rule.last_polled_at_ms
                .map(format_ms)
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

pub async fn stop(endpoint: &str) -> anyhow::Result<()> {
    match coordinator()?.stop_watch(endpoint).await? {
        Some(rule) => println!("✓ Stopped watch {} on {}", rule.id, rule.endpoint_id),
        None => println!("No active watch for {}", endpoint),
    }
    Ok(())
}

pub async fn expire() -> anyhow::Result<()> {
    let coordinator = coordinator()?;
    let expired = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = expired.clone();
    let subscription = coordinator.events().subscribe(move |event| {
        if let vigil_core::WatchEvent::RuleExpired { rule } = event {
            if let Ok(mut list) = sink.lock() {
                list.push(rule.endpoint_id.clone());
            }
        }
    });

    let remaining = coordinator.get_active_watches().await?;
    subscription.unsubscribe();

    let expired = expired.lock().map(|l| l.clone()).unwrap_or_default();
    for endpoint in &expired {
        println!("  expired: {}", endpoint);
    }
    println!("✓ {} expired, {} still active", expired.len(), remaining.len());
    Ok(())
}
