use vigil_agent::{IntentRuleSet, TargetResolver, BROWSE_INTENT};
use vigil_core::{Config, Paths, SEARCH_INTENT};

pub async fn rules() -> anyhow::Result<()> {
    let rules = IntentRuleSet::builtin();

    println!("{:<4} {:<10} Intent", "#", "Priority");
    println!("{}", "-".repeat(40));
    for (i, rule) in rules.iter().enumerate() {
        println!("{:<4} {:<10} {}", i + 1, rule.priority, rule.intent);
    }
    Ok(())
}

/// Rule-level detection only; no integrations are loaded, so availability
/// is not checked.
pub async fn resolve(text: &str) -> anyhow::Result<()> {
    let config = Config::load_or_default(&Paths::new())?;
    let rules = IntentRuleSet::builtin();

    let intent = rules
        .first_match(text)
        .map(|r| r.intent.as_str())
        .unwrap_or(SEARCH_INTENT);
    println!("Intent:    {}", intent);

    if intent == BROWSE_INTENT {
        let resolver = TargetResolver::new(
            config.router.known_domains.clone(),
            config.router.fuzzy_threshold,
        );
        let resolution = resolver.resolve(text);
        println!("Target:    {}", resolution.url.as_deref().unwrap_or("-"));
        println!("Match:     {:?}", resolution.kind);
        if !resolution.suggestions.is_empty() {
            println!("Did you mean:");
            for suggestion in &resolution.suggestions {
                println!("  {}", suggestion);
            }
        }
    } else {
        println!("Target:    {}", text.trim());
    }

    let watchable = config.watch.is_watchable(intent);
    println!(
        "Watchable: {}",
        if watchable {
            format!("yes, every {}s", config.watch.interval_for(intent) / 1000)
        } else {
            "no".to_string()
        }
    );
    Ok(())
}
