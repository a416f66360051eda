use vigil_core::{Config, Paths};

use super::{format_ms, open_stores, truncate};

pub async fn list(endpoint: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let stores = open_stores(&paths, &config)?;

    let changes = stores.snapshots.list_changes(endpoint, limit).await?;
    if changes.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }

    println!(
        "{:<8} {:<20} {:<9} {:<16} {:<4} Description",
        "ID", "Detected", "Severity", "Kind", "Ack"
    );
    println!("{}", "-".repeat(100));
    for change in changes {
        println!(
            "{:<8} {:<20} {:<9} {:<16} {:<4} {}",
            change.id.chars().take(8).collect::<String>(),
            format_ms(change.detected_at_ms),
            change.severity.as_str(),
            change.kind.as_str(),
            if change.acknowledged { "yes" } else { "no" },
            truncate(&change.description, 60),
        );
    }
    Ok(())
}

pub async fn ack(id: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let stores = open_stores(&paths, &config)?;

    if stores.snapshots.acknowledge_change(id).await? {
        println!("✓ Acknowledged {}", id);
    } else {
        anyhow::bail!("No change record with id {}", id);
    }
    Ok(())
}
