use vigil_core::{Config, Paths};

use super::{open_stores, Stores};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("vigil status");
    println!("============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (defaults)" }
    );
    let config = Config::load_or_default(&paths)?;

    let db_path = paths.watch_db();
    println!(
        "Database:  {} {}",
        db_path.display(),
        if db_path.exists() { "✓" } else { "✗ (not created yet)" }
    );
    println!("Backend:   {:?}", config.storage.backend);
    println!("Sandboxed: {}", if config.router.sandboxed { "yes" } else { "no" });
    println!();

    let Stores { rules, snapshots } = open_stores(&paths, &config)?;
    let all = rules.list_all().await?;
    let active = all.iter().filter(|r| r.active).count();
    println!(
        "Watches:   {} active / {} max ({} total)",
        active,
        config.watch.max_active_watches,
        all.len()
    );

    let changes = snapshots.list_changes(None, 1000).await?;
    let pending = changes.iter().filter(|c| !c.acknowledged).count();
    println!("Changes:   {} unacknowledged (of last {})", pending, changes.len());

    if !config_exists {
        println!();
        println!("Run `vigil config init` to write the default configuration.");
    }
    Ok(())
}
