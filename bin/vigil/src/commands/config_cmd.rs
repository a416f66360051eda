use vigil_core::{Config, Paths};

/// Show the effective configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!("File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn init(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    write_default(&paths, force)?;
    println!("✓ Wrote {}", paths.config_file().display());
    Ok(())
}

fn write_default(paths: &Paths, force: bool) -> anyhow::Result<()> {
    let config_path = paths.config_file();
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            config_path.display()
        );
    }
    paths.ensure_dirs()?;
    Config::default().save(&config_path)?;
    Ok(())
}
