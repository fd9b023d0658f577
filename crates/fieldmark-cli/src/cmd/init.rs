use anyhow::Context;
use fieldmark_core::{config::Config, paths};
use std::path::Path;

pub fn run(root: &Path, base_url: &str) -> anyhow::Result<()> {
    println!("Initializing fieldmark in: {}", root.display());

    let dir = paths::fieldmark_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        return Ok(());
    }

    let cfg = Config::new(base_url);
    cfg.save(root).context("failed to write config.yaml")?;
    println!("  created: {}", paths::CONFIG_FILE);

    for w in cfg.validate() {
        println!("  note: {}", w.message);
    }
    Ok(())
}
