use anyhow::Context;
use openspec_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing openspec in: {}", root.display());

    for dir in [
        paths::OPENSPEC_STATE_DIR,
        paths::LOCKS_DIR,
        paths::CHANGES_DIR,
        paths::ARCHIVE_DIR,
    ] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    println!("\nNext: openspec change create <slug> --title \"...\"");
    Ok(())
}
