//! Config file commands

use std::path::Path;

use anyhow::bail;
use pressled::Config;

/// Write the default config, refusing to clobber an existing file
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Print the config as the daemon would load it
pub fn show(path: &Path) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    // Validate before printing so a broken file is reported, not echoed
    config.to_driver_config()?;
    if !path.exists() {
        println!("# {} not found, showing defaults", path.display());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
