//! JSON engine profiles.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use colorchord_core::EngineConfig;

/// Saves an engine configuration as pretty-printed JSON.
pub fn save_profile(config: &EngineConfig, path: &Path) -> Result<()> {
    let json_string =
        serde_json::to_string_pretty(config).context("failed to serialize profile")?;
    let mut file = File::create(path)
        .with_context(|| format!("failed to create profile {}", path.display()))?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads an engine configuration. Fields missing from the file keep their
/// defaults.
pub fn load_profile(path: &Path) -> Result<EngineConfig> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open profile {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: EngineConfig = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse profile {}", path.display()))?;
    Ok(config)
}
