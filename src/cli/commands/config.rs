use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

/// Handle config show command
pub fn handle_show(config: Config, json: bool) -> Result<()> {
    output(&ConfigOutput { config }, json);
    Ok(())
}

/// Handle config validate command
///
/// Loading already validated the configuration; this reports the outcome.
pub fn handle_validate(config: &Config, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "valid": true,
            "snapshot_path": config.persistence.snapshot_path,
            "detectors_enabled": config
                .detectors
                .iter()
                .filter(|(_, detector)| detector.enabled)
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to render validation result")?
        );
    } else {
        let enabled = config
            .detectors
            .iter()
            .filter(|(_, detector)| detector.enabled)
            .count();
        println!("Configuration is valid.");
        println!("  Snapshot path: {}", config.persistence.snapshot_path.display());
        println!("  Detectors enabled: {enabled}/7");
        println!(
            "  Deadlock detector: {}",
            if config.detectors.deadlock.enabled { "enabled" } else { "disabled" }
        );
    }

    Ok(())
}
