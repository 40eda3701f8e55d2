use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    fn validate(&self) -> Result<()> {
        let c = &self.controller;
        if !(c.alpha > 0.0 && c.alpha <= 1.0) {
            bail!("controller.alpha must be in (0, 1], got {}", c.alpha);
        }
        if c.min_green > c.max_green {
            bail!(
                "controller.min_green ({}) exceeds max_green ({})",
                c.min_green,
                c.max_green
            );
        }
        Ok(())
    }
}
