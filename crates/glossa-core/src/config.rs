//! Annotation configuration
//!
//! Names of the style properties written onto the anchor and the selector
//! used to locate the dismiss target. Loadable from TOML.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants;

/// Configuration for a mounted annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnotationConfig {
    /// Custom property receiving the x offset (e.g. `--md-tooltip-x`)
    pub property_x: String,
    /// Custom property receiving the y offset
    pub property_y: String,
    /// Selector for the dismiss target, scoped to the index container
    pub dismiss_selector: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            property_x: constants::style::PROPERTY_X.to_string(),
            property_y: constants::style::PROPERTY_Y.to_string(),
            dismiss_selector: constants::dismiss::SELECTOR.to_string(),
        }
    }
}

impl AnnotationConfig {
    /// Parse and validate a configuration from TOML text
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse annotation config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Check the configuration for values the mounter cannot use
    pub fn validate(&self) -> Result<()> {
        let prefix = constants::style::CUSTOM_PROPERTY_PREFIX;
        for name in [&self.property_x, &self.property_y] {
            if !name.starts_with(prefix) || name.len() == prefix.len() {
                bail!("'{}' is not a custom property name", name);
            }
        }
        if self.property_x == self.property_y {
            bail!("property_x and property_y must differ");
        }
        if self.dismiss_selector.trim().is_empty() {
            bail!("dismiss_selector must not be empty");
        }
        Ok(())
    }
}
