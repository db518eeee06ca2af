//! Preview configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file) is a valid config.

use crate::backend::BackendPreference;
use crate::debounce::DebounceConfig;
use crate::error::ConfigError;
use crate::theme::ThemeMode;
use crate::virtual_scroll::VirtualScrollConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub sync_scrolling: bool,
    /// Speculatively render on every edit while the worker is idle
    pub predictive_render: bool,
    pub theme: ThemeMode,
    pub backend: BackendPreference,
    pub debounce: DebounceConfig,
    pub virtual_scroll: VirtualScrollConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            sync_scrolling: true,
            predictive_render: false,
            theme: ThemeMode::Light,
            backend: BackendPreference::Auto,
            debounce: DebounceConfig::default(),
            virtual_scroll: VirtualScrollConfig::default(),
        }
    }
}

impl PreviewConfig {
    /// Parse and validate
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let debounce = &self.debounce;
        if debounce.min_delay_ms > debounce.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "debounce.min_delay_ms",
                reason: format!(
                    "{} exceeds max_delay_ms {}",
                    debounce.min_delay_ms, debounce.max_delay_ms
                ),
            });
        }
        if debounce.history_size == 0 {
            return Err(ConfigError::Invalid {
                field: "debounce.history_size",
                reason: "must be at least 1".into(),
            });
        }
        if !(debounce.render_cost_factor.is_finite() && debounce.render_cost_factor >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "debounce.render_cost_factor",
                reason: format!("{} is not a non-negative number", debounce.render_cost_factor),
            });
        }

        let virtual_scroll = &self.virtual_scroll;
        if virtual_scroll.max_render_lines == 0 {
            return Err(ConfigError::Invalid {
                field: "virtual_scroll.max_render_lines",
                reason: "must be at least 1".into(),
            });
        }
        let line_height = virtual_scroll.estimated_line_height;
        if !(line_height.is_finite() && line_height > 0.0) {
            return Err(ConfigError::Invalid {
                field: "virtual_scroll.estimated_line_height",
                reason: format!("{} is not a positive height", line_height),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(PreviewConfig::from_toml_str("").unwrap(), PreviewConfig::default());
    }

    #[test]
    fn test_partial_tables() {
        let config = PreviewConfig::from_toml_str(
            r#"
            theme = "dark"
            backend = "software"

            [debounce]
            max_delay_ms = 400

            [virtual_scroll]
            buffer_lines = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.theme, ThemeMode::Dark);
        assert_eq!(config.backend, BackendPreference::Software);
        assert_eq!(config.debounce.max_delay_ms, 400);
        assert_eq!(config.debounce.min_delay_ms, 50);
        assert_eq!(config.virtual_scroll.buffer_lines, 4);
        assert_eq!(config.virtual_scroll.max_render_lines, 500);
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let err = PreviewConfig::from_toml_str("[debounce]\nmin_delay_ms = 900\nmax_delay_ms = 100\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "debounce.min_delay_ms", .. }));
    }

    #[test]
    fn test_rejects_bad_line_height() {
        let err = PreviewConfig::from_toml_str("[virtual_scroll]\nestimated_line_height = 0.0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = PreviewConfig::from_toml_str("theme = \"sepia\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = PreviewConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(PreviewConfig::from_toml_str(&text).unwrap(), config);
    }
}
