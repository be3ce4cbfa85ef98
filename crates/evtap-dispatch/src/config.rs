//! Global configuration switches for the dispatch layer.
//!
//! [`DispatchConfig`] starts from defaults or a JSON config file, and
//! environment variables are overlaid on top:
//! - `EVTAP_ENABLED`: `true`/`false` (default: `true`)
//! - `EVTAP_IGNORE_ANALYSIS_FAULTS`: `true`/`false` (default: `false`)

use serde::{Deserialize, Serialize};

pub const ENV_ENABLED: &str = "EVTAP_ENABLED";
pub const ENV_IGNORE_ANALYSIS_FAULTS: &str = "EVTAP_IGNORE_ANALYSIS_FAULTS";

/// Configuration for a [`DispatchContext`](crate::DispatchContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Initial state of the instrumentation gate.
    pub enabled: bool,
    /// Log and swallow analysis faults instead of terminating the process.
    pub ignore_analysis_faults: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            enabled: true,
            ignore_analysis_faults: false,
        }
    }
}

impl DispatchConfig {
    /// Overlays environment variables on `self`. Unset or unparseable
    /// variables keep the current value.
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays the values `lookup` knows about; everything else is kept.
    pub fn with_lookup<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        DispatchConfig {
            enabled: lookup(ENV_ENABLED)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(self.enabled),
            ignore_analysis_faults: lookup(ENV_IGNORE_ANALYSIS_FAULTS)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(self.ignore_analysis_faults),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_enabled_and_fatal() {
        let config = DispatchConfig::default();
        assert!(config.enabled);
        assert!(!config.ignore_analysis_faults);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = DispatchConfig::default().with_lookup(|key| match key {
            ENV_ENABLED => Some("off".into()),
            ENV_IGNORE_ANALYSIS_FAULTS => Some("1".into()),
            _ => None,
        });
        assert!(!config.enabled);
        assert!(config.ignore_analysis_faults);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config = DispatchConfig::default().with_lookup(|_| Some("maybe".into()));
        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn overlay_keeps_unset_values() {
        let base = DispatchConfig {
            enabled: false,
            ignore_analysis_faults: true,
        };
        let config = base.with_lookup(|key| (key == ENV_ENABLED).then(|| "yes".to_string()));
        assert!(config.enabled);
        assert!(config.ignore_analysis_faults);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{"ignore_analysis_faults": true}"#).unwrap();
        assert!(config.enabled);
        assert!(config.ignore_analysis_faults);
    }
}
