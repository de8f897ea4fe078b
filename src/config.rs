//! `mesi.toml` configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level run configuration. Every field is optional and defaults as documented;
/// a missing `--config` flag uses `SimConfig::default()` with no file touched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Where `core_<k>_output.txt` files are written.
    #[serde(default = "SimConfig::default_output_dir")]
    pub output_dir: String,
    /// Append every dispatched message to an in-memory trace (debug use).
    #[serde(default)]
    pub trace_messages: bool,
    /// Run the P1-P4 invariant checker after every dispatch and once more at
    /// quiescence (checking P3 too); debug/test use, adds snapshot overhead.
    #[serde(default)]
    pub check_invariants: bool,
}

impl SimConfig {
    fn default_output_dir() -> String {
        ".".to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self =
            toml::from_str(&text).with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { output_dir: Self::default_output_dir(), trace_messages: false, check_invariants: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.output_dir, ".");
        assert!(!cfg.trace_messages);
        assert!(!cfg.check_invariants);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: SimConfig = toml::from_str("trace_messages = true\n").unwrap();
        assert!(cfg.trace_messages);
        assert_eq!(cfg.output_dir, ".");
    }
}
