//! Engine configuration (`concord.toml`).
//!
//! Every threshold the three engines use lives here. Missing fields take
//! their defaults; a missing file means all defaults.
//!
//! ```toml
//! [detection]
//! simultaneity_window_ms = 5000
//! overlap_tolerance = 3
//!
//! [merge]
//! max_priority_gap = 2
//!
//! [coordination]
//! lock_safety_margin_ms = 30000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcordConfig {
    /// Conflict detection thresholds.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Change merging thresholds.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Locking, queueing and timer settings.
    #[serde(default)]
    pub coordination: CoordinationConfig,
}

// ---------------------------------------------------------------------------
// DetectionConfig
// ---------------------------------------------------------------------------

/// Conflict detection thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    /// Only operations whose timestamps are at most this far apart are
    /// compared (default: 5000).
    #[serde(default = "default_window_ms")]
    pub simultaneity_window_ms: u64,

    /// Overlaps of this many characters or fewer are ignored (default: 3).
    #[serde(default = "default_overlap_tolerance")]
    pub overlap_tolerance: usize,

    /// Minimum priority gap for a priority conflict (default: 1).
    #[serde(default = "default_priority_gap_threshold")]
    pub priority_gap_threshold: u8,

    /// A replace longer than this demands exclusive access (default: 1000).
    #[serde(default = "default_exclusive_replace_span")]
    pub exclusive_replace_span: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            simultaneity_window_ms: default_window_ms(),
            overlap_tolerance: default_overlap_tolerance(),
            priority_gap_threshold: default_priority_gap_threshold(),
            exclusive_replace_span: default_exclusive_replace_span(),
        }
    }
}

const fn default_window_ms() -> u64 {
    5_000
}

const fn default_overlap_tolerance() -> usize {
    3
}

const fn default_priority_gap_threshold() -> u8 {
    1
}

const fn default_exclusive_replace_span() -> usize {
    1_000
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Change merging thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Overlaps of this many characters or fewer do not require an
    /// auto-merge capability (default: 3).
    #[serde(default = "default_overlap_tolerance")]
    pub overlap_tolerance: usize,

    /// Largest priority gap allowed inside one merge group (default: 2).
    #[serde(default = "default_max_priority_gap")]
    pub max_priority_gap: u8,

    /// Mean compatibility below this fails a semantic merge (default: 0.3).
    #[serde(default = "default_semantic_failure_threshold")]
    pub semantic_failure_threshold: f64,

    /// Changes are paired only above this compatibility (default: 0.6).
    #[serde(default = "default_semantic_pairing_threshold")]
    pub semantic_pairing_threshold: f64,

    /// Inserted strings shorter than this may be joined (default: 100).
    #[serde(default = "default_text_concat_max_len")]
    pub text_concat_max_len: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance: default_overlap_tolerance(),
            max_priority_gap: default_max_priority_gap(),
            semantic_failure_threshold: default_semantic_failure_threshold(),
            semantic_pairing_threshold: default_semantic_pairing_threshold(),
            text_concat_max_len: default_text_concat_max_len(),
        }
    }
}

const fn default_max_priority_gap() -> u8 {
    2
}

const fn default_semantic_failure_threshold() -> f64 {
    0.3
}

const fn default_semantic_pairing_threshold() -> f64 {
    0.6
}

const fn default_text_concat_max_len() -> usize {
    100
}

// ---------------------------------------------------------------------------
// CoordinationConfig
// ---------------------------------------------------------------------------

/// Locking, queueing and timer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinationConfig {
    /// Activity this recent forces coordination (default: 5000).
    #[serde(default = "default_window_ms")]
    pub recent_activity_window_ms: u64,

    /// Added to the estimated duration to form a lock's TTL (default: 30000).
    #[serde(default = "default_lock_safety_margin_ms")]
    pub lock_safety_margin_ms: u64,

    /// Delay before a deferred operation is resubmitted (default: 1000).
    #[serde(default = "default_defer_delay_ms")]
    pub defer_delay_ms: u64,

    /// Minimum time between sweeps of expired locks and history
    /// (default: 60000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// History entries older than this are dropped (default: 24h).
    #[serde(default = "default_history_retention_ms")]
    pub history_retention_ms: u64,

    /// Maximum history entries kept per document (default: 1024).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            recent_activity_window_ms: default_window_ms(),
            lock_safety_margin_ms: default_lock_safety_margin_ms(),
            defer_delay_ms: default_defer_delay_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            history_retention_ms: default_history_retention_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

const fn default_lock_safety_margin_ms() -> u64 {
    30_000
}

const fn default_defer_delay_ms() -> u64 {
    1_000
}

const fn default_sweep_interval_ms() -> u64 {
    60_000
}

const fn default_history_retention_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

const fn default_history_capacity() -> usize {
    1_024
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or parsing configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The file being loaded, if any.
    pub path: Option<PathBuf>,
    /// Message, prefixed with the line number when known.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}: {}", p.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConcordConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors other than not-found, invalid TOML
    /// or unknown fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields or out-of-range
    /// thresholds.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].matches('\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.merge;
        for (name, value) in [
            ("merge.semantic_failure_threshold", m.semantic_failure_threshold),
            ("merge.semantic_pairing_threshold", m.semantic_pairing_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError {
                    path: None,
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }
        if self.coordination.history_capacity == 0 {
            return Err(ConfigError {
                path: None,
                message: "coordination.history_capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Render as TOML.
    ///
    /// # Errors
    /// Returns `ConfigError` if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError {
            path: None,
            message: format!("could not serialize config: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_string_gives_defaults() {
        let cfg = ConcordConfig::parse("").unwrap();
        assert_eq!(cfg, ConcordConfig::default());
        assert_eq!(cfg.detection.simultaneity_window_ms, 5_000);
        assert_eq!(cfg.coordination.lock_safety_margin_ms, 30_000);
        assert_eq!(cfg.coordination.history_retention_ms, 86_400_000);
        assert_eq!(cfg.merge.max_priority_gap, 2);
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let cfg = ConcordConfig::parse(
            r"
[detection]
overlap_tolerance = 0
",
        )
        .unwrap();
        assert_eq!(cfg.detection.overlap_tolerance, 0);
        assert_eq!(cfg.detection.priority_gap_threshold, 1);
        assert_eq!(cfg.merge, MergeConfig::default());
    }

    #[test]
    fn parse_rejects_unknown_field_with_line() {
        let err = ConcordConfig::parse("[merge]\nmax_priority_gap = 2\nbogus = 1\n").unwrap_err();
        assert!(err.message.contains("line 3"), "{}", err.message);
        assert!(err.message.contains("bogus"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_out_of_range_threshold() {
        let err = ConcordConfig::parse("[merge]\nsemantic_failure_threshold = 1.5\n").unwrap_err();
        assert!(err.message.contains("semantic_failure_threshold"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = ConcordConfig::load(Path::new("/nonexistent/concord.toml")).unwrap();
        assert_eq!(cfg, ConcordConfig::default());
    }

    #[test]
    fn config_error_display_includes_path() {
        let err = ConfigError {
            path: Some(PathBuf::from("/tmp/concord.toml")),
            message: "line 1: bad".to_owned(),
        };
        assert_eq!(err.to_string(), "/tmp/concord.toml: line 1: bad");
    }

    #[test]
    fn defaults_survive_toml_round_trip() {
        let text = ConcordConfig::default().to_toml().unwrap();
        assert_eq!(ConcordConfig::parse(&text).unwrap(), ConcordConfig::default());
    }
}
