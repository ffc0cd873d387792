//! Engine configuration.
//!
//! Tunables are explicit and passed at construction — no globals, no
//! environment probing. Per-call options can override the wait mode; the rest
//! apply engine-wide.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Depth budget a listing gets when the caller doesn't ask for one.
pub const DEFAULT_MAX_DEPTH: usize = 1;

/// Concurrent generations a prefetch batch runs by default.
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 5;

/// What a read does when its view is stale or missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum WaitMode {
    /// Block until the artifact is generated; generation failure fails the read.
    #[default]
    Strict,
    /// Return the source immediately with an advisory message and generate in
    /// the background.
    #[strum(serialize = "fallback", serialize = "background")]
    Fallback,
}

impl WaitMode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitMode::Strict => "strict",
            WaitMode::Fallback => "fallback",
        }
    }
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine-wide configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AfsConfig {
    /// Listing depth when the caller doesn't specify one.
    pub default_max_depth: usize,
    /// Concurrent generations per prefetch batch.
    pub prefetch_concurrency: usize,
    /// Wait behavior for reads of stale views, unless overridden per call.
    pub wait_mode: WaitMode,
    /// Coalesce concurrent generations of the same (mount, path, view) into
    /// one driver invocation. Off = at-least-once generation.
    pub coalesce_generation: bool,
    /// Scan text writes for slot markers.
    pub scan_slots_on_write: bool,
}

impl Default for AfsConfig {
    fn default() -> Self {
        Self {
            default_max_depth: DEFAULT_MAX_DEPTH,
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            wait_mode: WaitMode::Strict,
            coalesce_generation: true,
            scan_slots_on_write: true,
        }
    }
}

impl AfsConfig {
    /// Set the default listing depth.
    pub fn with_default_max_depth(mut self, depth: usize) -> Self {
        self.default_max_depth = depth;
        self
    }

    /// Set the prefetch concurrency.
    pub fn with_prefetch_concurrency(mut self, n: usize) -> Self {
        self.prefetch_concurrency = n;
        self
    }

    /// Set the engine-wide wait mode.
    pub fn with_wait_mode(mut self, mode: WaitMode) -> Self {
        self.wait_mode = mode;
        self
    }

    /// Enable or disable generation coalescing.
    pub fn with_coalesce_generation(mut self, on: bool) -> Self {
        self.coalesce_generation = on;
        self
    }

    /// Enable or disable slot scanning on write.
    pub fn with_scan_slots(mut self, on: bool) -> Self {
        self.scan_slots_on_write = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AfsConfig::default();
        assert_eq!(cfg.default_max_depth, 1);
        assert_eq!(cfg.prefetch_concurrency, 5);
        assert_eq!(cfg.wait_mode, WaitMode::Strict);
        assert!(cfg.coalesce_generation);
        assert!(cfg.scan_slots_on_write);
    }

    #[test]
    fn test_builders() {
        let cfg = AfsConfig::default()
            .with_default_max_depth(3)
            .with_wait_mode(WaitMode::Fallback)
            .with_coalesce_generation(false);
        assert_eq!(cfg.default_max_depth, 3);
        assert_eq!(cfg.wait_mode, WaitMode::Fallback);
        assert!(!cfg.coalesce_generation);
    }

    #[test]
    fn test_wait_mode_strings() {
        assert_eq!(WaitMode::from_str("FALLBACK"), Some(WaitMode::Fallback));
        assert_eq!(WaitMode::from_str("background"), Some(WaitMode::Fallback));
        assert_eq!(WaitMode::Strict.as_str(), "strict");
    }
}
