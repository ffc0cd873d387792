//! Views, canonical view keys, and artifact lifecycle states.
//!
//! A [`View`] names the representation a caller wants of an entry — up to four
//! dimensions (language, format, variant, policy). Two views that mean the
//! same thing must cache to the same artifact, so everything keys off the
//! canonical [`ViewKey`]: dimensions in fixed order, values trimmed and
//! lowercased, empty dimensions skipped.
//!
//! A view whose dimensions are all blank is **not** a view request — reads
//! with an empty view go straight to the source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// One axis of a requested representation.
///
/// The declaration order here is the canonical serialization order — never
/// reorder variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Dimension {
    /// Target natural language ("ja", "en", ...).
    #[strum(serialize = "language", serialize = "lang")]
    Language,
    /// Target format ("html", "png", "summary", ...).
    Format,
    /// Free-form variant ("dark", "mobile", ...).
    Variant,
    /// Processing policy ("strict", "fast", ...).
    Policy,
}

impl Dimension {
    /// All dimensions in canonical serialization order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Language,
        Dimension::Format,
        Dimension::Variant,
        Dimension::Policy,
    ];

    /// Canonical name used in view keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Language => "language",
            Dimension::Format => "format",
            Dimension::Variant => "variant",
            Dimension::Policy => "policy",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error from parsing a serialized view key.
#[derive(Debug, thiserror::Error)]
pub enum ViewParseError {
    #[error("unknown view dimension '{0}'")]
    UnknownDimension(String),
    #[error("malformed view segment '{0}' (expected dim=value)")]
    MalformedSegment(String),
}

/// A requested representation of an entry.
///
/// Values are stored as given; normalization (trim + lowercase) happens when
/// the canonical key is computed, so `View` construction order and value
/// casing never affect cache identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl View {
    /// An empty view (no representation requested).
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value for one dimension.
    pub fn get(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Language => self.language.as_deref(),
            Dimension::Format => self.format.as_deref(),
            Dimension::Variant => self.variant.as_deref(),
            Dimension::Policy => self.policy.as_deref(),
        }
    }

    /// Set one dimension.
    pub fn set(&mut self, dim: Dimension, value: impl Into<String>) {
        let value = Some(value.into());
        match dim {
            Dimension::Language => self.language = value,
            Dimension::Format => self.format = value,
            Dimension::Variant => self.variant = value,
            Dimension::Policy => self.policy = value,
        }
    }

    /// Builder form: set the language dimension.
    pub fn with_language(mut self, v: impl Into<String>) -> Self {
        self.language = Some(v.into());
        self
    }

    /// Builder form: set the format dimension.
    pub fn with_format(mut self, v: impl Into<String>) -> Self {
        self.format = Some(v.into());
        self
    }

    /// Builder form: set the variant dimension.
    pub fn with_variant(mut self, v: impl Into<String>) -> Self {
        self.variant = Some(v.into());
        self
    }

    /// Builder form: set the policy dimension.
    pub fn with_policy(mut self, v: impl Into<String>) -> Self {
        self.policy = Some(v.into());
        self
    }

    /// The normalized value for one dimension: trimmed, lowercased, `None`
    /// when blank.
    pub fn normalized(&self, dim: Dimension) -> Option<String> {
        self.get(dim).and_then(|v| {
            let v = v.trim();
            if v.is_empty() {
                None
            } else {
                Some(v.to_lowercase())
            }
        })
    }

    /// Whether every dimension is absent or blank — i.e. no view requested.
    pub fn is_empty(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.normalized(*d).is_none())
    }

    /// Compute the canonical cache key.
    ///
    /// Fixed dimension order, `dim=value` segments joined by `;`, blank
    /// dimensions skipped. The empty view keys to the empty string.
    pub fn key(&self) -> ViewKey {
        let parts: Vec<String> = Dimension::ALL
            .iter()
            .filter_map(|d| self.normalized(*d).map(|v| format!("{}={}", d.as_str(), v)))
            .collect();
        ViewKey(parts.join(";"))
    }

    /// Parse a serialized view key back into a view.
    ///
    /// Accepts any segment order and dimension-name casing; empty input gives
    /// the empty view.
    pub fn parse(s: &str) -> Result<Self, ViewParseError> {
        let mut view = View::new();
        for seg in s.split(';') {
            let seg = seg.trim();
            if seg.is_empty() {
                continue;
            }
            let (dim, value) = seg
                .split_once('=')
                .ok_or_else(|| ViewParseError::MalformedSegment(seg.to_string()))?;
            let dim = Dimension::from_str(dim.trim())
                .map_err(|_| ViewParseError::UnknownDimension(dim.trim().to_string()))?;
            view.set(dim, value.trim());
        }
        Ok(view)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Canonical serialization of a [`View`] — the cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewKey(String);

impl ViewKey {
    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty view's key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ViewKey> for String {
    fn from(k: ViewKey) -> String {
        k.0
    }
}

/// Artifact lifecycle for one (path, view key) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ViewState {
    /// Never generated.
    #[default]
    Missing,
    /// Generation in flight.
    Generating,
    /// Artifact exists and matched the source when recorded.
    Ready,
    /// Source changed since the artifact was generated.
    Stale,
    /// Last generation attempt failed.
    Failed,
}

impl ViewState {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewState::Missing => "missing",
            ViewState::Generating => "generating",
            ViewState::Ready => "ready",
            ViewState::Stale => "stale",
            ViewState::Failed => "failed",
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
