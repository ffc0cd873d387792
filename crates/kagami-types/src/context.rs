//! Call context — who is asking, forwarded end to end.
//!
//! Attribution and per-call hints travel with every read, write, and exec so
//! modules and drivers can attribute work and make policy decisions. The
//! engine itself never interprets `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller identity and per-call hints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Principal making the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session the call belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form hints for modules and drivers. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CallContext {
    /// An anonymous context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the calling principal.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Insert one hint.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let ctx = CallContext::new()
            .with_user("u1")
            .with_session("s1")
            .with_extra("trace", Value::String("t1".into()));
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));
        assert_eq!(ctx.extra.get("trace").and_then(|v| v.as_str()), Some("t1"));
    }

    #[test]
    fn test_default_serializes_empty() {
        let json = serde_json::to_string(&CallContext::new()).unwrap();
        assert_eq!(json, "{}");
    }
}
