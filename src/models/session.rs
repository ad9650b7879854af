//! Session model stored by the session store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque random identifier
    pub session_id: String,
    /// Owner of the session
    pub user_id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last successful load or touch
    pub last_accessed_at: DateTime<Utc>,
    /// Arbitrary session attributes
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Returns an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}
