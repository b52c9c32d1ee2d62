use serde::{Deserialize, Serialize};

/// Messages sent to clients over the update channel.
///
/// Serialized as one JSON object per message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HmrMessage {
    /// Sent once to every newly connected client.
    Connected,

    FullReload {
        path: String,
        timestamp: u64,
    },

    /// Re-import a component module.
    ComponentReload {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        change_src_path: Option<String>,
        timestamp: u64,
    },

    /// Re-render a component with its new template only.
    ComponentTemplateUpdate {
        path: String,
        timestamp: u64,
    },

    ComponentStyleUpdate {
        path: String,
        index: usize,
        id: String,
        timestamp: u64,
    },

    /// Swap a plain stylesheet.
    StyleUpdate {
        path: String,
        id: String,
        timestamp: u64,
    },

    StyleRemove {
        path: String,
        id: String,
        timestamp: u64,
    },

    /// Re-import an accepting module because `change_src_path` changed.
    DependencyUpdate {
        path: String,
        change_src_path: String,
        timestamp: u64,
    },

    CustomEvent {
        id: String,
        #[serde(default)]
        custom_data: serde_json::Value,
    },

    /// A type this version does not know; clients ignore it.
    #[serde(other)]
    Unknown,
}

impl HmrMessage {
    pub fn full_reload(path: impl Into<String>, timestamp: u64) -> Self {
        HmrMessage::FullReload {
            path: path.into(),
            timestamp,
        }
    }

    /// Public path the message is about, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            HmrMessage::FullReload { path, .. }
            | HmrMessage::ComponentReload { path, .. }
            | HmrMessage::ComponentTemplateUpdate { path, .. }
            | HmrMessage::ComponentStyleUpdate { path, .. }
            | HmrMessage::StyleUpdate { path, .. }
            | HmrMessage::StyleRemove { path, .. }
            | HmrMessage::DependencyUpdate { path, .. } => Some(path),
            HmrMessage::Connected | HmrMessage::CustomEvent { .. } | HmrMessage::Unknown => None,
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            HmrMessage::FullReload { timestamp, .. }
            | HmrMessage::ComponentReload { timestamp, .. }
            | HmrMessage::ComponentTemplateUpdate { timestamp, .. }
            | HmrMessage::ComponentStyleUpdate { timestamp, .. }
            | HmrMessage::StyleUpdate { timestamp, .. }
            | HmrMessage::StyleRemove { timestamp, .. }
            | HmrMessage::DependencyUpdate { timestamp, .. } => Some(*timestamp),
            HmrMessage::Connected | HmrMessage::CustomEvent { .. } | HmrMessage::Unknown => None,
        }
    }

    pub fn is_full_reload(&self) -> bool {
        matches!(self, HmrMessage::FullReload { .. })
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
