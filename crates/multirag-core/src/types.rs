use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a chat request sent to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A chat message sent to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: text.into(),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

/// One tagged message in a run transcript.
///
/// Entries without a `name` tag and with `Role::Human` are human-authored;
/// tagged entries are written by steps (`planner`, `single_step`, worker names, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TranscriptEntry {
    /// The question as typed by the user.
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            name: None,
            text: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// A human-role entry written on behalf of a step.
    pub fn tagged(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            name: Some(name.into()),
            text: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn is_human(&self) -> bool {
        self.role == Role::Human
    }

    /// Human role and no step tag.
    pub fn is_user_authored(&self) -> bool {
        self.role == Role::Human && self.name.is_none()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.name.as_deref() == Some(tag)
    }
}

/// A worker's retrieved result.
///
/// Serialized untagged: text becomes a JSON string, a structured payload is
/// emitted as-is and a failure becomes `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reference {
    Text(String),
    Failed { error: String },
    Structured(serde_json::Value),
}

impl Reference {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short single-line preview for logs and CLI output.
    pub fn preview(&self, max: usize) -> String {
        let full = match self {
            Self::Text(s) => s.clone(),
            Self::Failed { error } => format!("[error] {}", error),
            Self::Structured(v) => v.to_string(),
        };
        let flat = full.replace('\n', " ");
        if flat.chars().count() <= max {
            flat
        } else {
            let cut: String = flat.chars().take(max).collect();
            format!("{}...", cut)
        }
    }
}

impl From<String> for Reference {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Reference {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }
}
