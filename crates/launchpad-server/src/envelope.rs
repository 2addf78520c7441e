//! Uniform response envelope

use launchpad_core::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-readable failure attached to an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Whether repeating the same request may succeed
    #[serde(default)]
    pub retryable: bool,
}

impl From<&OrchestratorError> for ErrorBody {
    fn from(err: &OrchestratorError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Response to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Actions that make sense after this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

impl Envelope {
    #[must_use]
    pub fn ok(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: action.into(),
            message: message.into(),
            data: None,
            error: None,
            next_steps: Vec::new(),
        }
    }

    /// Error envelope; the message is the error's display text
    #[must_use]
    pub fn failure(action: impl Into<String>, err: &OrchestratorError) -> Self {
        Self {
            success: false,
            action: action.into(),
            message: err.to_string(),
            data: None,
            error: Some(ErrorBody::from(err)),
            next_steps: Vec::new(),
        }
    }

    /// Attach a serializable payload
    #[must_use]
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => self.data = Some(value),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    action = %self.action,
                    "response payload not serializable"
                );
            }
        }
        self
    }

    /// Mark as failed with `err` while keeping message and data
    #[must_use]
    pub fn with_error(mut self, err: &OrchestratorError) -> Self {
        self.success = false;
        self.error = Some(ErrorBody::from(err));
        self
    }

    #[must_use]
    pub fn with_next_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// One-line JSON for newline-delimited output
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                r#"{{"success":false,"action":"{}","message":"unserializable response: {}"}}"#,
                self.action.escape_default(),
                err.to_string().escape_default()
            )
        })
    }
}
