use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }
}

/// Rejected input or configuration, detected before any stage ran.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct ConfigurationError {
    pub(crate) message: String,
    pub(crate) details: Value,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> &Value {
        &self.details
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    /// Everything requested succeeded or was legitimately skipped.
    Ok,
    /// Configuration was rejected before any stage ran.
    UserError,
    /// At least one target (or the standalone operation) failed.
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Failure => 1,
            Self::UserError => 2,
        }
    }
}

/// Maps an error escaping a command handler onto an outcome.
#[must_use]
pub fn outcome_from_error(err: &anyhow::Error) -> ExecutionOutcome {
    if let Some(config) = err.downcast_ref::<ConfigurationError>() {
        return ExecutionOutcome::user_error(config.message().to_string(), config.details().clone());
    }
    let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        serde_json::json!({
            "reason": "internal_error",
            "issues": issues,
            "hint": "Re-run with -v for more detail.",
        }),
    )
}
