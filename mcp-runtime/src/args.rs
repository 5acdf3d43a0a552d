use serde_json::{Map, Value};
use thiserror::Error;
use transmission_rpc::ClientError;

/// Why a tool call could not produce its normal text.
#[derive(Debug, Error)]
pub(crate) enum ToolError {
    /// Arguments failed validation; no RPC was issued.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// The daemon answered, but with a non-success `result`.
    #[error("Failed to {action}: {reason}")]
    Daemon { action: &'static str, reason: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn daemon(action: &'static str, reason: &str) -> Self {
        Self::Daemon {
            action,
            reason: reason.to_string(),
        }
    }

    /// Text shown to the host for a failed call of `tool`.
    pub(crate) fn render(&self, tool: &str) -> String {
        match self {
            Self::Validation { message, .. } => format!("Invalid arguments for {tool}: {message}"),
            Self::Client(err) => format!("Error executing {tool}: {err}"),
            Self::Daemon { .. } | Self::UnknownTool(_) => self.to_string(),
        }
    }

    /// Argument that failed validation, if any.
    pub(crate) fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failed",
            Self::Daemon { .. } => "daemon_rejected",
            Self::Client(ClientError::Transport { .. }) => "transport_error",
            Self::Client(ClientError::HttpStatus { .. }) => "http_status_error",
            Self::Client(ClientError::Protocol(_)) => "protocol_error",
            Self::Client(ClientError::Decode { .. }) => "decode_error",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }
}

pub(crate) fn arg_bool(args: &Map<String, Value>, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(v)) => Ok(*v),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a boolean"))),
    }
}

pub(crate) fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            ToolError::validation(key, format!("'{key}' must be a non-negative integer"))
        }),
        Some(_) => Err(ToolError::validation(
            key,
            format!("'{key}' must be a non-negative integer"),
        )),
    }
}

/// Torrent ids are positive integers assigned by the daemon.
pub(crate) fn required_torrent_id(args: &Map<String, Value>, key: &str) -> Result<i64, ToolError> {
    let value = args
        .get(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| ToolError::validation(key, format!("Missing required field '{key}'")))?;
    match value.as_i64() {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ToolError::validation(
            key,
            format!("'{key}' must be a positive integer"),
        )),
    }
}

/// One of `allowed`, falling back to `default` when absent.
pub(crate) fn arg_choice(
    args: &Map<String, Value>,
    key: &str,
    allowed: &[&'static str],
    default: Option<&'static str>,
) -> Result<&'static str, ToolError> {
    let raw = match args.get(key) {
        None | Some(Value::Null) => {
            return default
                .ok_or_else(|| ToolError::validation(key, format!("Missing required field '{key}'")));
        }
        Some(Value::String(v)) => v.trim().to_ascii_lowercase(),
        Some(_) => return Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    };
    allowed
        .iter()
        .copied()
        .find(|choice| *choice == raw)
        .ok_or_else(|| {
            ToolError::validation(
                key,
                format!("'{key}' must be one of: {}", allowed.join(", ")),
            )
        })
}
