use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure kinds a tool invocation can end with.
///
/// The first four are detected locally before any remote call; the rest
/// come out of the remote call and pass through the error normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    MissingParameter,
    InvalidParameterType,
    StageTransitionRejected,
    Unauthorized,
    InvalidRequest,
    NotFound,
    RemoteServerError,
    TransportError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownTool => codes::UNKNOWN_TOOL,
            FailureKind::MissingParameter => codes::MISSING_PARAMETER,
            FailureKind::InvalidParameterType => codes::INVALID_PARAMETER_TYPE,
            FailureKind::StageTransitionRejected => codes::STAGE_TRANSITION_REJECTED,
            FailureKind::Unauthorized => codes::UNAUTHORIZED,
            FailureKind::InvalidRequest => codes::INVALID_REQUEST,
            FailureKind::NotFound => codes::NOT_FOUND,
            FailureKind::RemoteServerError => codes::REMOTE_SERVER_ERROR,
            FailureKind::TransportError => codes::TRANSPORT_ERROR,
        }
    }

    /// Whether the failure was produced without touching the remote API.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            FailureKind::UnknownTool
                | FailureKind::MissingParameter
                | FailureKind::InvalidParameterType
                | FailureKind::StageTransitionRejected
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure codes as they appear on the wire.
pub mod codes {
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const MISSING_PARAMETER: &str = "missing_parameter";
    pub const INVALID_PARAMETER_TYPE: &str = "invalid_parameter_type";
    pub const STAGE_TRANSITION_REJECTED: &str = "stage_transition_rejected";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const REMOTE_SERVER_ERROR: &str = "remote_server_error";
    pub const TRANSPORT_ERROR: &str = "transport_error";
}

/// Structured failure returned to the calling agent.
/// Carries enough detail for the agent to correct the call on its own.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status of the remote response, when one was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<u16>,
    /// Which parameter caused the failure (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Hint about how to recover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remote_status: None,
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(FailureKind::UnknownTool, format!("Unknown tool: {name}"))
            .with_field("name")
            .with_docs_hint("Call tools/list for the supported tool names.")
    }

    pub fn with_remote_status(mut self, status: u16) -> Self {
        self.remote_status = Some(status);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Local parameter validation failure. Validation stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("'{name}' must be {expected}, got {actual}")]
    InvalidParameterType {
        name: String,
        expected: String,
        actual: String,
    },
}

impl ValidationError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    pub fn invalid(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidParameterType {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn parameter(&self) -> &str {
        match self {
            Self::MissingParameter { name } | Self::InvalidParameterType { name, .. } => name,
        }
    }
}

impl From<ValidationError> for Failure {
    fn from(err: ValidationError) -> Self {
        let kind = match &err {
            ValidationError::MissingParameter { .. } => FailureKind::MissingParameter,
            ValidationError::InvalidParameterType { .. } => FailureKind::InvalidParameterType,
        };
        let field = err.parameter().to_string();
        Failure::new(kind, err.to_string())
            .with_field(field)
            .with_docs_hint("Check the tool's inputSchema from tools/list.")
    }
}

/// The single outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success { payload: Value },
    Failure(Failure),
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            InvocationResult::Failure(failure) => Some(failure),
            InvocationResult::Success { .. } => None,
        }
    }
}

impl From<Result<Value, Failure>> for InvocationResult {
    fn from(result: Result<Value, Failure>) -> Self {
        match result {
            Ok(payload) => InvocationResult::Success { payload },
            Err(failure) => InvocationResult::Failure(failure),
        }
    }
}
