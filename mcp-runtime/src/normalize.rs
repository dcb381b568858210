//! Maps remote error responses and transport failures onto the failure
//! taxonomy. Never panics on odd bodies: HTML, empty, or plain-text all
//! produce a usable message.

use devrev_core::{Failure, FailureKind};
use serde_json::Value;

use crate::transport::TransportError;

const MAX_TEXT_MESSAGE_CHARS: usize = 500;

pub fn kind_for_status(status: u16) -> FailureKind {
    match status {
        401 | 403 => FailureKind::Unauthorized,
        404 => FailureKind::NotFound,
        400..=499 => FailureKind::InvalidRequest,
        _ => FailureKind::RemoteServerError,
    }
}

/// Failure for a non-2xx response.
pub fn normalize(status: u16, body: &Value) -> Failure {
    let kind = kind_for_status(status);
    let message = remote_message(body).unwrap_or_else(|| generic_message(kind).to_string());
    let mut failure = Failure::new(kind, message).with_remote_status(status);
    if let Some(hint) = docs_hint(kind) {
        failure = failure.with_docs_hint(hint);
    }
    failure
}

/// Failure for a call that never produced a response.
pub fn from_transport(err: &TransportError) -> Failure {
    match err {
        TransportError::MissingCredential => {
            Failure::new(FailureKind::Unauthorized, err.to_string())
                .with_docs_hint("Set DEVREV_API_KEY or pass --token.")
        }
        TransportError::Timeout { .. }
        | TransportError::Unreachable { .. }
        | TransportError::Body { .. } => {
            let mut failure = Failure::new(FailureKind::TransportError, err.to_string());
            if let Some(hint) = docs_hint(FailureKind::TransportError) {
                failure = failure.with_docs_hint(hint);
            }
            failure
        }
    }
}

fn remote_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => ["message", "detail", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(field_text)),
        Value::String(text) => non_empty(text).map(|text| truncate(&text)),
        _ => None,
    }
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(text),
        Value::Object(nested) => nested
            .get("message")
            .and_then(Value::as_str)
            .and_then(non_empty),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_TEXT_MESSAGE_CHARS).collect();
    cut.push_str("...");
    cut
}

fn generic_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Unauthorized => "DevRev API rejected the credentials",
        FailureKind::NotFound => "Requested entity does not exist",
        FailureKind::InvalidRequest => "DevRev API rejected the request",
        _ => "DevRev API failed to process the request",
    }
}

fn docs_hint(kind: FailureKind) -> Option<&'static str> {
    match kind {
        FailureKind::Unauthorized => {
            Some("Check that DEVREV_API_KEY holds a valid personal access token.")
        }
        FailureKind::NotFound => Some("Check the id. search can locate entities by text."),
        FailureKind::InvalidRequest => {
            Some("Check referenced ids such as applies_to_part, owned_by and stage names.")
        }
        FailureKind::RemoteServerError => Some("The DevRev API failed. Retrying later may succeed."),
        FailureKind::TransportError => Some("Check network access and DEVREV_API_URL."),
        _ => None,
    }
}
