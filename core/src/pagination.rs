//! Cursor-based pagination shaping.
//!
//! Tokens are produced and consumed by the remote API; they are never
//! inspected here, only moved between the caller-facing and remote shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    After,
    Before,
}

impl CursorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CursorMode::After => "after",
            CursorMode::Before => "before",
        }
    }
}

/// Opaque continuation token plus traversal direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub next_cursor: String,
    pub mode: CursorMode,
}

impl Cursor {
    pub fn after(token: impl Into<String>) -> Self {
        Self {
            next_cursor: token.into(),
            mode: CursorMode::After,
        }
    }

    pub fn before(token: impl Into<String>) -> Self {
        Self {
            next_cursor: token.into(),
            mode: CursorMode::Before,
        }
    }
}

/// One caller-facing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Value>,
    /// Present while more items may exist. Absent means the listing is done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<Cursor>,
}

impl Page {
    pub fn with_prev_token(mut self, remote_prev_token: Option<&str>) -> Self {
        self.prev_cursor = non_empty(remote_prev_token).map(Cursor::before);
        self
    }
}

/// Remote query fragment for the requested page. No cursor means the first
/// page, which the remote API expresses by omitting both fields.
pub fn to_remote_query(cursor: Option<&Cursor>) -> Map<String, Value> {
    let mut fragment = Map::new();
    if let Some(cursor) = cursor {
        fragment.insert(
            "cursor".to_string(),
            Value::String(cursor.next_cursor.clone()),
        );
        fragment.insert(
            "mode".to_string(),
            Value::String(cursor.mode.as_str().to_string()),
        );
    }
    fragment
}

/// Builds the caller-facing page. A missing or empty remote token is the
/// only termination signal.
pub fn from_remote_page(items: Vec<Value>, remote_next_token: Option<&str>) -> Page {
    Page {
        items,
        next_cursor: non_empty(remote_next_token).map(Cursor::after),
        prev_cursor: None,
    }
}

fn non_empty(token: Option<&str>) -> Option<&str> {
    token.filter(|token| !token.trim().is_empty())
}
