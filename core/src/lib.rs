//! Shared types for the DevRev MCP adapter: the tool catalog, argument
//! validation, pagination shaping, stage-transition decisions, and the
//! failure contract every invocation resolves to.

pub mod catalog;
pub mod error;
pub mod pagination;
pub mod stage;
pub mod tools;
pub mod validate;

pub use error::{Failure, FailureKind, InvocationResult, ValidationError};
pub use pagination::{Cursor, CursorMode, Page};
pub use tools::{ToolCall, ToolName};
