// src/capture/descriptor.rs
//! Structured description of a failure signal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of failure fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Uncaught exception (or panic)
    Error,

    /// Rejected promise / failed task nobody handled
    UnhandledRejection,

    /// A resource (script, image, stylesheet...) failed to load
    Resource,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Error => "error",
            ErrorKind::UnhandledRejection => "unhandledrejection",
            ErrorKind::Resource => "resource",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one failure
///
/// Contextual fields are only populated for kinds that provide them: a
/// rejection has no source location, a resource failure has no stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// Originating error value as reported by the signal source
    #[serde(default)]
    pub error: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, rename = "lineno", skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(default, rename = "colno", skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    pub occurred_at: DateTime<Utc>,
}

impl ErrorDescriptor {
    fn new(kind: ErrorKind, error: serde_json::Value) -> Self {
        Self {
            kind,
            error,
            message: None,
            source: None,
            line: None,
            column: None,
            stack: None,
            occurred_at: Utc::now(),
        }
    }

    /// Uncaught exception with its source location
    ///
    /// The stack is taken from the error value's `stack` field when present.
    pub fn uncaught(
        message: impl Into<String>,
        source: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
        error: serde_json::Value,
    ) -> Self {
        let stack = error
            .get("stack")
            .and_then(|s| s.as_str())
            .map(str::to_string);

        Self {
            message: Some(message.into()),
            source,
            line,
            column,
            stack,
            ..Self::new(ErrorKind::Error, error)
        }
    }

    /// Unhandled rejection; the reason doubles as the message
    pub fn unhandled_rejection(reason: serde_json::Value) -> Self {
        let message = match &reason {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Self {
            message: Some(message),
            ..Self::new(ErrorKind::UnhandledRejection, reason)
        }
    }

    /// Resource load failure for `src`
    pub fn resource(src: impl Into<String>, error: serde_json::Value) -> Self {
        let src = src.into();
        Self {
            message: Some(format!("Resource failed to load: {}", src)),
            source: Some(src),
            ..Self::new(ErrorKind::Resource, error)
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        match (&self.message, &self.source) {
            (Some(message), Some(source)) => format!("{}: {} ({})", self.kind, message, source),
            (Some(message), None) => format!("{}: {}", self.kind, message),
            (None, _) => self.kind.to_string(),
        }
    }
}
