use std::fmt;
use std::time::Duration;

use nova_bsp_model::BuildTargetId;
use thiserror::Error;

/// Non-fatal problems found during a sync cycle. The cycle still produces a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// The target's language data could not be decoded; it was left out of the graph.
    MalformedTarget {
        target: BuildTargetId,
        reason: String,
    },
    /// The snapshot listed the same target id more than once; the first row was used.
    DuplicateTarget { target: BuildTargetId },
    /// A load request named a target the snapshot does not contain.
    UnknownRequestedTarget { target: BuildTargetId },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::MalformedTarget { target, reason } => {
                write!(f, "skipped malformed target {target}: {reason}")
            }
            SyncWarning::DuplicateTarget { target } => {
                write!(f, "duplicate target {target}; keeping the first occurrence")
            }
            SyncWarning::UnknownRequestedTarget { target } => {
                write!(f, "requested target {target} is not part of the workspace")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("module name `{name}` is produced by both {first} and {second}")]
    NameCollision {
        name: String,
        first: BuildTargetId,
        second: BuildTargetId,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{request} failed: {message}")]
    Failed {
        request: &'static str,
        message: String,
    },
    #[error("{request} timed out after {timeout:?}")]
    Timeout {
        request: &'static str,
        timeout: Duration,
    },
    #[error("sync was cancelled")]
    Cancelled,
}

/// Entity mutation kinds, used to describe a failed apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyOperation {
    AddModule,
    RemoveModule,
    ReplaceModule,
    AddLibrary,
    RemoveLibrary,
    ReplaceLibrary,
}

impl ApplyOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOperation::AddModule => "add module",
            ApplyOperation::RemoveModule => "remove module",
            ApplyOperation::ReplaceModule => "replace module",
            ApplyOperation::AddLibrary => "add library",
            ApplyOperation::RemoveLibrary => "remove library",
            ApplyOperation::ReplaceLibrary => "replace library",
        }
    }
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("{operation} `{entity}` failed: {message}")]
    Rejected {
        operation: ApplyOperation,
        entity: String,
        message: String,
    },
    #[error("model store batch failed: {0}")]
    Batch(String),
}

impl ApplyError {
    pub fn rejected(
        operation: ApplyOperation,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            operation,
            entity: entity.into(),
            message: message.into(),
        }
    }
}
