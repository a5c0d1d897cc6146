use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Fatal pipeline failures. Each variant names the exact file and row or field
/// so the build log points at the offending source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("{path}: {detail}")]
    StructuralInput { path: String, detail: String },
    #[error("{location}: field `{field}`: {message}")]
    Validation {
        location: String,
        field: String,
        message: String,
    },
    #[error("identity conflict: {detail}")]
    IdentityConflict { detail: String },
    #[error("{location}: unusable date `{value}`: {}", warnings.join("; "))]
    UnusableDate {
        location: String,
        value: String,
        warnings: Vec<String>,
    },
}

impl PipelineError {
    pub fn validation(
        location: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            location: location.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    DateAmbiguity,
    Resolution,
    NonInterferenceSkip,
    CrossField,
    Migration,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateAmbiguity => "date_ambiguity",
            Self::Resolution => "resolution",
            Self::NonInterferenceSkip => "non_interference_skip",
            Self::CrossField => "cross_field",
            Self::Migration => "migration",
        }
    }
}

/// A non-fatal finding. Warnings never block a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub location: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }

    /// Emit through `tracing` so build logs carry the structured fields.
    pub fn emit(&self) {
        tracing::warn!(
            kind = self.kind.as_str(),
            location = %self.location,
            "{}",
            self.message
        );
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.location, self.message)
    }
}

/// Push a warning into `sink` and log it.
pub(crate) fn record(sink: &mut Vec<Warning>, warning: Warning) {
    warning.emit();
    sink.push(warning);
}
