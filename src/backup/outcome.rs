//! Run outcome and exit-status mapping.
//!
//! Every failure a run can hit is classified by a [`FailureKind`], which maps one-to-one
//! onto the process exit code. A [`RunOutcome`] is produced once per run and feeds both the
//! report email and the process exit path.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use derive_more::Display;
use getset::{CopyGetters, Getters};
use std::fmt::{Display as FmtDisplay, Formatter};

pub static SUCCESS_EXIT_CODE: i32 = 0;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoConfigFile,
    ConfigOptionMissing,
    LocalDirError,
    TarFileError,
    BinaryMissing,
    UploadFailed,
    ListFailed,
    PolicyFailed,
    NotificationError,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::NoConfigFile => 10,
            FailureKind::ConfigOptionMissing => 11,
            FailureKind::LocalDirError => 12,
            FailureKind::TarFileError => 13,
            FailureKind::BinaryMissing => 14,
            FailureKind::UploadFailed => 15,
            FailureKind::ListFailed => 16,
            FailureKind::PolicyFailed => 17,
            FailureKind::NotificationError => 18,
        }
    }
}

/// A classified run failure: what went wrong and why.
#[derive(thiserror::Error, Debug, Getters, CopyGetters)]
#[error("{kind} (exit code {}): {error}", .kind.exit_code())]
pub struct Failure {
    #[getset(get_copy = "pub")]
    kind: FailureKind,
    #[getset(get = "pub")]
    error: Error,
}

impl Failure {
    pub fn new<E: Into<Error>>(kind: FailureKind, error: E) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

pub trait FailAs<T> {
    fn fail_as(self, kind: FailureKind) -> std::result::Result<T, Failure>;
}

impl<T> FailAs<T> for Result<T> {
    fn fail_as(self, kind: FailureKind) -> std::result::Result<T, Failure> {
        self.map_err(|e| Failure::new(kind, e))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Success { summary: String },
    Failure { kind: FailureKind, detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct RunOutcome {
    #[getset(get = "pub")]
    status: RunStatus,
    #[getset(get_copy = "pub")]
    exit_code: i32,
}

impl RunOutcome {
    pub fn success<S: Into<String>>(summary: S) -> Self {
        Self {
            status: RunStatus::Success {
                summary: summary.into(),
            },
            exit_code: SUCCESS_EXIT_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            RunStatus::Success { .. } => None,
            RunStatus::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<&Failure> for RunOutcome {
    fn from(failure: &Failure) -> Self {
        Self {
            status: RunStatus::Failure {
                kind: failure.kind(),
                detail: failure.error().to_string(),
            },
            exit_code: failure.exit_code(),
        }
    }
}

impl FmtDisplay for RunOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            RunStatus::Success { summary } => {
                writeln!(f, "Status: Success")?;
                writeln!(f, "Exit code: {}", self.exit_code)?;
                writeln!(f)?;
                write!(f, "{summary}")
            }
            RunStatus::Failure { kind, detail } => {
                writeln!(f, "Status: Failure ({kind})")?;
                writeln!(f, "Exit code: {}", self.exit_code)?;
                writeln!(f)?;
                write!(f, "{detail}")
            }
        }
    }
}
