use crate::backup::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    LettreAddress(#[from] lettre::address::AddressError),
    #[error(transparent)]
    Lettre(#[from] lettre::error::Error),
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Configuration file {0:?} not found")]
    NoConfigFile(PathBuf),
    #[error("{0:?} option missing in configuration file")]
    MissingOption(String),
    #[error("Invalid value for {key:?}: {reason}")]
    InvalidOption { key: String, reason: String },
    #[error("Local directory {0:?} not found")]
    LocalDirMissing(PathBuf),
    #[error("{0:?} not found on PATH")]
    BinaryMissing(String),
    #[error("{binary} exited with {status}: {stderr}")]
    ArchiverExit {
        binary: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{0}")]
    ObjectStore(String),
    #[error("{0}")]
    SmtpSendError(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }
}
