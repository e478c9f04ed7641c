//! Validation functions for configuration values.
//!
//! Provides custom validation functions for paths and directories referenced
//! by the run configuration.

use validator::ValidationError;

use std::path::Path;

pub fn validate_non_empty_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    if path.as_ref().as_os_str().is_empty() {
        return Err(ValidationError::new("EmptyPath").with_message("path must not be empty".into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access tmp_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    tempfile::tempfile_in(dir).map(drop).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}: {}", dir, e).into())
    })
}
