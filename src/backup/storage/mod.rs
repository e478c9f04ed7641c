pub mod s3;

use crate::backup::outcome::{FailAs, Failure, FailureKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::retention::RetentionPolicy;
use crate::backup::tar::ArchiveArtifact;
use derive_more::Display;
use getset::Getters;
use std::path::Path;
use std::str::FromStr;

static S3_SCHEME: &str = "s3://";

/// Bucket and key prefix the archives are stored under.
///
/// Parsed from `s3://bucket/prefix`, `bucket/prefix` or a bare `bucket`. A non-empty
/// prefix always ends with a single `/`.
#[derive(Clone, Debug, Display, PartialEq, Eq, Getters)]
#[display("s3://{bucket}/{prefix}")]
#[getset(get = "pub")]
pub struct RemoteTarget {
    bucket: String,
    prefix: String,
}

impl RemoteTarget {
    pub fn key_for<S: AsRef<str>>(&self, file_name: S) -> String {
        format!("{}{}", self.prefix, file_name.as_ref())
    }
}

impl FromStr for RemoteTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let without_scheme = trimmed.strip_prefix(S3_SCHEME).unwrap_or(trimmed);
        let (bucket, prefix) = without_scheme
            .split_once('/')
            .unwrap_or((without_scheme, ""));
        if bucket.is_empty() {
            return Err(Error::invalid_option(
                "remote_path",
                format!("no bucket name in {s:?}"),
            ));
        }

        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        Ok(Self {
            bucket: bucket.to_owned(),
            prefix,
        })
    }
}

/// The object storage operations a run needs.
pub trait ObjectStore {
    fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()>;

    /// Replaces the whole lifecycle configuration of `bucket` with `policy`.
    fn put_lifecycle(&self, bucket: &str, policy: &RetentionPolicy) -> Result<()>;

    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// Uploads the archive under its file name, returning the object key.
///
/// The local file is left untouched whatever the result.
pub fn upload<S: ObjectStore>(
    store: &S,
    target: &RemoteTarget,
    artifact: &ArchiveArtifact,
) -> std::result::Result<String, Failure> {
    let key = target.key_for(artifact.file_name());
    tracing::info!(
        "Uploading {:?} to s3://{}/{}",
        artifact.local_temp_path(),
        target.bucket(),
        key
    );
    store
        .put_file(target.bucket(), &key, artifact.local_temp_path())
        .add_msg(format!(
            "Upload of {:?} to s3://{}/{} failed",
            artifact.local_temp_path(),
            target.bucket(),
            key
        ))
        .fail_as(FailureKind::UploadFailed)?;
    tracing::info!("Upload of {} finished", key);
    Ok(key)
}

/// Lists the archives of `source_name` currently stored under the target prefix.
pub fn list_backups<S: ObjectStore>(
    store: &S,
    target: &RemoteTarget,
    source_name: &str,
) -> std::result::Result<Vec<String>, Failure> {
    let prefix = target.key_for(format!("{source_name}_"));
    store
        .list_keys(target.bucket(), &prefix)
        .add_msg(format!(
            "Listing s3://{}/{} failed",
            target.bucket(),
            prefix
        ))
        .fail_as(FailureKind::ListFailed)
}
