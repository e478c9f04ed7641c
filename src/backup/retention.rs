use crate::backup::outcome::{FailAs, Failure, FailureKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::storage::{ObjectStore, RemoteTarget};
use bon::Builder;
use getset::{CopyGetters, Getters};
use validator::Validate;

/// Identifier of the lifecycle rule owned by this tool.
pub static RETENTION_RULE_ID: &str = "backup2s3-retention";

/// Lifecycle rule applied to the backup bucket.
///
/// All day counts are at least one, object stores reject zero-day lifecycle rules.
#[derive(Clone, Debug, PartialEq, Eq, Validate, Builder, Getters, CopyGetters)]
pub struct RetentionPolicy {
    #[builder(default = RETENTION_RULE_ID.to_string(), into)]
    #[getset(get = "pub")]
    rule_id: String,
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    expiration_days: u32,
    #[builder(default, into)]
    #[getset(get = "pub")]
    prefix_filter: String,
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    noncurrent_version_expiration_days: u32,
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    abort_incomplete_multipart_days: u32,
}

impl RetentionPolicy {
    /// Policy expiring objects, noncurrent versions and stale multipart uploads after `days`.
    pub fn from_days<S: Into<String>>(days: u32, prefix_filter: S) -> Result<Self> {
        let policy = Self::builder()
            .expiration_days(days)
            .prefix_filter(prefix_filter)
            .noncurrent_version_expiration_days(days)
            .abort_incomplete_multipart_days(days)
            .build();
        policy
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Retention of {days} days is not applicable"))?;
        Ok(policy)
    }
}

/// Installs the retention policy for `target`, replacing whatever lifecycle rules the
/// bucket had.
pub fn apply_retention<S: ObjectStore>(
    store: &S,
    target: &RemoteTarget,
    retention_days: u32,
) -> std::result::Result<RetentionPolicy, Failure> {
    let policy = RetentionPolicy::from_days(retention_days, target.prefix().as_str())
        .fail_as(FailureKind::PolicyFailed)?;
    tracing::info!(
        "Applying retention rule {:?} ({} days) on s3://{}/{}",
        policy.rule_id(),
        policy.expiration_days(),
        target.bucket(),
        policy.prefix_filter()
    );
    store
        .put_lifecycle(target.bucket(), &policy)
        .add_msg(format!(
            "Setting lifecycle configuration on bucket {:?} failed",
            target.bucket()
        ))
        .fail_as(FailureKind::PolicyFailed)?;
    Ok(policy)
}
