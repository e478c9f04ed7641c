//! S3 implementation of [`ObjectStore`].
//!
//! The SDK is async; every call is driven to completion on a private current-thread
//! runtime so the rest of the pipeline stays blocking and sequential.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use crate::backup::retention::RetentionPolicy;
use crate::backup::storage::ObjectStore;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, ExpirationStatus,
    LifecycleExpiration, LifecycleRule, LifecycleRuleFilter, NoncurrentVersionExpiration,
};
use aws_sdk_s3::Client;
use bon::Builder;
use function_name::named;
use getset::{CopyGetters, Getters};
use serde::Deserialize;
use std::path::Path;
use tokio::runtime::Runtime;

/// Connection settings for the object store.
///
/// Everything is optional; unset values come from the usual AWS environment
/// (`AWS_REGION`, profiles, instance metadata).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct S3Settings {
    #[builder(into)]
    #[getset(get = "pub")]
    region: Option<String>,
    /// Custom endpoint for S3-compatible stores such as MinIO
    #[builder(into)]
    #[getset(get = "pub")]
    endpoint_url: Option<String>,
    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    force_path_style: bool,
}

pub struct S3Store {
    runtime: Runtime,
    client: Client,
}

fn sdk_error<E: std::error::Error>(error: E) -> Error {
    Error::object_store(DisplayErrorContext(error).to_string())
}

impl S3Store {
    pub fn connect(settings: &S3Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = settings.region() {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint_url) = settings.endpoint_url() {
                loader = loader.endpoint_url(endpoint_url);
            }
            let sdk_config = loader.load().await;
            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(settings.force_path_style())
                .build();
            Client::from_conf(s3_config)
        });
        tracing::debug!("S3 client ready with settings {:?}", settings);

        Ok(Self { runtime, client })
    }
}

/// Converts the policy into a single-rule lifecycle configuration.
pub fn lifecycle_configuration(policy: &RetentionPolicy) -> Result<BucketLifecycleConfiguration> {
    let days = |value: u32, field: &str| {
        i32::try_from(value)
            .map_err(|_| Error::invalid_option(field, format!("{value} days is out of range")))
    };

    let rule = LifecycleRule::builder()
        .id(policy.rule_id())
        .status(ExpirationStatus::Enabled)
        .filter(
            LifecycleRuleFilter::builder()
                .prefix(policy.prefix_filter())
                .build(),
        )
        .expiration(
            LifecycleExpiration::builder()
                .days(days(policy.expiration_days(), "expiration_days")?)
                .build(),
        )
        .noncurrent_version_expiration(
            NoncurrentVersionExpiration::builder()
                .noncurrent_days(days(
                    policy.noncurrent_version_expiration_days(),
                    "noncurrent_version_expiration_days",
                )?)
                .build(),
        )
        .abort_incomplete_multipart_upload(
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(days(
                    policy.abort_incomplete_multipart_days(),
                    "abort_incomplete_multipart_days",
                )?)
                .build(),
        )
        .build()
        .map_err(sdk_error)?;

    BucketLifecycleConfiguration::builder()
        .rules(rule)
        .build()
        .map_err(sdk_error)
}

impl ObjectStore for S3Store {
    #[named]
    fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        self.runtime
            .block_on(async {
                let body = ByteStream::from_path(local_path).await.map_err(sdk_error)?;
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(body)
                    .send()
                    .await
                    .map_err(sdk_error)
            })
            .map(|output| {
                tracing::debug!("PutObject {key:?} returned etag {:?}", output.e_tag());
            })
            .add_fn_name(function_path!())
    }

    #[named]
    fn put_lifecycle(&self, bucket: &str, policy: &RetentionPolicy) -> Result<()> {
        let configuration = lifecycle_configuration(policy)?;
        self.runtime
            .block_on(
                self.client
                    .put_bucket_lifecycle_configuration()
                    .bucket(bucket)
                    .lifecycle_configuration(configuration)
                    .send(),
            )
            .map(|_| ())
            .map_err(sdk_error)
            .add_fn_name(function_path!())
    }

    #[named]
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.runtime
            .block_on(async {
                let mut keys = Vec::new();
                let mut continuation_token = None;
                loop {
                    let output = self
                        .client
                        .list_objects_v2()
                        .bucket(bucket)
                        .prefix(prefix)
                        .set_continuation_token(continuation_token)
                        .send()
                        .await
                        .map_err(sdk_error)?;
                    keys.extend(
                        output
                            .contents()
                            .iter()
                            .filter_map(|object| object.key())
                            .map(str::to_owned),
                    );
                    match output.next_continuation_token() {
                        Some(token) => continuation_token = Some(token.to_owned()),
                        None => break,
                    }
                }
                Ok(keys)
            })
            .add_fn_name(function_path!())
    }
}
