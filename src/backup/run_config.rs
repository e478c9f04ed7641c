use crate::backup::notifications::smtp::SmtpSettings;
use crate::backup::outcome::{FailAs, Failure, FailureKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::storage::s3::S3Settings;
use crate::backup::storage::RemoteTarget;
use crate::backup::validate::{validate_non_empty_path, validate_writable_dir};
use bon::Builder;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use lettre::message::Mailbox;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Name of the main configuration section
pub static MAIN_SECTION: &str = "backup2s3";

/// Configuration file as written on disk.
///
/// Required keys are optional here so that every missing one can be named.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    backup2s3: Option<MainSection>,
    #[serde(default)]
    s3: S3Settings,
    #[serde(default)]
    smtp: SmtpSettings,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MainSection {
    local_path: Option<PathBuf>,
    remote_path: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    retention: Option<i64>,
    notify_address: Option<String>,
    log_file: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
}

/// Everything one run needs, validated before any stage starts.
#[derive(Clone, Debug, Validate, Builder, Getters, CopyGetters)]
pub struct RunConfig {
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    #[getset(get = "pub")]
    local_path: PathBuf,
    #[getset(get = "pub")]
    remote: RemoteTarget,
    #[getset(get_copy = "pub")]
    retention_days: u32,
    #[getset(get = "pub")]
    notify_address: Mailbox,
    #[builder(into)]
    #[getset(get = "pub")]
    log_file: Option<PathBuf>,
    #[validate(custom(function = validate_writable_dir))]
    #[builder(default = std::env::temp_dir(), into)]
    #[getset(get = "pub")]
    tmp_dir: PathBuf,
    #[builder(default)]
    #[getset(get = "pub")]
    s3: S3Settings,
    #[validate(nested)]
    #[builder(default)]
    #[getset(get = "pub")]
    smtp: SmtpSettings,
}

impl TryFrom<ConfigFile> for RunConfig {
    type Error = Error;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let section = file
            .backup2s3
            .ok_or_else(|| Error::missing_option(MAIN_SECTION))?;

        let (local_path, remote_path, retention, notify_address) = match (
            section.local_path,
            section.remote_path,
            section.retention,
            section.notify_address,
        ) {
            (Some(local_path), Some(remote_path), Some(retention), Some(notify_address)) => {
                (local_path, remote_path, retention, notify_address)
            }
            (local_path, remote_path, retention, notify_address) => {
                let present = [
                    local_path.is_some(),
                    remote_path.is_some(),
                    retention.is_some(),
                    notify_address.is_some(),
                ];
                let missing = RunConfig::required_keys()
                    .zip(present)
                    .filter(|(_, present)| !present)
                    .map(|(key, _)| Error::missing_option(key))
                    .collect_vec();
                return Err(missing.into());
            }
        };

        let retention_days = u32::try_from(retention).map_err(|_| {
            Error::invalid_option("retention", format!("{retention} is not a non-negative integer"))
        })?;
        let remote = remote_path.parse::<RemoteTarget>()?;
        let notify_address = notify_address
            .parse::<Mailbox>()
            .map_err(Error::from)
            .add_msg(format!("Invalid notify_address {notify_address:?}"))?;

        Ok(Self::builder()
            .local_path(local_path)
            .remote(remote)
            .retention_days(retention_days)
            .notify_address(notify_address)
            .maybe_log_file(section.log_file)
            .tmp_dir(section.tmp_dir.unwrap_or_else(std::env::temp_dir))
            .s3(file.s3)
            .smtp(file.smtp)
            .build())
    }
}

impl RunConfig {
    /// Loads and validates the configuration file.
    ///
    /// A missing file is `NoConfigFile`; anything else wrong with it is `ConfigOptionMissing`.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<RunConfig, Failure> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Failure::new(
                FailureKind::NoConfigFile,
                Error::no_config_file(path),
            ));
        }

        File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, ConfigFile>(f).map_err(Error::from))
            .add_msg(format!("Parse YAML config failed: {:?}", path))
            .and_then(|file| {
                RunConfig::try_from(file)
                    .add_msg(format!("Incomplete configuration: {:?}", path))
            })
            .and_then(|config| {
                config
                    .validate()
                    .map_err(Error::from)
                    .map(|_| config)
                    .add_msg(format!("Config validation failed: {:?}", path))
            })
            .fail_as(FailureKind::ConfigOptionMissing)
    }

    /// Names of the required keys, in the order they are checked
    pub fn required_keys() -> impl Iterator<Item = &'static str> {
        ["local_path", "remote_path", "retention", "notify_address"].into_iter()
    }

    pub fn describe(&self) -> String {
        format!(
            "{:?} -> {} (retention {} days, report to {})",
            self.local_path,
            self.remote,
            self.retention_days,
            self.notify_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("backup2s3.yml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn full_config(dir: &TempDir) -> String {
        format!(
            "backup2s3:\n  \
               local_path: /srv/data\n  \
               remote_path: s3://bucket/nightly\n  \
               retention: 30\n  \
               notify_address: ops@example.com\n  \
               tmp_dir: {}\n",
            dir.path().join("tmp").display()
        )
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let failure = RunConfig::load(dir.path().join("nope.yml")).unwrap_err();

        assert_eq!(failure.kind(), FailureKind::NoConfigFile);
        assert_eq!(failure.exit_code(), 10);
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &full_config(&dir));

        let config = RunConfig::load(&path).unwrap();

        assert_eq!(config.local_path(), Path::new("/srv/data"));
        assert_eq!(config.remote().bucket(), "bucket");
        assert_eq!(config.remote().prefix(), "nightly/");
        assert_eq!(config.retention_days(), 30);
        assert_eq!(config.notify_address().email.to_string(), "ops@example.com");
        assert_eq!(config.log_file(), &None);
        assert_eq!(config.tmp_dir(), &dir.path().join("tmp"));
        assert!(config.tmp_dir().is_dir());
        assert_eq!(config.smtp().host(), "localhost");
    }

    #[test]
    fn test_load_missing_notify_address() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "backup2s3:\n  local_path: /srv/data\n  remote_path: bucket\n  retention: 30\n",
        );

        let failure = RunConfig::load(&path).unwrap_err();

        assert_eq!(failure.kind(), FailureKind::ConfigOptionMissing);
        assert_eq!(failure.exit_code(), 11);
        assert!(failure.error().to_string().contains("\"notify_address\" option missing"));
    }

    #[test]
    fn test_load_names_every_missing_option() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "backup2s3:\n  local_path: /srv/data\n");

        let message = RunConfig::load(&path).unwrap_err().error().to_string();

        for key in RunConfig::required_keys().skip(1) {
            assert!(message.contains(&format!("{key:?} option missing")), "{key}");
        }
        assert!(!message.contains("\"local_path\" option missing"));
    }

    #[test]
    fn test_load_missing_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "smtp:\n  host: relay.example.com\n");

        let failure = RunConfig::load(&path).unwrap_err();

        assert_eq!(failure.kind(), FailureKind::ConfigOptionMissing);
        assert!(failure.error().to_string().contains("\"backup2s3\" option missing"));
    }

    #[test]
    fn test_load_retention_as_string() {
        let dir = TempDir::new().unwrap();
        let content = full_config(&dir).replace("retention: 30", "retention: \"14\"");
        let path = write_config(&dir, &content);

        assert_eq!(RunConfig::load(&path).unwrap().retention_days(), 14);
    }

    #[test]
    fn test_load_zero_retention_is_deferred() {
        let dir = TempDir::new().unwrap();
        let content = full_config(&dir).replace("retention: 30", "retention: 0");
        let path = write_config(&dir, &content);

        assert_eq!(RunConfig::load(&path).unwrap().retention_days(), 0);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let replacements = [
            ("retention: 30", "retention: -1"),
            ("retention: 30", "retention: thirty"),
            ("remote_path: s3://bucket/nightly", "remote_path: s3://"),
            ("notify_address: ops@example.com", "notify_address: not an address"),
            ("local_path: /srv/data", "local_path: \"\""),
            ("retention: 30", "retention: 30\n  unknown_key: 1"),
        ];

        for (from, to) in replacements {
            let path = write_config(&dir, &full_config(&dir).replace(from, to));
            let failure = RunConfig::load(&path).unwrap_err();
            assert_eq!(failure.kind(), FailureKind::ConfigOptionMissing, "{to}");
        }
    }

    #[test]
    fn test_load_optional_sections() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}  log_file: /var/log/backup2s3.log\n\
             s3:\n  region: eu-west-1\n  force_path_style: true\n\
             smtp:\n  host: relay.example.com\n  port: 2525\n",
            full_config(&dir)
        );
        let path = write_config(&dir, &content);

        let config = RunConfig::load(&path).unwrap();

        assert_eq!(
            config.log_file().as_deref(),
            Some(Path::new("/var/log/backup2s3.log"))
        );
        assert_eq!(config.s3().region().as_deref(), Some("eu-west-1"));
        assert!(config.s3().force_path_style());
        assert_eq!(config.smtp().host(), "relay.example.com");
        assert_eq!(config.smtp().port(), Some(2525));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "backup2s3: [unclosed\n");

        let failure = RunConfig::load(&path).unwrap_err();
        assert_eq!(failure.kind(), FailureKind::ConfigOptionMissing);
    }
}
