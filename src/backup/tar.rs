use crate::backup::function_path;
use crate::backup::outcome::{FailAs, Failure, FailureKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use chrono::{DateTime, Local, TimeZone};
use function_name::named;
use getset::Getters;
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;

static TIME_FORMAT: &str = "%Y%m%d%H%M%S";
static ARCHIVE_EXT: &str = ".tar.gz";
static ROOT_BASE_NAME: &str = "root";
static DEFAULT_TAR_BINARY: &str = "tar";

/// A finished archive waiting to be uploaded
#[derive(Clone, Debug, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct ArchiveArtifact {
    #[builder(into)]
    source_path: PathBuf,
    created_at: DateTime<Local>,
    #[builder(into)]
    file_name: String,
    #[builder(into)]
    local_temp_path: PathBuf,
}

pub trait Archiver {
    fn create_archive(&self, source: &Path) -> Result<ArchiveArtifact, Failure>;
}

/// `<basename>_<YYYYMMDDHHMMSS>.tar.gz`
pub fn archive_file_name<P: AsRef<Path>, Tz: TimeZone>(source: P, dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    let base_name = source
        .as_ref()
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or(ROOT_BASE_NAME.into());
    format!("{}_{}{}", base_name, dt.format(TIME_FORMAT), ARCHIVE_EXT)
}

/// Looks `name` up on `PATH` the way a shell would.
///
/// A name containing a path separator is checked as-is.
pub fn find_binary<S: AsRef<OsStr>>(name: S) -> Option<PathBuf> {
    let name = Path::new(name.as_ref());
    if name.components().count() > 1 {
        return is_executable(name).then(|| name.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|md| md.is_file() && md.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Archives a directory by running an external `tar`.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct TarArchiver {
    #[builder(into)]
    out_dir: PathBuf,
    #[builder(default = DEFAULT_TAR_BINARY.to_string(), into)]
    binary: String,
}

impl TarArchiver {
    fn check_source(&self, source: &Path) -> Result<PathBuf, Failure> {
        if !source.is_dir() {
            tracing::error!("Local directory {:?} not found", source);
            return Err(Failure::new(
                FailureKind::LocalDirError,
                Error::local_dir_missing(source),
            ));
        }
        let source = std::fs::canonicalize(source)
            .map_err(Error::from)
            .add_msg(format!("Cannot resolve local directory {:?}", source))
            .fail_as(FailureKind::LocalDirError)?;

        let out_dir = std::fs::canonicalize(&self.out_dir).unwrap_or(self.out_dir.clone());
        if out_dir.starts_with(&source) {
            return Err(Failure::new(
                FailureKind::LocalDirError,
                Error::invalid_option(
                    "tmp_dir",
                    format!("{:?} lies inside the backed up directory {:?}", out_dir, source),
                ),
            ));
        }
        Ok(source)
    }
}

impl Archiver for TarArchiver {
    #[named]
    fn create_archive(&self, source: &Path) -> Result<ArchiveArtifact, Failure> {
        let configured = source;
        let source = self.check_source(source)?;

        let binary = find_binary(&self.binary).ok_or_else(|| {
            Failure::new(
                FailureKind::BinaryMissing,
                Error::binary_missing(self.binary.as_str()),
            )
        })?;

        let created_at = Local::now();
        let file_name = match configured.file_name() {
            Some(_) => archive_file_name(configured, &created_at),
            None => archive_file_name(&source, &created_at),
        };
        let local_temp_path = self.out_dir.join(&file_name);
        tracing::info!("Creating archive {:?} from {:?}", local_temp_path, source);

        let output = Command::new(&binary)
            .arg("czf")
            .arg(&local_temp_path)
            .arg("-P")
            .arg(&source)
            .output()
            .map_err(Error::from)
            .add_msg(format!("Cannot run {:?}", binary))
            .add_fn_name(function_path!())
            .fail_as(FailureKind::TarFileError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!("Error while creating tar file {:?}: {}", local_temp_path, stderr);
            return Err(Failure::new(
                FailureKind::TarFileError,
                Error::archiver_exit(binary.to_string_lossy(), output.status, stderr)
                    .add_fn_name(function_path!()),
            ));
        }
        tracing::info!("Created archive {:?}", local_temp_path);

        Ok(ArchiveArtifact {
            source_path: source,
            created_at,
            file_name,
            local_temp_path,
        })
    }
}
