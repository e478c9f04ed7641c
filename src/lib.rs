//! # backup2s3
//!
//! Unattended backup of a local directory to S3, run once per invocation by an external
//! scheduler.
//!
//! ## Pipeline
//!
//! - **Archive**: `tar czf` of the source directory into a temporary directory, absolute
//!   paths preserved
//! - **Upload**: single PUT of the archive to the configured bucket and prefix; the local
//!   copy is removed only after a confirmed upload
//! - **Retention**: a lifecycle rule expiring old backups, noncurrent versions and stale
//!   multipart uploads
//! - **Report**: one email per run with the outcome and the exit code
//!
//! Each failure kind maps to a fixed exit code, see [`backup::outcome::FailureKind`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use backup2s3::backup::orchestrator::run;
//! use backup2s3::backup::run_config::RunConfig;
//!
//! let config = RunConfig::load("/etc/backup2s3.yml")?;
//! let outcome = run(&config);
//! std::process::exit(outcome.exit_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
