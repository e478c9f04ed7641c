//! The backup run as an explicit state machine.
//!
//! ```text
//! Configured -> Archived -> Uploaded -> Retained -> Notified
//!      \            \           \           \
//!       +------------+-----------+-----------+--> Failed -> Notified
//! ```
//!
//! Configuration is loaded before the machine exists, so a config failure never
//! reaches `Notified`. Every other path sends exactly one report.

use crate::backup::notifications::smtp::SmtpNotifier;
use crate::backup::notifications::{notify, Notification};
use crate::backup::outcome::{FailAs, Failure, FailureKind, RunOutcome};
use crate::backup::retention::{apply_retention, RetentionPolicy};
use crate::backup::run_config::RunConfig;
use crate::backup::storage::s3::S3Store;
use crate::backup::storage::{list_backups, upload, ObjectStore};
use crate::backup::tar::{ArchiveArtifact, Archiver, TarArchiver};
use itertools::Itertools;
use std::io::ErrorKind;
use tracing::{error, info, warn};

#[derive(Debug)]
enum Stage {
    Configured,
    Archived(ArchiveArtifact),
    Uploaded {
        artifact: ArchiveArtifact,
        key: String,
    },
    Retained {
        artifact: ArchiveArtifact,
        key: String,
        policy: RetentionPolicy,
    },
    Failed(Failure),
    Notified(RunOutcome),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Configured => "configured",
            Stage::Archived(_) => "archived",
            Stage::Uploaded { .. } => "uploaded",
            Stage::Retained { .. } => "retained",
            Stage::Failed(_) => "failed",
            Stage::Notified(_) => "notified",
        }
    }
}

/// Sends the report for `outcome` and settles the final exit status.
///
/// A transport failure keeps the code of a failed run and turns a successful run into
/// `NotificationError`.
pub fn report<N: Notification>(notifier: &N, outcome: RunOutcome) -> RunOutcome {
    match notify(notifier, &outcome) {
        Ok(()) => {
            info!("Report sent, run finished with exit code {}", outcome.exit_code());
            outcome
        }
        Err(failure) => {
            error!("{failure}");
            if outcome.is_success() {
                RunOutcome::from(&failure)
            } else {
                outcome
            }
        }
    }
}

pub struct Pipeline<'a, A, S, N> {
    config: &'a RunConfig,
    archiver: &'a A,
    store: &'a S,
    notifier: &'a N,
}

impl<'a, A: Archiver, S: ObjectStore, N: Notification> Pipeline<'a, A, S, N> {
    pub fn new(config: &'a RunConfig, archiver: &'a A, store: &'a S, notifier: &'a N) -> Self {
        Self {
            config,
            archiver,
            store,
            notifier,
        }
    }

    pub fn run(&self) -> RunOutcome {
        info!("Starting backup {}", self.config.describe());
        let mut stage = Stage::Configured;
        loop {
            stage = match stage {
                Stage::Notified(outcome) => return outcome,
                stage => {
                    let from = stage.name();
                    let next = self.step(stage);
                    if let Stage::Failed(failure) = &next {
                        error!("Backup failed after stage {from}: {failure}");
                    }
                    next
                }
            };
        }
    }

    fn step(&self, stage: Stage) -> Stage {
        match stage {
            Stage::Configured => match self.archiver.create_archive(self.config.local_path()) {
                Ok(artifact) => Stage::Archived(artifact),
                Err(failure) => Stage::Failed(failure),
            },
            Stage::Archived(artifact) => {
                match upload(self.store, self.config.remote(), &artifact) {
                    Ok(key) => {
                        remove_local_archive(&artifact);
                        Stage::Uploaded { artifact, key }
                    }
                    Err(failure) => {
                        warn!(
                            "Keeping local archive {:?} for manual recovery",
                            artifact.local_temp_path()
                        );
                        Stage::Failed(failure)
                    }
                }
            }
            Stage::Uploaded { artifact, key } => {
                match apply_retention(self.store, self.config.remote(), self.config.retention_days())
                {
                    Ok(policy) => Stage::Retained {
                        artifact,
                        key,
                        policy,
                    },
                    Err(failure) => Stage::Failed(failure),
                }
            }
            Stage::Retained {
                artifact,
                key,
                policy,
            } => {
                let summary = self.success_summary(&artifact, &key, &policy);
                Stage::Notified(report(self.notifier, RunOutcome::success(summary)))
            }
            Stage::Failed(failure) => Stage::Notified(report(self.notifier, RunOutcome::from(&failure))),
            Stage::Notified(outcome) => Stage::Notified(outcome),
        }
    }

    fn success_summary(
        &self,
        artifact: &ArchiveArtifact,
        key: &str,
        policy: &RetentionPolicy,
    ) -> String {
        let source_name = artifact
            .file_name()
            .rsplit_once('_')
            .map(|(base, _)| base)
            .unwrap_or(artifact.file_name().as_str());
        // Best effort: the archive is already stored and retained.
        let stored = match list_backups(self.store, self.config.remote(), source_name) {
            Ok(stored) => format!(
                "{} backups currently stored:\n{}",
                stored.len(),
                stored.iter().map(|k| format!("  {k}")).join("\n")
            ),
            Err(failure) => {
                warn!("Cannot list stored backups: {failure}");
                format!("stored backups unavailable: {}", failure.error())
            }
        };

        format!(
            "Backup of {:?} created at {} uploaded to s3://{}/{}.\n\
             Retention rule {:?} expires objects under {:?} after {} days.\n\
             {}",
            artifact.source_path(),
            artifact.created_at().format("%Y-%m-%d %H:%M:%S %z"),
            self.config.remote().bucket(),
            key,
            policy.rule_id(),
            policy.prefix_filter(),
            policy.expiration_days(),
            stored
        )
    }
}

/// Deletes the local archive after a confirmed upload; failures are only logged.
fn remove_local_archive(artifact: &ArchiveArtifact) {
    match std::fs::remove_file(artifact.local_temp_path()) {
        Ok(()) => info!("Removed local archive {:?}", artifact.local_temp_path()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove local archive {:?}: {}",
            artifact.local_temp_path(),
            e
        ),
    }
}

/// Runs one backup against the real collaborators: `tar`, S3 and SMTP.
pub fn run(config: &RunConfig) -> RunOutcome {
    let notifier = SmtpNotifier::builder()
        .settings(config.smtp().clone())
        .to(config.notify_address().clone())
        .build();
    let archiver = TarArchiver::builder().out_dir(config.tmp_dir()).build();

    match S3Store::connect(config.s3()).fail_as(FailureKind::UploadFailed) {
        Ok(store) => Pipeline::new(config, &archiver, &store, &notifier).run(),
        Err(failure) => {
            error!("Cannot set up object storage client: {failure}");
            report(&notifier, RunOutcome::from(&failure))
        }
    }
}
