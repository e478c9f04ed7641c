//! In-memory stand-ins for the archiver, object store and mail transport.

use crate::backup::notifications::Notification;
use crate::backup::outcome::{Failure, FailureKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::AddMsg;
use crate::backup::result_error::result::Result;
use crate::backup::retention::RetentionPolicy;
use crate::backup::storage::ObjectStore;
use crate::backup::tar::{archive_file_name, ArchiveArtifact, Archiver};
use bon::Builder;
use chrono::Local;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Builder)]
pub struct FakeStore {
    #[builder(default)]
    fail_upload: bool,
    #[builder(default)]
    fail_lifecycle: bool,
    #[builder(default)]
    fail_list: bool,
    #[builder(skip)]
    objects: RefCell<BTreeMap<String, BTreeSet<String>>>,
    #[builder(skip)]
    uploads: RefCell<Vec<(String, String)>>,
    #[builder(skip)]
    lifecycles: RefCell<BTreeMap<String, Vec<RetentionPolicy>>>,
    #[builder(skip)]
    lifecycle_calls: Cell<usize>,
    #[builder(skip)]
    list_calls: Cell<usize>,
}

impl FakeStore {
    pub fn insert_object(&self, bucket: &str, key: &str) {
        self.objects
            .borrow_mut()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string());
    }

    pub fn uploaded_keys(&self) -> Vec<(String, String)> {
        self.uploads.borrow().clone()
    }

    pub fn lifecycle(&self, bucket: &str) -> Option<Vec<RetentionPolicy>> {
        self.lifecycles.borrow().get(bucket).cloned()
    }

    pub fn lifecycle_calls(&self) -> usize {
        self.lifecycle_calls.get()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }
}

impl ObjectStore for FakeStore {
    fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        if self.fail_upload {
            return Err(Error::object_store("AccessDenied: fake upload failure"));
        }
        if !local_path.is_file() {
            return Err(Error::object_store(format!("{local_path:?} does not exist")));
        }
        self.insert_object(bucket, key);
        self.uploads
            .borrow_mut()
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn put_lifecycle(&self, bucket: &str, policy: &RetentionPolicy) -> Result<()> {
        self.lifecycle_calls.set(self.lifecycle_calls.get() + 1);
        if self.fail_lifecycle {
            return Err(Error::object_store("AccessDenied: fake lifecycle failure"));
        }
        self.lifecycles
            .borrow_mut()
            .insert(bucket.to_string(), vec![policy.clone()]);
        Ok(())
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.fail_list {
            return Err(Error::object_store("AccessDenied: fake list failure"));
        }
        Ok(self
            .objects
            .borrow()
            .get(bucket)
            .map(|keys| {
                keys.iter()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Writes a small file named like a real archive, or fails with `fail_with`.
#[derive(Debug, Builder)]
pub struct FakeArchiver {
    #[builder(into)]
    out_dir: PathBuf,
    fail_with: Option<FailureKind>,
    #[builder(skip)]
    calls: Cell<usize>,
}

impl FakeArchiver {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Archiver for FakeArchiver {
    fn create_archive(&self, source: &Path) -> std::result::Result<ArchiveArtifact, Failure> {
        self.calls.set(self.calls.get() + 1);
        if let Some(kind) = self.fail_with {
            let error = match kind {
                FailureKind::LocalDirError => Error::local_dir_missing(source),
                FailureKind::BinaryMissing => Error::binary_missing("tar"),
                _ => Error::from(std::io::Error::other("tar: fake archive failure"))
                    .add_msg(format!("Error while creating tar file from {:?}", source)),
            };
            return Err(Failure::new(kind, error));
        }
        let created_at = Local::now();
        let file_name = archive_file_name(source, &created_at);
        let local_temp_path = self.out_dir.join(&file_name);
        std::fs::write(&local_temp_path, "fake archive").map_err(|e| {
            Failure::new(FailureKind::TarFileError, e)
        })?;
        Ok(ArchiveArtifact::builder()
            .source_path(source)
            .created_at(created_at)
            .file_name(file_name)
            .local_temp_path(local_temp_path)
            .build())
    }
}

#[derive(Debug, Default, Builder)]
pub struct FakeNotifier {
    #[builder(default)]
    fail: bool,
    #[builder(skip)]
    sent: RefCell<Vec<(String, String)>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.borrow().clone()
    }
}

impl Notification for FakeNotifier {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        self.sent
            .borrow_mut()
            .push((topic.to_string(), msg.to_string()));
        if self.fail {
            return Err(Error::smtp_send_error("554 fake relay refused"));
        }
        Ok(())
    }
}
