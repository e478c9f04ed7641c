use crate::backup::outcome::{FailAs, Failure, FailureKind, RunOutcome};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::fmt::Display;

pub mod smtp;

/// Subject of every report email
pub static REPORT_SUBJECT: &str = "backup2s3 report";

pub trait Notification {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()>;
}

/// Sends the one report of a run.
pub fn notify<N: Notification>(
    notifier: &N,
    outcome: &RunOutcome,
) -> std::result::Result<(), Failure> {
    notifier
        .send(REPORT_SUBJECT, outcome)
        .add_msg("Sending run report failed")
        .fail_as(FailureKind::NotificationError)
}
