use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use std::fmt::Display;
use validator::Validate;

static DEFAULT_HOST: &str = "localhost";
static DEFAULT_FROM: &str = "backup2s3@localhost";

/// Settings for the SMTP relay the report is submitted to
///
/// Defaults to an unsecured local relay on port 25. Credentials are only used when
/// both `username` and `password` are set; the password is kept in a `RedactedString`
/// so it never reaches the logs.
#[derive(Clone, Debug, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct SmtpSettings {
    #[serde(default = "default_host")]
    #[builder(default = default_host(), into)]
    #[getset(get = "pub")]
    host: String,
    #[getset(get_copy = "pub")]
    port: Option<u16>,
    #[serde(default)]
    #[builder(default)]
    #[getset(get = "pub")]
    smtp_mode: SmtpMode,
    #[getset(get = "pub")]
    from: Option<Mailbox>,
    #[builder(into)]
    #[getset(get = "pub")]
    username: Option<String>,
    #[validate(nested)]
    #[getset(get = "pub")]
    password: Option<RedactedString>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// SMTP connection security modes
///
/// - `Unsecured`: Plain text connection, fine for a local relay
/// - `Ssl`: SSL/TLS encrypted connection from start
/// - `StartTls`: Start with plain text, then upgrade to TLS
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmtpMode {
    #[default]
    Unsecured,
    Ssl,
    StartTls,
}

/// Delivers the report to a single recipient over SMTP.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct SmtpNotifier {
    settings: SmtpSettings,
    to: Mailbox,
}

impl SmtpNotifier {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.settings.username, &self.settings.password) {
            (Some(username), Some(password)) => Some(Credentials::new(
                username.clone(),
                password.inner().to_string(),
            )),
            _ => None,
        }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let host = self.settings.host.as_str();
        let builder = match self.settings.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(host)),
            SmtpMode::Ssl => SmtpTransport::relay(host),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(host),
        }
        .map_err(Error::from)
        .add_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            self.settings.host, self.settings.smtp_mode
        ))?;

        let builder = match self.settings.port {
            Some(port) => builder.port(port),
            None => builder,
        };
        let builder = match self.credentials() {
            Some(creds) => builder.credentials(creds),
            None => builder,
        };
        Ok(builder.build())
    }
}

impl Notification for SmtpNotifier {
    #[named]
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        let from = match &self.settings.from {
            Some(from) => from.clone(),
            None => DEFAULT_FROM.parse::<Mailbox>()?,
        };
        tracing::info!(
            "Started smtp email notification from {:?} to {:?}",
            from,
            self.to
        );
        let email = Message::builder()
            .from(from.clone())
            .to(self.to.clone())
            .subject(format!("{}", topic))
            .header(ContentType::TEXT_PLAIN)
            .body(format!("{}", msg))
            .map_err(Error::from)
            .add_msg(format!(
                "Fail to build notification email from {:?} to {:?}",
                from, self.to
            ))
            .add_fn_name(function_path!())?;

        let mailer = self.transport().add_fn_name(function_path!())?;

        tracing::info!("Sending email...");
        let response = mailer
            .send(&email)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        if response.is_positive() {
            Ok(())
        } else {
            let error_vec = response
                .message()
                .map(|m| Error::smtp_send_error(m.to_owned()))
                .collect_vec();
            Err(Error::lots_of_error(error_vec))
        }
    }
}
