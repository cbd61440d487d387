//! Failure reports for operators: a delimited text block on stderr, and
//! optionally the same block by email.

use std::backtrace::Backtrace;
use std::fmt::{self, Write as _};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::error;

use crate::config::SmtpConfig;

pub mod mailer;

pub use mailer::{MailError, Mailer, SmtpMailer};

const RULE: &str = "===================";

/// A failure while building the report itself.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("could not format report timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

fn format_report(
    error: &dyn fmt::Debug,
    message: Option<&str>,
    at: OffsetDateTime,
) -> Result<String, ReportError> {
    let timestamp = at.format(&Rfc3339)?;
    let mut report = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(report, "{RULE}");
    let _ = writeln!(report, "{timestamp}");
    if let Some(message) = message {
        let _ = writeln!(report, "{message}");
    }
    let _ = writeln!(report, "ERROR:\n{error:?}");
    let _ = writeln!(report, "{}", Backtrace::force_capture());
    let _ = writeln!(report, "{RULE}");
    Ok(report)
}

fn log_error_at<E: fmt::Debug + ?Sized>(
    error: &E,
    message: Option<&str>,
    reraise: bool,
    at: OffsetDateTime,
) -> Result<Option<String>, ReportError> {
    match format_report(&error, message, at) {
        Ok(report) => {
            eprintln!("{report}");
            error!(context = message.unwrap_or(""), "error report written to stderr");
            Ok(Some(report))
        }
        Err(e) => {
            println!("\n!!!! ERROR IN log_error !!!!");
            if reraise {
                return Err(e);
            }
            Ok(None)
        }
    }
}

/// Writes a timestamped report of `error` to stderr and returns it.
///
/// A failure while building the report is printed to stdout and yields
/// `Ok(None)`, unless `reraise` is set, in which case it is returned.
pub fn log_error<E: fmt::Debug + ?Sized>(
    error: &E,
    message: Option<&str>,
    reraise: bool,
) -> Result<Option<String>, ReportError> {
    log_error_at(error, message, reraise, OffsetDateTime::now_utc())
}

/// Logs `error` and mails the report to `recipients`, or to the configured
/// sysadmins when `None`. Never fails: report and delivery problems are
/// only logged.
pub async fn log_and_email_error<E: fmt::Debug + ?Sized>(
    mailer: &dyn Mailer,
    config: &SmtpConfig,
    error: &E,
    message: Option<&str>,
    recipients: Option<&[String]>,
) {
    let report = match log_error(error, message, true) {
        Ok(Some(report)) => report,
        Ok(None) => return,
        Err(e) => {
            println!("\n!!!! ERROR IN log_and_email_error: {e} !!!!");
            error!(error = %e, "failed to build error report");
            return;
        }
    };

    let recipients = recipients.unwrap_or(&config.sysadmin_emails);
    let sent = tokio::time::timeout(
        config.timeout(),
        mailer.send(&config.from_address, recipients, &config.subject, &report),
    )
    .await
    .unwrap_or(Err(MailError::Timeout));

    if let Err(e) = sent {
        println!("\n!!!! ERROR IN log_and_email_error: {e} !!!!");
        error!(error = %e, "failed to email error report");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, Vec<String>, String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            from: &str,
            to: &[String],
            subject: &str,
            body: &str,
        ) -> Result<(), MailError> {
            self.sent.lock().unwrap().push((
                from.to_string(),
                to.to_vec(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    struct DownMailer;

    #[async_trait]
    impl Mailer for DownMailer {
        async fn send(&self, _: &str, _: &[String], _: &str, _: &str) -> Result<(), MailError> {
            Err(MailError::NoRecipients)
        }
    }

    struct StuckMailer;

    #[async_trait]
    impl Mailer for StuckMailer {
        async fn send(&self, _: &str, _: &[String], _: &str, _: &str) -> Result<(), MailError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".into(),
            port: 25,
            timeout_seconds: 1,
            from_address: "e500@localhost".into(),
            sysadmin_emails: vec!["ops@example.org".into()],
            subject: "500 Error".into(),
        }
    }

    #[test]
    fn report_is_delimited_and_carries_message() {
        let report = log_error("disk full", Some("while uploading"), false)
            .unwrap()
            .unwrap();
        assert!(report.starts_with("===================\n"));
        assert!(report.ends_with("===================\n"));
        assert!(report.contains("while uploading\nERROR:\n\"disk full\"\n"));
    }

    #[test]
    fn reraise_still_returns_the_report() {
        let report = log_error(&std::io::Error::other("boom"), Some("ctx"), true)
            .unwrap()
            .unwrap();
        assert!(report.contains("ctx\nERROR:\n"));
        assert!(report.contains("boom"));
    }

    fn unformattable_time() -> OffsetDateTime {
        // RFC 3339 has no room for offset seconds.
        OffsetDateTime::now_utc().to_offset(time::UtcOffset::from_hms(0, 0, 30).unwrap())
    }

    #[test]
    fn formatting_failure_is_swallowed_without_reraise() {
        let out = log_error_at("oops", None, false, unformattable_time()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn formatting_failure_is_returned_with_reraise() {
        let err = log_error_at("oops", None, true, unformattable_time()).unwrap_err();
        assert!(matches!(err, ReportError::Timestamp(_)));
    }

    #[tokio::test]
    async fn email_goes_to_configured_sysadmins() {
        let mailer = RecordingMailer::default();
        log_and_email_error(&mailer, &config(), "oops", Some("ctx"), None).await;
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (from, to, subject, body) = &sent[0];
        assert_eq!(from, "e500@localhost");
        assert_eq!(to, &vec!["ops@example.org".to_string()]);
        assert_eq!(subject, "500 Error");
        assert!(body.contains("ctx\nERROR:\n\"oops\""));
    }

    #[tokio::test]
    async fn explicit_recipients_override_default() {
        let mailer = RecordingMailer::default();
        let to = vec!["dev@example.org".to_string()];
        log_and_email_error(&mailer, &config(), "oops", None, Some(&to)).await;
        assert_eq!(mailer.sent.lock().unwrap()[0].1, to);
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        log_and_email_error(&DownMailer, &config(), "oops", None, None).await;
    }

    #[tokio::test]
    async fn slow_relay_times_out() {
        log_and_email_error(&StuckMailer, &config(), "oops", None, None).await;
    }
}
