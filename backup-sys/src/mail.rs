// SPDX-License-Identifier: GPL-3.0-only

//! Plain-text mail delivery through the local MTA

use std::path::PathBuf;

use chrono::Local;
use tracing::debug;
use which::which;

use crate::command::capture;
use crate::error::{Result, SysError};

const SENDMAIL: &str = "sendmail";
const SENDMAIL_FALLBACK: &str = "/usr/sbin/sendmail";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// RFC 5322 rendering with a UTF-8 plain-text body
    pub fn render(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
            self.from,
            self.to.join(", "),
            header_safe(&self.subject),
            Local::now().to_rfc2822(),
            self.body.replace("\r\n", "\n").replace('\n', "\r\n"),
        )
    }
}

fn header_safe(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Delivers a finished message
pub trait MailTransport {
    fn send(&self, message: &MailMessage) -> Result<()>;
}

impl<T: MailTransport + ?Sized> MailTransport for &T {
    fn send(&self, message: &MailMessage) -> Result<()> {
        (**self).send(message)
    }
}

/// Pipes messages to `sendmail -t -i`
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    binary_path: PathBuf,
}

impl SendmailTransport {
    pub fn new() -> Self {
        let binary_path = which(SENDMAIL).unwrap_or_else(|_| PathBuf::from(SENDMAIL_FALLBACK));
        Self { binary_path }
    }

    pub fn with_binary(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

impl Default for SendmailTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MailTransport for SendmailTransport {
    fn send(&self, message: &MailMessage) -> Result<()> {
        debug!(
            "Sending mail '{}' to {}",
            message.subject,
            message.to.join(", ")
        );

        let args = vec!["-t".to_string(), "-i".to_string()];
        let result = capture(
            self.binary_path.as_os_str(),
            SENDMAIL,
            &args,
            Some(&message.render()),
        )?;

        if !result.success() {
            return Err(SysError::CommandFailed {
                program: result.program,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage {
            from: "backup@example.org".into(),
            to: vec!["ops@example.org".into(), "me@example.org".into()],
            subject: "Backup error".into(),
            body: "Failed to import pool.\n\nError:\ncannot import".into(),
        }
    }

    #[test]
    fn renders_headers_and_body() {
        let rendered = message().render();

        assert!(rendered.starts_with("From: backup@example.org\r\n"));
        assert!(rendered.contains("To: ops@example.org, me@example.org\r\n"));
        assert!(rendered.contains("Subject: Backup error\r\n"));
        assert!(rendered.contains("\r\n\r\nFailed to import pool.\r\n\r\nError:\r\ncannot import"));
    }

    #[test]
    fn subject_cannot_inject_headers() {
        let mut msg = message();
        msg.subject = "hello\r\nBcc: someone@example.org".into();
        assert!(!msg.render().contains("\r\nBcc:"));
    }

    #[test]
    fn successful_mta_exit_delivers() {
        assert!(SendmailTransport::with_binary("true").send(&message()).is_ok());
    }

    #[test]
    fn failing_mta_is_reported() {
        let err = SendmailTransport::with_binary("false")
            .send(&message())
            .unwrap_err();
        assert!(matches!(err, SysError::CommandFailed { exit_code: 1, .. }));
    }
}
