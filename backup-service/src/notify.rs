// SPDX-License-Identifier: GPL-3.0-only

//! Operator notifications
//!
//! Every notification is logged locally. When an email configuration is
//! present it is also mailed; delivery problems are logged and swallowed so
//! that a broken mail setup never interrupts a backup run.

use std::fmt;

use backup_sys::{MailMessage, MailTransport};
use backup_types::EmailConfig;
use tracing::{error, info};

/// Sink for operator-facing messages. None of these methods may fail.
pub trait Notifier {
    /// Routine status
    fn info(&self, message: &str);

    /// Operational failure
    fn error(&self, message: &str);

    /// Unexpected failure with diagnostic trace; always delivered in full
    fn exception(&self, message: &str, trace: &str);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn info(&self, message: &str) {
        (**self).info(message)
    }

    fn error(&self, message: &str) {
        (**self).error(message)
    }

    fn exception(&self, message: &str, trace: &str) {
        (**self).exception(message, trace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Info,
    Error,
    Exception,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Info => "Backup info",
            Category::Error => "Backup error",
            Category::Exception => "Backup exception",
        })
    }
}

/// [`Notifier`] that mails through a [`MailTransport`] when configured
pub struct EmailNotifier<T> {
    email: Option<EmailConfig>,
    transport: T,
    hostname: Option<String>,
}

impl<T: MailTransport> EmailNotifier<T> {
    pub fn new(email: Option<EmailConfig>, transport: T) -> Self {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok());
        Self {
            email,
            transport,
            hostname,
        }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    fn subject(&self, category: Category) -> String {
        match &self.hostname {
            Some(host) => format!("[{host}] {category}"),
            None => category.to_string(),
        }
    }

    fn deliver(&self, category: Category, body: String) {
        let Some(email) = &self.email else {
            return;
        };

        let message = MailMessage {
            from: email.fromaddr.clone(),
            to: email.recipients.clone(),
            subject: self.subject(category),
            body,
        };

        if let Err(e) = self.transport.send(&message) {
            error!("Failed to send '{}' mail: {}", message.subject, e);
        }
    }
}

impl<T: MailTransport> Notifier for EmailNotifier<T> {
    fn info(&self, message: &str) {
        info!("{}", message);
        self.deliver(Category::Info, message.to_string());
    }

    fn error(&self, message: &str) {
        error!("{}", message);
        self.deliver(Category::Error, message.to_string());
    }

    fn exception(&self, message: &str, trace: &str) {
        error!("{}\n{}", message, trace);
        self.deliver(Category::Exception, format!("{message}\n\nTrace:\n{trace}"));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use backup_sys::SysError;

    use super::*;

    #[derive(Default)]
    struct Outbox {
        sent: RefCell<Vec<MailMessage>>,
        fail: bool,
    }

    impl MailTransport for Outbox {
        fn send(&self, message: &MailMessage) -> backup_sys::Result<()> {
            self.sent.borrow_mut().push(message.clone());
            if self.fail {
                return Err(SysError::CommandFailed {
                    program: "sendmail".into(),
                    exit_code: 75,
                    stderr: "queue full".into(),
                });
            }
            Ok(())
        }
    }

    fn email() -> EmailConfig {
        EmailConfig {
            fromaddr: "backup@example.org".into(),
            recipients: vec!["ops@example.org".into()],
            send_autobackup_output: false,
        }
    }

    #[test]
    fn without_email_config_nothing_is_sent() {
        let outbox = Outbox::default();
        let notifier = EmailNotifier::new(None, &outbox);

        notifier.info("import started");
        notifier.error("import failed");
        notifier.exception("boom", "trace");

        assert!(outbox.sent.borrow().is_empty());
    }

    #[test]
    fn categories_map_to_subjects() {
        let outbox = Outbox::default();
        let notifier = EmailNotifier::new(Some(email()), &outbox).with_hostname(None);

        notifier.info("finished");
        notifier.error("failed");

        let sent = outbox.sent.borrow();
        assert_eq!(sent[0].subject, "Backup info");
        assert_eq!(sent[0].body, "finished");
        assert_eq!(sent[1].subject, "Backup error");
        assert_eq!(sent[1].to, ["ops@example.org"]);
    }

    #[test]
    fn exception_carries_trace() {
        let outbox = Outbox::default();
        let notifier =
            EmailNotifier::new(Some(email()), &outbox).with_hostname(Some("nas".into()));

        notifier.exception("An unexpected error occurred.", "frame 0: run_backup");

        let sent = outbox.sent.borrow();
        assert_eq!(sent[0].subject, "[nas] Backup exception");
        assert!(sent[0].body.contains("An unexpected error occurred."));
        assert!(sent[0].body.contains("frame 0: run_backup"));
    }

    #[test]
    fn delivery_failure_is_swallowed() {
        let outbox = Outbox {
            fail: true,
            ..Default::default()
        };
        let notifier = EmailNotifier::new(Some(email()), &outbox);

        notifier.error("failed");

        assert_eq!(outbox.sent.borrow().len(), 1);
    }
}
