// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mail delivery seam.
//!
//! Real delivery is an external collaborator; the domain only needs the
//! [`Mailer`] trait. Deployments without SMTP run the tracing-backed
//! implementation, tests use [`RecordingMailer`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// One outgoing message.
#[derive(Clone, Debug, PartialEq)]
pub struct Mail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Delivery failure.
#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// The delivery seam.
pub trait Mailer: Send + Sync {
    /// Hand one message to the transport.
    fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them.
#[derive(Debug, Default)]
pub struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, mail: Mail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail (not delivered: no transport configured)");
        Ok(())
    }
}

/// Records messages for assertions; can be told to fail the next send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
    fail_next: AtomicBool,
}

impl RecordingMailer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages handed to the mailer so far.
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    /// Number of messages handed to the mailer.
    pub fn count(&self) -> usize {
        self.sent.lock().expect("mailer lock poisoned").len()
    }

    /// Make the next `send` fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: Mail) -> Result<(), MailError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MailError("simulated transport failure".into()));
        }
        self.sent.lock().expect("mailer lock poisoned").push(mail);
        Ok(())
    }
}
