//! Dispatcher — hands the composed reply to the mailbox.

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::mailbox::{Mailbox, SendReceipt};
use crate::error::DispatchError;

pub struct Dispatcher {
    mailbox: Arc<dyn Mailbox>,
    subject: String,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(mailbox: Arc<dyn Mailbox>, subject: impl Into<String>, dry_run: bool) -> Self {
        Self {
            mailbox,
            subject: subject.into(),
            dry_run,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Send `body` to `recipient` under the fixed subject.
    ///
    /// Returns `Ok(None)` on a dry run, where nothing leaves the process.
    pub async fn send(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<Option<SendReceipt>, DispatchError> {
        if self.dry_run {
            info!(
                recipient = %recipient,
                subject = %self.subject,
                "Dry run, reply not sent:\n{body}"
            );
            return Ok(None);
        }

        match self.mailbox.send(recipient, &self.subject, body).await {
            Ok(receipt) => {
                info!(
                    recipient = %recipient,
                    message_id = %receipt.message_id,
                    mailbox = self.mailbox.name(),
                    "Reply sent"
                );
                Ok(Some(receipt))
            }
            Err(source) => {
                warn!(recipient = %recipient, error = %source, "Reply send failed");
                Err(DispatchError::SendFailed {
                    recipient: recipient.to_string(),
                    source,
                })
            }
        }
    }
}
