//! Mailbox abstraction: the pipeline's view of the mail account.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::email_types::InboundMessage;
use crate::error::MailboxError;

/// Proof that a reply left the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// `Message-ID` of the outbound message.
    pub message_id: String,
}

/// Fetch the latest message, resolve where replies go, send a reply.
///
/// Authentication and session handling stay inside the implementation.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Most recent message in `folder`, or `None` if the folder is empty.
    async fn fetch_latest(&self, folder: &str) -> Result<Option<InboundMessage>, MailboxError>;

    /// Reply-To if present, else the sender.
    fn resolve_reply_address(&self, message: &InboundMessage) -> Result<String, MailboxError> {
        message
            .reply_address()
            .map(str::to_string)
            .ok_or_else(|| MailboxError::NoReplyAddress {
                id: message.id.clone(),
            })
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendReceipt, MailboxError>;
}
