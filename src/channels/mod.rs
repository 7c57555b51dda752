//! Mailbox access for the quote pipeline.

pub mod email;
pub mod email_types;
pub mod mailbox;

pub use email::{EmailConfig, ImapMailbox};
pub use email_types::InboundMessage;
pub use mailbox::{Mailbox, SendReceipt};
