//! The fetched message and address extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The message a quote is computed for. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message-ID header (or a generated id when missing).
    pub id: String,
    /// Email subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// From address.
    pub sender: String,
    /// Reply-To address, when the sender set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// When the message was sent.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Where a reply should go: Reply-To first, then From. Blank values are skipped.
    pub fn reply_address(&self) -> Option<&str> {
        self.reply_to
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .or_else(|| Some(self.sender.trim()).filter(|a| !a.is_empty()))
    }

    /// Subject and body as one block of text, as passed to the LLM.
    pub fn content(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.body)
    }
}

/// Extract email addresses from an optional mail_parser Address field.
///
/// Returns an empty vec if the address is None.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}
