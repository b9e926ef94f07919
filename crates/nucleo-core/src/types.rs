//! Message records exchanged between the scheduler and its collaborators.

use serde::{Deserialize, Serialize};

/// An inbound message, already decoded by the inbox adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Source-assigned id (IMAP sequence number, API message id, ...).
    pub id: String,
    /// Raw `From` header, e.g. `"Boss <boss@example.com>"`.
    pub from: String,
    pub subject: String,
    /// `Date` header as sent; not parsed.
    pub date: String,
    pub body: String,
}

impl NormalizedMessage {
    pub fn new(id: &str, from: &str, subject: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            date: String::new(),
            body: body.to_string(),
        }
    }
}

/// An outbound mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Log the mail instead of sending it.
    #[serde(default)]
    pub dry_run: bool,
}

impl OutgoingEmail {
    /// A mail that is really sent.
    pub fn live(to: &str, subject: &str, body: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            dry_run: false,
        }
    }
}
