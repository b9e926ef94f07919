//! Collaborator seams. The scheduler only ever sees these traits; the
//! concrete IMAP/SMTP, Telegram and social adapters live in `nucleo-channels`.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NormalizedMessage, OutgoingEmail};

/// Mailbox the operator sends work to.
#[async_trait]
pub trait InboxClient: Send + Sync {
    /// Adapter name, used in logs.
    fn name(&self) -> &str;

    /// Fetch the newest `max_results` unread messages, newest last. Every
    /// returned message stops being unread, trusted or not, so older unread
    /// mail is reached by later calls.
    async fn fetch_unread(&self, max_results: usize) -> Result<Vec<NormalizedMessage>>;

    /// Send a mail. `Ok(false)` means the adapter declined to send it
    /// (daily send limit reached).
    async fn send_message(&self, email: OutgoingEmail) -> Result<bool>;

    /// Flag a message as read.
    async fn mark_read(&self, id: &str) -> Result<()>;
}

/// Public posting account.
#[async_trait]
pub trait SocialClient: Send + Sync {
    fn name(&self) -> &str;

    /// Publish `text` and return the id assigned by the platform.
    async fn post(&self, text: &str) -> Result<String>;
}

/// Operator chat channel. Callers treat it as best-effort.
#[async_trait]
pub trait NotificationClient: Send + Sync {
    fn name(&self) -> &str;

    async fn send_notification(&self, text: &str) -> Result<()>;
}
