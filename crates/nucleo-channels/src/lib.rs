//! # Nucleo Channels
//! Concrete collaborators behind the `nucleo-core` traits.
//!
//! - [`email::EmailChannel`]: IMAP reading and SMTP sending (`InboxClient`)
//! - [`telegram::TelegramNotifier`]: Bot API chat messages (`NotificationClient`)
//! - [`social::HttpSocialClient`] and [`social::GuardedPoster`]: public posts

pub mod email;
pub mod social;
pub mod telegram;

pub use email::EmailChannel;
pub use social::{GuardedPoster, HttpSocialClient, PostOutcome};
pub use telegram::TelegramNotifier;
