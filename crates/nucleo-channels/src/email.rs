//! Email channel: async IMAP reading + SMTP sending.
//!
//! Reads the work inbox via async-imap over tokio-native-tls and sends mail
//! with lettre over implicit TLS (port 465, as 163.com and most providers
//! expect). Every call opens its own short-lived connection; nothing is kept
//! between polls, and each IMAP call as a whole is bounded by a timeout.
//!
//! Fetching marks every returned message `\Seen`, trusted or not, so older
//! unread mail moves into the fetch window on the next poll.

use async_trait::async_trait;
use futures::StreamExt;
use nucleo_core::config::EmailChannelConfig;
use nucleo_core::error::{NucleoError, Result};
use nucleo_core::traits::InboxClient;
use nucleo_core::types::{NormalizedMessage, OutgoingEmail};
use nucleo_scheduler::{RateLimiter, SharedClock};
use std::time::Duration;

/// Characters of body text kept on a fetched message.
pub const BODY_PREVIEW_CHARS: usize = 200;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound for one IMAP call (connect, login, commands, logout).
pub const IMAP_TIMEOUT: Duration = Duration::from_secs(30);

type ImapSession = async_imap::Session<tokio_native_tls::TlsStream<tokio::net::TcpStream>>;

/// Create TLS-wrapped IMAP connection and log in.
async fn connect_imap(config: &EmailChannelConfig) -> Result<ImapSession> {
    let host = config.imap_host.as_str();
    let tcp = tokio::net::TcpStream::connect((host, config.imap_port))
        .await
        .map_err(|e| NucleoError::Channel(format!("TCP connect: {e}")))?;

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| NucleoError::Channel(format!("TLS connector: {e}")))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tls_stream = connector
        .connect(host, tcp)
        .await
        .map_err(|e| NucleoError::Channel(format!("TLS handshake: {e}")))?;

    let client = async_imap::Client::new(tls_stream);
    // A rejected login will not fix itself on the next poll.
    client
        .login(&config.address, &config.password)
        .await
        .map_err(|e| {
            NucleoError::AuthFailed(format!(
                "IMAP login for {} (use the client authorization code, not the web password): {}",
                config.address, e.0
            ))
        })
}

/// Email channel: `InboxClient` over IMAP + SMTP.
pub struct EmailChannel {
    config: EmailChannelConfig,
    limiter: RateLimiter,
    imap_timeout: Duration,
}

impl EmailChannel {
    pub fn new(config: EmailChannelConfig, clock: SharedClock) -> Self {
        let limiter = RateLimiter::per_day(config.max_per_day, clock);
        Self {
            config,
            limiter,
            imap_timeout: IMAP_TIMEOUT,
        }
    }

    /// Bound every IMAP call by `timeout` instead of [`IMAP_TIMEOUT`].
    pub fn with_imap_timeout(mut self, timeout: Duration) -> Self {
        self.imap_timeout = timeout;
        self
    }

    async fn with_deadline<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.imap_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(NucleoError::Timeout(format!(
                    "IMAP {what} after {}s",
                    self.imap_timeout.as_secs()
                )))
            })
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Mails that can still be sent today.
    pub fn sends_remaining(&self) -> u32 {
        self.limiter.remaining()
    }

    async fn smtp_send(&self, email: &OutgoingEmail) -> Result<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from_mailbox: Mailbox = match self.config.display_name.as_deref() {
            Some(name) => format!("{name} <{}>", self.config.address),
            None => self.config.address.clone(),
        }
        .parse()
        .map_err(|e| NucleoError::Channel(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| NucleoError::Channel(format!("Invalid to: {e}")))?;

        let message = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| NucleoError::Channel(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.address.clone(), self.config.password.clone());

        let mailer = AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| NucleoError::Channel(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| NucleoError::Channel(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl InboxClient for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn fetch_unread(&self, max_results: usize) -> Result<Vec<NormalizedMessage>> {
        let messages = self
            .with_deadline("fetch_unread", async {
                let mut session = connect_imap(&self.config).await?;
                let fetched =
                    fetch_newest_unseen(&mut session, &self.config.mailbox, max_results).await;
                session.logout().await.ok();
                fetched
            })
            .await?;
        tracing::info!("📧 Fetched {} unread email(s)", messages.len());
        Ok(messages)
    }

    async fn send_message(&self, email: OutgoingEmail) -> Result<bool> {
        if email.dry_run {
            tracing::info!("📝 [dry-run] Would send email to {}: {}", email.to, email.subject);
            return Ok(true);
        }

        if !self.limiter.allow() {
            tracing::warn!(
                "🚦 Daily email limit reached ({}/day), not sending '{}'",
                self.limiter.max_requests(),
                email.subject
            );
            return Ok(false);
        }

        self.smtp_send(&email).await?;
        tracing::info!("📤 Email sent to: {}", email.to);
        Ok(true)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.with_deadline("mark_read", async {
            let mut session = connect_imap(&self.config).await?;
            let stored = store_seen(&mut session, &self.config.mailbox, id).await;
            session.logout().await.ok();
            stored
        })
        .await?;
        tracing::debug!("📧 Marked email {id} as read");
        Ok(())
    }
}

/// UNSEEN search, newest `max_results` by UID. Every fetched UID is flagged
/// `\Seen` afterwards, whether or not it parsed.
async fn fetch_newest_unseen(
    session: &mut ImapSession,
    mailbox: &str,
    max_results: usize,
) -> Result<Vec<NormalizedMessage>> {
    session
        .select(mailbox)
        .await
        .map_err(|e| NucleoError::Channel(format!("Select {mailbox}: {e}")))?;

    let uids = session
        .uid_search("UNSEEN")
        .await
        .map_err(|e| NucleoError::Channel(format!("Search: {e}")))?;

    let newest = newest_uids(uids, max_results);
    if newest.is_empty() {
        return Ok(vec![]);
    }

    let uid_set = newest
        .iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut fetches = session
        .uid_fetch(&uid_set, "(UID RFC822)")
        .await
        .map_err(|e| NucleoError::Channel(format!("Fetch: {e}")))?;

    let mut messages = Vec::new();
    while let Some(fetch) = fetches.next().await {
        let fetch = fetch.map_err(|e| NucleoError::Channel(format!("Fetch msg: {e}")))?;
        let Some(uid) = fetch.uid else { continue };
        match fetch.body().and_then(|raw| parse_email_bytes(raw, uid)) {
            Some(msg) => messages.push(msg),
            None => tracing::warn!("⚠️ Could not parse email uid {uid}, skipping"),
        }
    }

    drop(fetches);

    // RFC822 already implies \Seen on most servers; set it explicitly anyway.
    flag_seen(session, &uid_set).await?;

    messages.sort_by_key(|m| m.id.parse::<u32>().unwrap_or(0));
    Ok(messages)
}

/// The `max_results` highest UIDs, ascending.
fn newest_uids(uids: impl IntoIterator<Item = u32>, max_results: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();
    uids.split_off(uids.len().saturating_sub(max_results))
}

async fn store_seen(session: &mut ImapSession, mailbox: &str, uid: &str) -> Result<()> {
    session
        .select(mailbox)
        .await
        .map_err(|e| NucleoError::Channel(format!("Select {mailbox}: {e}")))?;
    flag_seen(session, uid).await
}

async fn flag_seen(session: &mut ImapSession, uid: &str) -> Result<()> {
    let updates = session
        .uid_store(uid, "+FLAGS (\\Seen)")
        .await
        .map_err(|e| NucleoError::Channel(format!("Store \\Seen on {uid}: {e}")))?;
    // Drain the untagged FETCH responses so the command completes.
    let _: Vec<_> = updates.collect().await;
    Ok(())
}

/// Decode raw RFC 5322 bytes into a message record keyed by `uid`.
fn parse_email_bytes(raw: &[u8], uid: u32) -> Option<NormalizedMessage> {
    use mail_parser::MessageParser;
    let parsed = MessageParser::default().parse(raw)?;

    let from = parsed
        .from()
        .and_then(|a| a.first())
        .map(|a| {
            let address = a.address().unwrap_or_default();
            match a.name() {
                Some(name) if !name.is_empty() => format!("{name} <{address}>"),
                _ => address.to_string(),
            }
        })
        .unwrap_or_default();

    let subject = parsed.subject().unwrap_or_default().to_string();
    let date = parsed.date().map(|d| d.to_rfc822()).unwrap_or_default();

    let body = parsed
        .body_text(0)
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            parsed
                .body_html(0)
                .map(|h| strip_html(&h))
                .unwrap_or_default()
        });

    Some(NormalizedMessage {
        id: uid.to_string(),
        from,
        subject,
        date,
        body: preview(body.trim()),
    })
}

/// First `BODY_PREVIEW_CHARS` characters, with "..." when cut.
fn preview(body: &str) -> String {
    if body.chars().count() > BODY_PREVIEW_CHARS {
        let mut cut: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        body.to_string()
    }
}

fn strip_html(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nucleo_scheduler::ManualClock;
    use std::sync::Arc;

    fn channel(max_per_day: u32) -> EmailChannel {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap(),
        ));
        let config = EmailChannelConfig {
            address: "bot@163.com".into(),
            password: "auth-code".into(),
            max_per_day,
            ..Default::default()
        };
        EmailChannel::new(config, clock)
    }

    #[test]
    fn test_parse_plain_email() {
        let raw = b"From: Boss <boss@example.com>\r\n\
To: bot@163.com\r\n\
Subject: Prepare the Q3 deck\r\n\
Date: Sun, 22 Feb 2026 09:15:00 +0800\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
  Needs to be ready by Friday.  \r\n";

        let msg = parse_email_bytes(raw, 42).unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.from, "Boss <boss@example.com>");
        assert_eq!(msg.subject, "Prepare the Q3 deck");
        assert!(!msg.date.is_empty());
        assert_eq!(msg.body, "Needs to be ready by Friday.");
    }

    #[test]
    fn test_parse_html_only_email() {
        let raw = b"From: boss@example.com\r\n\
Subject: Hi\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Call me</p></body></html>\r\n";

        let msg = parse_email_bytes(raw, 7).unwrap();
        assert_eq!(msg.from, "boss@example.com");
        assert!(msg.body.contains("Call me"));
        assert!(!msg.body.contains('<'));
    }

    #[test]
    fn test_preview_truncates_long_bodies() {
        let long = "字".repeat(250);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), BODY_PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));

        let short = "x".repeat(BODY_PREVIEW_CHARS);
        assert_eq!(preview(&short), short);
    }

    #[test]
    fn test_newest_uids_keeps_highest() {
        assert_eq!(newest_uids([12, 1, 7, 3, 9], 3), vec![7, 9, 12]);
        assert_eq!(newest_uids([4, 2], 10), vec![2, 4]);
        assert!(newest_uids([5, 6], 0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_imap_call_is_bounded() {
        let ch = channel(10).with_imap_timeout(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let err = ch
            .with_deadline("fetch_unread", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, NucleoError::Timeout(ref m) if m.contains("fetch_unread")));
        assert!(err.is_transient());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<b>Hello</b> <i>world</i>"), "Hello world");
        assert_eq!(strip_html("  plain  "), "plain");
    }

    #[tokio::test]
    async fn test_dry_run_reports_success_without_sending() {
        let ch = channel(0);
        let email = OutgoingEmail {
            dry_run: true,
            ..OutgoingEmail::live("boss@example.com", "Task started: x", "body")
        };
        assert!(ch.send_message(email).await.unwrap());
    }

    #[tokio::test]
    async fn test_daily_limit_declines_send() {
        let ch = channel(0);
        let sent = ch
            .send_message(OutgoingEmail::live("boss@example.com", "s", "b"))
            .await
            .unwrap();
        assert!(!sent);
        assert_eq!(ch.sends_remaining(), 0);
    }
}
