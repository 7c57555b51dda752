//! Email mailbox — IMAP over TLS for reading, SMTP via lettre for replies.
//!
//! The IMAP side is a small blocking client (LOGIN, EXAMINE, FETCH, LOGOUT)
//! driven from `spawn_blocking`; it only ever reads the newest message.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::channels::email_types::{InboundMessage, extract_addresses};
use crate::channels::mailbox::{Mailbox, SendReceipt};
use crate::error::{ConfigError, MailboxError};

const MAILBOX_NAME: &str = "email";

/// Socket read timeout for IMAP.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Email account configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables. `EMAIL_IMAP_HOST` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let imap_host = lookup("EMAIL_IMAP_HOST")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL_IMAP_HOST".to_string()))?;

        let imap_port = crate::config::parse_or(&lookup, "EMAIL_IMAP_PORT", 993_u16)?;

        let smtp_host =
            lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));

        let smtp_port = crate::config::parse_or(&lookup, "EMAIL_SMTP_PORT", 587_u16)?;

        let username = lookup("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = lookup("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// IMAP (inbound) + SMTP (outbound) mailbox.
pub struct ImapMailbox {
    config: Arc<EmailConfig>,
}

impl ImapMailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Connect over TLS and read the newest message in `folder` (blocking).
    fn fetch_latest_blocking(
        config: &EmailConfig,
        folder: &str,
    ) -> Result<Option<InboundMessage>, MailboxError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(conn_err)?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))
            .map_err(conn_err)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(conn_err)?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(conn_err)?;
        let mut tls = rustls::StreamOwned::new(conn, tcp);

        imap_fetch_latest(
            &mut tls,
            &config.username,
            config.password.expose_secret(),
            folder,
        )
    }

    /// Build and send one plain-text message over SMTP (blocking).
    fn send_blocking(
        config: &EmailConfig,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, MailboxError> {
        let message_id = generate_message_id(&config.from_address);

        let email = Message::builder()
            .from(
                config
                    .from_address
                    .parse()
                    .map_err(|e| send_err(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| send_err(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        // 465 is implicit TLS, everything else upgrades with STARTTLS.
        let builder = if config.smtp_port == 465 {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| send_err(format!("SMTP relay error: {e}")))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&email)
            .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;

        Ok(SendReceipt { message_id })
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    fn name(&self) -> &str {
        MAILBOX_NAME
    }

    async fn fetch_latest(&self, folder: &str) -> Result<Option<InboundMessage>, MailboxError> {
        let config = Arc::clone(&self.config);
        let folder = folder.to_string();
        tokio::task::spawn_blocking(move || Self::fetch_latest_blocking(&config, &folder))
            .await
            .map_err(|e| MailboxError::ConnectionFailed {
                name: MAILBOX_NAME.into(),
                reason: format!("IMAP task panicked: {e}"),
            })?
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendReceipt, MailboxError> {
        let config = Arc::clone(&self.config);
        let (to_owned, subject, body) = (to.to_string(), subject.to_string(), body.to_string());
        let receipt = tokio::task::spawn_blocking(move || {
            Self::send_blocking(&config, &to_owned, &subject, &body)
        })
        .await
        .map_err(|e| send_err(format!("SMTP task panicked: {e}")))??;

        tracing::info!(message_id = %receipt.message_id, "Email sent to {to}");
        Ok(receipt)
    }
}

// ── IMAP conversation ───────────────────────────────────────────────

/// Read one CRLF-terminated line.
fn read_line<S: Read>(stream: &mut S) -> Result<String, MailboxError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match stream.read(&mut byte) {
            Ok(0) => return Err(conn_err("IMAP connection closed")),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(conn_err(e)),
        }
    }
}

fn write_cmd<S: Write>(stream: &mut S, tag: &str, cmd: &str) -> Result<(), MailboxError> {
    stream
        .write_all(format!("{tag} {cmd}\r\n").as_bytes())
        .map_err(conn_err)?;
    stream.flush().map_err(conn_err)
}

/// Collect every line up to and including the tagged status.
fn read_tagged<S: Read>(stream: &mut S, tag: &str) -> Result<Vec<String>, MailboxError> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(stream)?;
        let done = line.starts_with(&format!("{tag} "));
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Send a tagged command and collect every line up to the tagged status.
fn send_cmd<S: Read + Write>(
    stream: &mut S,
    tag: &str,
    cmd: &str,
) -> Result<Vec<String>, MailboxError> {
    write_cmd(stream, tag, cmd)?;
    read_tagged(stream, tag)
}

/// FETCH one message and return its RFC822 literal, read by its `{size}`
/// octet count so body lines never end the response early.
fn fetch_literal<S: Read + Write>(
    stream: &mut S,
    tag: &str,
    seq: u32,
) -> Result<Vec<u8>, MailboxError> {
    write_cmd(stream, tag, &format!("FETCH {seq} RFC822"))?;
    loop {
        let line = read_line(stream)?;
        if line.starts_with(&format!("{tag} ")) {
            return Err(conn_err(format!("FETCH {seq} failed: {}", line.trim_end())));
        }
        let Some(size) = literal_size(&line) else {
            continue;
        };

        let mut raw = vec![0u8; size];
        stream.read_exact(&mut raw).map_err(conn_err)?;

        let status = read_tagged(stream, tag)?;
        if !is_ok(&status, tag) {
            return Err(conn_err(format!("FETCH {seq} failed")));
        }
        return Ok(raw);
    }
}

fn is_ok(lines: &[String], tag: &str) -> bool {
    lines
        .last()
        .is_some_and(|l| l.starts_with(&format!("{tag} OK")))
}

/// Log in, open `folder` read-only and fetch its highest-numbered message.
pub(crate) fn imap_fetch_latest<S: Read + Write>(
    stream: &mut S,
    username: &str,
    password: &str,
    folder: &str,
) -> Result<Option<InboundMessage>, MailboxError> {
    let _greeting = read_line(stream)?;

    let login = send_cmd(
        stream,
        "A1",
        &format!("LOGIN {} {}", quote_imap(username), quote_imap(password)),
    )?;
    if !is_ok(&login, "A1") {
        return Err(MailboxError::AuthFailed {
            name: MAILBOX_NAME.into(),
        });
    }

    let examine = send_cmd(stream, "A2", &format!("EXAMINE {}", quote_imap(folder)))?;
    if !is_ok(&examine, "A2") {
        return Err(conn_err(format!("EXAMINE {folder} failed")));
    }

    let latest = parse_exists(&examine).unwrap_or(0);
    if latest == 0 {
        let _ = send_cmd(stream, "A3", "LOGOUT");
        return Ok(None);
    }

    let raw = fetch_literal(stream, "A3", latest)?;

    let _ = send_cmd(stream, "A4", "LOGOUT");

    parse_message(&raw).map(Some)
}

/// Message count from an `* N EXISTS` untagged response.
pub(crate) fn parse_exists(lines: &[String]) -> Option<u32> {
    lines.iter().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("*"), Some(n), Some(kw)) if kw.eq_ignore_ascii_case("EXISTS") => n.parse().ok(),
            _ => None,
        }
    })
}

/// Octet count of a literal announced at the end of a line: `... {size}`.
pub(crate) fn literal_size(line: &str) -> Option<usize> {
    let head = line.trim_end().strip_suffix('}')?;
    let open = head.rfind('{')?;
    head[open + 1..].parse().ok()
}

/// IMAP quoted string.
fn quote_imap(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

// ── Message parsing ─────────────────────────────────────────────────

/// Parse a raw RFC822 message into an `InboundMessage`.
pub fn parse_message(raw: &[u8]) -> Result<InboundMessage, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::InvalidMessage("unparsable RFC822 message".into()))?;

    let sender = extract_addresses(parsed.from())
        .into_iter()
        .next()
        .ok_or_else(|| MailboxError::InvalidMessage("message has no From address".into()))?;
    let reply_to = extract_addresses(parsed.reply_to()).into_iter().next();

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let body = extract_text(&parsed);
    let id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(chrono::Utc::now);

    Ok(InboundMessage {
        id,
        subject,
        body,
        sender,
        reply_to,
        received_at,
    })
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Check if a sender email is in the allowlist.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// Strip HTML tags, keeping line structure for block elements.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "tr" | "li") {
                    result.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }
    // Normalize whitespace per line; the marker line must survive intact.
    result
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn generate_message_id(from_address: &str) -> String {
    let domain = from_address
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches('>'))
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

fn conn_err(e: impl std::fmt::Display) -> MailboxError {
    MailboxError::ConnectionFailed {
        name: MAILBOX_NAME.into(),
        reason: e.to_string(),
    }
}

fn send_err(reason: String) -> MailboxError {
    MailboxError::SendFailed {
        name: MAILBOX_NAME.into(),
        reason,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
