use std::fs;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use mailparse::{addrparse, dateparse, parse_mail, MailAddr, MailHeaderMap};
use regex::Regex;

use crate::models::MessageCandidate;
use crate::pipeline::MessageSource;
use crate::query::SearchExpression;

/// Cap fetches per search to keep provider round trips bounded.
const MAX_MESSAGES_PER_COMPANY: usize = 5;

pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl EmailConfig {
    pub fn gmail(username: &str, app_password: &str) -> Self {
        Self {
            server: "imap.gmail.com".to_string(),
            port: 993,
            username: username.to_string(),
            password: app_password.trim().to_string(),
        }
    }

    pub fn from_gmail_password_file(username: &str, password_file: &Path) -> Result<Self> {
        let password = fs::read_to_string(password_file)
            .with_context(|| format!("Failed to read password file: {:?}", password_file))?;
        Ok(Self::gmail(username, &password))
    }
}

type ImapSession = imap::Session<native_tls::TlsStream<TcpStream>>;

/// IMAP-backed message retrieval. Any connect/search/fetch failure here is
/// treated by the pipeline as loss of the provider: remaining companies are
/// skipped while earlier results still merge.
pub struct MailClient {
    session: ImapSession,
    malformed_skipped: usize,
}

impl MailClient {
    pub fn connect(config: &EmailConfig) -> Result<Self> {
        let tls = native_tls::TlsConnector::builder().build()?;

        let addr = (config.server.as_str(), config.port);
        let tcp = TcpStream::connect(addr).context("Failed to connect to IMAP server")?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;
        tcp.set_write_timeout(Some(Duration::from_secs(30)))?;
        let tls_stream = tls.connect(&config.server, tcp)?;

        let client = imap::Client::new(tls_stream);
        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|e| anyhow!("Login failed: {}", e.0))?;

        session.select("INBOX")?;

        Ok(Self {
            session,
            malformed_skipped: 0,
        })
    }

    /// Messages dropped because a required header was missing or
    /// unparseable, counted across all searches on this client.
    pub fn malformed_skipped(&self) -> usize {
        self.malformed_skipped
    }

    pub fn logout(mut self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }
}

impl MessageSource for MailClient {
    fn search(
        &mut self,
        expr: &SearchExpression,
        window_days: u32,
    ) -> Result<Vec<MessageCandidate>> {
        let query = imap_query(expr, window_days);
        let ids = self
            .session
            .search(&query)
            .with_context(|| format!("IMAP search failed: {}", query))?;

        let mut candidates = Vec::new();
        for id in ids.into_iter().take(MAX_MESSAGES_PER_COMPANY) {
            let messages = self
                .session
                .fetch(id.to_string(), "RFC822")
                .context("IMAP fetch failed")?;
            for message in messages.iter() {
                let Some(raw) = message.body() else {
                    self.malformed_skipped += 1;
                    continue;
                };
                match parse_candidate(raw, id.to_string()) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(_) => self.malformed_skipped += 1,
                }
            }
        }
        Ok(candidates)
    }
}

/// Renders a search expression into an IMAP SEARCH query with the recency
/// window applied.
fn imap_query(expr: &SearchExpression, window_days: u32) -> String {
    let since = (Utc::now() - chrono::Duration::days(window_days as i64))
        .format("%d-%b-%Y")
        .to_string();
    match expr {
        SearchExpression::SenderContains(domain) => {
            format!("FROM \"{}\" SINCE {}", domain.replace('"', ""), since)
        }
        SearchExpression::TextContains(name) => {
            let name = name.replace('"', "");
            format!("OR SUBJECT \"{}\" BODY \"{}\" SINCE {}", name, name, since)
        }
    }
}

/// Builds a candidate from a raw RFC822 message. Missing From or Date is a
/// malformed message: the caller skips it and moves on.
fn parse_candidate(raw: &[u8], fallback_id: String) -> Result<MessageCandidate> {
    let parsed = parse_mail(raw)?;

    let from = parsed
        .headers
        .get_first_value("From")
        .ok_or_else(|| anyhow!("message has no From header"))?;
    let (sender_name, sender_addr) = parse_sender(&from)?;

    let date_header = parsed
        .headers
        .get_first_value("Date")
        .ok_or_else(|| anyhow!("message has no Date header"))?;
    let epoch =
        dateparse(&date_header).map_err(|e| anyhow!("unparseable Date header: {}", e))?;
    let received = Utc
        .timestamp_opt(epoch, 0)
        .single()
        .ok_or_else(|| anyhow!("Date header out of range"))?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default();
    // Message-ID is the stable dedup key; fall back to the IMAP sequence id
    // for the rare sender that omits it.
    let message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .unwrap_or(fallback_id);

    let body = message_body(&parsed)?;

    Ok(MessageCandidate {
        sender_name,
        sender_addr,
        subject,
        body,
        received,
        message_id,
    })
}

fn parse_sender(from: &str) -> Result<(String, String)> {
    if let Ok(list) = addrparse(from) {
        for addr in list.iter() {
            if let MailAddr::Single(single) = addr {
                return Ok((
                    single.display_name.clone().unwrap_or_default(),
                    single.addr.clone(),
                ));
            }
        }
    }

    // Some bulk senders emit From headers addrparse rejects; pull the
    // angle-bracket address directly.
    let re = Regex::new(r"<[^<>\s]+@[^<>\s]+>")?;
    if let Some(m) = re.find(from) {
        let addr = from[m.start() + 1..m.end() - 1].to_string();
        let name = from[..m.start()].trim().trim_matches('"').to_string();
        return Ok((name, addr));
    }

    Ok((String::new(), from.trim().to_string()))
}

/// Prefers the HTML part, then plain text, then the first part. The
/// classifier strips markup anyway.
fn message_body(parsed: &mailparse::ParsedMail) -> Result<String> {
    if parsed.subparts.is_empty() {
        return Ok(parsed.get_body()?);
    }

    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/html") {
            return Ok(part.get_body()?);
        }
    }

    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/plain") {
            return Ok(part.get_body()?);
        }
    }

    if let Some(part) = parsed.subparts.first() {
        return Ok(part.get_body()?);
    }

    Err(anyhow!("No message body found"))
}
