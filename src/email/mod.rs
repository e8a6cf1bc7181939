//! Inbound email attachment archiving
//!
//! A mail flow event names a message; the raw MIME is fetched from a
//! [`RawMessageSource`], every `attachment` part is extracted and written
//! to an [`AttachmentStore`] under
//! `{sender}/{YYYY-MM-DD}/{message_id}/{filename}`.

mod aws;

pub use aws::{S3AttachmentStore, WorkMailMessageSource};

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use mail_parser::{MessageParser, MimeHeaders};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static NON_PATH_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub const NO_SUBJECT: &str = "No Subject";

/// Mail flow rule invocation payload
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailEvent {
    pub message_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub flow_direction: Option<String>,
}

/// One extracted attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The parts of a message the archiver uses
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// `Name <address>` when a display name is present, else the address
    pub sender: String,
    pub subject: String,
    pub date: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Parse raw MIME bytes and extract every part marked as an attachment.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Email {
            reason: "Could not parse MIME message".to_string(),
        })?;

    let sender = message
        .from()
        .and_then(|from| from.first())
        .map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(address)) if !name.trim().is_empty() => {
                format!("{} <{}>", name.trim(), address)
            }
            (_, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .unwrap_or_default();

    let subject = message
        .subject()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(NO_SUBJECT)
        .to_string();

    let date = message.date().map(|d| d.to_rfc3339());

    let attachments = message
        .parts
        .iter()
        .filter(|part| {
            part.content_disposition()
                .is_some_and(|disposition| disposition.is_attachment())
        })
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "text/plain".to_string())
                .to_lowercase();
            let filename = part
                .attachment_name()
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_filename(&content_type));
            Attachment {
                filename,
                content_type,
                data: part.contents().to_vec(),
            }
        })
        .collect();

    Ok(ParsedEmail {
        sender,
        subject,
        date,
        attachments,
    })
}

/// `attachment-<uuid><ext>` for parts without a filename
pub fn fallback_filename(content_type: &str) -> String {
    let extension = match content_type {
        "text/plain" => ".txt",
        "application/pdf" => ".pdf",
        _ => ".bin",
    };
    format!("attachment-{}{}", uuid::Uuid::new_v4(), extension)
}

/// Turn a sender into a storage path segment.
///
/// `Name <addr>` uses the display name when it is non-empty. Characters
/// other than word characters, whitespace and `-` are dropped, whitespace
/// runs become `-`, and the result is trimmed of `-` and lowercased.
pub fn format_path_friendly(sender: &str) -> String {
    let mut text = sender;
    if let Some((name, _)) = sender.split_once('<') {
        let name = name.trim();
        if !name.is_empty() {
            text = name;
        }
    }

    let cleaned = NON_PATH_CHARS.replace_all(text, "");
    let dashed = WHITESPACE_RUN.replace_all(&cleaned, "-");
    dashed.trim_matches('-').to_lowercase()
}

/// Storage key for one attachment
pub fn attachment_key(sender: &str, day: NaiveDate, message_id: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        format_path_friendly(sender),
        day.format("%Y-%m-%d"),
        message_id,
        filename
    )
}

/// Fold a header value into the US-ASCII range accepted for object
/// metadata. Accented Latin letters lose their accent; anything else
/// outside printable ASCII becomes `?`.
pub fn ascii_metadata(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ' '..='~' => c,
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            '\t' => ' ',
            _ => '?',
        })
        .collect()
}

/// Where raw messages come from
#[async_trait]
pub trait RawMessageSource: Send + Sync {
    async fn fetch_raw(&self, message_id: &str) -> Result<Vec<u8>>;
}

/// Where attachments go
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Record of one stored attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAttachment {
    pub filename: String,
    pub key: String,
    pub content_type: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEmail {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub stored: Vec<StoredAttachment>,
}

/// Fetches, parses and archives one message per event
pub struct EmailProcessor {
    source: Box<dyn RawMessageSource>,
    store: Box<dyn AttachmentStore>,
}

impl EmailProcessor {
    pub fn new(source: Box<dyn RawMessageSource>, store: Box<dyn AttachmentStore>) -> Self {
        Self { source, store }
    }

    /// Archive every attachment of the event's message. `today` is the
    /// processing date used in the storage keys.
    pub async fn process(&self, event: &EmailEvent, today: NaiveDate) -> Result<ProcessedEmail> {
        let raw = self.source.fetch_raw(&event.message_id).await?;
        let email = parse_email(&raw)?;

        tracing::info!(
            message_id = %event.message_id,
            sender = %email.sender,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Processing email"
        );

        let mut metadata = BTreeMap::new();
        metadata.insert("sender".to_string(), ascii_metadata(&email.sender));
        metadata.insert("subject".to_string(), ascii_metadata(&email.subject));
        if let Some(date) = &email.date {
            metadata.insert("date".to_string(), ascii_metadata(date));
        }
        metadata.insert("message_id".to_string(), ascii_metadata(&event.message_id));

        let mut stored = Vec::with_capacity(email.attachments.len());
        for attachment in email.attachments {
            let key = attachment_key(&email.sender, today, &event.message_id, &attachment.filename);
            let size_bytes = attachment.data.len();

            self.store
                .put(&key, attachment.data, &attachment.content_type, &metadata)
                .await?;
            tracing::info!(key = %key, bytes = size_bytes, "Saved attachment");

            stored.push(StoredAttachment {
                filename: attachment.filename,
                key,
                content_type: attachment.content_type,
                size_bytes,
            });
        }

        tracing::info!(
            message_id = %event.message_id,
            count = stored.len(),
            "Processed attachments"
        );

        Ok(ProcessedEmail {
            message_id: event.message_id.clone(),
            sender: email.sender,
            subject: email.subject,
            stored,
        })
    }

    /// Process the event and always let delivery continue. Failures are
    /// logged; the mail flow rule never sees an error.
    pub async fn handle(&self, event: &EmailEvent, today: NaiveDate) -> FlowResponse {
        if let Err(e) = self.process(event, today).await {
            tracing::error!(
                message_id = %event.message_id,
                error = %e,
                "Failed to archive attachments"
            );
        }
        FlowResponse::default_delivery()
    }
}

/// Mail flow rule reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub actions: Vec<FlowRecipientAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRecipientAction {
    pub action: FlowAction,
    pub all_recipients: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAction {
    #[serde(rename = "type")]
    pub kind: String,
}

impl FlowResponse {
    /// Continue normal delivery for every recipient
    pub fn default_delivery() -> Self {
        Self {
            actions: vec![FlowRecipientAction {
                action: FlowAction {
                    kind: "DEFAULT".to_string(),
                },
                all_recipients: true,
            }],
        }
    }
}
