//! Builds the per-recipient MIME message with lettre.

use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};
use thiserror::Error;
use tracing::{debug, warn};

use super::attachment::AttachmentFile;
use crate::template::RenderedContent;

/// Errors raised while composing a message for one recipient.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),
}

/// Display name and address that campaign mail is sent from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

impl Sender {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// `DisplayName <address>`, used as the From header and the SES source.
    pub fn formatted(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    fn mailbox(&self) -> Result<Mailbox, MessageError> {
        let address = parse_address(&self.email)?;
        let name = Some(self.name.clone()).filter(|n| !n.trim().is_empty());
        Ok(Mailbox::new(name, address))
    }
}

fn parse_address(raw: &str) -> Result<Address, MessageError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| MessageError::InvalidAddress {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Compose the message for a single recipient.
///
/// The plain-text part always precedes the HTML part so that clients pick
/// HTML as the last alternative they understand.
pub fn build_message(
    sender: &Sender,
    recipient: &str,
    content: &RenderedContent,
    attachment: Option<AttachmentFile>,
) -> Result<Message, MessageError> {
    let to = Mailbox::new(None, parse_address(recipient)?);

    let alternative = MultiPart::alternative()
        .singlepart(SinglePart::plain(content.text.clone()))
        .singlepart(SinglePart::html(content.html.clone()));

    let builder = Message::builder()
        .from(sender.mailbox()?)
        .to(to)
        .subject(content.subject.clone());

    let body = match attachment {
        Some(file) => {
            let content_type = ContentType::parse(&file.content_type).unwrap_or_else(|e| {
                warn!(
                    filename = %file.filename,
                    content_type = %file.content_type,
                    error = %e,
                    "attachment_content_type_invalid"
                );
                ContentType::parse("application/octet-stream")
                    .unwrap_or(ContentType::TEXT_PLAIN)
            });

            debug!(
                recipient = recipient,
                filename = %file.filename,
                size = file.content.len(),
                "message_attachment_added"
            );

            // Base64 keeps the bytes exactly as read from disk.
            let encoded = Body::new_with_encoding(file.content, ContentTransferEncoding::Base64)
                .map_err(|_| MessageError::Build("attachment could not be encoded".to_string()))?;

            MultiPart::mixed()
                .multipart(alternative)
                .singlepart(Attachment::new(file.filename).body(encoded, content_type))
        }
        None => alternative,
    };

    builder
        .multipart(body)
        .map_err(|e| MessageError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::{parse_mail, MailHeaderMap};

    fn content() -> RenderedContent {
        RenderedContent {
            subject: "Monthly update".to_string(),
            html: "<p>Hello Ann</p>".to_string(),
            text: "Hello Ann".to_string(),
        }
    }

    fn sender() -> Sender {
        Sender::new("E-Cell Team", "no-reply@ecell.in")
    }

    #[test]
    fn test_sender_formatted() {
        assert_eq!(sender().formatted(), "E-Cell Team <no-reply@ecell.in>");
    }

    #[test]
    fn test_build_without_attachment_is_alternative() {
        let message = build_message(&sender(), "ann@example.com", &content(), None).unwrap();
        let raw = message.formatted();
        let parsed = parse_mail(&raw).unwrap();

        assert_eq!(parsed.ctype.mimetype, "multipart/alternative");
        assert_eq!(parsed.subparts.len(), 2);
        assert_eq!(parsed.subparts[0].ctype.mimetype, "text/plain");
        assert_eq!(parsed.subparts[1].ctype.mimetype, "text/html");
        assert_eq!(parsed.subparts[0].get_body().unwrap().trim(), "Hello Ann");
        assert_eq!(parsed.subparts[1].get_body().unwrap().trim(), "<p>Hello Ann</p>");

        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Monthly update")
        );
        assert_eq!(
            parsed.headers.get_first_value("To").as_deref(),
            Some("ann@example.com")
        );
        let from = parsed.headers.get_first_value("From").unwrap();
        assert!(from.contains("E-Cell Team"));
        assert!(from.contains("<no-reply@ecell.in>"));
    }

    #[test]
    fn test_build_with_attachment_is_mixed() {
        let file = AttachmentFile {
            filename: "report.pdf".to_string(),
            content: b"%PDF-1.4 fake".to_vec(),
            content_type: "application/pdf".to_string(),
        };
        let message = build_message(&sender(), "ann@example.com", &content(), Some(file)).unwrap();
        let raw = message.formatted();
        let parsed = parse_mail(&raw).unwrap();

        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        assert_eq!(parsed.subparts.len(), 2);

        let alternative = &parsed.subparts[0];
        assert_eq!(alternative.ctype.mimetype, "multipart/alternative");
        assert_eq!(alternative.subparts[0].ctype.mimetype, "text/plain");
        assert_eq!(alternative.subparts[1].ctype.mimetype, "text/html");

        let attached = &parsed.subparts[1];
        assert_eq!(attached.ctype.mimetype, "application/pdf");
        assert_eq!(attached.get_body_raw().unwrap(), b"%PDF-1.4 fake");
        assert_eq!(
            attached
                .get_content_disposition()
                .params
                .get("filename")
                .map(String::as_str),
            Some("report.pdf")
        );
    }

    #[test]
    fn test_text_attachment_bytes_survive_unchanged() {
        let csv = b"email,seat\nann@example.com,12".to_vec();
        let file = AttachmentFile {
            filename: "seats.csv".to_string(),
            content: csv.clone(),
            content_type: "text/csv".to_string(),
        };
        let message = build_message(&sender(), "ann@example.com", &content(), Some(file)).unwrap();
        let raw = message.formatted();
        let parsed = parse_mail(&raw).unwrap();

        let attached = &parsed.subparts[1];
        assert_eq!(
            attached
                .headers
                .get_first_value("Content-Transfer-Encoding")
                .as_deref(),
            Some("base64")
        );
        assert_eq!(attached.get_body_raw().unwrap(), csv);
    }

    #[test]
    fn test_build_rejects_malformed_recipient() {
        let err = build_message(&sender(), "not-an-address", &content(), None).unwrap_err();
        assert!(matches!(err, MessageError::InvalidAddress { .. }));
    }
}
