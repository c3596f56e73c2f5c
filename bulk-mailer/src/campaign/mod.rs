//! Campaign definition: recipients, templates and per-row variable
//! resolution.
//!
//! A campaign is built once when the operator confirms a send and is then
//! handed to the dispatch engine, which consumes it exactly once.

pub mod recipients;

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::message::AttachmentDir;
use crate::template::{extract_variables, placeholder, wrap_document, RenderedContent};

pub use recipients::{
    dedupe, load_csv, CampaignError, RecipientRow, ATTACHMENT_COLUMN, EMAIL_COLUMN,
};

/// One bulk run over a fixed, de-duplicated recipient table.
#[derive(Debug, Clone)]
pub struct Campaign {
    recipients: Vec<RecipientRow>,
    subject: String,
    body: String,
    variables: BTreeSet<String>,
    defaults: HashMap<String, String>,
    attachments: Option<AttachmentDir>,
}

impl Campaign {
    /// Create a campaign, de-duplicating `rows` by address.
    ///
    /// The body is wrapped in an HTML document when it is only a fragment.
    pub fn new(subject: impl Into<String>, body: &str, rows: Vec<RecipientRow>) -> Self {
        let subject = subject.into();
        let body = wrap_document(body);
        let variables = extract_variables(&format!("{}\n{}", subject, body));
        let recipients = dedupe(rows);

        info!(
            recipients = recipients.len(),
            variables = ?variables,
            "campaign_created"
        );

        Self {
            recipients,
            subject,
            body,
            variables,
            defaults: HashMap::new(),
            attachments: None,
        }
    }

    /// Fallback values used when a row leaves a variable blank.
    pub fn with_defaults(mut self, defaults: HashMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_attachment_dir(mut self, dir: AttachmentDir) -> Self {
        self.attachments = Some(dir);
        self
    }

    pub fn recipients(&self) -> &[RecipientRow] {
        &self.recipients
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Variables referenced by subject and body combined.
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn attachments(&self) -> Option<&AttachmentDir> {
        self.attachments.as_ref()
    }

    /// Resolve every referenced variable for `row`.
    ///
    /// Order: row value, campaign default, visible `[name]` marker.
    pub fn variables_for(&self, row: &RecipientRow) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|name| {
                let value = row
                    .field(name)
                    .or_else(|| self.defaults.get(name).map(String::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| placeholder(name));
                (name.clone(), value)
            })
            .collect()
    }

    /// Render subject, HTML and text for `row`.
    pub fn render_for(&self, row: &RecipientRow) -> RenderedContent {
        RenderedContent::render(&self.subject, &self.body, &self.variables_for(row))
    }
}
