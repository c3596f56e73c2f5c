//! Recipient table loading and de-duplication.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use csv::{ReaderBuilder, Trim};
use thiserror::Error;
use tracing::{info, warn};

/// Column that must be present in every recipient table.
pub const EMAIL_COLUMN: &str = "email";

/// Optional column naming a file in the attachment directory.
pub const ATTACHMENT_COLUMN: &str = "attachment";

/// Errors raised while turning tabular input into recipients.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("recipient table must contain an '{EMAIL_COLUMN}' column")]
    MissingEmailColumn,

    #[error("recipient row has an empty '{EMAIL_COLUMN}' value")]
    EmptyEmail,

    #[error("failed to read recipient table: {0}")]
    Csv(#[from] csv::Error),
}

/// One recipient and the fields available to its templates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientRow {
    email: String,
    fields: HashMap<String, String>,
    attachment: Option<String>,
}

impl RecipientRow {
    /// Build a row from named fields; `email` is required and non-empty.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Self, CampaignError> {
        let email = fields
            .get(EMAIL_COLUMN)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(CampaignError::EmptyEmail)?;
        fields.insert(EMAIL_COLUMN.to_string(), email.clone());

        let attachment = fields
            .get(ATTACHMENT_COLUMN)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        Ok(Self {
            email,
            fields,
            attachment,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Field value for a template variable; blank cells count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }
}

/// Parse a comma-separated recipient table with a header row.
///
/// Rows with an empty email cell are skipped with a warning.
pub fn load_csv<R: Read>(reader: R) -> Result<Vec<RecipientRow>, CampaignError> {
    let mut csv = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    if !headers.iter().any(|h| h == EMAIL_COLUMN) {
        return Err(CampaignError::MissingEmailColumn);
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, record) in csv.records().enumerate() {
        let record = record?;
        let fields: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        match RecipientRow::from_fields(fields) {
            Ok(row) => rows.push(row),
            Err(_) => {
                skipped += 1;
                warn!(row_index = index, "recipient_row_without_email");
            }
        }
    }

    info!(
        rows = rows.len(),
        skipped = skipped,
        columns = headers.len(),
        "recipient_table_loaded"
    );

    Ok(rows)
}

/// Collapse rows sharing an address, keeping the first occurrence.
///
/// Addresses are compared exactly after trimming; input order is preserved.
pub fn dedupe(rows: Vec<RecipientRow>) -> Vec<RecipientRow> {
    let total = rows.len();
    let mut seen = HashSet::new();
    let unique: Vec<_> = rows
        .into_iter()
        .filter(|row| seen.insert(row.email.clone()))
        .collect();

    if unique.len() < total {
        info!(
            total = total,
            unique = unique.len(),
            duplicates = total - unique.len(),
            "recipient_duplicates_removed"
        );
    }

    unique
}
