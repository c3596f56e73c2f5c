//! BulkMail - rate-limited, cancellable bulk email campaigns over Amazon SES.
//!
//! This library provides shared modules for the two BulkMail binaries:
//! - `bulkmail-send`: one-shot CLI that runs a campaign from a CSV file
//! - `bulkmail-web`: control plane that starts, cancels and reports campaigns
//!
//! ## Architecture
//!
//! ```text
//! CSV / JSON → Campaign → DispatchEngine → RateLimiter → TransportClient (SES)
//!                               ↓
//!                        ProgressObserver
//! ```

pub mod campaign;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod template;
pub mod transport;
pub mod web;

// Re-export commonly used types
pub use campaign::{load_csv, Campaign, CampaignError, RecipientRow};
pub use config::Config;
pub use dispatch::{
    DispatchEngine, DispatchError, DispatchOutcome, EngineState, LogObserver, ProgressEvent,
    ProgressObserver, RateLimiter, RunContext, RunSummary,
};
pub use message::{AttachmentDir, Sender};
pub use transport::{
    DryRunTransport, MockTransport, SesClient, SesConfig, TransportClient, TransportError,
};
pub use web::AppState;
