//! Web control plane for campaigns.
//!
//! This module provides a small HTTP surface that:
//! - Starts a campaign from a JSON recipient list
//! - Cancels the running campaign
//! - Reports live progress and the final summary
//!
//! Mutating routes require the `X-Control-Auth` token when one is configured.

pub mod auth;
pub mod handlers;
pub mod status;

pub use auth::{is_authorized, AUTH_HEADER};
pub use handlers::{
    campaign_status, cancel_campaign, health, start_campaign, AppState, ControlResponse,
    HealthResponse, StartCampaignRequest,
};
pub use status::{CampaignStatus, StatusBoard};
