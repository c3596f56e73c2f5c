//! Bulk dispatch: the rate-limited, cancellable campaign loop.
//!
//! ## Flow
//!
//! ```text
//! Campaign → DispatchEngine ─┬─ cancelled? → stop
//!                            ├─ render + build message
//!                            ├─ RateLimiter::acquire
//!                            ├─ TransportClient::send
//!                            └─ record outcome → ProgressObserver
//! ```

pub mod engine;
pub mod limiter;
pub mod outcome;
pub mod progress;

pub use engine::{DispatchEngine, DispatchError, EngineState, RunContext, RECENT_TAIL};
pub use limiter::RateLimiter;
pub use outcome::{DispatchOutcome, FailedRecipient, Outcomes, RunSummary, SentRecipient};
pub use progress::{LogObserver, ProgressEvent, ProgressObserver};
