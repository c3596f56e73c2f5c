//! MIME message composition.
//!
//! ## Structure
//!
//! ```text
//! multipart/mixed            (only when an attachment is present)
//! ├── multipart/alternative
//! │   ├── text/plain
//! │   └── text/html
//! └── attachment
//! ```

pub mod attachment;
pub mod builder;

pub use attachment::{content_type_for, AttachmentDir, AttachmentFile};
pub use builder::{build_message, MessageError, Sender};
