//! Celery wire protocol
//!
//! This module provides:
//! - [`TaskMessage`] - the task body (protocol v1: id, task, args, kwargs)
//! - [`CeleryMessage`] - the broker envelope carrying a base64-encoded body
//! - [`ResultMessage`] - the record workers write to the result store
//!
//! # Wire layout
//!
//! ```text
//! ┌──────────────────────────── CeleryMessage ─────────────────────────────┐
//! │ content-type: application/json   content-encoding: utf-8                │
//! │ properties: { body_encoding: base64, delivery_info, delivery_tag, .. } │
//! │ body: base64( TaskMessage JSON { id, task, args, kwargs, retries } )   │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Results are stored as JSON under `celery-task-meta-<task id>`:
//!
//! ```json
//! {"task_id": "…", "status": "SUCCESS", "result": 5, "traceback": null, "children": []}
//! ```

mod message;
mod result;
mod task;

pub use message::{CeleryMessage, CeleryProperties, DeliveryInfo};
pub use result::{ResultMessage, STATUS_FAILURE, STATUS_SUCCESS};
pub use task::{to_args, to_kwargs, TaskMessage};

/// Errors raised while encoding or decoding wire structures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Arguments could not be serialized or do not have the required shape
    #[error("invalid task arguments: {0}")]
    InvalidArguments(String),

    /// A structure could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// A structure could not be deserialized
    #[error("decode error: {0}")]
    Decode(String),

    /// The envelope uses an encoding this library does not speak
    #[error("unsupported {field}: {value}")]
    Unsupported { field: &'static str, value: String },
}
