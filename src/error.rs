//! Fatal error type.
//!
//! Per-packet problems are never errors; they are [`RejectReason`]
//! values handled inside the pipeline. Anything that reaches this type ends
//! the process.
//!
//! [`RejectReason`]: crate::parse::RejectReason

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Setup(String),
}
