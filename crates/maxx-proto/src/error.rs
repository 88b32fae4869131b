//! Error taxonomy shared by the core and the application.
//!
//! Every error here is recoverable: the component that hits it keeps its last
//! good state, logs, and carries on.

use thiserror::Error;

/// Failure of a catalog request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Transport-level failure reaching the catalog.
    #[error("network error: {0}")]
    Network(String),
    /// The fetched document did not have the expected structure.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A malformed remote-command packet.  The packet is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated packet: expected at least 3 fields, got {0}")]
    Truncated(usize),
    #[error("invalid selection index {0:?}")]
    InvalidSelection(String),
    #[error("invalid key symbol {0:?}: must be a single character")]
    InvalidKey(String),
    #[error("packet of {0} bytes exceeds the buffer size")]
    Oversized(usize),
    #[error("packet is not valid UTF-8")]
    Encoding,
}

/// Realizing an action decision failed.  A failed start reverts the machine
/// to `Browsing`.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no acceptable quality among {0} options")]
    NoAcceptableQuality(usize),
    #[error("quality lookup failed: {0}")]
    Catalog(#[from] CatalogError),
    #[error("download failed: {0}")]
    Download(String),
    #[error("failed to launch player: {0}")]
    Spawn(String),
    #[error("key injection failed: {0}")]
    KeyTool(String),
}
