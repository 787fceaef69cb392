//! Vendor registry error types

use thiserror::Error;

/// Maximum response body size for vendor HTTP calls (16 MB).
/// Prevents OOM from malicious or misconfigured upstream servers.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("gRPC client connection is missing")]
    MissingConnection,

    #[error("Vendor registry is closed")]
    Closed,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
