//! Fetch error type and classification of libcurl failures.

use thiserror::Error;

/// Error returned by a streaming fetch: transport failures, redirect problems,
/// or an error raised by the chunk handler (cancellation, disk write).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The final response had a non-2xx, non-redirect status.
    #[error("HTTP {0}")]
    Status(u32),
    /// No response arrived within the connect timeout.
    #[error("connection timed out: {0}")]
    ConnectTimeout(#[source] curl::Error),
    /// The response started but no bytes arrived within the idle timeout.
    #[error("transfer stalled: {0}")]
    IdleTimeout(#[source] curl::Error),
    /// Other network-level failure (DNS, reset, TLS, ...).
    #[error("{0}")]
    Connection(#[source] curl::Error),
    /// More redirect hops than allowed.
    #[error("too many redirects (limit {0})")]
    RedirectExhausted(u32),
    /// Redirect status without a usable `Location` header.
    #[error("HTTP {0} redirect without Location")]
    MissingLocation(u32),
    /// Body ended before the declared `Content-Length`.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// The handler observed a cancel request.
    #[error("download cancelled by user")]
    Cancelled,
    /// The handler failed to write to disk. Not a transport error.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
}

impl FetchError {
    /// True for failures of the network transfer itself.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            FetchError::Cancelled | FetchError::Storage(_) | FetchError::RedirectExhausted(_)
        )
    }
}

/// Map a curl error to a fetch error. `responded` is true once a status line was seen,
/// which separates a connect timeout from a mid-stream stall.
pub fn classify_curl_error(e: curl::Error, responded: bool) -> FetchError {
    if e.is_operation_timedout() {
        return if responded {
            FetchError::IdleTimeout(e)
        } else {
            FetchError::ConnectTimeout(e)
        };
    }
    FetchError::Connection(e)
}
