//! Streaming HTTP GET with bounded redirect following.
//!
//! Uses the curl crate (libcurl) with automatic redirects disabled: each hop is
//! a fresh request, so the hop count is ours to bound. Only the body of the
//! final 2xx response reaches the [`ChunkHandler`]. Runs in the current thread;
//! call from `spawn_blocking` when used from async code.

mod error;
mod headers;

pub use error::{classify_curl_error, FetchError};
pub use headers::{is_redirect, parse_status_line, ResponseHead};

use std::cell::RefCell;
use std::str;
use std::time::Duration;

/// Transport limits for one fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    /// Abort when no bytes arrive for this long. There is no overall deadline.
    pub idle_timeout: Duration,
    pub max_redirects: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Consumer of a response body. Returning an error aborts the transfer and the
/// error is handed back from [`fetch`] unchanged.
pub trait ChunkHandler {
    /// Called once, before the first chunk of the final 2xx response
    /// (also for an empty body).
    fn begin(&mut self, declared_len: Option<u64>) -> Result<(), FetchError>;

    fn chunk(&mut self, data: &[u8]) -> Result<(), FetchError>;
}

/// What a completed fetch delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// URL that produced the body.
    pub final_url: String,
    pub redirects: u32,
    pub bytes: u64,
    pub declared_len: Option<u64>,
}

enum Hop {
    Body { bytes: u64, declared_len: Option<u64> },
    Redirect { code: u32, location: String },
}

/// GET `url`, following up to `opts.max_redirects` redirects, streaming the final body into `handler`.
pub fn fetch<H: ChunkHandler>(
    url: &str,
    opts: &FetchOptions,
    handler: &mut H,
) -> Result<FetchSummary, FetchError> {
    let mut current = url.to_string();
    let mut redirects = 0u32;
    loop {
        match fetch_once(&current, opts, handler)? {
            Hop::Body {
                bytes,
                declared_len,
            } => {
                return Ok(FetchSummary {
                    final_url: current,
                    redirects,
                    bytes,
                    declared_len,
                });
            }
            Hop::Redirect { code, location } => {
                if redirects >= opts.max_redirects {
                    tracing::warn!(url = %current, limit = opts.max_redirects, "redirect limit reached");
                    return Err(FetchError::RedirectExhausted(opts.max_redirects));
                }
                redirects += 1;
                tracing::debug!(from = %current, to = %location, code, hop = redirects, "following redirect");
                current = location;
            }
        }
    }
}

fn fetch_once<H: ChunkHandler>(
    url: &str,
    opts: &FetchOptions,
    handler: &mut H,
) -> Result<Hop, FetchError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(FetchError::Connection)?;
    easy.follow_location(false).map_err(FetchError::Connection)?;
    easy.connect_timeout(opts.connect_timeout)
        .map_err(FetchError::Connection)?;
    // Stall detection: fewer than 1 byte/s for the idle window aborts the transfer.
    easy.low_speed_limit(1).map_err(FetchError::Connection)?;
    easy.low_speed_time(opts.idle_timeout)
        .map_err(FetchError::Connection)?;
    easy.useragent(concat!("mdm/", env!("CARGO_PKG_VERSION")))
        .map_err(FetchError::Connection)?;

    let head = RefCell::new(ResponseHead::default());
    let mut started = false;
    let mut received = 0u64;
    let mut handler_error: Option<FetchError> = None;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    head.borrow_mut().push_line(line);
                }
                true
            })
            .map_err(FetchError::Connection)?;
        transfer
            .write_function(|data| {
                let (success, declared) = {
                    let h = head.borrow();
                    (h.is_success(), h.content_length)
                };
                if !success {
                    // Redirect and error bodies are drained, never stored.
                    return Ok(data.len());
                }
                if !started {
                    started = true;
                    if let Err(e) = handler.begin(declared) {
                        handler_error = Some(e);
                        return Ok(0);
                    }
                }
                match handler.chunk(data) {
                    Ok(()) => {
                        received += data.len() as u64;
                        Ok(data.len())
                    }
                    Err(e) => {
                        handler_error = Some(e);
                        Ok(0)
                    }
                }
            })
            .map_err(FetchError::Connection)?;
        transfer.perform()
    };

    if let Some(e) = handler_error {
        return Err(e);
    }
    let head = head.into_inner();
    if let Err(e) = perform_result {
        return Err(classify_curl_error(e, head.status.is_some()));
    }

    let code = easy.response_code().map_err(FetchError::Connection)?;
    if is_redirect(code) {
        // libcurl resolves relative Location values against the request URL.
        let location = easy
            .redirect_url()
            .map_err(FetchError::Connection)?
            .map(str::to_string)
            .or(head.location);
        return match location {
            Some(location) => Ok(Hop::Redirect { code, location }),
            None => Err(FetchError::MissingLocation(code)),
        };
    }
    if !(200..300).contains(&code) {
        return Err(FetchError::Status(code));
    }

    if !started {
        handler.begin(head.content_length)?;
    }
    if let Some(expected) = head.content_length {
        if received < expected {
            return Err(FetchError::PartialTransfer { expected, received });
        }
    }
    Ok(Hop::Body {
        bytes: received,
        declared_len: head.content_length,
    })
}
