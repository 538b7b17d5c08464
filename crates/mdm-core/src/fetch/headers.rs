//! Parse HTTP response header lines as libcurl delivers them.

/// Status and the headers the fetcher cares about for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub location: Option<String>,
}

impl ResponseHead {
    /// Feed one header line. A status line starts a new head, so interim
    /// `1xx` responses do not leak into the final one.
    pub fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = ResponseHead {
                status: parse_status_line(line),
                ..ResponseHead::default()
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                self.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("location") && !value.is_empty() {
                self.location = Some(value.to_string());
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

/// `HTTP/1.1 302 Found` -> 302.
pub fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Redirect statuses that carry a `Location` to re-issue the GET against.
pub fn is_redirect(code: u32) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}
