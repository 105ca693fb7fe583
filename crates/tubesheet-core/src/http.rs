//! Blocking HTTP via libcurl, shared by the YouTube and Sheets clients.
//!
//! Every request carries a connect timeout and a total timeout. Runs in the
//! current thread; call from `spawn_blocking` when used from async code.

use std::str;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            total: Duration::from_secs(30),
        }
    }
}

impl HttpTimeouts {
    pub fn from_config(cfg: &crate::config::SyncConfig) -> Self {
        Self {
            connect: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            total: Duration::from_secs(cfg.request_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// `ETag` header as sent; presented back verbatim in `If-None-Match`.
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failure (no HTTP status available).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("{0}")]
    Other(String),
}

impl From<curl::Error> for HttpError {
    fn from(e: curl::Error) -> Self {
        let msg = e.to_string();
        if e.is_operation_timedout() {
            HttpError::Timeout(msg)
        } else if e.is_couldnt_connect()
            || e.is_couldnt_resolve_host()
            || e.is_couldnt_resolve_proxy()
            || e.is_send_error()
            || e.is_recv_error()
            || e.is_got_nothing()
            || e.is_ssl_connect_error()
        {
            HttpError::Connection(msg)
        } else {
            HttpError::Other(msg)
        }
    }
}

/// GET `url` with extra `headers` ("Name: value" pairs).
pub fn get(
    url: &str,
    headers: &[(&str, &str)],
    timeouts: HttpTimeouts,
) -> Result<HttpResponse, HttpError> {
    perform(url, headers, None, timeouts)
}

/// POST `body` as JSON to `url`.
pub fn post_json(
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    timeouts: HttpTimeouts,
) -> Result<HttpResponse, HttpError> {
    perform(url, headers, Some(body), timeouts)
}

fn perform(
    url: &str,
    custom_headers: &[(&str, &str)],
    body: Option<&[u8]>,
    timeouts: HttpTimeouts,
) -> Result<HttpResponse, HttpError> {
    let mut header_lines: Vec<String> = Vec::new();
    let mut response_body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(timeouts.connect)?;
    easy.timeout(timeouts.total)?;
    easy.useragent(concat!("tubesheet/", env!("CARGO_PKG_VERSION")))?;

    let mut list = curl::easy::List::new();
    list.append("Accept: application/json")?;
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if let Some(body) = body {
        list.append("Content-Type: application/json")?;
        easy.post(true)?;
        easy.post_fields_copy(body)?;
    }
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                header_lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            response_body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(HttpResponse {
        status: u16::try_from(status).unwrap_or(u16::MAX),
        etag: parse_etag(&header_lines),
        body: response_body,
    })
}

/// Last `ETag` in the collected header lines (redirects add earlier blocks).
fn parse_etag(lines: &[String]) -> Option<String> {
    let mut etag = None;
    for line in lines {
        if let Some((name, value)) = line.trim().split_once(':') {
            if name.trim().eq_ignore_ascii_case("etag") {
                let value = value.trim();
                if !value.is_empty() {
                    etag = Some(value.to_string());
                }
            }
        }
    }
    etag
}
