//! Plain HTTP fetch primitive (libcurl via the `curl` crate).
//!
//! The retry engine never builds requests itself; this module is the
//! caller-owned attempt function the CLI hands to it. Every call maps its
//! result into an `AttemptOutcome` and never returns an error.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::config::RfetchConfig;
use crate::identity::browser_headers;
use crate::retry::{AttemptError, AttemptOutcome};

/// Responses larger than this are aborted as a write error.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const MAX_REDIRECTS: u32 = 10;

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// URL as requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl TransportOptions {
    pub fn from_config(cfg: &RfetchConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
        }
    }
}

struct RawResponse {
    status: u16,
    final_url: Option<String>,
    body: Vec<u8>,
}

/// Performs one GET with browser-like headers for `identity`.
///
/// Runs in the current thread; use [`fetch_page_async`] from async code.
pub fn fetch_page(url: &str, identity: &str, opts: &TransportOptions) -> AttemptOutcome<Page> {
    match perform(url, identity, opts) {
        Ok(raw) => into_outcome(url, raw),
        Err(e) => {
            tracing::debug!(url, "transport error: {}", e);
            AttemptOutcome::failed(classify_curl_error(&e))
        }
    }
}

/// [`fetch_page`] on the blocking thread pool.
pub async fn fetch_page_async(url: String, identity: String, opts: TransportOptions) -> AttemptOutcome<Page> {
    match tokio::task::spawn_blocking(move || fetch_page(&url, &identity, &opts)).await {
        Ok(outcome) => outcome,
        Err(e) => AttemptOutcome::failed(AttemptError::Other(format!("fetch task failed: {}", e))),
    }
}

fn perform(url: &str, identity: &str, opts: &TransportOptions) -> Result<RawResponse, curl::Error> {
    let mut body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(MAX_REDIRECTS)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.timeout(opts.request_timeout)?;
    // Empty string: accept every encoding libcurl can decode.
    easy.accept_encoding("")?;

    let mut list = curl::easy::List::new();
    for (k, v) in browser_headers(identity) {
        list.append(&format!("{}: {}", k, v))?;
    }
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if body.len() + data.len() > MAX_BODY_BYTES {
                // Short write makes curl abort the transfer.
                return Ok(0);
            }
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    let final_url = easy.effective_url()?.map(str::to_string);
    Ok(RawResponse {
        status: u16::try_from(status).unwrap_or(0),
        final_url,
        body,
    })
}

fn into_outcome(url: &str, raw: RawResponse) -> AttemptOutcome<Page> {
    let text = String::from_utf8_lossy(&raw.body).into_owned();
    if !(200..300).contains(&raw.status) {
        return AttemptOutcome::http_status(raw.status, Some(&text));
    }
    if text.trim().is_empty() {
        return AttemptOutcome::malformed(Some(&text)).with_status(raw.status);
    }
    let page = Page {
        url: url.to_string(),
        final_url: raw.final_url.unwrap_or_else(|| url.to_string()),
        status: raw.status,
        body: text.clone(),
    };
    AttemptOutcome::success(page, Some(&text)).with_status(raw.status)
}

/// Map a libcurl error onto the transport failure kinds the classifier knows.
pub fn classify_curl_error(e: &curl::Error) -> AttemptError {
    if e.is_operation_timedout() {
        return AttemptError::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_ssl_connect_error()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return AttemptError::Connection(e.to_string());
    }
    AttemptError::Other(e.to_string())
}

/// Reject anything that is not an absolute http(s) URL.
pub fn check_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("invalid URL: {}", raw))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("unsupported URL scheme {:?}: {}", other, raw),
    }
}

/// Substitute a percent-encoded `query` into `template` at `{query}`.
pub fn search_url(template: &str, query: &str) -> Result<String> {
    if !template.contains("{query}") {
        bail!("search URL template has no {{query}} placeholder: {}", template);
    }
    let encoded: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
    let out = template.replace("{query}", &encoded);
    url::Url::parse(&out).with_context(|| format!("invalid search URL: {}", out))?;
    Ok(out)
}
