//! C4: Batch Fetcher. Issues conditional-GET HTTP requests over a shared,
//! connection-pooled `reqwest::Client` (client-builder pattern grounded in
//! the pack's archlinux-news fetcher), with a streaming UTF-8 validator and
//! a per-response size cap that truncates at the last complete item
//! boundary (§4.4).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::error::{Error, ErrorKind};
use crate::model::Feed;

const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS_PER_HOST: usize = 6;
const MAX_IN_FLIGHT: usize = 50;

const ALLOWED_CONTENT_TYPE_PREFIXES: &[&str] = &[
    "application/rss",
    "application/atom",
    "application/xml",
    "application/json",
    "text/xml",
    "text/rss",
    "text/atom",
];

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success { body: Vec<u8>, truncated: bool, etag: Option<String>, last_modified: Option<String> },
    NotModified { etag: Option<String>, last_modified: Option<String> },
    Failed(FetchError),
}

#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .pool_max_idle_per_host(MAX_CONNECTIONS_PER_HOST)
        .user_agent(format!("hys-rss/{}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Fetch `feeds`, invoking `on_complete(index, outcome)` as each transfer
/// finishes (completion order, not input order — §4.4's streaming
/// callback). Bounded to `MAX_IN_FLIGHT` concurrent transfers by a
/// semaphore, mirroring the §5 resource model's 50-connection cap.
pub async fn fetch_all<F>(client: &Client, feeds: &[Feed], max_body_bytes: usize, mut on_complete: F)
where
    F: FnMut(usize, FetchOutcome) + Send,
{
    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut tasks = tokio::task::JoinSet::new();

    for (index, feed) in feeds.iter().enumerate() {
        let client = client.clone();
        let permit = Arc::clone(&semaphore);
        let url = feed.url.clone();
        let etag = feed.etag.clone();
        let last_modified = feed.last_modified.clone();
        tasks.spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore not closed");
            let outcome = fetch_one(&client, &url, etag.as_deref(), last_modified.as_deref(), max_body_bytes).await;
            (index, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => on_complete(index, outcome),
            Err(_) => {
                // A panicked/cancelled task: caller's slot keeps its default.
            }
        }
    }
}

async fn fetch_one(
    client: &Client,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    max_body_bytes: usize,
) -> FetchOutcome {
    if let Err(reason) = validate_url(url) {
        return FetchOutcome::Failed(FetchError::new(ErrorKind::InvalidUrl, reason));
    }

    let mut request = client.get(url).header(reqwest::header::ACCEPT_ENCODING, "");
    if let Some(etag) = etag {
        request = request.header(reqwest::header::IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = last_modified {
        request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return FetchOutcome::Failed(FetchError::new(ErrorKind::NetworkError, e.to_string())),
    };

    let status = response.status();
    let headers = response.headers().clone();
    let etag = headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let last_modified = headers
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    if status.as_u16() == 304 {
        return FetchOutcome::NotModified { etag, last_modified };
    }
    if status.as_u16() >= 400 {
        return FetchOutcome::Failed(FetchError::new(ErrorKind::HttpError, format!("status {}", status.as_u16())));
    }

    if let Some(content_type) = headers.get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        let ct = content_type.to_ascii_lowercase();
        let allowed = ALLOWED_CONTENT_TYPE_PREFIXES.iter().any(|p| ct.starts_with(p));
        if !allowed {
            return FetchOutcome::Failed(FetchError::new(
                ErrorKind::HttpError,
                format!("disallowed content-type {content_type}"),
            ));
        }
    }

    match drain_body(response, max_body_bytes).await {
        Ok((body, truncated)) => FetchOutcome::Success { body, truncated, etag, last_modified },
        Err(e) => FetchOutcome::Failed(e),
    }
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.trim() != url || url.chars().any(|c| c.is_whitespace()) {
        return Err("url contains whitespace".to_string());
    }
    let lower = url.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err("url must be http or https".to_string());
    }
    Ok(())
}

/// Stream the body through a size cap and a UTF-8 boundary validator that
/// carries an incomplete trailing sequence across chunks. On cap overflow,
/// truncate at the last complete `</item>`/`</entry>` so the parser never
/// sees a half-item.
async fn drain_body(response: reqwest::Response, max_body_bytes: usize) -> Result<(Vec<u8>, bool), FetchError> {
    let mut buf: Vec<u8> = Vec::new();
    let mut pending_utf8: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.map_err(|e| FetchError::new(ErrorKind::NetworkError, e.to_string()))?;

        validate_utf8_chunk(&chunk, &mut pending_utf8)?;

        if buf.len() + chunk.len() > max_body_bytes {
            let remaining = max_body_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    if !pending_utf8.is_empty() && !truncated {
        return Err(FetchError::new(ErrorKind::InvalidUtf8, "truncated utf-8 sequence at end of body"));
    }

    if buf.is_empty() {
        return Err(FetchError::new(ErrorKind::NetworkError, "empty body"));
    }

    if truncated {
        match truncate_at_last_item_boundary(&buf) {
            Some(cut) => buf.truncate(cut),
            None => return Err(FetchError::new(ErrorKind::FileTooLarge, "no complete item boundary before cap")),
        }
    }

    Ok((buf, truncated))
}

/// Validate one chunk's UTF-8, carrying any incomplete trailing sequence
/// into `pending` for the next chunk. Returns an error on any genuinely
/// invalid sequence (not just an incomplete one at the chunk boundary).
fn validate_utf8_chunk(chunk: &[u8], pending: &mut Vec<u8>) -> Result<(), FetchError> {
    let mut combined = std::mem::take(pending);
    combined.extend_from_slice(chunk);

    match std::str::from_utf8(&combined) {
        Ok(_) => {
            combined.clear();
            Ok(())
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            match e.error_len() {
                None => {
                    // Incomplete sequence at the very end: valid so far,
                    // carry the tail forward.
                    let tail = combined[valid_up_to..].to_vec();
                    *pending = tail;
                    Ok(())
                }
                Some(_) => Err(FetchError::new(ErrorKind::InvalidUtf8, "invalid utf-8 byte sequence")),
            }
        }
    }
}

fn truncate_at_last_item_boundary(buf: &[u8]) -> Option<usize> {
    let hay = String::from_utf8_lossy(buf);
    let last_item = hay.rfind("</item>").map(|p| p + "</item>".len());
    let last_entry = hay.rfind("</entry>").map(|p| p + "</entry>".len());
    last_item.into_iter().chain(last_entry).max()
}
