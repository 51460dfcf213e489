//! The error taxonomy shared by every component of the core.
//!
//! Kinds, not types: a single enum carries every failure mode so that
//! callers collecting `failed_feeds` can match on `ErrorKind` without
//! downcasting. `Error` wraps a `kind` plus the lower-level cause, the way a
//! `feed::Error` wraps `reqwest::Error` / `ParseFeedError`.

use std::fmt;

/// A taxonomy entry. Distinct from
/// [`Error`] so that call sites can classify failures without needing the
/// underlying cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkError,
    HttpError,
    NotModified,
    InvalidUtf8,
    FileTooLarge,
    InvalidUrl,
    ParseError,
    IoError,
    OutOfMemory,
    DateParseError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NetworkError => "network error",
            Self::HttpError => "http error",
            Self::NotModified => "not modified",
            Self::InvalidUtf8 => "invalid utf-8",
            Self::FileTooLarge => "response too large",
            Self::InvalidUrl => "invalid url",
            Self::ParseError => "parse error",
            Self::IoError => "i/o error",
            Self::OutOfMemory => "out of memory",
            Self::DateParseError => "date parse error",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http error fetching {url}: status {status}")]
    Http { url: String, status: u16 },

    #[error("response for {url} was not a recognized feed content-type: {content_type}")]
    DisallowedContentType { url: String, content_type: String },

    #[error("invalid utf-8 in response body for {url}")]
    InvalidUtf8 { url: String },

    #[error("response for {url} exceeded the size cap with no recoverable item boundary")]
    FileTooLarge { url: String },

    #[error("invalid feed url: {url}")]
    InvalidUrl { url: String },

    #[error("could not parse feed body from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::Http { .. } => ErrorKind::HttpError,
            Self::DisallowedContentType { .. } => ErrorKind::HttpError,
            Self::InvalidUtf8 { .. } => ErrorKind::InvalidUtf8,
            Self::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::Io { .. } => ErrorKind::IoError,
            Self::Json { .. } => ErrorKind::IoError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
