use std::error::Error as StdError;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failed HTTP call, used as a metric label.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    RequestBuild,
    HeaderName,
    HeaderValue,
    Timeout,
    ConnectionRefused,
    Dns,
    Connect,
    Request,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpTransportErrorKind::UnsupportedScheme,
            Self::RequestBuild(_) => HttpTransportErrorKind::RequestBuild,
            Self::HeaderName(_) => HttpTransportErrorKind::HeaderName,
            Self::HeaderValue(_) => HttpTransportErrorKind::HeaderValue,
            Self::Request(err) => classify_request_error(err),
            Self::BodyRead(_) | Self::BodyTooLarge { .. } => HttpTransportErrorKind::BodyRead,
        }
    }
}

fn classify_request_error(err: &hyper_util::client::legacy::Error) -> HttpTransportErrorKind {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cur) = source {
        if let Some(io) = cur.downcast_ref::<io::Error>() {
            match io.kind() {
                io::ErrorKind::ConnectionRefused => return HttpTransportErrorKind::ConnectionRefused,
                io::ErrorKind::TimedOut => return HttpTransportErrorKind::Timeout,
                _ => {}
            }
        }

        // The connector reports resolver failures as a plain "dns error" message.
        let msg = cur.to_string();
        if msg.starts_with("dns error") || msg.contains("failed to lookup address") {
            return HttpTransportErrorKind::Dns;
        }

        source = cur.source();
    }

    if err.is_connect() {
        HttpTransportErrorKind::Connect
    } else {
        HttpTransportErrorKind::Request
    }
}
