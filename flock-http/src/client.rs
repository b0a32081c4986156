use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full, Limited};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::estimate::{request_bytes, response_head_bytes};
use super::util::{has_header, host_header_value, parse_http_url};
use super::{Error, HttpRequest, HttpResponse, Result};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Pooled HTTP/1.1 client over plain TCP or rustls.
///
/// The client never retries and never applies a request deadline of its own; callers wrap
/// [`HttpClient::request`] in whatever timeout they need. Dropping the returned future cancels
/// the call.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    max_body: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds; unreachable hosts should
        // surface promptly.
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);
        http_connector.set_nodelay(true);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self {
            inner,
            max_body: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Response bodies longer than `limit` fail with [`Error::BodyTooLarge`].
    #[must_use]
    pub fn with_max_body(mut self, limit: usize) -> Self {
        self.max_body = limit;
        self
    }

    /// Sends `req` and reads the response body, up to the client's body limit.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = req;

        let parsed = parse_http_url(&url)?;
        let uri: hyper::Uri = url.parse().map_err(|_| Error::InvalidUrl(url.clone()))?;
        let bytes_sent = request_bytes(&method, &uri, &parsed, &headers, body.len() as u64);

        let mut builder = Request::builder().method(method).uri(uri);

        // Make implicit headers explicit so byte accounting is deterministic.
        if !has_header(&headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !body.is_empty() && !has_header(&headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, body.len());
        }

        for (k, v) in &headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(body))?;
        let res: hyper::Response<Incoming> = self.inner.request(req).await?;

        let (parts, body) = res.into_parts();
        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);
        let limit = self.max_body;
        let body = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|err| match err.downcast::<hyper::Error>() {
                Ok(err) => Error::BodyRead(*err),
                Err(_) => Error::BodyTooLarge { limit },
            })?
            .to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: merge_headers(&parts.headers),
            bytes_sent,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

/// Lowercased names; repeated headers are joined with ", ".
fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}
