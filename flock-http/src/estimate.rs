//! Best-effort HTTP/1.1 wire size accounting.
//!
//! Reason phrases and transfer-encoding chunk framing are ignored.

use super::util::{has_header, host_header_value};
use super::{Error, HttpRequest, Result};

const CRLF: u64 = 2;
const HTTP11: &str = "HTTP/1.1";

/// Estimated bytes sent for `req`, counting the Host/Content-Length headers the client adds
/// when they are missing.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    let parsed = super::util::parse_http_url(&req.url)?;
    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    Ok(request_bytes(&req.method, &uri, &parsed, &req.headers, req.body.len() as u64))
}

pub(super) fn request_bytes(
    method: &http::Method,
    uri: &hyper::Uri,
    parsed: &url::Url,
    headers: &[(String, String)],
    body_len: u64,
) -> u64 {
    let path = uri.path_and_query().map_or("/", |p| p.as_str());

    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut total = line_bytes(&[method.as_str(), path, HTTP11]);

    total = headers.iter().fold(total, |acc, (k, v)| {
        acc.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()))
    });

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        total = total.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let len = body_len.to_string();
        total = total.saturating_add(header_bytes(b"content-length", len.as_bytes()));
    }

    total.saturating_add(CRLF).saturating_add(body_len)
}

pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => HTTP11,
    };

    let status_line = line_bytes(&[version, status.as_str()]);
    headers
        .iter()
        .fold(status_line, |acc, (name, value)| {
            acc.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()))
        })
        .saturating_add(CRLF)
}

/// Space-separated tokens followed by CRLF.
fn line_bytes(tokens: &[&str]) -> u64 {
    let text: u64 = tokens.iter().map(|t| t.len() as u64).sum();
    let spaces = tokens.len().saturating_sub(1) as u64;
    text.saturating_add(spaces).saturating_add(CRLF)
}

/// "name: value\r\n"
fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn get_counts_request_line_and_implicit_host() {
        let req = HttpRequest::get("http://example.com/hello");
        let n = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));
        // "GET /hello HTTP/1.1\r\n" + "host: example.com\r\n" + "\r\n"
        assert_eq!(n, 21 + 19 + 2);
    }

    #[test]
    fn post_counts_body_and_content_length() {
        let req = HttpRequest::post("http://example.com:8080/v1/tweets", Bytes::from_static(b"{}"))
            .with_header("content-type", "application/json");
        let n = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));
        let expected = "POST /v1/tweets HTTP/1.1\r\n".len() as u64
            + "content-type: application/json\r\n".len() as u64
            + "host: example.com:8080\r\n".len() as u64
            + "content-length: 2\r\n".len() as u64
            + 2
            + 2;
        assert_eq!(n, expected);
    }

    #[test]
    fn response_head_counts_status_line_and_headers() {
        let mut headers = http::HeaderMap::new();
        headers.insert("content-length", http::HeaderValue::from_static("5"));
        let n = response_head_bytes(http::Version::HTTP_11, http::StatusCode::OK, &headers);
        // "HTTP/1.1 200\r\n" + "content-length: 5\r\n" + "\r\n"
        assert_eq!(n, 14 + 19 + 2);
    }
}
