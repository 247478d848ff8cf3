use super::translator::{PathRewritten, strip_segment_prefix};
use crate::domain::{Error, Result};
use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use reqwest::Url;
use tracing::debug;

/// Largest request body buffered before forwarding
const MAX_BODY_BYTES: usize = 1 << 30;

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Forwards requests to a single backend endpoint
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    target: Url,
    client: reqwest::Client,
}

impl ReverseProxy {
    pub fn new(endpoint: &str) -> Result<Self> {
        let target = Url::parse(endpoint)
            .map_err(|e| Error::Proxy(format!("invalid backend endpoint {endpoint}: {e}")))?;
        Ok(Self {
            target,
            client: reqwest::Client::new(),
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Backend URL for `uri`. Paths no rewrite rule handled still lose a
    /// leading `/storage` segment.
    pub fn outbound_url(&self, uri: &Uri, rewritten: bool) -> Url {
        let path = uri.path();
        let path = if rewritten {
            path
        } else {
            strip_segment_prefix(path, "/storage").unwrap_or(path)
        };

        let mut url = self.target.clone();
        url.set_path(if path.is_empty() { "/" } else { path });
        url.set_query(uri.query());
        url
    }

    pub async fn forward(&self, req: Request) -> Result<Response> {
        let (parts, body) = req.into_parts();
        let rewritten = parts.extensions.get::<PathRewritten>().is_some();
        let url = self.outbound_url(&parts.uri, rewritten);

        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| Error::Proxy(format!("failed to read request body: {e}")))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if let Some(host) = headers.remove(header::HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }

        debug!("Forwarding {} {}", parts.method, url);
        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Proxy(format!("backend request failed: {e}")))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}
