//! Cloud Storage JSON API paths to S3-style paths understood by the backing
//! engine.

use crate::domain::{Error, Result};
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, Uri};
use tracing::debug;

const STORAGE_PREFIX: &str = "/storage";
const BUCKET_API: &str = "/storage/v1/b/";
const UPLOAD_API: &str = "/upload/storage/v1/b/";
const BATCH_API: &str = "/batch/storage/v1";

/// Credential headers the backing engine must never see
const SCRUBBED_HEADERS: [&str; 2] = ["x-goog-api-key", "x-goog-user-project"];

/// Request extension set when a rewrite rule produced the final backend path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRewritten;

#[derive(Debug, Default, Clone, Copy)]
pub struct StorageTranslator;

impl StorageTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Rewrites the request path in place, keeps the query string untouched
    /// and drops credential headers.
    pub fn translate(&self, req: &mut Request) -> Result<()> {
        let original = req.uri().path().to_string();
        let (path, rewritten) = rewrite(&original);

        if path != original {
            set_path(req.uri_mut(), &path)?;
        }
        if rewritten {
            req.extensions_mut().insert(PathRewritten);
        }
        scrub_headers(req.headers_mut());

        debug!("Translated {} -> {}", original, path);
        Ok(())
    }
}

/// Maps an API path to its backend form
pub fn translate_path(path: &str) -> String {
    rewrite(path).0
}

pub fn scrub_headers(headers: &mut HeaderMap) {
    for name in SCRUBBED_HEADERS {
        headers.remove(name);
    }
    headers.remove(AUTHORIZATION);
}

/// Returns the rewritten path and whether one of the API rules matched
fn rewrite(path: &str) -> (String, bool) {
    if let Some(rest) = path.strip_prefix(BUCKET_API) {
        return (bucket_path(rest), true);
    }

    if let Some(rest) = path.strip_prefix(UPLOAD_API) {
        let bucket = rest.split('/').next().unwrap_or_default();
        return (format!("/{bucket}/"), true);
    }

    if let Some(rest) = strip_segment_prefix(path, BATCH_API) {
        return (rooted(rest), true);
    }

    match strip_segment_prefix(path, STORAGE_PREFIX) {
        Some(rest) => (rooted(rest), false),
        None => (path.to_string(), false),
    }
}

/// `{bucket}[/o/{object}]` -> `/{bucket}[/{object}]`
fn bucket_path(rest: &str) -> String {
    let mut parts = rest.splitn(3, '/');
    let bucket = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (Some("o"), Some(object)) => format!("/{bucket}/{object}"),
        _ => format!("/{bucket}"),
    }
}

/// Strips `prefix` only on a segment boundary: `/storagex` is left alone
pub(crate) fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn rooted(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Rewritten paths are built from segments of an already valid `Uri`, so
/// this only fails if a rule ever introduces characters of its own.
fn set_path(uri: &mut Uri, path: &str) -> Result<()> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query.as_str())
            .map_err(|e| Error::Translation(format!("invalid path {path:?}: {e}")))?,
    );
    *uri = Uri::from_parts(parts).map_err(|e| Error::Translation(e.to_string()))?;
    Ok(())
}
