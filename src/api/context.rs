//! Per-request view handed to collaborators.

use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{HOST, ORIGIN},
        HeaderMap, Method, Uri,
    },
};
use serde_json::Value;

use super::body::JsonBody;
use crate::session::Session;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Transient request record; dropped once the response is produced.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    /// Path below the collaborator's mount prefix, always starting with `/`.
    pub mount_path: String,
    pub headers: HeaderMap,
    pub origin: Option<String>,
    pub scheme: String,
    pub host: Option<String>,
    pub session: Option<Session>,
    pub body: Option<Value>,
    /// Unparsed request body. Still readable after JSON parsing, which puts
    /// the buffered bytes back.
    pub raw_body: Body,
}

impl RequestContext {
    #[must_use]
    pub fn from_request(request: Request, mount_path: String, trust_proxy: bool) -> Self {
        let (parts, raw_body) = request.into_parts();
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            mount_path,
            headers: parts.headers.clone(),
            origin: parts
                .headers
                .get(ORIGIN)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string),
            scheme: resolve_scheme(&parts.headers, trust_proxy).to_string(),
            host: resolve_host(&parts.headers, trust_proxy),
            session: parts.extensions.get::<Session>().cloned(),
            body: parts
                .extensions
                .get::<JsonBody>()
                .map(|JsonBody(value)| value.clone()),
            raw_body,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// First value of a possibly comma-separated forwarding header.
fn first_forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// The `X-Forwarded-Proto` value, when it names `http` or `https`.
#[must_use]
pub fn forwarded_proto(headers: &HeaderMap) -> Option<&'static str> {
    match first_forwarded(headers, X_FORWARDED_PROTO)?
        .to_ascii_lowercase()
        .as_str()
    {
        "https" => Some("https"),
        "http" => Some("http"),
        _ => None,
    }
}

/// The listener speaks plain HTTP, so `https` can only come from a trusted proxy hop.
#[must_use]
pub fn resolve_scheme(headers: &HeaderMap, trust_proxy: bool) -> &'static str {
    if trust_proxy {
        forwarded_proto(headers).unwrap_or("http")
    } else {
        "http"
    }
}

#[must_use]
pub fn resolve_host(headers: &HeaderMap, trust_proxy: bool) -> Option<String> {
    let forwarded = trust_proxy
        .then(|| first_forwarded(headers, X_FORWARDED_HOST))
        .flatten();
    forwarded
        .or_else(|| headers.get(HOST).and_then(|value| value.to_str().ok()))
        .map(ToString::to_string)
}
