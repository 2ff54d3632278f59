//! Cross-origin admission.
//!
//! Admission is decided by [`admit`], a pure function over the request `Origin`
//! and the process-wide [`AllowSet`]. Denied requests never reach the session
//! stage or a collaborator. CORS response headers for admitted requests come
//! from `tower_http`'s [`CorsLayer`], configured with the same exact origins.

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Request, State},
    http::{header::ORIGIN, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::BTreeSet, sync::Arc};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;
use url::Url;

use super::{config::GatewayConfig, error::AppError};

/// Origins the web clients are served from, always admitted.
pub const BASELINE_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:5173",
    "https://timeattack01.netlify.app",
];

/// Exact-match set of admitted origins. Never contains a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowSet {
    origins: BTreeSet<String>,
}

impl AllowSet {
    #[must_use]
    pub fn baseline() -> Self {
        Self {
            origins: BASELINE_ORIGINS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Baseline plus a comma-separated list (`BULLETIN_CORS_ORIGINS`).
    /// Entries are trimmed, empty entries dropped and trailing slashes removed.
    ///
    /// # Errors
    /// Returns an error if an entry is not a `scheme://host[:port]` origin.
    pub fn with_extra(extra: &str) -> Result<Self> {
        let mut set = Self::baseline();
        for entry in extra.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            set.origins.insert(normalize_origin(entry)?);
        }
        Ok(set)
    }

    #[must_use]
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

fn normalize_origin(entry: &str) -> Result<String> {
    let trimmed = entry.trim_end_matches('/');
    if trimmed == "*" {
        return Err(anyhow!("wildcard origins are not allowed with credentials"));
    }
    let parsed = Url::parse(trimmed).with_context(|| format!("invalid origin: {entry}"))?;
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(anyhow!("origin must not contain a path: {entry}"));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("origin must include a host: {entry}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    Ok(format!("{}://{}{}", parsed.scheme(), host, port))
}

/// Result of evaluating a request origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Same-origin or non-browser callers send no `Origin`.
    NoOrigin,
    Allowed(String),
    Denied(String),
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }
}

#[must_use]
pub fn admit(origin: Option<&str>, allow_set: &AllowSet) -> Admission {
    match origin {
        None | Some("") => Admission::NoOrigin,
        Some(origin) if allow_set.contains(origin) => Admission::Allowed(origin.to_string()),
        Some(origin) => Admission::Denied(origin.to_string()),
    }
}

/// Pipeline stage: rejects requests from origins outside the allow-set.
pub async fn enforce(
    State(config): State<Arc<GatewayConfig>>,
    request: Request,
    next: Next,
) -> Response {
    // A non-UTF-8 Origin can never match the set.
    let origin = request
        .headers()
        .get(ORIGIN)
        .map(|value| value.to_str().unwrap_or("<invalid>"));

    match admit(origin, config.allow_set()) {
        Admission::Denied(origin) => {
            warn!(origin = %origin, path = %request.uri().path(), "origin denied");
            AppError::OriginDenied { origin }.into_response()
        }
        Admission::NoOrigin | Admission::Allowed(_) => next.run(request).await,
    }
}

/// CORS headers for admitted origins. Credentials are allowed, so every
/// origin is listed explicitly.
#[must_use]
pub fn cors_layer(allow_set: &AllowSet) -> CorsLayer {
    let origins: Vec<HeaderValue> = allow_set
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_origin_is_admitted() {
        assert_eq!(admit(None, &AllowSet::baseline()), Admission::NoOrigin);
    }

    #[test]
    fn exact_members_are_admitted() {
        let set = AllowSet::baseline();
        assert_eq!(
            admit(Some("https://timeattack01.netlify.app"), &set),
            Admission::Allowed("https://timeattack01.netlify.app".to_string())
        );
    }

    #[test]
    fn near_misses_are_denied() {
        let set = AllowSet::baseline();
        for origin in [
            "https://timeattack01.netlify.app.evil.com",
            "http://timeattack01.netlify.app",
            "https://TIMEATTACK01.netlify.app/",
            "null",
        ] {
            assert!(!admit(Some(origin), &set).is_admitted(), "{origin}");
        }
    }

    #[test]
    fn empty_origin_counts_as_absent() {
        assert_eq!(admit(Some(""), &AllowSet::baseline()), Admission::NoOrigin);
    }

    #[test]
    fn extra_origins_are_trimmed_and_filtered() {
        let set = AllowSet::with_extra(" https://board.example.com/ , ,http://10.0.0.5:8080,").unwrap();
        assert_eq!(set.len(), BASELINE_ORIGINS.len() + 2);
        assert!(set.contains("https://board.example.com"));
        assert!(set.contains("http://10.0.0.5:8080"));
        assert!(set.contains("http://localhost:3000"));
    }

    #[test]
    fn empty_extra_is_baseline() {
        assert_eq!(AllowSet::with_extra("").unwrap(), AllowSet::baseline());
    }

    #[test]
    fn wildcards_and_paths_are_rejected() {
        assert!(AllowSet::with_extra("*").is_err());
        assert!(AllowSet::with_extra("https://board.example.com/app").is_err());
        assert!(AllowSet::with_extra("not an origin").is_err());
    }
}
