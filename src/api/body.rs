//! JSON body parsing stage.
//!
//! Requests declaring `application/json` (or a `+json` subtype) are buffered up
//! to the configured limit and parsed once. The parsed value is stored in the
//! request extensions as [`JsonBody`] and the raw bytes are put back, so
//! collaborators may use either. Other content types pass through untouched.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;

use super::{config::GatewayConfig, error::AppError};

/// Parsed JSON request body.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub Value);

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// Buffer at most `limit` bytes. Only an over-long body is `PayloadTooLarge`;
/// a transport failure (e.g. the client hanging up) is reported as unreadable.
async fn read_limited(body: Body, limit: usize) -> Result<Bytes, AppError> {
    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(AppError::BodyUnreadable)?;
        if buffer.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

pub async fn parse_json(
    State(config): State<Arc<GatewayConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_json(&request) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match read_limited(body, config.body_limit_bytes()).await {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };

    let mut request = Request::from_parts(parts, Body::from(bytes.clone()));
    if !bytes.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                request.extensions_mut().insert(JsonBody(value));
            }
            Err(err) => return AppError::MalformedBody(err.to_string()).into_response(),
        }
    }

    next.run(request).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(content_type: &str) -> Request {
        Request::builder()
            .header(CONTENT_TYPE, content_type)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn detects_json_content_types() {
        assert!(is_json(&request("application/json")));
        assert!(is_json(&request("application/json; charset=utf-8")));
        assert!(is_json(&request("application/merge-patch+json")));
        assert!(!is_json(&request("text/plain")));
        assert!(!is_json(&request("multipart/form-data; boundary=x")));
        assert!(!is_json(&Request::new(Body::empty())));
    }

    #[tokio::test]
    async fn reads_up_to_the_limit() {
        let bytes = read_limited(Body::from("{\"a\":1}"), 7).await.unwrap();
        assert_eq!(&bytes[..], b"{\"a\":1}");

        let err = read_limited(Body::from("{\"a\":1}"), 6).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn aborted_body_is_not_reported_as_too_large() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"title\":")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let err = read_limited(body, 1024).await.unwrap_err();
        assert!(matches!(err, AppError::BodyUnreadable(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
