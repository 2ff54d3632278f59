//! Terminal states of the pipeline: the error renderer and the 404 envelope.
//!
//! Stages and collaborators never write error bodies themselves. They return an
//! [`AppError`], whose response carries an [`ErrorReport`] extension; the
//! [`render_errors`] middleware logs it and turns it into the JSON envelope.

use axum::{
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{any::Any, error::Error as _, fmt::Write as _, sync::Arc};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use super::config::GatewayConfig;
use crate::session::StoreError;

/// Uniform JSON body for gateway-generated responses.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl Envelope {
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            ok: false,
            message: Some("Not Found".to_string()),
            stack: None,
            env: None,
        }
    }

    #[must_use]
    pub fn error(message: String, stack: Option<String>) -> Self {
        Self {
            ok: false,
            message: Some(message),
            stack,
            env: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// The message deliberately leaves the origin out of the response body.
    #[error("Not allowed by CORS")]
    OriginDenied { origin: String },
    #[error("Malformed JSON body: {0}")]
    MalformedBody(String),
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Request body could not be read")]
    BodyUnreadable(#[source] axum::Error),
    #[error("Session store failure")]
    Store(#[from] StoreError),
    #[error("Session store did not respond in time")]
    StoreTimeout,
    /// Raised by collaborators that want a specific status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginDenied { .. } => StatusCode::FORBIDDEN,
            Self::MalformedBody(_) | Self::BodyUnreadable(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::StoreTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Status { status, .. } => *status,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error message followed by its source chain; anyhow errors include their backtrace.
    fn trace(&self) -> String {
        if let Self::Internal(err) = self {
            return format!("Error: {err:?}");
        }
        let mut trace = format!("Error: {self}");
        let mut source = self.source();
        while let Some(cause) = source {
            let _ = write!(trace, "\n    caused by: {cause}");
            source = cause.source();
        }
        trace
    }
}

/// Carried from a failing stage to the terminal renderer in response extensions.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub trace: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            status: self.status(),
            message: self.to_string(),
            trace: self.trace(),
        };
        let mut response = report.status.into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Error terminal: logs every reported error and renders the envelope.
/// The stack is only included outside production.
pub async fn render_errors(
    State(config): State<Arc<GatewayConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    error!(
        status = report.status.as_u16(),
        http.method = %method,
        http.path = %path,
        trace = %report.trace,
        "{}",
        report.message
    );

    let stack = (!config.is_production()).then_some(report.trace);
    let mut rendered = (report.status, Json(Envelope::error(report.message, stack))).into_response();

    // Keep headers set by inner stages (CORS, Set-Cookie) but not the body framing.
    for (name, value) in response.headers() {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rendered.headers_mut().append(name, value.clone());
        }
    }

    rendered
}

/// Turns a panic below the error terminal into an ordinary 500 report, so it
/// is logged and rendered like any other error.
#[must_use]
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");

    AppError::Internal(anyhow::anyhow!("panicked: {detail}").context("request handler panicked"))
        .into_response()
}

/// Not Found terminal for paths no route or mount claims.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(Envelope::not_found())).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            AppError::OriginDenied {
                origin: "https://evil.example".to_string()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::MalformedBody("eof".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::with_status(StatusCode::CONFLICT, "taken").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn origin_is_not_part_of_the_message() {
        let err = AppError::OriginDenied {
            origin: "https://evil.example".to_string(),
        };
        assert!(!err.to_string().contains("evil"));
        assert!(!err.trace().contains("evil"));
    }

    #[test]
    fn into_response_attaches_report() {
        let response = AppError::with_status(StatusCode::IM_A_TEAPOT, "short and stout").into_response();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.message, "short and stout");
        assert!(report.trace.starts_with("Error: short and stout"));
    }

    #[test]
    fn trace_walks_the_source_chain() {
        let err = AppError::Internal(anyhow!("disk full").context("saving session"));
        let trace = err.trace();
        assert!(trace.contains("saving session"));
        assert!(trace.contains("disk full"));
    }

    #[test]
    fn panic_payloads_become_internal_reports() {
        let response = panic_response(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.message, "request handler panicked");
        assert!(report.trace.contains("index out of bounds"));

        let response = panic_response(Box::new(String::from("formatted panic")));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.trace.contains("formatted panic"));

        let response = panic_response(Box::new(42_u8));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.trace.contains("non-string panic payload"));
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let value = serde_json::to_value(Envelope::not_found()).unwrap();
        assert_eq!(value, serde_json::json!({"ok": false, "message": "Not Found"}));
    }
}
