//! Session-only part of the auth surface: `GET /auth/me` and `POST /auth/logout`.
//!
//! Credential checks (register/login) belong to the auth service; everything
//! here only reads or drops the attached session.

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::api::{context::RequestContext, dispatch::Collaborator, error::AppError};

#[derive(Debug, Clone, Default)]
pub struct SessionAuth;

#[async_trait]
impl Collaborator for SessionAuth {
    async fn handle(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let session = ctx
            .session
            .as_ref()
            .ok_or_else(|| anyhow!("auth routes require the session stage"))?;

        match (&ctx.method, ctx.mount_path.as_str()) {
            (&Method::GET, "/me") => match session.identity() {
                Some(user) => Ok(Json(json!({ "ok": true, "user": user })).into_response()),
                None => Err(AppError::with_status(
                    StatusCode::UNAUTHORIZED,
                    "Not authenticated",
                )),
            },
            (&Method::POST, "/logout") => {
                session.destroy();
                Ok(Json(json!({ "ok": true })).into_response())
            }
            (_, "/register" | "/login") => Err(AppError::with_status(
                StatusCode::NOT_IMPLEMENTED,
                "Credential login is handled by the auth service",
            )),
            _ => Ok(crate::api::error::not_found().await),
        }
    }
}
