use async_trait::async_trait;
use axum::{http::StatusCode, response::Response};

use crate::api::{context::RequestContext, dispatch::Collaborator, error::AppError};

/// Placeholder for a prefix whose service is not wired into this process.
#[derive(Debug, Clone)]
pub struct Unmounted {
    name: &'static str,
}

impl Unmounted {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Collaborator for Unmounted {
    async fn handle(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{} service is not mounted", self.name),
        ))
    }
}
