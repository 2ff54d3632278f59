//! Prefix dispatch to mounted collaborators.
//!
//! The gateway does no authorization here; collaborators inspect the attached
//! session themselves.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    response::Response,
};
use std::{fmt, sync::Arc};

use super::{context::RequestContext, error::{not_found, AppError}, AppState};

/// A mounted sub-application (auth, posts, comments).
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn handle(&self, ctx: RequestContext) -> Result<Response, AppError>;
}

struct Mount {
    prefix: String,
    collaborator: Arc<dyn Collaborator>,
}

/// Ordered prefix table; the longest matching prefix wins.
#[derive(Default)]
pub struct DispatchTable {
    mounts: Vec<Mount>,
}

impl DispatchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `collaborator` under `prefix` (e.g. `/api/posts`). Remounting a
    /// prefix replaces the previous collaborator.
    #[must_use]
    pub fn mount(mut self, prefix: &str, collaborator: Arc<dyn Collaborator>) -> Self {
        let prefix = format!("/{}", prefix.trim_matches('/'));
        self.mounts.retain(|mount| mount.prefix != prefix);
        self.mounts.push(Mount {
            prefix,
            collaborator,
        });
        self.mounts
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    /// Collaborator for `path` and the remainder of the path below its prefix.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<(Arc<dyn Collaborator>, String)> {
        self.mounts.iter().find_map(|mount| {
            let rest = path.strip_prefix(mount.prefix.as_str())?;
            if rest.is_empty() {
                Some((mount.collaborator.clone(), "/".to_string()))
            } else if rest.starts_with('/') {
                Some((mount.collaborator.clone(), rest.to_string()))
            } else {
                None
            }
        })
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|mount| mount.prefix.as_str())
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.prefixes()).finish()
    }
}

/// Router fallback: hands unclaimed paths to the mounted collaborators, or to
/// the Not Found terminal when no prefix matches.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let Some((collaborator, mount_path)) = state.dispatch.resolve(request.uri().path()) else {
        return Ok(not_found().await);
    };
    let ctx = RequestContext::from_request(request, mount_path, state.config.trust_proxy());
    collaborator.handle(ctx).await
}
