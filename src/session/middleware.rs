//! Session attach/persist stage.

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::{future::Future, sync::Arc};
use tracing::{debug, warn};

use super::{
    cookie::extract_session_cookie, now_unix_seconds, Outcome, Session, SessionId,
    SessionRecord, SessionStore, StoreError,
};
use crate::api::{config::GatewayConfig, context::resolve_scheme, error::AppError};

/// Store and configuration shared by the session stage.
#[derive(Clone, Debug)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<GatewayConfig>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<GatewayConfig>) -> Self {
        Self { store, config }
    }

    async fn timed<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.config.store_timeout(), operation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AppError::StoreTimeout),
        }
    }

    /// Resume the session named by the request cookie, or start a fresh one.
    /// Missing, unsigned, unknown and expired cookies all yield a fresh session.
    ///
    /// # Errors
    /// Returns an error if the store fails or times out.
    pub async fn resume(&self, headers: &HeaderMap) -> Result<Session, AppError> {
        let Some(raw) = extract_session_cookie(headers) else {
            return Ok(Session::fresh()?);
        };
        let Some(id) = self.config.signer().verify(&raw) else {
            debug!("ignoring session cookie with an invalid signature");
            return Ok(Session::fresh()?);
        };

        match self.timed(self.store.load(&id, now_unix_seconds())).await? {
            Some(record) => Ok(Session::from_record(record)),
            None => {
                debug!(session = ?id, "session missing or expired");
                Ok(Session::fresh()?)
            }
        }
    }

    /// Persist what the request did to its session and set the cookie if needed.
    ///
    /// # Errors
    /// Returns an error if a store operation fails or times out.
    pub async fn finalize(
        &self,
        session: &Session,
        scheme: &str,
        response: &mut Response,
    ) -> Result<(), AppError> {
        let expires_at = now_unix_seconds().saturating_add(self.config.max_age_seconds());

        match session.outcome(self.config.rolling()) {
            Outcome::Unchanged => {}
            Outcome::Save { id, data, retired } => {
                for old in &retired {
                    self.timed(self.store.destroy(old)).await?;
                }
                let record = SessionRecord {
                    id,
                    data,
                    expires_at,
                };
                self.timed(self.store.save(&record)).await?;
                debug!(session = ?record.id, "session saved");
                self.set_cookie(response, &record.id, scheme)?;
            }
            Outcome::Touch(id) => {
                self.timed(self.store.touch(&id, expires_at)).await?;
                self.set_cookie(response, &id, scheme)?;
            }
            Outcome::Destroy(ids) => {
                for id in &ids {
                    self.timed(self.store.destroy(id)).await?;
                }
                let cookie = self
                    .config
                    .cookie_policy()
                    .clear_cookie()
                    .context("failed to build session cookie")?;
                response.headers_mut().append(SET_COOKIE, cookie);
            }
        }

        Ok(())
    }

    fn set_cookie(
        &self,
        response: &mut Response,
        id: &SessionId,
        scheme: &str,
    ) -> Result<(), AppError> {
        let policy = self.config.cookie_policy();
        if policy.secure && scheme != "https" {
            // The browser would drop a Secure cookie received over plain HTTP.
            warn!("not sending secure session cookie over an insecure connection");
            return Ok(());
        }
        let signed = self.config.signer().sign(id);
        let cookie = policy
            .session_cookie(&signed)
            .context("failed to build session cookie")?;
        response.headers_mut().append(SET_COOKIE, cookie);
        Ok(())
    }
}

/// Pipeline stage: attaches a [`Session`] to the request and persists it afterwards.
pub async fn attach(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let scheme = resolve_scheme(request.headers(), manager.config.trust_proxy());
    let session = manager.resume(request.headers()).await?;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    manager.finalize(&session, scheme, &mut response).await?;

    Ok(response)
}
