//! API documentation: the generated document and the Swagger UI.

use anyhow::{Context, Result};
use axum::{extract::State, http::HeaderMap, response::Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::{
    openapi::{server::Server, Contact, Info, InfoBuilder, License},
    OpenApi,
};
use utoipa_swagger_ui::{Config, SwaggerUi};

use super::{
    config::GatewayConfig,
    context::{forwarded_proto, resolve_host, resolve_scheme},
    error::{AppError, Envelope},
    handlers::{health, root},
};

pub const DOCS_PATH: &str = "/docs";
pub const OPENAPI_PATH: &str = "/openapi.json";

#[derive(OpenApi)]
#[openapi(
    paths(health::health, root::root),
    components(schemas(Envelope, health::Health)),
    tags(
        (name = "bulletin", description = "Bulletin board gateway"),
        (name = "health", description = "Liveness")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

/// The document as served, bound to the host and scheme the caller used.
///
/// # Errors
/// Returns an error if the document cannot be serialized.
pub fn document(host: Option<&str>, scheme: &str) -> Result<Value> {
    let mut doc = openapi();
    if let Some(host) = host {
        doc.servers = Some(vec![Server::new(format!("{scheme}://{host}"))]);
    }

    let mut value = serde_json::to_value(&doc).context("failed to serialize API document")?;
    if let Some(object) = value.as_object_mut() {
        if let Some(host) = host {
            object.insert("host".to_string(), json!(host));
        }
        object.insert("schemes".to_string(), json!([scheme]));
    }
    Ok(value)
}

/// `GET /openapi.json`. `X-Forwarded-Proto` is honored even without proxy
/// trust; it only affects the advertised scheme, never admission.
pub async fn openapi_json(
    State(config): State<Arc<GatewayConfig>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let scheme = forwarded_proto(&headers)
        .unwrap_or_else(|| resolve_scheme(&headers, config.trust_proxy()));
    let host = resolve_host(&headers, config.trust_proxy());
    Ok(Json(document(host.as_deref(), scheme)?))
}

/// Swagger UI under `/docs`, reading the document from `/openapi.json`.
pub fn swagger_ui<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new(DOCS_PATH)
        .config(Config::from(OPENAPI_PATH))
        .into()
}

fn cargo_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = optional_str(name).map(str::to_string);
    contact.email = optional_str(email).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
