use axum::response::IntoResponse;

pub const BANNER: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " - bulletin board API is running. See /docs for the API reference."
);

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Informational banner", body = String, content_type = "text/plain")
    ),
    tag = "bulletin"
)]
pub async fn root() -> impl IntoResponse {
    BANNER
}
