//! # Bulletin (HTTP gateway)
//!
//! `bulletin` is the HTTP entry point of the bulletin board service. It admits
//! cross-origin callers, stamps security headers, attaches a server-side session
//! backed by `PostgreSQL`, and dispatches to the auth, posts and comments
//! collaborators.
//!
//! ## Pipeline
//!
//! Every request walks the same stages in a fixed order:
//!
//! 1. **Security headers** wrap everything below, so errors and 404s carry them too.
//! 2. **Error terminal** renders `AppError`s into `{ ok, message, stack? }`.
//! 3. **Origin policy** denies unknown origins before any session is consulted.
//! 4. **CORS** answers preflight `OPTIONS` requests without routing.
//! 5. **JSON body parsing** rejects malformed payloads with `400`.
//! 6. **Session attach** loads the `sid` cookie and persists the session if dirty.
//! 7. **Dispatch** hands the request to the collaborator mounted on its prefix.
//!
//! ## Sessions
//!
//! Sessions are only written once they carry data, so anonymous traffic never
//! creates rows. Concurrent writes to the same session are last-write-wins.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
