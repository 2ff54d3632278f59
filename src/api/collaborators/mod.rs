//! Collaborators shipped with the gateway binary.
//!
//! Real auth, posts and comments services are mounted by embedders through
//! [`crate::api::Gateway::builder`]; these keep the default binary usable.

mod session_auth;
mod unmounted;

pub use session_auth::SessionAuth;
pub use unmounted::Unmounted;
