//! Built-in endpoints served by the gateway itself.

pub mod health;
pub mod root;
