//! # ytchat core
//!
//! Shared, runtime-agnostic logic for ytchat: data models, the citation and
//! segment invariants, platform URL parsing, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The SQLite backend, the external capability clients, and the
//! orchestrators live in the `ytchat` application crate.

pub mod models;
pub mod platform;
pub mod store;
