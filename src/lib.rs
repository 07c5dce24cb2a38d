//! `rsml-annotator`: the account gating and annotation session core of a speech transcript
//! annotation service.
//!
//! This crate provides:
//! - An account lifecycle (register → approve ⇄ revoke, delete) with admin protection
//! - Bearer credential issuance and verification
//! - A per-client annotation `Session` with batch/file navigation
//! - Single and bulk markup saves with per-segment failure reporting
//!
//! Storage, password hashing, and markup rendering sit behind traits so the core can run
//! against in-memory stores (tests, the bundled server) or real backends.

mod error;
mod upstream;

// High-level API (most consumers should start here).
pub mod api;
pub mod opts;

// Accounts and access control.
pub mod access;
pub mod accounts;
pub mod credential_store;
pub mod password;
pub mod user;

// Annotation data and session control.
pub mod catalog;
pub mod navigator;
pub mod render;
pub mod save;
pub mod segments;
pub mod session;

#[cfg(feature = "http-client")]
pub mod http_catalog;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use api::Api;
pub use error::{Error, ErrorKind, Result};
pub use opts::Opts;
pub use session::Session;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
