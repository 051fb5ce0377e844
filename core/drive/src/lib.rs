//! Google Drive access layer for the drive CLI.
//!
//! This crate holds the credential lifecycle (reuse, refresh, or interactive
//! re-authorization), a thin Drive v3 REST client, name-to-identifier
//! resolution, and the operation dispatcher driven by the binary.

pub mod auth;
pub mod client;
pub mod ops;
pub mod resolve;
pub mod store;

pub use auth::{AuthConfig, AuthManager, Credential, CredentialManager};
pub use client::{DriveClient, RemoteObject};
pub use ops::{Dispatcher, Operation};
pub use resolve::NameResolver;
pub use store::CredentialStore;
