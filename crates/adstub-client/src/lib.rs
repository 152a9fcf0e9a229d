//! Directory client for Active Directory style LDAP servers.
//!
//! The client resolves an identity with a service account, verifies a password by binding as
//! that identity, and runs attribute searches. The transport sits behind the
//! [`DirectoryConnector`] / [`DirectorySession`] seam so the in-memory emulator or a mock can
//! stand in for a real server.

#![deny(missing_docs)]

mod client;
mod config;
mod identity;

pub use client::{
    DirectoryClient, DirectoryConnector, DirectorySession, LdapConnector, ProtocolState,
};
pub use config::{
    DirectoryConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use identity::AuthenticatedIdentity;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adstub_core::Result<T>;
