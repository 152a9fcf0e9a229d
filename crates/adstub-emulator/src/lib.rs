//! In-memory Active Directory emulator.
//!
//! Serves users and groups from JSON data through the same bind/search surface a real
//! directory offers, so the directory client can be exercised without a server.
//!
//! ```no_run
//! use std::sync::Arc;
//! use adstub_emulator::{DirectoryEmulator, EmulatedConnector, EmulatorConfig, EnvSource};
//!
//! # fn main() -> adstub_core::Result<()> {
//! let config = EmulatorConfig::from_env()?;
//! let emulator = Arc::new(DirectoryEmulator::new(config, &EnvSource::new()));
//! let _connector = EmulatedConnector::new(emulator);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod config;
mod engine;
mod filter;
mod records;
mod session;
mod source;

pub use config::EmulatorConfig;
pub use engine::DirectoryEmulator;
pub use filter::{Clause, DirectoryQuery, Filter, MatchKind, WildcardPattern};
pub use records::{flatten_groups, FlatGroup, GroupRecord, UserRecord};
pub use session::EmulatedConnector;
pub use source::{
    DirectoryData, DirectorySource, EnvSource, FileSource, JsonSource, StaticSource,
    LDAP_USERS_VAR, USERS_CONFIG_FILE_VAR,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adstub_core::Result<T>;
