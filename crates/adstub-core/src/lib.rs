//! # adstub-core
//!
//! Core types shared by the adstub directory client and the in-memory directory emulator.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy shared by every directory operation
//! - [`attributes`] - Attribute sets as returned by directory searches
//! - [`dn`] - Distinguished name parsing, normalisation and helpers
//! - [`request`] - Search requests and filter templates
//! - [`credentials`] - Bind credentials

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attributes;
pub mod credentials;
pub mod dn;
pub mod error;
pub mod request;

// Re-export commonly used types
pub use attributes::{
    collapse, Attribute, AttributeSet, AttributeValue, Identity, DISTINGUISHED_NAME, MEMBER_OF,
};
pub use credentials::BindCredentials;
pub use dn::{
    build_user_dn, extract_group_names, extract_short_name, lowercase_type_tags,
    DistinguishedName, DistinguishedNameError, RelativeDistinguishedName,
};
pub use error::{Error, ErrorKind, Result};
pub use request::{escape_filter_value, SearchRequest, SearchScope};
