//! Emulated server configuration.

use crate::Result;
use adstub_core::{BindCredentials, DistinguishedName, Error};
use std::env;

/// Bind DN / password / suffix settings of an emulated directory.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    credentials: BindCredentials,
    service_dn: DistinguishedName,
    suffix: DistinguishedName,
    users_base_dn: DistinguishedName,
}

impl EmulatorConfig {
    /// Creates a configuration whose users live directly below `suffix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the bind DN or suffix is not a valid DN.
    pub fn new(bind_dn: &str, bind_password: &str, suffix: &str) -> Result<Self> {
        let service_dn = parse_setting("bind DN", bind_dn)?;
        let suffix = parse_setting("suffix", suffix)?;

        Ok(Self {
            credentials: BindCredentials::new(bind_dn, bind_password),
            service_dn,
            users_base_dn: suffix.clone(),
            suffix,
        })
    }

    /// Reads `LDAP_BIND_DN`, `LDAP_BIND_PASSWORD`, `LDAP_SUFFIX` and the optional
    /// `LDAP_USERS_BASE_DN`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a required variable is unset or a DN is invalid.
    pub fn from_env() -> Result<Self> {
        let config = Self::new(
            &required_var("LDAP_BIND_DN")?,
            &required_var("LDAP_BIND_PASSWORD")?,
            &required_var("LDAP_SUFFIX")?,
        )?;

        match env::var("LDAP_USERS_BASE_DN") {
            Ok(base) if !base.trim().is_empty() => config.with_users_base_dn(&base),
            _ => Ok(config),
        }
    }

    /// Sets the DN below which user DNs are derived.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `users_base_dn` is not a valid DN.
    pub fn with_users_base_dn(mut self, users_base_dn: &str) -> Result<Self> {
        self.users_base_dn = parse_setting("users base DN", users_base_dn)?;
        Ok(self)
    }

    /// Service account credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Parsed service account DN.
    #[must_use]
    pub const fn service_dn(&self) -> &DistinguishedName {
        &self.service_dn
    }

    /// Directory suffix.
    #[must_use]
    pub const fn suffix(&self) -> &DistinguishedName {
        &self.suffix
    }

    /// Base DN of derived user DNs.
    #[must_use]
    pub const fn users_base_dn(&self) -> &DistinguishedName {
        &self.users_base_dn
    }
}

fn parse_setting(setting: &str, value: &str) -> Result<DistinguishedName> {
    DistinguishedName::parse(value)
        .map_err(|err| Error::ConfigError(format!("invalid {setting} `{value}`: {err}")))
}

fn required_var(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::ConfigError(format!("{name} not set")))
}
