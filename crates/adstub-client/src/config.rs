//! Configuration types for directory client usage.

use crate::Result;
use adstub_core::{BindCredentials, DistinguishedName};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Configuration for connecting to a directory.
#[derive(Debug, Clone, Validate)]
pub struct DirectoryConfig {
    #[validate(length(min = 1))]
    endpoints: Vec<String>,
    credentials: BindCredentials,
    suffix: DistinguishedName,
    users_base_dn: DistinguishedName,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    #[validate(range(min = 1, max = 300))]
    connection_timeout_secs: u64,
    #[validate(range(min = 1, max = 300))]
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a new directory configuration.
    ///
    /// Endpoints are tried in the given order when connecting.
    ///
    /// # Errors
    ///
    /// Returns [`adstub_core::Error::ConfigError`] if no endpoint is given or an endpoint URL is invalid.
    pub fn new<I, S>(
        endpoints: I,
        credentials: BindCredentials,
        suffix: DistinguishedName,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        for endpoint in &endpoints {
            Url::parse(endpoint)?;
        }

        let config = Self {
            endpoints,
            credentials,
            users_base_dn: suffix.clone(),
            suffix,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };

        config.validate()?;

        Ok(config)
    }

    /// Returns the endpoint URLs in connection order.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Returns the service bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the root suffix.
    #[must_use]
    pub const fn suffix(&self) -> &DistinguishedName {
        &self.suffix
    }

    /// Returns the users base distinguished name.
    #[must_use]
    pub const fn users_base_dn(&self) -> &DistinguishedName {
        &self.users_base_dn
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Overrides the users base distinguished name.
    #[must_use]
    pub fn with_users_base_dn(mut self, dn: DistinguishedName) -> Self {
        self.users_base_dn = dn;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adstub_core::Error;

    fn credentials() -> BindCredentials {
        BindCredentials::new("CN=Administrator,CN=Users,DC=example,DC=com", "secret")
    }

    fn suffix() -> DistinguishedName {
        DistinguishedName::parse("DC=example,DC=com").unwrap()
    }

    #[test]
    fn builder_overrides() {
        let users = DistinguishedName::parse("CN=Users,DC=example,DC=com").unwrap();

        let config = DirectoryConfig::new(
            ["ldap://dc1.example.com:389", "ldaps://dc2.example.com"],
            credentials(),
            suffix(),
        )
        .unwrap()
        .with_users_base_dn(users.clone())
        .with_connection_timeout_secs(20)
        .with_operation_timeout_secs(30)
        .with_tls_verification(false);

        assert_eq!(config.endpoints().len(), 2);
        assert_eq!(config.users_base_dn(), &users);
        assert_eq!(config.suffix(), &suffix());
        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert!(!config.tls_verify());
    }

    #[test]
    fn users_base_defaults_to_suffix() {
        let config =
            DirectoryConfig::new(["ldap://localhost:1234"], credentials(), suffix()).unwrap();
        assert_eq!(config.users_base_dn(), config.suffix());
        assert_eq!(
            config.operation_timeout(),
            Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)
        );
    }

    #[test]
    fn at_least_one_endpoint_required() {
        let result = DirectoryConfig::new(Vec::<String>::new(), credentials(), suffix());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let result = DirectoryConfig::new(["not a url"], credentials(), suffix());
        assert!(matches!(result, Err(Error::ConfigError(message)) if message.starts_with("invalid endpoint")));
    }

    #[test]
    fn out_of_range_timeout_rejected() {
        let result = DirectoryConfig::new(["ldap://localhost:389"], credentials(), suffix())
            .unwrap()
            .with_operation_timeout_secs(0)
            .validate()
            .map_err(Error::from);
        assert!(matches!(
            result,
            Err(Error::ConfigError(message)) if message.starts_with("Invalid directory configuration")
        ));
    }
}
