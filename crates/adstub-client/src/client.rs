//! Directory client implementation.
//!
//! Every [`DirectoryClient::login`] or [`DirectoryClient::search`] call opens its own
//! connection and walks it through
//! `Disconnected → Connected → ServiceBound → Searched → Verified (login only) → Done`.
//! The first failure releases the connection and is returned unchanged; a "no such object"
//! answer to the search is the only failure turned into a success (an empty result).
//! Login searches default to the users base DN, plain searches to the suffix.

use crate::{config::DirectoryConfig, identity::AuthenticatedIdentity, Result};
use adstub_core::{AttributeSet, Error, Identity, SearchRequest, SearchScope, DISTINGUISHED_NAME};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::fmt;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
const RC_OTHER: u32 = 80;

/// Stage reached by a single login or search exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// No connection yet.
    Disconnected,
    /// Connected to one endpoint.
    Connected,
    /// Bound with the service credentials.
    ServiceBound,
    /// Search answered.
    Searched,
    /// Password verified by a rebind as the found identity.
    Verified,
    /// Connection released.
    Done,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::ServiceBound => "service-bound",
            Self::Searched => "searched",
            Self::Verified => "verified",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// One connection to a directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Binds the connection to `dn`.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Runs a search and returns the matching entries.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Identity>>;

    /// Releases the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens [`DirectorySession`]s.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens a new connection.
    async fn connect(&self) -> Result<Box<dyn DirectorySession>>;
}

/// Directory client with a pluggable transport.
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn DirectoryConnector>,
}

impl DirectoryClient {
    /// Creates a client that talks to the configured endpoints over LDAP.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn DirectoryConnector> = Box::new(LdapConnector::new(config.clone()));
        Self { config, connector }
    }

    /// Creates a client over a custom transport.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Box<dyn DirectoryConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Verifies `password` for the single identity matched by `request`.
    ///
    /// The request's username replaces the `{0}` / `{username}` placeholders of its filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoUniqueIdentity`] unless exactly one entry matches,
    /// [`Error::MissingDistinguishedName`] if the entry carries no DN, and any bind failure
    /// (for instance [`Error::InvalidCredentials`]) unchanged.
    pub async fn login(
        &self,
        password: &str,
        request: &SearchRequest,
    ) -> Result<AuthenticatedIdentity> {
        self.run_login(password, request).await.map_err(log_failure)
    }

    /// Searches with the service credentials and projects the requested attributes.
    ///
    /// An empty request attribute list returns every attribute the directory sent.
    ///
    /// # Errors
    ///
    /// Returns connection, timeout and bind failures. "No such object" yields an empty list.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<AttributeSet>> {
        self.run_search(request).await.map_err(log_failure)
    }

    async fn run_login(
        &self,
        password: &str,
        request: &SearchRequest,
    ) -> Result<AuthenticatedIdentity> {
        let filter = request.resolved_filter();
        let mut exchange = self.service_exchange().await?;
        let base = request
            .base()
            .map_or_else(|| self.config.users_base_dn().to_string(), str::to_owned);
        let mut entries = match exchange.search(&base, request, &filter, true).await {
            Ok(entries) => entries,
            Err(err) => return Err(exchange.abandon(err).await),
        };

        if entries.len() != 1 {
            warn!(filter = %filter, found = entries.len(), "login search did not resolve a unique identity");
            return Err(exchange.abandon(Error::NoUniqueIdentity(entries.len())).await);
        }

        let entry = entries.remove(0);
        let Some(dn) = entry.bind_dn().map(str::to_owned) else {
            return Err(exchange.abandon(Error::MissingDistinguishedName).await);
        };

        if let Err(err) = exchange.rebind(&dn, password).await {
            return Err(exchange.abandon(err).await);
        }
        exchange.finish().await;

        info!(dn = %dn, "identity verified");
        Ok(AuthenticatedIdentity::from_entry(&dn, &entry, request))
    }

    async fn run_search(&self, request: &SearchRequest) -> Result<Vec<AttributeSet>> {
        let filter = request.resolved_filter();
        let mut exchange = self.service_exchange().await?;
        let base = request
            .base()
            .map_or_else(|| self.config.suffix().to_string(), str::to_owned);
        let entries = match exchange.search(&base, request, &filter, false).await {
            Ok(entries) => entries,
            Err(err) => return Err(exchange.abandon(err).await),
        };
        exchange.finish().await;

        Ok(entries
            .iter()
            .map(|entry| {
                if request.attributes().is_empty() {
                    entry.attributes.clone()
                } else {
                    entry.attributes.project(request.attributes())
                }
            })
            .collect())
    }

    async fn service_exchange(&self) -> Result<Exchange<'_>> {
        let session = self.connector.connect().await?;
        let mut exchange = Exchange::new(&self.config, session);
        match exchange.service_bind().await {
            Ok(()) => Ok(exchange),
            Err(err) => Err(exchange.abandon(err).await),
        }
    }
}

struct Exchange<'a> {
    config: &'a DirectoryConfig,
    session: Box<dyn DirectorySession>,
    state: ProtocolState,
}

impl<'a> Exchange<'a> {
    fn new(config: &'a DirectoryConfig, session: Box<dyn DirectorySession>) -> Self {
        let mut exchange = Self {
            config,
            session,
            state: ProtocolState::Disconnected,
        };
        exchange.advance(ProtocolState::Connected);
        exchange
    }

    fn advance(&mut self, next: ProtocolState) {
        debug!(from = %self.state, to = %next, "directory exchange transition");
        self.state = next;
    }

    async fn service_bind(&mut self) -> Result<()> {
        let config = self.config;
        let credentials = config.credentials();
        execute_with_timeout(
            config.operation_timeout(),
            self.session
                .simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await?;
        self.advance(ProtocolState::ServiceBound);
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        request: &SearchRequest,
        filter: &str,
        resolve_dn: bool,
    ) -> Result<Vec<Identity>> {
        let config = self.config;
        let mut attributes = request.attributes().to_vec();
        if resolve_dn && !attributes.is_empty() && !request.requests(DISTINGUISHED_NAME) {
            attributes.push(DISTINGUISHED_NAME.to_string());
        }

        let result = execute_with_timeout(
            config.operation_timeout(),
            self.session
                .search(base, request.scope(), filter, &attributes),
        )
        .await;

        let entries = match result {
            Ok(entries) => entries,
            Err(Error::NoSuchObject(message)) => {
                debug!(base = %base, "search answered no such object: {message}");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        debug!(base = %base, filter = %filter, found = entries.len(), "search completed");
        self.advance(ProtocolState::Searched);
        Ok(entries)
    }

    async fn rebind(&mut self, dn: &str, password: &str) -> Result<()> {
        execute_with_timeout(
            self.config.operation_timeout(),
            self.session.simple_bind(dn, password),
        )
        .await
        .map_err(|err| {
            error!(dn = %dn, "identity rebind failed: {err}");
            err
        })?;
        self.advance(ProtocolState::Verified);
        Ok(())
    }

    async fn abandon(self, err: Error) -> Error {
        debug!(state = %self.state, "directory exchange abandoned: {err}");
        self.finish().await;
        err
    }

    async fn finish(mut self) {
        if let Err(err) =
            execute_with_timeout(self.config.operation_timeout(), self.session.unbind()).await
        {
            warn!("failed to release directory connection: {err}");
        }
        self.advance(ProtocolState::Done);
    }
}

async fn execute_with_timeout<F, T>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout("directory operation timed out".to_string()))?
}

fn log_failure(err: Error) -> Error {
    if err.should_log() {
        error!(code = err.error_code(), "directory operation failed: {err}");
    }
    err
}

/// LDAP transport backed by `ldap3`.
///
/// Endpoints are tried in configuration order; the first one that accepts the connection wins.
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
}

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }

    async fn connect_endpoint(&self, endpoint: &str) -> Result<Box<dyn DirectorySession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = timeout(
            self.config.connection_timeout(),
            LdapConnAsync::with_settings(settings, endpoint),
        )
        .await
        .map_err(|_| Error::Timeout(format!("connecting to {endpoint} timed out")))?
        .map_err(|err| Error::ConnectionFailed(err.to_string()))?;
        ldap3::drive!(conn);

        Ok(Box::new(LdapSession { inner: ldap }))
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        let mut failures = Vec::new();

        for endpoint in self.config.endpoints() {
            debug!(endpoint = %endpoint, "connecting to directory endpoint");
            match self.connect_endpoint(endpoint).await {
                Ok(session) => {
                    info!(endpoint = %endpoint, "connected to directory endpoint");
                    return Ok(session);
                }
                Err(err @ Error::ConfigError(_)) => return Err(err),
                Err(err) => {
                    warn!(endpoint = %endpoint, "directory endpoint unavailable: {err}");
                    failures.push(format!("{endpoint}: {err}"));
                }
            }
        }

        Err(Error::ConnectionFailed(format!(
            "no directory endpoint reachable ({})",
            failures.join("; ")
        )))
    }
}

/// Operation timeouts are applied by the exchange driving the session.
struct LdapSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;
        ensure_ldap_success(&result)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Identity>> {
        let result = self
            .inner
            .search(base_dn, ldap_scope(scope), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?;
        ensure_ldap_success(&result.1)?;

        Ok(result
            .0
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_identity)
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn entry_to_identity(entry: SearchEntry) -> Identity {
    if !entry.bin_attrs.is_empty() {
        debug!(dn = %entry.dn, count = entry.bin_attrs.len(), "ignoring binary attributes");
    }
    let mut attributes = entry.attrs.into_iter().collect::<Vec<_>>();
    attributes.sort_by(|left, right| left.0.cmp(&right.0));
    Identity::new(entry.dn, AttributeSet::decode(attributes))
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: LdapError) -> Error {
    match &err {
        LdapError::LdapResult { result } => map_result_code(result.rc, &result.text),
        LdapError::Io { .. } => Error::ConnectionFailed(err.to_string()),
        _ => Error::Protocol {
            code: RC_OTHER,
            message: err.to_string(),
        },
    }
}

fn ensure_ldap_success(result: &ldap3::LdapResult) -> Result<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(map_result_code(result.rc, &result.text))
    }
}

fn map_result_code(rc: u32, text: &str) -> Error {
    match rc {
        RC_INVALID_CREDENTIALS => Error::InvalidCredentials,
        RC_INSUFFICIENT_ACCESS_RIGHTS => Error::InsufficientAccessRights(text.to_string()),
        RC_NO_SUCH_OBJECT => Error::NoSuchObject(text.to_string()),
        RC_INVALID_DN_SYNTAX => Error::InvalidDnSyntax(text.to_string()),
        code => Error::Protocol {
            code,
            message: text.to_string(),
        },
    }
}
