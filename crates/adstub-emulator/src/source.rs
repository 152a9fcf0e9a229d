//! Where the emulator's users and groups come from.

use crate::records::{flatten_groups, FlatGroup, GroupRecord, UserRecord};
use crate::Result;
use adstub_core::Error;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable holding the path of a JSON data file.
pub const USERS_CONFIG_FILE_VAR: &str = "USERS_CONFIG_FILE";
/// Environment variable holding the JSON data inline.
pub const LDAP_USERS_VAR: &str = "LDAP_USERS";

/// Users and groups held by the emulator.
#[derive(Debug, Clone, Default)]
pub struct DirectoryData {
    /// Configured users.
    pub users: Vec<UserRecord>,
    /// Configured group tree.
    pub groups: Vec<GroupRecord>,
}

impl DirectoryData {
    /// Creates directory data from records.
    #[must_use]
    pub fn new(users: Vec<UserRecord>, groups: Vec<GroupRecord>) -> Self {
        Self { users, groups }
    }

    /// Parses a `{"users": [...], "groups": [...]}` document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for malformed JSON, when `users` or `groups` is not an
    /// array, or when a record does not match its schema.
    pub fn from_json(text: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(text.trim())?;
        Self::from_value(&payload)
    }

    /// Builds directory data from an already parsed document.
    ///
    /// # Errors
    ///
    /// See [`DirectoryData::from_json`].
    pub fn from_value(payload: &Value) -> Result<Self> {
        let Some(Value::Array(users)) = payload.get("users") else {
            return Err(Error::ConfigError(format!(
                "User configuration is not array. Received: {payload}"
            )));
        };
        let Some(Value::Array(groups)) = payload.get("groups") else {
            return Err(Error::ConfigError(format!(
                "Group configuration is not array. Received: {payload}"
            )));
        };

        let users = users
            .iter()
            .map(|user| serde_json::from_value::<UserRecord>(user.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let groups = groups
            .iter()
            .map(|group| serde_json::from_value::<GroupRecord>(group.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { users, groups })
    }

    /// Groups flattened with their direct parents.
    #[must_use]
    pub fn flat_groups(&self) -> Vec<FlatGroup> {
        flatten_groups(&self.groups)
    }

    /// Returns true if neither users nor groups are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

/// Supplies the emulator's directory data. Loaded once, when the emulator is built.
#[cfg_attr(test, mockall::automock)]
pub trait DirectorySource: Send + Sync {
    /// Loads users and groups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the data cannot be read or has the wrong shape.
    fn load(&self) -> Result<DirectoryData>;
}

/// In-memory directory data.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    data: DirectoryData,
}

impl StaticSource {
    /// Wraps already built directory data.
    #[must_use]
    pub fn new(data: DirectoryData) -> Self {
        Self { data }
    }
}

impl DirectorySource for StaticSource {
    fn load(&self) -> Result<DirectoryData> {
        Ok(self.data.clone())
    }
}

/// Directory data given as JSON text.
#[derive(Debug, Clone)]
pub struct JsonSource {
    text: String,
}

impl JsonSource {
    /// Creates a source over JSON text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl DirectorySource for JsonSource {
    fn load(&self) -> Result<DirectoryData> {
        DirectoryData::from_json(&self.text)
    }
}

/// Directory data read from a JSON file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source over a file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DirectorySource for FileSource {
    fn load(&self) -> Result<DirectoryData> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory data file {}: {err}",
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), "loaded directory data file");
        DirectoryData::from_json(&text)
    }
}

/// Directory data located through environment variables.
///
/// The file variable wins over the inline JSON variable. Unset or blank variables mean no data.
#[derive(Debug, Clone)]
pub struct EnvSource {
    file_var: String,
    json_var: String,
}

impl EnvSource {
    /// Reads `USERS_CONFIG_FILE`, then `LDAP_USERS`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_variables(USERS_CONFIG_FILE_VAR, LDAP_USERS_VAR)
    }

    /// Reads custom variable names.
    #[must_use]
    pub fn with_variables(file_var: impl Into<String>, json_var: impl Into<String>) -> Self {
        Self {
            file_var: file_var.into(),
            json_var: json_var.into(),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectorySource for EnvSource {
    fn load(&self) -> Result<DirectoryData> {
        if let Some(path) = non_blank_var(&self.file_var) {
            debug!(variable = %self.file_var, "loading directory data from file");
            return FileSource::new(path).load();
        }
        if let Some(json) = non_blank_var(&self.json_var) {
            debug!(variable = %self.json_var, "loading directory data from inline JSON");
            return DirectoryData::from_json(&json);
        }

        debug!("no directory data configured");
        Ok(DirectoryData::default())
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
