//! Search requests and filter templates.
//!
//! A [`SearchRequest`] carries a filter template, a scope and the ordered list of attributes to
//! return. Templates may contain the `{0}` or `{username}` placeholders, which are replaced
//! verbatim with the caller-supplied identity before the filter is sent.

use serde::{Deserialize, Serialize};

/// Placeholders recognised in filter templates.
pub const USERNAME_PLACEHOLDERS: &[&str] = &["{0}", "{username}"];

/// Represents the search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    #[serde(rename = "one")]
    OneLevel,
    /// Entire subtree.
    #[default]
    #[serde(rename = "sub")]
    Subtree,
}

/// Declarative search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    filter: String,
    #[serde(default)]
    scope: SearchScope,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl SearchRequest {
    /// Creates a subtree search for the given filter template.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            scope: SearchScope::default(),
            attributes: Vec::new(),
            base: None,
            username: None,
        }
    }

    /// Sets the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Replaces the requested attribute list.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one requested attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Overrides the search base (defaults to the directory suffix).
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the identity substituted into the filter placeholders.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// The filter template as given.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// The search scope.
    #[must_use]
    pub const fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Requested attributes in order.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns true if `attribute` was requested.
    #[must_use]
    pub fn requests(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|requested| requested == attribute)
    }

    /// Explicit search base, if any.
    #[must_use]
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Identity substituted into the filter placeholders, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The filter with placeholders replaced by the username.
    ///
    /// Without a username the template is returned unchanged.
    #[must_use]
    pub fn resolved_filter(&self) -> String {
        match &self.username {
            Some(username) => USERNAME_PLACEHOLDERS
                .iter()
                .fold(self.filter.clone(), |filter, placeholder| {
                    filter.replace(placeholder, username)
                }),
            None => self.filter.clone(),
        }
    }
}

/// Escapes the characters that carry meaning inside a filter assertion value.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}
