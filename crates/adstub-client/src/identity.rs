//! Authenticated identity returned by a successful login.

use adstub_core::{extract_group_names, AttributeSet, Identity, SearchRequest, MEMBER_OF};
use serde::Serialize;
use serde_json::Value;

/// Identity whose password was verified by a rebind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    /// DN the password was verified against.
    pub distinguished_name: String,
    /// Requested attributes, in request order.
    pub attributes: AttributeSet,
    /// Group short names resolved from `memberOf`; only filled when `memberOf` was requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl AuthenticatedIdentity {
    /// Creates a new identity with no resolved groups.
    #[must_use]
    pub fn new(distinguished_name: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            attributes,
            groups: Vec::new(),
        }
    }

    /// Sets the resolved group names.
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub(crate) fn from_entry(
        distinguished_name: &str,
        entry: &Identity,
        request: &SearchRequest,
    ) -> Self {
        let attributes = if request.attributes().is_empty() {
            entry.attributes.clone()
        } else {
            entry.attributes.project(request.attributes())
        };
        let groups = if request.requests(MEMBER_OF) {
            extract_group_names(&entry.attributes.value_of(MEMBER_OF))
        } else {
            Vec::new()
        };

        Self::new(distinguished_name, attributes).with_groups(groups)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes.first(attribute)
    }

    /// Display name: `displayName` if returned, else `givenName sn`.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(display) = self.first("displayName") {
            return Some(display.to_string());
        }
        match (self.first("givenName"), self.first("sn")) {
            (Some(given), Some(sn)) => Some(format!("{given} {sn}")),
            (Some(given), None) => Some(given.to_string()),
            (None, Some(sn)) => Some(sn.to_string()),
            (None, None) => None,
        }
    }

    /// Returns true if the identity is a member of the given group (case-insensitive).
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|name| name.eq_ignore_ascii_case(group))
    }

    /// Flat record: the requested attributes plus `distinguishedName` and `groups`.
    #[must_use]
    pub fn to_record(&self) -> Value {
        let mut record = self.attributes.to_json();
        if let Value::Object(map) = &mut record {
            map.insert(
                "distinguishedName".to_string(),
                Value::from(vec![self.distinguished_name.clone()]),
            );
            if !self.groups.is_empty() {
                map.insert("groups".to_string(), Value::from(self.groups.clone()));
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JOHN_DN: &str = "CN=John Snow,CN=Users,DC=example,DC=com";

    fn entry() -> Identity {
        Identity::new(
            JOHN_DN,
            AttributeSet::new()
                .with("givenName", vec!["John".to_string()])
                .with("sn", vec!["Snow".to_string()])
                .with(
                    MEMBER_OF,
                    vec![
                        "CN=Admins,CN=Groups,DC=example,DC=com".to_string(),
                        "not a dn".to_string(),
                    ],
                ),
        )
    }

    #[test]
    fn groups_resolved_only_when_requested() {
        let with_groups = AuthenticatedIdentity::from_entry(
            JOHN_DN,
            &entry(),
            &SearchRequest::new("(sAMAccountName=john)").with_attributes(["sn", MEMBER_OF]),
        );
        assert_eq!(with_groups.groups, vec!["Admins".to_string()]);
        assert!(with_groups.in_group("admins"));
        assert!(with_groups.attributes.contains(MEMBER_OF));

        let without = AuthenticatedIdentity::from_entry(
            JOHN_DN,
            &entry(),
            &SearchRequest::new("(sAMAccountName=john)").with_attributes(["sn"]),
        );
        assert!(without.groups.is_empty());
        assert!(!without.attributes.contains("givenName"));
    }

    #[test]
    fn display_name_falls_back_to_given_and_surname() {
        let identity = AuthenticatedIdentity::new(JOHN_DN, entry().attributes);
        assert_eq!(identity.display_name().as_deref(), Some("John Snow"));
    }

    #[test]
    fn record_includes_distinguished_name() {
        let identity = AuthenticatedIdentity::from_entry(
            JOHN_DN,
            &entry(),
            &SearchRequest::new("(sAMAccountName=john)").with_attributes(["sn", MEMBER_OF]),
        );
        let record = identity.to_record();
        assert_eq!(record["distinguishedName"], json!([JOHN_DN]));
        assert_eq!(record["sn"], json!(["Snow"]));
        assert_eq!(record["groups"], json!(["Admins"]));
    }

    #[test]
    fn record_keeps_requested_attribute_order() {
        let identity = AuthenticatedIdentity::from_entry(
            JOHN_DN,
            &entry(),
            &SearchRequest::new("(sAMAccountName=john)").with_attributes(["sn", "givenName"]),
        );
        let keys = identity
            .to_record()
            .as_object()
            .map(|map| map.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(keys, vec!["sn", "givenName", "distinguishedName"]);
    }
}
