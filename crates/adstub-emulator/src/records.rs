//! User and group records served by the emulator.

use adstub_core::{
    build_user_dn, AttributeSet, DistinguishedName, DISTINGUISHED_NAME, MEMBER_OF,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Directory user as configured in the JSON data.
///
/// Both directory-style field names (`givenName`, `sn`, `mail`, `telephoneNumber`) and the
/// account-style aliases (`firstName`, `lastName`, `email`, `phone`) are accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Login name, exposed as `sAMAccountName`.
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    password: SecretString,
    /// Given name.
    #[serde(alias = "firstName")]
    pub given_name: String,
    /// Surname.
    #[serde(alias = "lastName")]
    pub sn: String,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Mail address.
    #[serde(default, alias = "email")]
    pub mail: Option<String>,
    /// Telephone number.
    #[serde(default, alias = "phone")]
    pub telephone_number: Option<String>,
    /// User principal name.
    #[serde(default)]
    pub user_principal_name: Option<String>,
    /// Raw group membership DNs, served verbatim.
    #[serde(default)]
    pub member_of: Vec<String>,
    /// Pre-set DN; derived from the names and the users base otherwise.
    #[serde(default)]
    pub distinguished_name: Option<String>,
}

impl UserRecord {
    /// Creates a user with the mandatory fields.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        given_name: impl Into<String>,
        sn: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            given_name: given_name.into(),
            sn: sn.into(),
            display_name: None,
            mail: None,
            telephone_number: None,
            user_principal_name: None,
            member_of: Vec::new(),
            distinguished_name: None,
        }
    }

    /// Sets the mail address.
    #[must_use]
    pub fn with_mail(mut self, mail: impl Into<String>) -> Self {
        self.mail = Some(mail.into());
        self
    }

    /// Sets the user principal name.
    #[must_use]
    pub fn with_user_principal_name(mut self, upn: impl Into<String>) -> Self {
        self.user_principal_name = Some(upn.into());
        self
    }

    /// Sets the group membership DNs.
    #[must_use]
    pub fn with_member_of(mut self, groups: Vec<String>) -> Self {
        self.member_of = groups;
        self
    }

    /// Returns true if `candidate` is this user's password.
    #[must_use]
    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password.expose_secret() == candidate
    }

    /// The user's DN: the pre-set one, else `CN=<givenName> <sn>,<users base>`.
    #[must_use]
    pub fn distinguished_name(&self, users_base: &DistinguishedName) -> String {
        self.distinguished_name.clone().unwrap_or_else(|| {
            build_user_dn(&self.given_name, &self.sn, users_base).to_string()
        })
    }

    /// Attributes served for this user.
    #[must_use]
    pub fn to_attributes(&self, distinguished_name: &str) -> AttributeSet {
        let optional = |value: &Option<String>| value.iter().cloned().collect::<Vec<_>>();

        AttributeSet::new()
            .with(DISTINGUISHED_NAME, vec![distinguished_name.to_string()])
            .with("sAMAccountName", vec![self.username.clone()])
            .with("givenName", vec![self.given_name.clone()])
            .with("sn", vec![self.sn.clone()])
            .with("displayName", optional(&self.display_name))
            .with("mail", optional(&self.mail))
            .with("telephoneNumber", optional(&self.telephone_number))
            .with("userPrincipalName", optional(&self.user_principal_name))
            .with(MEMBER_OF, self.member_of.clone())
    }
}

impl Clone for UserRecord {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_string()),
            given_name: self.given_name.clone(),
            sn: self.sn.clone(),
            display_name: self.display_name.clone(),
            mail: self.mail.clone(),
            telephone_number: self.telephone_number.clone(),
            user_principal_name: self.user_principal_name.clone(),
            member_of: self.member_of.clone(),
            distinguished_name: self.distinguished_name.clone(),
        }
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("given_name", &self.given_name)
            .field("sn", &self.sn)
            .field("member_of", &self.member_of)
            .field("distinguished_name", &self.distinguished_name)
            .finish_non_exhaustive()
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

/// Group in the configured hierarchy. Nesting is expressed by `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group short name.
    pub name: String,
    /// Nested groups, members of this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GroupRecord>,
}

impl GroupRecord {
    /// Creates a group without children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Adds a nested group.
    #[must_use]
    pub fn with_child(mut self, child: GroupRecord) -> Self {
        self.children.push(child);
        self
    }

    fn flatten_into(&self, parent: Option<&str>, flat: &mut Vec<FlatGroup>) {
        flat.push(FlatGroup {
            name: self.name.clone(),
            member_of: parent.map(str::to_owned),
        });
        for child in &self.children {
            child.flatten_into(Some(&self.name), flat);
        }
    }
}

/// Group with its direct parent, as produced by [`flatten_groups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatGroup {
    /// Group short name.
    pub name: String,
    /// Short name of the enclosing group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_of: Option<String>,
}

impl FlatGroup {
    /// Attributes served for this group.
    #[must_use]
    pub fn to_attributes(&self, distinguished_name: &str) -> AttributeSet {
        AttributeSet::new()
            .with(DISTINGUISHED_NAME, vec![distinguished_name.to_string()])
            .with("name", vec![format!("CN={}", self.name)])
            .with(
                MEMBER_OF,
                self.member_of
                    .iter()
                    .map(|parent| format!("CN={parent}"))
                    .collect(),
            )
    }
}

/// Flattens the group tree depth-first, parents before their children.
#[must_use]
pub fn flatten_groups(groups: &[GroupRecord]) -> Vec<FlatGroup> {
    let mut flat = Vec::new();
    for group in groups {
        group.flatten_into(None, &mut flat);
    }
    flat
}
