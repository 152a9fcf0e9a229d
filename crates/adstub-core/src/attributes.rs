//! Attribute sets returned by directory searches.
//!
//! The wire carries every attribute as a type plus a list of values. [`AttributeSet`] keeps
//! those pairs in order and never stores an attribute without values, so absence always means
//! "not returned". Values stay multi-valued throughout the protocol; [`collapse`] is offered for
//! callers that prefer scalars for single values.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

/// Attribute holding the distinguished name of an entry.
pub const DISTINGUISHED_NAME: &str = "distinguishedName";

/// Attribute holding the raw group-membership DNs of an entry.
pub const MEMBER_OF: &str = "memberOf";

/// Single attribute in its wire form (`{"type": ..., "vals": [...]}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name (case-sensitive).
    #[serde(rename = "type")]
    pub name: String,
    /// Attribute values in server order.
    #[serde(rename = "vals")]
    pub values: Vec<String>,
}

/// Shaped attribute value produced by [`collapse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Exactly one value.
    Single(String),
    /// Zero or several values.
    Multiple(Vec<String>),
}

/// Collapses a single value to a scalar and keeps any other count as a list.
#[must_use]
pub fn collapse(values: &[String]) -> AttributeValue {
    match values {
        [single] => AttributeValue::Single(single.clone()),
        _ => AttributeValue::Multiple(values.to_vec()),
    }
}

/// Ordered mapping from attribute name to a non-empty list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    entries: Vec<Attribute>,
}

impl AttributeSet {
    /// Creates an empty attribute set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds a set from raw name/values pairs.
    ///
    /// Entries with an empty name or no values are dropped; repeated names are merged.
    pub fn decode<I, K>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        let mut set = Self::new();
        for (name, values) in raw {
            let name = name.into();
            if name.is_empty() || values.is_empty() {
                debug!(attribute = %name, "skipping malformed attribute");
                continue;
            }
            for value in values {
                set.push_value(name.clone(), value);
            }
        }
        set
    }

    /// Builds a set from attributes in their JSON wire form, ignoring entries that do not parse.
    #[must_use]
    pub fn decode_json(raw: &[Value]) -> Self {
        Self::decode(raw.iter().filter_map(|value| {
            match serde_json::from_value::<Attribute>(value.clone()) {
                Ok(attribute) => Some((attribute.name, attribute.values)),
                Err(err) => {
                    debug!("skipping undecodable attribute {value}: {err}");
                    None
                }
            }
        }))
    }

    /// Sets the values of an attribute, replacing earlier values. Empty lists are ignored.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        if values.is_empty() {
            return;
        }

        let name = name.into();
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.values = values,
            None => self.entries.push(Attribute { name, values }),
        }
    }

    /// Appends one value to an attribute, creating it when missing.
    pub fn push_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.values.push(value),
            None => self.entries.push(Attribute {
                name,
                values: vec![value],
            }),
        }
    }

    /// Builder-style variant of [`AttributeSet::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.insert(name, values);
        self
    }

    /// Returns the values of the attribute if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns the values of the attribute, or an empty list when it was not returned.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Vec<String> {
        self.get(name).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Returns true if the attribute was returned.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over the attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.entries.iter()
    }

    /// Iterates over the attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Number of attributes in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no attribute is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only the requested attributes, in request order. Absent names are omitted.
    #[must_use]
    pub fn project<S: AsRef<str>>(&self, requested: &[S]) -> AttributeSet {
        let mut projected = AttributeSet::new();
        for name in requested {
            let name = name.as_ref();
            if projected.contains(name) {
                continue;
            }
            if let Some(values) = self.get(name) {
                projected.insert(name, values.to_vec());
            }
        }
        projected
    }

    /// JSON object with every attribute as an array of values.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|entry| {
                    (
                        entry.name.clone(),
                        Value::from(entry.values.clone()),
                    )
                })
                .collect::<Map<_, _>>(),
        )
    }

    /// JSON object where single-valued attributes collapse to scalars.
    #[must_use]
    pub fn to_collapsed_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|entry| {
                    let value = match collapse(&entry.values) {
                        AttributeValue::Single(value) => Value::from(value),
                        AttributeValue::Multiple(values) => Value::from(values),
                    };
                    (entry.name.clone(), value)
                })
                .collect::<Map<_, _>>(),
        )
    }
}

impl Serialize for AttributeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.values)?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Self::decode(iter)
    }
}

/// Search result entry: the object name plus its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Object name (DN) reported for the entry.
    pub object_name: String,
    /// Returned attributes.
    pub attributes: AttributeSet,
}

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(object_name: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            object_name: object_name.into(),
            attributes,
        }
    }

    /// The DN to bind as: the `distinguishedName` attribute, else the object name.
    #[must_use]
    pub fn bind_dn(&self) -> Option<&str> {
        self.attributes
            .first(DISTINGUISHED_NAME)
            .filter(|dn| !dn.is_empty())
            .or_else(|| Some(self.object_name.as_str()).filter(|dn| !dn.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    fn sample() -> AttributeSet {
        AttributeSet::new()
            .with(
                DISTINGUISHED_NAME,
                strings(&["CN=John Snow,CN=Users,DC=example,DC=com"]),
            )
            .with(
                MEMBER_OF,
                strings(&[
                    "CN=Admins,CN=Groups,DC=example,DC=com",
                    "CN=Audit,CN=Groups,DC=example,DC=com",
                ]),
            )
            .with("givenName", strings(&["John"]))
            .with("sn", strings(&["Snow"]))
    }

    #[test]
    fn decode_drops_malformed_entries() {
        let set = AttributeSet::decode(vec![
            ("givenName", strings(&["John"])),
            ("", strings(&["orphan"])),
            ("mail", Vec::new()),
            ("givenName", strings(&["Johnny"])),
        ]);

        assert_eq!(set.len(), 1);
        assert_eq!(set.value_of("givenName"), strings(&["John", "Johnny"]));
        assert!(!set.contains("mail"));
    }

    #[test]
    fn decode_json_ignores_unparseable_values() {
        let raw = vec![
            json!({"type": "sn", "vals": ["Snow"]}),
            json!({"type": "broken"}),
            json!("not an attribute"),
        ];
        let set = AttributeSet::decode_json(&raw);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["sn"]);
    }

    #[test]
    fn value_of_absent_is_empty() {
        let set = sample();
        assert!(set.value_of("telephoneNumber").is_empty());
        assert_eq!(set.first("sn"), Some("Snow"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let set = sample();
        assert!(set.contains("givenName"));
        assert!(!set.contains("givenname"));
    }

    #[test]
    fn project_follows_request_order_and_omits_absent() {
        let set = sample();
        let projected = set.project(&["sn", "wrongAttribute", MEMBER_OF, "sn"]);

        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["sn", MEMBER_OF]);
        assert_eq!(
            projected.to_json(),
            json!({
                "sn": ["Snow"],
                "memberOf": [
                    "CN=Admins,CN=Groups,DC=example,DC=com",
                    "CN=Audit,CN=Groups,DC=example,DC=com"
                ]
            })
        );

        let none: AttributeSet = set.project(&["wrongAttribute"]);
        assert!(none.is_empty());
    }

    #[test]
    fn json_views_keep_request_order() {
        let set = sample().with("mail", strings(&["joe@email"]));
        let projected = set.project(&["sn", "mail", "givenName"]);

        let keys = |value: Value| match value {
            Value::Object(map) => map.keys().cloned().collect::<Vec<_>>(),
            other => panic!("expected an object, got {other}"),
        };
        assert_eq!(keys(projected.to_json()), vec!["sn", "mail", "givenName"]);
        assert_eq!(
            keys(projected.to_collapsed_json()),
            vec!["sn", "mail", "givenName"]
        );
        assert_eq!(
            serde_json::to_string(&projected.to_json()).unwrap(),
            r#"{"sn":["Snow"],"mail":["joe@email"],"givenName":["John"]}"#
        );
    }

    #[test]
    fn collapse_policy() {
        assert_eq!(
            collapse(&strings(&["John"])),
            AttributeValue::Single("John".to_string())
        );
        assert_eq!(
            collapse(&strings(&["a", "b"])),
            AttributeValue::Multiple(strings(&["a", "b"]))
        );

        let collapsed = sample().project(&["givenName", MEMBER_OF]).to_collapsed_json();
        assert_eq!(collapsed["givenName"], json!("John"));
        assert!(collapsed[MEMBER_OF].is_array());
    }

    #[test]
    fn serialize_preserves_arrays() {
        let set = AttributeSet::new().with("sn", strings(&["Snow"]));
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"sn":["Snow"]}"#);
    }

    #[test]
    fn identity_bind_dn_prefers_attribute() {
        let identity = Identity::new("CN=object,DC=example", sample());
        assert_eq!(
            identity.bind_dn(),
            Some("CN=John Snow,CN=Users,DC=example,DC=com")
        );

        let fallback = Identity::new("CN=object,DC=example", AttributeSet::new());
        assert_eq!(fallback.bind_dn(), Some("CN=object,DC=example"));

        let missing = Identity::new("", AttributeSet::new());
        assert_eq!(missing.bind_dn(), None);
    }
}
