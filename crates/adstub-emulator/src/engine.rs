//! In-memory directory that answers binds and searches.
//!
//! The users and groups are loaded once from a [`DirectorySource`] when the emulator is built.
//! A load failure is kept and returned by every later operation that needs the data; binding
//! as the service account keeps working without it.

use crate::config::EmulatorConfig;
use crate::filter::DirectoryQuery;
use crate::records::{FlatGroup, UserRecord};
use crate::source::{DirectoryData, DirectorySource};
use crate::Result;
use adstub_core::{
    DistinguishedName, Error, Identity, RelativeDistinguishedName, SearchRequest, SearchScope,
};
use tracing::{debug, error, info};

struct Snapshot {
    data: DirectoryData,
    groups: Vec<FlatGroup>,
}

/// Emulated Active Directory server.
pub struct DirectoryEmulator {
    config: EmulatorConfig,
    snapshot: std::result::Result<Snapshot, Error>,
}

impl DirectoryEmulator {
    /// Builds the emulator, loading the directory data once.
    #[must_use]
    pub fn new(config: EmulatorConfig, source: &dyn DirectorySource) -> Self {
        let snapshot = source.load().map(|data| {
            let groups = data.flat_groups();
            info!(
                users = data.users.len(),
                groups = groups.len(),
                "directory data loaded"
            );
            Snapshot { data, groups }
        });
        if let Err(err) = &snapshot {
            error!("failed to load directory data: {err}");
        }

        Self { config, snapshot }
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// The loaded users and groups.
    ///
    /// # Errors
    ///
    /// Returns the error recorded when loading failed.
    pub fn snapshot(&self) -> Result<&DirectoryData> {
        self.loaded().map(|snapshot| &snapshot.data)
    }

    /// Checks a simple bind and returns the bound DN.
    ///
    /// The service DN is compared with case-insensitive type tags. Any other DN under the
    /// suffix must equal the derived DN of a configured user whose password matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDnSyntax`] when `dn` is not a DN, [`Error::InvalidCredentials`]
    /// when no account matches, and the load error for user binds without directory data.
    pub fn bind(&self, dn: &str, password: &str) -> Result<DistinguishedName> {
        let requested = DistinguishedName::parse(dn).map_err(|err| {
            debug!(dn, "bind with malformed DN: {err}");
            Error::from(err)
        })?;

        if password.is_empty() {
            info!(dn = %requested, "unauthenticated bind rejected");
            return Err(Error::InvalidCredentials);
        }

        if requested == *self.config.service_dn() {
            if self.config.credentials().password_matches(password) {
                info!(dn = %requested, "service bind accepted");
                return Ok(requested);
            }
            info!(dn = %requested, "service bind rejected");
            return Err(Error::InvalidCredentials);
        }

        if requested.is_descendant_of(self.config.suffix()) {
            let snapshot = self.loaded()?;
            let accepted = self
                .find_user(snapshot, &requested)
                .is_some_and(|user| user.password_matches(password));
            if accepted {
                info!(dn = %requested, "user bind accepted");
                return Ok(requested);
            }
        }

        info!(dn = %requested, "bind rejected");
        Err(Error::InvalidCredentials)
    }

    /// Runs a search on behalf of `bound`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientAccessRights`] unless `bound` is the service DN or a known
    /// user, the load error when the directory data is unusable, [`Error::NoSuchObject`] for a
    /// base outside the suffix or an unknown group, and [`Error::InvalidDnSyntax`] for a
    /// malformed base.
    pub fn search(
        &self,
        bound: Option<&DistinguishedName>,
        request: &SearchRequest,
    ) -> Result<Vec<Identity>> {
        self.authorize(bound)?;
        let snapshot = self.loaded()?;

        let base = match request.base() {
            Some(base) => DistinguishedName::parse(base)?,
            None => self.config.suffix().clone(),
        };
        if !base.is_descendant_of(self.config.suffix()) {
            debug!(base = %base, "search base outside the suffix");
            return Err(Error::NoSuchObject(base.to_string()));
        }

        let filter = request.resolved_filter();
        let entries = match DirectoryQuery::from_filter(&filter) {
            DirectoryQuery::Group { name } => vec![self.group_entry(snapshot, &name)?],
            DirectoryQuery::Identity { pattern, .. } => snapshot
                .data
                .users
                .iter()
                .filter(|user| pattern.is_match(&user.username))
                .map(|user| self.user_entry(user))
                .collect(),
            DirectoryQuery::Unresolved => {
                debug!(filter = %filter, "filter names no identity or group");
                Vec::new()
            }
        };

        let entries = entries
            .into_iter()
            .filter(|entry| in_scope(&entry.object_name, &base, request.scope()))
            .map(|mut entry| {
                if !request.attributes().is_empty() {
                    entry.attributes = entry.attributes.project(request.attributes());
                }
                entry
            })
            .collect::<Vec<_>>();

        debug!(filter = %filter, found = entries.len(), "search answered");
        Ok(entries)
    }

    fn loaded(&self) -> Result<&Snapshot> {
        self.snapshot.as_ref().map_err(Clone::clone)
    }

    fn authorize(&self, bound: Option<&DistinguishedName>) -> Result<()> {
        let Some(bound) = bound else {
            debug!("anonymous search rejected");
            return Err(Error::InsufficientAccessRights(
                "anonymous search is not permitted".to_string(),
            ));
        };

        if bound == self.config.service_dn() {
            return Ok(());
        }
        if self.find_user(self.loaded()?, bound).is_some() {
            return Ok(());
        }

        debug!(dn = %bound, "search rejected for unknown identity");
        Err(Error::InsufficientAccessRights(bound.to_string()))
    }

    fn find_user<'a>(
        &self,
        snapshot: &'a Snapshot,
        dn: &DistinguishedName,
    ) -> Option<&'a UserRecord> {
        snapshot.data.users.iter().find(|user| {
            let user_dn = user.distinguished_name(self.config.users_base_dn());
            match DistinguishedName::parse(&user_dn) {
                Ok(user_dn) => user_dn == *dn,
                Err(err) => {
                    debug!(dn = %user_dn, "skipping user with malformed DN: {err}");
                    false
                }
            }
        })
    }

    fn user_entry(&self, user: &UserRecord) -> Identity {
        let dn = user.distinguished_name(self.config.users_base_dn());
        let attributes = user.to_attributes(&dn);
        Identity::new(dn, attributes)
    }

    fn group_entry(&self, snapshot: &Snapshot, name: &str) -> Result<Identity> {
        let group = snapshot
            .groups
            .iter()
            .find(|group| group.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                debug!(group = name, "group not found");
                Error::NoSuchObject(format!("group {name}"))
            })?;

        let dn = self
            .config
            .suffix()
            .clone()
            .with_prefix(RelativeDistinguishedName::new("CN", group.name.clone()))
            .to_string();
        let attributes = group.to_attributes(&dn);
        Ok(Identity::new(dn, attributes))
    }
}

fn in_scope(dn: &str, base: &DistinguishedName, scope: SearchScope) -> bool {
    let Ok(dn) = DistinguishedName::parse(dn) else {
        return false;
    };

    match scope {
        SearchScope::Base => dn == *base,
        SearchScope::OneLevel => {
            dn.rdns().len() == base.rdns().len() + 1 && dn.is_descendant_of(base)
        }
        SearchScope::Subtree => dn.is_descendant_of(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::GroupRecord;
    use crate::source::{MockDirectorySource, StaticSource};
    use adstub_core::MEMBER_OF;

    const SERVICE_DN: &str = "CN=Administrator,CN=Users,DC=example,DC=com";
    const JOHN_DN: &str = "CN=John Snow,CN=Users,DC=example,DC=com";

    fn config() -> EmulatorConfig {
        EmulatorConfig::new(SERVICE_DN, "ldap-password", "DC=example,DC=com")
            .unwrap()
            .with_users_base_dn("CN=Users,DC=example,DC=com")
            .unwrap()
    }

    fn data() -> DirectoryData {
        DirectoryData::new(
            vec![
                UserRecord::new("user", "password", "John", "Snow")
                    .with_mail("joe@email")
                    .with_user_principal_name("user@example.com")
                    .with_member_of(vec![
                        "CN=Admins,CN=Groups,DC=example,DC=com".to_string(),
                        "CN=Audit,CN=Groups,DC=example,DC=com".to_string(),
                    ]),
                UserRecord::new("xy", "xy", "xy", "xy"),
            ],
            vec![
                GroupRecord::new("Admins").with_child(GroupRecord::new("Local-Admins")),
                GroupRecord::new("Audit"),
            ],
        )
    }

    fn emulator() -> DirectoryEmulator {
        DirectoryEmulator::new(config(), &StaticSource::new(data()))
    }

    fn service() -> DistinguishedName {
        DistinguishedName::parse(SERVICE_DN).unwrap()
    }

    fn search(emulator: &DirectoryEmulator, filter: &str) -> Result<Vec<Identity>> {
        emulator.search(Some(&service()), &SearchRequest::new(filter))
    }

    #[test]
    fn service_bind_checks_password() {
        let emulator = emulator();
        assert_eq!(emulator.bind(SERVICE_DN, "ldap-password").unwrap(), service());
        assert!(emulator
            .bind("cn=Administrator, cn=Users, dc=example, dc=com", "ldap-password")
            .is_ok());
        assert_eq!(
            emulator.bind(SERVICE_DN, "wrong"),
            Err(Error::InvalidCredentials)
        );
        assert_eq!(emulator.bind(SERVICE_DN, ""), Err(Error::InvalidCredentials));
    }

    #[test]
    fn user_bind_matches_preset_dn_with_special_characters() {
        let mut user = UserRecord::new("ab", "secret", "a", "b");
        user.distinguished_name = Some("CN=a=b,CN=Users,DC=example,DC=com".to_string());
        let emulator = DirectoryEmulator::new(
            config(),
            &StaticSource::new(DirectoryData::new(vec![user], Vec::new())),
        );

        assert!(emulator
            .bind("CN=a=b,CN=Users,DC=example,DC=com", "secret")
            .is_ok());
        assert!(emulator
            .bind("cn=a\\=b,cn=Users,dc=example,dc=com", "secret")
            .is_ok());
        assert_eq!(
            emulator.bind("CN=A=B,CN=Users,DC=example,DC=com", "secret"),
            Err(Error::InvalidCredentials)
        );
    }

    #[test]
    fn bind_rejects_malformed_dn() {
        let err = emulator().bind("xx", "xx").unwrap_err();
        assert!(matches!(err, Error::InvalidDnSyntax(_)));
        assert!(err.to_string().starts_with("Invalid Dn Syntax"));
    }

    #[test]
    fn user_bind_uses_derived_dn() {
        let emulator = emulator();
        assert!(emulator.bind(JOHN_DN, "password").is_ok());
        assert!(emulator
            .bind("cn=John Snow,cn=Users,dc=example,dc=com", "password")
            .is_ok());
        assert_eq!(
            emulator.bind(JOHN_DN, "xx"),
            Err(Error::InvalidCredentials)
        );
        assert_eq!(
            emulator.bind("CN=wrong User, DC=example, DC=com", "password"),
            Err(Error::InvalidCredentials)
        );
        assert_eq!(
            emulator.bind("CN=John Snow,DC=elsewhere,DC=org", "password"),
            Err(Error::InvalidCredentials)
        );
    }

    #[test]
    fn search_requires_known_identity() {
        let emulator = emulator();
        let request = SearchRequest::new("(sAMAccountName=user)");

        assert!(matches!(
            emulator.search(None, &request),
            Err(Error::InsufficientAccessRights(_))
        ));
        let stranger = DistinguishedName::parse("CN=Stranger,DC=example,DC=com").unwrap();
        assert!(matches!(
            emulator.search(Some(&stranger), &request),
            Err(Error::InsufficientAccessRights(_))
        ));

        let john = DistinguishedName::parse(JOHN_DN).unwrap();
        assert_eq!(emulator.search(Some(&john), &request).unwrap().len(), 1);
    }

    #[test]
    fn identity_search_serves_user_attributes() {
        let entries = search(&emulator(), "(&(objectCategory=person)(sAMAccountName=user))")
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].object_name, JOHN_DN);
        assert_eq!(entries[0].bind_dn(), Some(JOHN_DN));
        assert_eq!(entries[0].attributes.value_of(MEMBER_OF).len(), 2);
        assert_eq!(entries[0].attributes.first("mail"), Some("joe@email"));
    }

    #[test]
    fn identity_search_with_wildcards() {
        let emulator = emulator();
        assert_eq!(search(&emulator, "(sAMAccountName=*)").unwrap().len(), 2);
        assert_eq!(search(&emulator, "(sAMAccountName=us*)").unwrap().len(), 1);
        assert_eq!(search(&emulator, "(sAMAccountName=*y)").unwrap().len(), 1);
        assert!(search(&emulator, "(sAMAccountName=nobody)").unwrap().is_empty());
        assert_eq!(
            search(&emulator, "(userPrincipalName=user@example.com)")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn unresolved_filters_return_nothing() {
        let emulator = emulator();
        assert!(search(&emulator, "(mail=*)").unwrap().is_empty());
        assert!(search(&emulator, "(&(objectcategory=group)(xx))").unwrap().is_empty());
    }

    #[test]
    fn group_search_resolves_nested_groups() {
        let emulator = emulator();
        let request = SearchRequest::new("(&(objectcategory=group)(CN=local-admins))")
            .with_attributes([MEMBER_OF, "name"]);
        let entries = emulator.search(Some(&service()), &request).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].attributes.value_of("name"),
            vec!["CN=Local-Admins".to_string()]
        );
        assert_eq!(
            entries[0].attributes.value_of(MEMBER_OF),
            vec!["CN=Admins".to_string()]
        );
        assert_eq!(entries[0].object_name, "CN=Local-Admins,DC=example,DC=com");
    }

    #[test]
    fn unknown_group_is_no_such_object() {
        let result = search(&emulator(), "(&(objectcategory=group)(CN=XX))");
        assert!(matches!(result, Err(Error::NoSuchObject(_))));
    }

    #[test]
    fn base_outside_suffix_is_no_such_object() {
        let request =
            SearchRequest::new("(sAMAccountName=user)").with_base("DC=elsewhere,DC=org");
        let result = emulator().search(Some(&service()), &request);
        assert!(matches!(result, Err(Error::NoSuchObject(_))));
    }

    #[test]
    fn scope_limits_entries() {
        let emulator = emulator();
        let base_only = SearchRequest::new("(sAMAccountName=user)")
            .with_scope(SearchScope::Base)
            .with_base(JOHN_DN);
        assert_eq!(
            emulator.search(Some(&service()), &base_only).unwrap().len(),
            1
        );

        let one_level = SearchRequest::new("(sAMAccountName=user)")
            .with_scope(SearchScope::OneLevel)
            .with_base("DC=example,DC=com");
        assert!(emulator
            .search(Some(&service()), &one_level)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn load_error_surfaces_on_use() {
        let mut source = MockDirectorySource::new();
        source.expect_load().times(1).returning(|| {
            Err(Error::ConfigError(
                "User configuration is not array. Received: {}".to_string(),
            ))
        });

        let emulator = DirectoryEmulator::new(config(), &source);
        assert!(emulator.bind(SERVICE_DN, "ldap-password").is_ok());
        assert!(matches!(
            search(&emulator, "(mail=*)"),
            Err(Error::ConfigError(_))
        ));
        assert!(matches!(
            emulator.bind(JOHN_DN, "password"),
            Err(Error::ConfigError(_))
        ));
        assert!(emulator.snapshot().is_err());
    }

    #[test]
    fn data_is_loaded_once() {
        let mut source = MockDirectorySource::new();
        source
            .expect_load()
            .times(1)
            .returning(|| Ok(DirectoryData::default()));

        let emulator = DirectoryEmulator::new(config(), &source);
        for _ in 0..3 {
            assert!(search(&emulator, "(sAMAccountName=*)").unwrap().is_empty());
        }
        assert!(emulator.snapshot().unwrap().is_empty());
    }
}
