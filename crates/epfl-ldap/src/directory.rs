//! Unit and person lookups.

use crate::{
    client::{DirectorySearcher, LdapEntry, LdapSession},
    dn::DistinguishedName,
    filter, Result,
};
use epfl_ldap_core::{DirectoryConfig, DirectoryScope, Error, ScopeSettings};
use tracing::{debug, warn};

const UNIT_OBJECT_CLASS: &str = "EPFLorganizationalUnit";

const ATTR_OBJECT_CLASS: &str = "objectClass";
const ATTR_CN: &str = "cn";
const ATTR_OU: &str = "ou";
const ATTR_UID: &str = "uid";
const ATTR_MAIL: &str = "mail";
const ATTR_UNIQUE_IDENTIFIER: &str = "uniqueIdentifier";

const ALL_ATTRIBUTES: &[&str] = &[];

/// Resolves units and people against one directory scope.
///
/// Every lookup opens its own anonymous session and releases it before
/// returning; nothing is cached between calls.
pub struct DirectoryClient {
    searcher: DirectorySearcher,
}

impl DirectoryClient {
    /// Creates a client for `scope` using values from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the scope's host or base DN is
    /// missing or invalid.
    pub fn new(config: &DirectoryConfig, scope: DirectoryScope) -> Result<Self> {
        Self::with_settings(config.settings(scope)?)
    }

    /// Creates a client for `scope` configured from the process environment.
    ///
    /// # Errors
    ///
    /// Same as [`DirectoryClient::new`].
    pub fn from_env(scope: DirectoryScope) -> Result<Self> {
        Self::new(&DirectoryConfig::from_env(), scope)
    }

    /// Creates a client from already resolved settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the base DN does not parse.
    pub fn with_settings(settings: ScopeSettings) -> Result<Self> {
        Ok(Self {
            searcher: DirectorySearcher::new(settings)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_connector(
        settings: ScopeSettings,
        connector: Box<dyn crate::client::LdapConnector>,
    ) -> Result<Self> {
        Ok(Self {
            searcher: DirectorySearcher::with_connector(settings, connector)?,
        })
    }

    /// Scope this client queries.
    #[must_use]
    pub fn scope(&self) -> DirectoryScope {
        self.searcher.settings().scope()
    }

    /// Returns true if `unit_id` names an organizational unit.
    ///
    /// Never fails: an unknown id, an entry of another class and an
    /// unreachable directory all answer `false`.
    pub async fn unit_exists(&self, unit_id: &str) -> bool {
        let lookup = self
            .first_entry(
                &filter::equality("uniqueidentifier", unit_id),
                ATTR_OBJECT_CLASS,
            )
            .await;
        match lookup {
            Ok(Some(entry)) => entry.has_value(ATTR_OBJECT_CLASS, UNIT_OBJECT_CLASS),
            Ok(None) => false,
            Err(err) => {
                debug!(unit_id, "unit lookup failed, answering false: {err}");
                false
            }
        }
    }

    /// Returns the name (`cn`) of the unit with id `unit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the unit cannot be resolved.
    pub async fn unit_name(&self, unit_id: &str) -> Result<String> {
        self.resolve_first_value(
            &filter::equality(ATTR_UNIQUE_IDENTIFIER, unit_id),
            ATTR_CN,
            || format!("The unit with id '{unit_id}' was not found"),
        )
        .await
    }

    /// Returns the id of the unit named `unit_name`.
    ///
    /// The `cn` search also matches people and groups carrying that name, so
    /// only an entry whose own RDN is `ou=<unit_name>` is accepted. When
    /// several entries qualify, the last one returned by the directory wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no unit entry qualifies or the chosen
    /// entry has no non-empty id.
    pub async fn unit_id(&self, unit_name: &str) -> Result<String> {
        let not_found = || Error::NotFound(format!("The unit named '{unit_name}' was not found"));
        let entries = match self
            .searcher
            .search(
                &filter::equality(ATTR_CN, unit_name),
                &[ATTR_UNIQUE_IDENTIFIER],
            )
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                debug!(unit_name, "unit search failed: {err}");
                return Err(not_found());
            }
        };

        entries
            .iter()
            .filter(|entry| is_unit_named(entry, unit_name))
            .last()
            .and_then(|entry| entry.first(ATTR_UNIQUE_IDENTIFIER))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(not_found)
    }

    /// Returns the sciper of `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the user cannot be resolved.
    pub async fn sciper(&self, username: &str) -> Result<String> {
        self.resolve_first_value(
            &filter::equality(ATTR_UID, username),
            ATTR_UNIQUE_IDENTIFIER,
            || format!("No sciper corresponds to username {username}"),
        )
        .await
    }

    /// Returns the username of the person with `sciper`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the person cannot be resolved.
    pub async fn username(&self, sciper: &str) -> Result<String> {
        self.resolve_first_value(
            &filter::equality(ATTR_UNIQUE_IDENTIFIER, sciper),
            ATTR_UID,
            || format!("No username corresponds to sciper {sciper}"),
        )
        .await
    }

    /// Returns the email address of the person with `sciper`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the person has no address.
    pub async fn email(&self, sciper: &str) -> Result<String> {
        self.resolve_first_value(
            &filter::equality(ATTR_UNIQUE_IDENTIFIER, sciper),
            ATTR_MAIL,
            || format!("No email address corresponds to sciper {sciper}"),
        )
        .await
    }

    /// Returns the ids of every unit `username` is affiliated with, in the
    /// order the directory lists the affiliations.
    ///
    /// An unknown user has no affiliations and yields an empty list. All
    /// searches share one session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDirectoryShape`] when an affiliation DN has
    /// no `ou` directly above the user entry, [`Error::NotFound`] when that
    /// unit has no id, and transport errors as they occur.
    pub async fn units(&self, username: &str) -> Result<Vec<String>> {
        let mut session = self.searcher.open().await?;
        let result = self.units_with(&mut *session, username).await;
        self.searcher.release(session).await;
        result
    }

    async fn units_with(
        &self,
        session: &mut dyn LdapSession,
        username: &str,
    ) -> Result<Vec<String>> {
        let affiliations = self
            .searcher
            .search_with(session, &filter::affiliations_of(username), ALL_ATTRIBUTES)
            .await?;

        let mut units = Vec::with_capacity(affiliations.len());
        for affiliation in &affiliations {
            let unit_name = unit_of_affiliation(&affiliation.dn)?;
            let entries = self
                .searcher
                .search_with(
                    session,
                    &filter::equality(ATTR_OU, &unit_name),
                    &[ATTR_UNIQUE_IDENTIFIER],
                )
                .await?;
            let unit_id = entries
                .first()
                .and_then(|entry| entry.first(ATTR_UNIQUE_IDENTIFIER))
                .ok_or_else(|| {
                    Error::NotFound(format!("The unit named '{unit_name}' was not found"))
                })?;
            units.push(unit_id.to_string());
        }

        debug!(username, count = units.len(), "resolved unit affiliations");
        Ok(units)
    }

    async fn first_entry(
        &self,
        filter: &str,
        attribute: &'static str,
    ) -> Result<Option<LdapEntry>> {
        let entries = self.searcher.search(filter, &[attribute]).await?;
        Ok(entries.into_iter().next())
    }

    // Empty results, missing attributes and failed searches all map to the
    // caller's not-found message.
    async fn resolve_first_value<F>(
        &self,
        filter: &str,
        attribute: &'static str,
        not_found: F,
    ) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        match self.first_entry(filter, attribute).await {
            Ok(entry) => entry
                .as_ref()
                .and_then(|entry| entry.first(attribute))
                .map(str::to_string)
                .ok_or_else(|| Error::NotFound(not_found())),
            Err(err) => {
                debug!(%filter, attribute, "lookup failed: {err}");
                Err(Error::NotFound(not_found()))
            }
        }
    }
}

fn is_unit_named(entry: &LdapEntry, unit_name: &str) -> bool {
    match DistinguishedName::parse(&entry.dn) {
        Ok(dn) => {
            dn.len() > 1
                && dn
                    .single_rdn(0)
                    .is_some_and(|rdn| rdn.matches(ATTR_OU, unit_name))
        }
        Err(err) => {
            warn!(dn = %entry.dn, "skipping entry with malformed DN: {err}");
            false
        }
    }
}

// Affiliation entries sit directly below their unit:
// `uid=<user>@<unit>,ou=<unit>,ou=<parent>,...,o=epfl,c=ch`.
fn unit_of_affiliation(dn: &str) -> Result<String> {
    let parsed = DistinguishedName::parse(dn).map_err(|err| {
        Error::UnsupportedDirectoryShape(format!("affiliation `{dn}` is not a valid DN: {err}"))
    })?;
    match parsed.single_rdn(1) {
        Some(rdn) if rdn.matches_attribute(ATTR_OU) => Ok(rdn.value().to_string()),
        _ => Err(Error::UnsupportedDirectoryShape(format!(
            "affiliation `{dn}` has no organizational unit directly above the user entry"
        ))),
    }
}
