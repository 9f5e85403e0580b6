//! Connections and searches against the directory.
//!
//! Sessions are anonymous: no bind is issued before searching. Each
//! [`DirectorySearcher::search`] opens its own session and unbinds it once the
//! search has completed, whether or not it succeeded.

use crate::{dn::DistinguishedName, Result};
use async_trait::async_trait;
use epfl_ldap_core::{Error, ScopeSettings};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Directory entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve the order sent by the server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns all values for the attribute, matching its name case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns true if any value of the attribute equals `value` (case-insensitive).
    #[must_use]
    pub fn has_value(&self, attribute: &str, value: &str) -> bool {
        self.values(attribute)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Runs single searches under the configured base DN.
pub struct DirectorySearcher {
    settings: Arc<ScopeSettings>,
    base_dn: DistinguishedName,
    connector: Box<dyn LdapConnector>,
}

impl DirectorySearcher {
    /// Creates a searcher that connects with `ldap3`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configured base DN does not parse.
    pub fn new(settings: ScopeSettings) -> Result<Self> {
        let settings = Arc::new(settings);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(settings.clone()));
        Self::build(settings, connector)
    }

    #[cfg(test)]
    pub(crate) fn with_connector(
        settings: ScopeSettings,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        Self::build(Arc::new(settings), connector)
    }

    fn build(settings: Arc<ScopeSettings>, connector: Box<dyn LdapConnector>) -> Result<Self> {
        let base_dn = DistinguishedName::parse(settings.base_dn()).map_err(|err| {
            Error::ConfigError(format!(
                "invalid base DN `{}` for scope {}: {err}",
                settings.base_dn(),
                settings.scope()
            ))
        })?;
        Ok(Self {
            settings,
            base_dn,
            connector,
        })
    }

    /// Settings the searcher was built from.
    #[must_use]
    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    /// Opens a session, performs exactly one subtree search and releases the session.
    ///
    /// An empty `attributes` list requests every user attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] on transport or LDAP failures and
    /// [`Error::Timeout`] when the directory does not answer in time.
    pub async fn search(
        &self,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let mut session = self.open().await?;
        let result = self.search_with(&mut *session, filter, attributes).await;
        self.release(session).await;
        result
    }

    pub(crate) async fn open(&self) -> Result<Box<dyn LdapSession>> {
        self.connector.connect().await
    }

    pub(crate) async fn search_with(
        &self,
        session: &mut dyn LdapSession,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        debug!(base = %self.base_dn, %filter, ?attributes, "searching directory");
        let entries = session
            .search(self.base_dn.as_str(), filter, attributes)
            .await?;
        debug!(%filter, count = entries.len(), "directory search returned");
        Ok(entries)
    }

    pub(crate) async fn release(&self, mut session: Box<dyn LdapSession>) {
        if let Err(err) = session.unbind().await {
            warn!(scope = %self.settings.scope(), "failed to release directory session: {err}");
        }
    }
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector {
    settings: Arc<ScopeSettings>,
}

impl RealLdapConnector {
    pub(crate) fn new(settings: Arc<ScopeSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.settings.connection_timeout());
        let url = self.settings.url();
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        debug!(%url, "opened anonymous directory session");
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.settings.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let result = timeout(
            self.operation_timeout,
            self.inner
                .search(base_dn, Scope::Subtree, filter, attributes.to_vec()),
        )
        .await
        .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
        .map_err(map_ldap_error)?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::Directory {
        message: err.to_string(),
    }
}
