//! Configuration for connecting to the directory.
//!
//! Two directory scopes are recognised: the EPFL directory and a generic one.
//! Each scope needs a server host and a search base. Values are taken from the
//! environment when set, otherwise from the scope's static defaults; a value
//! missing from both is a configuration error raised when the scope's settings
//! are requested.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

const EPFL_DEFAULT_HOST: &str = "ldap.epfl.ch";
const EPFL_DEFAULT_BASE_DN: &str = "o=epfl,c=ch";

/// The directory a lookup is issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryScope {
    /// The EPFL directory.
    Epfl,
    /// A generic directory configured entirely through the environment.
    Generic,
}

impl DirectoryScope {
    /// Environment key holding the server host for this scope.
    #[must_use]
    pub const fn host_key(self) -> &'static str {
        match self {
            Self::Epfl => "EPFL_LDAP_SERVER_FOR_SEARCH",
            Self::Generic => "LDAP_SERVER",
        }
    }

    /// Environment key holding the search base for this scope.
    #[must_use]
    pub const fn base_dn_key(self) -> &'static str {
        match self {
            Self::Epfl => "EPFL_LDAP_BASE_DN",
            Self::Generic => "LDAP_BASE",
        }
    }

    const fn default_host(self) -> Option<&'static str> {
        match self {
            Self::Epfl => Some(EPFL_DEFAULT_HOST),
            Self::Generic => None,
        }
    }

    const fn default_base_dn(self) -> Option<&'static str> {
        match self {
            Self::Epfl => Some(EPFL_DEFAULT_BASE_DN),
            Self::Generic => None,
        }
    }
}

impl fmt::Display for DirectoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epfl => f.write_str("epfl"),
            Self::Generic => f.write_str("generic"),
        }
    }
}

/// Raw, possibly incomplete values for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    /// Directory server host (optionally `host:port`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_host: Option<String>,

    /// Search base distinguished name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dn: Option<String>,
}

impl ScopeEntry {
    fn from_lookup<F>(scope: DirectoryScope, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            server_host: non_empty(lookup(scope.host_key()))
                .or_else(|| scope.default_host().map(str::to_string)),
            base_dn: non_empty(lookup(scope.base_dn_key()))
                .or_else(|| scope.default_base_dn().map(str::to_string)),
        }
    }
}

/// Configuration for every directory scope.
///
/// Construct it once with [`DirectoryConfig::from_env`] and hand it to the
/// client; nothing reads the environment afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Values for the EPFL directory.
    #[serde(default = "default_epfl_entry")]
    pub epfl: ScopeEntry,

    /// Values for the generic directory.
    #[serde(default = "default_generic_entry")]
    pub generic: ScopeEntry,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Operation timeout in seconds
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

fn default_epfl_entry() -> ScopeEntry {
    ScopeEntry::from_lookup(DirectoryScope::Epfl, &|_: &str| None)
}

fn default_generic_entry() -> ScopeEntry {
    ScopeEntry::from_lookup(DirectoryScope::Generic, &|_: &str| None)
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

impl DirectoryConfig {
    /// Reads every scope from the process environment, falling back to the static defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every scope from an arbitrary key source, falling back to the static defaults.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            epfl: ScopeEntry::from_lookup(DirectoryScope::Epfl, &lookup),
            generic: ScopeEntry::from_lookup(DirectoryScope::Generic, &lookup),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }

    /// Returns the raw values for a scope.
    #[must_use]
    pub const fn entry(&self, scope: DirectoryScope) -> &ScopeEntry {
        match scope {
            DirectoryScope::Epfl => &self.epfl,
            DirectoryScope::Generic => &self.generic,
        }
    }

    /// Overrides the values for a scope.
    #[must_use]
    pub fn with_scope(
        mut self,
        scope: DirectoryScope,
        server_host: impl Into<String>,
        base_dn: impl Into<String>,
    ) -> Self {
        let entry = ScopeEntry {
            server_host: Some(server_host.into()),
            base_dn: Some(base_dn.into()),
        };
        match scope {
            DirectoryScope::Epfl => self.epfl = entry,
            DirectoryScope::Generic => self.generic = entry,
        }
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

    /// Resolves the complete, validated settings for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the missing key when a value is
    /// absent, or when the host does not form a valid `ldap://` URL, and
    /// [`Error::ValidationError`] when a value is out of range.
    pub fn settings(&self, scope: DirectoryScope) -> Result<ScopeSettings, Error> {
        let entry = self.entry(scope);
        let server_host = entry
            .server_host
            .clone()
            .ok_or_else(|| missing_key(scope.host_key()))?;
        let base_dn = entry
            .base_dn
            .clone()
            .ok_or_else(|| missing_key(scope.base_dn_key()))?;

        let settings = ScopeSettings {
            scope,
            server_host,
            base_dn,
            connection_timeout_secs: self.connection_timeout_secs,
            operation_timeout_secs: self.operation_timeout_secs,
        };
        settings.validate()?;
        settings.parse_url()?;

        debug!(%scope, url = %settings.url(), base_dn = %settings.base_dn, "resolved directory settings");
        Ok(settings)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Complete settings for one scope, ready to open connections with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ScopeSettings {
    scope: DirectoryScope,

    #[validate(length(min = 1))]
    server_host: String,

    #[validate(length(min = 1))]
    base_dn: String,

    #[validate(range(min = 1, max = 300))]
    connection_timeout_secs: u64,

    #[validate(range(min = 1, max = 300))]
    operation_timeout_secs: u64,
}

impl ScopeSettings {
    /// Scope these settings were resolved for.
    #[must_use]
    pub const fn scope(&self) -> DirectoryScope {
        self.scope
    }

    /// Directory server host.
    #[must_use]
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Search base distinguished name.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// LDAP URL of the server (`ldap://<host>`).
    #[must_use]
    pub fn url(&self) -> String {
        format!("ldap://{}", self.server_host)
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    fn parse_url(&self) -> Result<Url, Error> {
        if self.server_host.contains("://") {
            return Err(Error::ConfigError(format!(
                "server host `{}` must not carry a URL scheme",
                self.server_host
            )));
        }
        let url = Url::parse(&self.url())?;
        if url.host_str().is_none() {
            return Err(Error::ConfigError(format!(
                "server host `{}` is not a valid host",
                self.server_host
            )));
        }
        Ok(url)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing_key(key: &str) -> Error {
    Error::ConfigError(format!("The variable {key} is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn epfl_scope_falls_back_to_defaults() {
        let config = DirectoryConfig::from_lookup(|_| None);
        let settings = config.settings(DirectoryScope::Epfl).unwrap();
        assert_eq!(settings.server_host(), "ldap.epfl.ch");
        assert_eq!(settings.base_dn(), "o=epfl,c=ch");
        assert_eq!(settings.url(), "ldap://ldap.epfl.ch");
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = DirectoryConfig::from_lookup(lookup_from(&[
            ("EPFL_LDAP_SERVER_FOR_SEARCH", "ldap.test.epfl.ch"),
            ("EPFL_LDAP_BASE_DN", "o=test,c=ch"),
        ]));
        let settings = config.settings(DirectoryScope::Epfl).unwrap();
        assert_eq!(settings.server_host(), "ldap.test.epfl.ch");
        assert_eq!(settings.base_dn(), "o=test,c=ch");
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let config =
            DirectoryConfig::from_lookup(lookup_from(&[("EPFL_LDAP_SERVER_FOR_SEARCH", "")]));
        assert_eq!(config.epfl.server_host.as_deref(), Some("ldap.epfl.ch"));
    }

    #[test]
    fn generic_scope_without_values_is_config_error() {
        let config = DirectoryConfig::from_lookup(|_| None);
        let err = config.settings(DirectoryScope::Generic).unwrap_err();
        assert_eq!(
            err,
            Error::ConfigError("The variable LDAP_SERVER is not set".to_string())
        );

        let config = DirectoryConfig::from_lookup(lookup_from(&[("LDAP_SERVER", "ldap.local")]));
        let err = config.settings(DirectoryScope::Generic).unwrap_err();
        assert!(err.to_string().contains("LDAP_BASE"));
    }

    #[test]
    fn timeouts_are_validated() {
        let config = DirectoryConfig::default().with_operation_timeout_secs(0);
        let err = config.settings(DirectoryScope::Epfl).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));

        let config = DirectoryConfig::default()
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(30);
        let settings = config.settings(DirectoryScope::Epfl).unwrap();
        assert_eq!(settings.connection_timeout(), Duration::from_secs(20));
        assert_eq!(settings.operation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn host_with_scheme_is_rejected() {
        let config = DirectoryConfig::default().with_scope(
            DirectoryScope::Generic,
            "ldap://ldap.local",
            "dc=local",
        );
        let err = config.settings(DirectoryScope::Generic).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"generic": {"server_host": "ldap.local:1389", "base_dn": "dc=local"}}"#;
        let config: DirectoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection_timeout_secs, DEFAULT_CONNECTION_TIMEOUT_SECS);
        assert_eq!(config.epfl.server_host.as_deref(), Some("ldap.epfl.ch"));
        assert_eq!(config.epfl.base_dn.as_deref(), Some("o=epfl,c=ch"));
        let expected = DirectoryConfig::default().with_scope(
            DirectoryScope::Generic,
            "ldap.local:1389",
            "dc=local",
        );
        assert_eq!(config, expected);

        let settings = config.settings(DirectoryScope::Generic).unwrap();
        assert_eq!(settings.url(), "ldap://ldap.local:1389");
        assert_eq!(settings.scope(), DirectoryScope::Generic);
    }
}
