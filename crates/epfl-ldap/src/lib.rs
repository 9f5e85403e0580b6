//! Directory lookup helpers for EPFL units and people.
//!
//! [`DirectoryClient`] resolves unit ids to names and back, and usernames,
//! scipers and email addresses to each other. Each lookup issues its own
//! filtered search against the configured directory scope.
//!
//! ```no_run
//! # async fn run() -> epfl_ldap::Result<()> {
//! use epfl_ldap::{DirectoryClient, DirectoryScope};
//!
//! let client = DirectoryClient::from_env(DirectoryScope::Epfl)?;
//! let sciper = client.sciper("charmier").await?;
//! let units = client.units("charmier").await?;
//! println!("{sciper} belongs to {units:?}");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod client;
mod directory;
mod dn;
mod filter;

pub use client::{DirectorySearcher, LdapEntry};
pub use directory::DirectoryClient;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use epfl_ldap_core::{DirectoryConfig, DirectoryScope, Error, ScopeSettings};
pub use filter::escape_filter_value;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = epfl_ldap_core::Result<T>;
