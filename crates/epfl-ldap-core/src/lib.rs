//! # epfl-ldap-core
//!
//! Core types shared by the EPFL directory lookup helpers.
//!
//! ## Modules
//!
//! - [`error`] - Error type and result alias used across the workspace
//! - [`config`] - Directory scopes and their environment-first configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{DirectoryConfig, DirectoryScope, ScopeSettings};
pub use error::{Error, Result};
