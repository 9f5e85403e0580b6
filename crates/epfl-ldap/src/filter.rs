//! Search filters for the directory lookups.
//!
//! Every caller-supplied identifier is escaped before it is placed in a filter,
//! so `*`, parentheses and backslashes match literally.

/// Escapes a value for use inside an LDAP search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Builds an equality filter `(attribute=value)` with the value escaped.
#[must_use]
pub fn equality(attribute: &str, value: &str) -> String {
    format!("({attribute}={})", escape_filter_value(value))
}

/// `(uid=<username>@*)`: every affiliation entry of a user.
///
/// Affiliation entries carry a `uid` of the form `username@unit`; only the
/// trailing wildcard is left unescaped.
#[must_use]
pub fn affiliations_of(username: &str) -> String {
    format!("(uid={}@*)", escape_filter_value(username))
}
