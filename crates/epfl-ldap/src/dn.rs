//! Distinguished Name parsing for directory entries.
//!
//! The unit lookups read the organizational-unit structure straight out of an
//! entry's DN, so DNs are parsed into their relative components (RFC 4514)
//! rather than split on raw substrings. Values are fully unescaped: both
//! `\,`-style escapes and `\C3\A9`-style hex pairs are decoded.

use std::fmt;
use thiserror::Error;

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// A `\` was followed by a malformed hex pair, or the decoded bytes are not UTF-8.
    #[error("distinguished name contains an invalid escape sequence: {0}")]
    InvalidEscape(String),
}

/// A single `attribute=value` pair of a DN, with the value unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Attribute portion of the RDN (e.g. `ou`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value portion of the RDN.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if this RDN matches the provided attribute name (case-insensitive).
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }

    /// Returns true if both attribute and value match (case-insensitive).
    #[must_use]
    pub fn matches(&self, attribute: &str, value: &str) -> bool {
        self.matches_attribute(attribute) && self.value.eq_ignore_ascii_case(value)
    }
}

/// Parsed distinguished name.
///
/// The original text is kept untouched and is what [`DistinguishedName::as_str`]
/// returns; parsing only adds positional access to the RDNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            rdns: Parser::new(raw).run()?,
        })
    }

    /// Borrows the distinguished name exactly as it was given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of RDN sets, from the entry itself up to the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// A parsed DN always holds at least one RDN.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Returns the single-valued RDN at `index` (0 is the entry's own RDN),
    /// or `None` if absent or `+`-joined.
    #[must_use]
    pub fn single_rdn(&self, index: usize) -> Option<&RelativeDistinguishedName> {
        match self.rdns.get(index)?.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Single pass over the DN text.
///
/// Attribute text accumulates until an unescaped `=`; value bytes accumulate
/// until an unescaped `+` (next pair of the same RDN) or `,` (next RDN).
struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
    current: Vec<RelativeDistinguishedName>,
    attribute: Option<String>,
    text: String,
    value: Vec<u8>,
    // Length of `value` up to and including the last escaped byte; trailing
    // spaces before it are significant.
    escaped_len: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            rdns: Vec::new(),
            current: Vec::new(),
            attribute: None,
            text: String::new(),
            value: Vec::new(),
            escaped_len: 0,
        }
    }

    fn run(mut self) -> std::result::Result<Vec<Vec<RelativeDistinguishedName>>, DistinguishedNameError> {
        while let Some(ch) = self.chars.next() {
            match (ch, self.attribute.is_some()) {
                ('\\', false) => return Err(self.invalid_component()),
                ('=', false) => {
                    let attribute = self.text.trim();
                    if attribute.is_empty() {
                        return Err(DistinguishedNameError::MissingAttribute(
                            self.input.to_string(),
                        ));
                    }
                    self.attribute = Some(attribute.to_string());
                    self.text.clear();
                }
                (',' | '+', false) => return Err(self.invalid_component()),
                (_, false) => self.text.push(ch),
                ('\\', true) => self.escape()?,
                ('+', true) => self.finish_pair()?,
                (',', true) => {
                    self.finish_pair()?;
                    self.rdns.push(std::mem::take(&mut self.current));
                }
                (' ', true) if self.value.is_empty() => {}
                (_, true) => {
                    let mut buf = [0; 4];
                    self.value
                        .extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        if self.attribute.is_none() {
            return Err(self.invalid_component());
        }
        self.finish_pair()?;
        self.rdns.push(self.current);
        Ok(self.rdns)
    }

    fn escape(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let first = self
            .chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        if let Some(high) = first.to_digit(16) {
            let low = self
                .chars
                .next()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| DistinguishedNameError::InvalidEscape(self.input.to_string()))?;
            // Both digits are below 16, so the pair fits in a byte.
            self.value.push(((high << 4) | low) as u8);
        } else {
            let mut buf = [0; 4];
            self.value
                .extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
        self.escaped_len = self.value.len();
        Ok(())
    }

    fn finish_pair(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let attribute = self
            .attribute
            .take()
            .ok_or_else(|| self.invalid_component())?;

        let keep = self
            .value
            .iter()
            .rposition(|b| *b != b' ')
            .map_or(0, |idx| idx + 1)
            .max(self.escaped_len);
        self.value.truncate(keep);
        if self.value.is_empty() {
            return Err(DistinguishedNameError::MissingValue(attribute));
        }

        let value = String::from_utf8(std::mem::take(&mut self.value))
            .map_err(|_| DistinguishedNameError::InvalidEscape(self.input.to_string()))?;
        self.escaped_len = 0;
        self.current.push(RelativeDistinguishedName { attribute, value });
        Ok(())
    }

    fn invalid_component(&self) -> DistinguishedNameError {
        DistinguishedNameError::InvalidComponent(self.input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_affiliation_dn() {
        let dn = DistinguishedName::parse(
            "cn=Gregory Charmier,ou=idevelop,ou=si-idev,ou=si,o=epfl,c=ch",
        )
        .unwrap();
        assert_eq!(dn.len(), 6);
        assert_eq!(dn.single_rdn(0).unwrap().value(), "Gregory Charmier");
        assert!(dn.single_rdn(1).unwrap().matches("OU", "IDEVELOP"));
        assert!(dn.single_rdn(6).is_none());
    }

    #[test]
    fn parse_dn_with_escaped_comma() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=idevelop,o=epfl,c=ch").unwrap();
        assert_eq!(dn.single_rdn(0).unwrap().value(), "Smith, John");
        assert_eq!(dn.len(), 4);
        assert_eq!(dn.as_str(), "cn=Smith\\, John,ou=idevelop,o=epfl,c=ch");
    }

    #[test]
    fn hex_pairs_decode_as_utf8() {
        let dn = DistinguishedName::parse("ou=r\\C3\\A9seau,o=epfl,c=ch").unwrap();
        assert_eq!(dn.single_rdn(0).unwrap().value(), "réseau");
        assert_eq!(dn.as_str(), "ou=r\\C3\\A9seau,o=epfl,c=ch");

        let dn = DistinguishedName::parse("cn=a\\2cb\\5c,o=epfl").unwrap();
        assert_eq!(dn.single_rdn(0).unwrap().value(), "a,b\\");
    }

    #[test]
    fn bad_hex_pairs_are_rejected() {
        assert!(matches!(
            DistinguishedName::parse("ou=r\\Cx,o=epfl").unwrap_err(),
            DistinguishedNameError::InvalidEscape(_)
        ));
        // A lone continuation byte is not UTF-8.
        assert!(matches!(
            DistinguishedName::parse("ou=\\A9,o=epfl").unwrap_err(),
            DistinguishedNameError::InvalidEscape(_)
        ));
    }

    #[test]
    fn escaped_trailing_space_is_kept() {
        let dn = DistinguishedName::parse("cn=padded\\ ,o=epfl").unwrap();
        assert_eq!(dn.single_rdn(0).unwrap().value(), "padded ");

        let dn = DistinguishedName::parse("cn = spaced  , o=epfl").unwrap();
        assert!(dn.single_rdn(0).unwrap().matches("cn", "spaced"));
    }

    #[test]
    fn multi_valued_rdn_is_not_single() {
        let dn = DistinguishedName::parse("cn=John+uid=1234,ou=idevelop,o=epfl,c=ch").unwrap();
        assert_eq!(dn.len(), 4);
        assert!(dn.single_rdn(0).is_none());
        assert_eq!(dn.single_rdn(1).map(RelativeDistinguishedName::value), Some("idevelop"));
    }

    #[test]
    fn invalid_inputs() {
        assert_eq!(
            DistinguishedName::parse("   ").unwrap_err(),
            DistinguishedNameError::Empty
        );
        assert!(matches!(
            DistinguishedName::parse("cn=John,").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("not a dn").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("=John,o=epfl").unwrap_err(),
            DistinguishedNameError::MissingAttribute(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("cn=,o=epfl").unwrap_err(),
            DistinguishedNameError::MissingValue(_)
        ));
        assert_eq!(
            DistinguishedName::parse("cn=John\\").unwrap_err(),
            DistinguishedNameError::UnterminatedEscape
        );
    }
}
