//! Value objects for the registrant domain.

use common::FieldViolation;
use serde::{Deserialize, Serialize};

const MAX_NAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 254;

/// A registrant's display name, trimmed and validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrantName(String);

impl RegistrantName {
    /// Sanitizes and validates a raw name.
    ///
    /// Names are 1-100 characters of letters, spaces, apostrophes,
    /// hyphens and periods.
    pub fn parse(raw: &str) -> Result<Self, FieldViolation> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(FieldViolation::new("name", "is required"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(FieldViolation::new(
                "name",
                format!("must be at most {MAX_NAME_CHARS} characters"),
            ));
        }
        let allowed = |c: char| c.is_alphabetic() || matches!(c, ' ' | '\'' | '-' | '.');
        if !name.chars().all(allowed) {
            return Err(FieldViolation::new(
                "name",
                "must contain only letters, spaces, apostrophes, hyphens or periods",
            ));
        }

        Ok(Self(name.to_string()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrantName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized (trimmed, lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Sanitizes and validates a raw email address.
    pub fn parse(raw: &str) -> Result<Self, FieldViolation> {
        let email = raw.trim().to_lowercase();
        let invalid = |why: &str| Err(FieldViolation::new("email", why));

        if email.is_empty() {
            return invalid("is required");
        }
        if email.chars().count() > MAX_EMAIL_CHARS {
            return invalid("is too long");
        }
        if email.chars().any(char::is_whitespace) {
            return invalid("must not contain whitespace");
        }

        let Some((local, domain)) = email.split_once('@') else {
            return invalid("must contain '@'");
        };
        if local.is_empty() || domain.contains('@') {
            return invalid("must have exactly one '@' and a local part");
        }
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return invalid("must have a valid domain");
        }

        Ok(Self(email))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed() {
        let name = RegistrantName::parse("  Ann  ").unwrap();
        assert_eq!(name.as_str(), "Ann");
    }

    #[test]
    fn test_name_accepts_common_punctuation() {
        assert!(RegistrantName::parse("Mary-Jane O'Neil Jr.").is_ok());
        assert!(RegistrantName::parse("Zoë").is_ok());
    }

    #[test]
    fn test_name_rejects_digits() {
        let err = RegistrantName::parse("4nn").unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_name_rejects_blank_and_overlong() {
        assert!(RegistrantName::parse("   ").is_err());
        assert!(RegistrantName::parse(&"a".repeat(101)).is_err());
        assert!(RegistrantName::parse(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_email_is_normalized() {
        let email = EmailAddress::parse("  Ann@X.com ").unwrap();
        assert_eq!(email.as_str(), "ann@x.com");
    }

    #[test]
    fn test_email_rejects_malformed() {
        for raw in [
            "",
            "ann",
            "@x.com",
            "ann@",
            "ann@x",
            "ann@x..com",
            "ann@@x.com",
            "a nn@x.com",
            "ann@x.com.",
        ] {
            let err = EmailAddress::parse(raw).unwrap_err();
            assert_eq!(err.field, "email", "expected {raw:?} to be rejected");
        }
    }
}
