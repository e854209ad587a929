//! Email addresses and the marketplace-domain blocklist used to pick
//! customers and orders for cleanup.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The input does not contain an @ symbol.
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    /// The domain part (after the first @) is empty.
    #[error("email domain cannot be empty")]
    EmptyDomain,
}

/// An email address as stored on a Shopify customer or order.
///
/// Validation is deliberately loose: marketplace relay addresses are often
/// unusual, and the only thing the tools need is the domain.
///
/// ```
/// use bulkops_core::Email;
///
/// let email = Email::parse("buyer+123@Marketplace.Kaufland.de").unwrap();
/// assert_eq!(email.domain(), "Marketplace.Kaufland.de");
/// assert_eq!(email.domain_tag(), "@marketplace.kaufland.de");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Parse an `Email` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, has no @ symbol, or has
    /// nothing after the first @.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }

        let (_, domain) = s.split_once('@').ok_or(EmailError::MissingAtSymbol)?;
        if domain.is_empty() {
            return Err(EmailError::EmptyDomain);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything after the first @.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }

    /// Lowercased `@domain`, the grouping key of the domain report.
    #[must_use]
    pub fn domain_tag(&self) -> String {
        format!("@{}", self.domain().to_lowercase())
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Case-insensitive set of domain fragments.
///
/// An address matches when anything after its first @ contains one of the
/// fragments, so `bol.com` catches `partner.bol.com` and `kaufland` catches
/// `marketplace.kaufland.de`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainBlocklist {
    fragments: Vec<String>,
}

impl DomainBlocklist {
    /// Marketplace relay domains the store cleans up by default.
    pub const MARKETPLACES: &'static [&'static str] = &[
        "kaufland",
        "amazon",
        "bol.com",
        "gartentraume",
        "brico",
        "mirakl",
        "praxis",
        "diymaxeda",
        "worten",
        "insightlyservice",
        "allegro",
        "productpine",
        "rakuten",
        "octopia",
    ];

    /// Build a blocklist; blank fragments are dropped.
    #[must_use]
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|fragment| fragment.as_ref().trim().to_lowercase())
                .filter(|fragment| !fragment.is_empty())
                .collect(),
        }
    }

    /// The default marketplace blocklist.
    #[must_use]
    pub fn marketplaces() -> Self {
        Self::new(Self::MARKETPLACES)
    }

    /// Whether `email` belongs to a blocked domain.
    #[must_use]
    pub fn matches(&self, email: &Email) -> bool {
        let domain = email.domain().to_lowercase();
        self.fragments
            .iter()
            .any(|fragment| domain.contains(fragment.as_str()))
    }

    /// Parse and match a raw address; unparseable addresses never match.
    #[must_use]
    pub fn matches_str(&self, raw: &str) -> bool {
        Email::parse(raw).is_ok_and(|email| self.matches(&email))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("no-at-symbol"), Err(EmailError::MissingAtSymbol));
        assert_eq!(Email::parse("user@"), Err(EmailError::EmptyDomain));
    }

    #[test]
    fn test_domain_after_first_at() {
        let email = Email::parse("odd@relay@amazon.de").unwrap();
        assert_eq!(email.domain(), "relay@amazon.de");
    }

    #[test]
    fn test_blocklist_matches_case_insensitively() {
        let blocklist = DomainBlocklist::marketplaces();
        assert!(blocklist.matches_str("x@Marketplace.AMAZON.de"));
        assert!(blocklist.matches_str("x@partner.bol.com"));
        assert!(!blocklist.matches_str("x@bolxcom.nl"));
        assert!(!blocklist.matches_str("x@example.com"));
    }

    #[test]
    fn test_blocklist_ignores_local_part() {
        let blocklist = DomainBlocklist::new(["amazon"]);
        assert!(!blocklist.matches_str("amazon@example.com"));
        assert!(!blocklist.matches_str("not-an-email"));
    }

    #[test]
    fn test_blocklist_drops_blank_fragments() {
        let blocklist = DomainBlocklist::new(["", "  "]);
        assert!(blocklist.is_empty());
        assert!(!blocklist.matches_str("a@b.c"));
    }

    #[test]
    fn test_domain_tag() {
        let email: Email = "A@Example.COM".parse().unwrap();
        assert_eq!(email.domain_tag(), "@example.com");
    }
}
