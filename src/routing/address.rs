//! Recipient address handling and lookup-key generation.

use super::store::RouteKey;
use crate::events::MatchKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recipient address split into local part and domain.
///
/// Addresses arrive pre-validated from the receiving substrate; this type only
/// needs the structure relevant to routing (the `@` split and the `+tag`
/// convention), not full RFC address parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress {
    raw: String,
}

impl EmailAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Domain portion, when the address contains one.
    pub fn domain(&self) -> Option<&str> {
        self.raw.split_once('@').map(|(_, domain)| domain)
    }

    /// Strip a `+tag` suffix from the local part: `user+tag@d` becomes
    /// `user@d`. Addresses without a tag (or without an `@`) come back
    /// unchanged.
    pub fn normalized(&self) -> EmailAddress {
        let Some((local, domain)) = self.raw.split_once('@') else {
            return self.clone();
        };
        match local.split_once('+') {
            Some((base, _tag)) => EmailAddress::new(format!("{base}@{domain}")),
            None => self.clone(),
        }
    }

    /// Lookup keys in hierarchical order, most to least specific, each tagged
    /// with the match kind it represents. At most four entries; the normalized
    /// form is omitted when it equals the raw address.
    pub fn lookup_keys(&self) -> Vec<(MatchKind, RouteKey)> {
        let mut keys = vec![(MatchKind::Exact, RouteKey::for_pattern(&self.raw))];

        let normalized = self.normalized();
        if normalized != *self {
            keys.push((
                MatchKind::Normalized,
                RouteKey::for_pattern(normalized.as_str()),
            ));
        }

        if let Some(domain) = self.domain() {
            keys.push((
                MatchKind::DomainWildcard,
                RouteKey::for_pattern(&format!("*@{domain}")),
            ));
        }

        keys.push((MatchKind::GlobalWildcard, RouteKey::for_pattern("*")));
        keys
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for EmailAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
