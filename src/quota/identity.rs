use std::fmt;

/// Ledger lookup key for a caller.
///
/// Authenticated users and address fallbacks never share a record even when
/// the strings match. Callers behind one address share that address's quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(String),
    Address(String),
}

impl IdentityKey {
    /// Prefer a non-blank user id, otherwise fall back to the network address.
    /// Returns `None` when neither yields a usable key.
    pub fn resolve(user_id: Option<&str>, address: Option<&str>) -> Option<Self> {
        let non_blank = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        user_id
            .and_then(non_blank)
            .map(IdentityKey::User)
            .or_else(|| address.and_then(non_blank).map(IdentityKey::Address))
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdentityKey::User(id) | IdentityKey::Address(id) => id,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::User(id) => write!(f, "user:{id}"),
            IdentityKey::Address(addr) => write!(f, "addr:{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_user_id() {
        let key = IdentityKey::resolve(Some("u1"), Some("10.0.0.1"));
        assert_eq!(key, Some(IdentityKey::User("u1".into())));
    }

    #[test]
    fn test_resolve_blank_user_falls_back_to_address() {
        let key = IdentityKey::resolve(Some("   "), Some("10.0.0.1"));
        assert_eq!(key, Some(IdentityKey::Address("10.0.0.1".into())));
        let key = IdentityKey::resolve(None, Some(" 10.0.0.2 "));
        assert_eq!(key, Some(IdentityKey::Address("10.0.0.2".into())));
    }

    #[test]
    fn test_resolve_nothing_usable() {
        assert_eq!(IdentityKey::resolve(None, None), None);
        assert_eq!(IdentityKey::resolve(Some(""), Some("")), None);
    }

    #[test]
    fn test_user_and_address_keys_are_distinct() {
        assert_ne!(
            IdentityKey::User("1.2.3.4".into()),
            IdentityKey::Address("1.2.3.4".into())
        );
        assert_eq!(IdentityKey::User("a".into()).to_string(), "user:a");
        assert_eq!(IdentityKey::Address("b".into()).to_string(), "addr:b");
    }
}
