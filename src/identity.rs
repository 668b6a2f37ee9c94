//! Caller identity. Token issuance and verification belong to an external
//! provider; this module only maps a presented bearer token to a user id.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FocusError, FocusResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> FocusResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(FocusError::Unauthenticated);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token to a stable user id.
    async fn resolve(&self, token: &str) -> FocusResult<UserId>;
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> FocusResult<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(FocusError::Unauthenticated)
}

/// Fixed token table, loaded from settings.
pub struct StaticTokenIdentity {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenIdentity {
    pub fn new<I, T, U>(entries: I) -> FocusResult<Self>
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        let mut tokens = HashMap::new();
        for (token, user) in entries {
            tokens.insert(token.into(), UserId::new(user)?);
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn resolve(&self, token: &str) -> FocusResult<UserId> {
        // Scan every entry so lookup time does not depend on which token matched.
        let mut found = None;
        for (candidate, user) in &self.tokens {
            if constant_time_eq(candidate.as_bytes(), token.as_bytes()) {
                found = Some(user.clone());
            }
        }
        found.ok_or(FocusError::Unauthenticated)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());
    }

    #[tokio::test]
    async fn static_tokens_resolve_to_their_user() {
        let identity = StaticTokenIdentity::new([("t-alice", "alice"), ("t-bob", "bob")]).unwrap();

        assert_eq!(identity.resolve("t-bob").await.unwrap().as_str(), "bob");
        assert!(matches!(
            identity.resolve("t-carol").await,
            Err(FocusError::Unauthenticated)
        ));
    }

    #[test]
    fn repeated_tokens_keep_one_entry() {
        let identity =
            StaticTokenIdentity::new([("t", "alice"), ("t", "bob"), ("u", "carol")]).unwrap();
        assert_eq!(identity.len(), 2);
        assert!(!identity.is_empty());

        let none = StaticTokenIdentity::new(Vec::<(String, String)>::new()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn blank_user_ids_are_rejected() {
        assert!(StaticTokenIdentity::new([("t", " ")]).is_err());
    }
}
