//! Token validation boundary.
//!
//! Token issuance lives in an external identity service; the relay only
//! checks the `token` query parameter at WebSocket handshake, before the
//! protocol state machine starts. The check sits behind a trait so the
//! static shared-token validator can be swapped for a real verifier
//! without touching the handlers.

use crate::config::AuthConfig;

/// Claims extracted from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (user id) the token was issued to.
    pub subject: String,
}

pub trait TokenValidator: Send + Sync {
    /// Returns the token's claims, or `None` for an invalid/expired token.
    fn validate(&self, token: &str) -> Option<TokenClaims>;
}

/// Compares against a single configured shared token. When auth is
/// disabled, every non-empty token (or none at all) is accepted.
pub struct StaticTokenValidator {
    enabled: bool,
    token: String,
}

impl StaticTokenValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            token: config.token.clone(),
        }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> Option<TokenClaims> {
        if !self.enabled {
            return Some(TokenClaims {
                subject: "anonymous".to_string(),
            });
        }
        if !self.token.is_empty() && token == self.token {
            Some(TokenClaims {
                subject: "shared-token".to_string(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(enabled: bool, token: &str) -> StaticTokenValidator {
        StaticTokenValidator::new(&AuthConfig {
            enabled,
            token: token.to_string(),
        })
    }

    #[test]
    fn accepts_matching_token() {
        let v = validator(true, "s3cret");
        assert!(v.validate("s3cret").is_some());
    }

    #[test]
    fn rejects_wrong_or_empty_token() {
        let v = validator(true, "s3cret");
        assert!(v.validate("nope").is_none());
        assert!(v.validate("").is_none());
    }

    #[test]
    fn empty_configured_token_rejects_everything() {
        let v = validator(true, "");
        assert!(v.validate("").is_none());
        assert!(v.validate("anything").is_none());
    }

    #[test]
    fn disabled_auth_accepts_anything() {
        let v = validator(false, "ignored");
        assert_eq!(v.validate("").unwrap().subject, "anonymous");
        assert!(v.validate("whatever").is_some());
    }
}
