use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An opaque reference to a secret held in an external secret store.
///
/// Resolving the actual value is out of scope for this codebase (secret
/// storage is an external collaborator); this type and the
/// [`SecretResolver`] trait define the seam a real integration plugs into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef(pub String);

impl SecretRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
}

/// Resolves a [`SecretRef`] to its plaintext value.
///
/// Implementations are expected to be cheap to call repeatedly (cache
/// internally if the backing store is slow) — the ingest hot path resolves
/// a shared secret on every request.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, secret_ref: &SecretRef) -> Result<String, SecretError>;
}

/// In-memory resolver backed by a fixed map. Used for local dev and tests;
/// a production deployment swaps this for a real secret-store client behind
/// the same trait.
pub struct StaticSecretResolver {
    values: HashMap<String, String>,
}

impl StaticSecretResolver {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Build a resolver from `REPLIES_SECRET_<id>` environment variables.
    pub fn from_env(ids: &[&str]) -> Self {
        let mut values = HashMap::new();
        for id in ids {
            let env_key = format!("REPLIES_SECRET_{}", id.to_uppercase());
            if let Ok(v) = std::env::var(&env_key) {
                values.insert(id.to_string(), v);
            }
        }
        Self { values }
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, secret_ref: &SecretRef) -> Result<String, SecretError> {
        self.values
            .get(&secret_ref.0)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(secret_ref.0.clone()))
    }
}

/// Resolves every request by deriving `REPLIES_SECRET_<ID>` from the
/// `SecretRef` at lookup time instead of pre-loading a fixed set of ids.
///
/// `StaticSecretResolver::from_env` fits the ingest server, which knows its
/// three webhook secret ids ahead of time. A worker's credential refs come
/// from per-conversation records and are open-ended, so it resolves lazily
/// against the same naming convention instead.
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, secret_ref: &SecretRef) -> Result<String, SecretError> {
        let env_key = format!("REPLIES_SECRET_{}", secret_ref.0.to_uppercase());
        std::env::var(&env_key).map_err(|_| SecretError::NotFound(secret_ref.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_resolver_round_trips() {
        let mut values = HashMap::new();
        values.insert("whatsapp-shared-secret".to_string(), "s3cr3t".to_string());
        let resolver = StaticSecretResolver::new(values);
        let resolved = resolver
            .resolve(&SecretRef::new("whatsapp-shared-secret"))
            .unwrap();
        assert_eq!(resolved, "s3cr3t");
    }

    #[test]
    fn static_resolver_missing_is_not_found() {
        let resolver = StaticSecretResolver::new(HashMap::new());
        let err = resolver.resolve(&SecretRef::new("missing")).unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[test]
    fn env_resolver_derives_key_from_ref() {
        std::env::set_var("REPLIES_SECRET_ACME-CO-AI-KEY", "sk-test-123");
        let resolver = EnvSecretResolver;
        let resolved = resolver.resolve(&SecretRef::new("acme-co-ai-key")).unwrap();
        assert_eq!(resolved, "sk-test-123");
        std::env::remove_var("REPLIES_SECRET_ACME-CO-AI-KEY");
    }

    #[test]
    fn env_resolver_missing_is_not_found() {
        let resolver = EnvSecretResolver;
        let err = resolver
            .resolve(&SecretRef::new("definitely-unset-secret-id"))
            .unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }
}
